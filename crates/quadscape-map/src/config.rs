use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Smallest acceptable ratio of mesh cell size to screen pixel size. Larger values favor coarser tiles.
    pub cell_size: f64,
    /// Byte budget of the tile cache.
    pub max_cache_bytes: usize,
    /// Tiles at `max_levels - 1` never split, whatever the source claims.
    pub max_levels: u8,
    /// Background mesh loaders. `0` loads every tile on the calling thread.
    pub loader_threads: usize,
    /// Multiplies every projected coordinate, e.g. to render terrain in millimeters.
    pub pixel_scale: f64,
    pub surface_color: [f32; 4],
    /// Byte cost of each draped layer, added to every tile's footprint.
    pub layer_bytes_per_tile: Vec<usize>,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            cell_size: 4.0,
            max_cache_bytes: 512 << 20,
            max_levels: 24,
            loader_threads: 5,
            pixel_scale: 1.0,
            surface_color: [1.0; 4],
            layer_bytes_per_tile: Vec::new(),
        }
    }
}
