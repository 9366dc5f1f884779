use crate::cache::TileCache;
use crate::camera::LodCamera;
use crate::config::TerrainConfig;
use crate::factory::QuadTreeFactory;
use crate::key::TileKey;
use crate::quadtree::QuadTree;
use crate::source::{ElevationGrid, MemoryTileSource, RasterMetadata, TileSource};

use quadscape_core::geometry::Aabb;
use quadscape_core::glam::DVec3;
use std::sync::Arc;

/// A camera with the same pixel size everywhere.
pub struct FixedCamera {
    pub pixel_size: f64,
    pub culled: bool,
}

impl FixedCamera {
    pub fn new(pixel_size: f64) -> Self {
        Self {
            pixel_size,
            culled: false,
        }
    }
}

impl LodCamera for FixedCamera {
    fn location(&self) -> DVec3 {
        DVec3::new(0.0, 0.0, 1000.0)
    }

    fn look_at(&self) -> DVec3 {
        DVec3::ZERO
    }

    fn pixel_size_at(&self, _point: DVec3) -> f64 {
        self.pixel_size
    }

    fn is_culled(&self, _bounds: &Aabb) -> bool {
        self.culled
    }
}

pub fn rolling_hills(x: f64, y: f64) -> f32 {
    (10.0 * (0.11 * x).sin() + 6.0 * (0.07 * y).cos() + 0.002 * x * y) as f32
}

/// Adds a per-tile offset to every sample except the four tile corners, so neighboring borders disagree.
pub struct JitterSource(pub MemoryTileSource);

impl JitterSource {
    pub fn offset(key: &TileKey) -> f32 {
        0.1 * (key.level() as f32 + 1.0) * (key.quadrant().map_or(0, |q| q.index()) as f32 + 1.0)
    }
}

impl TileSource for JitterSource {
    fn metadata(&self) -> &RasterMetadata {
        self.0.metadata()
    }

    fn tile_exists(&self, key: &TileKey) -> bool {
        self.0.tile_exists(key)
    }

    fn get_tile(&self, key: &TileKey) -> Option<ElevationGrid> {
        let grid = self.0.get_tile(key)?;
        let (columns, rows) = (grid.columns(), grid.rows());
        let offset = Self::offset(key);
        Some(ElevationGrid::from_fn(columns, rows, |col, row| {
            let z = grid.get(col, row).unwrap_or(f32::NAN);
            let corner = (col == 0 || col + 1 == columns) && (row == 0 || row + 1 == rows);
            if corner {
                z
            } else {
                z + offset
            }
        }))
    }
}

pub fn inline_config() -> TerrainConfig {
    TerrainConfig {
        loader_threads: 0,
        ..Default::default()
    }
}

pub fn factory(source: impl TileSource + 'static, config: TerrainConfig) -> QuadTreeFactory {
    let cache = Arc::new(TileCache::new(config.max_cache_bytes));
    QuadTreeFactory::new("test", Arc::new(source), cache, config)
}

pub fn root(factory: &QuadTreeFactory) -> Arc<QuadTree> {
    factory.create_root().expect("root")
}
