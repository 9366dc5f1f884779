use crate::key::{Level, TileKey};

use quadscape_core::glam::DVec2;
use quadscape_core::SmallKeyHashSet;

/// Describes the raster pyramid behind a [`TileSource`].
#[derive(Clone, Debug, PartialEq)]
pub struct RasterMetadata {
    /// Cells per tile along X. A tile grid has `tile_width + 1` columns of samples.
    pub tile_width: usize,
    /// Cells per tile along Y. A tile grid has `tile_length + 1` rows of samples.
    pub tile_length: usize,
    /// Raster size in pixels at full resolution.
    pub raster_width: usize,
    pub raster_length: usize,
    /// Projected distance covered by one full-resolution raster pixel.
    pub pixel_spacing: DVec2,
    /// Z substituted for missing samples.
    pub fill_value: f32,
    pub min_elevation: f64,
}

impl RasterMetadata {
    /// Horizontal extent of the whole terrain in scene units.
    pub fn terrain_size(&self, pixel_scale: f64) -> DVec2 {
        DVec2::new(
            self.raster_width as f64 * self.pixel_spacing.x,
            self.raster_length as f64 * self.pixel_spacing.y,
        ) * pixel_scale
    }

    /// Ground sample distance of a tile at `level`. The root tile covers the whole terrain.
    pub fn pixel_size(&self, level: Level, pixel_scale: f64) -> DVec2 {
        let size = self.terrain_size(pixel_scale);
        let root = DVec2::new(
            size.x / self.tile_width as f64,
            size.y / self.tile_length as f64,
        );
        root * 0.5f64.powi(level as i32)
    }

    /// Center of the tile relative to the center of the terrain.
    pub fn tile_center(&self, key: &TileKey, pixel_scale: f64) -> DVec2 {
        let mut half_extent = 0.5 * self.terrain_size(pixel_scale);
        let mut center = DVec2::ZERO;
        for q in key.path() {
            half_extent *= 0.5;
            let (dx, dy) = q.center_direction();
            center += DVec2::new(dx, dy) * half_extent;
        }
        center
    }
}

/// A tile-shaped grid of elevation samples, row-major with row 0 along the top (north) border.
///
/// Missing samples are `NaN`.
#[derive(Clone, Debug, PartialEq)]
pub struct ElevationGrid {
    columns: usize,
    rows: usize,
    samples: Vec<f32>,
}

impl ElevationGrid {
    pub fn new(columns: usize, rows: usize, samples: Vec<f32>) -> Self {
        Self {
            columns,
            rows,
            samples,
        }
    }

    pub fn from_fn(columns: usize, rows: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut samples = Vec::with_capacity(columns * rows);
        for row in 0..rows {
            for col in 0..columns {
                samples.push(f(col, row));
            }
        }
        Self::new(columns, rows, samples)
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.columns {
            return None;
        }
        self.samples.get(row * self.columns + col).copied()
    }

    pub fn is_all_missing(&self) -> bool {
        self.samples.iter().all(|s| s.is_nan())
    }
}

/// The raster layer that feeds the terrain engine.
///
/// Implementations are shared with the background loaders.
pub trait TileSource: Send + Sync {
    fn metadata(&self) -> &RasterMetadata;

    /// Whether data exists for `key`. Used to decide if a tile can split.
    fn tile_exists(&self, key: &TileKey) -> bool;

    /// The samples of `key`, or `None` if they are not available.
    fn get_tile(&self, key: &TileKey) -> Option<ElevationGrid>;
}

type HeightFn = Box<dyn Fn(f64, f64) -> f32 + Send + Sync>;

/// Generates a full pyramid by sampling a height function at every tile vertex.
///
/// Coordinates handed to the height function are relative to the terrain center, with Y pointing north.
pub struct MemoryTileSource {
    metadata: RasterMetadata,
    levels: Level,
    height: HeightFn,
    absent: SmallKeyHashSet<TileKey>,
    unavailable: SmallKeyHashSet<TileKey>,
    holes: SmallKeyHashSet<TileKey>,
}

impl MemoryTileSource {
    /// A pyramid with `levels` levels whose finest level has one raster pixel per cell.
    pub fn new(
        tile_width: usize,
        tile_length: usize,
        levels: Level,
        height: impl Fn(f64, f64) -> f32 + Send + Sync + 'static,
    ) -> Self {
        let finest = 1usize << levels.saturating_sub(1);
        Self {
            metadata: RasterMetadata {
                tile_width,
                tile_length,
                raster_width: tile_width * finest,
                raster_length: tile_length * finest,
                pixel_spacing: DVec2::ONE,
                fill_value: 0.0,
                min_elevation: 0.0,
            },
            levels,
            height: Box::new(height),
            absent: Default::default(),
            unavailable: Default::default(),
            holes: Default::default(),
        }
    }

    pub fn with_pixel_spacing(mut self, spacing: DVec2) -> Self {
        self.metadata.pixel_spacing = spacing;
        self
    }

    pub fn with_min_elevation(mut self, min_elevation: f64) -> Self {
        self.metadata.min_elevation = min_elevation;
        self
    }

    pub fn with_fill_value(mut self, fill_value: f32) -> Self {
        self.metadata.fill_value = fill_value;
        self
    }

    /// Removes `key` from the pyramid. Its parent becomes a highest-level tile.
    pub fn without_tile(mut self, key: TileKey) -> Self {
        self.absent.insert(key);
        self
    }

    /// `key` exists but its samples never arrive.
    pub fn with_unavailable_tile(mut self, key: TileKey) -> Self {
        self.unavailable.insert(key);
        self
    }

    /// Every sample of `key` is missing.
    pub fn with_hole(mut self, key: TileKey) -> Self {
        self.holes.insert(key);
        self
    }

    pub fn levels(&self) -> Level {
        self.levels
    }
}

impl TileSource for MemoryTileSource {
    fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    fn tile_exists(&self, key: &TileKey) -> bool {
        key.level() < self.levels && !self.absent.contains(key)
    }

    fn get_tile(&self, key: &TileKey) -> Option<ElevationGrid> {
        if !self.tile_exists(key) || self.unavailable.contains(key) {
            return None;
        }

        let columns = self.metadata.tile_width + 1;
        let rows = self.metadata.tile_length + 1;
        if self.holes.contains(key) {
            return Some(ElevationGrid::new(columns, rows, vec![f32::NAN; columns * rows]));
        }

        let center = self.metadata.tile_center(key, 1.0);
        let pixel = self.metadata.pixel_size(key.level(), 1.0);
        let x0 = center.x - 0.5 * self.metadata.tile_width as f64 * pixel.x;
        let y0 = center.y + 0.5 * self.metadata.tile_length as f64 * pixel.y;

        Some(ElevationGrid::from_fn(columns, rows, |col, row| {
            (self.height)(x0 + col as f64 * pixel.x, y0 - row as f64 * pixel.y)
        }))
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use quadscape_core::approx::assert_relative_eq;

    #[test]
    fn pyramid_geometry() {
        let source = MemoryTileSource::new(32, 16, 3, |_, _| 0.0);
        let meta = source.metadata();
        assert_eq!(meta.raster_width, 128);
        assert_eq!(meta.raster_length, 64);

        let root = meta.pixel_size(0, 1.0);
        assert_relative_eq!(root.x, 4.0);
        assert_relative_eq!(root.y, 4.0);
        assert_relative_eq!(meta.pixel_size(2, 2.0).x, 2.0);

        let key: TileKey = "root/1/4".parse().unwrap();
        let center = meta.tile_center(&key, 1.0);
        assert_relative_eq!(center.x, -32.0 + 16.0);
        assert_relative_eq!(center.y, 16.0 - 8.0);
    }

    #[test]
    fn neighboring_tiles_share_border_samples() {
        let source = MemoryTileSource::new(8, 8, 2, |x, y| (x * 0.3 + y * y * 0.01) as f32);
        let left = source.get_tile(&"root/1".parse().unwrap()).unwrap();
        let right = source.get_tile(&"root/2".parse().unwrap()).unwrap();
        for row in 0..9 {
            assert_eq!(left.get(8, row), right.get(0, row));
        }
    }

    #[test]
    fn absent_unavailable_and_hole_tiles() {
        let source = MemoryTileSource::new(4, 4, 2, |_, _| 1.0)
            .without_tile("root/1".parse().unwrap())
            .with_unavailable_tile("root/2".parse().unwrap())
            .with_hole("root/3".parse().unwrap());

        assert!(!source.tile_exists(&"root/1".parse().unwrap()));
        assert!(source.tile_exists(&"root/2".parse().unwrap()));
        assert!(source.get_tile(&"root/2".parse().unwrap()).is_none());
        assert!(source
            .get_tile(&"root/3".parse().unwrap())
            .unwrap()
            .is_all_missing());
        assert!(!source.tile_exists(&"root/4/1".parse().unwrap()));
    }
}
