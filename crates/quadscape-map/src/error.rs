use crate::key::{Level, Quadrant, TileKey};
use crate::side::Side;

/// Failures of the terrain engine.
///
/// Absent tile data is not an error; it surfaces as `None` or a node without a mesh. The topology variants mean the
/// quadtree bookkeeping is corrupt and the current stitch pass must stop.
#[derive(thiserror::Error, Debug)]
pub enum TerrainError {
    #[error("tile {fine} at level {fine_level} cannot pull a {side:?} border from finer tile {coarse} at level {coarse_level}")]
    StitchDirection {
        fine: TileKey,
        fine_level: Level,
        coarse: TileKey,
        coarse_level: Level,
        side: Side,
    },
    #[error("{side:?} neighbor of {key} resolved to level {found}, finer than requested level {requested}")]
    NeighborLevel {
        key: TileKey,
        side: Side,
        requested: Level,
        found: Level,
    },
    #[error("quadrant {quadrant:?} does not border the {side:?} side")]
    QuadrantSide {
        quadrant: Option<Quadrant>,
        side: Side,
    },
    #[error("tile {key} has a {width}x{length} grid with {samples} samples, expected {expected_width}x{expected_length}")]
    GridShape {
        key: TileKey,
        width: usize,
        length: usize,
        samples: usize,
        expected_width: usize,
        expected_length: usize,
    },
    #[error("dataset {0:?} has no root tile")]
    MissingRoot(String),
    #[error("invalid tile key {0:?}")]
    InvalidKey(String),
}
