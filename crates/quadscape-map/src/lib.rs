pub mod cache;
pub mod camera;
pub mod config;
pub mod error;
pub mod factory;
pub mod key;
pub mod mesh;
pub mod quadtree;
pub mod side;
pub mod source;

#[cfg(test)]
mod test_util;

pub use cache::{CacheStats, TileCache};
pub use camera::{LodCamera, PerspectiveCamera};
pub use config::TerrainConfig;
pub use error::TerrainError;
pub use factory::{ChildLoad, QuadTreeFactory, TileLoader};
pub use key::{Level, Quadrant, TileKey};
pub use mesh::{MeshBuilder, TileMesh};
pub use quadtree::{MeshGuard, NodeState, QuadTree, TestPoints};
pub use side::Side;
pub use source::{ElevationGrid, MemoryTileSource, RasterMetadata, TileSource};

pub use quadscape_core as core;
