//! Adaptive quadtree terrain with view-dependent level of detail.
//!
//! A [`Terrain`] streams tiles of one elevation dataset from a [`TileSource`], refines and coarsens them as the
//! camera moves, and stitches their borders so the surface never cracks.

mod config;
mod terrain;

pub use config::Config;
pub use terrain::Terrain;

pub use quadscape_map::{
    CacheStats, ElevationGrid, LodCamera, MemoryTileSource, PerspectiveCamera, QuadTree, RasterMetadata,
    TerrainConfig, TerrainError, TileCache, TileKey, TileMesh, TileSource,
};

pub use quadscape_map as map;
