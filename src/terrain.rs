use crate::Config;

use quadscape_map::core::glam::{DVec2, Vec3};
use quadscape_map::{
    CacheStats, LodCamera, QuadTree, QuadTreeFactory, TerrainError, TileCache, TileKey, TileMesh, TileSource,
};
use std::sync::Arc;

/// One elevation dataset rendered as an adaptive quadtree.
///
/// Each frame the driver calls [`Terrain::update`] with the current camera and then hands the visible meshes to the
/// renderer through [`Terrain::visit_visible`]. Dropping the terrain stops its loaders and evicts its tiles.
pub struct Terrain {
    factory: QuadTreeFactory,
    root: Arc<QuadTree>,
}

impl Terrain {
    /// Opens a dataset with a cache of its own and loads the root tile.
    pub fn new(config: Config, source: Arc<dyn TileSource>) -> Result<Self, TerrainError> {
        let cache = Arc::new(TileCache::new(config.terrain.max_cache_bytes));
        Self::with_cache(config, source, cache)
    }

    /// Opens a dataset whose tiles live in a shared `cache`.
    pub fn with_cache(
        config: Config,
        source: Arc<dyn TileSource>,
        cache: Arc<TileCache>,
    ) -> Result<Self, TerrainError> {
        let factory = QuadTreeFactory::new(config.label, source, cache, config.terrain);
        let root = factory.create_root()?;
        log::debug!("Opened terrain {:?}", factory.label());

        Ok(Self { factory, root })
    }

    #[inline]
    pub fn root(&self) -> &Arc<QuadTree> {
        &self.root
    }

    #[inline]
    pub fn factory(&self) -> &QuadTreeFactory {
        &self.factory
    }

    pub fn label(&self) -> &str {
        self.factory.label()
    }

    /// Horizontal extent in scene units. The terrain is centered on the origin.
    pub fn size(&self) -> DVec2 {
        self.factory.terrain_size()
    }

    /// Splits and merges tiles for `camera`, then stitches every border that changed. Returns `true` if the set of
    /// visible tiles changed.
    pub fn update(&self, camera: &dyn LodCamera) -> Result<bool, TerrainError> {
        let changed = self.root.update(camera, &self.factory);
        if changed {
            self.stitch()?;
        }
        Ok(changed)
    }

    /// Runs a stitch pass over every level.
    pub fn stitch(&self) -> Result<(), TerrainError> {
        self.root.stitch_all()
    }

    pub fn deepest_level(&self) -> u8 {
        self.root.deepest_level()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.root.contains(x, y)
    }

    /// Bilinear elevation at `(x, y)`, in scene units. `NaN` off the terrain or over missing data.
    pub fn elevation(&self, x: f64, y: f64) -> f32 {
        self.root.elevation(x, y)
    }

    pub fn elevation_nearest(&self, x: f64, y: f64) -> f32 {
        self.root.elevation_nearest(x, y)
    }

    pub fn normal(&self, x: f64, y: f64) -> Option<Vec3> {
        self.root.normal(x, y)
    }

    /// Hands every visible tile mesh to `visitor` along with the tile center. Mesh vertices are relative to that center.
    pub fn visit_visible(&self, mut visitor: impl FnMut(&TileKey, &TileMesh, DVec2)) {
        self.root
            .visit_visible(&mut |node, mesh| visitor(node.key(), mesh, node.center()));
    }

    /// Loads a tile and its ancestors right away, e.g. to restore a saved view.
    pub fn jump_to(&self, key: &TileKey) -> Arc<QuadTree> {
        self.factory.get_by_key(key)
    }

    /// Blocks until every background load has finished.
    pub fn wait_for_loads(&self) {
        self.factory.wait_for_loads();
    }

    pub fn set_surface_color(&self, rgba: [f32; 4]) {
        self.factory.set_surface_color(rgba);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.factory.cache_stats()
    }
}
