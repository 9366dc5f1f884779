mod loader;

pub use loader::TileLoader;

use crate::cache::{CacheStats, TileCache};
use crate::config::TerrainConfig;
use crate::error::TerrainError;
use crate::key::{Quadrant, TileKey};
use crate::mesh::MeshBuilder;
use crate::quadtree::QuadTree;
use crate::side::{Side, SIBLING_NEIGHBORS};
use crate::source::{RasterMetadata, TileSource};

use quadscape_core::glam::{DVec2, DVec3};
use std::sync::{Arc, Weak};

/// Outcome of [`QuadTreeFactory::load_children`].
pub enum ChildLoad {
    /// No finer tiles exist.
    HighestLevel,
    /// Only this many of the four children have meshes so far.
    Partial(usize),
    /// All four children have meshes and are wired to each other.
    Ready([Arc<QuadTree>; 4]),
}

/// Materializes [`QuadTree`] nodes of one dataset, going through the [`TileCache`] first.
///
/// A node is inserted into the cache before its mesh is loaded, so concurrent requests for the same key share one
/// node and one load.
pub struct QuadTreeFactory {
    label: Arc<str>,
    source: Arc<dyn TileSource>,
    cache: Arc<TileCache>,
    builder: Arc<MeshBuilder>,
    loader: TileLoader,
    config: TerrainConfig,
    metadata: RasterMetadata,
    bytes_per_tile: usize,
    /// Minimum elevation in scene units.
    min_elevation: f64,
}

impl QuadTreeFactory {
    pub fn new(
        label: impl Into<Arc<str>>,
        source: Arc<dyn TileSource>,
        cache: Arc<TileCache>,
        config: TerrainConfig,
    ) -> Self {
        let metadata = source.metadata().clone();
        let bytes_per_tile = Self::tile_footprint(
            metadata.tile_width,
            metadata.tile_length,
            &config.layer_bytes_per_tile,
        );
        let builder = Arc::new(MeshBuilder::new(&metadata, &config));
        let loader = TileLoader::new(config.loader_threads);
        let min_elevation = metadata.min_elevation * config.pixel_scale;
        let label = label.into();
        log::debug!(
            "Tile factory for {:?}: {}x{} tiles, {} bytes each, {} loader threads",
            label,
            metadata.tile_width,
            metadata.tile_length,
            bytes_per_tile,
            loader.num_threads()
        );

        Self {
            label,
            source,
            cache,
            builder,
            loader,
            config,
            metadata,
            bytes_per_tile,
            min_elevation,
        }
    }

    /// Bytes held by one tile: 14 floats per cell plus the four border rows, and every draped layer.
    pub fn tile_footprint(tile_width: usize, tile_length: usize, layer_bytes: &[usize]) -> usize {
        let (w, l) = (tile_width, tile_length);
        (w * l * 14 + 2 * w + 2 * l) * 4 + layer_bytes.iter().sum::<usize>()
    }

    #[inline]
    pub fn label(&self) -> &Arc<str> {
        &self.label
    }

    #[inline]
    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    #[inline]
    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    #[inline]
    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    #[inline]
    pub fn bytes_per_tile(&self) -> usize {
        self.bytes_per_tile
    }

    /// Minimum terrain elevation in scene units.
    #[inline]
    pub fn min_elevation(&self) -> f64 {
        self.min_elevation
    }

    pub fn terrain_size(&self) -> DVec2 {
        self.metadata.terrain_size(self.config.pixel_scale)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Returns the cached node for `key`, or creates it and starts loading its mesh.
    ///
    /// The root always loads on the calling thread. Other tiles load there only if `synchronous`.
    pub fn get_or_create(
        &self,
        key: &TileKey,
        parent: Option<&Arc<QuadTree>>,
        translation: DVec3,
        pixel_width: f64,
        pixel_length: f64,
        synchronous: bool,
    ) -> Arc<QuadTree> {
        let (node, created) = self.cache.get_or_insert_with(&self.label, key, || {
            let center = self.metadata.tile_center(key, self.config.pixel_scale);
            Arc::new(QuadTree::new(
                key.clone(),
                parent.map_or_else(Weak::new, Arc::downgrade),
                translation,
                center,
                DVec2::new(pixel_width, pixel_length),
                (self.metadata.tile_width, self.metadata.tile_length),
                self.bytes_per_tile,
            ))
        });
        if created {
            self.load_mesh(&node, synchronous || key.is_root());
        }
        node
    }

    /// Loads the root tile and puts it in use.
    pub fn create_root(&self) -> Result<Arc<QuadTree>, TerrainError> {
        let key = TileKey::root();
        if !self.source.tile_exists(&key) {
            return Err(TerrainError::MissingRoot(self.label.to_string()));
        }
        let pixel = self.metadata.pixel_size(0, self.config.pixel_scale);
        let root = self.get_or_create(&key, None, DVec3::ZERO, pixel.x, pixel.y, true);
        root.state.set_in_use(true);
        Ok(root)
    }

    /// Materializes any tile from its key alone, loading it and its ancestors on the calling thread.
    pub fn get_by_key(&self, key: &TileKey) -> Arc<QuadTree> {
        let parent = key.parent().map(|parent_key| self.get_by_key(&parent_key));
        let node = self.get_child(key, parent.as_ref(), true);
        if let Some(parent) = parent.as_ref() {
            node.set_parent(parent);
        }
        node
    }

    /// Requests all four children of `parent`.
    ///
    /// Children are wired together and put in use only once every one of them has a mesh; otherwise the split is left
    /// for a later frame.
    pub fn load_children(&self, parent: &Arc<QuadTree>, synchronous: bool) -> ChildLoad {
        let level = parent.level() + 1;
        let first_child = parent.key().child(Quadrant::UpperLeft);
        if level >= self.config.max_levels || !self.source.tile_exists(&first_child) {
            return ChildLoad::HighestLevel;
        }

        let children = Quadrant::ALL.map(|q| {
            let child = self.get_child(&parent.key().child(q), Some(parent), synchronous);
            child.set_parent(parent);
            child
        });
        let ready = children.iter().filter(|c| c.has_mesh()).count();
        if ready < 4 {
            return ChildLoad::Partial(ready);
        }

        for q in Quadrant::ALL {
            let links = Side::ALL.map(|side| {
                SIBLING_NEIGHBORS[q.index()][side.index()]
                    .map_or_else(Weak::new, |n| Arc::downgrade(&children[n.index()]))
            });
            children[q.index()].set_neighbors(links);
            children[q.index()].state.set_in_use(true);
        }
        ChildLoad::Ready(children)
    }

    fn get_child(
        &self,
        key: &TileKey,
        parent: Option<&Arc<QuadTree>>,
        synchronous: bool,
    ) -> Arc<QuadTree> {
        let scale = self.config.pixel_scale;
        let pixel = self.metadata.pixel_size(key.level(), scale);
        let translation = match parent {
            Some(parent) => (self.metadata.tile_center(key, scale) - parent.center()).extend(0.0),
            None => DVec3::ZERO,
        };
        self.get_or_create(key, parent, translation, pixel.x, pixel.y, synchronous)
    }

    fn load_mesh(&self, node: &Arc<QuadTree>, synchronous: bool) {
        if !node.state.start_loading() {
            return;
        }
        let source = self.source.clone();
        let builder = self.builder.clone();
        let node = node.clone();
        let min_elevation = self.min_elevation;
        let job = move || load_tile(source.as_ref(), &builder, &node, min_elevation);
        if synchronous {
            job();
        } else {
            self.loader.spawn(job);
        }
    }

    /// Blocks until every background load has finished.
    pub fn wait_for_loads(&self) {
        self.loader.wait_idle();
    }

    /// Recolors every cached mesh of this dataset and all future ones.
    pub fn set_surface_color(&self, rgba: [f32; 4]) {
        self.builder.set_surface_color(rgba);
        self.cache.for_each_tile(&self.label, |node| {
            node.modify_mesh(|mesh| mesh.set_surface_color(rgba));
        });
    }

    /// Stops the loaders and drops every cached tile of this dataset.
    pub fn dispose(&mut self) {
        self.loader.shutdown();
        self.cache.clear(&self.label);
    }
}

impl Drop for QuadTreeFactory {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn load_tile(source: &dyn TileSource, builder: &MeshBuilder, node: &QuadTree, min_elevation: f64) {
    match source.get_tile(node.key()) {
        Some(grid) => {
            match builder.build(node.key(), &grid, node.pixel_width(), node.pixel_length()) {
                Ok(mesh) => {
                    node.set_mesh(mesh, min_elevation);
                    log::debug!("Loaded tile {}", node.key());
                }
                Err(e) => log::warn!("Failed to build tile {}: {}", node.key(), e),
            }
        }
        None => log::debug!("No samples for tile {}", node.key()),
    }
    node.state.finish_loading();
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
    use crate::source::MemoryTileSource;
    use crate::test_util::*;

    use quadscape_core::approx::assert_relative_eq;

    #[test]
    fn tile_footprint_formula() {
        assert_eq!(QuadTreeFactory::tile_footprint(32, 32, &[]), (32 * 32 * 14 + 128) * 4);
        assert_eq!(
            QuadTreeFactory::tile_footprint(256, 128, &[1000, 24]),
            (256 * 128 * 14 + 512 + 256) * 4 + 1024
        );

        let config = TerrainConfig {
            layer_bytes_per_tile: vec![64],
            ..inline_config()
        };
        let factory = factory(MemoryTileSource::new(8, 4, 1, rolling_hills), config);
        assert_eq!(factory.bytes_per_tile(), (8 * 4 * 14 + 16 + 8) * 4 + 64);
        let root = root(&factory);
        assert_eq!(root.size_in_bytes(), factory.bytes_per_tile());
        assert_eq!(factory.cache_stats().bytes, factory.bytes_per_tile());
    }

    #[test]
    fn missing_root_is_an_error() {
        let source = MemoryTileSource::new(8, 8, 2, rolling_hills).without_tile(TileKey::root());
        let factory = factory(source, inline_config());
        assert!(matches!(
            factory.create_root(),
            Err(TerrainError::MissingRoot(_))
        ));
    }

    #[test]
    fn jump_to_a_deep_tile() {
        let factory = factory(MemoryTileSource::new(8, 8, 4, rolling_hills), inline_config());
        let key: TileKey = "root/2/3/4".parse().unwrap();
        let node = factory.get_by_key(&key);

        assert!(node.has_mesh());
        assert_eq!(node.level(), 3);
        assert_eq!(node.quadrant(), Some(Quadrant::LowerRight));
        assert_relative_eq!(node.pixel_width(), 1.0);

        // Terrain is 64 wide: centers at (16, 16), then (8, 8), then (12, 4).
        assert_relative_eq!(node.center().x, 12.0);
        assert_relative_eq!(node.center().y, 4.0);
        let parent = node.parent().unwrap();
        assert_eq!(parent.key().to_string(), "root/2/3");
        assert_relative_eq!(node.translation().x, 4.0);
        assert_relative_eq!(node.translation().y, -4.0);
        assert!(node.contains(8.0, 3.0));
        assert!(!node.contains(7.9, 3.0));

        assert_eq!(factory.cache().len(), 4);
        assert!(Arc::ptr_eq(&factory.get_by_key(&key), &node));
    }

    #[test]
    fn corners_take_mesh_elevations() {
        let source = MemoryTileSource::new(4, 4, 1, |x, y| (x + 10.0 * y) as f32 + 100.0)
            .with_min_elevation(50.0);
        let config = TerrainConfig {
            pixel_scale: 2.0,
            ..inline_config()
        };
        let factory = factory(source, config);
        let root = root(&factory);
        let points = root.test_points();

        // Terrain is 8x8 scene units; samples span -2..2 in source units.
        let z = |x: f64, y: f64| (x + 10.0 * y + 100.0) * 2.0 - 100.0;
        assert_relative_eq!(points.corners[0].z, z(-2.0, -2.0));
        assert_relative_eq!(points.corners[1].z, z(2.0, -2.0));
        assert_relative_eq!(points.corners[2].z, z(2.0, 2.0));
        assert_relative_eq!(points.corners[3].z, z(-2.0, 2.0));
        assert_relative_eq!(points.center.z, z(0.0, 0.0));
        assert_relative_eq!(points.corners[0].x, -4.0);
        assert_relative_eq!(points.corners[2].y, 4.0);

        let bounds = root.bounds();
        assert_relative_eq!(bounds.min.z, z(-2.0, -2.0));
        assert_relative_eq!(bounds.max.z, z(2.0, 2.0));
    }

    #[test]
    fn surface_color_reaches_cached_meshes() {
        let factory = factory(MemoryTileSource::new(4, 4, 2, rolling_hills), inline_config());
        let root = root(&factory);
        let child = factory.get_by_key(&"root/1".parse().unwrap());

        factory.set_surface_color([0.2, 0.4, 0.6, 1.0]);
        for node in [&root, &child] {
            let mesh = node.mesh().unwrap();
            assert!(mesh.as_ref().colors().iter().all(|c| *c == [0.2, 0.4, 0.6, 1.0]));
        }
        let later = factory.get_by_key(&"root/4".parse().unwrap());
        assert_eq!(later.mesh().unwrap().as_ref().colors()[0], [0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn dispose_clears_the_dataset() {
        let cache = Arc::new(TileCache::new(1 << 20));
        let source: Arc<dyn TileSource> = Arc::new(MemoryTileSource::new(4, 4, 2, rolling_hills));
        let mut first = QuadTreeFactory::new("first", source.clone(), cache.clone(), inline_config());
        let second = QuadTreeFactory::new("second", source, cache.clone(), inline_config());
        let root = first.create_root().unwrap();
        second.create_root().unwrap();
        assert_eq!(cache.len(), 2);

        first.dispose();
        assert_eq!(cache.len(), 1);
        assert!(root.state().is_disposed());
        assert!(!root.has_mesh());

        drop(second);
        assert!(cache.is_empty());
    }
}
