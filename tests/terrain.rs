use quadscape::map::core::geometry::Aabb;
use quadscape::map::core::glam::DVec3;
use quadscape::map::Side;
use quadscape::{
    Config, LodCamera, MemoryTileSource, PerspectiveCamera, TerrainConfig, TerrainError, Terrain, TileCache, TileKey,
    TileSource,
};

use approx::assert_relative_eq;
use std::sync::Arc;

fn hills(x: f64, y: f64) -> f32 {
    (12.0 * (0.09 * x).sin() * (0.05 * y).cos() + 0.1 * x) as f32
}

fn config(label: &str) -> Config {
    Config {
        label: label.to_owned(),
        terrain: TerrainConfig {
            loader_threads: 0,
            ..Default::default()
        },
    }
}

/// A 64x64 terrain of 32x32 tiles: root pixels are 2 units wide, level 1 pixels 1 unit.
fn two_level_terrain(label: &str) -> Terrain {
    let source: Arc<dyn TileSource> = Arc::new(MemoryTileSource::new(32, 32, 2, hills));
    Terrain::new(config(label), source).unwrap()
}

fn overhead_camera(height: f64) -> PerspectiveCamera {
    PerspectiveCamera::new(
        DVec3::new(0.0, 0.0, height),
        DVec3::ZERO,
        std::f64::consts::FRAC_PI_2,
        [600, 600],
        0.1,
        10_000.0,
    )
}

struct FixedCamera(f64);

impl LodCamera for FixedCamera {
    fn location(&self) -> DVec3 {
        DVec3::new(0.0, 0.0, 100.0)
    }

    fn look_at(&self) -> DVec3 {
        DVec3::ZERO
    }

    fn pixel_size_at(&self, _point: DVec3) -> f64 {
        self.0
    }

    fn is_culled(&self, _bounds: &Aabb) -> bool {
        false
    }
}

#[test]
fn camera_descent_refines_and_ascent_coarsens() {
    let terrain = two_level_terrain("descent");
    assert_eq!(terrain.deepest_level(), 0);

    // One pixel covers 50 / 300 units at the look-at point, 2/3 of a unit after the cell size.
    assert!(terrain.update(&overhead_camera(50.0)).unwrap());
    assert_eq!(terrain.deepest_level(), 1);
    assert!(!terrain.update(&overhead_camera(50.0)).unwrap());

    let mut visible = Vec::new();
    terrain.visit_visible(|key, mesh, center| {
        assert_eq!(mesh.positions().len(), 33 * 33);
        visible.push((key.to_string(), center));
    });
    assert_eq!(visible.len(), 4);
    assert_eq!(visible[0].0, "root/1");
    assert_relative_eq!(visible[0].1.x, -16.0);
    assert_relative_eq!(visible[0].1.y, 16.0);

    assert!(terrain.update(&overhead_camera(500.0)).unwrap());
    assert_eq!(terrain.deepest_level(), 0);
    assert_eq!(terrain.cache_stats().entries, 5);
}

#[test]
fn split_children_keep_the_parent_border_samples() {
    let terrain = two_level_terrain("border");
    let (left, bottom) = {
        let mesh = terrain.root().mesh().unwrap();
        (mesh.as_ref().edge(Side::Left).to_vec(), mesh.as_ref().edge(Side::Bottom).to_vec())
    };

    assert!(terrain.update(&FixedCamera(0.25)).unwrap());

    let children = terrain.root().children().unwrap();
    let upper_left = children[0].mesh().unwrap();
    let lower_left = children[2].mesh().unwrap();
    let lower_right = children[3].mesh().unwrap();
    for i in 0..=16 {
        assert_eq!(upper_left.as_ref().elevation(0, 2 * i), left[i]);
        assert_eq!(lower_left.as_ref().elevation(0, 2 * i), left[16 + i]);
        assert_eq!(lower_left.as_ref().elevation(2 * i, 32), bottom[i]);
        assert_eq!(lower_right.as_ref().elevation(2 * i, 32), bottom[16 + i]);
    }

    // Siblings agree on every shared vertex.
    let upper_right = children[1].mesh().unwrap();
    assert_eq!(
        upper_left.as_ref().border_elevations(Side::Right),
        upper_right.as_ref().border_elevations(Side::Left)
    );
    assert_eq!(
        upper_left.as_ref().border_elevations(Side::Bottom),
        lower_left.as_ref().border_elevations(Side::Top)
    );
}

#[test]
fn queries_outside_the_terrain_are_nan() {
    let terrain = two_level_terrain("queries");
    assert_relative_eq!(terrain.size().x, 64.0);
    assert!(terrain.contains(31.0, -31.0));
    assert!(!terrain.contains(33.0, 0.0));

    let z = terrain.elevation(10.0, 4.0);
    assert_relative_eq!(z, hills(10.0, 4.0), epsilon = 0.5);
    assert!(terrain.elevation(40.0, 0.0).is_nan());
    assert!(terrain.elevation_nearest(0.0, 40.0).is_nan());
    assert!(terrain.normal(-40.0, 0.0).is_none());
    assert!(terrain.normal(1.0, 1.0).is_some());
}

#[test]
fn background_loading_settles() {
    let source: Arc<dyn TileSource> = Arc::new(MemoryTileSource::new(16, 16, 3, hills));
    let config = Config {
        label: "background".to_owned(),
        terrain: TerrainConfig {
            loader_threads: 3,
            ..Default::default()
        },
    };
    let terrain = Terrain::new(config, source).unwrap();
    let camera = FixedCamera(1e-4);

    for _ in 0..10 {
        terrain.update(&camera).unwrap();
        terrain.wait_for_loads();
    }
    assert_eq!(terrain.deepest_level(), 2);
    let mut leaves = 0;
    terrain.visit_visible(|key, _, _| {
        assert_eq!(key.level(), 2);
        leaves += 1;
    });
    assert_eq!(leaves, 16);
}

#[test]
fn jump_to_loads_ancestors() {
    let source: Arc<dyn TileSource> = Arc::new(MemoryTileSource::new(8, 8, 4, hills));
    let terrain = Terrain::new(config("jump"), source).unwrap();
    let key: TileKey = "root/4/1/2".parse().unwrap();
    let node = terrain.jump_to(&key);
    assert!(node.has_mesh());
    assert_eq!(node.parent().unwrap().key().to_string(), "root/4/1");
    assert_eq!(terrain.cache_stats().entries, 4);
}

#[test]
fn terrains_share_a_cache_until_dropped() {
    let cache = Arc::new(TileCache::new(1 << 24));
    let source: Arc<dyn TileSource> = Arc::new(MemoryTileSource::new(8, 8, 2, hills));
    let a = Terrain::with_cache(config("a"), source.clone(), cache.clone()).unwrap();
    let b = Terrain::with_cache(config("b"), source, cache.clone()).unwrap();
    assert!(a.update(&FixedCamera(0.01)).unwrap());
    assert_eq!(cache.len(), 6);

    drop(a);
    assert_eq!(cache.len(), 1);
    assert!(b.elevation(0.0, 0.0).is_finite());
}

#[test]
fn missing_dataset_is_reported() {
    let source: Arc<dyn TileSource> =
        Arc::new(MemoryTileSource::new(8, 8, 2, hills).without_tile(TileKey::root()));
    assert!(matches!(
        Terrain::new(config("missing"), source),
        Err(TerrainError::MissingRoot(_))
    ));
}

#[test]
fn config_reads_ron() {
    let path = std::env::temp_dir().join(format!("quadscape-config-{}.ron", std::process::id()));
    std::fs::write(
        &path,
        "(label: \"dem\", terrain: (cell_size: 2.0, max_cache_bytes: 1024, layer_bytes_per_tile: [16, 32]))",
    )
    .unwrap();
    let config = Config::read_file(path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.label, "dem");
    assert_relative_eq!(config.terrain.cell_size, 2.0);
    assert_eq!(config.terrain.max_cache_bytes, 1024);
    assert_eq!(config.terrain.layer_bytes_per_tile, vec![16, 32]);
    assert_eq!(config.terrain.loader_threads, 5);
    assert_eq!(config.terrain.max_levels, 24);

    assert!(Config::read_file("/nonexistent/quadscape.ron").is_err());
}
