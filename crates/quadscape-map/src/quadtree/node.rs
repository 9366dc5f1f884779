use crate::key::{Level, Quadrant, TileKey};
use crate::mesh::TileMesh;
use crate::side::Side;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use quadscape_core::bitset::AtomicBitset8;
use quadscape_core::geometry::Aabb;
use quadscape_core::glam::{DVec2, DVec3, Vec3};
use quadscape_core::static_assertions::const_assert_eq;
use std::mem;
use std::sync::{Arc, Weak};

/// One tile of the terrain hierarchy.
///
/// A node is either a leaf drawing its own mesh or a composite that delegates to exactly four children. Children are
/// owned through `Arc`s; the parent and neighbor links are `Weak` so the hierarchy never forms a reference cycle.
///
/// Mesh and child array are each behind their own `RwLock`, so background loaders, the frame thread and stitch passes
/// can touch one node concurrently. Flags live in an atomic bitset.
pub struct QuadTree {
    key: TileKey,
    translation: DVec3,
    center: DVec2,
    pixel_width: f64,
    pixel_length: f64,
    size_in_bytes: usize,
    parent: RwLock<Weak<QuadTree>>,
    pub(crate) state: NodeState,
    test_points: RwLock<TestPoints>,
    mesh: RwLock<Option<TileMesh>>,
    children: RwLock<Option<[Arc<QuadTree>; 4]>>,
    neighbors: RwLock<[Weak<QuadTree>; 4]>,
}

/// The corners and center of a tile, relative to the terrain center. Z is relative to the terrain's minimum elevation
/// once a mesh is published, and `0` before.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TestPoints {
    /// Lower-left, lower-right, upper-right, upper-left.
    pub corners: [DVec3; 4],
    pub center: DVec3,
    /// Z extent of the mesh.
    pub z_range: [f64; 2],
}

impl TestPoints {
    /// Builds the points of a `width x length` rectangle around `center` with zero Z.
    pub fn new(center: DVec2, width: f64, length: f64) -> Self {
        let (hw, hl) = (0.5 * width, 0.5 * length);
        let corner = |dx: f64, dy: f64| DVec3::new(center.x + dx, center.y + dy, 0.0);
        Self {
            corners: [
                corner(-hw, -hl),
                corner(hw, -hl),
                corner(hw, hl),
                corner(-hw, hl),
            ],
            center: center.extend(0.0),
            z_range: [0.0, 0.0],
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.bounds().contains_xy(DVec2::new(x, y))
    }

    pub fn bounds(&self) -> Aabb {
        let [lower_left, _, upper_right, _] = self.corners;
        Aabb::from_min_and_max(
            DVec3::new(lower_left.x, lower_left.y, self.z_range[0]),
            DVec3::new(upper_right.x, upper_right.y, self.z_range[1]),
        )
    }
}

impl QuadTree {
    /// A placeholder node without mesh or children. It is not in use until wired into the hierarchy.
    pub(crate) fn new(
        key: TileKey,
        parent: Weak<QuadTree>,
        translation: DVec3,
        center: DVec2,
        pixel_size: DVec2,
        tile_size: (usize, usize),
        size_in_bytes: usize,
    ) -> Self {
        let test_points = TestPoints::new(
            center,
            tile_size.0 as f64 * pixel_size.x,
            tile_size.1 as f64 * pixel_size.y,
        );
        Self {
            key,
            translation,
            center,
            pixel_width: pixel_size.x,
            pixel_length: pixel_size.y,
            size_in_bytes,
            parent: RwLock::new(parent),
            state: NodeState::default(),
            test_points: RwLock::new(test_points),
            mesh: RwLock::new(None),
            children: RwLock::new(None),
            neighbors: RwLock::new(Default::default()),
        }
    }

    #[inline]
    pub fn key(&self) -> &TileKey {
        &self.key
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.key.level()
    }

    #[inline]
    pub fn quadrant(&self) -> Option<Quadrant> {
        self.key.quadrant()
    }

    /// Offset of this tile's center from its parent's center.
    #[inline]
    pub fn translation(&self) -> DVec3 {
        self.translation
    }

    /// Center relative to the terrain center.
    #[inline]
    pub fn center(&self) -> DVec2 {
        self.center
    }

    #[inline]
    pub fn pixel_width(&self) -> f64 {
        self.pixel_width
    }

    #[inline]
    pub fn pixel_length(&self) -> f64 {
        self.pixel_length
    }

    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    #[inline]
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn parent(&self) -> Option<Arc<QuadTree>> {
        self.parent.read().upgrade()
    }

    /// A cached node can outlive the parent it was created under, so the link is refreshed on every reuse.
    pub(crate) fn set_parent(&self, parent: &Arc<QuadTree>) {
        *self.parent.write() = Arc::downgrade(parent);
    }

    pub fn test_points(&self) -> TestPoints {
        *self.test_points.read()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.test_points.read().contains(x, y)
    }

    pub fn bounds(&self) -> Aabb {
        self.test_points.read().bounds()
    }

    /// Publishes a freshly built mesh and lifts the test points onto it. Ignored once the node is disposed.
    ///
    /// `min_elevation` is in scene units.
    pub fn set_mesh(&self, mesh: TileMesh, min_elevation: f64) {
        let mut mesh_slot = self.mesh.write();
        if self.state.is_disposed() {
            return;
        }

        let (corner_z, center_z, z_range) = if mesh.is_empty() {
            let z = mesh.positions()[0][2] as f64;
            ([z; 4], z, [z, z])
        } else {
            let (w, l) = (mesh.tile_width(), mesh.tile_length());
            let z = |col, row| mesh.elevation(col, row) as f64 - min_elevation;
            let [lo, hi] = mesh.z_range();
            (
                [z(0, l), z(w, l), z(w, 0), z(0, 0)],
                z(w / 2, l / 2),
                [lo as f64 - min_elevation, hi as f64 - min_elevation],
            )
        };
        {
            let mut points = self.test_points.write();
            for (corner, z) in points.corners.iter_mut().zip(corner_z) {
                corner.z = z;
            }
            points.center.z = center_z;
            points.z_range = z_range;
        }

        *mesh_slot = Some(mesh);
    }

    pub fn has_mesh(&self) -> bool {
        self.mesh.read().is_some()
    }

    /// Read access to the mesh, if one has been published.
    pub fn mesh(&self) -> Option<MeshGuard<'_>> {
        RwLockReadGuard::try_map(self.mesh.read(), |m| m.as_ref())
            .ok()
            .map(|read_guard| MeshGuard { read_guard })
    }

    /// Runs `f` on the mesh under the write lock.
    pub fn modify_mesh<T>(&self, f: impl FnOnce(&mut TileMesh) -> T) -> Option<T> {
        self.mesh.write().as_mut().map(f)
    }

    /// A node can take part in stitching once it has a mesh with real data.
    pub fn is_stitchable(&self) -> bool {
        self.mesh.read().as_ref().map_or(false, |m| !m.is_empty())
    }

    pub fn children(&self) -> Option<[Arc<QuadTree>; 4]> {
        self.children.read().clone()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.read().is_none()
    }

    pub fn neighbor(&self, side: Side) -> Option<Arc<QuadTree>> {
        self.neighbors.read()[side.index()].upgrade()
    }

    pub(crate) fn set_neighbors(&self, neighbors: [Weak<QuadTree>; 4]) {
        *self.neighbors.write() = neighbors;
    }

    /// Makes `children` this node's subtree. Their borders must all be stitched again.
    pub(crate) fn set_children(&self, children: [Arc<QuadTree>; 4]) {
        for child in children.iter() {
            child.state.mark_all_dirty();
        }
        *self.children.write() = Some(children);
    }

    /// Detaches the whole subtree, turning this node back into a leaf. The detached nodes stay in the cache.
    pub(crate) fn clear_children(&self) {
        let children = self.children.write().take();
        if let Some(children) = children {
            for child in children.iter() {
                child.clear_children();
                child.state.set_in_use(false);
                child.state.clear_all_dirty();
            }
            self.state.mark_all_dirty();
        }
    }

    /// Drops the mesh and takes the node out of the hierarchy for good.
    pub fn dispose(&self) {
        let mut mesh_slot = self.mesh.write();
        self.state.state.set_bit(StateBit::Disposed as u8);
        self.state.set_in_use(false);
        *mesh_slot = None;
        drop(mesh_slot);
        log::debug!("Disposed tile {}", self.key);
    }

    /// Deepest level of any node in this subtree.
    pub fn deepest_level(&self) -> Level {
        match self.children() {
            Some(children) => children
                .iter()
                .map(|c| c.deepest_level())
                .max()
                .unwrap_or(self.level()),
            None => self.level(),
        }
    }

    /// Calls `visitor` for every in-use leaf of this subtree that has a mesh.
    pub fn visit_visible(&self, visitor: &mut impl FnMut(&QuadTree, &TileMesh)) {
        if !self.state.is_in_use() {
            return;
        }
        if let Some(children) = self.children() {
            for child in children.iter() {
                child.visit_visible(visitor);
            }
        } else if let Some(mesh) = self.mesh() {
            visitor(self, mesh.as_ref());
        }
    }

    /// The in-use leaf containing `(x, y)`.
    pub fn find_leaf(self: &Arc<Self>, x: f64, y: f64) -> Option<Arc<QuadTree>> {
        if !self.contains(x, y) {
            return None;
        }
        match self.children() {
            Some(children) => children.iter().find_map(|c| c.find_leaf(x, y)),
            None => Some(self.clone()),
        }
    }

    /// Bilinear terrain elevation at `(x, y)` relative to the terrain center. `NaN` where there is no data.
    pub fn elevation(self: &Arc<Self>, x: f64, y: f64) -> f32 {
        self.query_mesh(x, y, |mesh, dx, dy| mesh.elevation_bilinear(dx, dy))
            .unwrap_or(f32::NAN)
    }

    pub fn elevation_nearest(self: &Arc<Self>, x: f64, y: f64) -> f32 {
        self.query_mesh(x, y, |mesh, dx, dy| mesh.elevation_nearest(dx, dy))
            .unwrap_or(f32::NAN)
    }

    pub fn normal(self: &Arc<Self>, x: f64, y: f64) -> Option<Vec3> {
        self.query_mesh(x, y, |mesh, dx, dy| mesh.normal_at(dx, dy))
            .flatten()
    }

    fn query_mesh<T>(
        self: &Arc<Self>,
        x: f64,
        y: f64,
        f: impl FnOnce(&TileMesh, f64, f64) -> T,
    ) -> Option<T> {
        let leaf = self.find_leaf(x, y)?;
        let lower_left = leaf.test_points().corners[0];
        let mesh = leaf.mesh()?;
        Some(f(mesh.as_ref(), x - lower_left.x, y - lower_left.y))
    }
}

/// A [`TileMesh`] protected by a read lock on its node.
pub struct MeshGuard<'a> {
    read_guard: MappedRwLockReadGuard<'a, TileMesh>,
}

impl<'a> AsRef<TileMesh> for MeshGuard<'a> {
    fn as_ref(&self) -> &TileMesh {
        &self.read_guard
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub(crate) enum StateBit {
    /// This bit is set while the node is wired into the active hierarchy.
    InUse = 0,
    /// This bit is set if no finer tiles exist below this node.
    HighestLevel = 1,
    /// This bit is set while a loader is building this node's mesh.
    Loading = 2,
    /// This bit is set once the node has been evicted or torn down.
    Disposed = 3,
    DirtyLeft = 4,
    DirtyTop = 5,
    DirtyRight = 6,
    DirtyBottom = 7,
}

impl StateBit {
    const fn mask(&self) -> u8 {
        1 << *self as u8
    }

    const fn dirty(side: Side) -> Self {
        match side {
            Side::Left => StateBit::DirtyLeft,
            Side::Top => StateBit::DirtyTop,
            Side::Right => StateBit::DirtyRight,
            Side::Bottom => StateBit::DirtyBottom,
        }
    }
}

const ALL_DIRTY_MASK: u8 = StateBit::DirtyLeft.mask()
    | StateBit::DirtyTop.mask()
    | StateBit::DirtyRight.mask()
    | StateBit::DirtyBottom.mask();

#[derive(Default)]
pub struct NodeState {
    pub(crate) state: AtomicBitset8,
}

const_assert_eq!(mem::size_of::<NodeState>(), 1);

impl NodeState {
    #[inline]
    pub fn is_in_use(&self) -> bool {
        self.state.bit_is_set(StateBit::InUse as u8)
    }

    #[inline]
    pub fn is_highest_level(&self) -> bool {
        self.state.bit_is_set(StateBit::HighestLevel as u8)
    }

    #[inline]
    pub fn is_loading(&self) -> bool {
        self.state.bit_is_set(StateBit::Loading as u8)
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.state.bit_is_set(StateBit::Disposed as u8)
    }

    #[inline]
    pub fn is_dirty(&self, side: Side) -> bool {
        self.state.bit_is_set(StateBit::dirty(side) as u8)
    }

    #[inline]
    pub(crate) fn set_in_use(&self, in_use: bool) {
        self.state.assign_bit(StateBit::InUse as u8, in_use);
    }

    #[inline]
    pub(crate) fn set_highest_level(&self) {
        self.state.set_bit(StateBit::HighestLevel as u8);
    }

    /// Returns `true` if the node was not already loading.
    #[inline]
    pub(crate) fn start_loading(&self) -> bool {
        !self.state.fetch_and_set_bit(StateBit::Loading as u8)
    }

    #[inline]
    pub(crate) fn finish_loading(&self) {
        self.state.unset_bit(StateBit::Loading as u8);
    }

    #[inline]
    pub(crate) fn mark_dirty(&self, side: Side) {
        self.state.set_bit(StateBit::dirty(side) as u8);
    }

    #[inline]
    pub(crate) fn clear_dirty(&self, side: Side) {
        self.state.unset_bit(StateBit::dirty(side) as u8);
    }

    #[inline]
    pub(crate) fn mark_all_dirty(&self) {
        self.state.set_mask(ALL_DIRTY_MASK);
    }

    #[inline]
    pub(crate) fn clear_all_dirty(&self) {
        self.state.unset_mask(ALL_DIRTY_MASK);
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
    use crate::source::MemoryTileSource;
    use crate::test_util::*;

    use quadscape_core::approx::assert_relative_eq;

    #[test]
    fn queries_descend_to_leaves() {
        let factory = factory(
            MemoryTileSource::new(8, 8, 2, |x, y| (2.0 * x + y) as f32),
            inline_config(),
        );
        let root = root(&factory);
        assert_relative_eq!(root.elevation(1.0, 1.0), 3.0, epsilon = 1e-5);
        assert_relative_eq!(root.elevation_nearest(3.9, -0.1), 8.0);

        assert!(root.split(&factory));
        let leaf = root.find_leaf(1.0, 1.0).unwrap();
        assert_eq!(leaf.key().to_string(), "root/2");
        assert_relative_eq!(root.elevation(1.0, 1.0), 3.0);

        let n = root.normal(-3.0, 5.0).unwrap();
        let expected = Vec3::new(-2.0, -1.0, 1.0).normalize();
        assert_relative_eq!(n.dot(expected), 1.0, epsilon = 1e-5);

        assert!(root.elevation(8.5, 0.0).is_nan());
        assert!(root.elevation_nearest(0.0, -9.0).is_nan());
        assert!(root.normal(-100.0, 0.0).is_none());
    }

    #[test]
    fn visible_leaves_follow_splits() {
        let factory = factory(MemoryTileSource::new(8, 8, 2, rolling_hills), inline_config());
        let root = root(&factory);

        let mut visited = Vec::new();
        root.visit_visible(&mut |node, mesh| visited.push((node.key().clone(), mesh.positions().len())));
        assert_eq!(visited, vec![(TileKey::root(), 81)]);

        assert!(root.split(&factory));
        let mut keys = Vec::new();
        root.visit_visible(&mut |node, _| keys.push(node.key().to_string()));
        assert_eq!(keys, ["root/1", "root/2", "root/3", "root/4"]);

        root.merge();
        let mut count = 0;
        root.visit_visible(&mut |_, _| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn disposed_nodes_ignore_late_meshes() {
        let factory = factory(MemoryTileSource::new(4, 4, 2, rolling_hills), inline_config());
        let node = factory.get_by_key(&"root/3".parse().unwrap());
        let mesh = node.mesh().unwrap().as_ref().clone();
        node.dispose();
        assert!(!node.has_mesh());
        node.set_mesh(mesh, 0.0);
        assert!(!node.has_mesh());
    }

    #[test]
    fn readers_and_writers_share_a_node() {
        let factory = factory(MemoryTileSource::new(16, 16, 2, rolling_hills), inline_config());
        let root = root(&factory);
        assert!(root.split(&factory));
        let expected = root.elevation(3.0, -5.0);

        crossbeam::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|_| {
                    for _ in 0..100 {
                        assert_eq!(root.elevation(3.0, -5.0), expected);
                    }
                });
            }
            scope.spawn(|_| {
                for i in 0..100 {
                    factory.set_surface_color([i as f32 / 100.0, 0.0, 0.0, 1.0]);
                }
            });
        })
        .unwrap();

        let leaf = root.find_leaf(3.0, -5.0).unwrap();
        assert_eq!(leaf.mesh().unwrap().as_ref().colors()[0], [0.99, 0.0, 0.0, 1.0]);
    }
}
