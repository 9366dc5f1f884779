use super::QuadTree;
use crate::camera::LodCamera;
use crate::factory::{ChildLoad, QuadTreeFactory};

use std::sync::Arc;

impl QuadTree {
    /// Refines or coarsens this subtree for the current view. Returns `true` if any node split or merged.
    ///
    /// The screen pixel size is measured at the camera's look-at point when it lies on this tile and is closer than
    /// the tile center, and at the tile center otherwise. Scaled by the configured cell size, it is compared with this
    /// tile's ground sample distance: at least as coarse merges, at most half splits, anything between keeps the
    /// current shape and recurses.
    pub fn update(self: &Arc<Self>, camera: &dyn LodCamera, factory: &QuadTreeFactory) -> bool {
        if !self.state.is_in_use() {
            return false;
        }

        let points = self.test_points();
        let eye = camera.location();
        let look_at = camera.look_at();
        let mut reference = points.center;
        if points.contains(look_at.x, look_at.y)
            && eye.distance(look_at) < eye.distance(points.center)
        {
            reference = look_at;
        }

        let pix_size = camera.pixel_size_at(reference);
        if !(pix_size > 0.0) {
            return false;
        }
        let pix_size = pix_size * factory.config().cell_size;

        let children = self.children();
        if pix_size >= self.pixel_width() || camera.is_culled(&points.bounds()) {
            if children.is_some() {
                self.merge();
                return true;
            }
            false
        } else if pix_size <= 0.5 * self.pixel_width() {
            match children {
                Some(children) => update_children(&children, camera, factory),
                None => self.split(factory),
            }
        } else {
            match children {
                Some(children) => update_children(&children, camera, factory),
                None => false,
            }
        }
    }

    /// Replaces this leaf with its four children once all of them have meshes. Returns `true` if the children were
    /// attached.
    pub(crate) fn split(self: &Arc<Self>, factory: &QuadTreeFactory) -> bool {
        if self.state.is_highest_level() {
            return false;
        }
        match factory.load_children(self, false) {
            ChildLoad::HighestLevel => {
                log::debug!("Tile {} is at the highest level", self.key());
                self.state.set_highest_level();
                false
            }
            ChildLoad::Partial(ready) => {
                log::debug!("Deferring split of {}, {}/4 children ready", self.key(), ready);
                false
            }
            ChildLoad::Ready(children) => {
                log::debug!("Split tile {}", self.key());
                self.set_children(children);
                true
            }
        }
    }

    /// Drops the subtree and draws this node's own mesh again.
    pub(crate) fn merge(&self) {
        log::debug!("Merged tile {}", self.key());
        self.clear_children();
    }
}

fn update_children(
    children: &[Arc<QuadTree>; 4],
    camera: &dyn LodCamera,
    factory: &QuadTreeFactory,
) -> bool {
    // Every child updates, even after one of them changed.
    children
        .iter()
        .fold(false, |changed, child| child.update(camera, factory) | changed)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
