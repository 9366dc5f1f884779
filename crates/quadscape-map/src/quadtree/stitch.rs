//! Crack removal between neighboring tiles.
//!
//! Each level is stitched in two phases. First every leaf averages its pristine edges with its same-level leaf
//! neighbors. Then every leaf whose same-level neighbor has children pushes its border into the finer leaves along
//! that side: its own interior vertices go back to their pristine values, and each finer leaf copies them at every
//! `2^(level difference)`-th vertex and interpolates the vertices in between. The coarse and fine borders are then
//! equal at every vertex they share.
//!
//! Levels run finest first, so a corner that lies inside a coarser tile's edge takes that tile's value last. Any stitch
//! that rewrites a corner marks the leaf's other side through that corner dirty when a later pass will write it again.

use super::QuadTree;
use crate::error::TerrainError;
use crate::key::{Level, Quadrant};
use crate::side::Side;

use quadscape_core::glam::Vec3;
use std::sync::Arc;

impl QuadTree {
    /// Stitches the whole subtree, finest level first.
    pub fn stitch_all(self: &Arc<Self>) -> Result<(), TerrainError> {
        for level in (self.level()..=self.deepest_level()).rev() {
            self.stitch_level(level)?;
        }
        Ok(())
    }

    /// Stitches every leaf at `level` in this subtree to its neighbors.
    pub fn stitch_level(self: &Arc<Self>, level: Level) -> Result<(), TerrainError> {
        self.visit_leaves_at(level, &mut |leaf| leaf.stitch_equal_sides())?;
        self.visit_leaves_at(level, &mut |leaf| leaf.stitch_finer_sides())
    }

    fn visit_leaves_at<F>(self: &Arc<Self>, level: Level, f: &mut F) -> Result<(), TerrainError>
    where
        F: FnMut(&Arc<QuadTree>) -> Result<(), TerrainError>,
    {
        match self.children() {
            Some(children) => {
                if level > self.level() {
                    for child in children.iter() {
                        child.visit_leaves_at(level, f)?;
                    }
                }
            }
            None => {
                if level == self.level() {
                    f(self)?;
                }
            }
        }
        Ok(())
    }

    fn stitch_equal_sides(&self) -> Result<(), TerrainError> {
        if !self.is_stitchable() {
            return Ok(());
        }
        for side in Side::ALL {
            let Some(neighbor) = self.find_neighbor(side, self.level(), self.quadrant())? else {
                continue;
            };
            if neighbor.level() != self.level() || !neighbor.is_leaf() || !neighbor.is_stitchable() {
                continue;
            }
            if self.state.is_dirty(side) || neighbor.state.is_dirty(side.opposite()) {
                self.stitch_equal(side, &neighbor)?;
            }
            self.state.clear_dirty(side);
        }
        Ok(())
    }

    /// Pushes this leaf's borders into the finer leaves across every side whose same-level neighbor has children.
    ///
    /// A side is pushed when it or any of the finer leaves facing it is dirty; all of those leaves are then rewritten
    /// together so the vertices they share stay equal.
    fn stitch_finer_sides(&self) -> Result<(), TerrainError> {
        if !self.is_stitchable() {
            return Ok(());
        }
        for side in Side::ALL {
            let Some(neighbor) = self.find_neighbor(side, self.level(), self.quadrant())? else {
                continue;
            };
            if neighbor.level() != self.level() || neighbor.is_leaf() {
                continue;
            }
            let opposite = side.opposite();
            let mut leaves = Vec::new();
            neighbor.border_leaves(opposite, &mut leaves);
            if self.state.is_dirty(side) || leaves.iter().any(|leaf| leaf.state.is_dirty(opposite)) {
                self.modify_mesh(|mesh| mesh.restore_border(side));
                for leaf in leaves.iter() {
                    leaf.stitch_boundary(opposite, self)?;
                    leaf.state.clear_dirty(opposite);
                }
            }
            self.state.clear_dirty(side);
        }
        Ok(())
    }

    /// Collects the stitchable leaves of this subtree that lie along `side`.
    fn border_leaves(self: &Arc<Self>, side: Side, leaves: &mut Vec<Arc<QuadTree>>) {
        match self.children() {
            Some(children) => {
                for q in side.bordering() {
                    children[q.index()].border_leaves(side, leaves);
                }
            }
            None => {
                if self.is_stitchable() {
                    leaves.push(self.clone());
                }
            }
        }
    }

    /// Makes the `side` border of this leaf agree with the facing border of `neighbor`.
    pub fn stitch_boundary(&self, side: Side, neighbor: &QuadTree) -> Result<(), TerrainError> {
        if self.level() == neighbor.level() {
            self.stitch_equal(side, neighbor)
        } else if self.level() > neighbor.level() {
            self.stitch_finer(side, neighbor)
        } else {
            log::error!(
                "Tile {} tried to stitch its {:?} border from finer tile {}",
                self.key(),
                side,
                neighbor.key()
            );
            Err(TerrainError::StitchDirection {
                fine: self.key().clone(),
                fine_level: self.level(),
                coarse: neighbor.key().clone(),
                coarse_level: neighbor.level(),
                side,
            })
        }
    }

    fn stitch_equal(&self, side: Side, neighbor: &QuadTree) -> Result<(), TerrainError> {
        let opposite = side.opposite();
        let Some((theirs, their_normals)) = neighbor.mesh().map(|m| {
            let m = m.as_ref();
            (m.edge(opposite).to_vec(), m.edge_normals(opposite).to_vec())
        }) else {
            return Ok(());
        };
        let Some((mine, my_normals)) = self.mesh().map(|m| {
            let m = m.as_ref();
            (m.edge(side).to_vec(), m.edge_normals(side).to_vec())
        }) else {
            return Ok(());
        };
        if mine.len() != theirs.len() {
            log::warn!(
                "Tiles {} and {} have {} and {} border vertices",
                self.key(),
                neighbor.key(),
                mine.len(),
                theirs.len()
            );
            return Ok(());
        }

        let shared: Vec<(f32, Vec3)> = mine
            .iter()
            .zip(theirs.iter())
            .zip(my_normals.iter().zip(their_normals.iter()))
            .map(|((&a, &b), (&na, &nb))| (0.5 * (a + b), (na + nb).try_normalize().unwrap_or(na)))
            .collect();

        for (node, border) in [(self, side), (neighbor, opposite)] {
            node.modify_mesh(|mesh| {
                for (i, &(z, n)) in shared.iter().enumerate() {
                    mesh.set_border_vertex(border, i, z, n);
                }
            });
        }
        neighbor.state.clear_dirty(opposite);

        // The corners now hold the average; coarser edges and finer leaves that meet them must be written again.
        self.mark_corner_sides(side, self.level(), true)?;
        neighbor.mark_corner_sides(opposite, neighbor.level(), true)
    }

    fn stitch_finer(&self, side: Side, neighbor: &QuadTree) -> Result<(), TerrainError> {
        let level_diff = self.level() - neighbor.level();
        let Some(span) = self.mesh().map(|m| m.as_ref().border_len(side) - 1) else {
            return Ok(());
        };
        let stride = 1usize << level_diff;
        if stride > span || span % stride != 0 {
            log::warn!(
                "Cannot stitch {} to {}: {} border cells do not divide into steps of {}",
                self.key(),
                neighbor.key(),
                span,
                stride
            );
            return Ok(());
        }

        let count = span / stride;
        let start = self.edge_offset(side, neighbor.level(), span);
        let opposite = side.opposite();
        let Some((coarse, coarse_normals)) = neighbor.mesh().and_then(|m| {
            let m = m.as_ref();
            let end = start + count + 1;
            let edge = m.border_elevations(opposite).get(start..end)?.to_vec();
            let normals = m.border_normals(opposite).get(start..end)?.to_vec();
            Some((edge, normals))
        }) else {
            log::warn!(
                "Tile {} has no {:?} border samples for {}",
                neighbor.key(),
                opposite,
                self.key()
            );
            return Ok(());
        };

        self.modify_mesh(|mesh| {
            for k in 0..count {
                let (z0, z1) = (coarse[k], coarse[k + 1]);
                let (n0, n1) = (coarse_normals[k], coarse_normals[k + 1]);
                for j in 0..stride {
                    let t = j as f32 / stride as f32;
                    let z = z0 + (z1 - z0) * t;
                    let n = n0.lerp(n1, t).try_normalize().unwrap_or(n0);
                    mesh.set_border_vertex(side, k * stride + j, z, n);
                }
            }
            mesh.set_border_vertex(side, span, coarse[count], coarse_normals[count]);
        });

        self.mark_corner_sides(side, neighbor.level(), false)
    }

    /// Marks dirty each side through the corners of `side` that faces a leaf coarser than `coarser_than`, and, with
    /// `composites`, each that faces a same-level node with children.
    fn mark_corner_sides(&self, side: Side, coarser_than: Level, composites: bool) -> Result<(), TerrainError> {
        for other in Side::ALL {
            if other.is_vertical() == side.is_vertical() {
                continue;
            }
            if let Some(neighbor) = self.find_neighbor(other, self.level(), self.quadrant())? {
                if neighbor.level() < coarser_than || (composites && !neighbor.is_leaf()) {
                    self.state.mark_dirty(other);
                }
            }
        }
        Ok(())
    }

    /// Index of the first sample of a coarser neighbor's edge that faces this tile's `side`.
    ///
    /// Each ancestor below `coarse_level` that lies in the far half of its parent's side shifts the window by half of
    /// the remaining span.
    fn edge_offset(&self, side: Side, coarse_level: Level, span: usize) -> usize {
        let far: Quadrant = side.far_quadrant();
        (coarse_level + 1..=self.level())
            .filter(|&level| self.key().quadrant_at_level(level) == Some(far))
            .map(|level| span >> (level - coarse_level))
            .sum()
    }

    /// Finds the node across `side` at `level`, or the coarser leaf covering that area.
    ///
    /// `quadrant` is the quadrant of the child on whose behalf the search runs, used to pick the right child of a
    /// composite neighbor.
    pub(crate) fn find_neighbor(
        &self,
        side: Side,
        level: Level,
        quadrant: Option<Quadrant>,
    ) -> Result<Option<Arc<QuadTree>>, TerrainError> {
        let neighbor = match self.neighbor(side) {
            Some(n) => Some(n),
            None => match self.parent() {
                Some(parent) => parent.find_neighbor(side, level, self.quadrant())?,
                None => None,
            },
        };
        let Some(neighbor) = neighbor else {
            return Ok(None);
        };

        if neighbor.level() < level {
            match neighbor.children() {
                Some(children) => {
                    let across = quadrant.and_then(|q| side.across(q)).ok_or_else(|| {
                        log::error!("Quadrant {:?} does not border {:?}", quadrant, side);
                        TerrainError::QuadrantSide { quadrant, side }
                    })?;
                    Ok(Some(children[across.index()].clone()))
                }
                None => Ok(Some(neighbor)),
            }
        } else if neighbor.level() > level {
            log::error!(
                "{:?} neighbor of {} is at level {}, expected at most {}",
                side,
                self.key(),
                neighbor.level(),
                level
            );
            Err(TerrainError::NeighborLevel {
                key: self.key().clone(),
                side,
                requested: level,
                found: neighbor.level(),
            })
        } else {
            Ok(Some(neighbor))
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
