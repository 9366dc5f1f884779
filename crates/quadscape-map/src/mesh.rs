//! Renderable terrain tiles.
//!
//! A [`TileMesh`] is a grid of `(tile_width + 1) x (tile_length + 1)` vertices centered on its tile, drawn as one
//! triangle strip per row of cells. Vertex `0` is the upper-left corner and rows run from north to south.
//!
//! Each mesh keeps a pristine copy of its four border rows of elevations and normals. Stitching reads neighbors from
//! these copies so a border can be rewritten any number of times without drifting.

mod builder;

pub use builder::MeshBuilder;

use crate::side::Side;

use quadscape_core::glam::Vec3;

/// Color of vertices whose source sample is missing.
pub const MISSING_COLOR: [f32; 4] = [0.0; 4];

#[derive(Clone, Debug)]
pub struct TileMesh {
    tile_width: usize,
    tile_length: usize,
    pixel_width: f64,
    pixel_length: f64,
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    colors: Vec<[f32; 4]>,
    tex_coords: Vec<[f32; 2]>,
    missing: Vec<bool>,
    indices: Vec<u32>,
    strip_lengths: Vec<u32>,
    empty: bool,
    z_range: [f32; 2],
    edges: [Vec<f32>; 4],
    edge_normals: [Vec<Vec3>; 4],
}

impl TileMesh {
    /// A flat quad standing in for a tile whose samples are all missing.
    pub(crate) fn new_empty(
        tile_width: usize,
        tile_length: usize,
        pixel_width: f64,
        pixel_length: f64,
        z: f32,
    ) -> Self {
        let half_w = (0.5 * tile_width as f64 * pixel_width) as f32;
        let half_l = (0.5 * tile_length as f64 * pixel_length) as f32;
        Self {
            tile_width,
            tile_length,
            pixel_width,
            pixel_length,
            // Upper-left, lower-left, lower-right, upper-right.
            positions: vec![
                [-half_w, half_l, z],
                [-half_w, -half_l, z],
                [half_w, -half_l, z],
                [half_w, half_l, z],
            ],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            colors: vec![MISSING_COLOR; 4],
            tex_coords: vec![[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]],
            missing: vec![true; 4],
            indices: vec![0, 1, 3, 2],
            strip_lengths: vec![4],
            empty: true,
            z_range: [z, z],
            edges: Default::default(),
            edge_normals: Default::default(),
        }
    }

    /// True when every source sample was missing and this mesh is a degenerate quad.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    #[inline]
    pub fn tile_width(&self) -> usize {
        self.tile_width
    }

    #[inline]
    pub fn tile_length(&self) -> usize {
        self.tile_length
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
    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    #[inline]
    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    #[inline]
    pub fn colors(&self) -> &[[f32; 4]] {
        &self.colors
    }

    #[inline]
    pub fn tex_coords(&self) -> &[[f32; 2]] {
        &self.tex_coords
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Index count of each triangle strip, in draw order.
    #[inline]
    pub fn strip_lengths(&self) -> &[u32] {
        &self.strip_lengths
    }

    /// Minimum and maximum vertex Z.
    #[inline]
    pub fn z_range(&self) -> [f32; 2] {
        self.z_range
    }

    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    #[inline]
    fn columns(&self) -> usize {
        self.tile_width + 1
    }

    #[inline]
    pub fn vertex_index(&self, col: usize, row: usize) -> usize {
        row * self.columns() + col
    }

    #[inline]
    fn in_grid(&self, col: usize, row: usize) -> bool {
        !self.empty && col <= self.tile_width && row <= self.tile_length
    }

    /// Vertex Z at `(col, row)`. Panics outside the grid or on an empty mesh.
    #[inline]
    pub fn elevation(&self, col: usize, row: usize) -> f32 {
        self.positions[self.vertex_index(col, row)][2]
    }

    #[inline]
    pub fn normal(&self, col: usize, row: usize) -> Vec3 {
        Vec3::from(self.normals[self.vertex_index(col, row)])
    }

    #[inline]
    pub fn is_missing(&self, col: usize, row: usize) -> bool {
        self.missing[self.vertex_index(col, row)]
    }

    /// Number of vertices along `side`.
    #[inline]
    pub fn border_len(&self, side: Side) -> usize {
        if side.is_vertical() {
            self.tile_length + 1
        } else {
            self.tile_width + 1
        }
    }

    /// Vertex index of the `i`-th vertex along `side`. Vertical sides run north to south, horizontal ones west to east.
    pub fn border_vertex(&self, side: Side, i: usize) -> usize {
        match side {
            Side::Left => self.vertex_index(0, i),
            Side::Right => self.vertex_index(self.tile_width, i),
            Side::Top => self.vertex_index(i, 0),
            Side::Bottom => self.vertex_index(i, self.tile_length),
        }
    }

    /// Pristine border elevations, as built from the source. Empty for an empty mesh.
    #[inline]
    pub fn edge(&self, side: Side) -> &[f32] {
        &self.edges[side.index()]
    }

    #[inline]
    pub fn edge_normals(&self, side: Side) -> &[Vec3] {
        &self.edge_normals[side.index()]
    }

    /// The current border elevations, including any stitching.
    pub fn border_elevations(&self, side: Side) -> Vec<f32> {
        if self.empty {
            return Vec::new();
        }
        (0..self.border_len(side))
            .map(|i| self.positions[self.border_vertex(side, i)][2])
            .collect()
    }

    pub fn border_normals(&self, side: Side) -> Vec<Vec3> {
        if self.empty {
            return Vec::new();
        }
        (0..self.border_len(side))
            .map(|i| Vec3::from(self.normals[self.border_vertex(side, i)]))
            .collect()
    }

    /// Overwrites the `i`-th vertex along `side`.
    pub fn set_border_vertex(&mut self, side: Side, i: usize, z: f32, normal: Vec3) {
        if self.empty {
            return;
        }
        let v = self.border_vertex(side, i);
        self.positions[v][2] = z;
        self.normals[v] = normal.into();
        self.z_range[0] = self.z_range[0].min(z);
        self.z_range[1] = self.z_range[1].max(z);
    }

    /// Resets the interior vertices along `side` to their pristine values. The two corners keep what stitching gave
    /// them.
    pub(crate) fn restore_border(&mut self, side: Side) {
        if self.empty {
            return;
        }
        let edge = self.edges[side.index()].clone();
        let normals = self.edge_normals[side.index()].clone();
        let last = edge.len().saturating_sub(1);
        for (i, (&z, &n)) in edge.iter().zip(normals.iter()).enumerate().take(last).skip(1) {
            self.set_border_vertex(side, i, z, n);
        }
    }

    pub(crate) fn cache_edges(&mut self) {
        if self.empty {
            return;
        }
        for side in Side::ALL {
            self.edges[side.index()] = self.border_elevations(side);
            self.edge_normals[side.index()] = self.border_normals(side);
        }
    }

    /// Recolors every vertex that has data.
    pub fn set_surface_color(&mut self, rgba: [f32; 4]) {
        for (color, &missing) in self.colors.iter_mut().zip(self.missing.iter()) {
            if !missing {
                *color = rgba;
            }
        }
    }

    /// Bilinear elevation at `(dx, dy)` measured from the lower-left corner of the tile.
    ///
    /// `NaN` outside the tile, over missing samples, or on an empty mesh.
    pub fn elevation_bilinear(&self, dx: f64, dy: f64) -> f32 {
        let Some((col, row)) = self.grid_coords(dx, dy) else {
            return f32::NAN;
        };
        let c0 = (col.floor() as usize).min(self.tile_width - 1);
        let r0 = (row.floor() as usize).min(self.tile_length - 1);
        let fx = (col - c0 as f64) as f32;
        let fy = (row - r0 as f64) as f32;

        let corners = [(c0, r0), (c0 + 1, r0), (c0, r0 + 1), (c0 + 1, r0 + 1)];
        if corners.iter().any(|&(c, r)| self.is_missing(c, r)) {
            return f32::NAN;
        }
        let [z00, z10, z01, z11] = corners.map(|(c, r)| self.elevation(c, r));
        let top = z00 + (z10 - z00) * fx;
        let bottom = z01 + (z11 - z01) * fx;
        top + (bottom - top) * fy
    }

    /// Elevation of the vertex nearest to `(dx, dy)`, measured from the lower-left corner.
    pub fn elevation_nearest(&self, dx: f64, dy: f64) -> f32 {
        let Some((col, row)) = self.grid_coords(dx, dy) else {
            return f32::NAN;
        };
        let (col, row) = (col.round() as usize, row.round() as usize);
        if self.is_missing(col, row) {
            return f32::NAN;
        }
        self.elevation(col, row)
    }

    /// Normal of the grid cell containing `(dx, dy)`, measured from the lower-left corner.
    pub fn normal_at(&self, dx: f64, dy: f64) -> Option<Vec3> {
        if self.empty || !(dx >= 0.0 && dy >= 0.0) {
            return None;
        }
        let col = (dx / self.pixel_width).floor() as usize;
        let row = self
            .tile_length
            .checked_sub((dy / self.pixel_length).floor() as usize)?;
        self.in_grid(col, row).then(|| self.normal(col, row))
    }

    /// Fractional `(col, row)` of a point measured from the lower-left corner, if it lies on the tile.
    fn grid_coords(&self, dx: f64, dy: f64) -> Option<(f64, f64)> {
        if self.empty || self.tile_width == 0 || self.tile_length == 0 {
            return None;
        }
        let col = dx / self.pixel_width;
        let row = self.tile_length as f64 - dy / self.pixel_length;
        let inside = (0.0..=self.tile_width as f64).contains(&col)
            && (0.0..=self.tile_length as f64).contains(&row);
        inside.then(|| (col, row))
    }
}
