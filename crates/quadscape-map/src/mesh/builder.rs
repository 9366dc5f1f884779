use super::{TileMesh, MISSING_COLOR};
use crate::config::TerrainConfig;
use crate::error::TerrainError;
use crate::key::TileKey;
use crate::source::{ElevationGrid, RasterMetadata};

use parking_lot::RwLock;
use quadscape_core::glam::Vec3;

/// Turns elevation grids into [`TileMesh`]es.
///
/// Shared by every loader thread of one dataset.
pub struct MeshBuilder {
    tile_width: usize,
    tile_length: usize,
    fill_value: f32,
    pixel_scale: f64,
    surface_color: RwLock<[f32; 4]>,
}

impl MeshBuilder {
    pub fn new(metadata: &RasterMetadata, config: &TerrainConfig) -> Self {
        Self {
            tile_width: metadata.tile_width,
            tile_length: metadata.tile_length,
            fill_value: metadata.fill_value,
            pixel_scale: config.pixel_scale,
            surface_color: RwLock::new(config.surface_color),
        }
    }

    pub fn surface_color(&self) -> [f32; 4] {
        *self.surface_color.read()
    }

    /// Affects meshes built from now on.
    pub fn set_surface_color(&self, rgba: [f32; 4]) {
        *self.surface_color.write() = rgba;
    }

    /// Builds the mesh of `key` from `grid`, with cells of `pixel_width x pixel_length` scene units.
    pub fn build(
        &self,
        key: &TileKey,
        grid: &ElevationGrid,
        pixel_width: f64,
        pixel_length: f64,
    ) -> Result<TileMesh, TerrainError> {
        let columns = self.tile_width + 1;
        let rows = self.tile_length + 1;
        if grid.columns() != columns || grid.rows() != rows || grid.samples().len() != columns * rows {
            log::warn!("Rejecting mis-shaped grid for tile {}", key);
            return Err(TerrainError::GridShape {
                key: key.clone(),
                width: grid.columns(),
                length: grid.rows(),
                samples: grid.samples().len(),
                expected_width: columns,
                expected_length: rows,
            });
        }

        let fill_z = (self.fill_value as f64 * self.pixel_scale) as f32;
        if grid.is_all_missing() {
            log::debug!("Tile {} has no data, using an empty quad", key);
            return Ok(TileMesh::new_empty(
                self.tile_width,
                self.tile_length,
                pixel_width,
                pixel_length,
                fill_z,
            ));
        }

        let surface_color = self.surface_color();
        let vertex_count = columns * rows;
        let half_w = 0.5 * self.tile_width as f64 * pixel_width;
        let half_l = 0.5 * self.tile_length as f64 * pixel_length;

        let mut positions = Vec::with_capacity(vertex_count);
        let mut colors = Vec::with_capacity(vertex_count);
        let mut tex_coords = Vec::with_capacity(vertex_count);
        let mut missing = Vec::with_capacity(vertex_count);
        let mut z_range = [f32::INFINITY, f32::NEG_INFINITY];
        for (i, &sample) in grid.samples().iter().enumerate() {
            let (col, row) = (i % columns, i / columns);
            let is_missing = sample.is_nan();
            let z = if is_missing {
                fill_z
            } else {
                (sample as f64 * self.pixel_scale) as f32
            };
            z_range = [z_range[0].min(z), z_range[1].max(z)];
            positions.push([
                (col as f64 * pixel_width - half_w) as f32,
                (half_l - row as f64 * pixel_length) as f32,
                z,
            ]);
            colors.push(if is_missing { MISSING_COLOR } else { surface_color });
            tex_coords.push([
                col as f32 / self.tile_width as f32,
                row as f32 / self.tile_length as f32,
            ]);
            missing.push(is_missing);
        }

        let normals = vertex_normals(&positions, columns, rows);
        let (indices, strip_lengths) = strip_indices(columns, rows);

        let mut mesh = TileMesh {
            tile_width: self.tile_width,
            tile_length: self.tile_length,
            pixel_width,
            pixel_length,
            positions,
            normals,
            colors,
            tex_coords,
            missing,
            indices,
            strip_lengths,
            empty: false,
            z_range,
            edges: Default::default(),
            edge_normals: Default::default(),
        };
        mesh.cache_edges();

        Ok(mesh)
    }
}

/// Averages the two face normals of every cell into the cell's four vertices.
fn vertex_normals(positions: &[[f32; 3]], columns: usize, rows: usize) -> Vec<[f32; 3]> {
    let mut sums = vec![Vec3::ZERO; positions.len()];
    let mut counts = vec![0u32; positions.len()];
    let p = |i: usize| Vec3::from(positions[i]);
    let mut add = |i: usize, n: Vec3| {
        sums[i] += n;
        counts[i] += 1;
    };

    for row in 0..rows - 1 {
        for col in 0..columns - 1 {
            let v0 = row * columns + col;
            let v1 = v0 + columns;
            let v2 = v0 + 1;
            let v3 = v1 + 1;

            let upper = face_normal(p(v0), p(v1), p(v2));
            add(v0, upper);
            add(v2, upper);
            add(v1, upper);

            let lower = face_normal(p(v2), p(v1), p(v3));
            add(v2, lower);
            add(v1, lower);
            add(v3, lower);
        }
    }

    sums.iter()
        .zip(counts.iter())
        .map(|(&sum, &count)| {
            let n = if count == 0 { Vec3::Z } else { sum / count as f32 };
            n.normalize_or_zero().into()
        })
        .collect()
}

#[inline]
fn face_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// One strip per row of cells, alternating between the upper and lower row of vertices.
fn strip_indices(columns: usize, rows: usize) -> (Vec<u32>, Vec<u32>) {
    let strip_len = 2 * columns;
    let mut indices = Vec::with_capacity((rows - 1) * strip_len);
    for row in 0..rows - 1 {
        for col in 0..columns {
            let upper = row * columns + col;
            indices.push(upper as u32);
            indices.push((upper + columns) as u32);
        }
    }
    (indices, vec![strip_len as u32; rows - 1])
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
