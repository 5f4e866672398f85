//! Offset through a signed distance grid.
//!
//! The grid is filled once with `mesh_to_sdf` and reused for every iso-level
//! that fits inside its padding. Surfaces are extracted with surface nets.

use mesh_kernel::decimate::{reduce_to_edge_length, reduce_to_triangle_count};
use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{DynamicMesh, Mesh};
use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

use crate::error::{ShellError, ShellResult};
use crate::params::OffsetParams;

/// Value written around the grid so extraction always closes the surface.
const OUTSIDE: f32 = 1000.0;

/// Signed distances sampled at cell centers; negative inside.
#[derive(Debug, Clone)]
pub struct SdfField {
    /// Corner of the first cell.
    origin: Point3<f64>,
    cell: f64,
    dims: [usize; 3],
    /// `mesh_to_sdf` layout: z varies fastest.
    values: Vec<f32>,
    /// Largest offset the padding was sized for.
    max_offset: f64,
}

impl SdfField {
    /// Sample `mesh` on a grid padded for offsets up to `max_offset`.
    pub fn compute(mesh: &Mesh, max_offset: f64, params: &OffsetParams) -> ShellResult<Self> {
        use mesh_to_sdf::{Grid, SignMethod, Topology, generate_grid_sdf};

        let _timer = OperationTimer::with_context("sdf_compute", mesh.face_count(), mesh.vertex_count());

        let mut dm = DynamicMesh::from_mesh(mesh);
        if dm.triangle_count() == 0 {
            return Err(ShellError::EmptyMesh);
        }
        reduce_to_triangle_count(&mut dm, params.sdf_pre_reduce_triangles);
        let reduced = dm.to_mesh();
        let bounds = reduced.aabb().ok_or(ShellError::EmptyMesh)?;

        let size = bounds.diagonal();
        let cell = size.x.max(size.y).max(size.z) / params.sdf_cells.max(1) as f64;
        if cell <= 0.0 {
            return Err(ShellError::EmptyMesh);
        }
        let padding = max_offset.abs() + 2.0 * cell;
        let origin = bounds.min - Vector3::repeat(padding);
        let span = size + Vector3::repeat(2.0 * padding);
        let dims = [
            ((span.x / cell).ceil() as usize).max(1),
            ((span.y / cell).ceil() as usize).max(1),
            ((span.z / cell).ceil() as usize).max(1),
        ];
        let total = dims[0] * dims[1] * dims[2];
        if total > params.sdf_max_cells {
            return Err(ShellError::grid_too_large(dims, params.sdf_max_cells));
        }

        info!(dims = ?dims, total, cell_mm = cell, "Computing SDF grid");

        let vertices: Vec<[f32; 3]> = reduced
            .vertices
            .iter()
            .map(|v| [v.position.x as f32, v.position.y as f32, v.position.z as f32])
            .collect();
        let indices: Vec<u32> = reduced.faces.iter().flat_map(|f| f.iter().copied()).collect();

        let corner = |i: usize, o: f64| (o + dims[i] as f64 * cell) as f32;
        let grid = Grid::from_bounding_box(
            &[origin.x as f32, origin.y as f32, origin.z as f32],
            &[corner(0, origin.x), corner(1, origin.y), corner(2, origin.z)],
            dims,
        );
        let values = generate_grid_sdf(
            &vertices,
            Topology::TriangleList(Some(&indices)),
            &grid,
            SignMethod::Raycast,
        );

        debug!(
            min = values.iter().copied().fold(f32::INFINITY, f32::min),
            max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            "SDF grid filled"
        );

        Ok(Self {
            origin,
            cell,
            dims,
            values,
            max_offset: max_offset.abs(),
        })
    }

    /// Whether an offset of `offset` still fits inside the padding.
    pub fn covers(&self, offset: f64) -> bool {
        offset.abs() <= self.max_offset
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn cell_size(&self) -> f64 {
        self.cell
    }

    /// Distance at cell `(x, y, z)`.
    pub fn value(&self, x: usize, y: usize, z: usize) -> f32 {
        let [_, ny, nz] = self.dims;
        self.values[z + y * nz + x * ny * nz]
    }

    /// Center of cell `(x, y, z)`.
    pub fn cell_center(&self, x: usize, y: usize, z: usize) -> Point3<f64> {
        self.origin + Vector3::new(x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5) * self.cell
    }

    /// Extract the surface at distance `iso`, outward normals, edges no
    /// shorter than half a cell.
    pub fn extract(&self, iso: f64) -> ShellResult<Mesh> {
        use fast_surface_nets::ndshape::{RuntimeShape, Shape};
        use fast_surface_nets::{SurfaceNetsBuffer, surface_nets};

        let _timer = OperationTimer::new("sdf_extract");
        let [nx, ny, nz] = self.dims;
        let padded = [nx + 2, ny + 2, nz + 2];
        let shape = RuntimeShape::<u32, 3>::new([padded[0] as u32, padded[1] as u32, padded[2] as u32]);

        let mut samples = vec![OUTSIDE; shape.size() as usize];
        let iso = iso as f32;
        for x in 0..nx {
            for y in 0..ny {
                for z in 0..nz {
                    let dst = shape.linearize([x as u32 + 1, y as u32 + 1, z as u32 + 1]);
                    samples[dst as usize] = self.value(x, y, z) - iso;
                }
            }
        }

        let mut buffer = SurfaceNetsBuffer::default();
        surface_nets(
            &samples,
            &shape,
            [0; 3],
            [padded[0] as u32 - 1, padded[1] as u32 - 1, padded[2] as u32 - 1],
            &mut buffer,
        );
        if buffer.indices.is_empty() {
            return Err(ShellError::EmptyIsosurface { iso: iso as f64 });
        }

        // padded index 1 is cell 0, whose center is half a cell from origin
        let positions = buffer
            .positions
            .iter()
            .map(|p| {
                self.origin
                    + Vector3::new(p[0] as f64 - 0.5, p[1] as f64 - 0.5, p[2] as f64 - 0.5)
                        * self.cell
            })
            .collect();
        let faces = buffer
            .indices
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let mut mesh = Mesh::from_parts(positions, faces);
        if mesh.signed_volume() < 0.0 {
            for f in &mut mesh.faces {
                f.swap(1, 2);
            }
        }

        let mut dm = DynamicMesh::from_mesh(&mesh);
        let reduced = reduce_to_edge_length(&mut dm, self.cell * 0.5);
        dm.compute_normals();
        debug!(
            iso,
            raw = reduced.original_triangles,
            reduced = reduced.final_triangles,
            "Isosurface extracted"
        );
        Ok(dm.to_mesh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_kernel::primitives::uv_sphere;

    fn small_grid() -> OffsetParams {
        OffsetParams {
            sdf_cells: 24,
            ..Default::default()
        }
    }

    #[test]
    fn test_sphere_field_signs() {
        let sphere = uv_sphere(Point3::origin(), 10.0, 32, 16);
        let field = SdfField::compute(&sphere, 3.0, &small_grid()).unwrap();
        let [nx, ny, nz] = field.dims();
        // the grid spans the sphere plus padding on each side
        assert!(nx as f64 * field.cell_size() > 20.0 + 6.0);

        let c = field.cell_center(nx / 2, ny / 2, nz / 2);
        assert!(c.coords.norm() < field.cell_size());
        assert!(field.value(nx / 2, ny / 2, nz / 2) < 0.0);
        assert!(field.value(0, 0, 0) > 0.0);
        assert!(field.covers(3.0));
        assert!(!field.covers(3.5));
    }

    #[test]
    fn test_extract_offset_radius() {
        let sphere = uv_sphere(Point3::origin(), 10.0, 32, 16);
        let field = SdfField::compute(&sphere, 3.0, &small_grid()).unwrap();
        let offset = field.extract(3.0).unwrap();
        assert!(offset.face_count() > 0);
        assert!(offset.signed_volume() > 0.0);

        let mean = offset
            .vertices
            .iter()
            .map(|v| v.position.coords.norm())
            .sum::<f64>()
            / offset.vertex_count() as f64;
        assert!((mean - 13.0).abs() < field.cell_size(), "mean radius {mean}");
    }

    #[test]
    fn test_grid_limit() {
        let sphere = uv_sphere(Point3::origin(), 10.0, 16, 8);
        let params = OffsetParams {
            sdf_max_cells: 100,
            ..small_grid()
        };
        assert!(matches!(
            SdfField::compute(&sphere, 1.0, &params),
            Err(ShellError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_iso_outside_grid() {
        let sphere = uv_sphere(Point3::origin(), 10.0, 16, 8);
        let field = SdfField::compute(&sphere, 1.0, &small_grid()).unwrap();
        assert!(field.extract(-50.0).is_err());
    }
}
