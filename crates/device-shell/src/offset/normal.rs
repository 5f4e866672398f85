//! Offset by moving vertices along their normals.

use mesh_kernel::decimate::reduce_to_triangle_count;
use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{DynamicMesh, Mesh};
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{ShellError, ShellResult};

/// Copy of `mesh` with every vertex moved `distance` along its normal,
/// reduced to at most `max_triangles`.
///
/// Self-intersections in concave regions are left as they are.
pub fn normal_offset(mesh: &Mesh, distance: f64, max_triangles: usize) -> ShellResult<Mesh> {
    let _timer =
        OperationTimer::with_context("normal_offset", mesh.face_count(), mesh.vertex_count());
    if mesh.is_empty() {
        return Err(ShellError::EmptyMesh);
    }

    let mut dm = DynamicMesh::from_mesh(mesh);
    dm.compute_normals();
    displace_along_normals(&mut dm, |_| distance);

    let reduced = reduce_to_triangle_count(&mut dm, max_triangles);
    debug!(
        distance,
        before = reduced.original_triangles,
        after = reduced.final_triangles,
        "Normal offset reduced"
    );
    dm.compute_normals();
    Ok(dm.to_mesh())
}

/// Move each vertex by `amount(v)` along its current normal.
///
/// Vertices without a normal stay put. New positions are computed in
/// parallel from the unmodified mesh and written afterwards.
pub(crate) fn displace_along_normals(dm: &mut DynamicMesh, amount: impl Fn(u32) -> f64 + Sync) {
    let ids: Vec<u32> = dm.vertex_ids().collect();
    let mesh: &DynamicMesh = dm;
    let moved: Vec<(u32, Point3<f64>)> = ids
        .par_iter()
        .filter_map(|&v| mesh.normal(v).map(|n| (v, mesh.position(v) + n * amount(v))))
        .collect();
    for (v, p) in moved {
        dm.set_position(v, p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_kernel::primitives::uv_sphere;

    #[test]
    fn test_sphere_grows_by_distance() {
        let sphere = uv_sphere(Point3::origin(), 10.0, 32, 16);
        let offset = normal_offset(&sphere, 3.0, 100_000).unwrap();
        assert_eq!(offset.face_count(), sphere.face_count());
        for v in &offset.vertices {
            assert_relative_eq!(v.position.coords.norm(), 13.0, epsilon = 0.1);
        }
    }

    #[test]
    fn test_reduction_budget() {
        let sphere = uv_sphere(Point3::origin(), 10.0, 48, 24);
        let offset = normal_offset(&sphere, 1.0, 400).unwrap();
        assert!(offset.face_count() < sphere.face_count() / 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            normal_offset(&Mesh::new(), 1.0, 100),
            Err(ShellError::EmptyMesh)
        ));
    }
}
