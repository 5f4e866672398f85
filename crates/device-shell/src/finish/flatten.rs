//! Flattened sole for shells that stand on the ground.

use mesh_kernel::components::{connected_component, expand_by_rings, triangles_touching, vertices_of};
use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{DynamicMesh, ProjectionTarget, RegionRemesher, RemeshParams, SpatialIndex};
use nalgebra::{Point3, Vector3};
use tracing::{debug, info, warn};

use crate::error::{ShellError, ShellResult};
use crate::params::FlattenParams;
use crate::shell::shell_groups;

/// What [`flatten_base`] changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenReport {
    /// Height of the base plane, if a seed was found.
    pub base_height: Option<f64>,
    /// Triangles pressed onto the base plane.
    pub flattened: usize,
    /// Triangles remeshed, including the blend rings.
    pub remeshed: usize,
}

/// Press the lowest near-horizontal band of the outer wall onto a plane.
///
/// The band is grown from the lowest outer-wall triangle under the center
/// of the shell, found with a vertical ray from below. A miss, or a seed
/// triangle that does not face down, leaves the mesh untouched.
pub fn flatten_base(mesh: &mut DynamicMesh, params: &FlattenParams) -> ShellResult<FlattenReport> {
    let _timer =
        OperationTimer::with_context("flatten_base", mesh.triangle_count(), mesh.vertex_count());
    let bounds = mesh.bounds().ok_or(ShellError::EmptyMesh)?;
    let index = SpatialIndex::build(mesh);

    let c = bounds.center();
    let origin = Point3::new(c.x, c.y, bounds.min.z - 2.0 * bounds.height().max(1.0));
    let Some(hit) = index.ray_hit_filtered(&origin, &Vector3::z(), |_, g| {
        g == shell_groups::OUTER
    }) else {
        warn!("Flatten seed ray missed the outer wall");
        return Ok(FlattenReport::default());
    };
    let base_z = hit.point.z;

    let down = -Vector3::z();
    let band = params.band_height;
    let dot = params.dot_threshold;
    let component = connected_component(mesh, hit.triangle, |m, t| {
        m.group(t) == shell_groups::OUTER
            && (m.triangle_centroid(t).z - base_z).abs() <= band
            && m.triangle_normal(t).dot(&down) >= dot
    });
    if component.is_empty() {
        debug!(seed = hit.triangle, base_z, "No downward band at the seed, nothing flattened");
        return Ok(FlattenReport {
            base_height: Some(base_z),
            ..Default::default()
        });
    }

    for v in vertices_of(mesh, &component) {
        let mut p = mesh.position(v);
        p.z = base_z;
        mesh.set_position(v, p);
    }

    let region = blend_region(mesh, &component, params.blend_rings);
    let snapshot = SpatialIndex::build(mesh);
    let surface: &dyn ProjectionTarget = &snapshot;
    let remesh = RemeshParams::with_target_edge_length(params.target_edge_length)
        .smoothing(params.smoothing);

    let mut remesher = RegionRemesher::new(mesh, &region);
    let projected = remesher.remesh(&remesh.clone().passes(params.projected_passes), Some(surface));
    let relaxed = remesher.remesh(&remesh.passes(params.relaxed_passes), None);
    remesher
        .back_propagate(mesh)
        .map_err(|e| ShellError::flatten_failed(e.to_string()))?;
    mesh.compute_normals();

    debug!(
        projected_splits = projected.splits,
        relaxed_splits = relaxed.splits,
        "Base region remeshed"
    );
    info!(
        base_z,
        flattened = component.len(),
        remeshed = region.len(),
        "Base flattened"
    );
    Ok(FlattenReport {
        base_height: Some(base_z),
        flattened: component.len(),
        remeshed: region.len(),
    })
}

/// Every outer-wall triangle touching a flattened vertex, grown by `rings`
/// more one-rings.
fn blend_region(mesh: &DynamicMesh, band: &[u32], rings: usize) -> Vec<u32> {
    let is_outer = |m: &DynamicMesh, t: u32| m.group(t) == shell_groups::OUTER;
    let touching: Vec<u32> = triangles_touching(mesh, &vertices_of(mesh, band))
        .into_iter()
        .filter(|&t| is_outer(mesh, t))
        .collect();
    expand_by_rings(mesh, &touching, rings, is_outer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_kernel::primitives::uv_sphere;

    fn outer_sphere() -> DynamicMesh {
        let mut dm = DynamicMesh::from_mesh(&uv_sphere(Point3::new(0.0, 0.0, 30.0), 30.0, 48, 24));
        let ids: Vec<u32> = dm.triangle_ids().collect();
        for t in ids {
            dm.set_group(t, shell_groups::OUTER);
        }
        dm
    }

    #[test]
    fn test_flatten_sphere_bottom() {
        let mut dm = outer_sphere();
        let report = flatten_base(&mut dm, &FlattenParams::default()).unwrap();
        assert!(report.flattened > 0);
        assert!(report.remeshed >= report.flattened);
        let base = report.base_height.unwrap();

        let bounds = dm.bounds().unwrap();
        assert_relative_eq!(bounds.min.z, base, epsilon = 1e-6);
        // the sole is now a disk of vertices on the base plane
        let on_plane = dm
            .vertex_ids()
            .filter(|&v| (dm.position(v).z - base).abs() < 1e-6)
            .count();
        assert!(on_plane > 10);
    }

    #[test]
    fn test_blend_region_covers_band_vertex_rings() {
        let dm = outer_sphere();
        let band: Vec<u32> = dm
            .triangle_ids()
            .filter(|&t| dm.triangle_centroid(t).z < 2.0)
            .collect();
        assert!(!band.is_empty());
        let band_vertices = vertices_of(&dm, &band);

        let region = blend_region(&dm, &band, 0);
        for &v in &band_vertices {
            for t in dm.vertex_triangles(v) {
                assert!(region.binary_search(t).is_ok());
            }
        }
        // nothing beyond the one-ring without blend rings
        assert!(region.iter().all(|&t| dm.triangle(t).iter().any(|v| band_vertices.contains(v))));

        let blended = blend_region(&dm, &band, 2);
        assert!(blended.len() > region.len());
        assert!(region.iter().all(|t| blended.binary_search(t).is_ok()));
    }

    #[test]
    fn test_wrong_group_is_a_miss() {
        let mut dm = DynamicMesh::from_mesh(&uv_sphere(Point3::origin(), 10.0, 24, 12));
        let before = dm.vertex_count();
        let report = flatten_base(&mut dm, &FlattenParams::default()).unwrap();
        assert_eq!(report, FlattenReport::default());
        assert_eq!(dm.vertex_count(), before);
    }
}
