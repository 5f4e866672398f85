//! Trimming the scan along the user's curve.

use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{DynamicMesh, Mesh, MeshError, SpatialIndex, trim_by_curve};
use nalgebra::{Isometry3, Point3, Vector3};
use tracing::{debug, info};

use crate::error::{ShellError, ShellResult};
use crate::pipeline::Stage;
use crate::source::Curve;

use super::shell_groups;

/// Project every curve sample onto the closest point of the surface.
///
/// The curve may have been drawn on an earlier version of the scan.
pub fn map_curve_to_surface(curve: &Curve, index: &SpatialIndex) -> Vec<Point3<f64>> {
    curve
        .points
        .iter()
        .map(|p| index.nearest(p).map_or(*p, |hit| hit.point))
        .collect()
}

/// Point on the side of the surface that the trim removes.
///
/// A ray is cast straight down from far above the mesh, or straight up from
/// far below when `flip` is set; the centroid of the first triangle hit is
/// the seed.
pub fn trim_seed_point(mesh: &DynamicMesh, index: &SpatialIndex, flip: bool) -> ShellResult<Point3<f64>> {
    let bounds = mesh.bounds().ok_or(ShellError::EmptyMesh)?;
    let reach = 10.0 * bounds.extents().z.max(1.0);
    let (origin, dir) = if flip {
        (bounds.center() - Vector3::z() * reach, Vector3::z())
    } else {
        (bounds.center() + Vector3::z() * reach, -Vector3::z())
    };
    let hit = index
        .ray_hit(&origin, &dir)
        .ok_or_else(|| MeshError::query_missed("trim seed ray missed the scan"))?;
    debug!(triangle = hit.triangle, flip, "Trim seed found");
    Ok(mesh.triangle_centroid(hit.triangle))
}

/// Cut `input` along `curve` and keep the side away from the seed.
///
/// Works in input space with `index` built over `input`; the result is moved
/// by `transform`, put in [`shell_groups::TRIMMED`] and given fresh normals.
pub fn trim_shell(
    input: &Mesh,
    index: &SpatialIndex,
    curve: &Curve,
    flip: bool,
    transform: &Isometry3<f64>,
) -> ShellResult<Mesh> {
    let _timer = OperationTimer::with_context("trim", input.face_count(), input.vertex_count());
    let mut dm = DynamicMesh::from_mesh(input);
    if dm.triangle_count() == 0 {
        return Err(ShellError::EmptyMesh);
    }
    if curve.len() < 3 {
        return Err(ShellError::stage_failed(
            Stage::Trim,
            format!("trim curve has {} points, need at least 3", curve.len()),
        ));
    }

    let mapped = map_curve_to_surface(curve, index);
    let seed = trim_seed_point(&dm, index, flip)?;
    let report = trim_by_curve(&mut dm, &mapped, &seed)?;

    let ids: Vec<u32> = dm.triangle_ids().collect();
    for t in ids {
        dm.set_group(t, shell_groups::TRIMMED);
    }
    dm.transform(transform);
    dm.compute_normals();

    // several openings are allowed; the flare falls back when it cannot use them
    let loops = dm.boundary_loops().len();
    let trimmed = dm.to_mesh();
    info!(
        removed = report.removed_triangles,
        kept = trimmed.face_count(),
        loops,
        "Trim complete"
    );
    Ok(trimmed)
}
