//! Replacing the bottom of a shell with a connector.

use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{BoundaryLoop, CutPlane, DynamicMesh, plane_cut};
use nalgebra::{Unit, Vector3};
use tracing::{debug, info};

use crate::connector::Connector;
use crate::error::{ShellError, ShellResult};
use crate::offset::OffsetMeshes;
use crate::params::{DeviceParams, StitchParams};
use crate::seam::{SeamReport, merge_loops};
use crate::shell::shell_groups;

/// Placement and seam details of a merged connector.
#[derive(Debug, Clone)]
pub struct ConnectorMergeReport {
    pub translation: Vector3<f64>,
    pub inner_seam: Option<SeamReport>,
    pub outer_seam: SeamReport,
    pub holes: usize,
}

/// Cut the shell at `connector_cut_height` above its lowest point, append
/// the connector below, merge the openings and cut the connector holes.
///
/// The inner wall is only cut when the connector has an inner part.
pub fn merge_connector(
    mesh: &mut DynamicMesh,
    connector: &dyn Connector,
    params: &DeviceParams,
    stitch: &StitchParams,
    offsets: Option<&OffsetMeshes>,
) -> ShellResult<ConnectorMergeReport> {
    let _timer =
        OperationTimer::with_context("merge_connector", mesh.triangle_count(), mesh.vertex_count());
    let geometry = connector.geometry()?;
    let bounds = mesh.bounds().ok_or(ShellError::EmptyMesh)?;

    let mut origin = bounds.center();
    origin.z = bounds.min.z + params.connector_cut_height;
    let plane = CutPlane::new(origin, params.cut_plane_normal)?;
    let axis = Unit::new_normalize(params.cut_plane_normal);

    let outer_opening = cut_group(mesh, &plane, shell_groups::OUTER)?;
    let inner_opening = if geometry.has_inner() {
        Some(cut_group(mesh, &plane, shell_groups::INNER)?)
    } else {
        None
    };

    let dz = if bounds.min.z < 0.0 { bounds.min.z + 5.0 } else { 0.0 };
    let translation = Vector3::new(0.0, 0.0, dz);
    let appended = geometry.append_to(mesh, translation);
    debug!(
        dz,
        outer_group = appended.outer_group,
        inner_group = ?appended.inner_group,
        "Connector placed"
    );

    let inner_seam = match (&inner_opening, &appended.inner_loop) {
        (Some(shell_loop), Some(connector_loop)) => Some(merge_loops(
            mesh,
            shell_loop,
            connector_loop,
            axis,
            offsets.map(|o| &o.inner.index),
            stitch,
        )?),
        _ => None,
    };
    // the inner seam welds and remeshes, so look the outer loops up again
    // if its edits reached them
    let outer_opening = current_opening(mesh, outer_opening, shell_groups::OUTER)?;
    let connector_outer = current_opening(mesh, appended.outer_loop.clone(), appended.outer_group)?;
    let outer_seam = merge_loops(
        mesh,
        &outer_opening,
        &connector_outer,
        axis,
        offsets.map(|o| &o.outer.index),
        stitch,
    )?;

    let total = geometry.holes.len();
    let failed = geometry.count_failed_holes(mesh, translation, appended.hole_groups());
    if failed > 0 {
        return Err(ShellError::HolesFailed { failed, total });
    }
    mesh.compute_normals();

    info!(
        connector = connector.name(),
        dz,
        holes = total,
        inner = inner_seam.is_some(),
        "Connector merged"
    );
    Ok(ConnectorMergeReport {
        translation,
        inner_seam,
        outer_seam,
        holes: total,
    })
}

/// Cut one shell group and return the opening it leaves.
///
/// The cut reports every loop lying on the plane, including openings left
/// by earlier cuts of other groups, so only loops bordering `group` count.
fn cut_group(mesh: &mut DynamicMesh, plane: &CutPlane, group: i32) -> ShellResult<BoundaryLoop> {
    let cut = plane_cut(mesh, plane, |g| g == group)?;
    cut.loops
        .into_iter()
        .filter(|l| borders_group(mesh, l, group))
        .max_by_key(BoundaryLoop::len)
        .ok_or_else(|| {
            ShellError::merge_failed(format!(
                "cut at {:.2} left no opening in group {group}",
                plane.origin.z
            ))
        })
}

/// Whether every edge of `boundary` belongs to a triangle of `group`.
fn borders_group(mesh: &DynamicMesh, boundary: &BoundaryLoop, group: i32) -> bool {
    let n = boundary.len();
    n >= 3
        && (0..n).all(|i| {
            mesh.edge_triangles(boundary.vertices[i], boundary.vertices[(i + 1) % n])
                .iter()
                .all(|&t| mesh.group(t) == group)
        })
}

/// `boundary` if it is still open in `mesh`, else the longest open loop
/// bordering `group`.
fn current_opening(mesh: &DynamicMesh, boundary: BoundaryLoop, group: i32) -> ShellResult<BoundaryLoop> {
    if boundary.is_valid_in(mesh) {
        return Ok(boundary);
    }
    debug!(group, "Opening changed by an earlier seam, extracting it again");
    mesh.boundary_loops()
        .into_iter()
        .filter(|l| borders_group(mesh, l, group))
        .max_by_key(BoundaryLoop::len)
        .ok_or_else(|| ShellError::merge_failed(format!("no open loop left in group {group}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::connector::FlatBaseConnector;
    use crate::offset::OffsetSurface;
    use crate::params::FlatBaseParams;
    use crate::shell::extrude_wall;
    use mesh_kernel::primitives::capped_cylinder;

    /// An open-topped cup shell: inner wall plus extrusion.
    fn cup_shell(radius: f64) -> DynamicMesh {
        let mut dm = DynamicMesh::from_mesh(&capped_cylinder(radius, 80.0, 48, 4.0, false));
        plane_cut(&mut dm, &CutPlane::horizontal(70.0, true), |_| true).unwrap();
        dm.compute_normals();
        let shell = extrude_wall(&dm.to_mesh(), 5.0).unwrap();
        DynamicMesh::from_mesh(&shell)
    }

    #[test]
    fn test_cut_height_misses_shell() {
        let mut mesh = cup_shell(30.0);
        let params = DeviceParams {
            connector_cut_height: 500.0,
            ..Default::default()
        };
        let connector = FlatBaseConnector::new(FlatBaseParams::default(), Vec::new());
        let err = merge_connector(&mut mesh, &connector, &params, &StitchParams::default(), None)
            .unwrap_err();
        assert!(matches!(err, ShellError::MergeFailed { .. }));
    }

    #[test]
    fn test_merge_appends_connector_groups() {
        let mut mesh = cup_shell(35.0);
        let params = DeviceParams::default();
        let connector = FlatBaseConnector::new(FlatBaseParams::default(), Vec::new());
        let report =
            merge_connector(&mut mesh, &connector, &params, &StitchParams::default(), None).unwrap();
        assert!(report.inner_seam.is_some());
        assert_eq!(report.translation, Vector3::zeros());
        assert!(mesh.max_group() > shell_groups::STITCH);

        // the shell walls now end at the seam, the connector continues below
        let walls_below = mesh
            .triangle_ids()
            .filter(|&t| matches!(mesh.group(t), shell_groups::INNER | shell_groups::OUTER))
            .any(|t| mesh.triangle_centroid(t).z < 5.0);
        assert!(!walls_below);
        let connector_bottom = mesh.bounds().unwrap().min.z;
        assert!(connector_bottom < -9.0);

        // both seams closed: a single watertight socket
        assert_eq!(mesh.boundary_edge_count(), 0);
        assert_eq!(mesh.non_manifold_edge_count(), 0);
        assert!(mesh.to_mesh().signed_volume() > 0.0);
    }

    #[test]
    fn test_inner_cut_picks_inner_opening() {
        let mut mesh = cup_shell(35.0);
        let plane = CutPlane::horizontal(20.0, false);
        let outer = cut_group(&mut mesh, &plane, shell_groups::OUTER).unwrap();
        let inner = cut_group(&mut mesh, &plane, shell_groups::INNER).unwrap();
        assert!(borders_group(&mesh, &outer, shell_groups::OUTER));
        assert!(borders_group(&mesh, &inner, shell_groups::INNER));
        assert!(outer.vertices.iter().all(|v| !inner.vertices.contains(v)));
        assert!(inner.bounds(&mesh).unwrap().width() < outer.bounds(&mesh).unwrap().width());
    }

    #[test]
    fn test_seams_stay_out_of_offsets() {
        let mut mesh = cup_shell(35.0);
        let mut outer_solid = capped_cylinder(40.0, 85.0, 64, 2.0, false);
        outer_solid.translate(Vector3::new(0.0, 0.0, -5.0));
        let offsets = OffsetMeshes {
            inner: Arc::new(OffsetSurface::new(0.0, capped_cylinder(35.0, 80.0, 64, 2.0, false))),
            outer: Arc::new(OffsetSurface::new(5.0, outer_solid)),
        };
        let stitch = StitchParams::default();
        let connector = FlatBaseConnector::new(FlatBaseParams::default(), Vec::new());
        let report = merge_connector(
            &mut mesh,
            &connector,
            &DeviceParams::default(),
            &stitch,
            Some(&offsets),
        )
        .unwrap();
        assert_eq!(mesh.boundary_edge_count(), 0);

        let inner_seam = report.inner_seam.unwrap();
        assert!(inner_seam.constrained && report.outer_seam.constrained);
        for (seam, reference) in [
            (&inner_seam.seam, &offsets.inner.index),
            (&report.outer_seam.seam, &offsets.outer.index),
        ] {
            for &v in seam.iter().filter(|&&v| mesh.is_vertex(v)) {
                let p = mesh.position(v);
                let on_surface = reference.nearest(&p).is_some_and(|hit| hit.distance < 1e-6);
                assert!(!reference.is_inside(&p) || on_surface, "seam vertex {v} inside at {p:?}");
            }
            let shortest = seam
                .iter()
                .filter(|&&v| mesh.is_vertex(v))
                .flat_map(|&v| {
                    mesh.vertex_neighbors(v)
                        .into_iter()
                        .filter(|n| seam.contains(n))
                        .map(move |n| (v, n))
                })
                .map(|(a, b)| (mesh.position(a) - mesh.position(b)).norm())
                .fold(f64::INFINITY, f64::min);
            assert!(shortest >= stitch.degenerate_length());
        }
    }
}
