//! Inner wall offset and outer wall extrusion.

use mesh_kernel::geodesic::geodesic_distances;
use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{DynamicMesh, Mesh, MeshError};
use nalgebra::Vector3;
use tracing::{debug, info};

use crate::error::{ShellError, ShellResult};
use crate::offset::displace_along_normals;
use crate::params::DeviceParams;

use super::shell_groups;

/// Geodesic search stops this far past the flare band.
const FLARE_SEARCH_MARGIN: f64 = 1.25;

/// Smooth falloff `(1 - t²)³` on `[0, 1)`, zero from 1 on.
pub fn flare_falloff(t: f64) -> f64 {
    if !(0.0..1.0).contains(&t.abs()) {
        return 0.0;
    }
    let s = 1.0 - t * t;
    s * s * s
}

/// Extra offset per vertex id for the flare band.
///
/// `None` when no flare is configured or the mesh does not have exactly one
/// boundary loop; the wall then gets the constant inner offset.
pub fn flare_offsets(mesh: &DynamicMesh, params: &DeviceParams) -> Option<Vec<f64>> {
    if !params.has_flare() {
        return None;
    }
    let loops = mesh.boundary_loops();
    if loops.len() != 1 {
        debug!(loops = loops.len(), "Flare skipped, need exactly one boundary loop");
        return None;
    }
    let band = params.flare_band_width;
    let distances = geodesic_distances(mesh, &loops[0].vertices, FLARE_SEARCH_MARGIN * band);
    Some(
        distances
            .into_iter()
            .map(|d| params.flare_offset * flare_falloff(d / band))
            .collect(),
    )
}

/// Move the trimmed scan outward by the inner offset plus flare.
pub fn inner_wall(trimmed: &Mesh, params: &DeviceParams) -> ShellResult<Mesh> {
    let _timer = OperationTimer::with_context("inner_wall", trimmed.face_count(), trimmed.vertex_count());
    let mut dm = DynamicMesh::from_mesh(trimmed);
    if dm.triangle_count() == 0 {
        return Err(ShellError::EmptyMesh);
    }
    dm.compute_normals();

    let flare = flare_offsets(&dm, params);
    let base = params.inner_offset;
    match &flare {
        Some(extra) => displace_along_normals(&mut dm, |v| {
            base + extra.get(v as usize).copied().unwrap_or(0.0)
        }),
        None => displace_along_normals(&mut dm, |_| base),
    }
    dm.compute_normals();

    info!(
        inner_offset = base,
        flared = flare.is_some(),
        "Inner wall complete"
    );
    Ok(dm.to_mesh())
}

/// Give the inner wall a thickness.
///
/// The input triangles are reversed into [`shell_groups::INNER`], a copy
/// moved `thickness` along the vertex normals becomes
/// [`shell_groups::OUTER`], and every boundary loop is closed by a
/// [`shell_groups::STITCH`] strip between the two.
pub fn extrude_wall(inner: &Mesh, thickness: f64) -> ShellResult<Mesh> {
    let _timer = OperationTimer::with_context("extrude_wall", inner.face_count(), inner.vertex_count());
    let mut dm = DynamicMesh::from_mesh(inner);
    if dm.triangle_count() == 0 {
        return Err(ShellError::EmptyMesh);
    }
    dm.compute_normals();

    let originals: Vec<u32> = dm.triangle_ids().collect();
    let faces: Vec<[u32; 3]> = originals.iter().map(|&t| dm.triangle(t)).collect();
    let loops = dm.boundary_loops();

    let mut twin = vec![u32::MAX; dm.max_vertex_id() as usize];
    let vertices: Vec<u32> = dm.vertex_ids().collect();
    for v in vertices {
        let normal = dm.normal(v);
        let moved = dm.position(v) + normal.unwrap_or_else(Vector3::zeros) * thickness;
        let color = dm.color(v);
        twin[v as usize] = dm.append_vertex_with(moved, normal, color);
    }

    dm.reverse_orientation();
    for &t in &originals {
        dm.set_group(t, shell_groups::INNER);
    }

    let outer = |v: u32| twin[v as usize];
    for [a, b, c] in faces {
        dm.append_triangle([outer(a), outer(b), outer(c)], shell_groups::OUTER)
            .map_err(|e| MeshError::edit_rejected("extrude_wall", e))?;
    }

    let mut stitched = 0usize;
    for boundary in &loops {
        let n = boundary.len();
        for i in 0..n {
            let a = boundary.vertices[i];
            let b = boundary.vertices[(i + 1) % n];
            for tri in [[a, b, outer(b)], [a, outer(b), outer(a)]] {
                dm.append_triangle(tri, shell_groups::STITCH)
                    .map_err(|e| MeshError::edit_rejected("extrude_wall", e))?;
                stitched += 1;
            }
        }
    }
    dm.compute_normals();

    info!(
        thickness,
        loops = loops.len(),
        stitched,
        "Outer wall complete"
    );
    Ok(dm.to_mesh())
}
