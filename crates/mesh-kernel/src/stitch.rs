//! Joining open borders: loop zippers, fans and coincident vertex welding.

use nalgebra::Point3;
use tracing::{debug, warn};

use crate::dynamic::DynamicMesh;
use crate::error::{EditError, MeshError, MeshResult};
use crate::loops::BoundaryLoop;
use crate::points::PointIndex;

fn has_directed_edge(mesh: &DynamicMesh, a: u32, b: u32) -> bool {
    mesh.edge_triangles(a, b).into_iter().any(|t| {
        let tri = mesh.triangle(t);
        (0..3).any(|i| tri[i] == a && tri[(i + 1) % 3] == b)
    })
}

/// Connect two loops with a strip of triangles in `group`.
///
/// `a` is expected in boundary orientation and `b` in the opposite one, as
/// when two facing openings are joined. If the first edge of `a` runs the
/// other way in the mesh both loops are reversed, so the strip always agrees
/// with the winding already present. The loops may have different lengths;
/// the strip walks both and always takes the shorter diagonal.
///
/// Returns the new triangle ids.
pub fn stitch_loops(
    mesh: &mut DynamicMesh,
    a: &BoundaryLoop,
    b: &BoundaryLoop,
    group: i32,
) -> MeshResult<Vec<u32>> {
    if a.len() < 3 || b.len() < 3 {
        return Err(MeshError::edit_rejected("stitch_loops", EditError::LoopMismatch));
    }
    let (a, b) = if has_directed_edge(mesh, a.vertices[0], a.vertices[1]) {
        (a.clone(), b.clone())
    } else {
        (a.reversed(), b.reversed())
    };
    let (n, m) = (a.len(), b.len());

    let a0 = mesh.position(a.vertices[0]);
    let offset = (0..m)
        .min_by(|&x, &y| {
            let dx = (mesh.position(b.vertices[x]) - a0).norm_squared();
            let dy = (mesh.position(b.vertices[y]) - a0).norm_squared();
            dx.total_cmp(&dy)
        })
        .unwrap_or(0);
    let av = |i: usize| a.vertices[i % n];
    let bv = |j: usize| b.vertices[(j + offset) % m];

    let mut created = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0usize, 0usize);
    while i < n || j < m {
        let advance_a = if i == n {
            false
        } else if j == m {
            true
        } else {
            let diag_a = (mesh.position(av(i + 1)) - mesh.position(bv(j))).norm_squared();
            let diag_b = (mesh.position(av(i)) - mesh.position(bv(j + 1))).norm_squared();
            diag_a <= diag_b
        };
        let tri = if advance_a {
            i += 1;
            [av(i), av(i - 1), bv(j)]
        } else {
            j += 1;
            [av(i), bv(j - 1), bv(j)]
        };
        let t = mesh
            .append_triangle(tri, group)
            .map_err(|e| MeshError::edit_rejected("stitch_loops", e))?;
        created.push(t);
    }
    debug!(a = n, b = m, triangles = created.len(), "Stitched loops");
    Ok(created)
}

/// Close `boundary` with a fan around a new vertex at `center`.
///
/// With `reverse == false` the fan caps a loop given in boundary orientation;
/// `reverse` flips the winding. Returns the center vertex and the new
/// triangles.
pub fn append_fan(
    mesh: &mut DynamicMesh,
    center: Point3<f64>,
    boundary: &BoundaryLoop,
    group: i32,
    reverse: bool,
) -> MeshResult<(u32, Vec<u32>)> {
    if boundary.len() < 3 {
        return Err(MeshError::edit_rejected("append_fan", EditError::LoopMismatch));
    }
    let c = mesh.append_vertex(center);
    let n = boundary.len();
    let mut created = Vec::with_capacity(n);
    for i in 0..n {
        let (p, q) = (boundary.vertices[i], boundary.vertices[(i + 1) % n]);
        let tri = if reverse { [c, p, q] } else { [c, q, p] };
        let t = mesh
            .append_triangle(tri, group)
            .map_err(|e| MeshError::edit_rejected("append_fan", e))?;
        created.push(t);
    }
    Ok((c, created))
}

/// Weld boundary vertices closer than `tolerance`. Returns the number of
/// vertices removed.
pub fn merge_coincident(mesh: &mut DynamicMesh, tolerance: f64) -> usize {
    let boundary: Vec<u32> = mesh
        .vertex_ids()
        .filter(|&v| mesh.is_boundary_vertex(v))
        .collect();
    let positions: Vec<Point3<f64>> = boundary.iter().map(|&v| mesh.position(v)).collect();
    let index = PointIndex::new(&positions);

    let mut merged = 0usize;
    let mut rejected = 0usize;
    for (i, &keep) in boundary.iter().enumerate() {
        if !mesh.is_vertex(keep) {
            continue;
        }
        for k in index.within(&positions[i], tolerance) {
            let remove = boundary[k];
            if k <= i || !mesh.is_vertex(remove) {
                continue;
            }
            match mesh.merge_vertices(keep, remove) {
                Ok(()) => merged += 1,
                Err(_) => rejected += 1,
            }
        }
    }
    if rejected > 0 {
        warn!(merged, rejected, "Some coincident vertices could not be welded");
    } else {
        debug!(merged, "Welded coincident vertices");
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{capped_cylinder, cylinder_groups, planar_grid};
    use nalgebra::Vector3;

    fn open_cup(slices: usize, remove_group: i32, z: f64) -> DynamicMesh {
        let mut cyl = capped_cylinder(8.0, 10.0, slices, 2.0, false);
        cyl.translate(Vector3::new(0.0, 0.0, z));
        let mut dm = DynamicMesh::from_mesh(&cyl);
        let doomed: Vec<u32> = dm
            .triangle_ids()
            .filter(|&t| dm.group(t) == remove_group)
            .collect();
        dm.remove_triangles(&doomed, true);
        dm
    }

    #[test]
    fn test_stitch_unequal_loops_closes_mesh() {
        let mut dm = open_cup(48, cylinder_groups::TOP, 0.0);
        let upper = open_cup(30, cylinder_groups::BOTTOM, 15.0).to_mesh();
        dm.append_mesh(&upper, |g| g + 10);

        let loops = dm.boundary_loops();
        assert_eq!(loops.len(), 2);
        let (low, high) = if dm.position(loops[0].vertices[0]).z < 5.0 {
            (&loops[0], &loops[1])
        } else {
            (&loops[1], &loops[0])
        };
        let strip = stitch_loops(&mut dm, low, &high.reversed(), 99).unwrap();
        assert_eq!(strip.len(), 78);
        assert_eq!(dm.boundary_edge_count(), 0);
        assert_eq!(dm.non_manifold_edge_count(), 0);
        assert!(dm.to_mesh().signed_volume() > 0.0);
    }

    #[test]
    fn test_stitch_accepts_either_loop_direction() {
        let mut dm = open_cup(24, cylinder_groups::TOP, 0.0);
        let upper = open_cup(24, cylinder_groups::BOTTOM, 12.0).to_mesh();
        dm.append_mesh(&upper, |g| g);
        let loops = dm.boundary_loops();
        let (low, high) = if dm.position(loops[0].vertices[0]).z < 5.0 {
            (&loops[0], &loops[1])
        } else {
            (&loops[1], &loops[0])
        };
        stitch_loops(&mut dm, &low.reversed(), high, 7).unwrap();
        assert_eq!(dm.boundary_edge_count(), 0);
        assert!(dm.to_mesh().signed_volume() > 0.0);
    }

    #[test]
    fn test_fan_caps_open_cup() {
        let mut dm = open_cup(32, cylinder_groups::TOP, 0.0);
        let boundary = dm.boundary_loops().remove(0);
        let (c, tris) =
            append_fan(&mut dm, Point3::new(0.0, 0.0, 10.0), &boundary, 5, false).unwrap();
        assert_eq!(tris.len(), 32);
        assert_eq!(dm.vertex_triangles(c).len(), 32);
        assert_eq!(dm.boundary_edge_count(), 0);
        assert!(dm.to_mesh().signed_volume() > 0.0);
    }

    #[test]
    fn test_merge_coincident_welds_seam() {
        let mut mesh = planar_grid(2, 2, 1.0);
        let mut right = planar_grid(2, 2, 1.0);
        right.translate(Vector3::new(2.0, 0.0, 0.0));
        let offset = mesh.vertices.len() as u32;
        mesh.vertices.extend(right.vertices);
        mesh.faces
            .extend(right.faces.iter().map(|f| f.map(|i| i + offset)));
        let mut dm = DynamicMesh::from_mesh(&mesh);
        assert_eq!(dm.boundary_loops().len(), 2);

        assert_eq!(merge_coincident(&mut dm, 1e-6), 3);
        assert_eq!(dm.vertex_count(), 15);
        assert_eq!(dm.boundary_loops().len(), 1);
    }
}
