//! Reducing a boundary loop to a target vertex count.
//!
//! Polygon insertion splits edges where the polygon crosses the mesh, so a
//! hole border often ends up with more vertices than the polygon had. Two
//! borders are easier to stitch when they match.

use mesh_kernel::{BoundaryLoop, DynamicMesh};
use tracing::{debug, warn};

/// Loop corners straighter than this are removed first.
const STRAIGHT_ANGLE_DEG: f64 = 179.0;

/// Result of [`simplify_loop`].
#[derive(Debug, Clone)]
pub struct SimplifiedLoop {
    pub boundary: BoundaryLoop,
    pub collapses: usize,
}

/// Collapse loop vertices until at most `target` remain.
///
/// Each round tries, in order: every corner above 179° from the straightest
/// down, the vertex whose two loop edges are shortest together, and finally
/// the first loop edge. A rejected collapse falls through to the next choice;
/// when nothing collapses the loop is returned as it is.
pub fn simplify_loop(mesh: &mut DynamicMesh, boundary: &BoundaryLoop, target: usize) -> SimplifiedLoop {
    let mut ring: Vec<u32> = boundary.vertices.clone();
    let target = target.max(3);
    let mut collapses = 0usize;

    while ring.len() > target {
        let removed = collapse_straightest(mesh, &ring)
            .or_else(|| {
                warn!(len = ring.len(), "No straight corner collapsed, trying shortest edges");
                collapse_shortest(mesh, &ring)
            })
            .or_else(|| {
                warn!(len = ring.len(), "Shortest edge collapse failed, collapsing first edge");
                collapse_first(mesh, &ring)
            });
        match removed {
            Some(v) => {
                ring.retain(|&x| x != v);
                ring.retain(|&x| mesh.is_vertex(x));
                collapses += 1;
            }
            None => {
                warn!(len = ring.len(), target, "Loop simplification stuck");
                break;
            }
        }
    }

    debug!(
        before = boundary.len(),
        after = ring.len(),
        collapses,
        "Loop simplified"
    );
    SimplifiedLoop {
        boundary: BoundaryLoop::new(ring),
        collapses,
    }
}

fn neighbours(ring: &[u32], i: usize) -> (u32, u32, u32) {
    let n = ring.len();
    (ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n])
}

fn corner_angle_deg(mesh: &DynamicMesh, prev: u32, cur: u32, next: u32) -> f64 {
    let c = mesh.position(cur);
    let a = mesh.position(prev) - c;
    let b = mesh.position(next) - c;
    match (a.try_normalize(1e-12), b.try_normalize(1e-12)) {
        (Some(a), Some(b)) => a.dot(&b).clamp(-1.0, 1.0).acos().to_degrees(),
        _ => 180.0,
    }
}

/// Removed vertex on success. Corners above 179° are tried from the
/// straightest down until one collapses.
fn collapse_straightest(mesh: &mut DynamicMesh, ring: &[u32]) -> Option<u32> {
    let mut candidates: Vec<(usize, f64)> = (0..ring.len())
        .map(|i| {
            let (p, c, n) = neighbours(ring, i);
            (i, corner_angle_deg(mesh, p, c, n))
        })
        .filter(|&(_, angle)| angle > STRAIGHT_ANGLE_DEG)
        .collect();
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    for (i, angle) in candidates {
        let (prev, cur, _) = neighbours(ring, i);
        let kept = mesh.position(prev);
        match mesh.collapse_edge(prev, cur) {
            Ok(_) => {
                mesh.set_position(prev, kept);
                return Some(cur);
            }
            Err(e) => warn!(?e, angle, vertex = cur, "Straight corner collapse rejected"),
        }
    }
    None
}

fn collapse_shortest(mesh: &mut DynamicMesh, ring: &[u32]) -> Option<u32> {
    let len = |a: u32, b: u32| (mesh.position(a) - mesh.position(b)).norm();
    let i = (0..ring.len()).min_by(|&x, &y| {
        let sum = |i: usize| {
            let (p, c, n) = neighbours(ring, i);
            len(p, c) + len(c, n)
        };
        sum(x).total_cmp(&sum(y))
    })?;
    let (prev, cur, next) = neighbours(ring, i);
    let keep = if len(prev, cur) <= len(cur, next) { prev } else { next };
    match mesh.collapse_edge(keep, cur) {
        Ok(_) => Some(cur),
        Err(e) => {
            warn!(?e, "Shortest edge collapse rejected");
            None
        }
    }
}

fn collapse_first(mesh: &mut DynamicMesh, ring: &[u32]) -> Option<u32> {
    let (v0, v1) = (*ring.first()?, *ring.get(1)?);
    match mesh.collapse_edge(v1, v0) {
        Ok(_) => Some(v0),
        Err(e) => {
            warn!(?e, "Fallback edge collapse rejected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_kernel::Mesh;
    use mesh_kernel::primitives::planar_grid;
    use nalgebra::Point3;

    fn grid_with_border() -> (DynamicMesh, BoundaryLoop) {
        let dm = DynamicMesh::from_mesh(&planar_grid(6, 6, 1.0));
        let boundary = dm.boundary_loops().remove(0);
        (dm, boundary)
    }

    #[test]
    fn test_removes_straight_vertices_first() {
        let (mut dm, boundary) = grid_with_border();
        assert_eq!(boundary.len(), 24);
        let result = simplify_loop(&mut dm, &boundary, 20);
        assert_eq!(result.boundary.len(), 20);
        assert_eq!(result.collapses, 4);
        // corners survive, they are not straight
        for corner in [0u32, 6, 42, 48] {
            assert!(result.boundary.vertices.contains(&corner));
        }
        assert!(result.boundary.is_valid_in(&dm));
        assert_eq!(dm.non_manifold_edge_count(), 0);
    }

    #[test]
    fn test_next_straight_corner_when_straightest_is_locked() {
        // Q is the straightest corner, but P and Q share two neighbours
        // (X and Y), so collapsing it breaks the link condition
        let mesh = Mesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),   // P
                Point3::new(1.0, 0.0, 0.0),   // Q
                Point3::new(2.0, 0.005, 0.0), // R
                Point3::new(3.0, 0.0, 0.0),   // T
                Point3::new(0.7, 0.5, 0.0),   // X
                Point3::new(1.0, 2.0, 0.0),   // Y
            ],
            vec![[0, 1, 4], [1, 5, 4], [5, 0, 4], [1, 2, 5], [2, 3, 5]],
        );
        let mut dm = DynamicMesh::from_mesh(&mesh);
        let boundary = BoundaryLoop::new(vec![0, 1, 2, 3, 5]);
        assert!(boundary.is_valid_in(&dm));
        assert!(dm.collapse_edge(0, 1).is_err());

        let result = simplify_loop(&mut dm, &boundary, 4);
        assert_eq!(result.collapses, 1);
        assert_eq!(result.boundary.vertices, vec![0, 1, 3, 5]);
        assert!(result.boundary.is_valid_in(&dm));
    }

    #[test]
    fn test_already_at_target() {
        let (mut dm, boundary) = grid_with_border();
        let before = dm.triangle_count();
        let result = simplify_loop(&mut dm, &boundary, 24);
        assert_eq!(result.collapses, 0);
        assert_eq!(result.boundary.vertices, boundary.vertices);
        assert_eq!(dm.triangle_count(), before);
    }
}
