//! Boundary loop extraction.
//!
//! A boundary loop is the cyclic sequence of vertices along edges used by a
//! single triangle. Loops are oriented so that `v[i] -> v[i+1]` follows the
//! winding of the triangle adjacent to that edge.

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::warn;

use crate::dynamic::DynamicMesh;
use crate::types::Aabb;

/// Ordered cyclic vertex ids around an open boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoundaryLoop {
    pub vertices: Vec<u32>,
}

impl BoundaryLoop {
    pub fn new(vertices: Vec<u32>) -> Self {
        Self { vertices }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn reversed(&self) -> Self {
        let mut vertices = self.vertices.clone();
        vertices.reverse();
        Self { vertices }
    }

    pub fn positions(&self, mesh: &DynamicMesh) -> Vec<Point3<f64>> {
        self.vertices.iter().map(|&v| mesh.position(v)).collect()
    }

    pub fn bounds(&self, mesh: &DynamicMesh) -> Option<Aabb> {
        Aabb::from_points(&self.positions(mesh))
    }

    /// Total length of the closed polyline.
    pub fn perimeter(&self, mesh: &DynamicMesh) -> f64 {
        let n = self.vertices.len();
        (0..n)
            .map(|i| {
                (mesh.position(self.vertices[(i + 1) % n]) - mesh.position(self.vertices[i])).norm()
            })
            .sum()
    }

    /// Whether every consecutive pair is still a boundary edge of `mesh`.
    pub fn is_valid_in(&self, mesh: &DynamicMesh) -> bool {
        let n = self.vertices.len();
        n >= 3
            && (0..n).all(|i| mesh.is_boundary_edge(self.vertices[i], self.vertices[(i + 1) % n]))
    }
}

impl DynamicMesh {
    /// Extract every boundary loop, ordered by their smallest starting edge.
    ///
    /// At a bowtie vertex (two loops touching) the walk takes the first unused
    /// outgoing edge, so both loops are still produced.
    pub fn boundary_loops(&self) -> Vec<BoundaryLoop> {
        let mut outgoing: HashMap<u32, Vec<usize>> = HashMap::new();
        let mut edges: Vec<(u32, u32)> = Vec::new();
        for t in self.triangle_ids() {
            let tri = self.triangle(t);
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                if self.is_boundary_edge(a, b) {
                    outgoing.entry(a).or_default().push(edges.len());
                    edges.push((a, b));
                }
            }
        }

        let mut order: Vec<usize> = (0..edges.len()).collect();
        order.sort_by_key(|&e| edges[e]);
        let mut used = vec![false; edges.len()];
        let mut loops = Vec::new();

        for start_edge in order {
            if used[start_edge] {
                continue;
            }
            let start = edges[start_edge].0;
            let mut vertices = Vec::new();
            let mut current_edge = start_edge;
            let mut closed = false;
            for _ in 0..=edges.len() {
                used[current_edge] = true;
                let (a, b) = edges[current_edge];
                vertices.push(a);
                if b == start {
                    closed = true;
                    break;
                }
                let next = outgoing
                    .get(&b)
                    .and_then(|list| list.iter().copied().find(|&e| !used[e]));
                match next {
                    Some(e) => current_edge = e,
                    None => break,
                }
            }
            if closed {
                loops.push(BoundaryLoop::new(vertices));
            } else {
                warn!(vertices = vertices.len(), "Discarding open boundary chain");
            }
        }
        loops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{capped_cylinder, planar_grid};

    #[test]
    fn test_grid_has_single_ccw_loop() {
        let dm = DynamicMesh::from_mesh(&planar_grid(3, 2, 1.0));
        let loops = dm.boundary_loops();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 10);
        assert!(loops[0].is_valid_in(&dm));
        // walking in triangle winding on a +Z grid goes counter-clockwise
        let pts = loops[0].positions(&dm);
        let n = pts.len();
        let signed_area: f64 = (0..n)
            .map(|i| {
                let (p, q) = (pts[i], pts[(i + 1) % n]);
                p.x * q.y - q.x * p.y
            })
            .sum::<f64>()
            * 0.5;
        assert!(signed_area > 0.0);
        approx::assert_relative_eq!(loops[0].perimeter(&dm), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_closed_mesh_has_no_loops() {
        let dm = DynamicMesh::from_mesh(&capped_cylinder(10.0, 20.0, 16, 2.0, false));
        assert!(dm.boundary_loops().is_empty());
    }

    #[test]
    fn test_removing_triangles_opens_loop() {
        let mut dm = DynamicMesh::from_mesh(&planar_grid(4, 4, 1.0));
        // both triangles of an interior cell
        let cell: Vec<u32> = dm
            .triangle_ids()
            .filter(|&t| {
                let c = dm.triangle_centroid(t);
                c.x > 1.0 && c.x < 2.0 && c.y > 1.0 && c.y < 2.0
            })
            .collect();
        assert_eq!(cell.len(), 2);
        dm.remove_triangles(&cell, false);
        let loops = dm.boundary_loops();
        assert_eq!(loops.len(), 2);
        assert!(loops.iter().any(|l| l.len() == 4));
    }
}
