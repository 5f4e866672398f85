//! Edge-path distances over the mesh graph.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::dynamic::DynamicMesh;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    distance: f64,
    vertex: u32,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // min-heap on distance
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| self.vertex.cmp(&other.vertex))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest edge-path distance from the nearest seed to every vertex, up to
/// `max_distance`.
///
/// Indexed by vertex id. Vertices farther than `max_distance`, unreachable,
/// or removed hold `f64::INFINITY`.
pub fn geodesic_distances(mesh: &DynamicMesh, seeds: &[u32], max_distance: f64) -> Vec<f64> {
    let mut dist = vec![f64::INFINITY; mesh.max_vertex_id() as usize];
    let mut heap = BinaryHeap::new();
    for &s in seeds {
        if mesh.is_vertex(s) {
            dist[s as usize] = 0.0;
            heap.push(Frontier {
                distance: 0.0,
                vertex: s,
            });
        }
    }
    while let Some(Frontier { distance, vertex }) = heap.pop() {
        if distance > dist[vertex as usize] {
            continue;
        }
        let p = mesh.position(vertex);
        for n in mesh.vertex_neighbors(vertex) {
            let d = distance + (mesh.position(n) - p).norm();
            if d <= max_distance && d < dist[n as usize] {
                dist[n as usize] = d;
                heap.push(Frontier {
                    distance: d,
                    vertex: n,
                });
            }
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::planar_grid;
    use approx::assert_relative_eq;

    #[test]
    fn test_grid_distances() {
        let dm = DynamicMesh::from_mesh(&planar_grid(10, 10, 1.0));
        let dist = geodesic_distances(&dm, &[0], 100.0);
        assert_relative_eq!(dist[0], 0.0);
        assert_relative_eq!(dist[5], 5.0);
        // (3, 3) through diagonals
        assert_relative_eq!(dist[3 * 11 + 3], 3.0 * 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_limit_and_multiple_seeds() {
        let dm = DynamicMesh::from_mesh(&planar_grid(10, 1, 1.0));
        let dist = geodesic_distances(&dm, &[0, 10], 2.5);
        assert_relative_eq!(dist[1], 1.0);
        assert_relative_eq!(dist[9], 1.0);
        assert!(dist[5].is_infinite());
    }
}
