//! Mesh reduction by greedy edge collapse.
//!
//! Two stopping rules are supported:
//!
//! - [`ReduceTarget::TriangleCount`]: collapse the cheapest edge by quadric
//!   error (QEM) until the triangle count drops to the target.
//! - [`ReduceTarget::MinEdgeLength`]: collapse the shortest edge until no edge
//!   is shorter than the target.
//!
//! The priority queue is lazy. Each entry remembers the edit stamps of its two
//! vertices, and entries whose stamps no longer match are discarded on pop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dynamic::DynamicMesh;
use crate::tracing_ext::{OperationTimer, log_edit_summary};

/// When to stop collapsing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReduceTarget {
    /// Stop once the mesh has at most this many triangles.
    TriangleCount(usize),
    /// Stop once every edge is at least this long.
    MinEdgeLength(f64),
}

/// Parameters for mesh reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimateParams {
    pub target: ReduceTarget,
    /// Boundary vertices keep their position and boundary edges are never
    /// collapsed. Default: true
    pub preserve_boundary: bool,
    /// Reject collapses that turn a neighbouring triangle over. Default: true
    pub prevent_normal_flips: bool,
}

impl DecimateParams {
    pub fn with_target_triangles(count: usize) -> Self {
        Self {
            target: ReduceTarget::TriangleCount(count),
            preserve_boundary: true,
            prevent_normal_flips: true,
        }
    }

    pub fn with_min_edge_length(length: f64) -> Self {
        Self {
            target: ReduceTarget::MinEdgeLength(length),
            preserve_boundary: true,
            prevent_normal_flips: true,
        }
    }
}

/// Result of a reduction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecimateResult {
    pub original_triangles: usize,
    pub final_triangles: usize,
    pub collapses_performed: usize,
    /// Collapses refused by the mesh (link condition, flips, boundary).
    pub collapses_rejected: usize,
}

/// Quadric error matrix (4x4 symmetric matrix stored as 10 values).
#[derive(Debug, Clone, Copy, Default)]
struct Quadric {
    // [a b c d]
    // [  e f g]
    // [    h i]
    // [      j]
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
    g: f64,
    h: f64,
    i: f64,
    j: f64,
}

impl Quadric {
    /// Quadric of the plane ax + by + cz + d = 0.
    fn from_plane(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            a: a * a,
            b: a * b,
            c: a * c,
            d: a * d,
            e: b * b,
            f: b * c,
            g: b * d,
            h: c * c,
            i: c * d,
            j: d * d,
        }
    }

    fn add(&mut self, other: &Quadric) {
        self.a += other.a;
        self.b += other.b;
        self.c += other.c;
        self.d += other.d;
        self.e += other.e;
        self.f += other.f;
        self.g += other.g;
        self.h += other.h;
        self.i += other.i;
        self.j += other.j;
    }

    fn sum(&self, other: &Quadric) -> Quadric {
        let mut q = *self;
        q.add(other);
        q
    }

    /// v^T * Q * v where v = [x, y, z, 1]
    fn evaluate(&self, p: &Point3<f64>) -> f64 {
        let (x, y, z) = (p.x, p.y, p.z);
        self.a * x * x
            + 2.0 * self.b * x * y
            + 2.0 * self.c * x * z
            + 2.0 * self.d * x
            + self.e * y * y
            + 2.0 * self.f * y * z
            + 2.0 * self.g * y
            + self.h * z * z
            + 2.0 * self.i * z
            + self.j
    }

    /// Minimizer of the quadric, or None if the system is singular.
    fn optimal_point(&self) -> Option<Point3<f64>> {
        let det = self.a * (self.e * self.h - self.f * self.f)
            - self.b * (self.b * self.h - self.f * self.c)
            + self.c * (self.b * self.f - self.e * self.c);
        if det.abs() < 1e-10 {
            return None;
        }
        let inv_det = 1.0 / det;
        let m00 = (self.e * self.h - self.f * self.f) * inv_det;
        let m01 = (self.c * self.f - self.b * self.h) * inv_det;
        let m02 = (self.b * self.f - self.c * self.e) * inv_det;
        let m11 = (self.a * self.h - self.c * self.c) * inv_det;
        let m12 = (self.b * self.c - self.a * self.f) * inv_det;
        let m22 = (self.a * self.e - self.b * self.b) * inv_det;
        Some(Point3::new(
            -(m00 * self.d + m01 * self.g + m02 * self.i),
            -(m01 * self.d + m11 * self.g + m12 * self.i),
            -(m02 * self.d + m12 * self.g + m22 * self.i),
        ))
    }
}

#[derive(Debug, Clone)]
struct EdgeCollapse {
    keep: u32,
    remove: u32,
    cost: f64,
    position: Point3<f64>,
    stamps: (u32, u32),
}

impl PartialEq for EdgeCollapse {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for EdgeCollapse {}

impl PartialOrd for EdgeCollapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCollapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // smaller cost pops first
        other.cost.total_cmp(&self.cost)
    }
}

/// Greedy edge-collapse reducer over a [`DynamicMesh`].
pub struct Reducer<'a> {
    mesh: &'a mut DynamicMesh,
    params: DecimateParams,
    quadrics: Vec<Quadric>,
    stamps: Vec<u32>,
    heap: BinaryHeap<EdgeCollapse>,
}

impl<'a> Reducer<'a> {
    pub fn new(mesh: &'a mut DynamicMesh, params: DecimateParams) -> Self {
        let n = mesh.max_vertex_id() as usize;
        Self {
            mesh,
            params,
            quadrics: vec![Quadric::default(); n],
            stamps: vec![0; n],
            heap: BinaryHeap::new(),
        }
    }

    pub fn run(mut self) -> DecimateResult {
        let _timer = OperationTimer::with_context(
            "reduce",
            self.mesh.triangle_count(),
            self.mesh.vertex_count(),
        );
        let mut result = DecimateResult {
            original_triangles: self.mesh.triangle_count(),
            ..Default::default()
        };
        if self.is_done() {
            result.final_triangles = result.original_triangles;
            return result;
        }

        if matches!(self.params.target, ReduceTarget::TriangleCount(_)) {
            self.compute_quadrics();
        }
        for [a, b] in self.mesh.edges() {
            self.push_edge(a, b);
        }

        while let Some(candidate) = self.heap.pop() {
            if self.is_done() {
                break;
            }
            if let ReduceTarget::MinEdgeLength(min) = self.params.target {
                if candidate.cost >= min {
                    break;
                }
            }
            let (k, r) = (candidate.keep, candidate.remove);
            if !self.mesh.is_vertex(k)
                || !self.mesh.is_vertex(r)
                || (self.stamps[k as usize], self.stamps[r as usize]) != candidate.stamps
            {
                continue;
            }
            if self.params.prevent_normal_flips && self.flips_normal(k, r, &candidate.position) {
                result.collapses_rejected += 1;
                continue;
            }
            match self.mesh.collapse_edge(k, r) {
                Ok(_) => {
                    result.collapses_performed += 1;
                    self.stamps[r as usize] += 1;
                    if self.mesh.is_vertex(k) {
                        self.mesh.set_position(k, candidate.position);
                        let merged = self.quadrics[r as usize];
                        self.quadrics[k as usize].add(&merged);
                        self.stamps[k as usize] += 1;
                        for n in self.mesh.vertex_neighbors(k) {
                            self.push_edge(k, n);
                        }
                    }
                }
                Err(_) => result.collapses_rejected += 1,
            }
        }

        result.final_triangles = self.mesh.triangle_count();
        log_edit_summary(
            "reduce",
            result.collapses_performed,
            result.collapses_rejected,
        );
        debug!(
            original = result.original_triangles,
            reduced = result.final_triangles,
            "Reduction finished"
        );
        result
    }

    fn is_done(&self) -> bool {
        match self.params.target {
            ReduceTarget::TriangleCount(n) => self.mesh.triangle_count() <= n,
            ReduceTarget::MinEdgeLength(_) => false,
        }
    }

    fn compute_quadrics(&mut self) {
        for t in self.mesh.triangle_ids() {
            let tri = self.mesh.triangle_geometry(t);
            let Some(n) = tri.normal() else { continue };
            let d = -n.dot(&tri.v0.coords);
            let q = Quadric::from_plane(n.x, n.y, n.z, d);
            for v in self.mesh.triangle(t) {
                self.quadrics[v as usize].add(&q);
            }
        }
    }

    /// Which end survives and where it goes, or None if the edge must stay.
    fn plan(&self, a: u32, b: u32) -> Option<(u32, u32, Point3<f64>)> {
        let (pa, pb) = (self.mesh.position(a), self.mesh.position(b));
        let (ba, bb) = (
            self.mesh.is_boundary_vertex(a),
            self.mesh.is_boundary_vertex(b),
        );
        if self.params.preserve_boundary {
            match (ba, bb) {
                (true, true) => return None,
                (true, false) => return Some((a, b, pa)),
                (false, true) => return Some((b, a, pb)),
                (false, false) => {}
            }
        }
        let position = match self.params.target {
            ReduceTarget::MinEdgeLength(_) => nalgebra::center(&pa, &pb),
            ReduceTarget::TriangleCount(_) => {
                let q = self.quadrics[a as usize].sum(&self.quadrics[b as usize]);
                let mid = nalgebra::center(&pa, &pb);
                let reach = (pa - pb).norm() * 2.0;
                let optimal = q
                    .optimal_point()
                    .filter(|p| (p - mid).norm() <= reach);
                optimal.unwrap_or_else(|| {
                    [pa, pb, mid]
                        .into_iter()
                        .min_by(|x, y| q.evaluate(x).total_cmp(&q.evaluate(y)))
                        .unwrap_or(mid)
                })
            }
        };
        Some((a, b, position))
    }

    fn push_edge(&mut self, a: u32, b: u32) {
        let Some((keep, remove, position)) = self.plan(a, b) else {
            return;
        };
        let cost = match self.params.target {
            ReduceTarget::MinEdgeLength(_) => {
                (self.mesh.position(a) - self.mesh.position(b)).norm()
            }
            ReduceTarget::TriangleCount(_) => self.quadrics[a as usize]
                .sum(&self.quadrics[b as usize])
                .evaluate(&position)
                .max(0.0),
        };
        self.heap.push(EdgeCollapse {
            keep,
            remove,
            cost,
            position,
            stamps: (self.stamps[keep as usize], self.stamps[remove as usize]),
        });
    }

    fn flips_normal(&self, keep: u32, remove: u32, position: &Point3<f64>) -> bool {
        [keep, remove].into_iter().any(|v| {
            self.mesh.vertex_triangles(v).iter().any(|&t| {
                let tri = self.mesh.triangle(t);
                if tri.contains(&keep) && tri.contains(&remove) {
                    return false;
                }
                let p = |i: u32| if i == v { *position } else { self.mesh.position(i) };
                let after = (p(tri[1]) - p(tri[0])).cross(&(p(tri[2]) - p(tri[0])));
                let before = self.mesh.triangle_geometry(t).normal_unnormalized();
                after.dot(&before) <= 0.0
            })
        })
    }
}

/// Reduce to at most `count` triangles.
pub fn reduce_to_triangle_count(mesh: &mut DynamicMesh, count: usize) -> DecimateResult {
    Reducer::new(mesh, DecimateParams::with_target_triangles(count)).run()
}

/// Collapse edges until none is shorter than `length`.
pub fn reduce_to_edge_length(mesh: &mut DynamicMesh, length: f64) -> DecimateResult {
    Reducer::new(mesh, DecimateParams::with_min_edge_length(length)).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{planar_grid, uv_sphere};
    use approx::assert_relative_eq;

    #[test]
    fn test_reduce_empty_mesh() {
        let mut dm = DynamicMesh::new();
        let result = reduce_to_triangle_count(&mut dm, 10);
        assert_eq!(result.original_triangles, 0);
        assert_eq!(result.collapses_performed, 0);
    }

    #[test]
    fn test_already_at_target() {
        let mut dm = DynamicMesh::from_mesh(&planar_grid(2, 2, 1.0));
        let result = reduce_to_triangle_count(&mut dm, 100);
        assert_eq!(result.final_triangles, 8);
        assert_eq!(result.collapses_performed, 0);
    }

    #[test]
    fn test_flat_grid_reduces_and_stays_flat() {
        let mut dm = DynamicMesh::from_mesh(&planar_grid(20, 20, 1.0));
        let result = reduce_to_triangle_count(&mut dm, 200);
        assert_eq!(result.original_triangles, 800);
        assert!(result.final_triangles <= 200);
        assert_eq!(dm.non_manifold_edge_count(), 0);
        // boundary is preserved exactly
        assert_relative_eq!(dm.boundary_loops()[0].perimeter(&dm), 80.0, epsilon = 1e-9);
        for t in dm.triangle_ids() {
            assert!(dm.triangle_normal(t).z > 0.0);
        }
        for v in dm.vertex_ids() {
            assert_relative_eq!(dm.position(v).z, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sphere_keeps_shape() {
        let mut dm = DynamicMesh::from_mesh(&uv_sphere(Point3::origin(), 10.0, 32, 16));
        let result = reduce_to_triangle_count(&mut dm, 150);
        assert!(result.final_triangles <= 150);
        assert_eq!(dm.boundary_edge_count(), 0);
        for v in dm.vertex_ids() {
            let r = dm.position(v).coords.norm();
            assert!((8.0..=12.0).contains(&r), "radius {r}");
        }
    }

    #[test]
    fn test_min_edge_length_coarsens_interior() {
        let mut dm = DynamicMesh::from_mesh(&planar_grid(16, 16, 0.25));
        let result = reduce_to_edge_length(&mut dm, 1.0);
        assert!(result.collapses_performed > 0);
        assert!(result.final_triangles < result.original_triangles / 2);
        let interior: Vec<[u32; 2]> = dm
            .edges()
            .into_iter()
            .filter(|[a, b]| !dm.is_boundary_vertex(*a) && !dm.is_boundary_vertex(*b))
            .collect();
        let short = interior
            .iter()
            .filter(|[a, b]| (dm.position(*a) - dm.position(*b)).norm() < 1.0)
            .count();
        // only collapses refused by the link condition leave short edges behind
        assert!(short * 4 < interior.len().max(1), "{short} of {}", interior.len());
    }
}
