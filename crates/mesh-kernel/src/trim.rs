//! Trimming a surface along a closed curve.
//!
//! The curve is a closed polyline lying roughly on the surface. Vertices near
//! the curve are classified by which side of the curve they fall on, measured
//! in the tangent plane of the surface. Edges that change side are split at
//! the zero crossing, which leaves a chain of cut edges along the curve. The
//! region containing the seed point is flood filled without crossing that
//! chain and removed.

use std::collections::VecDeque;

use hashbrown::HashSet;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::dynamic::DynamicMesh;
use crate::error::{MeshError, MeshResult};
use crate::spatial::SpatialIndex;
use crate::tracing_ext::OperationTimer;

const SIDE_EPSILON: f64 = 1e-9;

/// Outcome of [`trim_by_curve`].
#[derive(Debug, Clone, Default)]
pub struct TrimReport {
    pub removed_triangles: usize,
    pub split_edges: usize,
    pub cut_vertices: usize,
    pub seed_triangle: u32,
}

/// A closed polyline projected onto a surface, with a surface normal at each
/// sample.
#[derive(Debug, Clone)]
struct SurfaceCurve {
    points: Vec<Point3<f64>>,
    normals: Vec<Vector3<f64>>,
}

/// Closest point on a closed polyline.
#[derive(Debug, Clone, Copy)]
struct CurveFoot {
    point: Point3<f64>,
    tangent: Vector3<f64>,
    normal: Vector3<f64>,
    distance: f64,
}

impl SurfaceCurve {
    fn project(index: &SpatialIndex, mesh: &DynamicMesh, curve: &[Point3<f64>]) -> Option<Self> {
        let mut points = Vec::with_capacity(curve.len());
        let mut normals = Vec::with_capacity(curve.len());
        for p in curve {
            let hit = index.nearest(p)?;
            points.push(hit.point);
            normals.push(mesh.triangle_normal(hit.triangle));
        }
        // drop consecutive duplicates, they have no tangent
        let mut keep = Vec::with_capacity(points.len());
        for i in 0..points.len() {
            let next = (i + 1) % points.len();
            if (points[next] - points[i]).norm() > SIDE_EPSILON {
                keep.push(i);
            }
        }
        if keep.len() < 3 {
            return None;
        }
        Some(Self {
            points: keep.iter().map(|&i| points[i]).collect(),
            normals: keep.iter().map(|&i| normals[i]).collect(),
        })
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn segment_tangent(&self, i: usize) -> Vector3<f64> {
        let j = (i + 1) % self.len();
        (self.points[j] - self.points[i])
            .try_normalize(1e-15)
            .unwrap_or_else(Vector3::x)
    }

    fn max_segment_length(&self) -> f64 {
        (0..self.len())
            .map(|i| (self.points[(i + 1) % self.len()] - self.points[i]).norm())
            .fold(0.0, f64::max)
    }

    fn closest(&self, p: &Point3<f64>) -> CurveFoot {
        let n = self.len();
        let mut best = (f64::MAX, 0usize, 0.0f64);
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            let ab = b - a;
            let len2 = ab.norm_squared();
            let u = if len2 > 0.0 {
                ((p - a).dot(&ab) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let d2 = (p - (a + ab * u)).norm_squared();
            if d2 < best.0 {
                best = (d2, i, u);
            }
        }
        let (d2, i, u) = best;
        let j = (i + 1) % n;
        let point = self.points[i] + (self.points[j] - self.points[i]) * u;

        // at a sample the side test uses the mean of both segment directions
        let tangent = if u <= 0.0 {
            let prev = self.segment_tangent((i + n - 1) % n);
            (prev + self.segment_tangent(i))
                .try_normalize(1e-12)
                .unwrap_or_else(|| self.segment_tangent(i))
        } else if u >= 1.0 {
            (self.segment_tangent(i) + self.segment_tangent(j))
                .try_normalize(1e-12)
                .unwrap_or_else(|| self.segment_tangent(i))
        } else {
            self.segment_tangent(i)
        };
        let normal = self.normals[i]
            .lerp(&self.normals[j], u)
            .try_normalize(1e-12)
            .unwrap_or(self.normals[i]);

        CurveFoot {
            point,
            tangent,
            normal,
            distance: d2.sqrt(),
        }
    }
}

/// Remove the part of `mesh` on the seed side of the closed `curve`.
///
/// `seed_point` picks the region to remove: the triangle nearest to it is the
/// start of the flood fill. Fails when the curve does not separate the
/// surface, or when the mesh or curve is empty.
pub fn trim_by_curve(
    mesh: &mut DynamicMesh,
    curve: &[Point3<f64>],
    seed_point: &Point3<f64>,
) -> MeshResult<TrimReport> {
    let _timer = OperationTimer::with_context(
        "trim_by_curve",
        mesh.triangle_count(),
        mesh.vertex_count(),
    );
    if mesh.triangle_count() == 0 {
        return Err(MeshError::empty_mesh("nothing to trim"));
    }
    if curve.len() < 3 {
        return Err(MeshError::trim_failed(format!(
            "trim curve needs at least 3 samples, got {}",
            curve.len()
        )));
    }

    let index = SpatialIndex::build(mesh);
    let surface_curve = SurfaceCurve::project(&index, mesh, curve)
        .ok_or_else(|| MeshError::trim_failed("trim curve collapses to a point"))?;

    let mean_edge = mesh.edge_length_stats().map_or(1.0, |(_, mean, _)| mean);
    let band = 2.0 * mean_edge.max(surface_curve.max_segment_length());
    let crossing_tolerance = 0.5 * band;

    let sides = classify_vertices(mesh, &surface_curve, band);

    let mut cut: HashSet<u32> = sides
        .iter()
        .enumerate()
        .filter_map(|(v, s)| match s {
            Some(s) if s.abs() <= SIDE_EPSILON => Some(v as u32),
            _ => None,
        })
        .collect();

    let mut crossing: Vec<[u32; 2]> = Vec::new();
    for [a, b] in mesh.edges() {
        let (Some(sa), Some(sb)) = (sides[a as usize], sides[b as usize]) else {
            continue;
        };
        if (sa > SIDE_EPSILON && sb < -SIDE_EPSILON) || (sa < -SIDE_EPSILON && sb > SIDE_EPSILON) {
            crossing.push([a, b]);
        }
    }

    let mut split_edges = 0usize;
    for [a, b] in crossing {
        let (Some(sa), Some(sb)) = (sides[a as usize], sides[b as usize]) else {
            continue;
        };
        let t = sa / (sa - sb);
        let (pa, pb) = (mesh.position(a), mesh.position(b));
        let at = pa + (pb - pa) * t;
        if surface_curve.closest(&at).distance > crossing_tolerance {
            continue;
        }
        match mesh.split_edge(a, b, t) {
            Ok(m) => {
                cut.insert(m);
                split_edges += 1;
            }
            Err(err) => warn!(a, b, %err, "Skipping trim crossing"),
        }
    }

    let index = SpatialIndex::build(mesh);
    let seed = index
        .nearest(seed_point)
        .ok_or_else(|| MeshError::query_missed("no triangle near the trim seed"))?
        .triangle;

    let region = flood_without_crossing(mesh, seed, &cut);
    if region.len() == mesh.triangle_count() {
        return Err(MeshError::trim_failed(
            "trim curve does not separate the surface",
        ));
    }
    let removed_triangles = mesh.remove_triangles(&region, true);

    debug!(
        removed_triangles,
        split_edges,
        cut_vertices = cut.len(),
        "Trimmed by curve"
    );
    Ok(TrimReport {
        removed_triangles,
        split_edges,
        cut_vertices: cut.len(),
        seed_triangle: seed,
    })
}

/// Signed side of each vertex within `band` of the curve, indexed by vertex id.
fn classify_vertices(mesh: &DynamicMesh, curve: &SurfaceCurve, band: f64) -> Vec<Option<f64>> {
    let positions: Vec<Option<Point3<f64>>> = (0..mesh.max_vertex_id())
        .map(|v| mesh.is_vertex(v).then(|| mesh.position(v)))
        .collect();
    positions
        .par_iter()
        .map(|p| {
            let p = (*p)?;
            let foot = curve.closest(&p);
            if foot.distance > band {
                return None;
            }
            let across = foot.tangent.cross(&foot.normal);
            Some((p - foot.point).dot(&across))
        })
        .collect()
}

/// Triangles reachable from `seed` through edges that are not cut edges.
fn flood_without_crossing(mesh: &DynamicMesh, seed: u32, cut: &HashSet<u32>) -> Vec<u32> {
    let mut visited = HashSet::new();
    visited.insert(seed);
    let mut queue = VecDeque::from([seed]);
    while let Some(t) = queue.pop_front() {
        let tri = mesh.triangle(t);
        for i in 0..3 {
            let (a, b) = (tri[i], tri[(i + 1) % 3]);
            if cut.contains(&a) && cut.contains(&b) {
                continue;
            }
            for n in mesh.edge_triangles(a, b) {
                if visited.insert(n) {
                    queue.push_back(n);
                }
            }
        }
    }
    let mut out: Vec<u32> = visited.into_iter().collect();
    out.sort_unstable();
    out
}
