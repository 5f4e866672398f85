//! Plane cuts of a triangle group selection.
//!
//! The cut removes everything on the positive side of the plane, that is
//! where `(p - origin) . normal > 0`. Edges crossing the plane are split and
//! the new vertex is placed exactly on the plane, so the open border left by
//! the removal is a clean planar loop.
//!
//! The selection is expressed through triangle groups rather than triangle
//! ids: splitting an edge creates new triangles that inherit the group of the
//! triangle they came from, so a group filter describes the same surface
//! before and after the splits.

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::dynamic::DynamicMesh;
use crate::error::{MeshError, MeshResult};
use crate::loops::BoundaryLoop;
use crate::tracing_ext::OperationTimer;

/// Distance below which a vertex counts as lying on the plane.
pub const PLANE_EPSILON: f64 = 1e-6;

/// An oriented plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlane {
    pub origin: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl CutPlane {
    /// Fails when `normal` has no direction.
    pub fn new(origin: Point3<f64>, normal: Vector3<f64>) -> MeshResult<Self> {
        let normal = normal
            .try_normalize(1e-12)
            .ok_or_else(|| MeshError::cut_failed("plane normal has zero length"))?;
        Ok(Self { origin, normal })
    }

    /// Horizontal plane at height `z` with the given normal direction along Z.
    pub fn horizontal(z: f64, upward: bool) -> Self {
        let normal = if upward { Vector3::z() } else { -Vector3::z() };
        Self {
            origin: Point3::new(0.0, 0.0, z),
            normal,
        }
    }

    #[inline]
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        (p - self.origin).dot(&self.normal)
    }

    /// -1, 0 or 1 with a band of [`PLANE_EPSILON`] around the plane.
    #[inline]
    pub fn side(&self, p: &Point3<f64>) -> i8 {
        let d = self.signed_distance(p);
        if d > PLANE_EPSILON {
            1
        } else if d < -PLANE_EPSILON {
            -1
        } else {
            0
        }
    }

    pub fn project(&self, p: &Point3<f64>) -> Point3<f64> {
        p - self.normal * self.signed_distance(p)
    }
}

/// Outcome of [`plane_cut`].
#[derive(Debug, Clone, Default)]
pub struct PlaneCut {
    /// Boundary loops lying entirely on the plane after the removal.
    pub loops: Vec<BoundaryLoop>,
    pub removed_triangles: usize,
    pub split_edges: usize,
}

/// Cut the triangles whose group passes `group_filter` with `plane`.
///
/// Triangles outside the selection are never removed, though they may gain a
/// vertex where a shared crossing edge is split. Fails when the selection is
/// empty.
pub fn plane_cut(
    mesh: &mut DynamicMesh,
    plane: &CutPlane,
    group_filter: impl Fn(i32) -> bool,
) -> MeshResult<PlaneCut> {
    let _timer = OperationTimer::with_context(
        "plane_cut",
        mesh.triangle_count(),
        mesh.vertex_count(),
    );

    let selected: Vec<u32> = mesh
        .triangle_ids()
        .filter(|&t| group_filter(mesh.group(t)))
        .collect();
    if selected.is_empty() {
        return Err(MeshError::cut_failed("no triangles match the group selection"));
    }

    let mut crossing: Vec<[u32; 2]> = Vec::new();
    for &t in &selected {
        let tri = mesh.triangle(t);
        for i in 0..3 {
            let (a, b) = (tri[i], tri[(i + 1) % 3]);
            let (sa, sb) = (plane.side(&mesh.position(a)), plane.side(&mesh.position(b)));
            if sa * sb < 0 {
                crossing.push([a.min(b), a.max(b)]);
            }
        }
    }
    crossing.sort_unstable();
    crossing.dedup();

    let mut split_edges = 0usize;
    for [a, b] in crossing {
        let da = plane.signed_distance(&mesh.position(a));
        let db = plane.signed_distance(&mesh.position(b));
        let t = da / (da - db);
        match mesh.split_edge(a, b, t) {
            Ok(m) => {
                let p = plane.project(&mesh.position(m));
                mesh.set_position(m, p);
                split_edges += 1;
            }
            Err(err) => {
                return Err(MeshError::edit_rejected("plane_cut split", err));
            }
        }
    }

    let doomed: Vec<u32> = mesh
        .triangle_ids()
        .filter(|&t| group_filter(mesh.group(t)))
        .filter(|&t| {
            mesh.triangle(t)
                .iter()
                .any(|&v| plane.side(&mesh.position(v)) > 0)
        })
        .collect();
    let removed_triangles = mesh.remove_triangles(&doomed, true);

    let loops: Vec<BoundaryLoop> = mesh
        .boundary_loops()
        .into_iter()
        .filter(|l| {
            l.vertices
                .iter()
                .all(|&v| plane.side(&mesh.position(v)) == 0)
        })
        .collect();

    debug!(
        split_edges,
        removed_triangles,
        loops = loops.len(),
        "Plane cut"
    );
    Ok(PlaneCut {
        loops,
        removed_triangles,
        split_edges,
    })
}
