//! Cutting a regular polygon into a surface along a projection direction.
//!
//! The polygon lives in the plane through `origin` perpendicular to
//! `direction`. It is projected along `direction` onto the patch of surface
//! around a ray hit: edges of the patch that cross the polygon outline are
//! split on the outline, and the triangles inside are removed. The result is
//! a hole whose border follows the polygon.

use hashbrown::HashSet;
use nalgebra::{Point3, Vector2, Vector3};
use tracing::debug;

use crate::components::connected_component;
use crate::dynamic::DynamicMesh;
use crate::error::{MeshError, MeshResult};
use crate::loops::BoundaryLoop;
use crate::spatial::RayHit;
use crate::tracing_ext::OperationTimer;

const MAX_REFINE_ROUNDS: usize = 8;
const BISECTION_STEPS: usize = 60;

/// A regular polygon with a projection direction.
#[derive(Debug, Clone)]
pub struct ProjectedPolygon {
    origin: Point3<f64>,
    direction: Vector3<f64>,
    u: Vector3<f64>,
    v: Vector3<f64>,
    vertices: Vec<Vector2<f64>>,
    radius: f64,
}

impl ProjectedPolygon {
    /// Polygon inscribed in a circle of `radius` with `sides` corners, the
    /// first at `angle_shift` radians from the frame's U axis.
    pub fn circle(
        origin: Point3<f64>,
        direction: Vector3<f64>,
        radius: f64,
        sides: usize,
        angle_shift: f64,
    ) -> MeshResult<Self> {
        let direction = direction
            .try_normalize(1e-12)
            .ok_or_else(|| MeshError::cut_failed("projection direction has zero length"))?;
        if radius <= 0.0 || sides < 3 {
            return Err(MeshError::cut_failed(format!(
                "polygon needs a positive radius and 3 or more sides, got r={radius} n={sides}"
            )));
        }
        let helper = if direction.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let u = helper.cross(&direction).normalize();
        let v = direction.cross(&u);
        let vertices = (0..sides)
            .map(|i| {
                let a = std::f64::consts::TAU * i as f64 / sides as f64 + angle_shift;
                Vector2::new(radius * a.cos(), radius * a.sin())
            })
            .collect();
        Ok(Self {
            origin,
            direction,
            u,
            v,
            vertices,
            radius,
        })
    }

    pub fn sides(&self) -> usize {
        self.vertices.len()
    }

    pub fn direction(&self) -> Vector3<f64> {
        self.direction
    }

    /// Length of one polygon edge.
    pub fn edge_length(&self) -> f64 {
        (self.vertices[1] - self.vertices[0]).norm()
    }

    /// Coordinates of `p` in the polygon plane.
    pub fn project(&self, p: &Point3<f64>) -> Vector2<f64> {
        let d = p - self.origin;
        Vector2::new(d.dot(&self.u), d.dot(&self.v))
    }

    /// Negative inside, zero on the outline, positive outside.
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        let q = self.project(p);
        let n = self.vertices.len();
        (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                let e = b - a;
                let outward = Vector2::new(e.y, -e.x).normalize();
                outward.dot(&(q - a))
            })
            .fold(f64::MIN, f64::max)
    }

    fn touches_window(&self, mesh: &DynamicMesh, t: u32, margin: f64) -> bool {
        let reach = self.radius + margin;
        let mut lo = Vector2::new(f64::MAX, f64::MAX);
        let mut hi = Vector2::new(f64::MIN, f64::MIN);
        for v in mesh.triangle(t) {
            let q = self.project(&mesh.position(v));
            lo = lo.inf(&q);
            hi = hi.sup(&q);
        }
        lo.x <= reach && hi.x >= -reach && lo.y <= reach && hi.y >= -reach
    }
}

/// Outcome of [`insert_polygon`].
#[derive(Debug, Clone)]
pub struct InsertedHole {
    /// Border of the new hole, following triangle winding.
    pub boundary: BoundaryLoop,
    pub removed_triangles: usize,
    pub split_edges: usize,
}

/// Cut `polygon` into the surface around `hit` and remove its interior.
///
/// Only triangles connected to the hit triangle, near the polygon and facing
/// the same way relative to the projection direction take part, so a ray that
/// passes through a closed part only opens the side it hit.
pub fn insert_polygon(
    mesh: &mut DynamicMesh,
    polygon: &ProjectedPolygon,
    hit: &RayHit,
) -> MeshResult<InsertedHole> {
    let _timer = OperationTimer::with_context(
        "insert_polygon",
        mesh.triangle_count(),
        mesh.vertex_count(),
    );
    if !mesh.is_triangle(hit.triangle) {
        return Err(MeshError::query_missed(format!(
            "hit triangle {} is not in the mesh",
            hit.triangle
        )));
    }
    let facing = mesh.triangle_normal(hit.triangle).dot(&polygon.direction).signum();
    let margin = polygon.edge_length();
    let in_patch = |m: &DynamicMesh, t: u32| {
        m.triangle_normal(t).dot(&polygon.direction) * facing > 0.0
            && polygon.touches_window(m, t, margin)
    };

    // bring the patch resolution down to the polygon edge length
    for _ in 0..MAX_REFINE_ROUNDS {
        let patch = connected_component(mesh, hit.triangle, &in_patch);
        let mut long: Vec<[u32; 2]> = Vec::new();
        for &t in &patch {
            let tri = mesh.triangle(t);
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                if (mesh.position(a) - mesh.position(b)).norm() > margin {
                    long.push([a.min(b), a.max(b)]);
                }
            }
        }
        long.sort_unstable();
        long.dedup();
        if long.is_empty() {
            break;
        }
        for [a, b] in long {
            if mesh.is_edge(a, b) {
                mesh.split_edge(a, b, 0.5)
                    .map_err(|e| MeshError::edit_rejected("insert_polygon refine", e))?;
            }
        }
    }

    let patch = connected_component(mesh, hit.triangle, &in_patch);
    let tolerance = 1e-7 * polygon.radius.max(1.0);

    let mut crossing: Vec<[u32; 2]> = Vec::new();
    for &t in &patch {
        let tri = mesh.triangle(t);
        for i in 0..3 {
            let (a, b) = (tri[i], tri[(i + 1) % 3]);
            let fa = polygon.signed_distance(&mesh.position(a));
            let fb = polygon.signed_distance(&mesh.position(b));
            if (fa < -tolerance && fb > tolerance) || (fa > tolerance && fb < -tolerance) {
                crossing.push([a.min(b), a.max(b)]);
            }
        }
    }
    crossing.sort_unstable();
    crossing.dedup();

    let mut split_edges = 0usize;
    for [a, b] in crossing {
        let pa = mesh.position(a);
        let pb = mesh.position(b);
        let t = outline_crossing(polygon, &pa, &pb);
        mesh.split_edge(a, b, t)
            .map_err(|e| MeshError::edit_rejected("insert_polygon split", e))?;
        split_edges += 1;
    }

    let patch: HashSet<u32> = connected_component(mesh, hit.triangle, &in_patch)
        .into_iter()
        .collect();
    let inside = |m: &DynamicMesh, t: u32| {
        patch.contains(&t) && polygon.signed_distance(&m.triangle_centroid(t)) < 0.0
    };
    let start = patch
        .iter()
        .copied()
        .filter(|&t| inside(mesh, t))
        .min_by(|&a, &b| {
            let da = (mesh.triangle_centroid(a) - hit.point).norm_squared();
            let db = (mesh.triangle_centroid(b) - hit.point).norm_squared();
            da.total_cmp(&db)
        })
        .ok_or_else(|| MeshError::cut_failed("polygon does not cover any triangle"))?;
    let interior = connected_component(mesh, start, inside);
    let removed_triangles = mesh.remove_triangles(&interior, true);

    let on_outline = |v: u32| polygon.signed_distance(&mesh.position(v)).abs() <= 10.0 * tolerance;
    let boundary = mesh
        .boundary_loops()
        .into_iter()
        .find(|l| l.len() >= 3 && l.vertices.iter().all(|&v| on_outline(v)))
        .ok_or_else(|| MeshError::cut_failed("polygon hole is not closed"))?;

    debug!(
        removed_triangles,
        split_edges,
        loop_vertices = boundary.len(),
        "Inserted polygon"
    );
    Ok(InsertedHole {
        boundary,
        removed_triangles,
        split_edges,
    })
}

/// Parameter along `a -> b` where the outline is crossed.
fn outline_crossing(polygon: &ProjectedPolygon, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    let inside_at_a = polygon.signed_distance(a) < 0.0;
    let (mut lo, mut hi) = (0.0, 1.0);
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        let inside = polygon.signed_distance(&(a + (b - a) * mid)) < 0.0;
        if inside == inside_at_a {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{capped_cylinder, planar_grid};
    use crate::spatial::SpatialIndex;
    use approx::assert_relative_eq;

    #[test]
    fn test_octagon_into_grid() {
        let mut dm = DynamicMesh::from_mesh(&planar_grid(20, 20, 1.0));
        let center = Point3::new(10.3, 9.8, 0.0);
        let origin = center + Vector3::new(0.0, 0.0, 50.0);
        let polygon = ProjectedPolygon::circle(origin, -Vector3::z(), 3.0, 8, 0.1).unwrap();
        let hit = SpatialIndex::build(&dm).ray_hit(&origin, &-Vector3::z()).unwrap();

        let area_before: f64 = dm.triangle_ids().map(|t| dm.triangle_geometry(t).area()).sum();
        let hole = insert_polygon(&mut dm, &polygon, &hit).unwrap();
        let area_after: f64 = dm.triangle_ids().map(|t| dm.triangle_geometry(t).area()).sum();

        assert!(hole.split_edges > 0);
        assert_eq!(dm.boundary_loops().len(), 2);
        for p in hole.boundary.positions(&dm) {
            assert_relative_eq!(polygon.signed_distance(&p), 0.0, epsilon = 1e-5);
        }
        let octagon = 0.5 * 8.0 * 9.0 * (std::f64::consts::TAU / 8.0).sin();
        let removed = area_before - area_after;
        assert!((removed - octagon).abs() < 0.1 * octagon, "removed {removed}");
    }

    #[test]
    fn test_only_hit_side_of_cylinder_opens() {
        let mut dm = DynamicMesh::from_mesh(&capped_cylinder(10.0, 20.0, 48, 2.0, false));
        let origin = Point3::new(-50.0, 0.3, 10.2);
        let polygon = ProjectedPolygon::circle(origin, Vector3::x(), 2.0, 12, 0.0).unwrap();
        let hit = SpatialIndex::build(&dm).ray_hit(&origin, &Vector3::x()).unwrap();
        assert!(hit.point.x < 0.0);

        let hole = insert_polygon(&mut dm, &polygon, &hit).unwrap();
        assert!(hole.removed_triangles > 0);
        assert_eq!(dm.boundary_loops().len(), 1);
        assert!(hole.boundary.positions(&dm).iter().all(|p| p.x < 0.0));
    }

    #[test]
    fn test_polygon_signed_distance() {
        let polygon =
            ProjectedPolygon::circle(Point3::origin(), Vector3::z(), 1.0, 4, 0.0).unwrap();
        assert!(polygon.signed_distance(&Point3::new(0.0, 0.0, 5.0)) < 0.0);
        assert!(polygon.signed_distance(&Point3::new(2.0, 0.0, -3.0)) > 0.0);
        assert_relative_eq!(
            polygon.signed_distance(&Point3::new(0.5, 0.5, 0.0)).abs(),
            0.0,
            epsilon = 1e-12
        );
        assert!(ProjectedPolygon::circle(Point3::origin(), Vector3::z(), 1.0, 2, 0.0).is_err());
    }
}
