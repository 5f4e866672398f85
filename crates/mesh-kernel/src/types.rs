//! Core mesh data types.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// RGB color with 8-bit components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl VertexColor {
    /// Colour of a shell computed from up-to-date inputs.
    pub const LIGHT_GREEN: VertexColor = VertexColor::new(144, 238, 144);
    /// Colour of a shell computed while its inputs changed underneath it.
    pub const SELECTION_GOLD: VertexColor = VertexColor::new(255, 196, 0);
    /// Colour of a fallback mesh returned after a stage failure.
    pub const VIDEO_RED: VertexColor = VertexColor::new(204, 0, 0);

    /// Create a new color from RGB components.
    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a color from floating point values in [0, 1] range.
    #[inline]
    pub fn from_float(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: (r.clamp(0.0, 1.0) * 255.0).round() as u8,
            g: (g.clamp(0.0, 1.0) * 255.0).round() as u8,
            b: (b.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }

    /// Convert to floating point values in [0, 1] range.
    #[inline]
    pub fn to_float(&self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

/// A vertex of a compact [`Mesh`].
///
/// Coordinates are in millimetres, Z up.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// 3D position.
    pub position: Point3<f64>,

    /// Unit normal vector, computed from adjacent faces.
    pub normal: Option<Vector3<f64>>,

    /// Vertex color (RGB).
    pub color: Option<VertexColor>,
}

impl Vertex {
    /// Create a new vertex with only position set.
    #[inline]
    pub fn new(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            color: None,
        }
    }

    /// Create a vertex from raw coordinates.
    #[inline]
    pub fn from_coords(x: f64, y: f64, z: f64) -> Self {
        Self::new(Point3::new(x, y, z))
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create an empty (inverted) bounding box.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    pub fn from_min_max(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Bounding box of a set of points, `None` when the iterator is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut bbox = Self::empty();
        let mut any = false;
        for p in points {
            bbox.expand_point(p);
            any = true;
        }
        any.then_some(bbox)
    }

    pub fn expand(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    pub fn expand_point(&mut self, point: &Point3<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Check if this bounding box is valid (non-empty).
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Full size along each axis.
    pub fn diagonal(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Half size along each axis.
    pub fn extents(&self) -> Vector3<f64> {
        self.diagonal() * 0.5
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.z - self.min.z
    }

    /// Get the index of the longest axis (0=X, 1=Y, 2=Z).
    pub fn longest_axis(&self) -> usize {
        let d = self.diagonal();
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    /// Squared distance from a point to the box, zero inside.
    pub fn distance_squared(&self, p: &Point3<f64>) -> f64 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }

    /// Slab test. Returns the entry parameter of the ray if it hits within `t_max`.
    pub fn ray_entry(&self, origin: &Point3<f64>, inv_dir: &Vector3<f64>, t_max: f64) -> Option<f64> {
        let mut t0 = 0.0_f64;
        let mut t1 = t_max;
        for axis in 0..3 {
            let ta = (self.min[axis] - origin[axis]) * inv_dir[axis];
            let tb = (self.max[axis] - origin[axis]) * inv_dir[axis];
            let (near, far) = if ta <= tb { (ta, tb) } else { (tb, ta) };
            // NaN from 0 * inf leaves the slab unconstrained
            if !near.is_nan() {
                t0 = t0.max(near);
            }
            if !far.is_nan() {
                t1 = t1.min(far);
            }
            if t0 > t1 {
                return None;
            }
        }
        Some(t0)
    }

    pub fn padded(&self, padding: f64) -> Self {
        let pad = Vector3::repeat(padding);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}

/// A compact triangle mesh with indexed vertices, faces and per-face groups.
///
/// This is the immutable snapshot type passed between pipeline stages. Edit it
/// through [`crate::DynamicMesh`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex data.
    pub vertices: Vec<Vertex>,

    /// Triangle faces as indices into the vertex array.
    /// Each face is [v0, v1, v2] with counter-clockwise winding.
    pub faces: Vec<[u32; 3]>,

    /// Triangle group id per face. Empty means every face is in group 0.
    pub groups: Vec<i32>,
}

impl Mesh {
    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mesh from raw positions and faces, all in group 0.
    pub fn from_parts(positions: Vec<Point3<f64>>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            vertices: positions.into_iter().map(Vertex::new).collect(),
            faces,
            groups: Vec::new(),
        }
    }

    /// Number of vertices in the mesh.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of faces (triangles) in the mesh.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if mesh is empty (no vertices or faces).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Group of a face, 0 when no groups are stored.
    #[inline]
    pub fn group(&self, face: usize) -> i32 {
        self.groups.get(face).copied().unwrap_or(0)
    }

    /// Compute the axis-aligned bounding box.
    /// Returns (min_corner, max_corner) or None if mesh is empty.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        self.aabb().map(|b| (b.min, b.max))
    }

    pub fn aabb(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| &v.position))
    }

    /// Iterate over triangles, yielding Triangle structs with actual vertex data.
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.faces.iter().map(|&[i0, i1, i2]| Triangle {
            v0: self.vertices[i0 as usize].position,
            v1: self.vertices[i1 as usize].position,
            v2: self.vertices[i2 as usize].position,
        })
    }

    /// Get a specific triangle by face index.
    pub fn triangle(&self, face_idx: usize) -> Option<Triangle> {
        self.faces.get(face_idx).map(|&[i0, i1, i2]| Triangle {
            v0: self.vertices[i0 as usize].position,
            v1: self.vertices[i1 as usize].position,
            v2: self.vertices[i2 as usize].position,
        })
    }

    /// Translate mesh by the given vector.
    pub fn translate(&mut self, offset: Vector3<f64>) {
        for vertex in &mut self.vertices {
            vertex.position += offset;
        }
    }

    /// Apply a rigid transform to positions and normals.
    pub fn transform(&mut self, iso: &Isometry3<f64>) {
        for vertex in &mut self.vertices {
            vertex.position = iso * vertex.position;
            if let Some(n) = vertex.normal.as_mut() {
                *n = iso.rotation * *n;
            }
        }
    }

    /// Paint every vertex with one colour.
    pub fn set_color(&mut self, color: VertexColor) {
        for vertex in &mut self.vertices {
            vertex.color = Some(color);
        }
    }

    /// Compute the signed volume of the mesh.
    ///
    /// Sum of signed tetrahedra formed by each face and the origin. Positive
    /// for a closed mesh with outward normals, negative when inside-out, and
    /// not meaningful for open meshes.
    pub fn signed_volume(&self) -> f64 {
        let mut volume = 0.0;
        for tri in self.triangles() {
            volume += tri.v0.coords.dot(&tri.v1.coords.cross(&tri.v2.coords));
        }
        volume / 6.0
    }

    /// Compute the total surface area of the mesh.
    pub fn surface_area(&self) -> f64 {
        self.triangles().map(|tri| tri.area()).sum()
    }

    /// Number of faces per group, sorted by group id.
    pub fn group_histogram(&self) -> Vec<(i32, usize)> {
        let mut counts: std::collections::BTreeMap<i32, usize> = Default::default();
        for f in 0..self.faces.len() {
            *counts.entry(self.group(f)).or_default() += 1;
        }
        counts.into_iter().collect()
    }
}

/// A triangle with concrete vertex positions.
///
/// Winding is counter-clockwise when viewed from the front (normal points
/// toward viewer).
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a new triangle from three points.
    #[inline]
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Compute the (unnormalized) face normal via cross product.
    #[inline]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Compute the unit face normal.
    /// Returns None for degenerate triangles (zero area).
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len_sq = n.norm_squared();
        if len_sq > f64::EPSILON * f64::EPSILON {
            Some(n / len_sq.sqrt())
        } else {
            None
        }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    #[inline]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::from((self.v0.coords + self.v1.coords + self.v2.coords) / 3.0)
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_min_max(
            self.v0.inf(&self.v1).inf(&self.v2),
            self.v0.sup(&self.v1).sup(&self.v2),
        )
    }

    /// Returns [len01, len12, len20].
    #[inline]
    pub fn edge_lengths(&self) -> [f64; 3] {
        [
            (self.v1 - self.v0).norm(),
            (self.v2 - self.v1).norm(),
            (self.v0 - self.v2).norm(),
        ]
    }

    /// Closest point on the triangle to `p`.
    ///
    /// Voronoi-region walk from Ericson, "Real-Time Collision Detection" 5.1.5.
    pub fn closest_point(&self, p: &Point3<f64>) -> Point3<f64> {
        let (a, b, c) = (self.v0, self.v1, self.v2);
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;
        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }
        let bp = p - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }
        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return a + ab * v;
        }
        let cp = p - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }
        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return a + ac * w;
        }
        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }
        let denom = va + vb + vc;
        if denom.abs() < f64::MIN_POSITIVE {
            return a;
        }
        let v = vb / denom;
        let w = vc / denom;
        a + ab * v + ac * w
    }

    /// Möller–Trumbore ray intersection. Returns the ray parameter of a hit
    /// from either side.
    pub fn ray_intersect(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<f64> {
        let e1 = self.v1 - self.v0;
        let e2 = self.v2 - self.v0;
        let pvec = dir.cross(&e2);
        let det = e1.dot(&pvec);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = origin - self.v0;
        let u = tvec.dot(&pvec) * inv_det;
        if !(-1e-9..=1.0 + 1e-9).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(&e1);
        let v = dir.dot(&qvec) * inv_det;
        if v < -1e-9 || u + v > 1.0 + 1e-9 {
            return None;
        }
        let t = e2.dot(&qvec) * inv_det;
        (t >= 0.0).then_some(t)
    }

    /// Signed solid angle subtended at `p`, Van Oosterom and Strackee.
    pub fn solid_angle(&self, p: &Point3<f64>) -> f64 {
        let a = self.v0 - p;
        let b = self.v1 - p;
        let c = self.v2 - p;
        let (la, lb, lc) = (a.norm(), b.norm(), c.norm());
        let numerator = a.dot(&b.cross(&c));
        let denominator = la * lb * lc + a.dot(&b) * lc + b.dot(&c) * la + c.dot(&a) * lb;
        2.0 * numerator.atan2(denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_right_triangle() -> Triangle {
        Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
    }

    fn make_unit_cube() -> Mesh {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 7, 6],
            [3, 6, 2],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        Mesh::from_parts(positions, faces)
    }

    #[test]
    fn test_triangle_normal_and_area() {
        let tri = unit_right_triangle();
        let n = tri.normal().unwrap();
        assert_relative_eq!(n.z, 1.0);
        assert_relative_eq!(tri.area(), 0.5);
    }

    #[test]
    fn test_degenerate_triangle_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.normal().is_none());
    }

    #[test]
    fn test_closest_point_regions() {
        let tri = unit_right_triangle();
        let above = tri.closest_point(&Point3::new(0.25, 0.25, 3.0));
        assert_relative_eq!(above, Point3::new(0.25, 0.25, 0.0));
        let corner = tri.closest_point(&Point3::new(-1.0, -1.0, 0.0));
        assert_relative_eq!(corner, Point3::new(0.0, 0.0, 0.0));
        let hyp = tri.closest_point(&Point3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(hyp, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_ray_intersect() {
        let tri = unit_right_triangle();
        let t = tri
            .ray_intersect(&Point3::new(0.2, 0.2, 5.0), &Vector3::new(0.0, 0.0, -1.0))
            .unwrap();
        assert_relative_eq!(t, 5.0);
        assert!(
            tri.ray_intersect(&Point3::new(2.0, 2.0, 5.0), &Vector3::new(0.0, 0.0, -1.0))
                .is_none()
        );
    }

    #[test]
    fn test_signed_volume_unit_cube() {
        let cube = make_unit_cube();
        assert_relative_eq!(cube.signed_volume(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(cube.surface_area(), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solid_angles_sum_inside_cube() {
        let cube = make_unit_cube();
        let p = Point3::new(0.5, 0.5, 0.5);
        let total: f64 = cube.triangles().map(|t| t.solid_angle(&p)).sum();
        assert_relative_eq!(total, 4.0 * std::f64::consts::PI, epsilon = 1e-9);
    }

    #[test]
    fn test_aabb_ray_entry() {
        let bbox = Aabb::from_min_max(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let dir = Vector3::new(0.0, 0.0, -1.0);
        let inv = dir.map(|d| 1.0 / d);
        let t = bbox.ray_entry(&Point3::new(0.5, 0.5, 3.0), &inv, f64::MAX).unwrap();
        assert_relative_eq!(t, 2.0);
        assert!(bbox.ray_entry(&Point3::new(2.0, 0.5, 3.0), &inv, f64::MAX).is_none());
    }

    #[test]
    fn test_group_histogram_defaults_to_zero() {
        let cube = make_unit_cube();
        assert_eq!(cube.group_histogram(), vec![(0, 12)]);
    }
}
