//! Bounding volume hierarchy over a triangle snapshot.
//!
//! The index copies triangle geometry at build time, so it stays valid while
//! the source mesh is edited. Rebuild it after edits that should be visible to
//! queries.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::dynamic::DynamicMesh;
use crate::types::{Aabb, Mesh, Triangle};

const MAX_LEAF_SIZE: usize = 8;

#[derive(Debug, Clone, Copy)]
struct IndexedTriangle {
    id: u32,
    group: i32,
    tri: Triangle,
    bbox: Aabb,
}

#[derive(Debug)]
enum BvhNode {
    Leaf {
        bbox: Aabb,
        items: Vec<u32>,
    },
    Internal {
        bbox: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn bbox(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { bbox, .. } | BvhNode::Internal { bbox, .. } => bbox,
        }
    }
}

/// Closest point on the indexed surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestPoint {
    pub triangle: u32,
    pub point: Point3<f64>,
    pub distance: f64,
}

/// First intersection along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub triangle: u32,
    pub group: i32,
    pub t: f64,
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

#[derive(Debug)]
pub struct SpatialIndex {
    triangles: Vec<IndexedTriangle>,
    root: Option<BvhNode>,
}

impl SpatialIndex {
    /// Index the live triangles of a dynamic mesh. Hits report mesh triangle ids.
    pub fn build(mesh: &DynamicMesh) -> Self {
        let triangles = mesh
            .triangle_ids()
            .map(|t| {
                let tri = mesh.triangle_geometry(t);
                IndexedTriangle {
                    id: t,
                    group: mesh.group(t),
                    tri,
                    bbox: tri.aabb(),
                }
            })
            .collect();
        Self::from_triangles(triangles)
    }

    /// Index a compact mesh. Hits report face indices.
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let triangles = mesh
            .triangles()
            .enumerate()
            .map(|(f, tri)| IndexedTriangle {
                id: f as u32,
                group: mesh.group(f),
                tri,
                bbox: tri.aabb(),
            })
            .collect();
        Self::from_triangles(triangles)
    }

    fn from_triangles(triangles: Vec<IndexedTriangle>) -> Self {
        let root = if triangles.is_empty() {
            None
        } else {
            let items: Vec<u32> = (0..triangles.len() as u32).collect();
            Some(Self::build_recursive(&triangles, items))
        };
        Self { triangles, root }
    }

    fn build_recursive(triangles: &[IndexedTriangle], mut items: Vec<u32>) -> BvhNode {
        let mut bbox = Aabb::empty();
        for &i in &items {
            bbox.expand(&triangles[i as usize].bbox);
        }
        if items.len() <= MAX_LEAF_SIZE {
            return BvhNode::Leaf { bbox, items };
        }

        let axis = bbox.longest_axis();
        items.sort_by(|&a, &b| {
            let ca = triangles[a as usize].bbox.center()[axis];
            let cb = triangles[b as usize].bbox.center()[axis];
            ca.total_cmp(&cb)
        });
        let right_items = items.split_off(items.len() / 2);
        BvhNode::Internal {
            bbox,
            left: Box::new(Self::build_recursive(triangles, items)),
            right: Box::new(Self::build_recursive(triangles, right_items)),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.root.as_ref().map(|r| *r.bbox())
    }

    /// Closest surface point to `p`.
    pub fn nearest(&self, p: &Point3<f64>) -> Option<NearestPoint> {
        let root = self.root.as_ref()?;
        let mut best: Option<(f64, u32, Point3<f64>)> = None;
        self.nearest_recursive(root, p, &mut best);
        best.map(|(d2, i, point)| NearestPoint {
            triangle: self.triangles[i as usize].id,
            point,
            distance: d2.sqrt(),
        })
    }

    fn nearest_recursive(
        &self,
        node: &BvhNode,
        p: &Point3<f64>,
        best: &mut Option<(f64, u32, Point3<f64>)>,
    ) {
        let bound = best.map_or(f64::MAX, |b| b.0);
        if node.bbox().distance_squared(p) > bound {
            return;
        }
        match node {
            BvhNode::Leaf { items, .. } => {
                for &i in items {
                    let q = self.triangles[i as usize].tri.closest_point(p);
                    let d2 = (q - p).norm_squared();
                    if best.is_none_or(|b| d2 < b.0) {
                        *best = Some((d2, i, q));
                    }
                }
            }
            BvhNode::Internal { left, right, .. } => {
                let dl = left.bbox().distance_squared(p);
                let dr = right.bbox().distance_squared(p);
                let (first, second) = if dl <= dr { (left, right) } else { (right, left) };
                self.nearest_recursive(first, p, best);
                self.nearest_recursive(second, p, best);
            }
        }
    }

    /// First hit along the ray `origin + t * dir`, `t >= 0`.
    pub fn ray_hit(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<RayHit> {
        self.ray_hit_filtered(origin, dir, |_, _| true)
    }

    /// First hit on a triangle accepted by `filter(triangle_id, group)`.
    pub fn ray_hit_filtered(
        &self,
        origin: &Point3<f64>,
        dir: &Vector3<f64>,
        filter: impl Fn(u32, i32) -> bool,
    ) -> Option<RayHit> {
        let root = self.root.as_ref()?;
        let dir = dir.try_normalize(1e-15)?;
        let inv_dir = dir.map(|d| 1.0 / d);
        let mut best: Option<(f64, u32)> = None;
        let mut stack: Vec<&BvhNode> = vec![root];
        while let Some(node) = stack.pop() {
            let t_max = best.map_or(f64::MAX, |b| b.0);
            if node.bbox().ray_entry(origin, &inv_dir, t_max).is_none() {
                continue;
            }
            match node {
                BvhNode::Leaf { items, .. } => {
                    for &i in items {
                        let it = &self.triangles[i as usize];
                        if !filter(it.id, it.group) {
                            continue;
                        }
                        if let Some(t) = it.tri.ray_intersect(origin, &dir) {
                            if best.is_none_or(|b| t < b.0) {
                                best = Some((t, i));
                            }
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        best.map(|(t, i)| {
            let it = &self.triangles[i as usize];
            RayHit {
                triangle: it.id,
                group: it.group,
                t,
                point: origin + dir * t,
                normal: it.tri.normal().unwrap_or_else(Vector3::zeros),
            }
        })
    }

    /// Generalized winding number of the indexed surface around `p`.
    /// Close to 1 inside a closed outward-wound surface, 0 outside.
    pub fn winding_number(&self, p: &Point3<f64>) -> f64 {
        let total: f64 = self
            .triangles
            .par_iter()
            .map(|it| it.tri.solid_angle(p))
            .sum();
        total / (4.0 * std::f64::consts::PI)
    }

    pub fn is_inside(&self, p: &Point3<f64>) -> bool {
        self.winding_number(p) > 0.5
    }
}
