//! Incremental isotropic remeshing on a [`DynamicMesh`].
//!
//! Each pass runs the classic sequence:
//! 1. **Edge splitting**: split edges longer than target * max_ratio
//! 2. **Edge collapsing**: collapse edges shorter than target * min_ratio
//! 3. **Edge flipping**: flip edges to improve vertex valence toward 6
//! 4. **Tangential smoothing**: relax vertices toward their one-ring centroid
//!
//! After moving or inserting a vertex the remesher asks an optional
//! [`ProjectionTarget`] where the vertex should really be. This is how a patch
//! is kept on a reference surface, how loop vertices are pulled onto sampled
//! points, and how a seam is pushed out of an offset surface.
//!
//! Three drivers share the pass machinery:
//! - [`Remesher`] remeshes a whole mesh in place.
//! - [`RegionRemesher`] copies a triangle selection into a submesh with a
//!   frozen border, remeshes it, and writes it back into the parent.
//! - [`LoopRemesher`] remeshes only one boundary loop and a few rings of
//!   triangles next to it.

use hashbrown::{HashMap, HashSet};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::components::{expand_by_rings, vertices_of};
use crate::dynamic::DynamicMesh;
use crate::error::{MeshError, MeshResult};
use crate::loops::BoundaryLoop;
use crate::points::PointIndex;
use crate::spatial::SpatialIndex;
use crate::tracing_ext::OperationTimer;

/// Where a vertex should be after it moved.
///
/// `vertex` is the id of the vertex being placed, `None` for free points.
pub trait ProjectionTarget: Send + Sync {
    fn project(&self, p: &Point3<f64>, vertex: Option<u32>) -> Point3<f64>;
}

impl ProjectionTarget for SpatialIndex {
    fn project(&self, p: &Point3<f64>, _vertex: Option<u32>) -> Point3<f64> {
        self.nearest(p).map_or(*p, |hit| hit.point)
    }
}

/// Projects onto the closest of a fixed set of sample points.
#[derive(Debug)]
pub struct PointSetTarget {
    points: Vec<Point3<f64>>,
    index: PointIndex,
}

impl PointSetTarget {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        let index = PointIndex::new(&points);
        Self { points, index }
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn nearest_index(&self, p: &Point3<f64>) -> Option<usize> {
        self.index.nearest(p).map(|(i, _)| i)
    }
}

impl ProjectionTarget for PointSetTarget {
    fn project(&self, p: &Point3<f64>, _vertex: Option<u32>) -> Point3<f64> {
        self.nearest_index(p).map_or(*p, |i| self.points[i])
    }
}

/// Parameters for isotropic remeshing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemeshParams {
    /// Target edge length for the remeshed output.
    pub target_edge_length: f64,

    /// Number of split/collapse/flip/smooth passes.
    /// Default: 5
    pub passes: usize,

    /// Smoothing factor for tangential relaxation (0 = project only, 1 = full).
    /// Default: 0.5
    pub smoothing: f64,

    /// Edges shorter than target * min_edge_ratio are collapsed.
    /// Default: 0.8
    pub min_edge_ratio: f64,

    /// Edges longer than target * max_edge_ratio are split.
    /// Default: 1.33
    pub max_edge_ratio: f64,

    pub enable_splits: bool,
    pub enable_collapses: bool,
    pub enable_flips: bool,
    pub enable_smoothing: bool,

    /// Reject collapses and flips that turn a triangle over.
    /// Default: true
    pub prevent_normal_flips: bool,

    /// Boundary vertices never move and boundary edges are never split.
    /// Default: true
    pub preserve_boundary: bool,

    /// Vertices between two triangle groups never move and the edges between
    /// groups are never split.
    /// Default: false
    pub preserve_group_boundaries: bool,
}

impl Default for RemeshParams {
    fn default() -> Self {
        Self {
            target_edge_length: 1.0,
            passes: 5,
            smoothing: 0.5,
            min_edge_ratio: 0.8,
            max_edge_ratio: 1.33,
            enable_splits: true,
            enable_collapses: true,
            enable_flips: true,
            enable_smoothing: true,
            prevent_normal_flips: true,
            preserve_boundary: true,
            preserve_group_boundaries: false,
        }
    }
}

impl RemeshParams {
    /// Create params with a specific target edge length.
    pub fn with_target_edge_length(target: f64) -> Self {
        Self {
            target_edge_length: target,
            ..Default::default()
        }
    }

    pub fn passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    pub fn smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    pub fn prevent_normal_flips(mut self, on: bool) -> Self {
        self.prevent_normal_flips = on;
        self
    }

    pub fn preserve_group_boundaries(mut self, on: bool) -> Self {
        self.preserve_group_boundaries = on;
        self
    }

    fn min_length(&self) -> f64 {
        self.target_edge_length * self.min_edge_ratio
    }

    fn max_length(&self) -> f64 {
        self.target_edge_length * self.max_edge_ratio
    }
}

/// Vertices the remesher must neither move nor remove.
#[derive(Debug, Clone, Default)]
pub struct MeshConstraints {
    fixed: HashSet<u32>,
}

impl MeshConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fix_vertex(&mut self, v: u32) {
        self.fixed.insert(v);
    }

    pub fn fix_vertices(&mut self, vs: impl IntoIterator<Item = u32>) {
        self.fixed.extend(vs);
    }

    pub fn is_fixed(&self, v: u32) -> bool {
        self.fixed.contains(&v)
    }

    pub fn len(&self) -> usize {
        self.fixed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty()
    }
}

/// Counters accumulated over remeshing passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemeshStats {
    pub passes: usize,
    pub splits: usize,
    pub collapses: usize,
    pub flips: usize,
}

impl std::ops::AddAssign for RemeshStats {
    fn add_assign(&mut self, rhs: Self) {
        self.passes += rhs.passes;
        self.splits += rhs.splits;
        self.collapses += rhs.collapses;
        self.flips += rhs.flips;
    }
}

/// How strongly a vertex is pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Lock {
    Free,
    Boundary,
    Fixed,
}

fn is_group_boundary_vertex(mesh: &DynamicMesh, v: u32) -> bool {
    let tris = mesh.vertex_triangles(v);
    tris.first()
        .is_some_and(|&t0| tris.iter().any(|&t| mesh.group(t) != mesh.group(t0)))
}

/// Unit normal estimate from incident faces.
fn vertex_normal(mesh: &DynamicMesh, v: u32) -> Option<Vector3<f64>> {
    let sum: Vector3<f64> = mesh
        .vertex_triangles(v)
        .iter()
        .map(|&t| mesh.triangle_geometry(t).normal_unnormalized())
        .sum();
    sum.try_normalize(1e-20)
}

fn triangle_normal_with(mesh: &DynamicMesh, t: u32, v: u32, p: &Point3<f64>) -> Vector3<f64> {
    let tri = mesh.triangle(t);
    let pos = |i: u32| if i == v { *p } else { mesh.position(i) };
    (pos(tri[1]) - pos(tri[0])).cross(&(pos(tri[2]) - pos(tri[0])))
}

/// In-place isotropic remesher.
pub struct Remesher<'a> {
    mesh: &'a mut DynamicMesh,
    params: RemeshParams,
    constraints: MeshConstraints,
    target: Option<&'a dyn ProjectionTarget>,
}

impl<'a> Remesher<'a> {
    pub fn new(mesh: &'a mut DynamicMesh, params: RemeshParams) -> Self {
        Self {
            mesh,
            params,
            constraints: MeshConstraints::default(),
            target: None,
        }
    }

    pub fn with_constraints(mut self, constraints: MeshConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_projection(mut self, target: &'a dyn ProjectionTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn params_mut(&mut self) -> &mut RemeshParams {
        &mut self.params
    }

    /// Run `params.passes` passes.
    pub fn run(&mut self) -> RemeshStats {
        let mut stats = RemeshStats::default();
        for _ in 0..self.params.passes {
            stats += self.basic_pass();
        }
        debug!(
            passes = stats.passes,
            splits = stats.splits,
            collapses = stats.collapses,
            flips = stats.flips,
            triangles = self.mesh.triangle_count(),
            "Remesh finished"
        );
        stats
    }

    /// One split/collapse/flip/smooth pass.
    pub fn basic_pass(&mut self) -> RemeshStats {
        let mut stats = RemeshStats {
            passes: 1,
            ..Default::default()
        };
        if self.params.target_edge_length <= 0.0 {
            return stats;
        }
        if self.params.enable_splits {
            stats.splits = self.split_pass();
        }
        if self.params.enable_collapses {
            stats.collapses = self.collapse_pass();
        }
        if self.params.enable_flips {
            stats.flips = self.flip_pass();
        }
        if self.params.enable_smoothing {
            self.smooth_pass();
        }
        stats
    }

    fn lock(&self, v: u32) -> Lock {
        if self.constraints.is_fixed(v) {
            return Lock::Fixed;
        }
        if self.params.preserve_group_boundaries && is_group_boundary_vertex(self.mesh, v) {
            return Lock::Fixed;
        }
        if self.mesh.is_boundary_vertex(v) {
            return if self.params.preserve_boundary {
                Lock::Fixed
            } else {
                Lock::Boundary
            };
        }
        Lock::Free
    }

    fn edge_locked(&self, a: u32, b: u32) -> bool {
        if self.constraints.is_fixed(a) && self.constraints.is_fixed(b) {
            return true;
        }
        let tris = self.mesh.edge_triangles(a, b);
        match tris.len() {
            1 => self.params.preserve_boundary,
            2 => {
                self.params.preserve_group_boundaries
                    && self.mesh.group(tris[0]) != self.mesh.group(tris[1])
            }
            _ => true,
        }
    }

    fn edge_length(&self, a: u32, b: u32) -> f64 {
        (self.mesh.position(a) - self.mesh.position(b)).norm()
    }

    fn project(&self, p: Point3<f64>, v: u32) -> Point3<f64> {
        match self.target {
            Some(t) => t.project(&p, Some(v)),
            None => p,
        }
    }

    fn split_pass(&mut self) -> usize {
        let max = self.params.max_length();
        let mut long: Vec<([u32; 2], f64)> = self
            .mesh
            .edges()
            .into_iter()
            .map(|[a, b]| ([a, b], self.edge_length(a, b)))
            .filter(|(_, len)| *len > max)
            .collect();
        long.sort_by(|x, y| y.1.total_cmp(&x.1));

        let mut count = 0;
        for ([a, b], _) in long {
            if !self.mesh.is_edge(a, b) || self.edge_length(a, b) <= max || self.edge_locked(a, b) {
                continue;
            }
            if let Ok(m) = self.mesh.split_edge(a, b, 0.5) {
                let p = self.project(self.mesh.position(m), m);
                self.mesh.set_position(m, p);
                count += 1;
            }
        }
        count
    }

    fn collapse_flips_normal(&self, keep: u32, remove: u32, new_pos: &Point3<f64>) -> bool {
        for v in [keep, remove] {
            for &t in self.mesh.vertex_triangles(v) {
                let tri = self.mesh.triangle(t);
                if tri.contains(&keep) && tri.contains(&remove) {
                    continue;
                }
                let before = self.mesh.triangle_geometry(t).normal_unnormalized();
                let after = triangle_normal_with(self.mesh, t, v, new_pos);
                if before.dot(&after) <= 0.0 {
                    return true;
                }
            }
        }
        false
    }

    fn collapse_pass(&mut self) -> usize {
        let min = self.params.min_length();
        let max = self.params.max_length();
        let mut short: Vec<([u32; 2], f64)> = self
            .mesh
            .edges()
            .into_iter()
            .map(|[a, b]| ([a, b], self.edge_length(a, b)))
            .filter(|(_, len)| *len < min)
            .collect();
        short.sort_by(|x, y| x.1.total_cmp(&y.1));

        let mut count = 0;
        for ([a, b], _) in short {
            if !self.mesh.is_edge(a, b) || self.edge_length(a, b) >= min {
                continue;
            }
            let (pa, pb) = (self.mesh.position(a), self.mesh.position(b));
            let midpoint = nalgebra::center(&pa, &pb);
            let (la, lb) = (self.lock(a), self.lock(b));
            let (keep, remove, new_pos) = match (la, lb) {
                (Lock::Fixed, Lock::Fixed) => continue,
                _ if la > lb => (a, b, pa),
                _ if lb > la => (b, a, pb),
                (Lock::Boundary, Lock::Boundary) => {
                    if !self.mesh.is_boundary_edge(a, b) {
                        continue;
                    }
                    (a, b, midpoint)
                }
                _ => (a, b, midpoint),
            };
            let too_long = [keep, remove].into_iter().any(|v| {
                self.mesh
                    .vertex_neighbors(v)
                    .into_iter()
                    .filter(|&n| n != keep && n != remove)
                    .any(|n| (self.mesh.position(n) - new_pos).norm() > max)
            });
            if too_long {
                continue;
            }
            if self.params.prevent_normal_flips && self.collapse_flips_normal(keep, remove, &new_pos)
            {
                continue;
            }
            if self.mesh.collapse_edge(keep, remove).is_ok() {
                if self.mesh.is_vertex(keep) {
                    let p = if new_pos == self.mesh.position(keep) {
                        new_pos
                    } else {
                        self.project(new_pos, keep)
                    };
                    self.mesh.set_position(keep, p);
                }
                count += 1;
            }
        }
        count
    }

    fn flip_pass(&mut self) -> usize {
        let mut count = 0;
        for [a, b] in self.mesh.edges() {
            let tris = self.mesh.edge_triangles(a, b);
            if tris.len() != 2 || self.mesh.group(tris[0]) != self.mesh.group(tris[1]) {
                continue;
            }
            let opposite = |t: u32| {
                self.mesh
                    .triangle(t)
                    .into_iter()
                    .find(|&v| v != a && v != b)
            };
            let (Some(c), Some(d)) = (opposite(tris[0]), opposite(tris[1])) else {
                continue;
            };
            if self.mesh.is_edge(c, d) {
                continue;
            }

            let ideal = |v: u32| if self.mesh.is_boundary_vertex(v) { 4 } else { 6 };
            let valence = |v: u32| self.mesh.vertex_neighbors(v).len() as i32;
            let (va, vb, vc, vd) = (valence(a), valence(b), valence(c), valence(d));
            let current = (va - ideal(a)).abs()
                + (vb - ideal(b)).abs()
                + (vc - ideal(c)).abs()
                + (vd - ideal(d)).abs();
            let flipped = (va - 1 - ideal(a)).abs()
                + (vb - 1 - ideal(b)).abs()
                + (vc + 1 - ideal(c)).abs()
                + (vd + 1 - ideal(d)).abs();
            if flipped >= current {
                continue;
            }

            let n0 = self.mesh.triangle_normal(tris[0]);
            let n1 = self.mesh.triangle_normal(tris[1]);
            // creases stay put
            if n0.dot(&n1) < 0.9 {
                continue;
            }
            let reference = n0 + n1;
            let (pa, pb, pc, pd) = (
                self.mesh.position(a),
                self.mesh.position(b),
                self.mesh.position(c),
                self.mesh.position(d),
            );
            // winding of the replacement triangles does not depend on which
            // side `a -> b` runs, only their orientation relative to `reference`
            let m0 = (pa - pc).cross(&(pd - pc));
            let m1 = (pb - pd).cross(&(pc - pd));
            let consistent = m0.dot(&reference).signum() == m1.dot(&reference).signum()
                && m0.norm_squared() > 1e-24
                && m1.norm_squared() > 1e-24;
            if !consistent {
                continue;
            }
            if self.mesh.flip_edge(a, b).is_ok() {
                if self.params.prevent_normal_flips {
                    let tris_after = self.mesh.edge_triangles(c, d);
                    let inverted = tris_after
                        .iter()
                        .any(|&t| self.mesh.triangle_normal(t).dot(&reference) <= 0.0);
                    if inverted {
                        // flipping back restores the original diagonal
                        let _ = self.mesh.flip_edge(c, d);
                        continue;
                    }
                }
                count += 1;
            }
        }
        count
    }

    fn smooth_pass(&mut self) {
        let movable: Vec<u32> = self
            .mesh
            .vertex_ids()
            .filter(|&v| self.lock(v) == Lock::Free && !self.mesh.vertex_triangles(v).is_empty())
            .collect();
        let mesh: &DynamicMesh = self.mesh;
        let smoothing = self.params.smoothing;
        let target = self.target;
        let moved: Vec<(u32, Point3<f64>)> = movable
            .par_iter()
            .map(|&v| {
                let p = mesh.position(v);
                let mut q = p;
                if smoothing > 0.0 {
                    let neighbors = mesh.vertex_neighbors(v);
                    let centroid = neighbors
                        .iter()
                        .fold(Vector3::zeros(), |acc, &n| acc + mesh.position(n).coords)
                        / neighbors.len() as f64;
                    let mut delta = centroid - p.coords;
                    if let Some(n) = vertex_normal(mesh, v) {
                        delta -= n * n.dot(&delta);
                    }
                    q = p + delta * smoothing;
                }
                if let Some(t) = target {
                    q = t.project(&q, Some(v));
                }
                (v, q)
            })
            .collect();
        for (v, q) in moved {
            self.mesh.set_position(v, q);
        }
    }
}

/// Remeshes a triangle selection as a detached submesh.
///
/// The selection border becomes the submesh boundary, which stays frozen, so
/// [`RegionRemesher::back_propagate`] can stitch the result into the parent
/// along the original border vertices.
#[derive(Debug)]
pub struct RegionRemesher {
    sub: DynamicMesh,
    /// Parent id for each submesh vertex copied from the parent.
    sub_to_parent: HashMap<u32, u32>,
    region: Vec<u32>,
}

impl RegionRemesher {
    pub fn new(parent: &DynamicMesh, triangles: &[u32]) -> Self {
        let mut sub = DynamicMesh::new();
        let mut parent_to_sub: HashMap<u32, u32> = HashMap::new();
        let mut sub_to_parent = HashMap::new();
        let mut region = Vec::new();
        for &t in triangles {
            if !parent.is_triangle(t) {
                continue;
            }
            let tri = parent.triangle(t).map(|v| {
                *parent_to_sub.entry(v).or_insert_with(|| {
                    let s = sub.append_vertex_with(parent.position(v), parent.normal(v), parent.color(v));
                    sub_to_parent.insert(s, v);
                    s
                })
            });
            if sub.append_triangle(tri, parent.group(t)).is_ok() {
                region.push(t);
            }
        }
        Self {
            sub,
            sub_to_parent,
            region,
        }
    }

    pub fn mesh(&self) -> &DynamicMesh {
        &self.sub
    }

    pub fn mesh_mut(&mut self) -> &mut DynamicMesh {
        &mut self.sub
    }

    pub fn region_triangle_count(&self) -> usize {
        self.region.len()
    }

    /// Parent vertex a submesh vertex was copied from.
    pub fn parent_vertex(&self, sub_vertex: u32) -> Option<u32> {
        self.sub_to_parent.get(&sub_vertex).copied()
    }

    /// Remesh the submesh with its border frozen.
    pub fn remesh(
        &mut self,
        params: &RemeshParams,
        target: Option<&dyn ProjectionTarget>,
    ) -> RemeshStats {
        let mut params = params.clone();
        params.preserve_boundary = true;
        let mut remesher = Remesher::new(&mut self.sub, params);
        if let Some(t) = target {
            remesher = remesher.with_projection(t);
        }
        remesher.run()
    }

    /// Replace the selected parent triangles with the remeshed submesh.
    pub fn back_propagate(self, parent: &mut DynamicMesh) -> MeshResult<()> {
        let _timer = OperationTimer::new("region_back_propagate");
        let old_vertices = vertices_of(parent, &self.region);
        parent.remove_triangles(&self.region, false);

        let mut sub_to_new: HashMap<u32, u32> = HashMap::new();
        for s in self.sub.vertex_ids() {
            let id = match self.sub_to_parent.get(&s) {
                Some(&p) if parent.is_vertex(p) => {
                    parent.set_position(p, self.sub.position(s));
                    p
                }
                _ => parent.append_vertex_with(
                    self.sub.position(s),
                    self.sub.normal(s),
                    self.sub.color(s),
                ),
            };
            sub_to_new.insert(s, id);
        }

        let mut rejected = 0usize;
        for t in self.sub.triangle_ids() {
            let tri = self.sub.triangle(t).map(|v| sub_to_new[&v]);
            if parent.append_triangle(tri, self.sub.group(t)).is_err() {
                rejected += 1;
            }
        }
        for v in old_vertices {
            if parent.is_vertex(v) && parent.vertex_triangles(v).is_empty() {
                let _ = parent.remove_vertex(v);
            }
        }
        if rejected > 0 {
            warn!(rejected, "Remeshed region did not fit back into parent");
            return Err(MeshError::remeshing_failed(format!(
                "{rejected} triangles rejected during back-propagation"
            )));
        }
        Ok(())
    }
}

/// Remesh a triangle selection in place and write it back.
pub fn quick_remesh(
    mesh: &mut DynamicMesh,
    triangles: &[u32],
    params: &RemeshParams,
    target: Option<&dyn ProjectionTarget>,
) -> MeshResult<RemeshStats> {
    let mut region = RegionRemesher::new(mesh, triangles);
    if region.region_triangle_count() == 0 {
        return Ok(RemeshStats::default());
    }
    let stats = region.remesh(params, target);
    region.back_propagate(mesh)?;
    Ok(stats)
}

/// Remeshes one boundary loop of a mesh.
///
/// Loop edges are split and collapsed toward the target length, loop vertices
/// are relaxed along the loop and projected by the loop target, and interior
/// vertices within `local_smoothing_rings` of the loop are relaxed to blend
/// the change into the surface.
pub struct LoopRemesher<'a> {
    mesh: &'a mut DynamicMesh,
    loop_vertices: Vec<u32>,
    target_edge_length: f64,
    smoothing: f64,
    local_smoothing_rings: usize,
    loop_target: Option<&'a dyn ProjectionTarget>,
    surface_target: Option<&'a dyn ProjectionTarget>,
}

impl<'a> LoopRemesher<'a> {
    pub fn new(mesh: &'a mut DynamicMesh, boundary: &BoundaryLoop, target_edge_length: f64) -> Self {
        Self {
            mesh,
            loop_vertices: boundary.vertices.clone(),
            target_edge_length,
            smoothing: 0.5,
            local_smoothing_rings: 3,
            loop_target: None,
            surface_target: None,
        }
    }

    pub fn with_loop_target(mut self, target: &'a dyn ProjectionTarget) -> Self {
        self.loop_target = Some(target);
        self
    }

    pub fn with_surface_target(mut self, target: &'a dyn ProjectionTarget) -> Self {
        self.surface_target = Some(target);
        self
    }

    pub fn with_local_smoothing_rings(mut self, rings: usize) -> Self {
        self.local_smoothing_rings = rings;
        self
    }

    pub fn set_smoothing(&mut self, smoothing: f64) {
        self.smoothing = smoothing;
    }

    /// The loop as it stands after the passes run so far.
    pub fn current_loop(&self) -> BoundaryLoop {
        BoundaryLoop::new(self.loop_vertices.clone())
    }

    pub fn run(&mut self, passes: usize) -> RemeshStats {
        let mut stats = RemeshStats::default();
        for _ in 0..passes {
            stats += self.basic_pass();
        }
        stats
    }

    pub fn basic_pass(&mut self) -> RemeshStats {
        let mut stats = RemeshStats {
            passes: 1,
            ..Default::default()
        };
        if self.loop_vertices.len() < 3 || self.target_edge_length <= 0.0 {
            return stats;
        }
        stats.splits = self.split_loop_edges();
        stats.collapses = self.collapse_loop_edges();
        self.smooth_loop();
        self.smooth_rings();
        stats
    }

    fn project_loop(&self, p: Point3<f64>, v: u32) -> Point3<f64> {
        self.loop_target.map_or(p, |t| t.project(&p, Some(v)))
    }

    fn split_loop_edges(&mut self) -> usize {
        let max = self.target_edge_length * 1.33;
        let n = self.loop_vertices.len();
        let mut out = Vec::with_capacity(n * 2);
        let mut count = 0;
        for i in 0..n {
            let a = self.loop_vertices[i];
            let b = self.loop_vertices[(i + 1) % n];
            out.push(a);
            let len = (self.mesh.position(a) - self.mesh.position(b)).norm();
            if len > max {
                if let Ok(m) = self.mesh.split_edge(a, b, 0.5) {
                    let p = self.project_loop(self.mesh.position(m), m);
                    self.mesh.set_position(m, p);
                    out.push(m);
                    count += 1;
                }
            }
        }
        self.loop_vertices = out;
        count
    }

    fn collapse_loop_edges(&mut self) -> usize {
        let min = self.target_edge_length * 0.8;
        let mut count = 0;
        let mut i = 0;
        while i < self.loop_vertices.len() && self.loop_vertices.len() > 3 {
            let n = self.loop_vertices.len();
            let a = self.loop_vertices[i];
            let b = self.loop_vertices[(i + 1) % n];
            let (pa, pb) = (self.mesh.position(a), self.mesh.position(b));
            if (pa - pb).norm() >= min {
                i += 1;
                continue;
            }
            let mid = nalgebra::center(&pa, &pb);
            let flips = [a, b].into_iter().any(|v| {
                self.mesh.vertex_triangles(v).iter().any(|&t| {
                    let tri = self.mesh.triangle(t);
                    if tri.contains(&a) && tri.contains(&b) {
                        return false;
                    }
                    let before = self.mesh.triangle_geometry(t).normal_unnormalized();
                    triangle_normal_with(self.mesh, t, v, &mid).dot(&before) <= 0.0
                })
            });
            if flips || self.mesh.collapse_edge(a, b).is_err() {
                i += 1;
                continue;
            }
            let p = self.project_loop(mid, a);
            self.mesh.set_position(a, p);
            self.loop_vertices.remove((i + 1) % n);
            if (i + 1) % n == 0 {
                // removed the head of the loop; `a` shifted down one slot
                i = i.saturating_sub(1);
            }
            count += 1;
        }
        count
    }

    fn smooth_loop(&mut self) {
        let n = self.loop_vertices.len();
        let moved: Vec<Point3<f64>> = (0..n)
            .map(|i| {
                let v = self.loop_vertices[i];
                let p = self.mesh.position(v);
                let prev = self.mesh.position(self.loop_vertices[(i + n - 1) % n]);
                let next = self.mesh.position(self.loop_vertices[(i + 1) % n]);
                let mid = nalgebra::center(&prev, &next);
                let q = p + (mid - p) * self.smoothing;
                self.project_loop(q, v)
            })
            .collect();
        for (i, q) in moved.into_iter().enumerate() {
            self.mesh.set_position(self.loop_vertices[i], q);
        }
    }

    fn smooth_rings(&mut self) {
        if self.local_smoothing_rings == 0 || self.smoothing <= 0.0 {
            return;
        }
        let on_loop: HashSet<u32> = self.loop_vertices.iter().copied().collect();
        let seed: Vec<u32> = crate::components::triangles_touching(self.mesh, &on_loop);
        let tris = expand_by_rings(self.mesh, &seed, self.local_smoothing_rings - 1, |_, _| true);
        let ring_vertices: Vec<u32> = vertices_of(self.mesh, &tris)
            .into_iter()
            .filter(|v| !on_loop.contains(v) && !self.mesh.is_boundary_vertex(*v))
            .collect();
        let mesh: &DynamicMesh = self.mesh;
        let smoothing = self.smoothing;
        let surface = self.surface_target;
        let moved: Vec<(u32, Point3<f64>)> = ring_vertices
            .par_iter()
            .map(|&v| {
                let p = mesh.position(v);
                let neighbors = mesh.vertex_neighbors(v);
                let centroid = neighbors
                    .iter()
                    .fold(Vector3::zeros(), |acc, &n| acc + mesh.position(n).coords)
                    / neighbors.len().max(1) as f64;
                let mut delta = centroid - p.coords;
                if let Some(n) = vertex_normal(mesh, v) {
                    delta -= n * n.dot(&delta);
                }
                let q = p + delta * smoothing;
                (v, surface.map_or(q, |t| t.project(&q, Some(v))))
            })
            .collect();
        for (v, q) in moved {
            self.mesh.set_position(v, q);
        }
    }
}
