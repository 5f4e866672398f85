//! Editable triangle mesh with stable vertex and triangle ids.
//!
//! [`DynamicMesh`] keeps per-vertex triangle incidence lists so local edits
//! (collapse, split, flip, weld) run in time proportional to vertex valence.
//! Removed elements are tombstoned rather than compacted, so ids held by a
//! caller stay valid across unrelated edits. [`DynamicMesh::to_mesh`] produces
//! a compact [`Mesh`] snapshot.
//!
//! Every edit validates first and mutates second: an `Err(EditError)` means the
//! mesh is unchanged.

use hashbrown::HashSet;
use nalgebra::{Isometry3, Point3, Vector3};
use tracing::warn;

use crate::error::EditError;
use crate::types::{Aabb, Mesh, Triangle, Vertex, VertexColor};

/// Outcome of a successful [`DynamicMesh::collapse_edge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseInfo {
    pub kept: u32,
    pub removed: u32,
    pub removed_triangles: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct DynamicMesh {
    positions: Vec<Point3<f64>>,
    normals: Vec<Option<Vector3<f64>>>,
    colors: Vec<Option<VertexColor>>,
    vertex_alive: Vec<bool>,
    vertex_tris: Vec<Vec<u32>>,
    triangles: Vec<[u32; 3]>,
    groups: Vec<i32>,
    tri_alive: Vec<bool>,
    live_vertices: usize,
    live_triangles: usize,
    max_group: i32,
}

impl DynamicMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a compact mesh. Faces that would break manifoldness are dropped
    /// with a warning; vertex ids match the source indices.
    pub fn from_mesh(mesh: &Mesh) -> Self {
        let mut dm = Self::new();
        for v in &mesh.vertices {
            dm.append_vertex_with(v.position, v.normal, v.color);
        }
        let mut rejected = 0usize;
        for (f, face) in mesh.faces.iter().enumerate() {
            if dm.append_triangle(*face, mesh.group(f)).is_err() {
                rejected += 1;
            }
        }
        if rejected > 0 {
            warn!(rejected, "Dropped faces while importing mesh");
        }
        dm
    }

    /// Compact snapshot. Isolated vertices are dropped.
    pub fn to_mesh(&self) -> Mesh {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut mesh = Mesh::new();
        for v in self.vertex_ids() {
            if self.vertex_tris[v as usize].is_empty() {
                continue;
            }
            remap[v as usize] = mesh.vertices.len() as u32;
            mesh.vertices.push(Vertex {
                position: self.positions[v as usize],
                normal: self.normals[v as usize],
                color: self.colors[v as usize],
            });
        }
        for t in self.triangle_ids() {
            let [a, b, c] = self.triangles[t as usize];
            mesh.faces
                .push([remap[a as usize], remap[b as usize], remap[c as usize]]);
            mesh.groups.push(self.groups[t as usize]);
        }
        mesh
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.live_vertices
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.live_triangles
    }

    /// One past the largest vertex id ever allocated.
    #[inline]
    pub fn max_vertex_id(&self) -> u32 {
        self.positions.len() as u32
    }

    /// One past the largest triangle id ever allocated.
    #[inline]
    pub fn max_triangle_id(&self) -> u32 {
        self.triangles.len() as u32
    }

    #[inline]
    pub fn is_vertex(&self, v: u32) -> bool {
        self.vertex_alive.get(v as usize).copied().unwrap_or(false)
    }

    #[inline]
    pub fn is_triangle(&self, t: u32) -> bool {
        self.tri_alive.get(t as usize).copied().unwrap_or(false)
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.positions.len() as u32).filter(|&v| self.vertex_alive[v as usize])
    }

    pub fn triangle_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.triangles.len() as u32).filter(|&t| self.tri_alive[t as usize])
    }

    #[inline]
    pub fn position(&self, v: u32) -> Point3<f64> {
        self.positions[v as usize]
    }

    #[inline]
    pub fn set_position(&mut self, v: u32, p: Point3<f64>) {
        self.positions[v as usize] = p;
    }

    #[inline]
    pub fn normal(&self, v: u32) -> Option<Vector3<f64>> {
        self.normals[v as usize]
    }

    #[inline]
    pub fn set_normal(&mut self, v: u32, n: Vector3<f64>) {
        self.normals[v as usize] = Some(n);
    }

    #[inline]
    pub fn color(&self, v: u32) -> Option<VertexColor> {
        self.colors[v as usize]
    }

    #[inline]
    pub fn set_color(&mut self, v: u32, c: VertexColor) {
        self.colors[v as usize] = Some(c);
    }

    pub fn set_all_colors(&mut self, c: VertexColor) {
        self.colors.iter_mut().for_each(|slot| *slot = Some(c));
    }

    #[inline]
    pub fn triangle(&self, t: u32) -> [u32; 3] {
        self.triangles[t as usize]
    }

    #[inline]
    pub fn group(&self, t: u32) -> i32 {
        self.groups[t as usize]
    }

    pub fn set_group(&mut self, t: u32, g: i32) {
        self.groups[t as usize] = g;
        self.max_group = self.max_group.max(g);
    }

    /// Largest group id seen so far.
    pub fn max_group(&self) -> i32 {
        self.max_group
    }

    /// A group id not used by any triangle yet.
    pub fn allocate_group(&mut self) -> i32 {
        self.max_group += 1;
        self.max_group
    }

    pub fn triangle_geometry(&self, t: u32) -> Triangle {
        let [a, b, c] = self.triangles[t as usize];
        Triangle::new(self.position(a), self.position(b), self.position(c))
    }

    /// Unit face normal, zero for degenerate triangles.
    pub fn triangle_normal(&self, t: u32) -> Vector3<f64> {
        self.triangle_geometry(t).normal().unwrap_or_else(Vector3::zeros)
    }

    pub fn triangle_centroid(&self, t: u32) -> Point3<f64> {
        self.triangle_geometry(t).centroid()
    }

    #[inline]
    pub fn vertex_triangles(&self, v: u32) -> &[u32] {
        &self.vertex_tris[v as usize]
    }

    /// Vertices sharing an edge with `v`, sorted.
    pub fn vertex_neighbors(&self, v: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self.vertex_tris[v as usize]
            .iter()
            .flat_map(|&t| self.triangles[t as usize])
            .filter(|&n| n != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Triangles containing both `a` and `b`.
    pub fn edge_triangles(&self, a: u32, b: u32) -> Vec<u32> {
        if !self.is_vertex(a) || !self.is_vertex(b) {
            return Vec::new();
        }
        self.vertex_tris[a as usize]
            .iter()
            .copied()
            .filter(|&t| self.triangles[t as usize].contains(&b))
            .collect()
    }

    #[inline]
    pub fn is_edge(&self, a: u32, b: u32) -> bool {
        a != b
            && self.is_vertex(a)
            && self.vertex_tris[a as usize]
                .iter()
                .any(|&t| self.triangles[t as usize].contains(&b))
    }

    pub fn is_boundary_edge(&self, a: u32, b: u32) -> bool {
        self.edge_triangles(a, b).len() == 1
    }

    pub fn is_boundary_vertex(&self, v: u32) -> bool {
        self.vertex_neighbors(v)
            .into_iter()
            .any(|n| self.is_boundary_edge(v, n))
    }

    /// All edges as sorted pairs.
    pub fn edges(&self) -> Vec<[u32; 2]> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for t in self.triangle_ids() {
            let tri = self.triangles[t as usize];
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                let key = [a.min(b), a.max(b)];
                if seen.insert(key) {
                    out.push(key);
                }
            }
        }
        out
    }

    /// Edge lengths as (min, mean, max), `None` without triangles.
    pub fn edge_length_stats(&self) -> Option<(f64, f64, f64)> {
        let edges = self.edges();
        if edges.is_empty() {
            return None;
        }
        let mut min = f64::MAX;
        let mut max = 0.0_f64;
        let mut sum = 0.0;
        for [a, b] in &edges {
            let len = (self.position(*a) - self.position(*b)).norm();
            min = min.min(len);
            max = max.max(len);
            sum += len;
        }
        Some((min, sum / edges.len() as f64, max))
    }

    pub fn append_vertex(&mut self, p: Point3<f64>) -> u32 {
        self.append_vertex_with(p, None, None)
    }

    pub fn append_vertex_with(
        &mut self,
        p: Point3<f64>,
        normal: Option<Vector3<f64>>,
        color: Option<VertexColor>,
    ) -> u32 {
        let id = self.positions.len() as u32;
        self.positions.push(p);
        self.normals.push(normal);
        self.colors.push(color);
        self.vertex_alive.push(true);
        self.vertex_tris.push(Vec::new());
        self.live_vertices += 1;
        id
    }

    /// Append a triangle after checking it keeps the mesh edge-manifold.
    pub fn append_triangle(&mut self, tri: [u32; 3], group: i32) -> Result<u32, EditError> {
        for &v in &tri {
            if !self.is_vertex(v) {
                return Err(EditError::InvalidVertex(v));
            }
        }
        let [a, b, c] = tri;
        if a == b || b == c || c == a {
            return Err(EditError::DegenerateTriangle);
        }
        if self.find_triangle(a, b, c).is_some() {
            return Err(EditError::DuplicateTriangle);
        }
        for i in 0..3 {
            if self.edge_triangles(tri[i], tri[(i + 1) % 3]).len() >= 2 {
                return Err(EditError::NonManifoldEdge);
            }
        }
        Ok(self.push_triangle(tri, group))
    }

    /// Triangle with exactly these three vertices in any order.
    pub fn find_triangle(&self, a: u32, b: u32, c: u32) -> Option<u32> {
        self.vertex_tris.get(a as usize)?.iter().copied().find(|&t| {
            let tri = self.triangles[t as usize];
            tri.contains(&b) && tri.contains(&c)
        })
    }

    fn push_triangle(&mut self, tri: [u32; 3], group: i32) -> u32 {
        let id = self.triangles.len() as u32;
        self.triangles.push(tri);
        self.groups.push(group);
        self.tri_alive.push(true);
        for &v in &tri {
            self.vertex_tris[v as usize].push(id);
        }
        self.live_triangles += 1;
        self.max_group = self.max_group.max(group);
        id
    }

    fn detach(&mut self, v: u32, t: u32) {
        let list = &mut self.vertex_tris[v as usize];
        if let Some(pos) = list.iter().position(|&x| x == t) {
            list.swap_remove(pos);
        }
    }

    fn kill_vertex(&mut self, v: u32) {
        if self.vertex_alive[v as usize] {
            self.vertex_alive[v as usize] = false;
            self.vertex_tris[v as usize].clear();
            self.live_vertices -= 1;
        }
    }

    pub fn remove_triangle(&mut self, t: u32, remove_isolated: bool) -> Result<(), EditError> {
        if !self.is_triangle(t) {
            return Err(EditError::InvalidTriangle(t));
        }
        let tri = self.triangles[t as usize];
        self.tri_alive[t as usize] = false;
        self.live_triangles -= 1;
        for &v in &tri {
            self.detach(v, t);
            if remove_isolated && self.vertex_tris[v as usize].is_empty() {
                self.kill_vertex(v);
            }
        }
        Ok(())
    }

    /// Remove a set of triangles, skipping ids that are already gone.
    pub fn remove_triangles(&mut self, tris: &[u32], remove_isolated: bool) -> usize {
        tris.iter()
            .filter(|&&t| self.remove_triangle(t, remove_isolated).is_ok())
            .count()
    }

    /// Remove a vertex together with every triangle using it.
    pub fn remove_vertex(&mut self, v: u32) -> Result<(), EditError> {
        if !self.is_vertex(v) {
            return Err(EditError::InvalidVertex(v));
        }
        for t in self.vertex_tris[v as usize].clone() {
            self.remove_triangle(t, true)?;
        }
        self.kill_vertex(v);
        Ok(())
    }

    pub fn remove_isolated_vertices(&mut self) -> usize {
        let isolated: Vec<u32> = self
            .vertex_ids()
            .filter(|&v| self.vertex_tris[v as usize].is_empty())
            .collect();
        for &v in &isolated {
            self.kill_vertex(v);
        }
        isolated.len()
    }

    fn opposite_vertex(&self, t: u32, a: u32, b: u32) -> u32 {
        let tri = self.triangles[t as usize];
        tri.into_iter().find(|&v| v != a && v != b).unwrap_or(tri[0])
    }

    fn has_directed_edge(&self, t: u32, a: u32, b: u32) -> bool {
        let tri = self.triangles[t as usize];
        (0..3).any(|i| tri[i] == a && tri[(i + 1) % 3] == b)
    }

    /// Collapse edge `(keep, remove)` into `keep`. The kept vertex retains its
    /// position; callers move it afterwards if they want a midpoint.
    pub fn collapse_edge(&mut self, keep: u32, remove: u32) -> Result<CollapseInfo, EditError> {
        if !self.is_vertex(keep) {
            return Err(EditError::InvalidVertex(keep));
        }
        if !self.is_vertex(remove) {
            return Err(EditError::InvalidVertex(remove));
        }
        let edge_tris = self.edge_triangles(keep, remove);
        match edge_tris.len() {
            0 => return Err(EditError::NotAnEdge(keep, remove)),
            1 | 2 => {}
            _ => return Err(EditError::NonManifoldEdge),
        }
        let opposite: Vec<u32> = edge_tris
            .iter()
            .map(|&t| self.opposite_vertex(t, keep, remove))
            .collect();

        let keep_ring = self.vertex_neighbors(keep);
        let remove_ring = self.vertex_neighbors(remove);
        let shared: Vec<u32> = keep_ring
            .iter()
            .copied()
            .filter(|v| remove_ring.binary_search(v).is_ok())
            .collect();
        if shared.len() != opposite.len() || !shared.iter().all(|v| opposite.contains(v)) {
            return Err(EditError::LinkCondition);
        }
        if edge_tris.len() == 2 && self.is_boundary_vertex(keep) && self.is_boundary_vertex(remove)
        {
            return Err(EditError::BoundaryConstraint);
        }

        let moved: Vec<u32> = self.vertex_tris[remove as usize]
            .iter()
            .copied()
            .filter(|t| !edge_tris.contains(t))
            .collect();
        for &t in &moved {
            let tri = self.triangles[t as usize];
            let others: Vec<u32> = tri.into_iter().filter(|&v| v != remove).collect();
            if self.find_triangle(keep, others[0], others[1]).is_some() {
                return Err(EditError::DuplicateTriangle);
            }
        }

        for &t in &edge_tris {
            let tri = self.triangles[t as usize];
            self.tri_alive[t as usize] = false;
            self.live_triangles -= 1;
            for v in tri {
                self.detach(v, t);
            }
        }
        for &t in &moved {
            for slot in self.triangles[t as usize].iter_mut() {
                if *slot == remove {
                    *slot = keep;
                }
            }
            self.vertex_tris[keep as usize].push(t);
        }
        self.kill_vertex(remove);
        for &c in &opposite {
            if self.vertex_tris[c as usize].is_empty() {
                self.kill_vertex(c);
            }
        }
        if self.vertex_tris[keep as usize].is_empty() {
            self.kill_vertex(keep);
        }

        Ok(CollapseInfo {
            kept: keep,
            removed: remove,
            removed_triangles: edge_tris,
        })
    }

    /// Insert a vertex at `a + t * (b - a)` and split both triangles of the edge.
    /// Returns the new vertex id.
    pub fn split_edge(&mut self, a: u32, b: u32, t: f64) -> Result<u32, EditError> {
        let tris = self.edge_triangles(a, b);
        if tris.is_empty() {
            return Err(EditError::NotAnEdge(a, b));
        }
        if tris.len() > 2 {
            return Err(EditError::NonManifoldEdge);
        }
        let pa = self.position(a);
        let pb = self.position(b);
        let normal = match (self.normals[a as usize], self.normals[b as usize]) {
            (Some(na), Some(nb)) => {
                let n = na.lerp(&nb, t);
                n.try_normalize(1e-12).or(Some(na))
            }
            _ => None,
        };
        let color = self.colors[a as usize];
        let m = self.append_vertex_with(pa + (pb - pa) * t, normal, color);

        for tri_id in tris {
            let tri = self.triangles[tri_id as usize];
            let Some(i) = (0..3).find(|&i| {
                let (x, y) = (tri[i], tri[(i + 1) % 3]);
                (x == a && y == b) || (x == b && y == a)
            }) else {
                continue;
            };
            let (x, y, c) = (tri[i], tri[(i + 1) % 3], tri[(i + 2) % 3]);
            self.triangles[tri_id as usize] = [x, m, c];
            self.detach(y, tri_id);
            self.vertex_tris[m as usize].push(tri_id);
            let g = self.groups[tri_id as usize];
            self.push_triangle([m, y, c], g);
        }
        Ok(m)
    }

    /// Replace the diagonal `(a, b)` of its two triangles by the other diagonal.
    /// Returns the new edge.
    pub fn flip_edge(&mut self, a: u32, b: u32) -> Result<(u32, u32), EditError> {
        let tris = self.edge_triangles(a, b);
        match tris.len() {
            0 => return Err(EditError::NotAnEdge(a, b)),
            1 => return Err(EditError::BoundaryConstraint),
            2 => {}
            _ => return Err(EditError::NonManifoldEdge),
        }
        let (t0, t1) = if self.has_directed_edge(tris[0], a, b) {
            (tris[0], tris[1])
        } else {
            (tris[1], tris[0])
        };
        if !self.has_directed_edge(t0, a, b) || !self.has_directed_edge(t1, b, a) {
            return Err(EditError::NonManifoldEdge);
        }
        let c = self.opposite_vertex(t0, a, b);
        let d = self.opposite_vertex(t1, a, b);
        if c == d || self.is_edge(c, d) {
            return Err(EditError::DuplicateTriangle);
        }
        self.triangles[t0 as usize] = [c, a, d];
        self.triangles[t1 as usize] = [d, b, c];
        self.detach(b, t0);
        self.vertex_tris[d as usize].push(t0);
        self.detach(a, t1);
        self.vertex_tris[c as usize].push(t1);
        Ok((c, d))
    }

    /// Weld `remove` onto `keep`, rewriting every triangle of `remove`.
    /// Used to merge coincident boundary vertices of two touching surfaces.
    pub fn merge_vertices(&mut self, keep: u32, remove: u32) -> Result<(), EditError> {
        if !self.is_vertex(keep) {
            return Err(EditError::InvalidVertex(keep));
        }
        if !self.is_vertex(remove) {
            return Err(EditError::InvalidVertex(remove));
        }
        if keep == remove {
            return Ok(());
        }
        let moved = self.vertex_tris[remove as usize].clone();
        for &t in &moved {
            let tri = self.triangles[t as usize];
            if tri.contains(&keep) {
                return Err(EditError::DegenerateTriangle);
            }
            let others: Vec<u32> = tri.into_iter().filter(|&v| v != remove).collect();
            if self.find_triangle(keep, others[0], others[1]).is_some() {
                return Err(EditError::DuplicateTriangle);
            }
        }
        for n in self.vertex_neighbors(remove) {
            if self.edge_triangles(keep, n).len() + self.edge_triangles(remove, n).len() > 2 {
                return Err(EditError::NonManifoldEdge);
            }
        }
        for &t in &moved {
            for slot in self.triangles[t as usize].iter_mut() {
                if *slot == remove {
                    *slot = keep;
                }
            }
            self.vertex_tris[keep as usize].push(t);
        }
        self.kill_vertex(remove);
        Ok(())
    }

    /// Append a compact mesh, remapping its groups. Returns the new id of each
    /// source vertex.
    pub fn append_mesh(&mut self, other: &Mesh, mut group_map: impl FnMut(i32) -> i32) -> Vec<u32> {
        let map: Vec<u32> = other
            .vertices
            .iter()
            .map(|v| self.append_vertex_with(v.position, v.normal, v.color))
            .collect();
        for (f, face) in other.faces.iter().enumerate() {
            let tri = face.map(|i| map[i as usize]);
            self.push_triangle(tri, group_map(other.group(f)));
        }
        map
    }

    /// Area-weighted vertex normals. Vertices without triangles keep their
    /// previous normal.
    pub fn compute_normals(&mut self) {
        let mut acc = vec![Vector3::zeros(); self.positions.len()];
        for t in self.triangle_ids() {
            let n = self.triangle_geometry(t).normal_unnormalized();
            for v in self.triangles[t as usize] {
                acc[v as usize] += n;
            }
        }
        for v in 0..self.positions.len() {
            if !self.vertex_alive[v] {
                continue;
            }
            if let Some(n) = acc[v].try_normalize(1e-20) {
                self.normals[v] = Some(n);
            }
        }
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertex_ids().map(|v| &self.positions[v as usize]))
    }

    pub fn translate(&mut self, offset: Vector3<f64>) {
        for v in 0..self.positions.len() {
            if self.vertex_alive[v] {
                self.positions[v] += offset;
            }
        }
    }

    pub fn transform(&mut self, iso: &Isometry3<f64>) {
        for v in 0..self.positions.len() {
            self.positions[v] = iso * self.positions[v];
            if let Some(n) = self.normals[v].as_mut() {
                *n = iso.rotation * *n;
            }
        }
    }

    /// Flip the winding of every triangle and negate stored normals.
    pub fn reverse_orientation(&mut self) {
        for t in 0..self.triangles.len() {
            self.triangles[t].swap(1, 2);
        }
        for n in self.normals.iter_mut().flatten() {
            *n = -*n;
        }
    }

    /// Number of edges used by exactly one triangle.
    pub fn boundary_edge_count(&self) -> usize {
        self.edges()
            .into_iter()
            .filter(|[a, b]| self.is_boundary_edge(*a, *b))
            .count()
    }

    /// Edges used by more than two triangles.
    pub fn non_manifold_edge_count(&self) -> usize {
        self.edges()
            .into_iter()
            .filter(|[a, b]| self.edge_triangles(*a, *b).len() > 2)
            .count()
    }
}

impl From<&Mesh> for DynamicMesh {
    fn from(mesh: &Mesh) -> Self {
        Self::from_mesh(mesh)
    }
}
