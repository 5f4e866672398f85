//! Connected components and triangle/vertex selections.
//!
//! Two triangles are connected if they share an edge. Selections are plain
//! vectors of triangle ids (sorted) or hash sets of vertex ids; ring expansion
//! grows a selection by whole one-rings of its vertices.

use std::collections::VecDeque;

use hashbrown::HashSet;
use tracing::debug;

use crate::dynamic::DynamicMesh;

/// Result of connected component analysis.
#[derive(Debug, Clone)]
pub struct ComponentAnalysis {
    /// Triangle ids for each component, largest first.
    pub components: Vec<Vec<u32>>,
}

impl ComponentAnalysis {
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_connected(&self) -> bool {
        self.components.len() == 1
    }

    pub fn largest_component(&self) -> &[u32] {
        self.components.first().map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Triangles sharing an edge with `t`.
pub fn triangle_neighbors(mesh: &DynamicMesh, t: u32) -> Vec<u32> {
    let tri = mesh.triangle(t);
    let mut out = Vec::with_capacity(3);
    for i in 0..3 {
        for n in mesh.edge_triangles(tri[i], tri[(i + 1) % 3]) {
            if n != t && !out.contains(&n) {
                out.push(n);
            }
        }
    }
    out
}

/// Flood fill from `seed` over edge-adjacent triangles accepted by `filter`.
///
/// Returns an empty selection when the seed itself is rejected.
pub fn connected_component(
    mesh: &DynamicMesh,
    seed: u32,
    filter: impl Fn(&DynamicMesh, u32) -> bool,
) -> Vec<u32> {
    if !mesh.is_triangle(seed) || !filter(mesh, seed) {
        return Vec::new();
    }
    let mut visited = HashSet::new();
    visited.insert(seed);
    let mut queue = VecDeque::from([seed]);
    while let Some(t) = queue.pop_front() {
        for n in triangle_neighbors(mesh, t) {
            if !visited.contains(&n) && filter(mesh, n) {
                visited.insert(n);
                queue.push_back(n);
            }
        }
    }
    let mut out: Vec<u32> = visited.into_iter().collect();
    out.sort_unstable();
    out
}

/// Partition all triangles into edge-connected components.
pub fn find_connected_components(mesh: &DynamicMesh) -> ComponentAnalysis {
    let mut assigned = HashSet::new();
    let mut components = Vec::new();
    for t in mesh.triangle_ids() {
        if assigned.contains(&t) {
            continue;
        }
        let component = connected_component(mesh, t, |_, _| true);
        assigned.extend(component.iter().copied());
        components.push(component);
    }
    components.sort_by_key(|c| std::cmp::Reverse(c.len()));
    debug!(components = components.len(), "Connected components");
    ComponentAnalysis { components }
}

/// Every vertex used by the given triangles.
pub fn vertices_of(mesh: &DynamicMesh, tris: &[u32]) -> HashSet<u32> {
    tris.iter()
        .filter(|&&t| mesh.is_triangle(t))
        .flat_map(|&t| mesh.triangle(t))
        .collect()
}

/// Every triangle touching one of the given vertices, sorted.
pub fn triangles_touching(mesh: &DynamicMesh, vertices: &HashSet<u32>) -> Vec<u32> {
    let mut out: Vec<u32> = vertices
        .iter()
        .filter(|&&v| mesh.is_vertex(v))
        .flat_map(|&v| mesh.vertex_triangles(v).iter().copied())
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Grow a triangle selection by `rings` one-rings, keeping only triangles
/// accepted by `filter`.
pub fn expand_by_rings(
    mesh: &DynamicMesh,
    tris: &[u32],
    rings: usize,
    filter: impl Fn(&DynamicMesh, u32) -> bool,
) -> Vec<u32> {
    let mut selected: Vec<u32> = tris.to_vec();
    selected.sort_unstable();
    selected.dedup();
    for _ in 0..rings {
        let verts = vertices_of(mesh, &selected);
        let grown: Vec<u32> = triangles_touching(mesh, &verts)
            .into_iter()
            .filter(|&t| selected.binary_search(&t).is_ok() || filter(mesh, t))
            .collect();
        if grown.len() == selected.len() {
            break;
        }
        selected = grown;
    }
    selected
}
