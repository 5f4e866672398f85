//! Editable triangle mesh kernel for shell generation.
//!
//! This crate provides the geometry a shell generator is built from: a mesh
//! with stable ids that supports local edits, spatial queries, remeshing and
//! decimation, plane and curve cuts, polygon holes and loop stitching.
//!
//! # Units and Scale
//!
//! **This library assumes millimeter (mm) units.** Tolerances such as
//! [`cut::PLANE_EPSILON`] are absolute and sized for objects between a few
//! millimetres and a metre.
//!
//! # Coordinate System
//!
//! Right-handed, **Z up**. Face winding is **counter-clockwise (CCW) when
//! viewed from outside** the mesh, so normals point outward by the right-hand
//! rule. Boundary loops follow the winding of the triangle next to each edge.
//!
//! # Two Mesh Types
//!
//! - [`Mesh`] is a compact, immutable-by-convention snapshot: vertices, faces
//!   and a group id per face. It is what files load into and what pipeline
//!   stages hand to each other.
//! - [`DynamicMesh`] is the editing representation. Ids survive unrelated
//!   edits, every edit validates before it mutates, and a failed edit leaves
//!   the mesh untouched.
//!
//! ```
//! use mesh_kernel::{DynamicMesh, primitives::capped_cylinder};
//! use mesh_kernel::cut::{CutPlane, plane_cut};
//!
//! let mut mesh = DynamicMesh::from_mesh(&capped_cylinder(10.0, 20.0, 32, 2.0, false));
//! let cut = plane_cut(&mut mesh, &CutPlane::horizontal(12.5, true), |_| true).unwrap();
//! assert_eq!(cut.loops.len(), 1);
//! ```
//!
//! # Triangle Groups
//!
//! Every triangle carries an `i32` group. Operations that split triangles
//! keep the group, so selections expressed as groups remain meaningful after
//! refinement. Generators in this crate document the groups they assign,
//! see [`primitives::cylinder_groups`].
//!
//! # Logging
//!
//! Operations log through [`tracing`]; see [`tracing_ext`] for targets and
//! levels. Nothing is printed unless the application installs a subscriber.
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Index Preservation | Notes |
//! |--------|-----------|------|------|-------------------|-------|
//! | STL    | `.stl`    | ✓    | ✓    | ✗                 | Binary & ASCII, corners welded on load |
//! | OBJ    | `.obj`    | ✓    | ✓    | ✓                 | ASCII, keeps vertex order and colors |

mod dynamic;
mod error;
mod loops;
mod types;

pub mod components;
pub mod cut;
pub mod decimate;
pub mod geodesic;
pub mod insert;
pub mod io;
pub mod points;
pub mod primitives;
pub mod remesh;
pub mod spatial;
pub mod stitch;
pub mod tracing_ext;
pub mod trim;

pub use dynamic::{CollapseInfo, DynamicMesh};
pub use error::{EditError, ErrorCode, MeshError, MeshResult, RecoverySuggestion};
pub use loops::BoundaryLoop;
pub use types::{Aabb, Mesh, Triangle, Vertex, VertexColor};

pub use cut::{CutPlane, PlaneCut, plane_cut};
pub use decimate::{DecimateParams, DecimateResult, ReduceTarget, Reducer};
pub use insert::{InsertedHole, ProjectedPolygon, insert_polygon};
pub use io::{MeshFormat, load_mesh, save_mesh, save_obj, save_stl};
pub use points::PointIndex;
pub use remesh::{
    LoopRemesher, MeshConstraints, PointSetTarget, ProjectionTarget, RegionRemesher,
    RemeshParams, RemeshStats, Remesher, quick_remesh,
};
pub use spatial::{NearestPoint, RayHit, SpatialIndex};
pub use stitch::{append_fan, merge_coincident, stitch_loops};
pub use trim::{TrimReport, trim_by_curve};

impl Mesh {
    /// Load a mesh from a file, choosing the format from the extension.
    pub fn load(path: impl AsRef<std::path::Path>) -> MeshResult<Self> {
        io::load_mesh(path.as_ref())
    }

    /// Save the mesh, choosing the format from the extension.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> MeshResult<()> {
        io::save_mesh(self, path.as_ref())
    }
}
