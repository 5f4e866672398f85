//! Staged generation of socket and AFO shells from scanned limb meshes.
//!
//! A [`DeviceGenerator`] pulls a scan and a trim curve from its sources and
//! runs five stages:
//!
//! - **Offset**: inner and outer reference surfaces, used by the finish step
//! - **Trim**: the part of the scan on one side of the trim curve
//! - **Inner wall**: the trimmed surface moved out by the inner offset, with
//!   an optional flare along the trim line
//! - **Outer wall**: the inner wall extruded into a closed shell
//! - **Finish**: flattening the sole, or merging a connector into the bottom
//!
//! Trim and both walls are cached per input version and parameter set, so a
//! parameter change only reruns the stages that read it. A result computed
//! while inputs changed is returned as a [`Status::Preview`]; a failed stage
//! yields a red fallback mesh with [`Status::Error`].
//!
//! # Quick Start
//!
//! ```no_run
//! use device_shell::{Curve, GeneratorBuilder};
//! use std::path::Path;
//! use mesh_kernel::load_mesh;
//! use nalgebra::Point3;
//!
//! let scan = load_mesh(Path::new("limb.stl")).unwrap();
//! let curve = Curve::horizontal_circle(Point3::new(0.0, 0.0, 150.0), 55.0, 64);
//!
//! let result = GeneratorBuilder::new()
//!     .mesh(scan)
//!     .curve(curve)
//!     .thickness(4.0)
//!     .afo()
//!     .run()
//!     .unwrap();
//!
//! println!("{} ({})", result.status, result.mesh.face_count());
//! ```
//!
//! # Live Inputs
//!
//! ```no_run
//! use std::sync::Arc;
//! use device_shell::{Curve, DeviceGenerator, SharedCurve, SharedMesh};
//! use std::path::Path;
//! use mesh_kernel::load_mesh;
//! use nalgebra::Point3;
//!
//! let scan = Arc::new(SharedMesh::new(load_mesh(Path::new("limb.stl")).unwrap()));
//! let curve = Arc::new(SharedCurve::new(Curve::horizontal_circle(
//!     Point3::new(0.0, 0.0, 150.0),
//!     55.0,
//!     64,
//! )));
//!
//! let mut generator = DeviceGenerator::default();
//! generator.set_mesh_source(scan.clone());
//! generator.set_curve_source(curve.clone());
//! generator.update().unwrap();
//!
//! // only the walls are recomputed
//! generator.set_thickness(6.0);
//! generator.update().unwrap();
//! ```

mod builder;
#[cfg(feature = "pipeline-config")]
pub mod config;
pub mod connector;
mod error;
pub mod finish;
pub mod offset;
mod params;
pub mod pipeline;
pub mod seam;
pub mod shell;
mod source;

pub use builder::GeneratorBuilder;
pub use error::{ShellError, ShellErrorCode, ShellRecoverySuggestion, ShellResult};
pub use params::{
    DeviceParams, FlatBaseParams, FlattenParams, OffsetMethod, OffsetParams, PARAM_TOLERANCE,
    StitchParams,
};
pub use source::{Curve, CurveSource, MeshSource, SharedCurve, SharedMesh};

pub use pipeline::{
    CacheStats, DeviceGenerator, InvalidationHandle, PipelineResult, RunStamp, Stage,
    StageFailure, Status,
};

pub use connector::{Connector, ConnectorGeometry, ConnectorSlot, FlatBaseConnector, HoleSpec};
pub use finish::{Finish, FinishContext};
pub use offset::OffsetMeshes;
pub use shell::shell_groups;

#[cfg(feature = "pipeline-config")]
pub use config::{ConnectorConfig, PipelineConfig, TransformConfig};
