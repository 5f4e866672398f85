//! Error types for kernel operations with rich diagnostics.
//!
//! Two layers of failure are distinguished:
//!
//! - [`MeshError`]: operation-level failures (I/O, empty input, a cut or trim that
//!   cannot proceed). These carry a machine-readable [`ErrorCode`] and a
//!   [`RecoverySuggestion`] and render through miette.
//! - [`EditError`]: a local edit primitive (collapse, split, flip, append, weld)
//!   was rejected because it would break the mesh. These are cheap `Copy` values
//!   that callers aggregate or retry with another strategy.
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `MESH-XXXX`:
//! - `MESH-1xxx`: I/O errors (file reading, writing, parsing)
//! - `MESH-2xxx`: Validation errors (empty input, topology)
//! - `MESH-3xxx`: Operation errors (edit rejected, cut, trim, remesh)
//! - `MESH-4xxx`: Format errors
//!
//! # Example
//!
//! ```rust,ignore
//! use mesh_kernel::{MeshError, ErrorCode};
//!
//! let err = MeshError::empty_mesh("no triangles after trim");
//! println!("Error code: {}", err.code()); // MESH-2003
//! println!("Recovery: {}", err.recovery_suggestion());
//! ```

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kernel operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Machine-readable error codes for kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// MESH-1001: Failed to read file
    IoRead = 1001,
    /// MESH-1002: Failed to write file
    IoWrite = 1002,
    /// MESH-1003: Failed to parse file format
    ParseError = 1003,

    // Validation errors (2xxx)
    /// MESH-2003: Mesh has no vertices or faces
    EmptyMesh = 2003,
    /// MESH-2004: Invalid mesh topology
    InvalidTopology = 2004,

    // Operation errors (3xxx)
    /// MESH-3001: A local edit was rejected
    EditRejected = 3001,
    /// MESH-3002: Plane cut failed
    CutFailed = 3002,
    /// MESH-3003: Curve trim failed
    TrimFailed = 3003,
    /// MESH-3004: Decimation failed
    DecimationFailed = 3004,
    /// MESH-3005: Remeshing failed
    RemeshingFailed = 3005,
    /// MESH-3006: Ray or nearest-point query found nothing
    QueryMissed = 3006,

    // Format errors (4xxx)
    /// MESH-4001: Unsupported file format
    UnsupportedFormat = 4001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `MESH-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "MESH-1001",
            ErrorCode::IoWrite => "MESH-1002",
            ErrorCode::ParseError => "MESH-1003",
            ErrorCode::EmptyMesh => "MESH-2003",
            ErrorCode::InvalidTopology => "MESH-2004",
            ErrorCode::EditRejected => "MESH-3001",
            ErrorCode::CutFailed => "MESH-3002",
            ErrorCode::TrimFailed => "MESH-3003",
            ErrorCode::DecimationFailed => "MESH-3004",
            ErrorCode::RemeshingFailed => "MESH-3005",
            ErrorCode::QueryMissed => "MESH-3006",
            ErrorCode::UnsupportedFormat => "MESH-4001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for kernel errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Re-export the file from the original software with different settings.
    ReexportFile { format: Option<String> },
    /// Use a different file format.
    UseDifferentFormat { suggested: Vec<String> },
    /// Check the source mesh for issues.
    CheckSourceMesh { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// No automatic recovery available.
    None,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::ReexportFile { format } => {
                if let Some(fmt) = format {
                    write!(
                        f,
                        "Try re-exporting the mesh as {} from the original software",
                        fmt
                    )
                } else {
                    write!(f, "Try re-exporting the mesh from the original software")
                }
            }
            RecoverySuggestion::UseDifferentFormat { suggested } => {
                write!(f, "Try using a different format: {}", suggested.join(", "))
            }
            RecoverySuggestion::CheckSourceMesh { checks } => {
                write!(f, "Check the source mesh for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::None => write!(f, "No automatic recovery available"),
        }
    }
}

/// Why a local mesh edit was refused.
///
/// Edits are refused before anything is modified, so the mesh is unchanged
/// when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum EditError {
    #[error("vertex {0} does not exist")]
    InvalidVertex(u32),
    #[error("triangle {0} does not exist")]
    InvalidTriangle(u32),
    #[error("vertices {0} and {1} are not connected by an edge")]
    NotAnEdge(u32, u32),
    #[error("triangle would be degenerate")]
    DegenerateTriangle,
    #[error("edge would be shared by more than two triangles")]
    NonManifoldEdge,
    #[error("triangle already exists")]
    DuplicateTriangle,
    #[error("collapse violates the link condition")]
    LinkCondition,
    #[error("edit would modify a constrained boundary")]
    BoundaryConstraint,
    #[error("edit would invert a triangle")]
    WouldFlipNormal,
    #[error("selected region is not a simple disc")]
    NotASimpleRegion,
    #[error("selection is empty")]
    EmptySelection,
    #[error("loops cannot be matched")]
    LoopMismatch,
}

/// Errors that can occur during kernel operations.
#[derive(Debug, Error, Diagnostic)]
pub enum MeshError {
    /// Error reading from a file.
    #[error("failed to read mesh from {path}")]
    #[diagnostic(
        code(mesh::io::read),
        help("Check that the file exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write mesh to {path}")]
    #[diagnostic(
        code(mesh::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing mesh file format.
    #[error("failed to parse mesh from {path}: {details}")]
    #[diagnostic(
        code(mesh::parse::error),
        help("The file may be corrupted. Try re-exporting from the original software.")
    )]
    ParseError { path: PathBuf, details: String },

    /// Unsupported file format.
    #[error("unsupported mesh format: {extension:?}")]
    #[diagnostic(code(mesh::format::unsupported), help("Supported formats: STL, OBJ"))]
    UnsupportedFormat { extension: Option<String> },

    /// Empty mesh (no vertices or faces).
    #[error("mesh is empty: {details}")]
    #[diagnostic(
        code(mesh::validation::empty),
        help("The mesh must have at least one vertex and one face.")
    )]
    EmptyMesh { details: String },

    /// Invalid mesh topology.
    #[error("invalid mesh topology: {details}")]
    #[diagnostic(
        code(mesh::validation::topology),
        help("The operation needs a manifold, consistently wound input.")
    )]
    InvalidTopology { details: String },

    /// A local edit was rejected and the operation could not continue.
    #[error("{operation} rejected: {reason}")]
    #[diagnostic(code(mesh::edit::rejected))]
    EditRejected {
        operation: &'static str,
        #[source]
        reason: EditError,
    },

    /// Plane cut failed.
    #[error("plane cut failed: {details}")]
    #[diagnostic(
        code(mesh::cut::failed),
        help("Check that the cut plane actually crosses the selected triangles.")
    )]
    CutFailed { details: String },

    /// Curve trim failed.
    #[error("trim failed: {details}")]
    #[diagnostic(
        code(mesh::trim::failed),
        help("The trim curve must form a closed loop on the surface that separates it in two.")
    )]
    TrimFailed { details: String },

    /// Decimation failed.
    #[error("decimation failed: {details}")]
    #[diagnostic(code(mesh::decimate::failed))]
    DecimationFailed { details: String },

    /// Remeshing failed.
    #[error("remeshing failed: {details}")]
    #[diagnostic(
        code(mesh::remesh::failed),
        help("Try adjusting the target edge length.")
    )]
    RemeshingFailed { details: String },

    /// A spatial query found nothing.
    #[error("query missed: {details}")]
    #[diagnostic(code(mesh::query::missed))]
    QueryMissed { details: String },
}

impl MeshError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            MeshError::IoRead { .. } => ErrorCode::IoRead,
            MeshError::IoWrite { .. } => ErrorCode::IoWrite,
            MeshError::ParseError { .. } => ErrorCode::ParseError,
            MeshError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            MeshError::EmptyMesh { .. } => ErrorCode::EmptyMesh,
            MeshError::InvalidTopology { .. } => ErrorCode::InvalidTopology,
            MeshError::EditRejected { .. } => ErrorCode::EditRejected,
            MeshError::CutFailed { .. } => ErrorCode::CutFailed,
            MeshError::TrimFailed { .. } => ErrorCode::TrimFailed,
            MeshError::DecimationFailed { .. } => ErrorCode::DecimationFailed,
            MeshError::RemeshingFailed { .. } => ErrorCode::RemeshingFailed,
            MeshError::QueryMissed { .. } => ErrorCode::QueryMissed,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            MeshError::IoRead { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["file exists".into(), "file permissions".into()],
            },
            MeshError::IoWrite { .. } => RecoverySuggestion::CheckSourceMesh {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            MeshError::ParseError { .. } => RecoverySuggestion::ReexportFile {
                format: Some("binary STL or OBJ".into()),
            },
            MeshError::UnsupportedFormat { .. } => RecoverySuggestion::UseDifferentFormat {
                suggested: vec!["STL".into(), "OBJ".into()],
            },
            MeshError::EmptyMesh { .. } | MeshError::InvalidTopology { .. } => {
                RecoverySuggestion::CheckSourceMesh {
                    checks: vec!["mesh has geometry".into(), "manifold topology".into()],
                }
            }
            MeshError::TrimFailed { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![
                    ("trim curve".into(), "redraw as a closed loop".into()),
                    ("flip_trim_side".into(), "toggle".into()),
                ],
            },
            MeshError::DecimationFailed { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("target".into(), "try a higher value".into())],
            },
            MeshError::RemeshingFailed { .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![("target_edge_length".into(), "try a larger value".into())],
            },
            MeshError::EditRejected { .. }
            | MeshError::CutFailed { .. }
            | MeshError::QueryMissed { .. } => RecoverySuggestion::None,
        }
    }

    // Constructor helpers for common error patterns

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeshError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError.
    pub fn parse_error(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        MeshError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Create an EmptyMesh error.
    pub fn empty_mesh(details: impl Into<String>) -> Self {
        MeshError::EmptyMesh {
            details: details.into(),
        }
    }

    /// Create an InvalidTopology error.
    pub fn invalid_topology(details: impl Into<String>) -> Self {
        MeshError::InvalidTopology {
            details: details.into(),
        }
    }

    /// Create an EditRejected error.
    pub fn edit_rejected(operation: &'static str, reason: EditError) -> Self {
        MeshError::EditRejected { operation, reason }
    }

    /// Create a CutFailed error.
    pub fn cut_failed(details: impl Into<String>) -> Self {
        MeshError::CutFailed {
            details: details.into(),
        }
    }

    /// Create a TrimFailed error.
    pub fn trim_failed(details: impl Into<String>) -> Self {
        MeshError::TrimFailed {
            details: details.into(),
        }
    }

    /// Create a DecimationFailed error.
    pub fn decimation_failed(details: impl Into<String>) -> Self {
        MeshError::DecimationFailed {
            details: details.into(),
        }
    }

    /// Create a RemeshingFailed error.
    pub fn remeshing_failed(details: impl Into<String>) -> Self {
        MeshError::RemeshingFailed {
            details: details.into(),
        }
    }

    /// Create a QueryMissed error.
    pub fn query_missed(details: impl Into<String>) -> Self {
        MeshError::QueryMissed {
            details: details.into(),
        }
    }

    /// Create an UnsupportedFormat error.
    pub fn unsupported_format(extension: Option<String>) -> Self {
        MeshError::UnsupportedFormat { extension }
    }
}
