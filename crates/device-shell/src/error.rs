// Allow unused_assignments lint for error struct fields that are used in thiserror Display macros
// but appear as "never read" to the compiler.
#![allow(unused_assignments)]

//! Error types for device generation with rich diagnostics.
//!
//! Every error carries a machine-readable `SHELL-XXXX` code and a recovery
//! suggestion. Stage errors never escape [`crate::DeviceGenerator::update`];
//! the coordinator turns them into an error result with a fallback mesh.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::pipeline::Stage;

/// Result type alias for device generation.
pub type ShellResult<T> = Result<T, ShellError>;

/// Machine-readable error codes.
///
/// Codes follow the pattern `SHELL-XXXX` where:
/// - 1xxx = Configuration and input errors
/// - 2xxx = Offset surface errors
/// - 3xxx = Shell stage errors
/// - 4xxx = Connector and finish errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellErrorCode {
    /// SHELL-1001: Mesh or curve source not bound
    MissingSource = 1001,
    /// SHELL-1002: Input mesh is empty
    EmptyMesh = 1002,
    /// SHELL-1003: Invalid parameters
    InvalidParams = 1003,
    /// SHELL-1004: Configuration file could not be read or parsed
    InvalidConfig = 1004,

    /// SHELL-2001: SDF grid too large
    GridTooLarge = 2001,
    /// SHELL-2002: Isosurface extraction failed
    IsosurfaceFailed = 2002,

    /// SHELL-3001: A shell stage failed
    StageFailed = 3001,

    /// SHELL-4001: Connector geometry could not be built
    ConnectorFailed = 4001,
    /// SHELL-4002: One or more connector holes could not be cut
    HolesFailed = 4002,
    /// SHELL-4003: Connector and shell loops could not be merged
    MergeFailed = 4003,
    /// SHELL-4004: Base flattening failed
    FlattenFailed = 4004,

    /// SHELL-5001: Kernel operation failed
    Kernel = 5001,
}

impl ShellErrorCode {
    /// Returns the error code as a string in the format `SHELL-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShellErrorCode::MissingSource => "SHELL-1001",
            ShellErrorCode::EmptyMesh => "SHELL-1002",
            ShellErrorCode::InvalidParams => "SHELL-1003",
            ShellErrorCode::InvalidConfig => "SHELL-1004",
            ShellErrorCode::GridTooLarge => "SHELL-2001",
            ShellErrorCode::IsosurfaceFailed => "SHELL-2002",
            ShellErrorCode::StageFailed => "SHELL-3001",
            ShellErrorCode::ConnectorFailed => "SHELL-4001",
            ShellErrorCode::HolesFailed => "SHELL-4002",
            ShellErrorCode::MergeFailed => "SHELL-4003",
            ShellErrorCode::FlattenFailed => "SHELL-4004",
            ShellErrorCode::Kernel => "SHELL-5001",
        }
    }
}

impl std::fmt::Display for ShellErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for shell errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellRecoverySuggestion {
    /// Bind the named input before calling `update()`.
    BindSource { input: &'static str },
    /// Reduce the SDF resolution.
    ReduceGridResolution { current: usize, suggested: usize },
    /// Switch to the normal-offset method.
    UseNormalOffset,
    /// Redraw the trim curve so it encloses one region.
    RedrawTrimCurve,
    /// Move or resize the holes so their rays hit the connector.
    AdjustHoles,
    /// Check the configuration file.
    FixConfig,
    /// No specific suggestion.
    None,
}

impl std::fmt::Display for ShellRecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellRecoverySuggestion::BindSource { input } => {
                write!(f, "Set a {input} source on the generator before updating")
            }
            ShellRecoverySuggestion::ReduceGridResolution { current, suggested } => {
                write!(
                    f,
                    "Reduce SDF resolution from {} to {} cells",
                    current, suggested
                )
            }
            ShellRecoverySuggestion::UseNormalOffset => {
                write!(f, "Use the normal offset method, it needs no voxel grid")
            }
            ShellRecoverySuggestion::RedrawTrimCurve => {
                write!(
                    f,
                    "Redraw the trim curve as a closed loop that splits the scan in two"
                )
            }
            ShellRecoverySuggestion::AdjustHoles => {
                write!(
                    f,
                    "Check hole offsets and radii against the connector dimensions"
                )
            }
            ShellRecoverySuggestion::FixConfig => {
                write!(f, "Check the configuration file against `device config --example`")
            }
            ShellRecoverySuggestion::None => {
                write!(f, "No specific suggestion available")
            }
        }
    }
}

/// Errors that can occur during device generation.
#[derive(Debug, Error, Diagnostic)]
pub enum ShellError {
    /// A required input source is not bound.
    #[error("no {input} source is bound to the generator")]
    #[diagnostic(
        code(shell::config::missing_source),
        help("Both a mesh source and a curve source must be set before calling update().")
    )]
    MissingSource { input: &'static str },

    /// Input mesh is empty.
    #[error("input mesh is empty")]
    #[diagnostic(
        code(shell::input::empty),
        help(
            "The input mesh must have at least one vertex and one face. Check that the scan was loaded correctly."
        )
    )]
    EmptyMesh,

    /// Invalid parameters.
    #[error("invalid parameter {param}: {details}")]
    #[diagnostic(
        code(shell::params::invalid),
        help("Offsets and thicknesses are millimetres; thickness and diameters must be positive.")
    )]
    InvalidParams { param: String, details: String },

    /// Configuration file could not be read or parsed.
    #[error("invalid configuration{}: {details}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    #[diagnostic(code(shell::config::invalid))]
    InvalidConfig {
        path: Option<PathBuf>,
        details: String,
    },

    /// SDF grid would be too large.
    #[error("SDF grid too large: {dims:?} = {total} cells exceeds limit of {max}")]
    #[diagnostic(
        code(shell::grid::too_large),
        help("Lower `sdf_cells` in the offset parameters or use the normal offset method.")
    )]
    GridTooLarge {
        dims: [usize; 3],
        total: usize,
        max: usize,
    },

    /// Isosurface extraction produced nothing.
    #[error("isosurface extraction at offset {iso:.3}mm produced an empty mesh")]
    #[diagnostic(
        code(shell::isosurface::empty),
        help("The offset may be larger than the grid padding, or the scan is not closed.")
    )]
    EmptyIsosurface { iso: f64 },

    /// A shell stage failed.
    #[error("{stage} stage failed: {details}")]
    #[diagnostic(code(shell::stage::failed))]
    StageFailed { stage: Stage, details: String },

    /// Connector geometry could not be built.
    #[error("connector {connector} could not be built: {details}")]
    #[diagnostic(
        code(shell::connector::failed),
        help("Check that the connector wall is thinner than its radius.")
    )]
    ConnectorFailed {
        connector: String,
        details: String,
    },

    /// Some holes were not cut.
    #[error("{failed} of {total} connector holes could not be cut")]
    #[diagnostic(code(shell::connector::holes))]
    HolesFailed { failed: usize, total: usize },

    /// Seam merge between shell and connector failed.
    #[error("connector merge failed: {details}")]
    #[diagnostic(
        code(shell::connector::merge),
        help("The connector cut height must cross the outer wall of the shell.")
    )]
    MergeFailed { details: String },

    /// Base flattening failed.
    #[error("base flattening failed: {details}")]
    #[diagnostic(code(shell::flatten::failed))]
    FlattenFailed { details: String },

    /// Underlying kernel error.
    #[error("mesh operation failed: {0}")]
    #[diagnostic(code(shell::mesh::error))]
    MeshError(#[from] mesh_kernel::MeshError),
}

impl ShellError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ShellErrorCode {
        match self {
            ShellError::MissingSource { .. } => ShellErrorCode::MissingSource,
            ShellError::EmptyMesh => ShellErrorCode::EmptyMesh,
            ShellError::InvalidParams { .. } => ShellErrorCode::InvalidParams,
            ShellError::InvalidConfig { .. } => ShellErrorCode::InvalidConfig,
            ShellError::GridTooLarge { .. } => ShellErrorCode::GridTooLarge,
            ShellError::EmptyIsosurface { .. } => ShellErrorCode::IsosurfaceFailed,
            ShellError::StageFailed { .. } => ShellErrorCode::StageFailed,
            ShellError::ConnectorFailed { .. } => ShellErrorCode::ConnectorFailed,
            ShellError::HolesFailed { .. } => ShellErrorCode::HolesFailed,
            ShellError::MergeFailed { .. } => ShellErrorCode::MergeFailed,
            ShellError::FlattenFailed { .. } => ShellErrorCode::FlattenFailed,
            ShellError::MeshError(_) => ShellErrorCode::Kernel,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> ShellRecoverySuggestion {
        match self {
            ShellError::MissingSource { input } => ShellRecoverySuggestion::BindSource { input },
            ShellError::EmptyMesh => ShellRecoverySuggestion::None,
            ShellError::InvalidParams { .. } => ShellRecoverySuggestion::FixConfig,
            ShellError::InvalidConfig { .. } => ShellRecoverySuggestion::FixConfig,
            ShellError::GridTooLarge { dims, max, .. } => {
                let current = dims.iter().copied().max().unwrap_or(0);
                let scale = (*max as f64 / (dims[0] * dims[1] * dims[2]).max(1) as f64).cbrt();
                ShellRecoverySuggestion::ReduceGridResolution {
                    current,
                    suggested: ((current as f64 * scale) as usize).max(8),
                }
            }
            ShellError::EmptyIsosurface { .. } => ShellRecoverySuggestion::UseNormalOffset,
            ShellError::StageFailed { stage, .. } => match stage {
                Stage::Trim => ShellRecoverySuggestion::RedrawTrimCurve,
                _ => ShellRecoverySuggestion::None,
            },
            ShellError::ConnectorFailed { .. } => ShellRecoverySuggestion::FixConfig,
            ShellError::HolesFailed { .. } => ShellRecoverySuggestion::AdjustHoles,
            ShellError::MergeFailed { .. } => ShellRecoverySuggestion::None,
            ShellError::FlattenFailed { .. } => ShellRecoverySuggestion::None,
            ShellError::MeshError(_) => ShellRecoverySuggestion::None,
        }
    }

    // Constructor helpers

    /// Create a missing source error.
    pub fn missing_source(input: &'static str) -> Self {
        ShellError::MissingSource { input }
    }

    /// Create an invalid parameter error.
    pub fn invalid_param(param: impl Into<String>, details: impl Into<String>) -> Self {
        ShellError::InvalidParams {
            param: param.into(),
            details: details.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(path: Option<PathBuf>, details: impl Into<String>) -> Self {
        ShellError::InvalidConfig {
            path,
            details: details.into(),
        }
    }

    /// Create a grid too large error.
    pub fn grid_too_large(dims: [usize; 3], max: usize) -> Self {
        ShellError::GridTooLarge {
            dims,
            total: dims[0] * dims[1] * dims[2],
            max,
        }
    }

    /// Create a stage failure.
    pub fn stage_failed(stage: Stage, details: impl Into<String>) -> Self {
        ShellError::StageFailed {
            stage,
            details: details.into(),
        }
    }

    /// Create a connector failure.
    pub fn connector_failed(connector: impl Into<String>, details: impl Into<String>) -> Self {
        ShellError::ConnectorFailed {
            connector: connector.into(),
            details: details.into(),
        }
    }

    /// Create a merge failure.
    pub fn merge_failed(details: impl Into<String>) -> Self {
        ShellError::MergeFailed {
            details: details.into(),
        }
    }

    /// Create a flatten failure.
    pub fn flatten_failed(details: impl Into<String>) -> Self {
        ShellError::FlattenFailed {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ShellError::missing_source("mesh");
        assert_eq!(err.code(), ShellErrorCode::MissingSource);
        assert_eq!(err.code().as_str(), "SHELL-1001");
        assert_eq!(
            err.recovery_suggestion(),
            ShellRecoverySuggestion::BindSource { input: "mesh" }
        );
    }

    #[test]
    fn test_grid_too_large_suggestion() {
        let err = ShellError::grid_too_large([200, 200, 200], 1_000_000);
        match err.recovery_suggestion() {
            ShellRecoverySuggestion::ReduceGridResolution { current, suggested } => {
                assert_eq!(current, 200);
                assert!(suggested < 200);
            }
            other => panic!("Expected ReduceGridResolution, got {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ShellError::stage_failed(Stage::Trim, "curve does not separate the scan");
        let display = format!("{}", err);
        assert!(display.starts_with("trim stage failed"));

        let err = ShellError::HolesFailed {
            failed: 1,
            total: 3,
        };
        assert_eq!(format!("{err}"), "1 of 3 connector holes could not be cut");
    }

    #[test]
    fn test_from_mesh_error() {
        let mesh_err = mesh_kernel::MeshError::empty_mesh("test");
        let shell_err: ShellError = mesh_err.into();
        assert!(matches!(shell_err, ShellError::MeshError(_)));
        assert_eq!(shell_err.code(), ShellErrorCode::Kernel);
    }
}
