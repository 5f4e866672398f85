//! Tracing helpers shared by kernel operations.
//!
//! Enable output by installing a subscriber in the application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // RUST_LOG=mesh_kernel=debug for per-operation detail
//! ```
//!
//! # Log Levels
//!
//! - **WARN**: rejected edits, skipped steps, degenerate input
//! - **INFO**: operation timing
//! - **DEBUG**: per-operation counts and mesh sizes
//! - **TRACE**: per-section timing inside hot loops

use std::time::Instant;
use tracing::{Span, debug, info, trace, warn};

use crate::dynamic::DynamicMesh;
use crate::types::Mesh;

/// A timer that logs its duration when dropped.
///
/// ```rust,ignore
/// fn plane_cut(...) {
///     let _timer = OperationTimer::new("plane_cut");
///     // ...
/// } // logs elapsed_ms here
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("mesh_operation", operation = name);
        debug!(target: "mesh_kernel::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Timer that also records the input size.
    pub fn with_context(name: &'static str, triangles: usize, vertices: usize) -> Self {
        let span = tracing::info_span!(
            "mesh_operation",
            operation = name,
            triangles = triangles,
            vertices = vertices
        );
        debug!(
            target: "mesh_kernel::timing",
            operation = name,
            triangles,
            vertices,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "mesh_kernel::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "Operation completed"
        );
    }
}

/// Log the size and extent of a compact mesh.
pub fn log_mesh_stats(mesh: &Mesh, context: &str) {
    let (min, max) = mesh.bounds().unwrap_or_default();
    let dims = max - min;
    debug!(
        target: "mesh_kernel::mesh_state",
        context,
        vertices = mesh.vertex_count(),
        faces = mesh.face_count(),
        dimensions = format!("{:.2} x {:.2} x {:.2}", dims.x, dims.y, dims.z),
        "Mesh state"
    );
}

/// Log the size and topology of an editable mesh.
pub fn log_dynamic_stats(mesh: &DynamicMesh, context: &str) {
    debug!(
        target: "mesh_kernel::mesh_state",
        context,
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        boundary_edges = mesh.boundary_edge_count(),
        groups = mesh.max_group(),
        "Dynamic mesh state"
    );
}

/// Log how many local edits an operation applied and how many were refused.
pub fn log_edit_summary(operation: &str, applied: usize, rejected: usize) {
    if rejected > 0 {
        warn!(
            target: "mesh_kernel::edit",
            operation,
            applied,
            rejected,
            "Some edits were rejected"
        );
    } else {
        debug!(target: "mesh_kernel::edit", operation, applied, "Edits applied");
    }
}

/// Log a file I/O operation.
pub fn log_io_operation(operation: &str, path: &std::path::Path, format: &str, success: bool) {
    if success {
        info!(
            target: "mesh_kernel::io",
            operation,
            path = path.display().to_string(),
            format,
            "I/O operation completed"
        );
    } else {
        warn!(
            target: "mesh_kernel::io",
            operation,
            path = path.display().to_string(),
            format,
            "I/O operation failed"
        );
    }
}

/// Guard that logs a section's duration at trace level when dropped.
#[must_use]
pub fn log_perf_section(name: &'static str) -> impl Drop {
    struct PerfGuard {
        name: &'static str,
        start: Instant,
    }
    impl Drop for PerfGuard {
        fn drop(&mut self) {
            trace!(
                target: "mesh_kernel::perf",
                section = self.name,
                elapsed_us = self.start.elapsed().as_micros(),
                "Performance section completed"
            );
        }
    }
    PerfGuard {
        name,
        start: Instant::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::planar_grid;

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_log_helpers_accept_empty_meshes() {
        log_mesh_stats(&Mesh::new(), "empty");
        log_dynamic_stats(&DynamicMesh::new(), "empty");
        log_dynamic_stats(&DynamicMesh::from_mesh(&planar_grid(2, 2, 1.0)), "grid");
        log_edit_summary("test", 3, 1);
        let _guard = log_perf_section("test");
    }
}
