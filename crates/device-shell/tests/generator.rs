//! Caching, versioning and status behaviour of the generator.
//!
//! Run with: cargo test -p device-shell --test generator

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use approx::assert_relative_eq;
use device_shell::{
    CacheStats, Curve, DeviceGenerator, DeviceParams, Finish, FlatBaseConnector, FlatBaseParams,
    MeshSource, SharedCurve, SharedMesh, ShellError, ShellErrorCode, Stage, Status,
    StitchParams,
};
use mesh_kernel::primitives::capped_cylinder;
use mesh_kernel::{Mesh, VertexColor};
use nalgebra::{Isometry3, Point3};

// =============================================================================
// Helpers
// =============================================================================

fn tube() -> Mesh {
    capped_cylinder(20.0, 60.0, 48, 3.0, false)
}

fn trim_line() -> Curve {
    Curve::horizontal_circle(Point3::new(0.0, 0.0, 31.0), 21.0, 72)
}

fn bound_generator() -> (DeviceGenerator, Arc<SharedMesh>, Arc<SharedCurve>) {
    let mesh = Arc::new(SharedMesh::new(tube()));
    let curve = Arc::new(SharedCurve::new(trim_line()));
    let mut generator = DeviceGenerator::default();
    generator.set_mesh_source(mesh.clone());
    generator.set_curve_source(curve.clone());
    (generator, mesh, curve)
}

fn painted(mesh: &Mesh, color: VertexColor) -> bool {
    mesh.vertices.iter().all(|v| v.color == Some(color))
}

/// A source whose version moves every time it is read, like a scan that is
/// still being edited.
struct RestlessMesh {
    mesh: Arc<Mesh>,
    version: AtomicU64,
}

impl MeshSource for RestlessMesh {
    fn mesh(&self) -> Arc<Mesh> {
        self.version.fetch_add(1, Ordering::AcqRel);
        self.mesh.clone()
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

// =============================================================================
// Inputs
// =============================================================================

#[test]
fn test_missing_curve_source() {
    let mut generator = DeviceGenerator::default();
    generator.set_mesh_source(Arc::new(SharedMesh::new(tube())));
    let err = generator.update().unwrap_err();
    assert!(matches!(err, ShellError::MissingSource { input: "curve" }));
    assert_eq!(err.code(), ShellErrorCode::MissingSource);
}

#[test]
fn test_full_result_is_painted() {
    let (mut generator, _, _) = bound_generator();
    generator.update().unwrap();
    let result = generator.result().unwrap();
    assert_eq!(result.status, Status::Full);
    assert_eq!(result.stage, Stage::Finish);
    assert!(result.failure.is_none());
    assert!(painted(&result.mesh, generator.params().full_color));
    assert!(!generator.needs_update());
    assert!(generator.offsets().is_some());
}

#[test]
fn test_changing_input_reruns() {
    let (mut generator, mesh, curve) = bound_generator();
    generator.update().unwrap();
    assert!(!generator.needs_update());

    mesh.touch();
    assert!(generator.needs_update());
    generator.update().unwrap();
    assert_eq!(generator.cache().stats(), CacheStats { hits: 0, misses: 6 });

    curve.set(Curve::horizontal_circle(Point3::new(0.0, 0.0, 40.0), 21.0, 72));
    generator.update().unwrap();
    let top = generator.result().unwrap().mesh.aabb().unwrap().max.z;
    // the rim is offset sideways, so it stays at the trim line
    assert_relative_eq!(top, 40.0, epsilon = 0.5);
}

// =============================================================================
// Stage cache
// =============================================================================

#[test]
fn test_wall_change_reuses_trim() {
    let (mut generator, _, _) = bound_generator();
    generator.update().unwrap();
    assert_eq!(generator.cache().stats(), CacheStats { hits: 0, misses: 3 });

    generator.update().unwrap();
    assert_eq!(generator.cache().stats(), CacheStats { hits: 0, misses: 3 });

    generator.set_thickness(6.0);
    generator.update().unwrap();
    assert_eq!(generator.cache().stats(), CacheStats { hits: 2, misses: 4 });

    generator.set_inner_offset(3.0);
    generator.update().unwrap();
    assert_eq!(generator.cache().stats(), CacheStats { hits: 3, misses: 6 });
}

#[test]
fn test_invalidate_from_another_thread() {
    let (mut generator, _, _) = bound_generator();
    generator.update().unwrap();

    let handle = generator.invalidation_handle();
    thread::spawn(move || handle.invalidate()).join().unwrap();
    assert!(generator.needs_update());

    generator.update().unwrap();
    assert_eq!(generator.cache().stats(), CacheStats { hits: 3, misses: 3 });
}

#[test]
fn test_discard_caches() {
    let (mut generator, _, _) = bound_generator();
    generator.update().unwrap();
    generator.invalidation_handle().discard_caches();
    generator.update().unwrap();
    assert_eq!(generator.cache().stats(), CacheStats { hits: 0, misses: 6 });
}

#[test]
fn test_transform_moves_result() {
    let (mut generator, _, _) = bound_generator();
    generator.set_stop_after(Some(Stage::Trim));
    generator.update().unwrap();
    let before = generator.result().unwrap().mesh.aabb().unwrap();

    generator.set_transform(Isometry3::translation(10.0, 0.0, 0.0));
    generator.update().unwrap();
    let after = generator.result().unwrap().mesh.aabb().unwrap();
    assert_relative_eq!(after.center().x - before.center().x, 10.0, epsilon = 1e-6);
    assert_relative_eq!(after.max.z, before.max.z, epsilon = 1e-9);
}

// =============================================================================
// Status
// =============================================================================

#[test]
fn test_input_change_during_run_gives_preview() {
    let mut generator = DeviceGenerator::default();
    generator.set_mesh_source(Arc::new(RestlessMesh {
        mesh: Arc::new(tube()),
        version: AtomicU64::new(1),
    }));
    generator.set_curve_source(Arc::new(SharedCurve::new(trim_line())));
    generator.update().unwrap();

    let result = generator.result().unwrap();
    assert_eq!(result.status, Status::Preview);
    assert!(painted(&result.mesh, generator.params().preview_color));
    assert!(generator.needs_update());
}

#[test]
fn test_connector_change_needs_update() {
    let (mut generator, _, _) = bound_generator();
    generator.update().unwrap();
    let slot = generator.connector_slot();
    slot.set(Some(Arc::new(FlatBaseConnector::new(
        FlatBaseParams::default(),
        Vec::new(),
    ))));
    assert!(generator.needs_update());
}

#[test]
fn test_stop_after_each_stage() {
    let (mut generator, _, _) = bound_generator();
    for stage in Stage::ALL {
        generator.set_stop_after(Some(stage));
        generator.update().unwrap();
        let result = generator.result().unwrap();
        assert_eq!(result.status, Status::Full, "stopped after {stage}");
        assert_eq!(result.stage, stage);
    }
}

#[test]
fn test_trim_failure_falls_back_to_placeholder() {
    let mut generator = DeviceGenerator::default();
    generator.set_mesh_source(Arc::new(SharedMesh::new(tube())));
    generator.set_curve_source(Arc::new(SharedCurve::new(Curve::closed(vec![
        Point3::origin(),
        Point3::new(1.0, 0.0, 0.0),
    ]))));
    generator.update().unwrap();

    let result = generator.result().unwrap();
    assert!(result.is_error());
    assert_eq!(result.stage, Stage::Trim);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Trim);
    assert_eq!(failure.code, ShellErrorCode::StageFailed);

    let bounds = result.mesh.aabb().unwrap();
    assert_relative_eq!(bounds.width(), 100.0, epsilon = 1e-6);
    assert_relative_eq!(bounds.center().z, 30.0, epsilon = 1e-6);
    assert!(painted(&result.mesh, VertexColor::VIDEO_RED));
}

#[test]
fn test_finish_failure_keeps_outer_wall() {
    let (mut reference, _, _) = bound_generator();
    reference.set_stop_after(Some(Stage::OuterWall));
    reference.update().unwrap();
    let walls = reference.take_result().unwrap();

    let (mut generator, _, _) = bound_generator();
    generator.set_finish(Finish::ConnectorMerge(StitchParams::default()));
    generator.set_connector(Some(Arc::new(FlatBaseConnector::new(
        FlatBaseParams::default(),
        Vec::new(),
    ))));
    // the cut plane lies above the whole shell, so nothing can be merged
    generator.set_connector_cut_height(500.0);
    generator.update().unwrap();

    let result = generator.result().unwrap();
    assert_eq!(result.status, Status::Error);
    assert_eq!(result.stage, Stage::Finish);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Finish);
    assert_eq!(failure.code, ShellErrorCode::MergeFailed);

    assert_eq!(result.mesh.face_count(), walls.mesh.face_count());
    assert_eq!(result.mesh.vertex_count(), walls.mesh.vertex_count());
    for (a, b) in result.mesh.vertices.iter().zip(&walls.mesh.vertices) {
        assert_relative_eq!(a.position, b.position, epsilon = 1e-12);
    }
    assert!(painted(&result.mesh, VertexColor::VIDEO_RED));
}

#[test]
fn test_invalid_params_rejected() {
    let mut generator = DeviceGenerator::default();
    let params = DeviceParams {
        thickness: -2.0,
        ..Default::default()
    };
    assert!(generator.set_params(params).is_err());
    assert_relative_eq!(generator.params().thickness, 5.0);
}
