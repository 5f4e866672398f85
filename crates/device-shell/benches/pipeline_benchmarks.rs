//! Benchmarks for the device generator.
//!
//! Run with: cargo bench -p device-shell
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p device-shell -- --save-baseline main
//! 2. After changes: cargo bench -p device-shell -- --baseline main

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use device_shell::{
    Curve, DeviceGenerator, GeneratorBuilder, OffsetMethod, SharedCurve, SharedMesh, Stage,
};
use mesh_kernel::Mesh;
use mesh_kernel::primitives::capped_cylinder;
use nalgebra::Point3;

// =============================================================================
// Procedural Limb
// =============================================================================

/// A residual limb: a cylinder tapering to 75% of its radius at the top.
fn create_limb(slices: usize, edge: f64) -> Mesh {
    let height = 200.0;
    let mut mesh = capped_cylinder(50.0, height, slices, edge, false);
    for v in &mut mesh.vertices {
        let scale = 1.0 - 0.25 * v.position.z / height;
        v.position.x *= scale;
        v.position.y *= scale;
    }
    mesh
}

fn trim_line() -> Curve {
    Curve::horizontal_circle(Point3::new(0.0, 0.0, 120.0), 50.0, 96)
}

fn bound_generator(mesh: Mesh) -> DeviceGenerator {
    let mut generator = DeviceGenerator::default();
    generator.set_mesh_source(Arc::new(SharedMesh::new(mesh)));
    generator.set_curve_source(Arc::new(SharedCurve::new(trim_line())));
    generator
}

// =============================================================================
// Full Run Benchmarks
// =============================================================================

fn bench_full_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("FullRun");
    group.sample_size(10);

    let test_cases = [
        ("limb_coarse", create_limb(48, 8.0)),
        ("limb_medium", create_limb(96, 4.0)),
    ];

    for (name, mesh) in &test_cases {
        group.throughput(Throughput::Elements(mesh.faces.len() as u64));

        group.bench_with_input(BenchmarkId::new("afo", name), mesh, |b, mesh| {
            b.iter(|| {
                GeneratorBuilder::new()
                    .mesh(black_box(mesh.clone()))
                    .curve(trim_line())
                    .afo()
                    .run()
            })
        });

        group.bench_with_input(BenchmarkId::new("walls_only", name), mesh, |b, mesh| {
            b.iter(|| {
                GeneratorBuilder::new()
                    .mesh(black_box(mesh.clone()))
                    .curve(trim_line())
                    .stop_after(Stage::OuterWall)
                    .run()
            })
        });
    }

    group.finish();
}

// =============================================================================
// Cached Rerun Benchmarks
// =============================================================================

fn bench_cached_rerun(c: &mut Criterion) {
    let mut group = c.benchmark_group("CachedRerun");
    group.sample_size(10);

    // trim is cached, both walls are rebuilt
    let mut generator = bound_generator(create_limb(96, 4.0));
    let mut thick = false;
    group.bench_function("thickness_change", |b| {
        b.iter(|| {
            thick = !thick;
            generator.set_thickness(if thick { 6.0 } else { 5.0 });
            generator.update()
        })
    });

    // nothing to do
    let mut idle = bound_generator(create_limb(96, 4.0));
    let _ = idle.update();
    group.bench_function("up_to_date", |b| b.iter(|| idle.update()));

    group.finish();
}

// =============================================================================
// Offset Method Benchmarks
// =============================================================================

fn bench_offset_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("OffsetMethods");
    group.sample_size(10);

    let limb = create_limb(64, 6.0);
    for method in [OffsetMethod::Normal, OffsetMethod::Sdf] {
        group.bench_with_input(
            BenchmarkId::new("offset", format!("{method:?}")),
            &method,
            |b, &method| {
                b.iter(|| {
                    let mut generator = bound_generator(black_box(limb.clone()));
                    generator.set_offset_method(method);
                    generator.set_stop_after(Some(Stage::Offset));
                    generator.update()
                })
            },
        );
    }

    group.finish();
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(
    benches,
    bench_full_run,
    bench_cached_rerun,
    bench_offset_methods,
);

criterion_main!(benches);
