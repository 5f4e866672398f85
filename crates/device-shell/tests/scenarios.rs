//! End-to-end scenarios on procedural limbs.
//!
//! Run with: cargo test -p device-shell --test scenarios

use approx::assert_relative_eq;
use device_shell::{
    Connector, Curve, FlatBaseConnector, FlatBaseParams, FlattenParams, GeneratorBuilder, Stage,
    Status, shell_groups,
};
use device_shell::finish::flatten_base;
use mesh_kernel::primitives::capped_cylinder;
use mesh_kernel::{DynamicMesh, Mesh, SpatialIndex};
use nalgebra::Point3;

// =============================================================================
// Helpers
// =============================================================================

/// A 200 mm limb of radius 50 standing on the XY plane.
fn limb() -> Mesh {
    capped_cylinder(50.0, 200.0, 64, 5.0, false)
}

fn trim_line(height: f64) -> Curve {
    Curve::horizontal_circle(Point3::new(0.0, 0.0, height), 51.0, 96)
}

/// Vertex indices used by faces of `group`.
fn group_vertices(mesh: &Mesh, group: i32) -> Vec<usize> {
    let mut used = vec![false; mesh.vertex_count()];
    for (f, face) in mesh.faces.iter().enumerate() {
        if mesh.group(f) == group {
            for &v in face {
                used[v as usize] = true;
            }
        }
    }
    used.iter()
        .enumerate()
        .filter_map(|(i, &u)| u.then_some(i))
        .collect()
}

// =============================================================================
// Trim
// =============================================================================

#[test]
fn scenario_trim_cylinder_at_half_height() {
    let result = GeneratorBuilder::new()
        .mesh(limb())
        .curve(trim_line(100.0))
        .stop_after(Stage::Trim)
        .run()
        .unwrap();

    assert_eq!(result.status, Status::Full);
    assert_eq!(result.stage, Stage::Trim);

    let bounds = result.mesh.aabb().unwrap();
    assert_relative_eq!(bounds.max.z, 100.0, epsilon = 1e-3);
    assert_relative_eq!(bounds.min.z, 0.0, epsilon = 1e-6);

    let dm = DynamicMesh::from_mesh(&result.mesh);
    assert_eq!(dm.boundary_loops().len(), 1);
}

// =============================================================================
// Walls
// =============================================================================

#[test]
fn scenario_walls_offset_from_scan() {
    let scan = limb();
    let index = SpatialIndex::from_mesh(&scan);
    let result = GeneratorBuilder::new()
        .mesh(scan)
        .curve(trim_line(100.0))
        .inner_offset(2.0)
        .thickness(5.0)
        .stop_after(Stage::OuterWall)
        .run()
        .unwrap();
    assert_eq!(result.status, Status::Full);

    let mesh = &result.mesh;
    let in_band = |v: &usize| {
        let z = mesh.vertices[*v].position.z;
        (20.0..80.0).contains(&z)
    };

    let outer: Vec<usize> = group_vertices(mesh, shell_groups::OUTER)
        .into_iter()
        .filter(in_band)
        .collect();
    assert!(!outer.is_empty());
    for v in outer {
        let d = index.nearest(&mesh.vertices[v].position).unwrap().distance;
        assert!(d > 6.8 && d < 7.0 + 1e-6, "outer vertex {v} at distance {d}");
    }

    for v in group_vertices(mesh, shell_groups::INNER)
        .into_iter()
        .filter(in_band)
    {
        let d = index.nearest(&mesh.vertices[v].position).unwrap().distance;
        assert!(d > 1.9 && d < 2.0 + 1e-6, "inner vertex {v} at distance {d}");
    }

    // a closed shell: the rim is stitched
    let dm = DynamicMesh::from_mesh(mesh);
    assert!(dm.boundary_loops().is_empty());
}

// =============================================================================
// Connector
// =============================================================================

#[test]
fn scenario_connector_cup_height() {
    let params = FlatBaseParams {
        diameter: 75.0,
        base_thickness: 5.0,
        inner_vertical_space: 5.0,
        ..Default::default()
    };
    let connector = FlatBaseConnector::new(params, Vec::new());
    let geometry = connector.geometry().unwrap();

    assert_relative_eq!(geometry.combined_bounds.height(), 10.0, epsilon = 1e-6);

    let outer = DynamicMesh::from_mesh(&geometry.outer);
    assert_eq!(outer.boundary_loops().len(), 1);
    let inner = DynamicMesh::from_mesh(geometry.inner.as_ref().unwrap());
    assert_eq!(inner.boundary_loops().len(), 1);
}

// =============================================================================
// Flatten
// =============================================================================

#[test]
fn scenario_flatten_skips_upward_band() {
    // a floor facing up, as seen from inside a cup
    let mut mesh = Mesh::from_parts(
        vec![
            Point3::new(-10.0, -10.0, 0.0),
            Point3::new(10.0, -10.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(1.0, -2.0, 0.0),
        ],
        vec![[0, 1, 3], [1, 2, 3], [2, 0, 3]],
    );
    mesh.groups = vec![shell_groups::OUTER; 3];
    let mut dm = DynamicMesh::from_mesh(&mesh);

    let report = flatten_base(&mut dm, &FlattenParams::default()).unwrap();
    assert_eq!(report.flattened, 0);
    assert_eq!(report.remeshed, 0);
    assert_relative_eq!(report.base_height.unwrap(), 0.0);
    let after = dm.to_mesh();
    assert_eq!(after.faces.len(), mesh.faces.len());
    for (a, b) in after.vertices.iter().zip(&mesh.vertices) {
        assert_eq!(a.position, b.position);
    }
}

#[test]
fn scenario_afo_sole_stays_flat() {
    let result = GeneratorBuilder::new()
        .mesh(limb())
        .curve(trim_line(100.0))
        .afo()
        .run()
        .unwrap();

    assert!(!result.is_error(), "failure: {:?}", result.failure);
    assert_eq!(result.stage, Stage::Finish);
    let bounds = result.mesh.aabb().unwrap();
    assert_relative_eq!(bounds.min.z, -7.0, epsilon = 1e-3);
}

#[test]
fn scenario_socket_is_closed() {
    // a limb that fits the default cup: inner wall 32, outer wall 37
    let result = GeneratorBuilder::new()
        .mesh(capped_cylinder(30.0, 200.0, 64, 5.0, false))
        .curve(Curve::horizontal_circle(Point3::new(0.0, 0.0, 100.0), 31.0, 96))
        .socket()
        .run()
        .unwrap();

    assert_eq!(result.status, Status::Full, "failure: {:?}", result.failure);
    assert_eq!(result.stage, Stage::Finish);
    assert!(result.failure.is_none());

    let groups = result.mesh.group_histogram();
    assert!(groups.iter().any(|&(g, _)| g > shell_groups::STITCH));

    let dm = DynamicMesh::from_mesh(&result.mesh);
    assert_eq!(dm.boundary_edge_count(), 0);
    assert_eq!(dm.non_manifold_edge_count(), 0);
    assert_eq!(dm.triangle_count(), result.mesh.face_count());

    // the cup hangs below the shell: top at -2, 10 deep
    let bounds = result.mesh.aabb().unwrap();
    assert!(bounds.min.z < -10.0 && bounds.min.z > -12.5, "min z {}", bounds.min.z);
}
