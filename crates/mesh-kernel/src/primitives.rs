//! Procedural meshes: capped cylinders, spheres and planar grids.
//!
//! All generators produce closed (or, for grids, disc-like) meshes with
//! counter-clockwise winding seen from outside and Z as the axis.

use std::f64::consts::TAU;

use nalgebra::Point3;

use crate::types::Mesh;

/// Triangle groups assigned by [`capped_cylinder`].
pub mod cylinder_groups {
    pub const BOTTOM: i32 = 1;
    pub const SIDE: i32 = 2;
    pub const TOP: i32 = 3;
}

/// A cylinder along +Z from `z = 0` to `z = height`, centered on the Z axis.
///
/// The side is split into rows and each cap into concentric rings so edges
/// are roughly `target_edge` long in the axial and radial directions. With
/// `inward` the winding is reversed, for use as a cavity.
pub fn capped_cylinder(
    radius: f64,
    height: f64,
    slices: usize,
    target_edge: f64,
    inward: bool,
) -> Mesh {
    let slices = slices.max(3);
    let target_edge = if target_edge > 0.0 { target_edge } else { radius };
    let rows = ((height / target_edge).round() as usize).max(1);
    let rings = ((radius / target_edge).round() as usize).max(1);

    let mut positions = Vec::new();
    let ring_point = |r: f64, i: usize, z: f64| {
        let a = TAU * i as f64 / slices as f64;
        Point3::new(r * a.cos(), r * a.sin(), z)
    };

    // side rows; row 0 and row `rows` double as the outer cap rings
    for j in 0..=rows {
        let z = height * j as f64 / rows as f64;
        for i in 0..slices {
            positions.push(ring_point(radius, i, z));
        }
    }
    let side = |j: usize, i: usize| (j * slices + i % slices) as u32;

    let mut faces = Vec::new();
    let mut groups = Vec::new();
    for j in 0..rows {
        for i in 0..slices {
            faces.push([side(j, i), side(j, i + 1), side(j + 1, i + 1)]);
            faces.push([side(j, i), side(j + 1, i + 1), side(j + 1, i)]);
            groups.extend([cylinder_groups::SIDE; 2]);
        }
    }

    for (z, outer_row, group, up) in [
        (0.0, 0, cylinder_groups::BOTTOM, false),
        (height, rows, cylinder_groups::TOP, true),
    ] {
        // ring k has radius k / rings; ring `rings` is the side row
        let mut ring_start = Vec::with_capacity(rings + 1);
        ring_start.push(positions.len() as u32);
        positions.push(Point3::new(0.0, 0.0, z));
        for k in 1..rings {
            ring_start.push(positions.len() as u32);
            let r = radius * k as f64 / rings as f64;
            for i in 0..slices {
                positions.push(ring_point(r, i, z));
            }
        }
        ring_start.push(side(outer_row, 0));
        let ring = |k: usize, i: usize| ring_start[k] + (i % slices) as u32;

        let mut push = |tri: [u32; 3]| {
            faces.push(if up { tri } else { [tri[0], tri[2], tri[1]] });
            groups.push(group);
        };
        let center = ring_start[0];
        for i in 0..slices {
            push([center, ring(1, i), ring(1, i + 1)]);
        }
        for k in 1..rings {
            for i in 0..slices {
                push([ring(k, i), ring(k + 1, i), ring(k + 1, i + 1)]);
                push([ring(k, i), ring(k + 1, i + 1), ring(k, i + 1)]);
            }
        }
    }

    if inward {
        for f in &mut faces {
            f.swap(1, 2);
        }
    }

    let mut mesh = Mesh::from_parts(positions, faces);
    mesh.groups = groups;
    mesh
}

/// A UV sphere centered at `center`.
pub fn uv_sphere(center: Point3<f64>, radius: f64, slices: usize, stacks: usize) -> Mesh {
    let slices = slices.max(3);
    let stacks = stacks.max(2);
    let mut positions = vec![center + nalgebra::Vector3::new(0.0, 0.0, radius)];
    for s in 1..stacks {
        let phi = std::f64::consts::PI * s as f64 / stacks as f64;
        for i in 0..slices {
            let theta = TAU * i as f64 / slices as f64;
            positions.push(Point3::new(
                center.x + radius * phi.sin() * theta.cos(),
                center.y + radius * phi.sin() * theta.sin(),
                center.z + radius * phi.cos(),
            ));
        }
    }
    let south = positions.len() as u32;
    positions.push(center - nalgebra::Vector3::new(0.0, 0.0, radius));

    let ring = |s: usize, i: usize| (1 + (s - 1) * slices + i % slices) as u32;
    let mut faces = Vec::new();
    for i in 0..slices {
        faces.push([0, ring(1, i), ring(1, i + 1)]);
    }
    for s in 1..stacks - 1 {
        for i in 0..slices {
            faces.push([ring(s, i), ring(s + 1, i), ring(s + 1, i + 1)]);
            faces.push([ring(s, i), ring(s + 1, i + 1), ring(s, i + 1)]);
        }
    }
    for i in 0..slices {
        faces.push([south, ring(stacks - 1, i + 1), ring(stacks - 1, i)]);
    }
    Mesh::from_parts(positions, faces)
}

/// A flat `nx` by `ny` grid of square cells in the XY plane, normal +Z.
///
/// Vertex `(i, j)` has index `j * (nx + 1) + i` and sits at `(i, j) * cell`.
pub fn planar_grid(nx: usize, ny: usize, cell: f64) -> Mesh {
    let mut positions = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            positions.push(Point3::new(i as f64 * cell, j as f64 * cell, 0.0));
        }
    }
    let idx = |i: usize, j: usize| (j * (nx + 1) + i) as u32;
    let mut faces = Vec::with_capacity(nx * ny * 2);
    for j in 0..ny {
        for i in 0..nx {
            faces.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)]);
            faces.push([idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)]);
        }
    }
    Mesh::from_parts(positions, faces)
}
