//! Property-based tests for the flare band, loop simplification and hole
//! cutting.
//!
//! Run with: cargo test -p device-shell -- proptest

use device_shell::connector::{HoleGroups, HoleSpec, cut_holes, simplify_loop};
use device_shell::shell::flare_falloff;
use mesh_kernel::DynamicMesh;
use mesh_kernel::primitives::{capped_cylinder, planar_grid};
use nalgebra::{Point3, Vector2};
use proptest::prelude::*;

/// Hole centers that do not overlap on a radius 20 puck.
const HOLE_CENTERS: [(f64, f64); 4] = [(-9.7, 0.4), (10.3, -0.2), (0.6, 9.8), (-0.3, -10.1)];

// =============================================================================
// Flare falloff
// =============================================================================

proptest! {
    #[test]
    fn proptest_falloff_in_unit_range(t in -3.0..3.0f64) {
        let f = flare_falloff(t);
        prop_assert!((0.0..=1.0).contains(&f));
        prop_assert_eq!(f, flare_falloff(-t));
    }

    #[test]
    fn proptest_falloff_decreasing(a in 0.0..1.5f64, b in 0.0..1.5f64) {
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(flare_falloff(near) >= flare_falloff(far));
    }

    #[test]
    fn proptest_falloff_zero_outside_band(t in 1.0..100.0f64) {
        prop_assert_eq!(flare_falloff(t), 0.0);
    }
}

// =============================================================================
// Loop simplification
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn proptest_simplify_is_idempotent(n in 3usize..8, cut in 0usize..16) {
        let mut dm = DynamicMesh::from_mesh(&planar_grid(n, n, 1.0));
        let boundary = dm.boundary_loops().remove(0);
        let target = boundary.len().saturating_sub(cut).max(4);

        let first = simplify_loop(&mut dm, &boundary, target);
        prop_assert!(first.boundary.len() <= boundary.len());
        prop_assert!(first.boundary.len() >= 3);
        prop_assert!(first.boundary.is_valid_in(&dm));

        let before = dm.triangle_count();
        let second = simplify_loop(&mut dm, &first.boundary, target);
        prop_assert_eq!(second.collapses, 0);
        prop_assert_eq!(&second.boundary.vertices, &first.boundary.vertices);
        prop_assert_eq!(dm.triangle_count(), before);
    }
}

// =============================================================================
// Hole cutting
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// The aggregate succeeds exactly when every hole does, and a failed
    /// hole never stops the others.
    #[test]
    fn proptest_hole_aggregate(missing in prop::collection::vec(any::<bool>(), 1..=4)) {
        let mut dm = DynamicMesh::from_mesh(&capped_cylinder(20.0, 12.0, 48, 1.5, false));
        let holes: Vec<HoleSpec> = missing
            .iter()
            .zip(HOLE_CENTERS)
            .map(|(&miss, (x, y))| HoleSpec {
                radius: 2.0,
                vertices: 12,
                xy_offset: Vector2::new(if miss { x + 100.0 } else { x }, y),
                ..Default::default()
            })
            .collect();

        let ok = cut_holes(&mut dm, &holes, Point3::origin(), HoleGroups::default());
        prop_assert_eq!(ok, !missing.iter().any(|&m| m));
        prop_assert_eq!(dm.boundary_edge_count(), 0);
        prop_assert_eq!(dm.non_manifold_edge_count(), 0);
    }
}
