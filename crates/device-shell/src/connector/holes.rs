//! Hole specifications and the hole cutter.
//!
//! A through-hole is found with two opposing rays, opened at both hits and
//! closed into a tube. A partial hole is opened at a single hit, walled down
//! to a fixed height and capped with a fan.

use mesh_kernel::components::vertices_of;
use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{
    BoundaryLoop, DynamicMesh, MeshError, ProjectedPolygon, RayHit, RegionRemesher, RemeshParams,
    SpatialIndex, append_fan, insert_polygon, stitch_loops,
};
use nalgebra::{Point3, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ShellError, ShellResult};

use super::simplify::simplify_loop;

/// Vertical through-holes start this far below the connector base.
const BELOW_BASE: f64 = 100.0;
/// Distance used to place rays outside of everything.
const FAR: f64 = 10_000.0;

const FAN_TARGET_EDGE: f64 = 2.0;
const FAN_SMOOTHING: f64 = 1.0;
const FAN_PASSES: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoleAxis {
    /// Along Z through the connector base.
    #[default]
    Vertical,
    /// In the XY plane through the connector wall.
    Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoleMode {
    #[default]
    Through,
    /// Opened from below, capped above.
    PartialUp,
    /// Opened from above, capped below.
    PartialDown,
}

/// Which triangles a hole ray may hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitFilter {
    #[default]
    Any,
    ConnectorOuter,
    ConnectorInner,
    Group(i32),
}

/// Group ids the connector parts received in the host mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoleGroups {
    pub inner: Option<i32>,
    pub outer: Option<i32>,
}

impl HitFilter {
    pub fn accepts(&self, group: i32, groups: HoleGroups) -> bool {
        match self {
            HitFilter::Any => true,
            HitFilter::ConnectorOuter => groups.outer == Some(group),
            HitFilter::ConnectorInner => groups.inner == Some(group),
            HitFilter::Group(g) => *g == group,
        }
    }
}

/// One hole, placed relative to the bottom center of the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleSpec {
    pub axis: HoleAxis,
    pub mode: HoleMode,
    pub radius: f64,
    /// Polygon corners; 0 picks 32.
    pub vertices: usize,
    /// Placement in the XY plane.
    pub xy_offset: Vector2<f64>,
    /// Height above the base of a horizontal hole.
    pub height: f64,
    /// Direction of a horizontal hole, degrees from +X about Z.
    pub around_angle_deg: f64,
    /// Rotation of the polygon about its own axis, degrees.
    pub axis_angle_deg: f64,
    /// Height above the base where a partial hole is capped.
    pub partial_base_height: f64,
    /// Group of the cap fan; a new group when unset. The wall strip between
    /// the opening and the cap always gets a group of its own.
    pub partial_group: Option<i32>,
    /// Triangles the first ray may hit.
    pub near_filter: HitFilter,
    /// Triangles the opposing ray may hit.
    pub far_filter: HitFilter,
}

impl Default for HoleSpec {
    fn default() -> Self {
        Self {
            axis: HoleAxis::Vertical,
            mode: HoleMode::Through,
            radius: 2.5,
            vertices: 32,
            xy_offset: Vector2::zeros(),
            height: 0.0,
            around_angle_deg: 0.0,
            axis_angle_deg: 0.0,
            partial_base_height: 0.0,
            partial_group: None,
            near_filter: HitFilter::Any,
            far_filter: HitFilter::Any,
        }
    }
}

impl HoleSpec {
    /// Through the base, from the outside bottom into the cavity.
    pub fn vertical_through(radius: f64, x: f64, y: f64) -> Self {
        Self {
            radius,
            xy_offset: Vector2::new(x, y),
            near_filter: HitFilter::ConnectorOuter,
            far_filter: HitFilter::ConnectorInner,
            ..Default::default()
        }
    }

    /// Through the side wall at `height`, pointing `around_angle_deg` from +X.
    pub fn horizontal_through(radius: f64, height: f64, around_angle_deg: f64) -> Self {
        Self {
            axis: HoleAxis::Horizontal,
            radius,
            height,
            around_angle_deg,
            near_filter: HitFilter::ConnectorInner,
            far_filter: HitFilter::ConnectorOuter,
            ..Default::default()
        }
    }

    /// Blind hole in the base, capped at `depth` above the base.
    pub fn partial_up(radius: f64, x: f64, y: f64, depth: f64) -> Self {
        Self {
            mode: HoleMode::PartialUp,
            radius,
            xy_offset: Vector2::new(x, y),
            partial_base_height: depth,
            near_filter: HitFilter::ConnectorOuter,
            ..Default::default()
        }
    }

    pub fn sides(&self) -> usize {
        if self.vertices == 0 { 32 } else { self.vertices.max(3) }
    }

    fn offset(&self) -> Vector3<f64> {
        Vector3::new(self.xy_offset.x, self.xy_offset.y, 0.0)
    }

    fn horizontal_direction(&self) -> Vector3<f64> {
        Rotation3::from_axis_angle(&Vector3::z_axis(), self.around_angle_deg.to_radians())
            * Vector3::x()
    }

    fn polygon(&self, origin: Point3<f64>, direction: Vector3<f64>) -> ShellResult<ProjectedPolygon> {
        Ok(ProjectedPolygon::circle(
            origin,
            direction,
            self.radius,
            self.sides(),
            self.axis_angle_deg.to_radians(),
        )?)
    }
}

/// Cut `holes` in order. `base` is the connector's bottom center in mesh
/// space.
///
/// Every hole is attempted; the result is `false` if any failed. An empty
/// list leaves the mesh untouched and returns `true`.
pub fn cut_holes(mesh: &mut DynamicMesh, holes: &[HoleSpec], base: Point3<f64>, groups: HoleGroups) -> bool {
    count_failed_holes(mesh, holes, base, groups) == 0
}

/// Like [`cut_holes`], returning how many holes failed.
pub(crate) fn count_failed_holes(
    mesh: &mut DynamicMesh,
    holes: &[HoleSpec],
    base: Point3<f64>,
    groups: HoleGroups,
) -> usize {
    if holes.is_empty() {
        return 0;
    }
    let _timer = OperationTimer::with_context("cut_holes", mesh.triangle_count(), mesh.vertex_count());
    let mut failed = 0usize;
    for (i, hole) in holes.iter().enumerate() {
        if let Err(e) = cut_hole(mesh, hole, base, groups) {
            warn!(hole = i, error = %e, "Hole could not be cut");
            failed += 1;
        }
    }
    info!(total = holes.len(), failed, "Holes cut");
    failed
}

/// Cut a single hole.
pub fn cut_hole(mesh: &mut DynamicMesh, hole: &HoleSpec, base: Point3<f64>, groups: HoleGroups) -> ShellResult<()> {
    if hole.radius <= 0.0 {
        return Err(ShellError::invalid_param("radius", "hole radius must be positive"));
    }
    match hole.mode {
        HoleMode::Through => cut_through(mesh, hole, base, groups),
        HoleMode::PartialUp | HoleMode::PartialDown => {
            if hole.axis == HoleAxis::Horizontal {
                return Err(ShellError::invalid_param(
                    "axis",
                    "partial holes are only cut vertically",
                ));
            }
            cut_partial(mesh, hole, base, groups)
        }
    }
}

fn cut_through(mesh: &mut DynamicMesh, hole: &HoleSpec, base: Point3<f64>, groups: HoleGroups) -> ShellResult<()> {
    let (origin, dir) = match hole.axis {
        HoleAxis::Vertical => (base + hole.offset() - Vector3::z() * BELOW_BASE, Vector3::z()),
        HoleAxis::Horizontal => (
            base + hole.offset() + Vector3::z() * hole.height,
            hole.horizontal_direction(),
        ),
    };
    let far_origin = origin + dir * FAR;

    let index = SpatialIndex::build(mesh);
    let near = index
        .ray_hit_filtered(&origin, &dir, |_, g| hole.near_filter.accepts(g, groups))
        .ok_or_else(|| MeshError::query_missed("hole ray missed"))?;
    let far = index
        .ray_hit_filtered(&far_origin, &-dir, |_, g| hole.far_filter.accepts(g, groups))
        .ok_or_else(|| MeshError::query_missed("opposing hole ray missed"))?;
    if near.triangle == far.triangle {
        return Err(MeshError::query_missed("both hole rays hit the same triangle").into());
    }

    let first = insert_polygon(mesh, &hole.polygon(origin, dir)?, &near)?;
    let second = insert_polygon(mesh, &hole.polygon(far_origin, -dir)?, &far)?;

    let sides = hole.sides();
    let fit = |mesh: &mut DynamicMesh, boundary: BoundaryLoop| {
        if boundary.len() > sides {
            simplify_loop(mesh, &boundary, sides).boundary
        } else {
            boundary
        }
    };
    let l0 = fit(mesh, first.boundary);
    let l1 = fit(mesh, second.boundary);

    let group = mesh.allocate_group();
    let tube = stitch_loops(mesh, &l0, &l1.reversed(), group)?;
    debug!(
        near = near.triangle,
        far = far.triangle,
        tube = tube.len(),
        "Through hole cut"
    );
    Ok(())
}

fn cut_partial(mesh: &mut DynamicMesh, hole: &HoleSpec, base: Point3<f64>, groups: HoleGroups) -> ShellResult<()> {
    let dir = match hole.mode {
        HoleMode::PartialDown => -Vector3::z(),
        _ => Vector3::z(),
    };
    let origin = base + hole.offset() - dir * FAR;
    let index = SpatialIndex::build(mesh);
    let hit: RayHit = index
        .ray_hit_filtered(&origin, &dir, |_, g| hole.near_filter.accepts(g, groups))
        .ok_or_else(|| MeshError::query_missed("partial hole ray missed"))?;

    let opened = insert_polygon(mesh, &hole.polygon(origin, dir)?, &hit)?;
    let opening = opened.boundary;
    let cap_z = base.z + hole.partial_base_height;

    let cap = BoundaryLoop::new(
        opening
            .vertices
            .iter()
            .map(|&v| {
                let p = mesh.position(v);
                mesh.append_vertex(Point3::new(p.x, p.y, cap_z))
            })
            .collect(),
    );
    let wall_group = mesh.allocate_group();
    stitch_loops(mesh, &opening, &cap, wall_group)?;

    let cap = in_boundary_orientation(mesh, &cap);
    let center = Point3::new(hit.point.x, hit.point.y, cap_z);
    let fan_group = hole.partial_group.unwrap_or_else(|| mesh.allocate_group());
    let (_, fan) = append_fan(mesh, center, &cap, fan_group, false)?;

    let mut region = RegionRemesher::new(mesh, &fan);
    let params = RemeshParams::with_target_edge_length(FAN_TARGET_EDGE)
        .smoothing(FAN_SMOOTHING)
        .prevent_normal_flips(true)
        .passes(FAN_PASSES);
    let stats = region.remesh(&params, None);
    region.back_propagate(mesh)?;

    debug!(
        opening = opening.len(),
        wall_group,
        fan_group,
        fan_vertices = vertices_of(mesh, &fan).len(),
        splits = stats.splits,
        "Partial hole cut"
    );
    Ok(())
}

/// `boundary` ordered the way its edges run in the adjacent triangles.
fn in_boundary_orientation(mesh: &DynamicMesh, boundary: &BoundaryLoop) -> BoundaryLoop {
    let (a, b) = (boundary.vertices[0], boundary.vertices[1]);
    let forward = mesh.edge_triangles(a, b).into_iter().any(|t| {
        let tri = mesh.triangle(t);
        (0..3).any(|i| tri[i] == a && tri[(i + 1) % 3] == b)
    });
    if forward { boundary.clone() } else { boundary.reversed() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_kernel::primitives::capped_cylinder;
    use std::collections::HashSet;

    fn slab() -> DynamicMesh {
        // a closed puck, 12 high
        DynamicMesh::from_mesh(&capped_cylinder(20.0, 12.0, 48, 1.5, false))
    }

    #[test]
    fn test_no_holes_is_success() {
        let mut dm = slab();
        let before = dm.triangle_count();
        assert!(cut_holes(&mut dm, &[], Point3::origin(), HoleGroups::default()));
        assert_eq!(dm.triangle_count(), before);
    }

    #[test]
    fn test_vertical_through_hole() {
        let mut dm = slab();
        let hole = HoleSpec {
            radius: 3.0,
            vertices: 16,
            xy_offset: Vector2::new(5.2, 0.3),
            ..Default::default()
        };
        assert!(cut_holes(&mut dm, &[hole], Point3::origin(), HoleGroups::default()));
        assert_eq!(dm.boundary_edge_count(), 0);
        assert_eq!(dm.non_manifold_edge_count(), 0);
        let volume = dm.to_mesh().signed_volume();
        assert!(volume < std::f64::consts::PI * 400.0 * 12.0);
        assert!(volume > 0.0);
    }

    #[test]
    fn test_failures_do_not_stop_later_holes() {
        let mut dm = slab();
        let missing = HoleSpec {
            xy_offset: Vector2::new(100.0, 0.0),
            ..Default::default()
        };
        let good = HoleSpec {
            radius: 2.0,
            vertices: 12,
            xy_offset: Vector2::new(-6.1, 2.3),
            ..Default::default()
        };
        let before = dm.to_mesh().signed_volume();
        assert!(!cut_holes(&mut dm, &[missing, good], Point3::origin(), HoleGroups::default()));
        // the second hole went through regardless
        assert_eq!(dm.boundary_edge_count(), 0);
        assert!(dm.to_mesh().signed_volume() < before - 100.0);
    }

    #[test]
    fn test_partial_hole_is_capped() {
        let mut dm = slab();
        let hole = HoleSpec {
            near_filter: HitFilter::Any,
            ..HoleSpec::partial_up(2.5, 4.3, -3.1, 6.0)
        };
        cut_hole(&mut dm, &hole, Point3::origin(), HoleGroups::default()).unwrap();
        assert_eq!(dm.boundary_edge_count(), 0);
        assert_eq!(dm.non_manifold_edge_count(), 0);
        let cap_top = dm
            .vertex_ids()
            .map(|v| dm.position(v))
            .filter(|p| (p.x - 4.3).hypot(p.y + 3.1) < 2.0 && p.z > 1e-6)
            .fold(f64::MAX, |lo, p| lo.min(p.z));
        assert!((cap_top - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_partial_cap_has_own_group() {
        let mut dm = slab();
        let before: HashSet<i32> = dm.triangle_ids().map(|t| dm.group(t)).collect();
        let hole = HoleSpec {
            partial_group: Some(40),
            ..HoleSpec::partial_up(2.5, 4.3, -3.1, 6.0)
        };
        cut_hole(&mut dm, &hole, Point3::origin(), HoleGroups::default()).unwrap();

        let added: HashSet<i32> = dm
            .triangle_ids()
            .map(|t| dm.group(t))
            .filter(|g| !before.contains(g))
            .collect();
        assert_eq!(added.len(), 2);
        assert!(added.contains(&40));

        // the cap is flat at its height, the wall spans down to the opening
        for t in dm.triangle_ids().filter(|&t| dm.group(t) == 40) {
            for v in dm.triangle(t) {
                assert!((dm.position(v).z - 6.0).abs() < 1e-6);
            }
        }
        let wall = added.iter().copied().find(|&g| g != 40).unwrap();
        let wall_low = dm
            .triangle_ids()
            .filter(|&t| dm.group(t) == wall)
            .flat_map(|t| dm.triangle(t))
            .map(|v| dm.position(v).z)
            .fold(f64::MAX, f64::min);
        assert!(wall_low < 1e-6);
    }

    #[test]
    fn test_horizontal_partial_is_rejected() {
        let mut dm = slab();
        let hole = HoleSpec {
            axis: HoleAxis::Horizontal,
            mode: HoleMode::PartialDown,
            ..Default::default()
        };
        assert!(cut_hole(&mut dm, &hole, Point3::origin(), HoleGroups::default()).is_err());
    }

    #[test]
    fn test_filters() {
        let groups = HoleGroups {
            inner: Some(7),
            outer: Some(5),
        };
        assert!(HitFilter::Any.accepts(1, groups));
        assert!(HitFilter::ConnectorOuter.accepts(5, groups));
        assert!(!HitFilter::ConnectorOuter.accepts(7, groups));
        assert!(!HitFilter::ConnectorInner.accepts(7, HoleGroups::default()));
        assert!(HitFilter::Group(3).accepts(3, groups));
    }
}
