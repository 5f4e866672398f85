//! Joining a shell opening to a connector opening.
//!
//! Both loops are pulled onto a shared circle, resampled to the same
//! vertices, welded, and the seam is remeshed while being kept out of the
//! offset reference so the wall does not get thinner there.

use hashbrown::HashSet;
use mesh_kernel::components::{expand_by_rings, triangles_touching};
use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{
    BoundaryLoop, DynamicMesh, LoopRemesher, PointSetTarget, ProjectionTarget, RemeshParams,
    SpatialIndex, merge_coincident, quick_remesh,
};
use nalgebra::{Point3, Unit, Vector3};
use tracing::{debug, info, warn};

use crate::error::{ShellError, ShellResult};
use crate::params::StitchParams;

/// Leaves points outside a closed reference alone and moves points inside
/// it to the closest point of its surface.
pub struct NoPenetration<'a> {
    reference: &'a SpatialIndex,
}

impl<'a> NoPenetration<'a> {
    pub fn new(reference: &'a SpatialIndex) -> Self {
        Self { reference }
    }
}

impl ProjectionTarget for NoPenetration<'_> {
    fn project(&self, p: &Point3<f64>, _vertex: Option<u32>) -> Point3<f64> {
        if self.reference.is_inside(p) {
            self.reference.nearest(p).map_or(*p, |hit| hit.point)
        } else {
            *p
        }
    }
}

/// Circle both loops are fitted to.
#[derive(Debug, Clone, Copy)]
pub struct SeamCircle {
    pub center: Point3<f64>,
    pub radius: f64,
    pub axis: Unit<Vector3<f64>>,
}

impl SeamCircle {
    /// Centered between the two loops' bounding boxes, sized by the
    /// connector loop.
    pub fn fit(
        mesh: &DynamicMesh,
        shell_loop: &BoundaryLoop,
        connector_loop: &BoundaryLoop,
        axis: Unit<Vector3<f64>>,
    ) -> ShellResult<Self> {
        let shell = shell_loop
            .bounds(mesh)
            .ok_or_else(|| ShellError::merge_failed("shell loop is empty"))?;
        let connector = connector_loop
            .bounds(mesh)
            .ok_or_else(|| ShellError::merge_failed("connector loop is empty"))?;
        let center = Point3::from((shell.center().coords + connector.center().coords) * 0.5);
        let radius = 0.5 * connector.width();
        if radius <= 0.0 {
            return Err(ShellError::merge_failed("connector loop has no width"));
        }
        Ok(Self {
            center,
            radius,
            axis,
        })
    }

    fn basis(&self) -> (Vector3<f64>, Vector3<f64>) {
        let helper = if self.axis.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
        let u = self.axis.cross(&helper).normalize();
        let v = self.axis.cross(&u);
        (u, v)
    }

    /// Closest point on the circle.
    pub fn snap(&self, p: &Point3<f64>) -> Point3<f64> {
        let d = p - self.center;
        let radial = d - self.axis.into_inner() * d.dot(&self.axis);
        let dir = radial.try_normalize(1e-12).unwrap_or_else(|| self.basis().0);
        self.center + dir * self.radius
    }

    /// Points spaced about `target` apart along the circle.
    pub fn samples(&self, target: f64) -> Vec<Point3<f64>> {
        let circumference = std::f64::consts::TAU * self.radius;
        let count = ((circumference / target.max(1e-6)).round() as usize).max(3);
        let (u, v) = self.basis();
        (0..count)
            .map(|i| {
                let a = std::f64::consts::TAU * i as f64 / count as f64;
                self.center + (u * a.cos() + v * a.sin()) * self.radius
            })
            .collect()
    }
}

/// What [`merge_loops`] did.
#[derive(Debug, Clone, Default)]
pub struct SeamReport {
    pub samples: usize,
    pub collapsed: usize,
    pub welded: usize,
    /// Surviving seam vertices.
    pub seam: Vec<u32>,
    /// Whether the seam was remeshed against a reference.
    pub constrained: bool,
}

/// Merge `shell_loop` and `connector_loop` into one seam.
///
/// `axis` is the normal of the plane both loops were cut in. Without a
/// `reference` the final seam remesh is skipped and the wall thickness at
/// the seam is not enforced.
pub fn merge_loops(
    mesh: &mut DynamicMesh,
    shell_loop: &BoundaryLoop,
    connector_loop: &BoundaryLoop,
    axis: Unit<Vector3<f64>>,
    reference: Option<&SpatialIndex>,
    params: &StitchParams,
) -> ShellResult<SeamReport> {
    let _timer =
        OperationTimer::with_context("merge_loops", mesh.triangle_count(), mesh.vertex_count());
    if shell_loop.len() < 3 || connector_loop.len() < 3 {
        return Err(ShellError::merge_failed(format!(
            "loops too short to merge ({} and {} vertices)",
            shell_loop.len(),
            connector_loop.len()
        )));
    }

    if !shell_loop.is_valid_in(mesh) || !connector_loop.is_valid_in(mesh) {
        return Err(ShellError::merge_failed("loop is no longer open in the mesh"));
    }

    let circle = SeamCircle::fit(mesh, shell_loop, connector_loop, axis)?;
    for &v in shell_loop.vertices.iter().chain(&connector_loop.vertices) {
        let p = circle.snap(&mesh.position(v));
        mesh.set_position(v, p);
    }

    let samples = PointSetTarget::new(circle.samples(params.target_edge_length));
    let sample_count = samples.points().len();
    let shell_loop = resample(mesh, shell_loop, &samples, params);
    let connector_loop = resample(mesh, connector_loop, &samples, params);

    let mut collapsed = 0usize;
    for boundary in [&shell_loop, &connector_loop] {
        for &v in &boundary.vertices {
            if mesh.is_vertex(v) {
                let p = samples.project(&mesh.position(v), Some(v));
                mesh.set_position(v, p);
            }
        }
        collapsed += collapse_short_edges(mesh, boundary, params.degenerate_length());
    }

    let welded = merge_coincident(mesh, params.degenerate_length());
    let seam: Vec<u32> = shell_loop
        .vertices
        .iter()
        .chain(&connector_loop.vertices)
        .copied()
        .filter(|&v| mesh.is_vertex(v))
        .collect::<HashSet<u32>>()
        .into_iter()
        .collect();
    debug!(
        samples = sample_count,
        collapsed,
        welded,
        seam = seam.len(),
        "Loops welded"
    );
    let open = open_seam_edges(mesh, &seam);
    if welded == 0 || open > 0 {
        return Err(ShellError::merge_failed(format!(
            "seam left open: {welded} vertices welded, {open} boundary edges remain"
        )));
    }

    let constrained = match reference {
        Some(index) => {
            let seam_set: HashSet<u32> = seam.iter().copied().collect();
            let touching = triangles_touching(mesh, &seam_set);
            let region = expand_by_rings(mesh, &touching, params.seam_rings, |_, _| true);
            let target = NoPenetration::new(index);
            let remesh = RemeshParams::with_target_edge_length(params.target_edge_length)
                .passes(params.seam_passes)
                .smoothing(params.seam_smoothing);
            let stats = quick_remesh(mesh, &region, &remesh, Some(&target as &dyn ProjectionTarget))?;
            debug!(region = region.len(), splits = stats.splits, "Seam remeshed");
            true
        }
        None => {
            warn!("No offset reference, seam thickness is not enforced");
            false
        }
    };

    info!(samples = sample_count, welded, constrained, "Seam merged");
    Ok(SeamReport {
        samples: sample_count,
        collapsed,
        welded,
        seam,
        constrained,
    })
}

/// Boundary edges with both ends on the seam.
pub fn open_seam_edges(mesh: &DynamicMesh, seam: &[u32]) -> usize {
    let seam_set: HashSet<u32> = seam.iter().copied().collect();
    seam.iter()
        .flat_map(|&v| mesh.vertex_neighbors(v).into_iter().map(move |n| (v, n)))
        .filter(|&(v, n)| v < n && seam_set.contains(&n) && mesh.is_boundary_edge(v, n))
        .count()
}

/// Remesh one loop toward the circle samples: smoothed passes, then sharp.
fn resample(
    mesh: &mut DynamicMesh,
    boundary: &BoundaryLoop,
    samples: &PointSetTarget,
    params: &StitchParams,
) -> BoundaryLoop {
    let mut remesher = LoopRemesher::new(mesh, boundary, params.target_edge_length)
        .with_loop_target(samples)
        .with_local_smoothing_rings(params.local_smoothing_rings);
    remesher.set_smoothing(params.smoothing);
    remesher.run(params.smooth_passes);
    remesher.set_smoothing(0.0);
    remesher.run(params.sharpen_passes);
    remesher.current_loop()
}

/// Collapse loop edges shorter than `min_length`. Returns the number done.
fn collapse_short_edges(mesh: &mut DynamicMesh, boundary: &BoundaryLoop, min_length: f64) -> usize {
    let mut ring: Vec<u32> = boundary
        .vertices
        .iter()
        .copied()
        .filter(|&v| mesh.is_vertex(v))
        .collect();
    let mut collapsed = 0usize;
    let mut i = 0usize;
    while ring.len() > 3 && i < ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        if (mesh.position(a) - mesh.position(b)).norm() < min_length {
            match mesh.collapse_edge(a, b) {
                Ok(_) => {
                    ring.retain(|&x| x != b && mesh.is_vertex(x));
                    collapsed += 1;
                    continue;
                }
                Err(e) => warn!(?e, a, b, "Degenerate seam edge could not be collapsed"),
            }
        }
        i += 1;
    }
    collapsed
}
