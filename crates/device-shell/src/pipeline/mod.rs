//! The staged generator.
//!
//! [`DeviceGenerator::update`] runs offset, trim, inner wall, outer wall and
//! the finish step in order. Trim and both walls are cached in a
//! [`StageCache`]; the offset surfaces have their own cache because they
//! are only rebuilt when the offset outgrows what was computed.
//!
//! Inputs are pulled from a [`MeshSource`] and a [`CurveSource`] and compared
//! by version. Parameter setters and [`InvalidationHandle::invalidate`]
//! bump a local counter. A run records all versions when it starts; if any
//! of them moved by the time it ends the result is a [`Status::Preview`].
//! Runs are never aborted.

mod cache;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use mesh_kernel::primitives::uv_sphere;
use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{DynamicMesh, Mesh, SpatialIndex, VertexColor};
use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::connector::{Connector, ConnectorSlot};
use crate::error::{ShellError, ShellErrorCode, ShellResult};
use crate::finish::{Finish, FinishContext};
use crate::offset::{OffsetCache, OffsetMeshes};
use crate::params::{DeviceParams, OffsetMethod, PARAM_TOLERANCE};
use crate::shell::{extrude_wall, inner_wall, trim_shell};
use crate::source::{Curve, CurveSource, MeshSource};

pub use cache::{CacheEntry, CacheLookup, CacheStats, StageCache, StageParams, StageToken};

/// Radius of the placeholder returned when trimming fails.
const PLACEHOLDER_RADIUS: f64 = 50.0;

/// Generator stages in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Offset,
    Trim,
    InnerWall,
    OuterWall,
    Finish,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Offset,
        Stage::Trim,
        Stage::InnerWall,
        Stage::OuterWall,
        Stage::Finish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Offset => "offset",
            Stage::Trim => "trim",
            Stage::InnerWall => "inner_wall",
            Stage::OuterWall => "outer_wall",
            Stage::Finish => "finish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ShellError::invalid_param("stage", format!("unknown stage '{s}'")))
    }
}

/// Quality of a [`PipelineResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Computed from inputs that did not change during the run.
    Full,
    /// Inputs changed while the run was in progress.
    Preview,
    /// A stage failed; the mesh is a fallback.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Full => "full",
            Status::Preview => "preview",
            Status::Error => "error",
        })
    }
}

/// The stage that failed and why.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: Stage,
    pub code: ShellErrorCode,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, error: &ShellError) -> Self {
        Self {
            stage,
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// Output of one run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub mesh: Arc<Mesh>,
    pub status: Status,
    /// Last stage whose output is in `mesh`.
    pub stage: Stage,
    pub failure: Option<StageFailure>,
}

impl PipelineResult {
    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

/// Versions of everything a run reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp {
    pub mesh: u64,
    pub curve: u64,
    pub connector: u64,
    pub local: u64,
}

#[derive(Debug, Default)]
struct Signals {
    invalidation: AtomicU64,
    pending_discard: AtomicBool,
}

/// Lets other threads mark the generator out of date.
#[derive(Debug, Clone)]
pub struct InvalidationHandle {
    signals: Arc<Signals>,
}

impl InvalidationHandle {
    /// Force the next [`DeviceGenerator::update`] to run.
    pub fn invalidate(&self) {
        self.signals.invalidation.fetch_add(1, Ordering::AcqRel);
    }

    /// Like [`invalidate`](Self::invalidate), and drop every cached stage
    /// and offset surface first.
    pub fn discard_caches(&self) {
        self.signals.pending_discard.store(true, Ordering::Release);
        self.invalidate();
    }

    pub fn version(&self) -> u64 {
        self.signals.invalidation.load(Ordering::Acquire)
    }
}

/// Private copy of the input mesh for one input version, plus the same mesh
/// moved by the current transform.
struct InputSnapshot {
    version: u64,
    mesh: Arc<Mesh>,
    index: SpatialIndex,
    transform: Isometry3<f64>,
    transformed: Arc<Mesh>,
}

impl InputSnapshot {
    fn new(version: u64, mesh: Arc<Mesh>, transform: &Isometry3<f64>) -> Self {
        let index = SpatialIndex::from_mesh(&mesh);
        let transformed = Arc::new(moved(&mesh, transform));
        Self {
            version,
            mesh,
            index,
            transform: *transform,
            transformed,
        }
    }

    /// Recompute the moved copy only when `transform` differs from the one
    /// it was built with.
    fn set_transform(&mut self, transform: &Isometry3<f64>) {
        if self.transform != *transform {
            debug!(version = self.version, "Moving input to new transform");
            self.transformed = Arc::new(moved(&self.mesh, transform));
            self.transform = *transform;
        }
    }
}

fn moved(mesh: &Mesh, transform: &Isometry3<f64>) -> Mesh {
    let mut out = mesh.clone();
    out.transform(transform);
    out
}

/// Generates a device shell from a scan, a trim curve and a connector.
pub struct DeviceGenerator {
    params: DeviceParams,
    finish: Finish,
    transform: Isometry3<f64>,
    mesh_source: Option<Arc<dyn MeshSource>>,
    curve_source: Option<Arc<dyn CurveSource>>,
    connector: ConnectorSlot,
    signals: Arc<Signals>,
    cache: StageCache,
    offsets: OffsetCache,
    input: Option<InputSnapshot>,
    last_stamp: Option<RunStamp>,
    result: Option<PipelineResult>,
}

impl Default for DeviceGenerator {
    fn default() -> Self {
        Self::new(DeviceParams::default())
    }
}

impl fmt::Debug for DeviceGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceGenerator")
            .field("params", &self.params)
            .field("finish", &self.finish)
            .field("connector", &self.connector)
            .field("cached_stages", &self.cache.len())
            .field("last_stamp", &self.last_stamp)
            .field("status", &self.result.as_ref().map(|r| r.status))
            .finish()
    }
}

impl DeviceGenerator {
    pub fn new(params: DeviceParams) -> Self {
        Self {
            params,
            finish: Finish::None,
            transform: Isometry3::identity(),
            mesh_source: None,
            curve_source: None,
            connector: ConnectorSlot::new(),
            signals: Arc::new(Signals::default()),
            cache: StageCache::new(),
            offsets: OffsetCache::new(),
            input: None,
            last_stamp: None,
            result: None,
        }
    }

    // Inputs

    /// Versions are only comparable within one source, so binding a new
    /// one drops everything derived from the old one.
    pub fn set_mesh_source(&mut self, source: Arc<dyn MeshSource>) {
        self.mesh_source = Some(source);
        self.input = None;
        self.cache.clear();
        self.offsets.clear();
        self.invalidate();
    }

    pub fn set_curve_source(&mut self, source: Arc<dyn CurveSource>) {
        self.curve_source = Some(source);
        self.cache.invalidate_from(Stage::Trim);
        self.invalidate();
    }

    /// Replace the active connector. A run in progress keeps the one it
    /// started its finish step with.
    pub fn set_connector(&self, connector: Option<Arc<dyn Connector>>) {
        self.connector.set(connector);
    }

    /// Shared handle to the connector slot, for replacing it from elsewhere.
    pub fn connector_slot(&self) -> ConnectorSlot {
        self.connector.clone()
    }

    pub fn invalidation_handle(&self) -> InvalidationHandle {
        InvalidationHandle {
            signals: self.signals.clone(),
        }
    }

    // Parameters

    pub fn params(&self) -> &DeviceParams {
        &self.params
    }

    pub fn finish(&self) -> &Finish {
        &self.finish
    }

    pub fn transform(&self) -> &Isometry3<f64> {
        &self.transform
    }

    /// Replace every parameter at once.
    pub fn set_params(&mut self, params: DeviceParams) -> ShellResult<()> {
        params.validate()?;
        if params != self.params {
            self.params = params;
            self.invalidate();
        }
        Ok(())
    }

    pub fn set_inner_offset(&mut self, value: f64) {
        if changed(self.params.inner_offset, value) {
            self.params.inner_offset = value;
            self.invalidate();
        }
    }

    pub fn set_thickness(&mut self, value: f64) {
        if changed(self.params.thickness, value) {
            self.params.thickness = value;
            self.invalidate();
        }
    }

    pub fn set_flare(&mut self, offset: f64, band_width: f64) {
        if changed(self.params.flare_offset, offset)
            || changed(self.params.flare_band_width, band_width)
        {
            self.params.flare_offset = offset;
            self.params.flare_band_width = band_width;
            self.invalidate();
        }
    }

    pub fn set_flip_trim_side(&mut self, flip: bool) {
        if self.params.flip_trim_side != flip {
            self.params.flip_trim_side = flip;
            self.invalidate();
        }
    }

    pub fn set_connector_cut_height(&mut self, value: f64) {
        if changed(self.params.connector_cut_height, value) {
            self.params.connector_cut_height = value;
            self.invalidate();
        }
    }

    pub fn set_offset_method(&mut self, method: OffsetMethod) {
        if self.params.offset_method != method {
            self.params.offset_method = method;
            self.invalidate();
        }
    }

    pub fn set_stop_after(&mut self, stage: Option<Stage>) {
        if self.params.stop_after != stage {
            self.params.stop_after = stage;
            self.invalidate();
        }
    }

    pub fn set_finish(&mut self, finish: Finish) {
        if self.finish != finish {
            self.finish = finish;
            self.invalidate();
        }
    }

    /// Offsets are built in transformed space, so a new transform also
    /// discards them.
    pub fn set_transform(&mut self, transform: Isometry3<f64>) {
        let moved = (transform.translation.vector - self.transform.translation.vector).norm()
            > PARAM_TOLERANCE
            || transform.rotation.angle_to(&self.transform.rotation) > PARAM_TOLERANCE;
        if moved {
            self.transform = transform;
            self.signals.pending_discard.store(true, Ordering::Release);
            self.invalidate();
        }
    }

    fn invalidate(&self) {
        self.signals.invalidation.fetch_add(1, Ordering::AcqRel);
    }

    // Results

    /// Copy of the latest result.
    pub fn result(&self) -> Option<PipelineResult> {
        self.result.clone()
    }

    /// Move the latest result out; the next update computes a new one.
    pub fn take_result(&mut self) -> Option<PipelineResult> {
        self.result.take()
    }

    /// Offset surfaces of the last run, if they could be built.
    pub fn offsets(&self) -> Option<OffsetMeshes> {
        self.offsets.current()
    }

    pub fn cache(&self) -> &StageCache {
        &self.cache
    }

    /// Whether `update` would compute anything.
    pub fn needs_update(&self) -> bool {
        match (&self.mesh_source, &self.curve_source) {
            (Some(mesh), Some(curve)) => {
                self.result.is_none()
                    || self.last_stamp != Some(self.stamp(mesh.as_ref(), curve.as_ref()))
            }
            _ => true,
        }
    }

    fn stamp(&self, mesh: &dyn MeshSource, curve: &dyn CurveSource) -> RunStamp {
        RunStamp {
            mesh: mesh.version(),
            curve: curve.version(),
            connector: self.connector.version(),
            local: self.signals.invalidation.load(Ordering::Acquire),
        }
    }

    /// Bring the result up to date.
    ///
    /// Only a missing source is an error; stage failures end up in the
    /// result as [`Status::Error`] with a fallback mesh.
    pub fn update(&mut self) -> ShellResult<()> {
        let mesh_source = self
            .mesh_source
            .clone()
            .ok_or_else(|| ShellError::missing_source("mesh"))?;
        let curve_source = self
            .curve_source
            .clone()
            .ok_or_else(|| ShellError::missing_source("curve"))?;

        if self.signals.pending_discard.swap(false, Ordering::AcqRel) {
            debug!("Discarding cached stages and offsets");
            self.cache.clear();
            self.offsets.clear();
        }

        let stamp = self.stamp(mesh_source.as_ref(), curve_source.as_ref());
        if self.result.is_some() && self.last_stamp == Some(stamp) {
            debug!("Generator up to date");
            return Ok(());
        }

        let _timer = OperationTimer::new("device_update");
        let mesh = mesh_source.mesh();
        let curve = curve_source.curve();
        if self.input.as_ref().map(|s| s.version) != Some(stamp.mesh) {
            self.input = Some(InputSnapshot::new(stamp.mesh, mesh, &self.transform));
        } else if let Some(snapshot) = self.input.as_mut() {
            snapshot.set_transform(&self.transform);
        }

        let is_stale = |generator: &Self| {
            generator.stamp(mesh_source.as_ref(), curve_source.as_ref()) != stamp
        };
        let result = self.run(&curve, stamp, &is_stale);

        info!(
            status = %result.status,
            stage = %result.stage,
            faces = result.mesh.face_count(),
            failed = ?result.failure.as_ref().map(|f| f.stage),
            "Device generated"
        );
        self.last_stamp = Some(stamp);
        self.result = Some(result);
        Ok(())
    }

    fn run(
        &mut self,
        curve: &Curve,
        stamp: RunStamp,
        is_stale: &dyn Fn(&Self) -> bool,
    ) -> PipelineResult {
        let params = self.params.clone();
        let Some(input) = self.input.as_ref() else {
            return error_result(placeholder(None), Stage::Trim, &ShellError::EmptyMesh);
        };

        // Offset references; failure only costs the seam thickness guarantee.
        let transformed = input.transformed.clone();
        let offsets = match self.offsets.update(&transformed, stamp.mesh, &params) {
            Ok(offsets) => Some(offsets),
            Err(e) => {
                warn!(error = %e, "Offset surfaces unavailable");
                self.offsets.clear();
                None
            }
        };
        if params.stop_after == Some(Stage::Offset) {
            return match &offsets {
                Some(o) => self.finished(o.outer.mesh.clone(), Stage::Offset, is_stale),
                None => error_result(
                    placeholder(transformed.aabb().map(|b| b.center())),
                    Stage::Offset,
                    &ShellError::stage_failed(Stage::Offset, "offset surfaces could not be built"),
                ),
            };
        }

        let trim_token = StageToken {
            inputs: [stamp.mesh, stamp.curve],
            upstream: 0,
            params: StageParams::Trim {
                flip: params.flip_trim_side,
                transform: self.transform,
            },
        };
        let transform = self.transform;
        let trimmed = match self.cache.get_or_compute(Stage::Trim, trim_token, || {
            trim_shell(&input.mesh, &input.index, curve, params.flip_trim_side, &transform)
        }) {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(error = %e, "Trim failed");
                let center = transformed.aabb().map(|b| b.center());
                return error_result(placeholder(center), Stage::Trim, &e);
            }
        };
        if params.stop_after == Some(Stage::Trim) {
            return self.finished((*trimmed.mesh).clone(), Stage::Trim, is_stale);
        }

        let inner_token = StageToken {
            inputs: [0, 0],
            upstream: trimmed.generation,
            params: StageParams::InnerWall {
                inner_offset: params.inner_offset,
                flare_offset: params.flare_offset,
                flare_band_width: params.flare_band_width,
            },
        };
        let inner = match self
            .cache
            .get_or_compute(Stage::InnerWall, inner_token, || inner_wall(&trimmed.mesh, &params))
        {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(error = %e, "Inner wall failed");
                return error_result((*trimmed.mesh).clone(), Stage::InnerWall, &e);
            }
        };
        if params.stop_after == Some(Stage::InnerWall) {
            return self.finished((*inner.mesh).clone(), Stage::InnerWall, is_stale);
        }

        let outer_token = StageToken {
            inputs: [0, 0],
            upstream: inner.generation,
            params: StageParams::OuterWall {
                thickness: params.thickness,
            },
        };
        let outer = match self.cache.get_or_compute(Stage::OuterWall, outer_token, || {
            extrude_wall(&inner.mesh, params.thickness)
        }) {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(error = %e, "Outer wall failed");
                return error_result((*inner.mesh).clone(), Stage::OuterWall, &e);
            }
        };
        if params.stop_after == Some(Stage::OuterWall) {
            return self.finished((*outer.mesh).clone(), Stage::OuterWall, is_stale);
        }

        let preview = is_stale(self);
        let connector = self.connector.snapshot();
        let ctx = FinishContext {
            params: &params,
            offsets: offsets.as_ref(),
            connector,
            preview,
        };
        let mut working = DynamicMesh::from_mesh(&outer.mesh);
        match self.finish.apply(&mut working, &ctx) {
            Ok(()) => {
                debug!(finish = self.finish.name(), preview, "Finish applied");
                self.finished(working.to_mesh(), Stage::Finish, is_stale)
            }
            Err(e) => {
                warn!(finish = self.finish.name(), error = %e, "Finish failed");
                error_result((*outer.mesh).clone(), Stage::Finish, &e)
            }
        }
    }

    /// Tag a successful run and paint it.
    fn finished(
        &self,
        mut mesh: Mesh,
        stage: Stage,
        is_stale: &dyn Fn(&Self) -> bool,
    ) -> PipelineResult {
        let (status, color) = if is_stale(self) {
            (Status::Preview, self.params.preview_color)
        } else {
            (Status::Full, self.params.full_color)
        };
        mesh.set_color(color);
        PipelineResult {
            mesh: Arc::new(mesh),
            status,
            stage,
            failure: None,
        }
    }
}

fn changed(old: f64, new: f64) -> bool {
    (old - new).abs() > PARAM_TOLERANCE
}

fn placeholder(center: Option<Point3<f64>>) -> Mesh {
    uv_sphere(center.unwrap_or_else(Point3::origin), PLACEHOLDER_RADIUS, 24, 12)
}

fn error_result(mut mesh: Mesh, stage: Stage, error: &ShellError) -> PipelineResult {
    mesh.set_color(VertexColor::VIDEO_RED);
    PipelineResult {
        mesh: Arc::new(mesh),
        status: Status::Error,
        stage,
        failure: Some(StageFailure::new(stage, error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_names() {
        assert!(Stage::Offset < Stage::Trim);
        assert!(Stage::OuterWall < Stage::Finish);
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!(Stage::InnerWall.to_string(), "inner_wall");
        assert!("rim".parse::<Stage>().is_err());
    }

    #[test]
    fn test_setters_ignore_tiny_changes() {
        let mut generator = DeviceGenerator::default();
        let handle = generator.invalidation_handle();
        let v0 = handle.version();
        generator.set_thickness(5.0 + 1e-9);
        assert_eq!(handle.version(), v0);
        generator.set_thickness(6.0);
        assert_eq!(handle.version(), v0 + 1);
        assert_eq!(generator.params().thickness, 6.0);
    }

    #[test]
    fn test_update_without_sources() {
        let mut generator = DeviceGenerator::default();
        let err = generator.update().unwrap_err();
        assert!(matches!(err, ShellError::MissingSource { input: "mesh" }));
        assert!(generator.result().is_none());
        assert!(generator.needs_update());
    }

    #[test]
    fn test_input_snapshot_reuses_moved_mesh() {
        let mesh = Arc::new(mesh_kernel::primitives::capped_cylinder(10.0, 20.0, 16, 4.0, false));
        let lift = Isometry3::translation(0.0, 0.0, 50.0);
        let mut snapshot = InputSnapshot::new(3, mesh.clone(), &lift);
        let first = snapshot.transformed.clone();
        assert_eq!(first.aabb().unwrap().min.z, 50.0);

        snapshot.set_transform(&lift);
        assert!(Arc::ptr_eq(&first, &snapshot.transformed));

        snapshot.set_transform(&Isometry3::identity());
        assert!(!Arc::ptr_eq(&first, &snapshot.transformed));
        assert_eq!(snapshot.transformed.aabb().unwrap().min.z, 0.0);
        // the untransformed copy backs the trim and never moves
        assert_eq!(snapshot.mesh.aabb().unwrap().min.z, 0.0);
    }

    #[test]
    fn test_error_result_is_red() {
        let result = error_result(
            placeholder(None),
            Stage::Trim,
            &ShellError::stage_failed(Stage::Trim, "no curve"),
        );
        assert_eq!(result.status, Status::Error);
        let failure = result.failure.unwrap();
        assert_eq!(failure.code, ShellErrorCode::StageFailed);
        assert!(
            result
                .mesh
                .vertices
                .iter()
                .all(|v| v.color == Some(VertexColor::VIDEO_RED))
        );
    }
}
