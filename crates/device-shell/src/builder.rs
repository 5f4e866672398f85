//! Fluent builder for a [`DeviceGenerator`].
//!
//! # Example
//!
//! ```no_run
//! use device_shell::{Curve, GeneratorBuilder};
//! use std::path::Path;
//! use mesh_kernel::load_mesh;
//! use nalgebra::Point3;
//!
//! let scan = load_mesh(Path::new("limb.stl")).unwrap();
//! let curve = Curve::horizontal_circle(Point3::new(0.0, 0.0, 120.0), 60.0, 64);
//!
//! let result = GeneratorBuilder::new()
//!     .mesh(scan)
//!     .curve(curve)
//!     .inner_offset(2.0)
//!     .thickness(4.0)
//!     .socket()
//!     .run()
//!     .unwrap();
//!
//! mesh_kernel::save_mesh(&result.mesh, Path::new("socket.stl")).unwrap();
//! ```

use std::sync::Arc;

use mesh_kernel::Mesh;
use nalgebra::Isometry3;

use crate::connector::{Connector, FlatBaseConnector, HoleSpec};
use crate::error::{ShellError, ShellResult};
use crate::finish::Finish;
use crate::params::{DeviceParams, FlatBaseParams, FlattenParams, OffsetMethod, StitchParams};
use crate::pipeline::{DeviceGenerator, PipelineResult, Stage};
use crate::source::{Curve, CurveSource, MeshSource, SharedCurve, SharedMesh};

/// Chainable setup for a [`DeviceGenerator`].
pub struct GeneratorBuilder {
    params: DeviceParams,
    finish: Finish,
    transform: Isometry3<f64>,
    mesh: Option<Arc<dyn MeshSource>>,
    curve: Option<Arc<dyn CurveSource>>,
    connector: Option<Arc<dyn Connector>>,
}

impl Default for GeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneratorBuilder {
    pub fn new() -> Self {
        Self {
            params: DeviceParams::default(),
            finish: Finish::None,
            transform: Isometry3::identity(),
            mesh: None,
            curve: None,
            connector: None,
        }
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Use a fixed scan.
    pub fn mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(Arc::new(SharedMesh::new(mesh)));
        self
    }

    pub fn mesh_source(mut self, source: Arc<dyn MeshSource>) -> Self {
        self.mesh = Some(source);
        self
    }

    /// Use a fixed trim curve.
    pub fn curve(mut self, curve: Curve) -> Self {
        self.curve = Some(Arc::new(SharedCurve::new(curve)));
        self
    }

    pub fn curve_source(mut self, source: Arc<dyn CurveSource>) -> Self {
        self.curve = Some(source);
        self
    }

    /// Rigid transform applied to the scan before the shell is built.
    pub fn transform(mut self, transform: Isometry3<f64>) -> Self {
        self.transform = transform;
        self
    }

    // =========================================================================
    // Shell
    // =========================================================================

    /// Replace all shell parameters.
    pub fn params(mut self, params: DeviceParams) -> Self {
        self.params = params;
        self
    }

    /// Gap between the scan and the inner wall in mm.
    pub fn inner_offset(mut self, offset: f64) -> Self {
        self.params.inner_offset = offset;
        self
    }

    /// Wall thickness in mm.
    pub fn thickness(mut self, thickness: f64) -> Self {
        self.params.thickness = thickness;
        self
    }

    /// Extra offset at the trim line, fading out over `band_width` mm.
    pub fn flare(mut self, offset: f64, band_width: f64) -> Self {
        self.params.flare_offset = offset;
        self.params.flare_band_width = band_width;
        self
    }

    pub fn flip_trim_side(mut self, flip: bool) -> Self {
        self.params.flip_trim_side = flip;
        self
    }

    /// Build the offset references from a distance grid instead of normals.
    pub fn sdf_offsets(mut self) -> Self {
        self.params.offset_method = OffsetMethod::Sdf;
        self
    }

    /// Return the mesh of `stage` instead of the finished device.
    pub fn stop_after(mut self, stage: Stage) -> Self {
        self.params.stop_after = Some(stage);
        self
    }

    // =========================================================================
    // Finish
    // =========================================================================

    pub fn finish(mut self, finish: Finish) -> Self {
        self.finish = finish;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Connector cut height above the lowest point of the shell, in mm.
    pub fn connector_cut_height(mut self, height: f64) -> Self {
        self.params.connector_cut_height = height;
        self
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Socket: merge a default flat-base connector without holes, unless a
    /// connector was already set.
    pub fn socket(mut self) -> Self {
        self.finish = Finish::ConnectorMerge(StitchParams::default());
        if self.connector.is_none() {
            self.connector = Some(Arc::new(FlatBaseConnector::new(
                FlatBaseParams::default(),
                Vec::<HoleSpec>::new(),
            )));
        }
        self
    }

    /// Ankle-foot orthosis: flatten the sole.
    pub fn afo(mut self) -> Self {
        self.finish = Finish::FlattenBand(FlattenParams::default());
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Create the generator. Sources may still be unset.
    pub fn build(self) -> ShellResult<DeviceGenerator> {
        self.params.validate()?;
        let mut generator = DeviceGenerator::new(self.params);
        generator.set_finish(self.finish);
        generator.set_transform(self.transform);
        generator.set_connector(self.connector);
        if let Some(mesh) = self.mesh {
            generator.set_mesh_source(mesh);
        }
        if let Some(curve) = self.curve {
            generator.set_curve_source(curve);
        }
        Ok(generator)
    }

    /// Build and run once.
    ///
    /// # Errors
    ///
    /// Fails on invalid parameters or a missing source. Stage failures are
    /// reported in the result's status instead.
    pub fn run(self) -> ShellResult<PipelineResult> {
        let mut generator = self.build()?;
        generator.update()?;
        generator
            .take_result()
            .ok_or_else(|| ShellError::missing_source("mesh"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builder_defaults() {
        let generator = GeneratorBuilder::new().build().unwrap();
        assert_relative_eq!(generator.params().inner_offset, 2.0);
        assert_relative_eq!(generator.params().thickness, 5.0);
        assert!(generator.finish().is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let generator = GeneratorBuilder::new()
            .inner_offset(3.0)
            .thickness(4.0)
            .flare(2.0, 20.0)
            .sdf_offsets()
            .stop_after(Stage::InnerWall)
            .build()
            .unwrap();
        let p = generator.params();
        assert_relative_eq!(p.inner_offset, 3.0);
        assert_relative_eq!(p.thickness, 4.0);
        assert!(p.has_flare());
        assert_eq!(p.offset_method, OffsetMethod::Sdf);
        assert_eq!(p.stop_after, Some(Stage::InnerWall));
    }

    #[test]
    fn test_presets() {
        let socket = GeneratorBuilder::new().socket().build().unwrap();
        assert!(matches!(socket.finish(), Finish::ConnectorMerge(_)));
        assert!(socket.connector_slot().snapshot().is_some());

        let afo = GeneratorBuilder::new().afo().build().unwrap();
        assert!(matches!(afo.finish(), Finish::FlattenBand(_)));
        assert!(afo.connector_slot().snapshot().is_none());
    }

    #[test]
    fn test_invalid_thickness_rejected() {
        assert!(GeneratorBuilder::new().thickness(0.0).build().is_err());
    }

    #[test]
    fn test_run_without_curve() {
        let err = GeneratorBuilder::new()
            .mesh(Mesh::new())
            .run()
            .unwrap_err();
        assert!(matches!(err, ShellError::MissingSource { input: "curve" }));
    }
}
