//! Tunable parameters for every generator stage.
//!
//! Defaults are the values the shells were designed with; all lengths are
//! millimetres.

use mesh_kernel::VertexColor;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{ShellError, ShellResult};
use crate::pipeline::Stage;

/// Below this, a setter treats the new value as unchanged.
pub const PARAM_TOLERANCE: f64 = 1e-6;

/// How the inner and outer offset reference surfaces are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMethod {
    /// Move every vertex along its normal, then reduce.
    #[default]
    Normal,
    /// Signed distance grid plus iso-surface extraction.
    Sdf,
}

/// Offset reference surface settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetParams {
    /// Triangle budget for normal-offset surfaces.
    pub reduce_to_triangles: usize,
    /// Grid cells along the longest side of the scan.
    pub sdf_cells: usize,
    /// The scan is reduced to this many triangles before the grid is filled.
    pub sdf_pre_reduce_triangles: usize,
    /// Upper bound on grid size.
    pub sdf_max_cells: usize,
}

impl Default for OffsetParams {
    fn default() -> Self {
        Self {
            reduce_to_triangles: 5000,
            sdf_cells: 128,
            sdf_pre_reduce_triangles: 2500,
            sdf_max_cells: 16_000_000,
        }
    }
}

/// Shell generator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceParams {
    /// Gap between the scan and the inner wall.
    pub inner_offset: f64,
    /// Wall thickness.
    pub thickness: f64,
    /// Extra offset at the trim line, blended out over `flare_band_width`.
    pub flare_offset: f64,
    pub flare_band_width: f64,
    /// Remove the part below the trim curve instead of the part above it.
    pub flip_trim_side: bool,
    /// Height above the shell bottom where the connector is joined.
    pub connector_cut_height: f64,
    /// Normal of the connector cut plane; the side it points to is removed.
    pub cut_plane_normal: Vector3<f64>,
    pub offset_method: OffsetMethod,
    pub offset: OffsetParams,
    /// Colour of a result computed from current inputs.
    pub full_color: VertexColor,
    /// Colour of a result whose inputs changed while it was computed.
    pub preview_color: VertexColor,
    /// Stop after this stage and return its mesh.
    pub stop_after: Option<Stage>,
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            inner_offset: 2.0,
            thickness: 5.0,
            flare_offset: 0.0,
            flare_band_width: 0.0,
            flip_trim_side: false,
            connector_cut_height: 25.0,
            cut_plane_normal: -Vector3::z(),
            offset_method: OffsetMethod::Normal,
            offset: OffsetParams::default(),
            full_color: VertexColor::LIGHT_GREEN,
            preview_color: VertexColor::SELECTION_GOLD,
            stop_after: None,
        }
    }
}

impl DeviceParams {
    /// Offset of the outer reference surface.
    pub fn outer_offset(&self) -> f64 {
        self.inner_offset + self.thickness
    }

    /// Whether the flare band contributes anything.
    pub fn has_flare(&self) -> bool {
        self.flare_offset > 0.0 && self.flare_band_width > 0.0
    }

    pub fn validate(&self) -> ShellResult<()> {
        finite("inner_offset", self.inner_offset)?;
        positive("thickness", self.thickness)?;
        non_negative("flare_offset", self.flare_offset)?;
        non_negative("flare_band_width", self.flare_band_width)?;
        finite("connector_cut_height", self.connector_cut_height)?;
        if self.cut_plane_normal.norm() < PARAM_TOLERANCE {
            return Err(ShellError::invalid_param(
                "cut_plane_normal",
                "normal must not be zero",
            ));
        }
        if self.offset.sdf_cells < 8 {
            return Err(ShellError::invalid_param(
                "offset.sdf_cells",
                format!("need at least 8 cells, got {}", self.offset.sdf_cells),
            ));
        }
        Ok(())
    }
}

/// Dimensions of the flat-base connector cup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatBaseParams {
    pub diameter: f64,
    pub wall_thickness: f64,
    pub base_thickness: f64,
    /// Depth of the cavity above the base.
    pub inner_vertical_space: f64,
    pub target_edge_length: f64,
    pub slices: usize,
    pub remesh_passes: usize,
    /// Build the inner cavity wall.
    pub has_inner: bool,
}

impl Default for FlatBaseParams {
    fn default() -> Self {
        Self {
            diameter: 75.0,
            wall_thickness: 5.0,
            base_thickness: 5.0,
            inner_vertical_space: 5.0,
            target_edge_length: 2.0,
            slices: 60,
            remesh_passes: 10,
            has_inner: true,
        }
    }
}

impl FlatBaseParams {
    /// Height at which the cup is cut open.
    pub fn height(&self) -> f64 {
        self.inner_vertical_space + self.base_thickness
    }

    pub fn inner_diameter(&self) -> f64 {
        self.diameter - 2.0 * self.wall_thickness
    }

    pub fn validate(&self) -> ShellResult<()> {
        positive("diameter", self.diameter)?;
        positive("wall_thickness", self.wall_thickness)?;
        positive("base_thickness", self.base_thickness)?;
        positive("inner_vertical_space", self.inner_vertical_space)?;
        positive("target_edge_length", self.target_edge_length)?;
        if self.has_inner && self.inner_diameter() <= 0.0 {
            return Err(ShellError::invalid_param(
                "wall_thickness",
                format!(
                    "wall {:.2}mm leaves no cavity in a {:.2}mm cup",
                    self.wall_thickness, self.diameter
                ),
            ));
        }
        if self.slices < 3 {
            return Err(ShellError::invalid_param("slices", "need at least 3 slices"));
        }
        Ok(())
    }
}

/// Settings for joining a shell loop to a connector loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchParams {
    pub target_edge_length: f64,
    /// Loop passes with smoothing.
    pub smooth_passes: usize,
    pub smoothing: f64,
    /// Loop passes without smoothing.
    pub sharpen_passes: usize,
    pub local_smoothing_rings: usize,
    /// Loop edges shorter than this fraction of the target are collapsed.
    pub degenerate_ratio: f64,
    /// Rings around the seam remeshed after the merge.
    pub seam_rings: usize,
    pub seam_passes: usize,
    pub seam_smoothing: f64,
}

impl Default for StitchParams {
    fn default() -> Self {
        Self {
            target_edge_length: 3.0,
            smooth_passes: 5,
            smoothing: 0.5,
            sharpen_passes: 2,
            local_smoothing_rings: 3,
            degenerate_ratio: 0.001,
            seam_rings: 5,
            seam_passes: 5,
            seam_smoothing: 0.5,
        }
    }
}

impl StitchParams {
    pub fn degenerate_length(&self) -> f64 {
        self.target_edge_length * self.degenerate_ratio
    }
}

/// Settings for the flattened base band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenParams {
    /// Height of the band above the lowest point that may be flattened.
    pub band_height: f64,
    /// Minimum alignment of a triangle normal with straight down.
    pub dot_threshold: f64,
    pub blend_rings: usize,
    pub target_edge_length: f64,
    pub smoothing: f64,
    pub projected_passes: usize,
    pub relaxed_passes: usize,
}

impl Default for FlattenParams {
    fn default() -> Self {
        Self {
            band_height: 15.0,
            dot_threshold: 0.2,
            blend_rings: 3,
            target_edge_length: 2.0,
            smoothing: 1.0,
            projected_passes: 10,
            relaxed_passes: 10,
        }
    }
}

fn finite(name: &str, value: f64) -> ShellResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ShellError::invalid_param(name, format!("{value} is not finite")))
    }
}

fn positive(name: &str, value: f64) -> ShellResult<()> {
    finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ShellError::invalid_param(name, format!("must be positive, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> ShellResult<()> {
    finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ShellError::invalid_param(name, format!("must not be negative, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let params = DeviceParams::default();
        assert_relative_eq!(params.outer_offset(), 7.0);
        assert!(!params.has_flare());
        assert!(params.validate().is_ok());

        let cup = FlatBaseParams::default();
        assert_relative_eq!(cup.height(), 10.0);
        assert_relative_eq!(cup.inner_diameter(), 65.0);
        assert!(cup.validate().is_ok());

        assert_relative_eq!(StitchParams::default().degenerate_length(), 0.003);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let params = DeviceParams {
            thickness: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = DeviceParams {
            cut_plane_normal: Vector3::zeros(),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let cup = FlatBaseParams {
            wall_thickness: 40.0,
            ..Default::default()
        };
        assert!(cup.validate().is_err());

        let cup = FlatBaseParams {
            wall_thickness: 40.0,
            has_inner: false,
            ..Default::default()
        };
        assert!(cup.validate().is_ok());
    }
}
