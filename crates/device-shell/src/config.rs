//! Generator configuration files.
//!
//! A [`PipelineConfig`] holds everything needed to set up a
//! [`DeviceGenerator`](crate::DeviceGenerator) apart from its inputs: the
//! stage parameters, the finish step, the input transform and the connector.
//!
//! # Example TOML
//!
//! ```toml
//! [device]
//! inner_offset = 2.0
//! thickness = 5.0
//! connector_cut_height = 25.0
//!
//! [finish]
//! kind = "connector_merge"
//! target_edge_length = 3.0
//!
//! [connector.flat_base]
//! diameter = 75.0
//! base_thickness = 5.0
//!
//! [[connector.holes]]
//! radius = 2.5
//! xy_offset = [10.0, 0.0]
//! near_filter = "connector_outer"
//! far_filter = "connector_inner"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::connector::{Connector, FlatBaseConnector, HoleSpec};
use crate::error::{ShellError, ShellResult};
use crate::finish::Finish;
use crate::params::{DeviceParams, FlatBaseParams, StitchParams};
use crate::pipeline::DeviceGenerator;

/// Rigid transform applied to the scan, as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub translation: Vector3<f64>,
    /// Roll, pitch and yaw in degrees.
    pub rotation_deg: Vector3<f64>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation_deg: Vector3::zeros(),
        }
    }
}

impl TransformConfig {
    pub fn to_isometry(&self) -> Isometry3<f64> {
        let r = self.rotation_deg.map(f64::to_radians);
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_euler_angles(r.x, r.y, r.z),
        )
    }
}

/// A flat-base connector and its holes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub flat_base: FlatBaseParams,
    pub holes: Vec<HoleSpec>,
}

impl ConnectorConfig {
    pub fn build(&self) -> Arc<dyn Connector> {
        Arc::new(FlatBaseConnector::new(self.flat_base.clone(), self.holes.clone()))
    }
}

/// Serializable generator setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Optional name for this setup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub device: DeviceParams,
    pub transform: TransformConfig,
    pub finish: Finish,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<ConnectorConfig>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A socket: connector merge with a flat base and four base holes.
    pub fn preset_socket() -> Self {
        let holes = [(12.0, 0.0), (-12.0, 0.0), (0.0, 12.0), (0.0, -12.0)]
            .into_iter()
            .map(|(x, y)| HoleSpec::vertical_through(2.5, x, y))
            .collect();
        Self {
            name: Some("socket".to_string()),
            finish: Finish::ConnectorMerge(StitchParams::default()),
            connector: Some(ConnectorConfig {
                flat_base: FlatBaseParams::default(),
                holes,
            }),
            ..Default::default()
        }
    }

    /// An ankle-foot orthosis with a flattened sole.
    pub fn preset_afo() -> Self {
        Self {
            name: Some("afo".to_string()),
            finish: Finish::FlattenBand(Default::default()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ShellResult<()> {
        self.device.validate()?;
        if let Some(connector) = &self.connector {
            connector.flat_base.validate()?;
            if let Some(hole) = connector.holes.iter().find(|h| h.radius <= 0.0) {
                return Err(ShellError::invalid_param(
                    "connector.holes.radius",
                    format!("must be positive, got {}", hole.radius),
                ));
            }
        }
        Ok(())
    }

    pub fn build_connector(&self) -> Option<Arc<dyn Connector>> {
        self.connector.as_ref().map(ConnectorConfig::build)
    }

    /// Configure `generator`; its sources are left alone.
    pub fn apply_to(&self, generator: &mut DeviceGenerator) -> ShellResult<()> {
        self.validate()?;
        generator.set_params(self.device.clone())?;
        generator.set_finish(self.finish.clone());
        generator.set_transform(self.transform.to_isometry());
        generator.set_connector(self.build_connector());
        info!(
            name = self.name.as_deref().unwrap_or("unnamed"),
            finish = self.finish.name(),
            connector = self.connector.is_some(),
            "Configuration applied"
        );
        Ok(())
    }

    pub fn from_toml(toml_str: &str) -> ShellResult<Self> {
        toml::from_str(toml_str).map_err(|e| ShellError::invalid_config(None, e.to_string()))
    }

    pub fn to_toml(&self) -> ShellResult<String> {
        toml::to_string_pretty(self).map_err(|e| ShellError::invalid_config(None, e.to_string()))
    }

    pub fn from_json(json_str: &str) -> ShellResult<Self> {
        serde_json::from_str(json_str).map_err(|e| ShellError::invalid_config(None, e.to_string()))
    }

    pub fn to_json(&self) -> ShellResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ShellError::invalid_config(None, e.to_string()))
    }

    /// Load a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> ShellResult<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ShellError::invalid_config(Some(path.to_path_buf()), e.to_string()))?;
        let parsed = match format {
            ConfigFormat::Toml => Self::from_toml(&contents),
            ConfigFormat::Json => Self::from_json(&contents),
        };
        parsed.map_err(|e| with_path(e, path))
    }

    /// Save as `.toml` or `.json`, chosen by extension.
    pub fn save(&self, path: impl AsRef<Path>) -> ShellResult<()> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => self.to_toml()?,
            ConfigFormat::Json => self.to_json()?,
        };
        std::fs::write(path, contents)
            .map_err(|e| ShellError::invalid_config(Some(path.to_path_buf()), e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> ShellResult<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => Err(ShellError::invalid_config(
                Some(path.to_path_buf()),
                "expected a .toml or .json file",
            )),
        }
    }
}

fn with_path(error: ShellError, path: &Path) -> ShellError {
    match error {
        ShellError::InvalidConfig { path: None, details } => {
            ShellError::invalid_config(Some(PathBuf::from(path)), details)
        }
        other => other,
    }
}
