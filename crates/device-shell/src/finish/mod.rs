//! Final step applied to the extruded shell.
//!
//! The step works on a copy of the shell; if it fails the generator keeps
//! the shell as it was before the step.

mod connector_merge;
mod flatten;

use std::sync::Arc;

use mesh_kernel::DynamicMesh;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connector::Connector;
use crate::error::ShellResult;
use crate::offset::OffsetMeshes;
use crate::params::{DeviceParams, FlattenParams, StitchParams};

pub use connector_merge::{ConnectorMergeReport, merge_connector};
pub use flatten::{FlattenReport, flatten_base};

/// Which finish step runs after the outer wall.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finish {
    /// Return the extruded shell unchanged.
    #[default]
    None,
    /// Flatten the lowest band of the outer wall into a sole.
    FlattenBand(FlattenParams),
    /// Cut the shell bottom off and merge the active connector in.
    ConnectorMerge(StitchParams),
}

/// Everything a finish step may read besides the shell itself.
#[derive(Debug, Clone)]
pub struct FinishContext<'a> {
    pub params: &'a DeviceParams,
    pub offsets: Option<&'a OffsetMeshes>,
    /// Connector snapshot taken when the step starts.
    pub connector: Option<Arc<dyn Connector>>,
    /// Inputs changed while this run was in progress.
    pub preview: bool,
}

impl Finish {
    pub fn name(&self) -> &'static str {
        match self {
            Finish::None => "none",
            Finish::FlattenBand(_) => "flatten_band",
            Finish::ConnectorMerge(_) => "connector_merge",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Finish::None)
    }

    /// Apply the step to `mesh` in place.
    pub fn apply(&self, mesh: &mut DynamicMesh, ctx: &FinishContext<'_>) -> ShellResult<()> {
        match self {
            Finish::None => Ok(()),
            Finish::FlattenBand(params) => flatten_base(mesh, params).map(|_| ()),
            Finish::ConnectorMerge(stitch) => {
                if ctx.preview {
                    debug!("Preview run, connector merge skipped");
                    return Ok(());
                }
                let Some(connector) = ctx.connector.as_ref() else {
                    debug!("No connector set, merge skipped");
                    return Ok(());
                };
                merge_connector(mesh, connector.as_ref(), ctx.params, stitch, ctx.offsets)
                    .map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_kernel::primitives::capped_cylinder;

    #[test]
    fn test_finish_serde_tag() {
        let finish = Finish::FlattenBand(FlattenParams::default());
        let json = serde_json::to_string(&finish).unwrap();
        assert!(json.contains("\"kind\":\"flatten_band\""));
        let back: Finish = serde_json::from_str(&json).unwrap();
        assert_eq!(back, finish);

        let none: Finish = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_connector_merge_skipped_without_connector_or_in_preview() {
        let mut mesh = DynamicMesh::from_mesh(&capped_cylinder(20.0, 40.0, 24, 4.0, false));
        let before = mesh.triangle_count();
        let params = DeviceParams::default();
        let finish = Finish::ConnectorMerge(StitchParams::default());

        let ctx = FinishContext {
            params: &params,
            offsets: None,
            connector: None,
            preview: false,
        };
        finish.apply(&mut mesh, &ctx).unwrap();
        assert_eq!(mesh.triangle_count(), before);

        let connector: Arc<dyn Connector> = Arc::new(crate::connector::FlatBaseConnector::new(
            Default::default(),
            Vec::new(),
        ));
        let ctx = FinishContext {
            connector: Some(connector),
            preview: true,
            ..ctx
        };
        finish.apply(&mut mesh, &ctx).unwrap();
        assert_eq!(mesh.triangle_count(), before);
    }
}
