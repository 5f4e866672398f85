//! Parametric connectors fitted to the bottom of a shell.
//!
//! A connector builds its geometry lazily: an outer part, an optional inner
//! part, the open boundary loop of each and the holes to cut once it has
//! been merged into a shell. The generator reads the active connector
//! through a [`ConnectorSlot`] and keeps its own snapshot for a whole run.

mod flat_base;
mod holes;
mod simplify;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use mesh_kernel::{Aabb, BoundaryLoop, DynamicMesh, Mesh};
use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::ShellResult;

pub use flat_base::FlatBaseConnector;
pub use holes::{HitFilter, HoleAxis, HoleGroups, HoleMode, HoleSpec, cut_hole, cut_holes};
pub use simplify::{SimplifiedLoop, simplify_loop};

/// A connector type.
pub trait Connector: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Geometry for the current parameters, built on first use.
    fn geometry(&self) -> ShellResult<Arc<ConnectorGeometry>>;
}

/// Built connector parts in connector space: the open top at `z = 0`,
/// centered on the Z axis.
#[derive(Debug, Clone)]
pub struct ConnectorGeometry {
    pub inner: Option<Mesh>,
    pub outer: Mesh,
    /// Open loop of `inner`, in its vertex indices.
    pub inner_loop: Option<BoundaryLoop>,
    /// Open loop of `outer`, in its vertex indices.
    pub outer_loop: BoundaryLoop,
    pub combined_bounds: Aabb,
    pub holes: Vec<HoleSpec>,
}

/// Where [`ConnectorGeometry::append_to`] put the connector.
#[derive(Debug, Clone)]
pub struct AppendInfo {
    pub inner_group: Option<i32>,
    pub outer_group: i32,
    /// Loops in host mesh vertex ids.
    pub inner_loop: Option<BoundaryLoop>,
    pub outer_loop: BoundaryLoop,
}

impl AppendInfo {
    pub fn hole_groups(&self) -> HoleGroups {
        HoleGroups {
            inner: self.inner_group,
            outer: Some(self.outer_group),
        }
    }
}

impl ConnectorGeometry {
    pub fn has_inner(&self) -> bool {
        self.inner.is_some() && self.inner_loop.is_some()
    }

    /// Copy both parts into `mesh` under new groups, moved by `translation`.
    pub fn append_to(&self, mesh: &mut DynamicMesh, translation: Vector3<f64>) -> AppendInfo {
        let outer_group = mesh.allocate_group();
        let outer_loop = append_part(mesh, &self.outer, &self.outer_loop, outer_group, translation);

        let (inner_group, inner_loop) = match (&self.inner, &self.inner_loop) {
            (Some(part), Some(boundary)) => {
                let group = mesh.allocate_group();
                let mapped = append_part(mesh, part, boundary, group, translation);
                (Some(group), Some(mapped))
            }
            _ => (None, None),
        };

        debug!(
            outer_group,
            inner_group = ?inner_group,
            outer_loop = outer_loop.len(),
            "Connector appended"
        );
        AppendInfo {
            inner_group,
            outer_group,
            inner_loop,
            outer_loop,
        }
    }

    /// Cut every hole, in order, into a mesh the connector was appended to.
    ///
    /// Returns `false` if any hole failed; the remaining holes are still cut.
    pub fn cut_holes(
        &self,
        mesh: &mut DynamicMesh,
        translation: Vector3<f64>,
        groups: HoleGroups,
    ) -> bool {
        self.count_failed_holes(mesh, translation, groups) == 0
    }

    pub(crate) fn count_failed_holes(
        &self,
        mesh: &mut DynamicMesh,
        translation: Vector3<f64>,
        groups: HoleGroups,
    ) -> usize {
        holes::count_failed_holes(mesh, &self.holes, self.hole_base(translation), groups)
    }

    /// Bottom center of the connector once moved by `translation`.
    pub fn hole_base(&self, translation: Vector3<f64>) -> Point3<f64> {
        self.combined_bounds.center() - Vector3::z() * self.combined_bounds.extents().z + translation
    }
}

fn append_part(
    mesh: &mut DynamicMesh,
    part: &Mesh,
    boundary: &BoundaryLoop,
    group: i32,
    translation: Vector3<f64>,
) -> BoundaryLoop {
    let ids = mesh.append_mesh(part, |_| group);
    for &v in &ids {
        mesh.set_position(v, mesh.position(v) + translation);
    }
    BoundaryLoop::new(
        boundary
            .vertices
            .iter()
            .filter_map(|&v| ids.get(v as usize).copied())
            .collect(),
    )
}

/// Shared, replaceable reference to the active connector.
///
/// Readers take a snapshot and keep using it even if the slot is changed
/// meanwhile. Every change bumps the version.
#[derive(Clone, Default)]
pub struct ConnectorSlot {
    current: Arc<RwLock<Option<Arc<dyn Connector>>>>,
    version: Arc<AtomicU64>,
}

impl ConnectorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, connector: Option<Arc<dyn Connector>>) {
        let mut slot = self.current.write().unwrap_or_else(|e| e.into_inner());
        *slot = connector;
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> Option<Arc<dyn Connector>> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ConnectorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.snapshot().map(|c| c.name().to_string());
        f.debug_struct("ConnectorSlot")
            .field("connector", &name)
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FlatBaseParams;
    use approx::assert_relative_eq;

    #[test]
    fn test_append_maps_loops() {
        let connector = FlatBaseConnector::new(FlatBaseParams::default(), Vec::new());
        let geometry = connector.geometry().unwrap();

        let mut host = DynamicMesh::new();
        let info = geometry.append_to(&mut host, Vector3::new(0.0, 0.0, -20.0));
        assert_ne!(Some(info.outer_group), info.inner_group);
        assert!(info.outer_loop.is_valid_in(&host));
        assert!(info.inner_loop.as_ref().is_some_and(|l| l.is_valid_in(&host)));

        let bounds = host.bounds().unwrap();
        assert_relative_eq!(bounds.max.z, -20.0, epsilon = 1e-6);
    }

    #[test]
    fn test_slot_snapshot_survives_replacement() {
        let slot = ConnectorSlot::new();
        assert!(slot.snapshot().is_none());
        let v0 = slot.version();

        let first: Arc<dyn Connector> =
            Arc::new(FlatBaseConnector::new(FlatBaseParams::default(), Vec::new()));
        slot.set(Some(first));
        let held = slot.snapshot().unwrap();

        slot.set(None);
        assert_eq!(slot.version(), v0 + 2);
        assert!(slot.snapshot().is_none());
        assert_eq!(held.name(), "flat_base");
    }
}
