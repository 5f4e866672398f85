//! Flat-base cup connector.

use std::sync::{Arc, Mutex};

use mesh_kernel::primitives::capped_cylinder;
use mesh_kernel::tracing_ext::OperationTimer;
use mesh_kernel::{
    BoundaryLoop, CutPlane, DynamicMesh, Mesh, RemeshParams, Remesher, SpatialIndex,
    plane_cut,
};
use nalgebra::Vector3;
use tracing::{debug, info};

use crate::error::{ShellError, ShellResult};
use crate::params::FlatBaseParams;

use super::holes::HoleSpec;
use super::{Connector, ConnectorGeometry};

/// Cylinders are built this much taller than the cut height.
const CUT_MARGIN: f64 = 10.0;
const PART_SMOOTHING: f64 = 0.5;

/// A round cup: solid base, optional cavity, open top.
#[derive(Debug)]
pub struct FlatBaseConnector {
    params: FlatBaseParams,
    holes: Vec<HoleSpec>,
    cache: Mutex<Option<Arc<ConnectorGeometry>>>,
}

impl FlatBaseConnector {
    pub fn new(params: FlatBaseParams, holes: Vec<HoleSpec>) -> Self {
        Self {
            params,
            holes,
            cache: Mutex::new(None),
        }
    }

    pub fn params(&self) -> &FlatBaseParams {
        &self.params
    }

    pub fn holes(&self) -> &[HoleSpec] {
        &self.holes
    }

    fn build(&self) -> ShellResult<ConnectorGeometry> {
        let _timer = OperationTimer::new("flat_base_build");
        let p = &self.params;
        p.validate()?;
        let h = p.height();

        let outer = build_part(
            capped_cylinder(p.diameter / 2.0, h + CUT_MARGIN, p.slices, p.target_edge_length, false),
            h,
            p,
        )?;
        let inner = if p.has_inner {
            let mut cavity = capped_cylinder(
                p.inner_diameter() / 2.0,
                h + CUT_MARGIN,
                p.slices,
                p.target_edge_length,
                true,
            );
            cavity.translate(Vector3::new(0.0, 0.0, p.base_thickness));
            Some(build_part(cavity, h, p)?)
        } else {
            None
        };

        let mut bounds = outer.bounds().ok_or(ShellError::EmptyMesh)?;
        if let Some(inner) = &inner {
            if let Some(b) = inner.bounds() {
                bounds.expand(&b);
            }
        }
        let c = bounds.center();
        let shift = Vector3::new(-c.x, -c.y, -bounds.max.z);

        let (outer, outer_loop) = finish_part(outer, shift)?;
        let (inner, inner_loop) = match inner {
            Some(part) => {
                let (mesh, boundary) = finish_part(part, shift)?;
                (Some(mesh), Some(boundary))
            }
            None => (None, None),
        };
        let combined_bounds = bounds.translated(&shift);

        info!(
            diameter = p.diameter,
            height = h,
            outer_faces = outer.face_count(),
            inner_faces = inner.as_ref().map_or(0, Mesh::face_count),
            holes = self.holes.len(),
            "Flat base connector built"
        );
        Ok(ConnectorGeometry {
            inner,
            outer,
            inner_loop,
            outer_loop,
            combined_bounds,
            holes: self.holes.clone(),
        })
    }
}

impl Connector for FlatBaseConnector {
    fn name(&self) -> &str {
        "flat_base"
    }

    fn geometry(&self) -> ShellResult<Arc<ConnectorGeometry>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(geometry) = cache.as_ref() {
            return Ok(geometry.clone());
        }
        let geometry = Arc::new(self.build()?);
        *cache = Some(geometry.clone());
        Ok(geometry)
    }
}

/// Remesh one cylinder against itself and cut it open at `height`.
fn build_part(mesh: Mesh, height: f64, p: &FlatBaseParams) -> ShellResult<DynamicMesh> {
    let mut dm = DynamicMesh::from_mesh(&mesh);
    let index = SpatialIndex::from_mesh(&mesh);
    let params = RemeshParams::with_target_edge_length(p.target_edge_length)
        .smoothing(PART_SMOOTHING)
        .preserve_group_boundaries(true)
        .passes(p.remesh_passes);
    let stats = Remesher::new(&mut dm, params).with_projection(&index).run();
    debug!(splits = stats.splits, collapses = stats.collapses, "Connector part remeshed");

    let cut = plane_cut(&mut dm, &CutPlane::horizontal(height, true), |_| true)?;
    if cut.loops.is_empty() {
        return Err(ShellError::connector_failed(
            "flat_base",
            format!("cut at {height:.2} left no opening"),
        ));
    }
    Ok(dm)
}

/// Move the part into connector space and compact it.
fn finish_part(mut dm: DynamicMesh, shift: Vector3<f64>) -> ShellResult<(Mesh, BoundaryLoop)> {
    dm.translate(shift);
    dm.compute_normals();
    let mesh = dm.to_mesh();
    let boundary = DynamicMesh::from_mesh(&mesh)
        .boundary_loops()
        .into_iter()
        .next()
        .ok_or_else(|| ShellError::connector_failed("flat_base", "part has no open loop"))?;
    Ok((mesh, boundary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cup_dimensions_and_loops() {
        let connector = FlatBaseConnector::new(FlatBaseParams::default(), Vec::new());
        let geometry = connector.geometry().unwrap();
        assert!(geometry.has_inner());

        let b = geometry.combined_bounds;
        assert_relative_eq!(b.max.z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(b.height(), 10.0, epsilon = 1e-6);
        assert_relative_eq!(b.center().x, 0.0, epsilon = 1e-6);
        assert!(b.width() <= 75.0 + 1e-6);

        let outer = DynamicMesh::from_mesh(&geometry.outer);
        assert_eq!(outer.boundary_loops().len(), 1);
        assert!(geometry.outer_loop.is_valid_in(&outer));

        let inner_mesh = geometry.inner.as_ref().unwrap();
        let inner = DynamicMesh::from_mesh(inner_mesh);
        assert_eq!(inner.boundary_loops().len(), 1);
        assert!(geometry.inner_loop.as_ref().unwrap().is_valid_in(&inner));
        // the cavity floor sits at the base thickness
        assert_relative_eq!(inner_mesh.aabb().unwrap().min.z, -5.0, epsilon = 1e-6);
    }

    #[test]
    fn test_geometry_is_cached() {
        let connector = FlatBaseConnector::new(FlatBaseParams::default(), Vec::new());
        let a = connector.geometry().unwrap();
        let b = connector.geometry().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_without_cavity() {
        let params = FlatBaseParams {
            has_inner: false,
            ..Default::default()
        };
        let geometry = FlatBaseConnector::new(params, Vec::new()).geometry().unwrap();
        assert!(!geometry.has_inner());
        assert!(geometry.inner_loop.is_none());
    }

    #[test]
    fn test_invalid_params() {
        let params = FlatBaseParams {
            diameter: -1.0,
            ..Default::default()
        };
        assert!(FlatBaseConnector::new(params, Vec::new()).geometry().is_err());
    }
}
