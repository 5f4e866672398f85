//! Inner and outer offset reference surfaces.
//!
//! The offsets are never part of the visible shell. The connector seam uses
//! them as no-penetration targets so the merged wall keeps its thickness.
//! Two interchangeable builders exist, see [`OffsetMethod`].

mod normal;
mod sdf;

use std::sync::Arc;

use mesh_kernel::{Mesh, SpatialIndex};
use tracing::{debug, info};

use crate::error::ShellResult;
use crate::params::{DeviceParams, OffsetMethod, PARAM_TOLERANCE};

pub use normal::normal_offset;
pub(crate) use normal::displace_along_normals;
pub use sdf::SdfField;

/// One offset surface with its query structure.
#[derive(Debug)]
pub struct OffsetSurface {
    pub distance: f64,
    pub mesh: Mesh,
    pub index: SpatialIndex,
}

impl OffsetSurface {
    pub fn new(distance: f64, mesh: Mesh) -> Self {
        let index = SpatialIndex::from_mesh(&mesh);
        Self {
            distance,
            mesh,
            index,
        }
    }
}

/// The pair of reference surfaces handed to the finish step.
#[derive(Debug, Clone)]
pub struct OffsetMeshes {
    pub inner: Arc<OffsetSurface>,
    pub outer: Arc<OffsetSurface>,
}

/// Offset surfaces kept between runs.
///
/// Surfaces are rebuilt when their distance changes; the SDF grid is kept
/// as long as it was padded for the largest offset asked for.
#[derive(Debug, Default)]
pub struct OffsetCache {
    inner: Option<Arc<OffsetSurface>>,
    outer: Option<Arc<OffsetSurface>>,
    field: Option<SdfField>,
    method: Option<OffsetMethod>,
    input_version: Option<u64>,
}

impl OffsetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_none() && self.outer.is_none()
    }

    /// Surfaces from the last successful update.
    pub fn current(&self) -> Option<OffsetMeshes> {
        match (&self.inner, &self.outer) {
            (Some(inner), Some(outer)) => Some(OffsetMeshes {
                inner: inner.clone(),
                outer: outer.clone(),
            }),
            _ => None,
        }
    }

    /// Bring both surfaces up to date for `input` (already in output space).
    ///
    /// `input_version` identifies the input; a different value drops
    /// everything cached.
    pub fn update(
        &mut self,
        input: &Mesh,
        input_version: u64,
        params: &DeviceParams,
    ) -> ShellResult<OffsetMeshes> {
        if self.input_version != Some(input_version) || self.method != Some(params.offset_method)
        {
            debug!(
                input_version,
                method = ?params.offset_method,
                "Offset cache reset"
            );
            self.clear();
            self.input_version = Some(input_version);
            self.method = Some(params.offset_method);
        }

        let inner_distance = params.inner_offset;
        let outer_distance = params.outer_offset();

        if params.offset_method == OffsetMethod::Sdf {
            let max_offset = inner_distance.abs().max(outer_distance.abs());
            let covered = self.field.as_ref().is_some_and(|f| f.covers(max_offset));
            if !covered {
                self.field = Some(SdfField::compute(input, max_offset, &params.offset)?);
                self.inner = None;
                self.outer = None;
            }
        }

        let inner = self.surface(input, Which::Inner, inner_distance, params)?;
        let outer = self.surface(input, Which::Outer, outer_distance, params)?;

        info!(
            inner_faces = inner.mesh.face_count(),
            outer_faces = outer.mesh.face_count(),
            "Offset surfaces ready"
        );
        Ok(OffsetMeshes { inner, outer })
    }

    fn surface(
        &mut self,
        input: &Mesh,
        which: Which,
        distance: f64,
        params: &DeviceParams,
    ) -> ShellResult<Arc<OffsetSurface>> {
        let slot = match which {
            Which::Inner => &self.inner,
            Which::Outer => &self.outer,
        };
        if let Some(existing) = slot {
            if (existing.distance - distance).abs() <= PARAM_TOLERANCE {
                return Ok(existing.clone());
            }
        }

        let mesh = match (&self.field, params.offset_method) {
            (Some(field), OffsetMethod::Sdf) => field.extract(distance)?,
            _ => normal_offset(input, distance, params.offset.reduce_to_triangles)?,
        };
        let surface = Arc::new(OffsetSurface::new(distance, mesh));
        match which {
            Which::Inner => self.inner = Some(surface.clone()),
            Which::Outer => self.outer = Some(surface.clone()),
        }
        Ok(surface)
    }
}

#[derive(Debug, Clone, Copy)]
enum Which {
    Inner,
    Outer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_kernel::primitives::uv_sphere;
    use nalgebra::Point3;

    #[test]
    fn test_cache_reuses_surfaces() {
        let sphere = uv_sphere(Point3::origin(), 20.0, 24, 12);
        let params = DeviceParams::default();
        let mut cache = OffsetCache::new();

        let first = cache.update(&sphere, 1, &params).unwrap();
        let second = cache.update(&sphere, 1, &params).unwrap();
        assert!(Arc::ptr_eq(&first.inner, &second.inner));
        assert!(Arc::ptr_eq(&first.outer, &second.outer));

        // only the outer distance changes with the thickness
        let thicker = DeviceParams {
            thickness: 6.0,
            ..params.clone()
        };
        let third = cache.update(&sphere, 1, &thicker).unwrap();
        assert!(Arc::ptr_eq(&first.inner, &third.inner));
        assert!(!Arc::ptr_eq(&first.outer, &third.outer));

        let fourth = cache.update(&sphere, 2, &thicker).unwrap();
        assert!(!Arc::ptr_eq(&third.inner, &fourth.inner));
    }

    #[test]
    fn test_clear() {
        let sphere = uv_sphere(Point3::origin(), 20.0, 16, 8);
        let mut cache = OffsetCache::new();
        cache.update(&sphere, 1, &DeviceParams::default()).unwrap();
        assert!(cache.current().is_some());
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.current().is_none());
    }
}
