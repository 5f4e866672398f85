//! Pull-based inputs to the generator.
//!
//! A source hands out an immutable snapshot together with a version that
//! increases on every change. The generator compares versions instead of
//! subscribing to change events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use mesh_kernel::Mesh;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Provides the scanned limb.
pub trait MeshSource: Send + Sync {
    fn mesh(&self) -> Arc<Mesh>;
    fn version(&self) -> u64;
}

/// Provides the trim curve.
pub trait CurveSource: Send + Sync {
    fn curve(&self) -> Arc<Curve>;
    fn version(&self) -> u64;
}

/// Ordered polyline; the trim curve is always closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub points: Vec<Point3<f64>>,
    #[serde(default = "default_closed")]
    pub closed: bool,
}

fn default_closed() -> bool {
    true
}

impl Curve {
    pub fn closed(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            closed: true,
        }
    }

    /// Closed circle in the plane `z = center.z`.
    pub fn horizontal_circle(center: Point3<f64>, radius: f64, samples: usize) -> Self {
        let samples = samples.max(3);
        let points = (0..samples)
            .map(|i| {
                let a = std::f64::consts::TAU * i as f64 / samples as f64;
                center + Vector3::new(radius * a.cos(), radius * a.sin(), 0.0)
            })
            .collect();
        Self::closed(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// In-memory mesh source for applications and tests.
#[derive(Debug)]
pub struct SharedMesh {
    mesh: RwLock<Arc<Mesh>>,
    version: AtomicU64,
}

impl SharedMesh {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh: RwLock::new(Arc::new(mesh)),
            version: AtomicU64::new(1),
        }
    }

    /// Replace the mesh and bump the version.
    pub fn set(&self, mesh: Mesh) {
        let mut slot = self.mesh.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::new(mesh);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Bump the version without changing the mesh.
    pub fn touch(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

impl MeshSource for SharedMesh {
    fn mesh(&self) -> Arc<Mesh> {
        self.mesh.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// In-memory curve source.
#[derive(Debug)]
pub struct SharedCurve {
    curve: RwLock<Arc<Curve>>,
    version: AtomicU64,
}

impl SharedCurve {
    pub fn new(curve: Curve) -> Self {
        Self {
            curve: RwLock::new(Arc::new(curve)),
            version: AtomicU64::new(1),
        }
    }

    pub fn set(&self, curve: Curve) {
        let mut slot = self.curve.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::new(curve);
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

impl CurveSource for SharedCurve {
    fn curve(&self) -> Arc<Curve> {
        self.curve.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_set_bumps_version() {
        let source = SharedMesh::new(Mesh::new());
        let v0 = source.version();
        let before = source.mesh();
        source.set(Mesh::from_parts(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        ));
        assert!(source.version() > v0);
        // earlier snapshots are untouched
        assert!(before.is_empty());
        assert_eq!(source.mesh().face_count(), 1);
    }

    #[test]
    fn test_horizontal_circle() {
        let curve = Curve::horizontal_circle(Point3::new(1.0, 2.0, 30.0), 10.0, 36);
        assert_eq!(curve.len(), 36);
        assert!(curve.closed);
        for p in &curve.points {
            assert_relative_eq!(p.z, 30.0);
            assert_relative_eq!((p.x - 1.0).hypot(p.y - 2.0), 10.0, epsilon = 1e-9);
        }

        let shared = SharedCurve::new(curve.clone());
        let v0 = shared.version();
        shared.set(Curve::default());
        assert_eq!(shared.version(), v0 + 1);
        assert!(shared.curve().is_empty());
    }
}
