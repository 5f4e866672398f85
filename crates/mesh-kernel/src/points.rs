//! Nearest-neighbour index over a fixed point set.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point3, Rotation3, Vector3};

/// k-d tree over points, returning indices into the original slice.
///
/// Points are stored in a slightly rotated frame. Samples of a horizontal
/// circle or a flat grid share one coordinate exactly, and the tree cannot
/// split a bucket whose items are equal along the split axis.
pub struct PointIndex {
    tree: KdTree<f64, 3>,
    frame: Rotation3<f64>,
    len: usize,
}

impl std::fmt::Debug for PointIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointIndex").field("len", &self.len).finish()
    }
}

impl PointIndex {
    pub fn new(points: &[Point3<f64>]) -> Self {
        let frame = Rotation3::from_scaled_axis(Vector3::new(0.3091, -0.4517, 0.1733));
        let mut tree: KdTree<f64, 3> = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            let q = frame * p;
            tree.add(&[q.x, q.y, q.z], i as u64);
        }
        Self {
            tree,
            frame,
            len: points.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn key(&self, p: &Point3<f64>) -> [f64; 3] {
        let q = self.frame * p;
        [q.x, q.y, q.z]
    }

    /// Index of and distance to the closest point.
    pub fn nearest(&self, p: &Point3<f64>) -> Option<(usize, f64)> {
        if self.len == 0 {
            return None;
        }
        let hit = self.tree.nearest_one::<SquaredEuclidean>(&self.key(p));
        Some((hit.item as usize, hit.distance.sqrt()))
    }

    /// Indices of all points within `radius`, closest first.
    pub fn within(&self, p: &Point3<f64>, radius: f64) -> Vec<usize> {
        if self.len == 0 {
            return Vec::new();
        }
        self.tree
            .within::<SquaredEuclidean>(&self.key(p), radius * radius)
            .into_iter()
            .map(|n| n.item as usize)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_planar_ring_of_points() {
        // many samples sharing z exercise bucket splitting
        let points: Vec<Point3<f64>> = (0..400)
            .map(|i| {
                let a = std::f64::consts::TAU * i as f64 / 400.0;
                Point3::new(30.0 * a.cos(), 30.0 * a.sin(), 5.0)
            })
            .collect();
        let index = PointIndex::new(&points);
        let (i, d) = index.nearest(&Point3::new(40.0, 0.0, 5.0)).unwrap();
        assert_eq!(i, 0);
        assert_relative_eq!(d, 10.0, epsilon = 1e-9);
        assert_eq!(index.within(&points[10], 1e-6), vec![10]);
    }

    #[test]
    fn test_empty_index() {
        let index = PointIndex::new(&[]);
        assert!(index.nearest(&Point3::origin()).is_none());
        assert!(index.within(&Point3::origin(), 1.0).is_empty());
    }
}
