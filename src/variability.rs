use indicatif::ProgressBar;
use log::{info, warn};
use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::stats::sample_std;

/// Neighbor count below which a radius neighborhood is considered sparse
pub const MIN_NEIGHBORS: usize = 4;

/// Node position stored in the spatial index along with its row index
#[derive(Debug, Clone)]
struct IndexedPoint {
    position: [f64; 3],
    index: usize,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Estimates the spatial dispersion of a nodal field.
///
/// The estimator owns the k-nearest fallback counters of one run. They
/// accumulate over every `estimate` call (one per load case) until `reset`.
#[derive(Debug, Default, Clone)]
pub struct LocalVariabilityEstimator {
    fallback_count: usize,
    total_count: usize,
}

impl LocalVariabilityEstimator {
    pub fn new() -> LocalVariabilityEstimator {
        LocalVariabilityEstimator::default()
    }

    pub fn reset(&mut self) {
        self.fallback_count = 0;
        self.total_count = 0;
    }

    /// Nodes that used the k-nearest neighborhood since the last reset
    pub fn fallback_count(&self) -> usize {
        self.fallback_count
    }

    /// Nodes evaluated since the last reset
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    /// Computes the local standard deviation of `values` around each node
    ///
    /// Each node takes the sample standard deviation over all nodes within
    /// `radius` (itself included). When that neighborhood holds fewer than
    /// `MIN_NEIGHBORS` nodes (capped at the number of other nodes in the
    /// set) the `MIN_NEIGHBORS` nearest nodes are used instead.
    ///
    /// # Arguments
    /// * `positions` - Node coordinates in millimeters
    /// * `values` - The governing strain of each node, same order as `positions`
    /// * `radius` - Neighborhood radius in millimeters
    ///
    /// # Returns
    /// One non-negative value per node
    pub fn estimate(&mut self, positions: &[Point3<f64>], values: &[f64], radius: f64) -> Vec<f64> {
        let n = positions.len();
        self.total_count += n;

        if n < 2 {
            return vec![0.0; n];
        }

        let tree = RTree::bulk_load(
            positions
                .iter()
                .enumerate()
                .map(|(index, p)| IndexedPoint {
                    position: [p.x, p.y, p.z],
                    index,
                })
                .collect(),
        );

        let min_neighbors = MIN_NEIGHBORS.min(n - 1);
        let k = MIN_NEIGHBORS.min(n);
        let radius_2 = radius * radius;

        let mut local_std = Vec::with_capacity(n);
        let mut fallbacks: usize = 0;

        let bar = ProgressBar::new(n as u64);
        for position in positions {
            bar.inc(1);
            let query = [position.x, position.y, position.z];

            let mut neighbors: Vec<usize> = tree
                .locate_within_distance(query, radius_2)
                .map(|p| p.index)
                .collect();

            if neighbors.len() < min_neighbors {
                fallbacks += 1;
                neighbors = tree
                    .nearest_neighbor_iter(&query)
                    .take(k)
                    .map(|p| p.index)
                    .collect();
            }

            // Fixed summation order keeps repeated runs bit-identical
            neighbors.sort_unstable();
            let neighbor_values: Vec<f64> = neighbors.iter().map(|i| values[*i]).collect();
            local_std.push(sample_std(&neighbor_values));
        }
        bar.finish_with_message(format!("info: estimated local variability at {n} nodes"));

        self.fallback_count += fallbacks;

        info!("local variability: {fallbacks} of {n} nodes used the k-nearest fallback");
        if fallbacks * 2 > n {
            warn!(
                "more than half of the nodes are sparse at radius {radius} mm; consider a larger uniformity radius"
            );
        }

        local_std
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_points(xs: &[f64]) -> Vec<Point3<f64>> {
        xs.iter().map(|x| Point3::new(*x, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_isolated_node_falls_back_once() {
        let positions = line_points(&[0.0, 1.0, 100.0]);
        let values = [10.0, 12.0, 9.0];

        let mut estimator = LocalVariabilityEstimator::new();
        let local_std = estimator.estimate(&positions, &values, 2.0);

        assert_eq!(estimator.fallback_count(), 1);
        assert_eq!(estimator.total_count(), 3);
        assert!((local_std[0] - 2f64.sqrt()).abs() < 1e-10);
        assert!((local_std[1] - 2f64.sqrt()).abs() < 1e-10);
        // k-nearest neighborhood covers all three nodes
        assert!((local_std[2] - crate::stats::sample_std(&values)).abs() < 1e-10);
    }

    #[test]
    fn test_counters_accumulate_until_reset() {
        let positions = line_points(&[0.0, 1.0, 100.0]);
        let values = [10.0, 12.0, 9.0];

        let mut estimator = LocalVariabilityEstimator::new();
        estimator.estimate(&positions, &values, 2.0);
        estimator.estimate(&positions, &values, 2.0);
        assert_eq!(estimator.fallback_count(), 2);
        assert_eq!(estimator.total_count(), 6);

        estimator.reset();
        assert_eq!(estimator.fallback_count(), 0);
        assert_eq!(estimator.total_count(), 0);
    }

    #[test]
    fn test_dense_grid_uses_radius_neighborhood() {
        let mut positions = Vec::new();
        let mut values = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                positions.push(Point3::new(i as f64, j as f64, 0.0));
                values.push((i * 5 + j) as f64);
            }
        }

        let mut estimator = LocalVariabilityEstimator::new();
        let local_std = estimator.estimate(&positions, &values, 1.5);

        assert_eq!(estimator.fallback_count(), 0);
        assert!(local_std.iter().all(|s| *s >= 0.0 && s.is_finite()));
    }

    #[test]
    fn test_uniform_field_has_zero_std() {
        let positions = line_points(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let values = [7.0; 5];

        let mut estimator = LocalVariabilityEstimator::new();
        let local_std = estimator.estimate(&positions, &values, 10.0);

        assert!(local_std.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_degenerate_inputs() {
        let mut estimator = LocalVariabilityEstimator::new();
        assert!(estimator.estimate(&[], &[], 1.0).is_empty());

        let single = estimator.estimate(&line_points(&[3.0]), &[42.0], 1.0);
        assert_eq!(single, vec![0.0]);
        assert_eq!(estimator.fallback_count(), 0);
        assert_eq!(estimator.total_count(), 1);
    }
}
