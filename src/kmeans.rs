use nalgebra::{Point3, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const MAX_KMEANS_ITER: usize = 300;
pub const DEFAULT_KMEANS_SEED: u64 = 42;

/// Lloyd's k-means over 3D points with k-means++ seeding
#[derive(Debug, Clone, Copy)]
pub struct KMeans {
    pub n_clusters: usize,
    pub seed: u64,
    pub max_iter: usize,
}

impl KMeans {
    pub fn new(n_clusters: usize, seed: u64) -> KMeans {
        KMeans {
            n_clusters,
            seed,
            max_iter: MAX_KMEANS_ITER,
        }
    }

    /// Picks initial centers, spreading them out with probability
    /// proportional to the squared distance from the centers chosen so far.
    /// Stops early once every point coincides with a center.
    fn seed_centers(&self, points: &[Point3<f64>], rng: &mut StdRng) -> Vec<Point3<f64>> {
        let mut centers = vec![points[rng.random_range(0..points.len())]];
        let mut nearest_2: Vec<f64> = points
            .iter()
            .map(|p| (p - centers[0]).norm_squared())
            .collect();

        while centers.len() < self.n_clusters {
            let total: f64 = nearest_2.iter().sum();
            if total <= 0.0 {
                break;
            }

            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = points.len() - 1;
            for (i, d2) in nearest_2.iter().enumerate() {
                cumulative += d2;
                if cumulative >= target && *d2 > 0.0 {
                    chosen = i;
                    break;
                }
            }
            if nearest_2[chosen] <= 0.0 {
                // rounding pushed the draw past the end; take the last
                // point that is not already a center
                chosen = match nearest_2.iter().rposition(|d2| *d2 > 0.0) {
                    Some(i) => i,
                    None => break,
                };
            }

            let center = points[chosen];
            for (p, d2) in std::iter::zip(points, nearest_2.iter_mut()) {
                *d2 = (*d2).min((p - center).norm_squared());
            }
            centers.push(center);
        }

        centers
    }

    /// Clusters `points`
    ///
    /// # Returns
    /// One cluster label per point. Labels are contiguous from zero and
    /// number at most `n_clusters`; fewer appear when the points have fewer
    /// distinct positions than requested clusters.
    pub fn fit(&self, points: &[Point3<f64>]) -> Vec<usize> {
        if points.is_empty() || self.n_clusters == 0 {
            return Vec::new();
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centers = self.seed_centers(points, &mut rng);
        let mut labels = vec![usize::MAX; points.len()];

        for _ in 0..self.max_iter {
            let mut changed = false;
            for (p, label) in std::iter::zip(points, labels.iter_mut()) {
                let nearest = nearest_center(p, &centers);
                if nearest != *label {
                    *label = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = vec![Vector3::<f64>::zeros(); centers.len()];
            let mut counts = vec![0usize; centers.len()];
            for (p, label) in std::iter::zip(points, &labels) {
                sums[*label] += p.coords;
                counts[*label] += 1;
            }
            for (center, (sum, count)) in centers.iter_mut().zip(std::iter::zip(sums, counts)) {
                // empty clusters keep their previous center
                if count > 0 {
                    *center = Point3::from(sum / count as f64);
                }
            }
        }

        compact_labels(&labels)
    }
}

fn nearest_center(point: &Point3<f64>, centers: &[Point3<f64>]) -> usize {
    let mut best = 0;
    let mut best_d2 = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d2 = (point - center).norm_squared();
        if d2 < best_d2 {
            best = i;
            best_d2 = d2;
        }
    }
    best
}

/// Renumbers labels by first appearance so that unused clusters leave no gaps
fn compact_labels(labels: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<(usize, usize)> = Vec::new();
    labels
        .iter()
        .map(|label| match mapping.iter().find(|(old, _)| old == label) {
            Some((_, new)) => *new,
            None => {
                let new = mapping.len();
                mapping.push((*label, new));
                new
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for i in 0..10 {
            let offset = i as f64 * 0.1;
            points.push(Point3::new(offset, 0.0, 0.0));
            points.push(Point3::new(100.0 + offset, 50.0, 0.0));
        }
        points
    }

    #[test]
    fn test_separates_blobs() {
        let points = two_blobs();
        let labels = KMeans::new(2, DEFAULT_KMEANS_SEED).fit(&points);

        assert_eq!(labels.len(), points.len());
        for pair in labels.chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(labels.iter().step_by(2).all(|l| *l == labels[0]));
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let points = two_blobs();
        let a = KMeans::new(5, 7).fit(&points);
        let b = KMeans::new(5, 7).fit(&points);
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_points_collapse_clusters() {
        let points = vec![Point3::new(1.0, 1.0, 1.0); 4];
        let labels = KMeans::new(3, DEFAULT_KMEANS_SEED).fit(&points);
        assert_eq!(labels, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_one_cluster_per_distinct_point() {
        let points: Vec<Point3<f64>> = (0..4).map(|i| Point3::new(i as f64 * 10.0, 0.0, 0.0)).collect();
        let mut labels = KMeans::new(4, DEFAULT_KMEANS_SEED).fit(&points);
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 1, 2, 3]);
    }
}
