use log::{info, warn};
use nalgebra::Point3;

use crate::{
    datatypes::{Candidate, GradientOrder, QualityRecord, QualityTable, Strategy},
    kmeans::KMeans,
    stats::percentile,
};

/// Runs a selection strategy over the aggregated table
///
/// # Arguments
/// * `table` - The aggregated quality table; left untouched
/// * `strategy` - The strategy and its parameters
/// * `count` - Maximum number of candidates to return
/// * `seed` - Seed for the clustering strategies
///
/// # Returns
/// The candidates in selection order. Empty when nothing qualifies.
pub fn select(table: &QualityTable, strategy: &Strategy, count: usize, seed: u64) -> Vec<Candidate> {
    info!(
        "selecting up to {count} candidates from {} nodes with {}",
        table.len(),
        strategy.name()
    );

    let candidates = match strategy {
        Strategy::GreedyQuality { min_distance } => greedy_quality(table, count, *min_distance),
        Strategy::KMeans => kmeans_coverage(table, count, seed),
        Strategy::FilteredKMeans { quality_percentile } => {
            filtered_kmeans(table, count, *quality_percentile, seed)
        }
        Strategy::GreedyGradient {
            min_distance,
            order,
        } => greedy_gradient(table, count, *min_distance, *order),
        Strategy::Roi {
            center,
            radius,
            min_distance,
        } => roi_greedy(table, count, center, *radius, *min_distance),
    };

    if candidates.is_empty() {
        warn!("{} selected no candidates", strategy.name());
    } else {
        info!("selected {} candidates", candidates.len());
    }

    candidates
}

fn ranked(records: Vec<&QualityRecord>) -> Vec<Candidate> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| Candidate {
            rank: i + 1,
            record: record.clone(),
        })
        .collect()
}

/// Takes rows in the given order, skipping any row closer than
/// `min_distance` to a row already taken
fn greedy_exclusion(ordered: Vec<&QualityRecord>, count: usize, min_distance: f64) -> Vec<Candidate> {
    let mut picked: Vec<&QualityRecord> = Vec::new();

    for record in ordered {
        if picked.len() >= count {
            break;
        }

        let clear = picked.iter().all(|p| {
            nalgebra::distance(&p.node.position, &record.node.position) >= min_distance
        });
        if clear {
            picked.push(record);
        }
    }

    ranked(picked)
}

/// Repeatedly takes the highest quality row and excludes its surroundings
pub fn greedy_quality(table: &QualityTable, count: usize, min_distance: f64) -> Vec<Candidate> {
    let mut ordered: Vec<&QualityRecord> = table.iter().collect();
    ordered.sort_by(|a, b| b.quality.total_cmp(&a.quality));

    greedy_exclusion(ordered, count, min_distance)
}

/// Same mechanics as `greedy_quality`, ranked by local deviation
pub fn greedy_gradient(
    table: &QualityTable,
    count: usize,
    min_distance: f64,
    order: GradientOrder,
) -> Vec<Candidate> {
    let mut ordered: Vec<&QualityRecord> = table.iter().collect();
    match order {
        GradientOrder::Maximize => ordered.sort_by(|a, b| b.local_std.total_cmp(&a.local_std)),
        GradientOrder::Minimize => ordered.sort_by(|a, b| a.local_std.total_cmp(&b.local_std)),
    }

    greedy_exclusion(ordered, count, min_distance)
}

/// Clusters node positions and keeps the best row of every cluster
///
/// Clusters are returned best first. The cluster count is capped at the
/// number of rows.
pub fn kmeans_coverage(table: &QualityTable, count: usize, seed: u64) -> Vec<Candidate> {
    let n_clusters = count.min(table.len());
    if n_clusters == 0 {
        return Vec::new();
    }

    let positions: Vec<Point3<f64>> = table.iter().map(|r| r.node.position).collect();
    let labels = KMeans::new(n_clusters, seed).fit(&positions);

    let mut best: Vec<Option<&QualityRecord>> = vec![None; n_clusters];
    for (record, label) in std::iter::zip(table, &labels) {
        // ties keep the first row seen
        let replace = match best[*label] {
            Some(current) => record.quality > current.quality,
            None => true,
        };
        if replace {
            best[*label] = Some(record);
        }
    }

    let mut winners: Vec<&QualityRecord> = best.into_iter().flatten().collect();
    winners.sort_by(|a, b| b.quality.total_cmp(&a.quality));

    ranked(winners)
}

/// K-means coverage restricted to rows at or above a quality percentile
pub fn filtered_kmeans(
    table: &QualityTable,
    count: usize,
    quality_percentile: f64,
    seed: u64,
) -> Vec<Candidate> {
    let qualities: Vec<f64> = table.iter().map(|r| r.quality).collect();
    let threshold = match percentile(&qualities, quality_percentile) {
        Some(t) => t,
        None => return Vec::new(),
    };

    let retained: QualityTable = table
        .iter()
        .filter(|r| r.quality >= threshold)
        .cloned()
        .collect();
    info!(
        "quality percentile {quality_percentile} ({threshold:.4}) retained {} of {} nodes",
        retained.len(),
        table.len()
    );

    kmeans_coverage(&retained, count, seed)
}

/// Greedy-by-quality restricted to a sphere
pub fn roi_greedy(
    table: &QualityTable,
    count: usize,
    center: &Point3<f64>,
    radius: f64,
    min_distance: f64,
) -> Vec<Candidate> {
    let inside: QualityTable = table
        .iter()
        .filter(|r| nalgebra::distance(&r.node.position, center) <= radius)
        .cloned()
        .collect();

    greedy_quality(&inside, count, min_distance)
}
