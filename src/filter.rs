use log::{info, warn};

use crate::datatypes::{QualityTable, StrainThreshold, StrainUnit};

/// Drops nodes whose strain magnitude is below a threshold
///
/// The threshold metric of a node is the `threshold.agg` reduction of
/// |best strain| across the per-load-case tables. It is independent of the
/// method used to aggregate quality.
///
/// # Arguments
/// * `aggregated` - The aggregated table to filter
/// * `per_case` - The per-load-case tables, same node order as `aggregated`
/// * `threshold` - Threshold value in microstrain and its reduction
/// * `unit` - Unit of the strain values stored in the tables
///
/// # Returns
/// The surviving rows, in their original order
pub fn apply_threshold(
    aggregated: QualityTable,
    per_case: &[QualityTable],
    threshold: &StrainThreshold,
    unit: StrainUnit,
) -> QualityTable {
    if per_case.is_empty() {
        return aggregated;
    }

    let limit = threshold.value_microstrain * unit.per_microstrain();
    let before = aggregated.len();

    let filtered: QualityTable = aggregated
        .into_iter()
        .enumerate()
        .filter(|(row, _)| {
            let magnitudes: Vec<f64> = per_case.iter().map(|t| t[*row].best_strain.abs()).collect();
            threshold.agg.reduce(&magnitudes) >= limit
        })
        .map(|(_, record)| record)
        .collect();

    info!(
        "strain threshold {} µε kept {} of {} nodes",
        threshold.value_microstrain,
        filtered.len(),
        before
    );
    if filtered.is_empty() {
        warn!("strain threshold removed every node");
    }

    filtered
}
