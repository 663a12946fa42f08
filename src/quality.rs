use crate::{datatypes::QualityMode, stats::percentile};

/// Percentile of the positive local deviations used to calibrate the
/// quality formulas
pub const SIGMA_REF_PERCENTILE: f64 = 75.0;

/// Calibration constants derived from the local deviations of a dataset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub sigma_ref: f64,
    /// Attenuation constant of the exponential formula
    pub k: f64,
    /// Noise floor of the signal-to-noise formula
    pub eps0: f64,
}

impl Calibration {
    pub fn from_local_std(local_std: &[f64]) -> Calibration {
        let positive: Vec<f64> = local_std.iter().copied().filter(|s| *s > 0.0).collect();
        let sigma_ref = percentile(&positive, SIGMA_REF_PERCENTILE).unwrap_or(1.0);

        let k = if sigma_ref > 0.0 {
            -(0.5f64.ln()) / sigma_ref
        } else {
            0.0
        };

        Calibration {
            sigma_ref,
            k,
            eps0: f64::max(1.0, 0.01 * sigma_ref),
        }
    }
}

/// Scores a single node
pub fn score(best_strain: f64, local_std: f64, mode: QualityMode, calibration: &Calibration) -> f64 {
    let magnitude = best_strain.abs();

    match mode {
        QualityMode::Default => magnitude / (1.0 + local_std),
        QualityMode::Squared => magnitude / (1.0 + local_std * local_std),
        QualityMode::Exponential => magnitude * (-calibration.k * local_std).exp(),
        QualityMode::SignalToNoise => magnitude / (local_std + calibration.eps0),
    }
}

/// Scores every node of a load case
///
/// # Arguments
/// * `best_strain` - Governing strain per node
/// * `local_std` - Local standard deviation per node, same order
/// * `mode` - The quality formula
///
/// # Returns
/// One quality value per node
pub fn compute_quality(best_strain: &[f64], local_std: &[f64], mode: QualityMode) -> Vec<f64> {
    let calibration = Calibration::from_local_std(local_std);

    std::iter::zip(best_strain, local_std)
        .map(|(strain, std)| score(*strain, *std, mode, &calibration))
        .collect()
}
