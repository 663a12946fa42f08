use std::str::FromStr;

use nalgebra::Point3;

use crate::error::GaugeError;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    /// Position in millimeters
    pub position: Point3<f64>,
}

/// Planar strain at a node. `gxy` is the engineering shear strain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StrainTensor {
    pub exx: f64,
    pub eyy: f64,
    pub gxy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrainUnit {
    #[default]
    Microstrain,
    Strain,
}

impl StrainUnit {
    /// Factor converting one microstrain into this unit
    pub fn per_microstrain(&self) -> f64 {
        match self {
            StrainUnit::Microstrain => 1.0,
            StrainUnit::Strain => 1e-6,
        }
    }
}

impl FromStr for StrainUnit {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "microstrain" | "ue" | "µε" => Ok(StrainUnit::Microstrain),
            "strain" => Ok(StrainUnit::Strain),
            other => Err(GaugeError::InvalidConfiguration(format!(
                "Unknown strain unit '{other}'"
            ))),
        }
    }
}

/// A strain field sampled at mesh nodes for one or more load cases.
///
/// Every entry of `load_cases` holds one tensor per node, in the same order
/// as `nodes`.
#[derive(Debug, Clone, Default)]
pub struct StrainDataset {
    pub nodes: Vec<Node>,
    pub load_cases: Vec<Vec<StrainTensor>>,
    pub unit: StrainUnit,
}

/// Scoring result for a single node
#[derive(Debug, Clone, PartialEq)]
pub struct QualityRecord {
    pub node: Node,
    pub best_strain: f64,
    /// Governing probe angle in degrees; `None` for rotation-invariant metrics
    pub best_angle: Option<f64>,
    pub local_std: f64,
    pub quality: f64,
}

/// One record per node. Used both per load case and after aggregation.
pub type QualityTable = Vec<QualityRecord>;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// 1-based selection order
    pub rank: usize,
    pub record: QualityRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementMode {
    Rosette,
    Uniaxial,
}

impl FromStr for MeasurementMode {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rosette" => Ok(MeasurementMode::Rosette),
            "uniaxial" => Ok(MeasurementMode::Uniaxial),
            other => Err(GaugeError::InvalidConfiguration(format!(
                "Unknown measurement mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMode {
    Default,
    Squared,
    Exponential,
    SignalToNoise,
}

impl FromStr for QualityMode {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(QualityMode::Default),
            "squared" => Ok(QualityMode::Squared),
            "exponential" => Ok(QualityMode::Exponential),
            "signal-to-noise" | "signal_to_noise" | "snr" => Ok(QualityMode::SignalToNoise),
            other => Err(GaugeError::InvalidConfiguration(format!(
                "Unknown quality formula '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggMethod {
    Max,
    Average,
}

impl AggMethod {
    /// Reduces a non-empty slice of values
    pub fn reduce(&self, values: &[f64]) -> f64 {
        match self {
            AggMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggMethod::Average => values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

impl FromStr for AggMethod {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "max" => Ok(AggMethod::Max),
            "average" | "mean" => Ok(AggMethod::Average),
            other => Err(GaugeError::InvalidConfiguration(format!(
                "Unknown aggregation method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientOrder {
    #[default]
    Maximize,
    Minimize,
}

impl FromStr for GradientOrder {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "maximize" | "max" => Ok(GradientOrder::Maximize),
            "minimize" | "min" => Ok(GradientOrder::Minimize),
            other => Err(GaugeError::InvalidConfiguration(format!(
                "Unknown gradient order '{other}'"
            ))),
        }
    }
}

/// Candidate selection strategy together with its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    GreedyQuality {
        min_distance: f64,
    },
    KMeans,
    FilteredKMeans {
        quality_percentile: f64,
    },
    GreedyGradient {
        min_distance: f64,
        order: GradientOrder,
    },
    Roi {
        center: Point3<f64>,
        radius: f64,
        min_distance: f64,
    },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::GreedyQuality { .. } => "GreedyQuality",
            Strategy::KMeans => "KMeans",
            Strategy::FilteredKMeans { .. } => "FilteredKMeans",
            Strategy::GreedyGradient { .. } => "GreedyGradient",
            Strategy::Roi { .. } => "ROI",
        }
    }
}

/// Strategy names as they appear in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    GreedyQuality,
    KMeans,
    FilteredKMeans,
    GreedyGradient,
    Roi,
}

impl FromStr for StrategyKind {
    type Err = GaugeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "greedyquality" | "greedy_quality" => Ok(StrategyKind::GreedyQuality),
            "kmeans" | "k_means" => Ok(StrategyKind::KMeans),
            "filteredkmeans" | "filtered_kmeans" => Ok(StrategyKind::FilteredKMeans),
            "greedygradient" | "greedy_gradient" => Ok(StrategyKind::GreedyGradient),
            "roi" => Ok(StrategyKind::Roi),
            other => Err(GaugeError::InvalidConfiguration(format!(
                "Unknown selection strategy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrainThreshold {
    pub value_microstrain: f64,
    pub agg: AggMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementConfig {
    pub measurement_mode: MeasurementMode,
    pub quality_mode: QualityMode,
    pub agg_method: AggMethod,
    /// Neighborhood radius in millimeters for the variability estimate
    pub uniformity_radius: f64,
    pub strategy: Strategy,
    pub candidate_count: usize,
    /// `None` when threshold filtering is disabled
    pub strain_threshold: Option<StrainThreshold>,
    pub kmeans_seed: u64,
}
