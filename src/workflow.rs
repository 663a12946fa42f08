use log::info;
use nalgebra::Point3;

use crate::{
    aggregate::aggregate,
    config::validate,
    datatypes::{
        Candidate, Node, PlacementConfig, QualityRecord, QualityTable, StrainDataset,
        StrainTensor, Strategy,
    },
    error::GaugeError,
    filter::apply_threshold,
    kmeans::KMeans,
    quality::compute_quality,
    selector::select,
    transform::governing_strain,
    variability::LocalVariabilityEstimator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Running,
    Preview,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Raw geometric clustering awaiting confirmation. `labels[i]` is the
    /// cluster of `nodes[i]`.
    Preview {
        nodes: Vec<Node>,
        labels: Vec<usize>,
    },
    Complete {
        candidates: Vec<Candidate>,
    },
}

/// Combines the load cases of several datasets into one
///
/// Load cases are appended in input order. Geometry comes from the first
/// dataset; the others must describe the same number of nodes.
pub fn merge_datasets(datasets: &[StrainDataset]) -> Result<StrainDataset, GaugeError> {
    let first = match datasets.first() {
        Some(d) => d,
        None => return Err(GaugeError::EmptyInput("No strain datasets given".to_owned())),
    };

    let mut merged = StrainDataset {
        nodes: first.nodes.clone(),
        load_cases: Vec::new(),
        unit: first.unit,
    };

    for (i, dataset) in datasets.iter().enumerate() {
        if dataset.nodes.len() != first.nodes.len() {
            return Err(GaugeError::InvalidConfiguration(format!(
                "Dataset {} has {} nodes but the first has {}",
                i + 1,
                dataset.nodes.len(),
                first.nodes.len()
            )));
        }
        if dataset.unit != first.unit {
            return Err(GaugeError::InvalidConfiguration(format!(
                "Dataset {} uses {:?} but the first uses {:?}",
                i + 1,
                dataset.unit,
                first.unit
            )));
        }
        merged.load_cases.extend(dataset.load_cases.iter().cloned());
    }

    if merged.nodes.is_empty() {
        return Err(GaugeError::EmptyInput("Strain field has no nodes".to_owned()));
    }
    if merged.load_cases.is_empty() {
        return Err(GaugeError::EmptyInput("Strain field has no load cases".to_owned()));
    }
    if let Some(i) = merged
        .load_cases
        .iter()
        .position(|case| case.len() != merged.nodes.len())
    {
        return Err(GaugeError::InvalidConfiguration(format!(
            "Load case {} has {} strain entries for {} nodes",
            i + 1,
            merged.load_cases[i].len(),
            merged.nodes.len()
        )));
    }

    Ok(merged)
}

/// Scores every node of one load case
///
/// # Arguments
/// * `nodes` - The mesh nodes
/// * `strains` - Strain tensor per node, same order as `nodes`
/// * `config` - The run configuration
/// * `estimator` - The run's variability estimator
///
/// # Returns
/// The quality table of the load case
pub fn score_load_case(
    nodes: &[Node],
    strains: &[StrainTensor],
    config: &PlacementConfig,
    estimator: &mut LocalVariabilityEstimator,
) -> QualityTable {
    let governing: Vec<(f64, Option<f64>)> = strains
        .iter()
        .map(|s| governing_strain(s, config.measurement_mode))
        .collect();
    let best_strain: Vec<f64> = governing.iter().map(|(strain, _)| *strain).collect();

    let positions: Vec<Point3<f64>> = nodes.iter().map(|n| n.position).collect();
    let local_std = estimator.estimate(&positions, &best_strain, config.uniformity_radius);
    let quality = compute_quality(&best_strain, &local_std, config.quality_mode);

    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| QualityRecord {
            node: node.clone(),
            best_strain: governing[i].0,
            best_angle: governing[i].1,
            local_std: local_std[i],
            quality: quality[i],
        })
        .collect()
}

/// Drives one placement run at a time.
///
/// A K-Means run first stops in `Preview` with a purely geometric
/// clustering; calling `run` again with `is_continued` set performs the
/// full scoring and selection.
#[derive(Debug)]
pub struct Orchestrator {
    state: WorkflowState,
    estimator: LocalVariabilityEstimator,
    preview_labels: Option<Vec<usize>>,
    last_error: Option<String>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Orchestrator {
        Orchestrator {
            state: WorkflowState::Idle,
            estimator: LocalVariabilityEstimator::new(),
            preview_labels: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Message of the failure that moved the workflow to `Failed`
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn preview_labels(&self) -> Option<&[usize]> {
        self.preview_labels.as_deref()
    }

    /// Nodes of the last run that used the k-nearest fallback
    pub fn fallback_count(&self) -> usize {
        self.estimator.fallback_count()
    }

    /// Nodes evaluated by the variability estimator in the last run
    pub fn total_count(&self) -> usize {
        self.estimator.total_count()
    }

    /// Runs the placement pipeline
    ///
    /// # Arguments
    /// * `datasets` - Strain fields to merge, in input order
    /// * `config` - The run configuration
    /// * `is_continued` - Resume past the K-Means preview
    ///
    /// # Returns
    /// A preview or the selected candidates. On error the workflow moves to
    /// `Failed` and nothing is returned.
    pub fn run(
        &mut self,
        datasets: &[StrainDataset],
        config: &PlacementConfig,
        is_continued: bool,
    ) -> Result<RunOutcome, GaugeError> {
        self.state = WorkflowState::Running;
        self.last_error = None;
        self.estimator.reset();

        match self.execute(datasets, config, is_continued) {
            Ok(outcome) => {
                match &outcome {
                    RunOutcome::Preview { labels, .. } => {
                        self.preview_labels = Some(labels.clone());
                        self.state = WorkflowState::Preview;
                    }
                    RunOutcome::Complete { .. } => {
                        self.preview_labels = None;
                        self.state = WorkflowState::Complete;
                    }
                }
                Ok(outcome)
            }
            Err(err) => {
                self.state = WorkflowState::Failed;
                self.last_error = Some(err.to_string());
                self.preview_labels = None;
                Err(err)
            }
        }
    }

    fn execute(
        &mut self,
        datasets: &[StrainDataset],
        config: &PlacementConfig,
        is_continued: bool,
    ) -> Result<RunOutcome, GaugeError> {
        validate(config)?;
        let dataset = merge_datasets(datasets)?;
        info!(
            "running placement over {} nodes and {} load cases",
            dataset.nodes.len(),
            dataset.load_cases.len()
        );

        if config.strategy == Strategy::KMeans && !is_continued {
            let positions: Vec<Point3<f64>> = dataset.nodes.iter().map(|n| n.position).collect();
            let n_clusters = config.candidate_count.min(positions.len());
            let labels = KMeans::new(n_clusters, config.kmeans_seed).fit(&positions);
            info!("clustering preview ready with {n_clusters} clusters; awaiting confirmation");

            return Ok(RunOutcome::Preview {
                nodes: dataset.nodes,
                labels,
            });
        }

        let per_case: Vec<QualityTable> = dataset
            .load_cases
            .iter()
            .map(|strains| score_load_case(&dataset.nodes, strains, config, &mut self.estimator))
            .collect();

        let mut table = aggregate(&per_case, config.agg_method)?;
        if let Some(threshold) = &config.strain_threshold {
            table = apply_threshold(table, &per_case, threshold, dataset.unit);
        }

        let candidates = select(
            &table,
            &config.strategy,
            config.candidate_count,
            config.kmeans_seed,
        );

        Ok(RunOutcome::Complete { candidates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{AggMethod, MeasurementMode, QualityMode, StrainThreshold, StrainUnit};

    fn config(strategy: Strategy) -> PlacementConfig {
        PlacementConfig {
            measurement_mode: MeasurementMode::Uniaxial,
            quality_mode: QualityMode::Default,
            agg_method: AggMethod::Max,
            uniformity_radius: 1.5,
            strategy,
            candidate_count: 4,
            strain_threshold: None,
            kmeans_seed: 42,
        }
    }

    /// 6x6 plate at 1 mm pitch with a strain peak near one corner
    fn plate(scale: f64) -> StrainDataset {
        let mut dataset = StrainDataset {
            unit: StrainUnit::Microstrain,
            ..Default::default()
        };
        let mut case = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let (x, y) = (i as f64, j as f64);
                dataset.nodes.push(Node {
                    id: (i * 6 + j) as i64 + 1,
                    position: Point3::new(x, y, 0.0),
                });
                let peak = scale * 500.0 / (1.0 + x * x + y * y);
                case.push(StrainTensor {
                    exx: peak,
                    eyy: -0.3 * peak,
                    gxy: 0.1 * x,
                });
            }
        }
        dataset.load_cases.push(case);
        dataset
    }

    #[test]
    fn test_fallback_example() {
        let mut dataset = StrainDataset::default();
        for (i, x) in [0.0, 1.0, 100.0].iter().enumerate() {
            dataset.nodes.push(Node {
                id: i as i64 + 1,
                position: Point3::new(*x, 0.0, 0.0),
            });
        }
        dataset.load_cases.push(
            [10.0, 12.0, 9.0]
                .iter()
                .map(|e| StrainTensor {
                    exx: *e,
                    eyy: 0.0,
                    gxy: 0.0,
                })
                .collect(),
        );

        let mut cfg = config(Strategy::GreedyQuality { min_distance: 0.0 });
        cfg.uniformity_radius = 2.0;

        let mut orchestrator = Orchestrator::new();
        orchestrator.run(&[dataset.clone()], &cfg, false).unwrap();
        assert_eq!(orchestrator.fallback_count(), 1);
        assert_eq!(orchestrator.total_count(), 3);

        // counters are reset between runs
        orchestrator.run(&[dataset], &cfg, false).unwrap();
        assert_eq!(orchestrator.fallback_count(), 1);
    }

    #[test]
    fn test_greedy_run_completes() {
        let mut orchestrator = Orchestrator::new();
        assert_eq!(orchestrator.state(), WorkflowState::Idle);

        let outcome = orchestrator
            .run(&[plate(1.0)], &config(Strategy::GreedyQuality { min_distance: 2.0 }), false)
            .unwrap();

        assert_eq!(orchestrator.state(), WorkflowState::Complete);
        match outcome {
            RunOutcome::Complete { candidates } => {
                assert_eq!(candidates.len(), 4);
                assert_eq!(candidates[0].rank, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_kmeans_preview_then_continue() {
        let mut orchestrator = Orchestrator::new();
        let cfg = config(Strategy::KMeans);

        let preview = orchestrator.run(&[plate(1.0)], &cfg, false).unwrap();
        assert_eq!(orchestrator.state(), WorkflowState::Preview);
        match &preview {
            RunOutcome::Preview { nodes, labels } => {
                assert_eq!(nodes.len(), 36);
                assert_eq!(labels.len(), 36);
                assert!(labels.iter().all(|l| *l < 4));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(orchestrator.preview_labels().map(|l| l.len()), Some(36));
        // preview does not score
        assert_eq!(orchestrator.total_count(), 0);

        let complete = orchestrator.run(&[plate(1.0)], &cfg, true).unwrap();
        assert_eq!(orchestrator.state(), WorkflowState::Complete);
        assert!(orchestrator.preview_labels().is_none());
        match complete {
            RunOutcome::Complete { candidates } => assert_eq!(candidates.len(), 4),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_failure_reports_single_message() {
        let mut orchestrator = Orchestrator::new();
        let mut cfg = config(Strategy::GreedyQuality { min_distance: 1.0 });
        cfg.uniformity_radius = -1.0;

        let result = orchestrator.run(&[plate(1.0)], &cfg, false);
        assert!(matches!(result, Err(GaugeError::InvalidConfiguration(_))));
        assert_eq!(orchestrator.state(), WorkflowState::Failed);
        assert!(orchestrator.last_error().is_some());

        let result = orchestrator.run(&[], &config(Strategy::KMeans), false);
        assert!(matches!(result, Err(GaugeError::EmptyInput(_))));
        assert_eq!(orchestrator.state(), WorkflowState::Failed);
    }

    #[test]
    fn test_merge_appends_load_cases() {
        let merged = merge_datasets(&[plate(1.0), plate(2.0)]).unwrap();
        assert_eq!(merged.load_cases.len(), 2);
        assert_eq!(merged.nodes, plate(1.0).nodes);

        let mut short = plate(1.0);
        short.nodes.pop();
        short.load_cases[0].pop();
        assert!(matches!(
            merge_datasets(&[plate(1.0), short]),
            Err(GaugeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_dataset_without_nodes_is_empty_input() {
        let header_only = crate::input::parse_strain_csv(
            "node,x,y,z,exx,eyy,gxy\n",
            "header.csv",
            StrainUnit::Microstrain,
        )
        .unwrap();

        assert!(matches!(
            merge_datasets(&[header_only.clone()]),
            Err(GaugeError::EmptyInput(_))
        ));

        let mut orchestrator = Orchestrator::new();
        let result = orchestrator.run(
            &[header_only],
            &config(Strategy::GreedyQuality { min_distance: 1.0 }),
            false,
        );
        assert!(matches!(result, Err(GaugeError::EmptyInput(_))));
        assert_eq!(orchestrator.state(), WorkflowState::Failed);
        assert!(orchestrator.last_error().is_some());
    }

    #[test]
    fn test_threshold_removing_everything_is_empty_result() {
        let mut cfg = config(Strategy::GreedyQuality { min_distance: 1.0 });
        cfg.strain_threshold = Some(StrainThreshold {
            value_microstrain: 1e9,
            agg: AggMethod::Average,
        });

        let mut orchestrator = Orchestrator::new();
        let outcome = orchestrator.run(&[plate(1.0)], &cfg, false).unwrap();
        assert_eq!(outcome, RunOutcome::Complete { candidates: Vec::new() });
        assert_eq!(orchestrator.state(), WorkflowState::Complete);
    }

    #[test]
    fn test_roi_outside_returns_empty() {
        let cfg = config(Strategy::Roi {
            center: Point3::new(1000.0, 0.0, 0.0),
            radius: 1.0,
            min_distance: 0.0,
        });
        let mut orchestrator = Orchestrator::new();
        let outcome = orchestrator.run(&[plate(1.0)], &cfg, false).unwrap();
        assert_eq!(outcome, RunOutcome::Complete { candidates: Vec::new() });
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let datasets = [plate(1.0), plate(1.7)];
        for strategy in [
            Strategy::GreedyQuality { min_distance: 1.5 },
            Strategy::FilteredKMeans {
                quality_percentile: 50.0,
            },
        ] {
            let mut cfg = config(strategy);
            cfg.agg_method = AggMethod::Average;
            let mut orchestrator = Orchestrator::new();
            let first = orchestrator.run(&datasets, &cfg, true).unwrap();
            let second = orchestrator.run(&datasets, &cfg, true).unwrap();
            assert_eq!(first, second);
        }
    }
}
