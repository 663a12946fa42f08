use json::JsonValue;
use log::info;
use nalgebra::Point3;

use crate::{
    datatypes::{
        AggMethod, GradientOrder, MeasurementMode, PlacementConfig, QualityMode, StrainThreshold,
        StrainUnit, Strategy, StrategyKind,
    },
    error::GaugeError,
    kmeans::DEFAULT_KMEANS_SEED,
};

/// Parses the configuration file into a JsonValue object
///
/// # Arguments
/// * `config_file` - The path to the configuration file
///
/// # Returns
/// A JsonValue object
pub fn load_config_file(config_file: &str) -> Result<JsonValue, GaugeError> {
    let file_string = match std::fs::read_to_string(config_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(GaugeError::Input(format!(
                "Unable to open configuration file {}",
                config_file
            )))
        }
    };

    match json::parse(&file_string) {
        Ok(f) => Ok(f),
        Err(err) => Err(GaugeError::InvalidConfiguration(format!(
            "Error in configuration json: {err}"
        ))),
    }
}

fn require<'a>(json: &'a JsonValue, key: &str, section: &str) -> Result<&'a JsonValue, GaugeError> {
    if !json.has_key(key) {
        return Err(GaugeError::InvalidConfiguration(format!(
            "Configuration missing {key} field{section}"
        )));
    }
    Ok(&json[key])
}

fn require_str<'a>(json: &'a JsonValue, key: &str, section: &str) -> Result<&'a str, GaugeError> {
    match require(json, key, section)?.as_str() {
        Some(s) => Ok(s),
        None => Err(GaugeError::InvalidConfiguration(format!(
            "Configuration field {key}{section} must be a string"
        ))),
    }
}

fn require_f64(json: &JsonValue, key: &str, section: &str) -> Result<f64, GaugeError> {
    match require(json, key, section)?.as_f64() {
        Some(v) => Ok(v),
        None => Err(GaugeError::InvalidConfiguration(format!(
            "Configuration field {key}{section} must be a number"
        ))),
    }
}

fn parse_strategy(strategy_json: &JsonValue) -> Result<Strategy, GaugeError> {
    const SECTION: &str = " in strategy section";
    let kind: StrategyKind = require_str(strategy_json, "name", SECTION)?.parse()?;

    let strategy = match kind {
        StrategyKind::GreedyQuality => Strategy::GreedyQuality {
            min_distance: require_f64(strategy_json, "min_distance", SECTION)?,
        },
        StrategyKind::KMeans => Strategy::KMeans,
        StrategyKind::FilteredKMeans => Strategy::FilteredKMeans {
            quality_percentile: require_f64(strategy_json, "quality_percentile", SECTION)?,
        },
        StrategyKind::GreedyGradient => {
            let order = match strategy_json["gradient_order"].as_str() {
                Some(s) => s.parse()?,
                None => GradientOrder::default(),
            };
            Strategy::GreedyGradient {
                min_distance: require_f64(strategy_json, "min_distance", SECTION)?,
                order,
            }
        }
        StrategyKind::Roi => {
            let center: Vec<f64> = require(strategy_json, "roi_center", SECTION)?
                .members()
                .map(|v| v.as_f64())
                .collect::<Option<Vec<f64>>>()
                .unwrap_or_default();
            if center.len() != 3 {
                return Err(GaugeError::InvalidConfiguration(
                    "roi_center must be an array of three numbers".to_owned(),
                ));
            }
            Strategy::Roi {
                center: Point3::new(center[0], center[1], center[2]),
                radius: require_f64(strategy_json, "roi_radius", SECTION)?,
                min_distance: require_f64(strategy_json, "min_distance", SECTION)?,
            }
        }
    };

    Ok(strategy)
}

fn parse_threshold(config_json: &JsonValue) -> Result<Option<StrainThreshold>, GaugeError> {
    const SECTION: &str = " in strain_threshold section";
    if !config_json.has_key("strain_threshold") {
        return Ok(None);
    }
    let threshold_json = &config_json["strain_threshold"];

    let enabled = match require(threshold_json, "enabled", SECTION)?.as_bool() {
        Some(b) => b,
        None => {
            return Err(GaugeError::InvalidConfiguration(
                "strain_threshold.enabled must be a boolean".to_owned(),
            ))
        }
    };
    if !enabled {
        return Ok(None);
    }

    Ok(Some(StrainThreshold {
        value_microstrain: require_f64(threshold_json, "value_microstrain", SECTION)?,
        agg: require_str(threshold_json, "agg", SECTION)?.parse()?,
    }))
}

/// Builds the placement configuration from the configuration json
///
/// # Arguments
/// * `config_json` - The configuration file as a JsonValue object
///
/// # Returns
/// A validated PlacementConfig instance
pub fn parse_placement_config(config_json: &JsonValue) -> Result<PlacementConfig, GaugeError> {
    let measurement_mode: MeasurementMode =
        require_str(config_json, "measurement_mode", "")?.parse()?;
    let quality_mode: QualityMode = require_str(config_json, "quality_mode", "")?.parse()?;
    let agg_method: AggMethod = require_str(config_json, "agg_method", "")?.parse()?;
    let uniformity_radius = require_f64(config_json, "uniformity_radius", "")?;

    let candidate_count = match require(config_json, "candidate_count", "")?.as_usize() {
        Some(c) => c,
        None => {
            return Err(GaugeError::InvalidConfiguration(
                "candidate_count must be a non-negative integer".to_owned(),
            ))
        }
    };

    let strategy = parse_strategy(require(config_json, "strategy", "")?)?;
    let strain_threshold = parse_threshold(config_json)?;

    let kmeans_seed = if config_json.has_key("kmeans_seed") {
        match config_json["kmeans_seed"].as_u64() {
            Some(s) => s,
            None => {
                return Err(GaugeError::InvalidConfiguration(
                    "kmeans_seed must be a non-negative integer".to_owned(),
                ))
            }
        }
    } else {
        DEFAULT_KMEANS_SEED
    };

    let config = PlacementConfig {
        measurement_mode,
        quality_mode,
        agg_method,
        uniformity_radius,
        strategy,
        candidate_count,
        strain_threshold,
        kmeans_seed,
    };
    validate(&config)?;

    info!(
        "loaded configuration: {:?} mode, {:?} quality, {} strategy, {} candidates",
        config.measurement_mode,
        config.quality_mode,
        config.strategy.name(),
        config.candidate_count
    );

    Ok(config)
}

/// Reads the unit of the strain files, defaulting to microstrain
pub fn parse_strain_unit(config_json: &JsonValue) -> Result<StrainUnit, GaugeError> {
    match config_json["strain_unit"].as_str() {
        Some(s) => s.parse(),
        None if config_json["strain_unit"].is_null() => Ok(StrainUnit::default()),
        None => Err(GaugeError::InvalidConfiguration(
            "strain_unit must be a string".to_owned(),
        )),
    }
}

/// Checks the numeric parameters of a configuration
pub fn validate(config: &PlacementConfig) -> Result<(), GaugeError> {
    fn invalid(message: String) -> Result<(), GaugeError> {
        Err(GaugeError::InvalidConfiguration(message))
    }

    if !(config.uniformity_radius.is_finite() && config.uniformity_radius > 0.0) {
        return invalid(format!(
            "uniformity_radius must be positive, got {}",
            config.uniformity_radius
        ));
    }
    if config.candidate_count == 0 {
        return invalid("candidate_count must be at least 1".to_owned());
    }
    if let Some(threshold) = &config.strain_threshold {
        if !threshold.value_microstrain.is_finite() {
            return invalid("strain threshold value must be finite".to_owned());
        }
    }

    let min_distance = match &config.strategy {
        Strategy::GreedyQuality { min_distance }
        | Strategy::GreedyGradient { min_distance, .. } => Some(*min_distance),
        Strategy::Roi {
            center,
            radius,
            min_distance,
        } => {
            if !center.coords.iter().all(|c| c.is_finite()) {
                return invalid("roi_center must be finite".to_owned());
            }
            if !(radius.is_finite() && *radius > 0.0) {
                return invalid(format!("roi_radius must be positive, got {radius}"));
            }
            Some(*min_distance)
        }
        Strategy::FilteredKMeans { quality_percentile } => {
            if !(0.0..=100.0).contains(quality_percentile) {
                return invalid(format!(
                    "quality_percentile must be within 0 and 100, got {quality_percentile}"
                ));
            }
            None
        }
        Strategy::KMeans => None,
    };

    if let Some(min_distance) = min_distance {
        if !(min_distance.is_finite() && min_distance >= 0.0) {
            return invalid(format!(
                "min_distance must be non-negative, got {min_distance}"
            ));
        }
    }

    Ok(())
}
