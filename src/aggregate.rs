use log::info;

use crate::{
    datatypes::{AggMethod, QualityTable},
    error::GaugeError,
};

/// Reduces the per-load-case quality tables into one table
///
/// Quality and local deviation are reduced node by node with `method`.
/// Coordinates, governing strain and angle come from the first load case.
///
/// # Arguments
/// * `tables` - One table per load case, all with the same node order
/// * `method` - The reduction to apply
///
/// # Returns
/// The aggregated table
pub fn aggregate(tables: &[QualityTable], method: AggMethod) -> Result<QualityTable, GaugeError> {
    let first = match tables.first() {
        Some(t) => t,
        None => {
            return Err(GaugeError::EmptyInput(
                "No load cases to aggregate".to_owned(),
            ))
        }
    };

    if tables.len() == 1 {
        return Ok(first.clone());
    }

    if let Some((i, t)) = tables.iter().enumerate().find(|(_, t)| t.len() != first.len()) {
        return Err(GaugeError::InvalidConfiguration(format!(
            "Load case {} has {} nodes, expected {}",
            i + 1,
            t.len(),
            first.len()
        )));
    }

    let mut aggregated = first.clone();
    for (row, record) in aggregated.iter_mut().enumerate() {
        let quality: Vec<f64> = tables.iter().map(|t| t[row].quality).collect();
        let local_std: Vec<f64> = tables.iter().map(|t| t[row].local_std).collect();

        record.quality = method.reduce(&quality);
        record.local_std = method.reduce(&local_std);
    }

    info!(
        "aggregated {} load cases over {} nodes ({:?})",
        tables.len(),
        aggregated.len(),
        method
    );

    Ok(aggregated)
}
