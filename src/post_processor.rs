use std::io::Write;

use log::info;

use crate::{
    datatypes::{Candidate, Node},
    error::GaugeError,
};

fn create(path: &str) -> Result<std::fs::File, GaugeError> {
    match std::fs::File::create(path) {
        Ok(f) => Ok(f),
        Err(err) => Err(GaugeError::PostProcessor(format!(
            "Failed to create {path}: {err}"
        ))),
    }
}

fn write_line(file: &mut std::fs::File, path: &str, line: String) -> Result<(), GaugeError> {
    match file.write_all(line.as_bytes()) {
        Ok(()) => Ok(()),
        Err(err) => Err(GaugeError::PostProcessor(format!(
            "Failed to write {path}: {err}"
        ))),
    }
}

/// Formats the candidate table as CSV, one row per candidate in selection
/// order. An undefined angle is left blank.
pub fn candidates_csv(candidates: &[Candidate]) -> String {
    let mut out = String::from("Node,X,Y,Z,Best_Strain,Best_Angle,Local_Std,Quality\n");
    for candidate in candidates {
        let record = &candidate.record;
        let angle = match record.best_angle {
            Some(a) => a.to_string(),
            None => String::new(),
        };
        out.push_str(&format!(
            "{node},{x},{y},{z},{strain},{angle},{std},{quality}\n",
            node = record.node.id,
            x = record.node.position.x,
            y = record.node.position.y,
            z = record.node.position.z,
            strain = record.best_strain,
            std = record.local_std,
            quality = record.quality,
        ));
    }
    out
}

/// Writes the selected candidates to a CSV file
///
/// # Arguments
/// * `candidates` - The candidates in selection order
/// * `output` - The filename of the output csv
pub fn csv_output(candidates: &[Candidate], output: &str) -> Result<(), GaugeError> {
    let mut file = create(output)?;
    write_line(&mut file, output, candidates_csv(candidates))?;

    info!("wrote {} candidates to {}", candidates.len(), output);

    Ok(())
}

/// Writes the clustering preview to a CSV file
///
/// # Arguments
/// * `nodes` - The clustered nodes
/// * `labels` - Cluster label of each node
/// * `output` - The filename of the output csv
pub fn preview_output(nodes: &[Node], labels: &[usize], output: &str) -> Result<(), GaugeError> {
    let mut file = create(output)?;

    write_line(&mut file, output, "Node,X,Y,Z,Cluster\n".to_owned())?;
    for (node, label) in std::iter::zip(nodes, labels) {
        write_line(
            &mut file,
            output,
            format!(
                "{id},{x},{y},{z},{label}\n",
                id = node.id,
                x = node.position.x,
                y = node.position.y,
                z = node.position.z,
            ),
        )?;
    }

    info!("wrote clustering preview of {} nodes to {}", nodes.len(), output);

    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;

    use super::*;
    use crate::datatypes::QualityRecord;

    fn candidate(rank: usize, angle: Option<f64>) -> Candidate {
        Candidate {
            rank,
            record: QualityRecord {
                node: Node {
                    id: 12,
                    position: Point3::new(1.0, 2.5, -3.0),
                },
                best_strain: -150.0,
                best_angle: angle,
                local_std: 2.0,
                quality: 50.0,
            },
        }
    }

    #[test]
    fn test_candidates_csv_columns() {
        let csv = candidates_csv(&[candidate(1, Some(45.0)), candidate(2, None)]);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Node,X,Y,Z,Best_Strain,Best_Angle,Local_Std,Quality");
        assert_eq!(lines[1], "12,1,2.5,-3,-150,45,2,50");
        assert_eq!(lines[2], "12,1,2.5,-3,-150,,2,50");
    }

    #[test]
    fn test_preview_output_writes_file() {
        let path = std::env::temp_dir().join("gaugeplace_preview_output_test.csv");
        let path = path.to_string_lossy().to_string();
        let nodes = vec![Node {
            id: 3,
            position: Point3::new(0.0, 1.0, 2.0),
        }];

        preview_output(&nodes, &[0], &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(written, "Node,X,Y,Z,Cluster\n3,0,1,2,0\n");
    }
}
