use log::info;
use nalgebra::Point3;

use crate::{
    datatypes::{Node, StrainDataset, StrainTensor, StrainUnit},
    error::GaugeError,
};

/// Column positions of one load case's strain components
struct LoadCaseColumns {
    exx: usize,
    eyy: usize,
    gxy: usize,
}

fn column(headers: &[&str], name: &str, csv_file: &str) -> Result<usize, GaugeError> {
    match headers.iter().position(|h| h.eq_ignore_ascii_case(name)) {
        Some(i) => Ok(i),
        None => Err(GaugeError::Input(format!(
            "Error in csv file {csv_file}: missing {name} column"
        ))),
    }
}

/// Finds the strain columns of every load case in the header. A bare
/// `exx,eyy,gxy` triple is a single load case; suffixed `exx_<k>` columns
/// are ordered by first appearance.
fn load_case_columns(headers: &[&str], csv_file: &str) -> Result<Vec<LoadCaseColumns>, GaugeError> {
    if headers.iter().any(|h| h.eq_ignore_ascii_case("exx")) {
        return Ok(vec![LoadCaseColumns {
            exx: column(headers, "exx", csv_file)?,
            eyy: column(headers, "eyy", csv_file)?,
            gxy: column(headers, "gxy", csv_file)?,
        }]);
    }

    let mut columns = Vec::new();
    for header in headers {
        let lower = header.to_lowercase();
        if let Some(suffix) = lower.strip_prefix("exx_") {
            columns.push(LoadCaseColumns {
                exx: column(headers, &format!("exx_{suffix}"), csv_file)?,
                eyy: column(headers, &format!("eyy_{suffix}"), csv_file)?,
                gxy: column(headers, &format!("gxy_{suffix}"), csv_file)?,
            });
        }
    }

    if columns.is_empty() {
        return Err(GaugeError::Input(format!(
            "Error in csv file {csv_file}: no exx/eyy/gxy strain columns"
        )));
    }

    Ok(columns)
}

/// Parses CSV text holding a nodal strain field
///
/// # Arguments
/// * `contents` - The CSV text
/// * `csv_file` - Name of the source, used in error messages
/// * `unit` - Unit of the strain columns
///
/// # Returns
/// A StrainDataset with one tensor table per load case
pub fn parse_strain_csv(
    contents: &str,
    csv_file: &str,
    unit: StrainUnit,
) -> Result<StrainDataset, GaugeError> {
    let mut lines = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let headers: Vec<&str> = match lines.next() {
        Some((_, line)) => line.split(',').map(|h| h.trim()).collect(),
        None => {
            return Err(GaugeError::EmptyInput(format!(
                "Csv file {csv_file} is empty"
            )))
        }
    };

    let node_index = column(&headers, "node", csv_file)?;
    let x_index = column(&headers, "x", csv_file)?;
    let y_index = column(&headers, "y", csv_file)?;
    let z_index = column(&headers, "z", csv_file)?;
    let case_columns = load_case_columns(&headers, csv_file)?;

    let mut dataset = StrainDataset {
        nodes: Vec::new(),
        load_cases: vec![Vec::new(); case_columns.len()],
        unit,
    };

    for (line_number, line) in lines {
        let cells: Vec<&str> = line.split(',').map(|c| c.trim()).collect();
        if cells.len() != headers.len() {
            return Err(GaugeError::Input(format!(
                "Error in csv file {csv_file} line {}: expected {} values, found {}",
                line_number + 1,
                headers.len(),
                cells.len()
            )));
        }

        let mut values: Vec<f64> = Vec::with_capacity(cells.len());
        for (i, cell) in cells.iter().enumerate() {
            if i == node_index {
                // node ids are read as integers below
                values.push(0.0);
                continue;
            }
            match cell.parse::<f64>() {
                Ok(v) if v.is_finite() => values.push(v),
                _ => {
                    return Err(GaugeError::Input(format!(
                        "Error in csv file {csv_file} line {}: non-numeric value '{}'",
                        line_number + 1,
                        cell
                    )))
                }
            }
        }

        let id = match cells[node_index].parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                return Err(GaugeError::Input(format!(
                    "Error in csv file {csv_file} line {}: node id '{}' is not an integer",
                    line_number + 1,
                    cells[node_index]
                )))
            }
        };

        dataset.nodes.push(Node {
            id,
            position: Point3::new(values[x_index], values[y_index], values[z_index]),
        });
        for (case, columns) in dataset.load_cases.iter_mut().zip(&case_columns) {
            case.push(StrainTensor {
                exx: values[columns.exx],
                eyy: values[columns.eyy],
                gxy: values[columns.gxy],
            });
        }
    }

    Ok(dataset)
}

/// Reads a strain CSV file
///
/// # Arguments
/// * `csv_file` - The path to the csv file
/// * `unit` - Unit of the strain columns
pub fn read_strain_csv(csv_file: &str, unit: StrainUnit) -> Result<StrainDataset, GaugeError> {
    let contents = match std::fs::read_to_string(csv_file) {
        Ok(c) => c,
        Err(_err) => {
            return Err(GaugeError::Input(format!(
                "Unable to open csv file {}",
                csv_file
            )))
        }
    };

    let dataset = parse_strain_csv(&contents, csv_file, unit)?;
    info!(
        "read {} nodes and {} load cases from {}",
        dataset.nodes.len(),
        dataset.load_cases.len(),
        csv_file
    );

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_load_case() {
        let csv = "node,x,y,z,exx,eyy,gxy\n1,0,0,0,10,20,5\n2,1.5,0,0,-3,4,0\n";
        let dataset = parse_strain_csv(csv, "single.csv", StrainUnit::Microstrain).unwrap();

        assert_eq!(dataset.nodes.len(), 2);
        assert_eq!(dataset.nodes[1].id, 2);
        assert_eq!(dataset.nodes[1].position, Point3::new(1.5, 0.0, 0.0));
        assert_eq!(dataset.load_cases.len(), 1);
        assert_eq!(
            dataset.load_cases[0][0],
            StrainTensor {
                exx: 10.0,
                eyy: 20.0,
                gxy: 5.0
            }
        );
    }

    #[test]
    fn test_node_ids_must_be_integers() {
        let fractional = "node,x,y,z,exx,eyy,gxy\n1.9,0,0,0,1,1,1\n";
        assert!(matches!(
            parse_strain_csv(fractional, "ids.csv", StrainUnit::Microstrain),
            Err(GaugeError::Input(_))
        ));

        let large = "node,x,y,z,exx,eyy,gxy\n9007199254740993,0,0,0,1,1,1\n";
        let dataset = parse_strain_csv(large, "ids.csv", StrainUnit::Microstrain).unwrap();
        assert_eq!(dataset.nodes[0].id, 9_007_199_254_740_993);
    }

    #[test]
    fn test_header_only_has_no_nodes() {
        let dataset =
            parse_strain_csv("node,x,y,z,exx,eyy,gxy\n", "header.csv", StrainUnit::Microstrain)
                .unwrap();
        assert!(dataset.nodes.is_empty());
        assert_eq!(dataset.load_cases, vec![Vec::new()]);
    }

    #[test]
    fn test_multiple_load_cases_in_header_order() {
        let csv = "node,x,y,z,exx_2,eyy_2,gxy_2,exx_1,eyy_1,gxy_1\n\
                   7,0,0,0,1,2,3,4,5,6\n";
        let dataset = parse_strain_csv(csv, "multi.csv", StrainUnit::Strain).unwrap();

        assert_eq!(dataset.unit, StrainUnit::Strain);
        assert_eq!(dataset.load_cases.len(), 2);
        assert_eq!(dataset.load_cases[0][0].exx, 1.0);
        assert_eq!(dataset.load_cases[1][0].gxy, 6.0);
    }

    #[test]
    fn test_malformed_rows() {
        let missing = "node,x,y,exx,eyy,gxy\n1,0,0,1,1,1\n";
        assert!(matches!(
            parse_strain_csv(missing, "bad.csv", StrainUnit::Microstrain),
            Err(GaugeError::Input(_))
        ));

        let ragged = "node,x,y,z,exx,eyy,gxy\n1,0,0,0,1,1\n";
        assert!(parse_strain_csv(ragged, "bad.csv", StrainUnit::Microstrain).is_err());

        let text = "node,x,y,z,exx,eyy,gxy\n1,0,0,0,abc,1,1\n";
        assert!(parse_strain_csv(text, "bad.csv", StrainUnit::Microstrain).is_err());

        for cell in ["nan", "NaN", "inf", "-inf"] {
            let csv = format!("node,x,y,z,exx,eyy,gxy\n1,0,0,0,{cell},1,1\n");
            assert!(matches!(
                parse_strain_csv(&csv, "nonfinite.csv", StrainUnit::Microstrain),
                Err(GaugeError::Input(_))
            ));
        }

        assert!(matches!(
            parse_strain_csv("", "empty.csv", StrainUnit::Microstrain),
            Err(GaugeError::EmptyInput(_))
        ));
    }
}
