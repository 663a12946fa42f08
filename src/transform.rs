use crate::datatypes::{MeasurementMode, StrainTensor};

pub const ANGLE_STEP_DEG: f64 = 15.0;
pub const ANGLE_MAX_DEG: f64 = 165.0;

/// Probe angles in degrees for the given measurement mode. Rosette mode has
/// a single synthetic angle slot.
pub fn probe_angles(mode: MeasurementMode) -> Vec<f64> {
    match mode {
        MeasurementMode::Rosette => vec![0.0],
        MeasurementMode::Uniaxial => {
            let steps = (ANGLE_MAX_DEG / ANGLE_STEP_DEG).round() as usize;
            (0..=steps).map(|i| i as f64 * ANGLE_STEP_DEG).collect()
        }
    }
}

/// Normal strain along a direction rotated `angle_deg` from the x-axis
pub fn normal_strain(strain: &StrainTensor, angle_deg: f64) -> f64 {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    strain.exx * cos * cos + strain.eyy * sin * sin + strain.gxy * sin * cos
}

/// Rotation-invariant planar equivalent strain (von Mises form)
pub fn equivalent_strain(strain: &StrainTensor) -> f64 {
    let half_shear = strain.gxy / 2.0;
    (strain.exx.powi(2) - strain.exx * strain.eyy + strain.eyy.powi(2) + 3.0 * half_shear.powi(2))
        .max(0.0)
        .sqrt()
}

/// Evaluates the directional strain table of a node
///
/// # Returns
/// One value per entry of `probe_angles(mode)`
pub fn directional_strains(strain: &StrainTensor, mode: MeasurementMode) -> Vec<f64> {
    match mode {
        MeasurementMode::Rosette => vec![equivalent_strain(strain)],
        MeasurementMode::Uniaxial => probe_angles(mode)
            .iter()
            .map(|angle| normal_strain(strain, *angle))
            .collect(),
    }
}

/// Finds the governing strain of a node
///
/// # Returns
/// The signed strain with the largest magnitude and the angle it occurs at.
/// The angle is None in rosette mode. Ties keep the lowest angle.
pub fn governing_strain(strain: &StrainTensor, mode: MeasurementMode) -> (f64, Option<f64>) {
    let values = directional_strains(strain, mode);

    let mut best_index = 0;
    for (i, value) in values.iter().enumerate() {
        if value.abs() > values[best_index].abs() {
            best_index = i;
        }
    }

    let angle = match mode {
        MeasurementMode::Rosette => None,
        MeasurementMode::Uniaxial => Some(best_index as f64 * ANGLE_STEP_DEG),
    };

    (values[best_index], angle)
}
