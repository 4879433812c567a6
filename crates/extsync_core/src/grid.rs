use serde::{Deserialize, Serialize};

use crate::contract::{NormalizedPlan, ValidationError};
use crate::filename::FileNameParams;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterPoint {
    pub index: usize,
    pub values: FileNameParams,
}

impl ParameterPoint {
    pub fn with_trial(&self, trial: i64) -> FileNameParams {
        let mut values = self.values.clone();
        values.insert(crate::contract::TRIAL_FIELD.to_string(), trial);
        values
    }
}

/// Expands the plan's dimensions into their cartesian product.
///
/// Dimensions are visited in name order and the last one varies fastest, so
/// identical plans always yield identical point indices.
pub fn compute_parameter_points(
    plan: &NormalizedPlan,
) -> Result<Vec<ParameterPoint>, ValidationError> {
    let dimensions: Vec<(&String, &Vec<i64>)> = plan.dimensions.iter().collect();
    let mut points = Vec::with_capacity(plan.total_points);

    for index in 0..plan.total_points {
        let mut remainder = index;
        let mut values = FileNameParams::new();
        for (name, options) in dimensions.iter().rev() {
            values.insert((*name).clone(), options[remainder % options.len()]);
            remainder /= options.len();
        }
        points.push(ParameterPoint { index, values });
    }

    validate_points(plan, &points)?;
    Ok(points)
}

fn validate_points(plan: &NormalizedPlan, points: &[ParameterPoint]) -> Result<(), ValidationError> {
    if points.is_empty() {
        return Err(ValidationError::new("No parameter points to run"));
    }

    if points.len() != plan.total_points {
        return Err(ValidationError::new(format!(
            "Expanded {} points but the plan declares {}",
            points.len(),
            plan.total_points
        )));
    }

    for (position, point) in points.iter().enumerate() {
        if point.index != position || point.values.len() != plan.dimensions.len() {
            return Err(ValidationError::new(
                "Parameter points are out of order or incomplete",
            ));
        }
    }

    Ok(())
}
