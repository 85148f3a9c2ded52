//! Predictions on new data and on synthetic covariate grids.
//!
//! Covariates are given on their raw scale; `scale()` terms are standardized
//! with the constants stored at fit time. A cluster level never seen during
//! fitting contributes a zero random effect, which is the population-level
//! prediction for that row.

use tracing::{debug, warn};

use mixlm_data::{Column, Dataset, PredictionGrid};

use crate::error::Result;
use crate::model::FittedModel;

/// Name of the column added by [`predict_grid`].
pub const PREDICTION_COLUMN: &str = "prediction";

/// Point predictions for every row of `data`.
///
/// With `include_random`, each row adds the BLUPs of its clusters; a term
/// whose grouping column is absent from `data` is left out with a warning.
/// Rows with a missing covariate predict NaN. A fixed-effect level unseen
/// at fit time is an error.
pub fn predict(model: &FittedModel, data: &Dataset, include_random: bool) -> Result<Vec<f64>> {
    let design = &model.design;
    let (x, complete) = design.fixed_matrix(data)?;
    let mut out = x.mat_vec(&model.beta);
    for (pred, ok) in out.iter_mut().zip(&complete) {
        if !ok {
            *pred = f64::NAN;
        }
    }
    if !include_random || design.random.is_empty() {
        return Ok(out);
    }

    let mut unseen = 0usize;
    for block in &design.random {
        if !data.has_column(&block.group) {
            warn!(
                "no '{}' column: predictions ignore the ({} | {}) random effects",
                block.group,
                block.coefficients.join(" + "),
                block.group
            );
            continue;
        }
        let rows = design.block_rows(block, data)?;
        let k = block.dim();
        for (r, pred) in out.iter_mut().enumerate() {
            if !rows.complete[r] {
                *pred = f64::NAN;
                continue;
            }
            match rows.level[r] {
                Some(l) => {
                    let start = block.offset + l * k;
                    let b = &model.random_effects[start..start + k];
                    *pred += (0..k).map(|j| rows.values.get(r, j) * b[j]).sum::<f64>();
                }
                None => unseen += 1,
            }
        }
    }
    if unseen > 0 {
        warn!(
            "{} row-term pairs have a cluster level not seen in fitting; using zero random effect",
            unseen
        );
    }
    Ok(out)
}

/// Expand `grid` and append a [`PREDICTION_COLUMN`] of predictions.
pub fn predict_grid(
    model: &FittedModel,
    grid: &PredictionGrid,
    include_random: bool,
) -> Result<Dataset> {
    let mut data = grid.build()?;
    let predictions = predict(model, &data, include_random)?;
    debug!("Predicted {} grid rows", predictions.len());
    data.push_column(PREDICTION_COLUMN, Column::Numeric(predictions))?;
    Ok(data)
}
