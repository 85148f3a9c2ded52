//! Predictions on a covariate grid or on the rows of a table.
//!
//! mixlm predict --model-file m1.mixlm.model --axis age=18:90:25 --axis state=* --output trends.tsv
//!
//! Axis forms:
//!   name=from:to:n   n evenly spaced values
//!   name=a,b,c       explicit values (levels for categorical variables)
//!   name=*           every level seen when the model was fitted

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::info;

use mixlm_core::model::serialization::load_model;
use mixlm_core::model::FittedModel;
use mixlm_core::predict::{predict, predict_grid, PREDICTION_COLUMN};
use mixlm_data::grid::linspace;
use mixlm_data::{Column, PredictionGrid};

use super::{emit, split_list, DataArgs};

#[derive(Args)]
pub struct PredictArgs {
    /// Model file (.mixlm.model)
    #[arg(long)]
    model_file: String,

    /// Grid axis (repeatable): name=from:to:n, name=a,b,c or name=*
    #[arg(long)]
    axis: Vec<String>,

    /// Predict the rows of this table instead of a grid
    #[arg(long)]
    data: Option<String>,

    /// Read --data without checking the survey schema
    #[arg(long, default_value = "false")]
    no_schema: bool,

    /// Columns read as categorical when --no-schema is set (comma-separated)
    #[arg(long, default_value = "")]
    categorical: String,

    /// Population-level predictions (ignore random effects)
    #[arg(long, default_value = "false")]
    no_random: bool,

    /// Output TSV (stdout when omitted)
    #[arg(long)]
    output: Option<String>,
}

/// Levels a categorical variable had at fit time, if it is categorical.
fn known_levels(model: &FittedModel, name: &str) -> Option<Vec<String>> {
    if let Some((_, levels)) = model.design.factor_levels.iter().find(|(n, _)| n == name) {
        return Some(levels.clone());
    }
    model
        .design
        .random
        .iter()
        .find(|b| b.group == name)
        .map(|b| b.levels.clone())
}

/// Add one `name=values` axis to `grid`.
fn add_axis(grid: PredictionGrid, model: &FittedModel, spec: &str) -> Result<PredictionGrid> {
    let (name, values) = spec
        .split_once('=')
        .with_context(|| format!("axis '{}' is not of the form name=values", spec))?;
    let name = name.trim();
    let values = values.trim();
    let levels = known_levels(model, name);

    if values == "*" {
        return match levels {
            Some(l) => Ok(grid.levels(name, l)),
            None => bail!("'{}' is not categorical in the model; '*' needs levels", name),
        };
    }
    if let Some(levels) = levels {
        let requested = split_list(values);
        if let Some(bad) = requested.iter().find(|r| !levels.contains(r)) {
            info!("'{}' level '{}' was not seen in fitting", name, bad);
        }
        return Ok(grid.levels(name, requested));
    }

    let parts: Vec<&str> = values.split(':').collect();
    if parts.len() == 3 {
        let from: f64 = parts[0].trim().parse().with_context(|| format!("axis '{}'", spec))?;
        let to: f64 = parts[1].trim().parse().with_context(|| format!("axis '{}'", spec))?;
        let n: usize = parts[2].trim().parse().with_context(|| format!("axis '{}'", spec))?;
        return Ok(grid.numeric(name, linspace(from, to, n)));
    }
    let nums = split_list(values)
        .iter()
        .map(|v| v.parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("axis '{}' holds non-numeric values", spec))?;
    Ok(grid.numeric(name, nums))
}

pub fn run(args: PredictArgs) -> Result<()> {
    let model = load_model(Path::new(&args.model_file))?;
    let include_random = !args.no_random;

    let table = match (&args.data, args.axis.is_empty()) {
        (Some(path), true) => {
            let data_args = DataArgs {
                data: path.clone(),
                no_schema: args.no_schema,
                categorical: args.categorical.clone(),
            };
            let mut data = data_args.load()?;
            let pred = predict(&model, &data, include_random)?;
            data.push_column(PREDICTION_COLUMN, Column::Numeric(pred))?;
            data
        }
        (None, false) => {
            let mut grid = PredictionGrid::new();
            for spec in &args.axis {
                grid = add_axis(grid, &model, spec)?;
            }
            info!("Prediction grid: {} rows", grid.n_rows());
            predict_grid(&model, &grid, include_random)?
        }
        (Some(_), false) => bail!("use either --axis or --data, not both"),
        (None, true) => bail!("nothing to predict: give --axis or --data"),
    };
    emit(&table.to_tsv(), args.output.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixlm_core::formula::ModelSpec;
    use mixlm_core::lmm::ModelFitter;
    use mixlm_data::simulate::{simulate_survey, SimulationConfig};
    use mixlm_data::survey::observations_to_dataset;

    fn model() -> FittedModel {
        let obs = simulate_survey(&SimulationConfig {
            n_respondents: 300,
            ..Default::default()
        })
        .unwrap();
        let data = observations_to_dataset(&obs).unwrap();
        let spec = ModelSpec::parse("therm_dem ~ scale(age) + partyid + (1 | state)").unwrap();
        ModelFitter::default().fit(&data, &spec).unwrap()
    }

    #[test]
    fn test_axis_forms() {
        let m = model();
        let grid = PredictionGrid::new();
        let grid = add_axis(grid, &m, "age=20:80:4").unwrap();
        let grid = add_axis(grid, &m, "partyid=Democrat,Republican").unwrap();
        let grid = add_axis(grid, &m, "state=*").unwrap();
        assert_eq!(grid.n_rows(), 4 * 2 * 50);
        let data = grid.build().unwrap();
        assert_eq!(data.numeric("age").unwrap()[100], 40.0);
    }

    #[test]
    fn test_bad_axes() {
        let m = model();
        assert!(add_axis(PredictionGrid::new(), &m, "age").is_err());
        assert!(add_axis(PredictionGrid::new(), &m, "age=*").is_err());
        assert!(add_axis(PredictionGrid::new(), &m, "age=young,old").is_err());
    }
}
