//! The survey respondent schema.
//!
//! Survey files carry one row per respondent with a fixed set of columns.
//! Categorical columns are always read as categorical, even when coded
//! numerically (a cohort written as `1950` is a label, not a quantity).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DataError;
use crate::table::{read_delimited, Column, Dataset, Factor, ReadOptions};

/// How a schema column is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    /// Numeric column restricted to 0 and 1.
    Indicator,
    /// Numeric column restricted to whole numbers.
    Integer,
    Categorical,
}

/// Expected survey columns, in file order.
pub const SURVEY_SCHEMA: &[(&str, ColumnKind)] = &[
    ("partyid", ColumnKind::Categorical),
    ("age", ColumnKind::Numeric),
    ("female", ColumnKind::Indicator),
    ("race", ColumnKind::Categorical),
    ("therm_dem", ColumnKind::Numeric),
    ("therm_rep", ColumnKind::Numeric),
    ("state", ColumnKind::Categorical),
    ("year", ColumnKind::Integer),
    ("cohort", ColumnKind::Categorical),
];

/// One respondent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub partyid: String,
    pub age: f64,
    pub female: bool,
    pub race: String,
    pub therm_dem: f64,
    pub therm_rep: f64,
    pub state: String,
    pub year: i32,
    pub cohort: String,
}

/// Load a survey file and check it against [`SURVEY_SCHEMA`].
/// Columns beyond the schema are kept as read.
pub fn load_survey(path: &Path) -> Result<Dataset, DataError> {
    let options = ReadOptions {
        categorical: SURVEY_SCHEMA
            .iter()
            .filter(|(_, kind)| *kind == ColumnKind::Categorical)
            .map(|(name, _)| name.to_string())
            .collect(),
    };
    let data = read_delimited(path, &options)?;
    validate_survey(&data)?;
    info!(
        "Loaded survey with {} respondents from {}",
        data.n_rows(),
        path.display()
    );
    Ok(data)
}

/// Check presence and type of every schema column.
pub fn validate_survey(data: &Dataset) -> Result<(), DataError> {
    for &(name, kind) in SURVEY_SCHEMA {
        match kind {
            ColumnKind::Categorical => {
                data.factor(name)?;
            }
            ColumnKind::Numeric => {
                data.numeric(name)?;
            }
            ColumnKind::Indicator => {
                let values = data.numeric(name)?;
                if let Some(bad) = values
                    .iter()
                    .find(|v| !v.is_nan() && **v != 0.0 && **v != 1.0)
                {
                    return Err(DataError::Schema(format!(
                        "'{}' must be 0 or 1, found {}",
                        name, bad
                    )));
                }
            }
            ColumnKind::Integer => {
                let values = data.numeric(name)?;
                if let Some(bad) = values.iter().find(|v| !v.is_nan() && v.fract() != 0.0) {
                    return Err(DataError::Schema(format!(
                        "'{}' must hold whole numbers, found {}",
                        name, bad
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Assemble observations into a dataset with the schema's column layout.
pub fn observations_to_dataset(obs: &[Observation]) -> Result<Dataset, DataError> {
    let text = |f: fn(&Observation) -> &str| -> Column {
        let values: Vec<&str> = obs.iter().map(f).collect();
        Column::Categorical(Factor::from_strings(&values))
    };
    let num = |f: fn(&Observation) -> f64| -> Column { Column::Numeric(obs.iter().map(f).collect()) };

    Dataset::new()
        .with_column("partyid", text(|o| o.partyid.as_str()))?
        .with_column("age", num(|o| o.age))?
        .with_column("female", num(|o| if o.female { 1.0 } else { 0.0 }))?
        .with_column("race", text(|o| o.race.as_str()))?
        .with_column("therm_dem", num(|o| o.therm_dem))?
        .with_column("therm_rep", num(|o| o.therm_rep))?
        .with_column("state", text(|o| o.state.as_str()))?
        .with_column("year", num(|o| o.year as f64))?
        .with_column("cohort", text(|o| o.cohort.as_str()))
}
