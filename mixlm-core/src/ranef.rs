//! Per-cluster random-effect predictions (BLUPs).
//!
//! Each value comes with its conditional standard deviation: the spread of
//! the random effect given the data at the estimated parameters. These are
//! prediction uncertainties for cluster deviations, not confidence intervals
//! on fixed parameters, and no test statistic is attached to them.

use mixlm_data::{Column, Dataset, Factor};

use crate::error::Result;
use crate::model::FittedModel;

/// BLUPs of one random term, one row per grouping level.
#[derive(Debug, Clone, PartialEq)]
pub struct RanefTable {
    pub group: String,
    pub coefficients: Vec<String>,
    pub levels: Vec<String>,
    /// `values[level][coef]`.
    pub values: Vec<Vec<f64>>,
    /// Conditional SD, same layout as `values`.
    pub cond_sd: Vec<Vec<f64>>,
}

impl RanefTable {
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// BLUP of `coefficient` for `level`.
    pub fn value(&self, level: &str, coefficient: &str) -> Option<f64> {
        let l = self.levels.iter().position(|x| x == level)?;
        let c = self.coefficients.iter().position(|x| x == coefficient)?;
        Some(self.values[l][c])
    }
}

/// Random-effect predictions of every term, in formula order.
pub fn random_effects(model: &FittedModel) -> Vec<RanefTable> {
    model
        .design
        .random
        .iter()
        .map(|block| {
            let k = block.dim();
            let at = |src: &[f64], l: usize| -> Vec<f64> {
                let start = block.offset + l * k;
                src[start..start + k].to_vec()
            };
            RanefTable {
                group: block.group.clone(),
                coefficients: block.coefficients.clone(),
                levels: block.levels.clone(),
                values: (0..block.n_levels())
                    .map(|l| at(&model.random_effects, l))
                    .collect(),
                cond_sd: (0..block.n_levels())
                    .map(|l| {
                        at(&model.random_effect_variances, l)
                            .into_iter()
                            .map(|v| v.max(0.0).sqrt())
                            .collect()
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Per-cluster coefficients: the fixed effect of the same name (zero if the
/// parameter has no fixed counterpart) plus the cluster's BLUP.
pub fn cluster_coefficients(model: &FittedModel) -> Vec<RanefTable> {
    random_effects(model)
        .into_iter()
        .map(|mut table| {
            let fixed: Vec<f64> = table
                .coefficients
                .iter()
                .map(|c| model.coefficient(c).unwrap_or(0.0))
                .collect();
            for row in &mut table.values {
                for (v, f) in row.iter_mut().zip(&fixed) {
                    *v += f;
                }
            }
            table
        })
        .collect()
}

/// Long-format table (group, level, coefficient, blup, cond_sd) for export.
pub fn ranef_dataset(tables: &[RanefTable]) -> Result<Dataset> {
    let mut group = Vec::new();
    let mut level = Vec::new();
    let mut coefficient = Vec::new();
    let mut blup = Vec::new();
    let mut cond_sd = Vec::new();
    for t in tables {
        for (l, name) in t.levels.iter().enumerate() {
            for (c, coef) in t.coefficients.iter().enumerate() {
                group.push(t.group.as_str());
                level.push(name.as_str());
                coefficient.push(coef.as_str());
                blup.push(t.values[l][c]);
                cond_sd.push(t.cond_sd[l][c]);
            }
        }
    }
    Ok(Dataset::new()
        .with_column("group", Column::Categorical(Factor::from_strings(&group)))?
        .with_column("level", Column::Categorical(Factor::from_strings(&level)))?
        .with_column(
            "coefficient",
            Column::Categorical(Factor::from_strings(&coefficient)),
        )?
        .with_column("blup", Column::Numeric(blup))?
        .with_column("cond_sd", Column::Numeric(cond_sd))?)
}
