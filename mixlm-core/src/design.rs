//! Model matrices from a dataset and a model specification.
//!
//! The fixed-effects matrix X uses treatment contrasts for categorical
//! predictors (first sorted level as baseline). The random-effects matrix Z
//! has one block per random term; within a block the k columns of each
//! grouping level are contiguous, so the relative covariance factor is block
//! diagonal with one k x k template per level.
//!
//! Everything needed to rebuild these matrices for new data (encodings,
//! observed levels, scaling constants) is kept in [`DesignInfo`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mixlm_data::{Column, Dataset, Scaling};
use mixlm_linalg::decomposition::QrDecomp;
use mixlm_linalg::{DenseMatrix, SparseMatrix};

use crate::error::{MixlmError, Result};
use crate::formula::{ModelSpec, Variable, INTERCEPT};

/// One factor of a fixed-effect column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    /// A numeric variable, standardized when `scaled`.
    Value(Variable),
    /// 1 when the categorical `variable` equals `level`, else 0.
    Indicator { variable: String, level: String },
}

/// A fixed-effect column: the product of its parts. No parts is the intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedColumn {
    pub name: String,
    pub parts: Vec<Part>,
}

/// Layout of one random term inside Z.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomBlock {
    pub group: String,
    /// Observed levels of the grouping key, sorted.
    pub levels: Vec<String>,
    /// Varying parameter names, intercept first.
    pub coefficients: Vec<String>,
    pub intercept: bool,
    pub slopes: Vec<Variable>,
    pub correlated: bool,
    /// First column of this block in Z.
    pub offset: usize,
}

impl RandomBlock {
    /// Varying parameters per level.
    pub fn dim(&self) -> usize {
        self.coefficients.len()
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Columns this block occupies in Z.
    pub fn n_columns(&self) -> usize {
        self.dim() * self.n_levels()
    }

    pub fn level_index(&self, label: &str) -> Option<usize> {
        self.levels.binary_search_by(|l| l.as_str().cmp(label)).ok()
    }
}

/// Per-row view of one random term on some dataset.
#[derive(Debug, Clone)]
pub struct BlockRows {
    /// Level index per row; `None` for a missing or unseen level.
    pub level: Vec<Option<usize>>,
    /// n x k values of the varying parameters' covariates.
    pub values: DenseMatrix,
    /// False where a slope covariate is missing.
    pub complete: Vec<bool>,
}

/// Encodings learned from the training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignInfo {
    pub response: String,
    pub fixed: Vec<FixedColumn>,
    /// Levels of every categorical fixed-effect variable, as seen at fit time.
    pub factor_levels: Vec<(String, Vec<String>)>,
    pub scalings: Vec<(String, Scaling)>,
    pub random: Vec<RandomBlock>,
}

impl DesignInfo {
    pub fn fixed_names(&self) -> Vec<String> {
        self.fixed.iter().map(|c| c.name.clone()).collect()
    }

    pub fn n_fixed(&self) -> usize {
        self.fixed.len()
    }

    /// Total random-effect dimension q.
    pub fn n_random(&self) -> usize {
        self.random.iter().map(|b| b.n_columns()).sum()
    }

    pub fn scaling(&self, name: &str) -> Option<&Scaling> {
        self.scalings.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    fn known_levels(&self, name: &str) -> Option<&[String]> {
        self.factor_levels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, l)| l.as_slice())
    }

    /// Numeric covariate values, standardized with the stored constants.
    fn variable_values(&self, var: &Variable, data: &Dataset) -> Result<Vec<Option<f64>>> {
        let raw = data.numeric(&var.name)?;
        let scaling = if var.scaled {
            Some(self.scaling(&var.name).ok_or_else(|| {
                MixlmError::Design(format!("no scaling constants stored for '{}'", var.name))
            })?)
        } else {
            None
        };
        Ok(raw
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    None
                } else {
                    Some(scaling.map_or(v, |s| s.apply(v)))
                }
            })
            .collect())
    }

    fn part_values(&self, part: &Part, data: &Dataset) -> Result<Vec<Option<f64>>> {
        match part {
            Part::Value(var) => self.variable_values(var, data),
            Part::Indicator { variable, level } => {
                let known = self.known_levels(variable).unwrap_or(&[]);
                let column = data.column(variable)?;
                (0..data.n_rows())
                    .map(|r| match cell_label(column, r) {
                        None => Ok(None),
                        Some(label) if known.contains(&label) => {
                            Ok(Some(if label == *level { 1.0 } else { 0.0 }))
                        }
                        Some(label) => Err(MixlmError::Design(format!(
                            "level '{}' of '{}' was not present when the model was fitted",
                            label, variable
                        ))),
                    })
                    .collect()
            }
        }
    }

    /// Fixed-effects matrix for `data` plus a per-row completeness flag.
    /// Incomplete rows hold zeros.
    pub fn fixed_matrix(&self, data: &Dataset) -> Result<(DenseMatrix, Vec<bool>)> {
        let n = data.n_rows();
        let mut complete = vec![true; n];
        let mut columns = Vec::with_capacity(self.fixed.len());
        for col in &self.fixed {
            let mut values = vec![Some(1.0); n];
            for part in &col.parts {
                for (acc, v) in values.iter_mut().zip(self.part_values(part, data)?) {
                    *acc = match (*acc, v) {
                        (Some(a), Some(b)) => Some(a * b),
                        _ => None,
                    };
                }
            }
            let dense: Vec<f64> = values
                .iter()
                .enumerate()
                .map(|(r, v)| match v {
                    Some(x) => *x,
                    None => {
                        complete[r] = false;
                        0.0
                    }
                })
                .collect();
            columns.push(dense);
        }
        Ok((DenseMatrix::from_columns(n, &columns), complete))
    }

    /// Per-row levels and covariates of every random block on `data`.
    pub fn random_rows(&self, data: &Dataset) -> Result<Vec<BlockRows>> {
        self.random
            .iter()
            .map(|block| self.block_rows(block, data))
            .collect()
    }

    /// Per-row level and covariates of one random block on `data`.
    pub fn block_rows(&self, block: &RandomBlock, data: &Dataset) -> Result<BlockRows> {
        let n = data.n_rows();
        let group = data.column(&block.group)?;
        let level: Vec<Option<usize>> = (0..n)
            .map(|r| cell_label(group, r).and_then(|l| block.level_index(&l)))
            .collect();
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(block.dim());
        let mut complete = vec![true; n];
        if block.intercept {
            columns.push(vec![1.0; n]);
        }
        for slope in &block.slopes {
            let values = self.variable_values(slope, data)?;
            columns.push(
                values
                    .iter()
                    .enumerate()
                    .map(|(r, v)| {
                        v.unwrap_or_else(|| {
                            complete[r] = false;
                            0.0
                        })
                    })
                    .collect(),
            );
        }
        Ok(BlockRows {
            level,
            values: DenseMatrix::from_columns(n, &columns),
            complete,
        })
    }

    /// Random-effects matrix Z for `data`. Rows with an unseen level get no entries.
    pub fn z_matrix(&self, data: &Dataset) -> Result<SparseMatrix> {
        let n = data.n_rows();
        let (mut rows_idx, mut cols_idx, mut vals) = (Vec::new(), Vec::new(), Vec::new());
        for (block, rows) in self.random.iter().zip(self.random_rows(data)?) {
            let k = block.dim();
            for r in 0..n {
                if let Some(l) = rows.level[r] {
                    for j in 0..k {
                        let v = rows.values.get(r, j);
                        if v != 0.0 {
                            rows_idx.push(r);
                            cols_idx.push(block.offset + l * k + j);
                            vals.push(v);
                        }
                    }
                }
            }
        }
        Ok(SparseMatrix::from_triplets(
            n,
            self.n_random(),
            &rows_idx,
            &cols_idx,
            &vals,
        ))
    }
}

/// Text of a cell used as a level label. Numeric cells are formatted so that
/// numerically coded groups (a cohort written `1950`) act as labels.
fn cell_label(column: &Column, row: usize) -> Option<String> {
    match column {
        Column::Categorical(f) => f.label(row).map(str::to_string),
        Column::Numeric(v) if v[row].is_nan() => None,
        Column::Numeric(v) => Some(format!("{}", v[row])),
    }
}

/// Model matrices for a fit, restricted to complete rows.
#[derive(Debug, Clone)]
pub struct ModelFrame {
    pub y: Vec<f64>,
    pub x: DenseMatrix,
    pub z: SparseMatrix,
    pub design: DesignInfo,
    /// Rows of the input dataset that entered the fit.
    pub rows_used: Vec<usize>,
    pub n_dropped: usize,
}

impl ModelFrame {
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }
}

/// Build X, Z and y for `spec` on `data`, dropping rows with missing values
/// in any model variable.
pub fn build_model_frame(data: &Dataset, spec: &ModelSpec) -> Result<ModelFrame> {
    let vars = spec.variables();
    let var_refs: Vec<&str> = vars.iter().map(String::as_str).collect();
    let rows_used = data.complete_rows(&var_refs)?;
    let n_dropped = data.n_rows() - rows_used.len();
    if n_dropped > 0 {
        info!(
            "Dropped {} of {} rows with missing values in model variables",
            n_dropped,
            data.n_rows()
        );
    }
    if rows_used.is_empty() {
        return Err(MixlmError::Design("no complete rows remain".into()));
    }
    let sub = data.select_rows(&rows_used);
    let n = sub.n_rows();

    let y = match sub.column(&spec.response)? {
        Column::Numeric(v) => v.clone(),
        Column::Categorical(_) => {
            return Err(MixlmError::Design(format!(
                "response '{}' must be numeric",
                spec.response
            )))
        }
    };

    let mut scalings = Vec::new();
    for name in spec.scaled_variables() {
        scalings.push((name.clone(), Scaling::from_values(&name, sub.numeric(&name)?)?));
    }

    let (fixed, factor_levels) = encode_fixed(spec, &sub)?;
    let random = layout_random(spec, &sub, n)?;

    let design = DesignInfo {
        response: spec.response.clone(),
        fixed,
        factor_levels,
        scalings,
        random,
    };

    let (x, _) = design.fixed_matrix(&sub)?;
    let p = x.ncols();
    if n <= p {
        return Err(MixlmError::Design(format!(
            "{} observations cannot identify {} fixed effects",
            n, p
        )));
    }
    if p > 0 && QrDecomp::new(&x).is_err() {
        return Err(MixlmError::Design(
            "fixed-effect model matrix is rank deficient".into(),
        ));
    }
    let z = design.z_matrix(&sub)?;
    debug!(
        "Model frame: n={}, p={}, q={}, nnz(Z)={}",
        n,
        p,
        z.ncols(),
        z.nnz()
    );

    Ok(ModelFrame {
        y,
        x,
        z,
        design,
        rows_used,
        n_dropped,
    })
}

fn encode_fixed(
    spec: &ModelSpec,
    data: &Dataset,
) -> Result<(Vec<FixedColumn>, Vec<(String, Vec<String>)>)> {
    let mut columns = Vec::new();
    let mut factor_levels: Vec<(String, Vec<String>)> = Vec::new();
    if spec.intercept {
        columns.push(FixedColumn {
            name: INTERCEPT.to_string(),
            parts: Vec::new(),
        });
    }
    // Whether the span of the intercept is already in the model.
    let mut has_constant = spec.intercept;

    for term in &spec.fixed {
        let mut choices: Vec<Vec<(String, Part)>> = Vec::with_capacity(term.factors.len());
        let mut full_main_effect = false;
        for var in &term.factors {
            match data.column(&var.name)? {
                Column::Numeric(_) => {
                    choices.push(vec![(var.to_string(), Part::Value(var.clone()))]);
                }
                Column::Categorical(f) => {
                    if var.scaled {
                        return Err(MixlmError::Design(format!(
                            "scale() needs a numeric column, '{}' is categorical",
                            var.name
                        )));
                    }
                    let levels = f.observed_levels();
                    if levels.len() < 2 {
                        return Err(MixlmError::Design(format!(
                            "'{}' has fewer than two observed levels",
                            var.name
                        )));
                    }
                    let rest: Vec<&Variable> =
                        term.factors.iter().filter(|v| *v != var).collect();
                    let margin_present = if rest.is_empty() {
                        has_constant
                    } else {
                        spec.fixed.iter().any(|t| {
                            t.factors.len() == rest.len()
                                && rest.iter().all(|v| t.factors.contains(v))
                        })
                    };
                    let used = if margin_present {
                        &levels[1..]
                    } else {
                        full_main_effect |= rest.is_empty();
                        &levels[..]
                    };
                    choices.push(
                        used.iter()
                            .map(|l| {
                                (
                                    format!("{}{}", var.name, l),
                                    Part::Indicator {
                                        variable: var.name.clone(),
                                        level: l.clone(),
                                    },
                                )
                            })
                            .collect(),
                    );
                    if !factor_levels.iter().any(|(n, _)| *n == var.name) {
                        factor_levels.push((var.name.clone(), levels));
                    }
                }
            }
        }
        has_constant |= full_main_effect;

        // Cartesian product; earlier factors vary fastest.
        let mut combos: Vec<(Vec<String>, Vec<Part>)> = vec![(Vec::new(), Vec::new())];
        for choice in &choices {
            let mut next = Vec::with_capacity(combos.len() * choice.len());
            for (name, part) in choice {
                for (names, parts) in &combos {
                    let mut names = names.clone();
                    let mut parts = parts.clone();
                    names.push(name.clone());
                    parts.push(part.clone());
                    next.push((names, parts));
                }
            }
            combos = next;
        }
        columns.extend(combos.into_iter().map(|(names, parts)| FixedColumn {
            name: names.join(":"),
            parts,
        }));
    }
    Ok((columns, factor_levels))
}

fn layout_random(spec: &ModelSpec, data: &Dataset, n: usize) -> Result<Vec<RandomBlock>> {
    let mut blocks = Vec::with_capacity(spec.random.len());
    let mut offset = 0;
    for term in &spec.random {
        for slope in &term.slopes {
            if let Column::Categorical(_) = data.column(&slope.name)? {
                return Err(MixlmError::Design(format!(
                    "random slope '{}' must be numeric",
                    slope.name
                )));
            }
        }
        let group = data.column(&term.group)?;
        let levels: Vec<String> = match group {
            Column::Categorical(f) => f.observed_levels(),
            Column::Numeric(_) => {
                let mut labels: Vec<String> = (0..n).filter_map(|r| cell_label(group, r)).collect();
                labels.sort();
                labels.dedup();
                labels
            }
        };
        if levels.len() >= n {
            return Err(MixlmError::Design(format!(
                "grouping key '{}' has {} levels for {} observations; \
                 random effects are not identifiable",
                term.group,
                levels.len(),
                n
            )));
        }
        let block = RandomBlock {
            group: term.group.clone(),
            levels,
            coefficients: term.coefficient_names(),
            intercept: term.intercept,
            slopes: term.slopes.clone(),
            correlated: term.correlated,
            offset,
        };
        debug!(
            "Random term {}: {} levels x {} parameters",
            term,
            block.n_levels(),
            block.dim()
        );
        offset += block.n_columns();
        blocks.push(block);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixlm_data::Factor;

    fn toy() -> Dataset {
        Dataset::new()
            .with_column("y", Column::Numeric(vec![1.0, 2.0, 3.0, 4.0, 5.0, 7.0, f64::NAN]))
            .unwrap()
            .with_column("x", Column::Numeric(vec![0.5, 1.5, 2.0, 3.5, 4.0, 6.0, 1.0]))
            .unwrap()
            .with_column(
                "party",
                Column::Categorical(Factor::from_strings(&["D", "R", "I", "D", "R", "I", "D"])),
            )
            .unwrap()
            .with_column(
                "g",
                Column::Categorical(Factor::from_strings(&["a", "a", "b", "b", "c", "c", "c"])),
            )
            .unwrap()
    }

    #[test]
    fn test_treatment_contrasts_and_listwise_deletion() {
        let spec = ModelSpec::parse("y ~ x + party + (1 | g)").unwrap();
        let frame = build_model_frame(&toy(), &spec).unwrap();
        assert_eq!(frame.n_obs(), 6);
        assert_eq!(frame.n_dropped, 1);
        assert_eq!(
            frame.design.fixed_names(),
            vec!["(Intercept)", "x", "partyI", "partyR"]
        );
        // Row 1 is party R.
        assert_eq!(frame.x.row(1), vec![1.0, 1.5, 0.0, 1.0]);
        assert_eq!(frame.z.ncols(), 3);
        assert_eq!(frame.z.get(2, 1), 1.0);
    }

    #[test]
    fn test_no_intercept_full_coding() {
        let spec = ModelSpec::parse("y ~ 0 + party + x").unwrap();
        let frame = build_model_frame(&toy(), &spec).unwrap();
        assert_eq!(
            frame.design.fixed_names(),
            vec!["partyD", "partyI", "partyR", "x"]
        );
    }

    #[test]
    fn test_interaction_names() {
        // Three rows per party so all six columns are identified.
        let data = Dataset::new()
            .with_column("y", Column::Numeric((1..=9).map(f64::from).collect()))
            .unwrap()
            .with_column(
                "x",
                Column::Numeric(vec![0.5, 1.5, 2.0, 3.5, 4.0, 6.0, 1.0, 2.5, 5.0]),
            )
            .unwrap()
            .with_column(
                "party",
                Column::Categorical(Factor::from_strings(&[
                    "D", "R", "I", "D", "R", "I", "D", "R", "I",
                ])),
            )
            .unwrap();
        let spec = ModelSpec::parse("y ~ x*party").unwrap();
        let frame = build_model_frame(&data, &spec).unwrap();
        assert_eq!(frame.n_obs(), 9);
        assert_eq!(
            frame.design.fixed_names(),
            vec!["(Intercept)", "x", "partyI", "partyR", "x:partyI", "x:partyR"]
        );
        assert_eq!(frame.x.get(1, 5), 1.5);
    }

    #[test]
    fn test_random_slope_block_layout() {
        let spec = ModelSpec::parse("y ~ scale(x) + (1 + scale(x) | g)").unwrap();
        let frame = build_model_frame(&toy(), &spec).unwrap();
        let block = &frame.design.random[0];
        assert_eq!(block.coefficients, vec!["(Intercept)", "scale(x)"]);
        assert_eq!(frame.z.ncols(), 6);
        let s = frame.design.scaling("x").unwrap();
        // Row 2 is level b (index 1): columns 2 and 3.
        assert_eq!(frame.z.get(2, 2), 1.0);
        assert!((frame.z.get(2, 3) - s.apply(2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_categorical_slope_rejected() {
        let spec = ModelSpec::parse("y ~ x + (1 + party | g)").unwrap();
        assert!(matches!(
            build_model_frame(&toy(), &spec),
            Err(MixlmError::Design(_))
        ));
    }

    #[test]
    fn test_rank_deficient_rejected() {
        let data = toy()
            .with_column("x2", Column::Numeric(vec![1.0, 3.0, 4.0, 7.0, 8.0, 12.0, 2.0]))
            .unwrap();
        let spec = ModelSpec::parse("y ~ x + x2").unwrap();
        let err = build_model_frame(&data, &spec).unwrap_err();
        assert!(matches!(err, MixlmError::Design(m) if m.contains("rank")));
    }

    #[test]
    fn test_unseen_fixed_level_is_error() {
        let spec = ModelSpec::parse("y ~ party").unwrap();
        let frame = build_model_frame(&toy(), &spec).unwrap();
        let new = Dataset::new()
            .with_column("party", Column::Categorical(Factor::from_strings(&["G"])))
            .unwrap();
        assert!(frame.design.fixed_matrix(&new).is_err());
    }

    #[test]
    fn test_numeric_group_levels() {
        let data = toy()
            .with_column("cohort", Column::Numeric(vec![1950.0, 1960.0, 1950.0, 1960.0, 1950.0, 1960.0, 1950.0]))
            .unwrap();
        let spec = ModelSpec::parse("y ~ x + (1 | cohort)").unwrap();
        let frame = build_model_frame(&data, &spec).unwrap();
        assert_eq!(frame.design.random[0].levels, vec!["1950", "1960"]);
    }
}
