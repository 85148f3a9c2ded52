//! Synthetic covariate grids for prediction.
//!
//! A grid is the cartesian product of its axes. The first axis varies
//! slowest, so `age x state` lists every state for the first age before
//! moving to the next age.

use crate::error::DataError;
use crate::table::{Column, Dataset, Factor};

/// Values along one grid axis.
#[derive(Debug, Clone, PartialEq)]
pub enum GridAxis {
    Numeric(Vec<f64>),
    Levels(Vec<String>),
}

impl GridAxis {
    fn len(&self) -> usize {
        match self {
            GridAxis::Numeric(v) => v.len(),
            GridAxis::Levels(v) => v.len(),
        }
    }
}

/// Builder for a cartesian prediction grid.
#[derive(Debug, Clone, Default)]
pub struct PredictionGrid {
    axes: Vec<(String, GridAxis)>,
}

impl PredictionGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn numeric(mut self, name: &str, values: Vec<f64>) -> Self {
        self.axes.push((name.to_string(), GridAxis::Numeric(values)));
        self
    }

    pub fn levels<S: Into<String>>(mut self, name: &str, levels: Vec<S>) -> Self {
        let levels = levels.into_iter().map(Into::into).collect();
        self.axes.push((name.to_string(), GridAxis::Levels(levels)));
        self
    }

    /// Number of rows the grid expands to.
    pub fn n_rows(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().map(|(_, a)| a.len()).product()
        }
    }

    /// Expand the axes into a dataset.
    pub fn build(&self) -> Result<Dataset, DataError> {
        if let Some((name, _)) = self.axes.iter().find(|(_, a)| a.len() == 0) {
            return Err(DataError::EmptyAxis(name.clone()));
        }
        let total = self.n_rows();
        let mut data = Dataset::new();
        // Rows covered by one step of axis k = product of later axis lengths.
        let mut stride = total;
        for (name, axis) in &self.axes {
            stride /= axis.len();
            let index = |row: usize| (row / stride) % axis.len();
            let column = match axis {
                GridAxis::Numeric(v) => Column::Numeric((0..total).map(|r| v[index(r)]).collect()),
                GridAxis::Levels(v) => {
                    let labels: Vec<&str> = (0..total).map(|r| v[index(r)].as_str()).collect();
                    Column::Categorical(Factor::from_strings(&labels))
                }
            };
            data.push_column(name, column)?;
        }
        Ok(data)
    }
}

/// `n` evenly spaced values from `from` to `to` inclusive.
pub fn linspace(from: f64, to: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![from],
        _ => {
            let step = (to - from) / (n - 1) as f64;
            (0..n).map(|i| from + step * i as f64).collect()
        }
    }
}
