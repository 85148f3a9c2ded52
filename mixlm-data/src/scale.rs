//! Centering and scaling of continuous predictors.
//!
//! Uses the same convention as R's `scale()`: subtract the mean and divide
//! by the sample standard deviation (n - 1 denominator). Missing values are
//! ignored when computing the constants and stay missing.

use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::table::{Column, Dataset};

/// Affine map z = (x - center) / scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    pub center: f64,
    pub scale: f64,
}

impl Scaling {
    /// Estimate the constants from data.
    pub fn from_values(name: &str, values: &[f64]) -> Result<Self, DataError> {
        let present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if present.len() < 2 {
            return Err(DataError::Scaling {
                name: name.to_string(),
                reason: "fewer than two non-missing values".to_string(),
            });
        }
        let n = present.len() as f64;
        let center = present.iter().sum::<f64>() / n;
        let ss: f64 = present.iter().map(|v| (v - center).powi(2)).sum();
        let scale = (ss / (n - 1.0)).sqrt();
        if scale.is_nan() || scale <= 0.0 {
            return Err(DataError::Scaling {
                name: name.to_string(),
                reason: "zero variance".to_string(),
            });
        }
        Ok(Self { center, scale })
    }

    pub fn apply(&self, x: f64) -> f64 {
        (x - self.center) / self.scale
    }

    pub fn invert(&self, z: f64) -> f64 {
        z * self.scale + self.center
    }

    /// Convert a slope estimated on the standardized scale back to raw units.
    pub fn unscale_slope(&self, slope: f64) -> f64 {
        slope / self.scale
    }
}

/// Copy of `data` with numeric column `name` standardized in place.
pub fn standardize(data: &Dataset, name: &str) -> Result<(Dataset, Scaling), DataError> {
    let values = data.numeric(name)?;
    let scaling = Scaling::from_values(name, values)?;
    let scaled: Vec<f64> = values.iter().map(|&v| scaling.apply(v)).collect();
    let mut out = data.clone();
    out.replace_column(name, Column::Numeric(scaled))?;
    Ok((out, scaling))
}
