//! FittedModel: estimates and diagnostics of one mixed model fit.
//!
//! Holds everything downstream steps need without the original data:
//! - Fixed effects and their covariance
//! - θ, variance components and residual SD
//! - Random-effect predictions with conditional variances
//! - Design encodings for predicting on new data
//! - Convergence messages

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::design::DesignInfo;
use crate::formula::ModelSpec;
use crate::lmm::Criterion;

/// Covariance of one random term's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceComponent {
    pub group: String,
    pub coefficients: Vec<String>,
    pub correlated: bool,
    /// k x k covariance, column-major.
    pub covariance: Vec<f64>,
}

impl VarianceComponent {
    pub fn dim(&self) -> usize {
        self.coefficients.len()
    }

    pub fn covariance_at(&self, i: usize, j: usize) -> f64 {
        self.covariance[j * self.dim() + i]
    }

    pub fn variance(&self, i: usize) -> f64 {
        self.covariance_at(i, i)
    }

    pub fn std_dev(&self, i: usize) -> f64 {
        self.variance(i).max(0.0).sqrt()
    }

    /// Correlation between parameters `i` and `j`; NaN when either variance is zero.
    pub fn correlation(&self, i: usize, j: usize) -> f64 {
        let denom = self.std_dev(i) * self.std_dev(j);
        if denom > 0.0 {
            self.covariance_at(i, j) / denom
        } else {
            f64::NAN
        }
    }
}

/// One row of the fixed-effects table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedEffect {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    /// 95% Wald interval.
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// How the optimizer run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerOutcome {
    pub optimizer: String,
    pub evaluations: usize,
    pub converged: bool,
    pub message: String,
    /// Largest scaled gradient component from the post-fit check.
    pub max_grad: Option<f64>,
}

/// A fitted linear mixed model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    pub spec: ModelSpec,
    pub criterion: Criterion,
    pub design: DesignInfo,
    pub n_obs: usize,
    /// Rows dropped for missing values.
    pub n_dropped: usize,
    pub beta: Vec<f64>,
    /// p x p covariance of β, column-major.
    pub vcov_beta: Vec<f64>,
    pub theta: Vec<f64>,
    pub theta_names: Vec<String>,
    /// Residual standard deviation σ.
    pub sigma: f64,
    pub variance_components: Vec<VarianceComponent>,
    /// Random-effect predictions b, laid out like the columns of Z.
    pub random_effects: Vec<f64>,
    /// Conditional variances of b.
    pub random_effect_variances: Vec<f64>,
    /// Minimized criterion: REML criterion or ML deviance.
    pub deviance: f64,
    pub log_likelihood: f64,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub outcome: OptimizerOutcome,
    pub warnings: Vec<String>,
    pub singular: bool,
}

impl FittedModel {
    pub fn formula(&self) -> String {
        self.spec.to_string()
    }

    pub fn n_fixed(&self) -> usize {
        self.beta.len()
    }

    /// Estimated parameters: fixed effects, covariance parameters and σ.
    pub fn n_params(&self) -> usize {
        self.beta.len() + self.theta.len() + 1
    }

    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.n_params() as f64
    }

    pub fn bic(&self) -> f64 {
        -2.0 * self.log_likelihood + (self.n_obs as f64).ln() * self.n_params() as f64
    }

    pub fn fixed_names(&self) -> Vec<String> {
        self.design.fixed_names()
    }

    pub fn std_errors(&self) -> Vec<f64> {
        let p = self.n_fixed();
        (0..p).map(|i| self.vcov_beta[i * p + i].max(0.0).sqrt()).collect()
    }

    /// Coefficient table with 95% Wald intervals.
    pub fn fixed_effects(&self) -> Vec<FixedEffect> {
        let z = Normal::new(0.0, 1.0)
            .map(|n| n.inverse_cdf(0.975))
            .unwrap_or(1.959963984540054);
        self.fixed_names()
            .into_iter()
            .zip(self.beta.iter().zip(self.std_errors()))
            .map(|(name, (&estimate, se))| FixedEffect {
                name,
                estimate,
                std_error: se,
                t_value: estimate / se,
                ci_lower: estimate - z * se,
                ci_upper: estimate + z * se,
            })
            .collect()
    }

    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.design
            .fixed
            .iter()
            .position(|c| c.name == name)
            .map(|i| self.beta[i])
    }

    /// Observed response values, recovered as fitted + residual.
    pub fn response(&self) -> Vec<f64> {
        self.fitted
            .iter()
            .zip(&self.residuals)
            .map(|(f, r)| f + r)
            .collect()
    }

    /// Min, quartiles and max of residuals divided by σ.
    pub fn scaled_residual_quantiles(&self) -> [f64; 5] {
        let mut r: Vec<f64> = self.residuals.iter().map(|v| v / self.sigma).collect();
        r.sort_by(|a, b| a.total_cmp(b));
        let q = |p: f64| -> f64 {
            if r.is_empty() {
                return f64::NAN;
            }
            let h = p * (r.len() - 1) as f64;
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            r[lo] + (h - lo as f64) * (r[hi] - r[lo])
        };
        [q(0.0), q(0.25), q(0.5), q(0.75), q(1.0)]
    }
}
