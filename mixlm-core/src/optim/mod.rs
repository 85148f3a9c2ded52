//! Bound-constrained minimizers for the profiled deviance.
//!
//! Every backend minimizes a scalar function of θ subject to elementwise
//! lower bounds (variance parameters are bounded below by 0, covariance
//! parameters are free). Backends are interchangeable: the fitter only sees
//! the [`Optimizer`] trait and an [`OptimResult`].

mod bfgs;
mod nelder_mead;
mod pattern_search;

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use bfgs::Bfgs;
pub use nelder_mead::NelderMead;
pub use pattern_search::PatternSearch;

/// Stopping rules shared by every backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimControl {
    /// Maximum number of objective evaluations.
    pub max_evals: usize,
    /// Absolute change in the objective treated as no progress.
    pub ftol_abs: f64,
    /// Relative change in the objective treated as no progress.
    pub ftol_rel: f64,
    /// Relative change in the parameters treated as no progress.
    pub xtol_rel: f64,
    /// Projected gradient norm at which gradient-based backends stop.
    pub gtol: f64,
}

impl Default for OptimControl {
    fn default() -> Self {
        Self {
            max_evals: 10_000,
            ftol_abs: 1e-8,
            ftol_rel: 1e-12,
            xtol_rel: 1e-7,
            gtol: 1e-5,
        }
    }
}

/// Outcome of one minimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimResult {
    pub x: Vec<f64>,
    pub fval: f64,
    pub evaluations: usize,
    /// Whether a tolerance, rather than the evaluation budget, stopped the run.
    pub converged: bool,
    pub message: String,
}

/// A bound-constrained minimizer.
pub trait Optimizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Minimize `f` from `x0` subject to `x >= lower`.
    fn minimize(
        &self,
        f: &dyn Fn(&[f64]) -> f64,
        x0: &[f64],
        lower: &[f64],
        control: &OptimControl,
    ) -> OptimResult;
}

/// Selectable optimizer backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Derivative-free simplex search.
    NelderMead,
    /// Hooke-Jeeves coordinate pattern search.
    PatternSearch,
    /// Projected quasi-Newton with finite-difference gradients.
    Bfgs,
}

impl OptimizerKind {
    pub const ALL: [OptimizerKind; 3] = [
        OptimizerKind::NelderMead,
        OptimizerKind::PatternSearch,
        OptimizerKind::Bfgs,
    ];

    pub fn build(self) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::NelderMead => Box::new(NelderMead::default()),
            OptimizerKind::PatternSearch => Box::new(PatternSearch::default()),
            OptimizerKind::Bfgs => Box::new(Bfgs::default()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptimizerKind::NelderMead => "nelder-mead",
            OptimizerKind::PatternSearch => "pattern-search",
            OptimizerKind::Bfgs => "bfgs",
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "nelder-mead" | "neldermead" | "nm" => Ok(OptimizerKind::NelderMead),
            "pattern-search" | "hooke-jeeves" | "hj" => Ok(OptimizerKind::PatternSearch),
            "bfgs" | "l-bfgs-b" => Ok(OptimizerKind::Bfgs),
            other => Err(format!(
                "unknown optimizer '{}' (expected nelder-mead, pattern-search or bfgs)",
                other
            )),
        }
    }
}

/// Clamp `x` onto the feasible region.
pub fn project(x: &mut [f64], lower: &[f64]) {
    for (xi, &li) in x.iter_mut().zip(lower) {
        if *xi < li {
            *xi = li;
        }
    }
}

/// Objective wrapper that counts evaluations and maps non-finite values to +inf.
pub(crate) struct Counted<'a> {
    f: &'a dyn Fn(&[f64]) -> f64,
    count: Cell<usize>,
}

impl<'a> Counted<'a> {
    pub(crate) fn new(f: &'a dyn Fn(&[f64]) -> f64) -> Self {
        Self {
            f,
            count: Cell::new(0),
        }
    }

    pub(crate) fn eval(&self, x: &[f64]) -> f64 {
        self.count.set(self.count.get() + 1);
        let v = (self.f)(x);
        if v.is_finite() {
            v
        } else {
            f64::INFINITY
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }
}

/// Relative change test used by every backend.
pub(crate) fn small_change(old: f64, new: f64, control: &OptimControl) -> bool {
    let diff = (old - new).abs();
    diff <= control.ftol_abs || diff <= control.ftol_rel * old.abs().max(new.abs())
}

#[cfg(test)]
pub(crate) mod test_problems {
    /// Shifted quadratic with minimum at (1, -2, 0.5).
    pub fn quadratic(x: &[f64]) -> f64 {
        (x[0] - 1.0).powi(2) + 2.0 * (x[1] + 2.0).powi(2) + 0.5 * (x[2] - 0.5).powi(2)
    }

    /// Rosenbrock valley, minimum at (1, 1).
    pub fn rosenbrock(x: &[f64]) -> f64 {
        100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2)
    }

    /// Minimum at x = -1, pushed to the bound 0 when constrained.
    pub fn bounded(x: &[f64]) -> f64 {
        (x[0] + 1.0).powi(2) + (x[1] - 2.0).powi(2)
    }
}
