//! Profiled deviance of a linear mixed model as a function of θ.
//!
//! For fixed θ the penalized least-squares problem
//!   min ||y - Xβ - ZΛu||² + ||u||²
//! is solved exactly through the blocked Cholesky factorization
//!   L L'   = Λ'Z'ZΛ + I
//!   RZX    = L⁻¹ Λ'Z'X
//!   RX'RX  = X'X - RZX'RZX
//! and β, σ² are profiled out of the likelihood.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use mixlm_linalg::decomposition::CholeskyDecomp;
use mixlm_linalg::{DenseMatrix, LinalgError};

use super::theta;
use crate::design::ModelFrame;

/// Estimation criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Criterion {
    /// Restricted maximum likelihood.
    Reml,
    /// Full maximum likelihood.
    Ml,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Reml => f.write_str("REML"),
            Criterion::Ml => f.write_str("ML"),
        }
    }
}

/// Cross-products of the model matrices, computed once per fit.
pub struct DevianceProblem<'a> {
    frame: &'a ModelFrame,
    criterion: Criterion,
    ztz: DenseMatrix,
    ztx: DenseMatrix,
    xtx: DenseMatrix,
    zty: Vec<f64>,
    xty: Vec<f64>,
}

/// Everything the deviance evaluation produces at one θ.
#[derive(Debug, Clone)]
pub struct DevianceEval {
    pub deviance: f64,
    pub beta: Vec<f64>,
    /// Spherical random effects.
    pub u: Vec<f64>,
    /// Random effects on the data scale, b = Λu.
    pub b: Vec<f64>,
    /// Penalized weighted residual sum of squares.
    pub pwrss: f64,
    /// log|L|².
    pub ld_l2: f64,
    /// log|RX|².
    pub ld_rx2: f64,
    pub sigma2: f64,
    pub lambda: DenseMatrix,
    pub l: CholeskyDecomp,
    pub rx: CholeskyDecomp,
}

impl<'a> DevianceProblem<'a> {
    pub fn new(frame: &'a ModelFrame, criterion: Criterion) -> Self {
        Self {
            frame,
            criterion,
            ztz: frame.z.crossprod_dense(),
            ztx: frame.z.t_mul_dense(&frame.x),
            xtx: frame.x.crossprod(),
            zty: frame.z.t_mat_vec(&frame.y),
            xty: frame.x.t_mat_vec(&frame.y),
        }
    }

    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    pub fn n_theta(&self) -> usize {
        self.frame.design.random.iter().map(theta::n_theta).sum()
    }

    /// Solve the penalized least-squares problem at `theta`.
    pub fn evaluate(&self, theta_vals: &[f64]) -> Result<DevianceEval, LinalgError> {
        if theta_vals.len() != self.n_theta() {
            return Err(LinalgError::DimensionMismatch {
                expected: self.n_theta(),
                got: theta_vals.len(),
            });
        }
        let frame = self.frame;
        let n = frame.n_obs() as f64;
        let p = frame.x.ncols();

        let lambda = theta::lambda(&frame.design.random, theta_vals);
        let lambda_t = lambda.transpose();
        let mut a = lambda_t.mat_mul(&self.ztz).mat_mul(&lambda);
        a.add_to_diag(1.0);
        let l = CholeskyDecomp::new(&a)?;

        let cu = l.solve_lower(&lambda_t.mat_vec(&self.zty));
        let rzx = l.solve_lower_mat(&lambda_t.mat_mul(&self.ztx));
        let rx = CholeskyDecomp::new(&self.xtx.sub(&rzx.crossprod()))?;

        let rzx_cu = rzx.t_mat_vec(&cu);
        let rhs: Vec<f64> = self.xty.iter().zip(&rzx_cu).map(|(a, b)| a - b).collect();
        let beta = rx.solve(&rhs);

        let rzx_beta = rzx.mat_vec(&beta);
        let cu_adj: Vec<f64> = cu.iter().zip(&rzx_beta).map(|(a, b)| a - b).collect();
        let u = l.solve_upper(&cu_adj);
        let b = lambda.mat_vec(&u);

        let xb = frame.x.mat_vec(&beta);
        let zb = frame.z.mat_vec(&b);
        let rss: f64 = frame
            .y
            .iter()
            .zip(xb.iter().zip(&zb))
            .map(|(y, (x, z))| (y - x - z).powi(2))
            .sum();
        let pwrss = rss + DenseMatrix::dot(&u, &u);
        if pwrss.is_nan() || pwrss <= 0.0 {
            return Err(LinalgError::SingularMatrix);
        }

        let ld_l2 = l.log_det();
        let ld_rx2 = rx.log_det();
        let (deviance, sigma2) = match self.criterion {
            Criterion::Ml => (
                ld_l2 + n * (1.0 + (2.0 * PI * pwrss / n).ln()),
                pwrss / n,
            ),
            Criterion::Reml => {
                let dof = n - p as f64;
                (
                    ld_l2 + ld_rx2 + dof * (1.0 + (2.0 * PI * pwrss / dof).ln()),
                    pwrss / dof,
                )
            }
        };

        Ok(DevianceEval {
            deviance,
            beta,
            u,
            b,
            pwrss,
            ld_l2,
            ld_rx2,
            sigma2,
            lambda,
            l,
            rx,
        })
    }

    /// Objective for the optimizers: +inf where the factorization fails.
    pub fn deviance(&self, theta_vals: &[f64]) -> f64 {
        self.evaluate(theta_vals)
            .map(|e| e.deviance)
            .unwrap_or(f64::INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::build_model_frame;
    use crate::formula::ModelSpec;
    use mixlm_data::{Column, Dataset, Factor};

    fn data() -> Dataset {
        let g: Vec<&str> = (0..12).map(|i| ["a", "b", "c"][i % 3]).collect();
        Dataset::new()
            .with_column(
                "y",
                Column::Numeric(vec![
                    3.1, 5.2, 7.9, 2.8, 5.9, 8.4, 3.6, 4.7, 7.2, 2.5, 5.5, 8.8,
                ]),
            )
            .unwrap()
            .with_column(
                "x",
                Column::Numeric((0..12).map(|i| (i as f64 * 0.7).sin()).collect()),
            )
            .unwrap()
            .with_column("g", Column::Categorical(Factor::from_strings(&g)))
            .unwrap()
    }

    #[test]
    fn test_zero_theta_is_ols() {
        let spec = ModelSpec::parse("y ~ x + (1 | g)").unwrap();
        let frame = build_model_frame(&data(), &spec).unwrap();
        let problem = DevianceProblem::new(&frame, Criterion::Ml);
        let eval = problem.evaluate(&[0.0]).unwrap();
        // With θ = 0 the random effects vanish and β is the OLS solution.
        let xtx = frame.x.crossprod();
        let ols = mixlm_linalg::decomposition::solve_spd(&xtx, &frame.x.t_mat_vec(&frame.y)).unwrap();
        for (a, b) in eval.beta.iter().zip(&ols) {
            assert!((a - b).abs() < 1e-10);
        }
        assert!(eval.b.iter().all(|v| v.abs() < 1e-12));
        let n = 12.0;
        let expected = n * (1.0 + (2.0 * PI * eval.pwrss / n).ln());
        assert!((eval.deviance - expected).abs() < 1e-9);
    }

    #[test]
    fn test_group_effect_lowers_deviance() {
        let spec = ModelSpec::parse("y ~ x + (1 | g)").unwrap();
        let frame = build_model_frame(&data(), &spec).unwrap();
        let problem = DevianceProblem::new(&frame, Criterion::Reml);
        assert!(problem.deviance(&[2.0]) < problem.deviance(&[0.0]));
    }

    #[test]
    fn test_wrong_theta_length() {
        let spec = ModelSpec::parse("y ~ x + (1 | g)").unwrap();
        let frame = build_model_frame(&data(), &spec).unwrap();
        let problem = DevianceProblem::new(&frame, Criterion::Ml);
        assert!(problem.evaluate(&[1.0, 0.0]).is_err());
        assert_eq!(problem.deviance(&[1.0, 0.0]), f64::INFINITY);
    }
}
