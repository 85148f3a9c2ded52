//! Post-fit convergence checks on the profiled deviance.
//!
//! The optimizer's own stopping rule only says it stopped. These checks
//! look at the deviance surface around θ̂: a finite-difference gradient,
//! scaled by the Cholesky factor of the Hessian over the interior
//! parameters (R⁻¹g with H = R'R, as lme4 does), must be small; the
//! Hessian must be positive definite and reasonably conditioned; template
//! diagonals at zero mark a singular fit.

use tracing::debug;

use mixlm_linalg::decomposition::{symmetric_eigenvalues, CholeskyDecomp};
use mixlm_linalg::DenseMatrix;

/// Tolerance on the scaled gradient.
pub const GRADIENT_TOL: f64 = 0.002;
/// Finite-difference step in θ.
const STEP: f64 = 1e-4;
/// θ diagonal below which a variance is treated as zero.
pub const SINGULAR_TOL: f64 = 1e-4;
/// Largest acceptable ratio of Hessian eigenvalues.
const EIGEN_RATIO_TOL: f64 = 1e6;
/// Largest acceptable ratio of fixed-effect column SDs.
const SCALE_RATIO_TOL: f64 = 1e3;

/// Outcome of the convergence checks.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceReport {
    /// Largest absolute (scaled) gradient component.
    pub max_grad: f64,
    /// Index of that component in θ.
    pub worst_component: usize,
    /// Set when the gradient check fails.
    pub failure: Option<String>,
    pub warnings: Vec<String>,
    pub singular: bool,
}

/// Run the gradient, Hessian and boundary checks at `theta`.
pub fn check_convergence(
    f: &dyn Fn(&[f64]) -> f64,
    theta: &[f64],
    lower: &[f64],
    diagonal: &[bool],
    names: &[String],
) -> ConvergenceReport {
    let mut report = ConvergenceReport::default();
    let m = theta.len();
    if m == 0 {
        return report;
    }
    let f0 = f(theta);
    let at = |i: usize, d: f64| -> f64 {
        let mut x = theta.to_vec();
        x[i] += d;
        f(&x)
    };

    let interior: Vec<bool> = (0..m).map(|i| theta[i] - STEP >= lower[i]).collect();
    let mut grad = vec![0.0; m];
    let mut f_plus = vec![0.0; m];
    let mut f_minus = vec![0.0; m];
    for i in 0..m {
        f_plus[i] = at(i, STEP);
        if interior[i] {
            f_minus[i] = at(i, -STEP);
            grad[i] = (f_plus[i] - f_minus[i]) / (2.0 * STEP);
        } else {
            // A positive one-sided derivative at the bound is the optimum.
            grad[i] = ((f_plus[i] - f0) / STEP).min(0.0);
        }
    }

    let idx: Vec<usize> = (0..m).filter(|&i| interior[i]).collect();
    let mut scaled = grad.clone();
    if !idx.is_empty() {
        let k = idx.len();
        let mut hess = DenseMatrix::zeros(k, k);
        for (a, &i) in idx.iter().enumerate() {
            hess.set(a, a, (f_plus[i] - 2.0 * f0 + f_minus[i]) / (STEP * STEP));
            for (b, &j) in idx.iter().enumerate().take(a) {
                let mut x = theta.to_vec();
                let mut corner = |si: f64, sj: f64| {
                    x[i] = theta[i] + si * STEP;
                    x[j] = theta[j] + sj * STEP;
                    f(&x)
                };
                let v = (corner(1.0, 1.0) - corner(1.0, -1.0) - corner(-1.0, 1.0)
                    + corner(-1.0, -1.0))
                    / (4.0 * STEP * STEP);
                hess.set(a, b, v);
                hess.set(b, a, v);
            }
        }

        match CholeskyDecomp::new(&hess) {
            Ok(chol) => {
                let g: Vec<f64> = idx.iter().map(|&i| grad[i]).collect();
                // R = L' for H = L L'.
                for (&i, s) in idx.iter().zip(chol.solve_upper(&g)) {
                    scaled[i] = s;
                }
            }
            Err(_) => report.warnings.push(
                "Hessian is numerically singular: parameters are not uniquely determined".into(),
            ),
        }
        if let Ok(evals) = symmetric_eigenvalues(&hess) {
            let (max, min) = (evals[0], evals[evals.len() - 1]);
            if min > 0.0 && max / min > EIGEN_RATIO_TOL {
                report.warnings.push(
                    "Model is nearly unidentifiable: large eigenvalue ratio - Rescale variables?"
                        .into(),
                );
            } else if min <= 0.0 {
                report.warnings.push(
                    "Model is nearly unidentifiable: non-positive Hessian eigenvalue".into(),
                );
            }
        }
    }

    // Per component, the smaller of the scaled and raw gradient.
    let (worst, max_grad) = scaled
        .iter()
        .zip(&grad)
        .map(|(s, g)| s.abs().min(g.abs()))
        .enumerate()
        .fold((0, 0.0_f64), |(wi, wv), (i, v)| if v > wv { (i, v) } else { (wi, wv) });
    report.max_grad = max_grad;
    report.worst_component = worst;
    debug!("Convergence check: max|grad| = {:.3e} at {}", max_grad, names[worst]);
    if max_grad > GRADIENT_TOL {
        report.failure = Some(format!(
            "Model failed to converge with max|grad| = {:.6} (tol = {}, component {})",
            max_grad,
            GRADIENT_TOL,
            worst + 1
        ));
    }

    let near_zero: Vec<&str> = (0..m)
        .filter(|&i| diagonal[i] && theta[i] < SINGULAR_TOL)
        .map(|i| names[i].as_str())
        .collect();
    if !near_zero.is_empty() {
        report.singular = true;
        report.warnings.push(format!(
            "boundary (singular) fit: variance estimate near zero for {}",
            near_zero.join(", ")
        ));
    }
    report
}

/// Warning text when non-constant fixed-effect columns differ in SD by more
/// than a factor of 1000.
pub fn scale_disparity(x: &DenseMatrix) -> Option<String> {
    let sds: Vec<f64> = x
        .column_sds()
        .into_iter()
        .filter(|s| *s > 1e-12)
        .collect();
    let max = sds.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = sds.iter().cloned().fold(f64::INFINITY, f64::min);
    if sds.len() >= 2 && max / min > SCALE_RATIO_TOL {
        Some("Some predictor variables are on very different scales: consider rescaling".into())
    } else {
        None
    }
}
