//! Projected BFGS with finite-difference gradients.
//!
//! Variables sitting on their bound with a gradient pushing outward are held
//! fixed for the step. Steps follow the projected path P(x + a d) with
//! Armijo backtracking; the inverse Hessian approximation resets to the
//! identity whenever it stops producing descent directions.

use tracing::{debug, trace};

use mixlm_linalg::DenseMatrix;

use super::{project, small_change, Counted, OptimControl, OptimResult, Optimizer};

/// Multiple of `gtol` accepted when progress stalls on finite-difference noise.
const NEAR_STATIONARY: f64 = 1e3;

#[derive(Debug, Clone)]
pub struct Bfgs {
    /// Relative finite-difference step.
    pub fd_step: f64,
    pub armijo: f64,
    pub max_backtracks: usize,
}

impl Default for Bfgs {
    fn default() -> Self {
        Self {
            fd_step: 1e-6,
            armijo: 1e-4,
            max_backtracks: 40,
        }
    }
}

impl Bfgs {
    /// Central differences, one-sided where the bound blocks the backward step.
    fn gradient(&self, f: &Counted<'_>, x: &[f64], fx: f64, lower: &[f64]) -> Vec<f64> {
        let mut g = vec![0.0; x.len()];
        let mut shifted = x.to_vec();
        for i in 0..x.len() {
            let h = self.fd_step * x[i].abs().max(1.0);
            shifted[i] = x[i] + h;
            let fp = f.eval(&shifted);
            if x[i] - h >= lower[i] {
                shifted[i] = x[i] - h;
                let fm = f.eval(&shifted);
                g[i] = (fp - fm) / (2.0 * h);
            } else {
                g[i] = (fp - fx) / h;
            }
            shifted[i] = x[i];
        }
        g
    }
}

/// Coordinates on their bound whose gradient points out of the feasible set.
fn active_set(x: &[f64], g: &[f64], lower: &[f64]) -> Vec<bool> {
    x.iter()
        .zip(g)
        .zip(lower)
        .map(|((xi, gi), li)| *xi <= *li && *gi > 0.0)
        .collect()
}

fn projected_grad_norm(g: &[f64], active: &[bool]) -> f64 {
    g.iter()
        .zip(active)
        .filter(|(_, a)| !**a)
        .fold(0.0_f64, |m, (gi, _)| m.max(gi.abs()))
}

impl Optimizer for Bfgs {
    fn name(&self) -> &'static str {
        "bfgs"
    }

    fn minimize(
        &self,
        f: &dyn Fn(&[f64]) -> f64,
        x0: &[f64],
        lower: &[f64],
        control: &OptimControl,
    ) -> OptimResult {
        let counted = Counted::new(f);
        let n = x0.len();
        let mut x = x0.to_vec();
        project(&mut x, lower);
        let mut fx = counted.eval(&x);
        let mut g = self.gradient(&counted, &x, fx, lower);
        let mut h = DenseMatrix::identity(n);
        let mut fresh = true;

        let finish = |x: Vec<f64>, fval: f64, evaluations: usize, converged: bool, message: String| {
            OptimResult {
                x,
                fval,
                evaluations,
                converged,
                message,
            }
        };

        loop {
            let active = active_set(&x, &g, lower);
            if projected_grad_norm(&g, &active) <= control.gtol {
                return finish(x, fx, counted.count(), true, "projected gradient below tolerance".into());
            }
            if counted.count() >= control.max_evals {
                return finish(
                    x,
                    fx,
                    counted.count(),
                    false,
                    format!(
                        "maximum number of function evaluations ({}) exceeded",
                        control.max_evals
                    ),
                );
            }

            let g_free: Vec<f64> = g
                .iter()
                .zip(&active)
                .map(|(gi, a)| if *a { 0.0 } else { *gi })
                .collect();
            let mut d: Vec<f64> = h.mat_vec(&g_free).iter().map(|v| -v).collect();
            for (di, a) in d.iter_mut().zip(&active) {
                if *a {
                    *di = 0.0;
                }
            }
            if DenseMatrix::dot(&d, &g_free) >= 0.0 {
                h = DenseMatrix::identity(n);
                fresh = true;
                d = g_free.iter().map(|v| -v).collect();
            }

            let mut alpha = if fresh {
                1.0 / g_free.iter().fold(1.0_f64, |m, v| m.max(v.abs()))
            } else {
                1.0
            };
            let mut accepted = None;
            for _ in 0..self.max_backtracks {
                let mut trial: Vec<f64> = x.iter().zip(&d).map(|(xi, di)| xi + alpha * di).collect();
                project(&mut trial, lower);
                let step: Vec<f64> = trial.iter().zip(&x).map(|(a, b)| a - b).collect();
                let decrease = DenseMatrix::dot(&g, &step);
                let ft = counted.eval(&trial);
                if ft <= fx + self.armijo * decrease && ft < fx {
                    accepted = Some((trial, ft, step));
                    break;
                }
                alpha *= 0.5;
            }

            let Some((x_new, f_new, s)) = accepted else {
                if !fresh {
                    debug!("bfgs: line search failed, resetting curvature");
                    h = DenseMatrix::identity(n);
                    fresh = true;
                    continue;
                }
                let pg = projected_grad_norm(&g, &active);
                let converged = pg <= NEAR_STATIONARY * control.gtol;
                return finish(
                    x,
                    fx,
                    counted.count(),
                    converged,
                    format!("line search found no further decrease (max|projected grad| = {:.3e})", pg),
                );
            };

            let g_new = self.gradient(&counted, &x_new, f_new, lower);
            let done = small_change(fx, f_new, control)
                && projected_grad_norm(&g_new, &active_set(&x_new, &g_new, lower))
                    <= NEAR_STATIONARY * control.gtol;
            let yv: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
            let sy = DenseMatrix::dot(&s, &yv);
            if sy > 1e-12 {
                h = bfgs_update(&h, &s, &yv, sy);
                fresh = false;
            }
            trace!("bfgs: f={:.10} step={:.3e}", f_new, alpha);
            x = x_new;
            fx = f_new;
            g = g_new;

            if done {
                return finish(x, fx, counted.count(), true, "relative function change below tolerance".into());
            }
        }
    }
}

/// H+ = (I - r s y') H (I - r y s') + r s s', r = 1 / (s'y).
fn bfgs_update(h: &DenseMatrix, s: &[f64], y: &[f64], sy: f64) -> DenseMatrix {
    let n = s.len();
    let r = 1.0 / sy;
    let hy = h.mat_vec(y);
    let yhy = DenseMatrix::dot(y, &hy);
    let mut out = h.clone();
    for i in 0..n {
        for j in 0..n {
            let v = h.get(i, j) - r * (s[i] * hy[j] + hy[i] * s[j])
                + (r * r * yhy + r) * s[i] * s[j];
            out.set(i, j, v);
        }
    }
    out
}
