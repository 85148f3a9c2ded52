//! Nelder-Mead simplex search with projection onto the lower bounds.
//!
//! A collapsed simplex on a bound can stall short of the optimum, so the
//! search restarts from the best vertex until a restart no longer improves.
//! A run that ends with a coordinate on its bound gets one more restart from
//! a point stepped into the feasible region; its result is kept only if it
//! is better.

use tracing::{debug, trace};

use super::{project, small_change, Counted, OptimControl, OptimResult, Optimizer};

#[derive(Debug, Clone)]
pub struct NelderMead {
    /// Initial simplex edge, relative to max(1, |x0_i|).
    pub initial_step: f64,
    pub max_restarts: usize,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            initial_step: 0.2,
            max_restarts: 4,
        }
    }
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

enum Stop {
    Tolerance,
    Budget,
}

impl NelderMead {
    fn run(
        &self,
        f: &Counted<'_>,
        start: &[f64],
        fstart: f64,
        lower: &[f64],
        control: &OptimControl,
    ) -> (Vec<f64>, f64, Stop) {
        let n = start.len();
        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((start.to_vec(), fstart));
        for i in 0..n {
            let mut v = start.to_vec();
            v[i] += self.initial_step * start[i].abs().max(1.0);
            let fv = f.eval(&v);
            simplex.push((v, fv));
        }

        loop {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
            let (best_f, worst_f) = (simplex[0].1, simplex[n].1);
            let spread = simplex
                .iter()
                .skip(1)
                .flat_map(|(v, _)| v.iter().zip(&simplex[0].0).map(|(a, b)| (a - b).abs()))
                .fold(0.0_f64, f64::max);
            let scale = simplex[0].0.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
            if small_change(best_f, worst_f, control) || spread <= control.xtol_rel * scale {
                return (simplex[0].0.clone(), best_f, Stop::Tolerance);
            }
            if f.count() >= control.max_evals {
                return (simplex[0].0.clone(), best_f, Stop::Budget);
            }
            trace!("nelder-mead: best={:.8} worst={:.8}", best_f, worst_f);

            let mut centroid = vec![0.0; n];
            for (v, _) in &simplex[..n] {
                for (c, x) in centroid.iter_mut().zip(v) {
                    *c += x / n as f64;
                }
            }
            let toward = |coef: f64| -> Vec<f64> {
                let mut p: Vec<f64> = centroid
                    .iter()
                    .zip(&simplex[n].0)
                    .map(|(c, w)| c + coef * (c - w))
                    .collect();
                project(&mut p, lower);
                p
            };

            let reflected = toward(REFLECT);
            let fr = f.eval(&reflected);
            if fr < best_f {
                let expanded = toward(EXPAND);
                let fe = f.eval(&expanded);
                simplex[n] = if fe < fr { (expanded, fe) } else { (reflected, fr) };
                continue;
            }
            if fr < simplex[n - 1].1 {
                simplex[n] = (reflected, fr);
                continue;
            }
            let (contracted, fc) = if fr < worst_f {
                let c = toward(REFLECT * CONTRACT);
                let fc = f.eval(&c);
                (c, fc)
            } else {
                let c = toward(-CONTRACT);
                let fc = f.eval(&c);
                (c, fc)
            };
            if fc < worst_f.min(fr) {
                simplex[n] = (contracted, fc);
                continue;
            }
            let best = simplex[0].0.clone();
            for (v, fv) in simplex.iter_mut().skip(1) {
                for (x, b) in v.iter_mut().zip(&best) {
                    *x = b + SHRINK * (*x - b);
                }
                *fv = f.eval(v);
            }
        }
    }
}

impl Optimizer for NelderMead {
    fn name(&self) -> &'static str {
        "nelder-mead"
    }

    fn minimize(
        &self,
        f: &dyn Fn(&[f64]) -> f64,
        x0: &[f64],
        lower: &[f64],
        control: &OptimControl,
    ) -> OptimResult {
        let counted = Counted::new(f);
        let mut x = x0.to_vec();
        project(&mut x, lower);
        let mut fx = counted.eval(&x);

        if x.is_empty() {
            return OptimResult {
                x,
                fval: fx,
                evaluations: counted.count(),
                converged: true,
                message: "no parameters to optimize".into(),
            };
        }

        let mut restarts = 0;
        let mut start = x.clone();
        let mut fstart = fx;
        let mut retried_bound = false;
        loop {
            let (xn, fnew, stop) = self.run(&counted, &start, fstart, lower, control);
            let improved = fnew < fx && !small_change(fx, fnew, control);
            if fnew < fx {
                x = xn;
                fx = fnew;
            }
            if let Stop::Budget = stop {
                return OptimResult {
                    x,
                    fval: fx,
                    evaluations: counted.count(),
                    converged: false,
                    message: format!(
                        "maximum number of function evaluations ({}) exceeded",
                        control.max_evals
                    ),
                };
            }

            let bound = on_bound(&x, lower);
            let next = if restarts >= self.max_restarts {
                None
            } else if improved {
                retried_bound = false;
                Some(x.clone())
            } else if !bound.is_empty() && !retried_bound {
                retried_bound = true;
                Some(self.step_off_bounds(&x, lower, &bound))
            } else {
                None
            };

            match next {
                Some(s) => {
                    restarts += 1;
                    fstart = if s == x { fx } else { counted.eval(&s) };
                    debug!(
                        "nelder-mead: restart {} at f={:.8}{}",
                        restarts,
                        fx,
                        if retried_bound { " (off bound)" } else { "" }
                    );
                    start = s;
                }
                None => {
                    return OptimResult {
                        x,
                        fval: fx,
                        evaluations: counted.count(),
                        converged: true,
                        message: "simplex converged (function value tolerance reached)".into(),
                    }
                }
            }
        }
    }
}

impl NelderMead {
    /// Copy of `x` with the coordinates in `bound` moved one initial step
    /// into the feasible region.
    fn step_off_bounds(&self, x: &[f64], lower: &[f64], bound: &[usize]) -> Vec<f64> {
        let mut s = x.to_vec();
        for &i in bound {
            s[i] = lower[i] + self.initial_step * lower[i].abs().max(1.0);
        }
        s
    }
}

/// Indices of coordinates sitting on a finite lower bound.
fn on_bound(x: &[f64], lower: &[f64]) -> Vec<usize> {
    x.iter()
        .zip(lower)
        .enumerate()
        .filter(|(_, (xi, li))| li.is_finite() && **xi <= **li)
        .map(|(i, _)| i)
        .collect()
}
