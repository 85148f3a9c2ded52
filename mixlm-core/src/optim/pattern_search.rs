//! Hooke-Jeeves pattern search.
//!
//! Exploratory moves try each coordinate by ± the current step; a
//! successful sweep is followed by a pattern move along the sweep's
//! direction. Steps halve when a sweep finds nothing better.

use tracing::trace;

use super::{project, Counted, OptimControl, OptimResult, Optimizer};

#[derive(Debug, Clone)]
pub struct PatternSearch {
    /// Initial step, relative to max(1, |x0_i|).
    pub initial_step: f64,
    pub shrink: f64,
}

impl Default for PatternSearch {
    fn default() -> Self {
        Self {
            initial_step: 0.25,
            shrink: 0.5,
        }
    }
}

/// One coordinate sweep around `base`. Returns the best point found.
fn explore(
    f: &Counted<'_>,
    base: &[f64],
    fbase: f64,
    steps: &[f64],
    lower: &[f64],
) -> (Vec<f64>, f64) {
    let mut x = base.to_vec();
    let mut fx = fbase;
    for i in 0..x.len() {
        for dir in [1.0, -1.0] {
            let mut trial = x.clone();
            trial[i] += dir * steps[i];
            project(&mut trial, lower);
            if trial[i] == x[i] {
                continue;
            }
            let ft = f.eval(&trial);
            if ft < fx {
                x = trial;
                fx = ft;
                break;
            }
        }
    }
    (x, fx)
}

impl Optimizer for PatternSearch {
    fn name(&self) -> &'static str {
        "pattern-search"
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
        let mut steps: Vec<f64> = x
            .iter()
            .map(|v| self.initial_step * v.abs().max(1.0))
            .collect();

        loop {
            let scale = x.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
            if steps.iter().all(|s| *s <= control.xtol_rel * scale) {
                return OptimResult {
                    x,
                    fval: fx,
                    evaluations: counted.count(),
                    converged: true,
                    message: "step size below parameter tolerance".into(),
                };
            }
            if counted.count() >= control.max_evals {
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

            let (mut y, mut fy) = explore(&counted, &x, fx, &steps, lower);
            if fy >= fx {
                for s in steps.iter_mut() {
                    *s *= self.shrink;
                }
                trace!("pattern-search: shrink, f={:.8}", fx);
                continue;
            }

            // Pattern moves while they keep paying off.
            loop {
                let mut pattern: Vec<f64> = y.iter().zip(&x).map(|(a, b)| 2.0 * a - b).collect();
                project(&mut pattern, lower);
                x = y.clone();
                fx = fy;
                let fp = counted.eval(&pattern);
                let (z, fz) = explore(&counted, &pattern, fp, &steps, lower);
                if fz < fx && counted.count() < control.max_evals {
                    y = z;
                    fy = fz;
                } else {
                    break;
                }
            }
            trace!("pattern-search: f={:.8}", fx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_problems::*;
    use super::*;

    #[test]
    fn test_quadratic() {
        let res = PatternSearch::default().minimize(
            &quadratic,
            &[0.0, 0.0, 0.0],
            &[f64::NEG_INFINITY; 3],
            &OptimControl::default(),
        );
        assert!(res.converged, "{}", res.message);
        assert!((res.x[0] - 1.0).abs() < 1e-4);
        assert!((res.x[1] + 2.0).abs() < 1e-4);
        assert!((res.x[2] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_stops_at_bound() {
        let res = PatternSearch::default().minimize(
            &bounded,
            &[2.0, 0.0],
            &[0.0, f64::NEG_INFINITY],
            &OptimControl::default(),
        );
        assert_eq!(res.x[0], 0.0);
        assert!((res.fval - 1.0).abs() < 1e-8);
    }
}
