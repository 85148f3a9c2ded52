//! Model fitting: optimize the profiled deviance over θ and assemble a
//! [`FittedModel`] at the optimum.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mixlm_data::Dataset;
use mixlm_linalg::DenseMatrix;

use super::checks::{check_convergence, scale_disparity};
use super::deviance::{Criterion, DevianceEval, DevianceProblem};
use super::theta;
use crate::design::{build_model_frame, ModelFrame};
use crate::error::{MixlmError, Result};
use crate::formula::ModelSpec;
use crate::model::fitted::{FittedModel, OptimizerOutcome, VarianceComponent};
use crate::optim::{OptimControl, OptimizerKind};

/// Name reported for fits without random terms.
pub const CLOSED_FORM: &str = "closed-form";

/// Configuration for one fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    pub criterion: Criterion,
    pub optimizer: OptimizerKind,
    pub control: OptimControl,
    /// Run the post-fit gradient and Hessian checks.
    pub check_convergence: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            criterion: Criterion::Reml,
            optimizer: OptimizerKind::NelderMead,
            control: OptimControl::default(),
            check_convergence: true,
        }
    }
}

impl FitConfig {
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_optimizer(mut self, optimizer: OptimizerKind) -> Self {
        self.optimizer = optimizer;
        self
    }
}

/// Fits linear mixed models under a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct ModelFitter {
    config: FitConfig,
}

impl ModelFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit `spec` to `data`.
    ///
    /// Fails with [`MixlmError::ConvergenceFailure`] when the optimizer runs
    /// out of evaluations or the optimum fails the gradient check.
    pub fn fit(&self, data: &Dataset, spec: &ModelSpec) -> Result<FittedModel> {
        let frame = build_model_frame(data, spec)?;
        self.fit_frame(spec, &frame)
    }

    /// Fit from prebuilt model matrices.
    pub fn fit_frame(&self, spec: &ModelSpec, frame: &ModelFrame) -> Result<FittedModel> {
        let config = &self.config;
        info!(
            "Fitting {} by {} (n={}, p={}, q={})",
            spec,
            config.criterion,
            frame.n_obs(),
            frame.x.ncols(),
            frame.z.ncols()
        );

        let mut warnings = Vec::new();
        if let Some(w) = scale_disparity(&frame.x) {
            warn!("{}", w);
            warnings.push(w);
        }

        let blocks = &frame.design.random;
        let problem = DevianceProblem::new(frame, config.criterion);
        let names = theta::theta_names(blocks);

        let (theta_hat, mut outcome, singular) = if blocks.is_empty() {
            (
                Vec::new(),
                OptimizerOutcome {
                    optimizer: CLOSED_FORM.to_string(),
                    evaluations: 1,
                    converged: true,
                    message: "no random effects: ordinary least squares".into(),
                    max_grad: None,
                },
                false,
            )
        } else {
            let optimizer = config.optimizer.build();
            let lower = theta::lower_bounds(blocks);
            let theta0 = theta::initial_theta(blocks);
            let objective = |t: &[f64]| problem.deviance(t);
            let res = optimizer.minimize(&objective, &theta0, &lower, &config.control);
            info!(
                "{}: {} after {} evaluations, deviance {:.4}",
                optimizer.name(),
                res.message,
                res.evaluations,
                res.fval
            );
            if !res.converged {
                return Err(MixlmError::ConvergenceFailure {
                    optimizer: optimizer.name().to_string(),
                    message: res.message,
                });
            }

            let mut max_grad = None;
            let mut singular = false;
            if config.check_convergence {
                let diagonal = theta::diagonal_mask(blocks);
                let report = check_convergence(&objective, &res.x, &lower, &diagonal, &names);
                if let Some(failure) = report.failure {
                    warn!("{}: {}", optimizer.name(), failure);
                    return Err(MixlmError::ConvergenceFailure {
                        optimizer: optimizer.name().to_string(),
                        message: failure,
                    });
                }
                for w in &report.warnings {
                    warn!("{}", w);
                }
                warnings.extend(report.warnings);
                max_grad = Some(report.max_grad);
                singular = report.singular;
            }
            (
                res.x,
                OptimizerOutcome {
                    optimizer: optimizer.name().to_string(),
                    evaluations: res.evaluations,
                    converged: true,
                    message: res.message,
                    max_grad,
                },
                singular,
            )
        };

        let eval = problem.evaluate(&theta_hat)?;
        if blocks.is_empty() {
            outcome.message = format!("{} (deviance {:.4})", outcome.message, eval.deviance);
        }
        debug!("theta = {:?}, sigma^2 = {:.6}", theta_hat, eval.sigma2);
        Ok(assemble(spec, frame, config.criterion, theta_hat, names, &eval, outcome, warnings, singular))
    }
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    spec: &ModelSpec,
    frame: &ModelFrame,
    criterion: Criterion,
    theta_hat: Vec<f64>,
    theta_names: Vec<String>,
    eval: &DevianceEval,
    outcome: OptimizerOutcome,
    warnings: Vec<String>,
    singular: bool,
) -> FittedModel {
    let blocks = &frame.design.random;
    let sigma2 = eval.sigma2;

    let vcov_beta = eval.rx.inverse().scale(sigma2);
    let p = vcov_beta.nrows();
    let vcov_flat: Vec<f64> = (0..p).flat_map(|j| vcov_beta.col(j)).collect();

    let variance_components = blocks
        .iter()
        .zip(theta::templates(blocks, &theta_hat))
        .map(|(block, t)| {
            let cov = theta::relative_covariance(&t).scale(sigma2);
            let k = block.dim();
            VarianceComponent {
                group: block.group.clone(),
                coefficients: block.coefficients.clone(),
                correlated: block.correlated,
                covariance: (0..k).flat_map(|j| cov.col(j)).collect(),
            }
        })
        .collect();

    // diag(σ² Λ A⁻¹ Λ') with A⁻¹ = L⁻ᵀ L⁻¹.
    let m = eval.l.solve_lower_mat(&eval.lambda.transpose());
    let random_effect_variances: Vec<f64> = (0..m.ncols())
        .map(|i| sigma2 * m.col(i).iter().map(|v| v * v).sum::<f64>())
        .collect();

    let xb = frame.x.mat_vec(&eval.beta);
    let zb = frame.z.mat_vec(&eval.b);
    let fitted: Vec<f64> = xb.iter().zip(&zb).map(|(a, b)| a + b).collect();
    let residuals: Vec<f64> = frame.y.iter().zip(&fitted).map(|(y, f)| y - f).collect();

    FittedModel {
        spec: spec.clone(),
        criterion,
        design: frame.design.clone(),
        n_obs: frame.n_obs(),
        n_dropped: frame.n_dropped,
        beta: eval.beta.clone(),
        vcov_beta: vcov_flat,
        theta: theta_hat,
        theta_names,
        sigma: sigma2.sqrt(),
        variance_components,
        random_effects: eval.b.clone(),
        random_effect_variances,
        deviance: eval.deviance,
        log_likelihood: -0.5 * eval.deviance,
        fitted,
        residuals,
        outcome,
        warnings,
        singular,
    }
}

/// OLS coefficients via QR, used to cross-check fits without random terms.
pub fn ordinary_least_squares(x: &DenseMatrix, y: &[f64]) -> Result<Vec<f64>> {
    let qr = mixlm_linalg::decomposition::QrDecomp::new(x)?;
    Ok(qr.solve(y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixlm_data::simulate::{simulate_survey, SimulationConfig};
    use mixlm_data::survey::observations_to_dataset;

    fn survey(n: usize) -> Dataset {
        let obs = simulate_survey(&SimulationConfig {
            n_respondents: n,
            ..Default::default()
        })
        .unwrap();
        observations_to_dataset(&obs).unwrap()
    }

    #[test]
    fn test_no_random_terms_is_ols() {
        let data = survey(400);
        let spec = ModelSpec::parse("therm_dem ~ age + female + partyid").unwrap();
        let model = ModelFitter::default().fit(&data, &spec).unwrap();
        assert_eq!(model.outcome.optimizer, CLOSED_FORM);
        let frame = build_model_frame(&data, &spec).unwrap();
        let ols = ordinary_least_squares(&frame.x, &frame.y).unwrap();
        for (a, b) in model.beta.iter().zip(&ols) {
            assert!((a - b).abs() < 1e-8, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_random_intercept_fit() {
        let data = survey(600);
        let spec = ModelSpec::parse("therm_dem ~ scale(age) + partyid + (1 | state)").unwrap();
        let model = ModelFitter::default().fit(&data, &spec).unwrap();
        assert_eq!(model.theta.len(), 1);
        assert!(model.theta[0] > 0.0);
        assert_eq!(model.variance_components[0].group, "state");
        assert_eq!(model.random_effects.len(), 50);
        assert!(model.random_effect_variances.iter().all(|v| *v > 0.0));
        assert!(model.sigma > 5.0 && model.sigma < 30.0);
        assert_eq!(model.n_params(), model.beta.len() + 2);
    }

    #[test]
    fn test_budget_exhaustion_is_convergence_failure() {
        let data = survey(300);
        let spec = ModelSpec::parse("therm_dem ~ scale(age) + (1 + scale(age) | state)").unwrap();
        let mut config = FitConfig::default();
        config.control.max_evals = 3;
        let err = ModelFitter::new(config).fit(&data, &spec).unwrap_err();
        match err {
            MixlmError::ConvergenceFailure { optimizer, message } => {
                assert_eq!(optimizer, "nelder-mead");
                assert!(message.contains("maximum number"));
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
