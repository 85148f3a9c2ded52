//! Convergence diagnosis: fit one model under several optimizers.
//!
//! Each run is an independent fit of the same model frame; the report says,
//! per optimizer, whether it converged and with what message. Runs execute
//! on the current rayon pool and are reported in request order.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{info, warn};

use mixlm_data::Dataset;

use crate::design::build_model_frame;
use crate::error::{MixlmError, Result};
use crate::formula::ModelSpec;
use crate::lmm::{FitConfig, ModelFitter};
use crate::model::FittedModel;
use crate::optim::OptimizerKind;

/// Outcome of fitting under one optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerReport {
    pub optimizer: OptimizerKind,
    pub converged: bool,
    /// Optimizer message on success, failure text otherwise.
    pub message: String,
    pub deviance: Option<f64>,
    pub evaluations: Option<usize>,
    pub max_grad: Option<f64>,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
    pub model: Option<FittedModel>,
}

/// Fit `spec` under every optimizer in `optimizers`.
///
/// Specification and design errors are returned immediately, since no
/// optimizer could succeed. Any error inside a run is that optimizer's
/// failed entry; the other runs continue.
pub fn diagnose_convergence(
    data: &Dataset,
    spec: &ModelSpec,
    base: &FitConfig,
    optimizers: &[OptimizerKind],
) -> Result<Vec<OptimizerReport>> {
    let frame = build_model_frame(data, spec)?;
    info!(
        "Diagnosing {} with {} optimizers on {} threads",
        spec,
        optimizers.len(),
        rayon::current_num_threads()
    );

    let reports: Vec<OptimizerReport> = optimizers
        .par_iter()
        .map(|&kind| {
            let fitter = ModelFitter::new(base.clone().with_optimizer(kind));
            let start = Instant::now();
            let result = fitter.fit_frame(spec, &frame);
            report(kind, result, start.elapsed())
        })
        .collect();

    let n_ok = reports.iter().filter(|r| r.converged).count();
    info!("{}/{} optimizers converged", n_ok, reports.len());
    Ok(reports)
}

fn report(kind: OptimizerKind, result: Result<FittedModel>, elapsed: Duration) -> OptimizerReport {
    match result {
        Ok(model) => OptimizerReport {
            optimizer: kind,
            converged: true,
            message: model.outcome.message.clone(),
            deviance: Some(model.deviance),
            evaluations: Some(model.outcome.evaluations),
            max_grad: model.outcome.max_grad,
            warnings: model.warnings.clone(),
            elapsed,
            model: Some(model),
        },
        Err(e) => {
            let message = match e {
                MixlmError::ConvergenceFailure { message, .. } => message,
                other => other.to_string(),
            };
            warn!("{}: {}", kind, message);
            OptimizerReport {
                optimizer: kind,
                converged: false,
                message,
                deviance: None,
                evaluations: None,
                max_grad: None,
                warnings: Vec::new(),
                elapsed,
                model: None,
            }
        }
    }
}

/// First converged report in request order.
pub fn first_converged(reports: &[OptimizerReport]) -> Option<&OptimizerReport> {
    reports.iter().find(|r| r.converged)
}
