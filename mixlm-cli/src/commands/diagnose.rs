//! Fit one model under several optimizers and report which converge.
//!
//! mixlm diagnose --data survey.tsv --formula "..." --optimizers nelder-mead,bfgs

use anyhow::{bail, Result};
use clap::Args;
use tracing::info;

use mixlm_core::diagnose::{diagnose_convergence, first_converged};
use mixlm_core::formula::ModelSpec;
use mixlm_core::optim::OptimizerKind;

use super::{split_list, write_model, DataArgs, FitArgs};

#[derive(Args)]
pub struct DiagnoseArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Model formula in lme4 syntax
    #[arg(long)]
    formula: String,

    #[command(flatten)]
    fit: FitArgs,

    /// Optimizers to try, in order (comma-separated; default all)
    #[arg(long, default_value = "")]
    optimizers: String,

    /// Save the first converged fit to <prefix>.mixlm.model
    #[arg(long)]
    output_prefix: Option<String>,
}

pub fn run(args: DiagnoseArgs) -> Result<()> {
    let spec = ModelSpec::parse(&args.formula)?;
    let kinds: Vec<OptimizerKind> = if args.optimizers.is_empty() {
        OptimizerKind::ALL.to_vec()
    } else {
        split_list(&args.optimizers)
            .iter()
            .map(|s| s.parse::<OptimizerKind>().map_err(anyhow::Error::msg))
            .collect::<Result<_>>()?
    };
    let data = args.data.load()?;
    info!("=== mixlm diagnose: {} ===", spec);

    let reports = diagnose_convergence(&data, &spec, &args.fit.config(), &kinds)?;

    println!(
        "{:<16} {:<10} {:>12} {:>8} {:>10} {:>9}  message",
        "optimizer", "status", "deviance", "evals", "max|grad|", "time(s)"
    );
    for r in &reports {
        let fmt_opt = |v: Option<f64>, prec: usize| {
            v.map_or_else(|| "-".to_string(), |x| format!("{:.*}", prec, x))
        };
        println!(
            "{:<16} {:<10} {:>12} {:>8} {:>10} {:>9.3}  {}",
            r.optimizer.as_str(),
            if r.converged { "ok" } else { "FAILED" },
            fmt_opt(r.deviance, 4),
            r.evaluations.map_or_else(|| "-".to_string(), |e| e.to_string()),
            r.max_grad.map_or_else(|| "-".to_string(), |g| format!("{:.2e}", g)),
            r.elapsed.as_secs_f64(),
            r.message
        );
        for w in &r.warnings {
            println!("{:<16} warning: {}", "", w);
        }
    }

    match first_converged(&reports) {
        Some(best) => {
            println!("\nFirst converged optimizer: {}", best.optimizer);
            if let (Some(prefix), Some(model)) = (&args.output_prefix, &best.model) {
                write_model(model, prefix, false)?;
            }
            Ok(())
        }
        None => bail!(
            "no optimizer converged for {}; consider standardizing predictors with scale()",
            spec
        ),
    }
}
