//! Subcommands and the options they share.

pub mod compare;
pub mod diagnose;
pub mod fit;
pub mod predict;
pub mod ranef;
pub mod simulate;
pub mod summary;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use mixlm_core::lmm::{Criterion, FitConfig};
use mixlm_core::model::serialization::{model_path, save_model, save_model_json, sidecar_path};
use mixlm_core::model::FittedModel;
use mixlm_core::optim::{OptimControl, OptimizerKind};
use mixlm_data::survey::load_survey;
use mixlm_data::table::{read_delimited, ReadOptions};
use mixlm_data::Dataset;

/// Input table options.
#[derive(Args, Debug)]
pub struct DataArgs {
    /// Respondent table (tab, comma or whitespace separated, header row)
    #[arg(long)]
    pub data: String,

    /// Read any table instead of checking the survey schema
    #[arg(long, default_value = "false")]
    pub no_schema: bool,

    /// Columns read as categorical when --no-schema is set (comma-separated)
    #[arg(long, default_value = "")]
    pub categorical: String,
}

impl DataArgs {
    pub fn load(&self) -> Result<Dataset> {
        let path = Path::new(&self.data);
        let data = if self.no_schema {
            let options = ReadOptions {
                categorical: split_list(&self.categorical),
            };
            read_delimited(path, &options)
        } else {
            load_survey(path)
        }
        .with_context(|| format!("loading {}", self.data))?;
        info!("{} rows x {} columns", data.n_rows(), data.n_cols());
        Ok(data)
    }
}

/// Estimation options.
#[derive(Args, Debug)]
pub struct FitArgs {
    /// Fit by restricted maximum likelihood (default)
    #[arg(long, default_value = "false", conflicts_with = "ml")]
    pub reml: bool,

    /// Fit by full maximum likelihood (required for likelihood-ratio tests)
    #[arg(long, default_value = "false")]
    pub ml: bool,

    /// Optimizer: nelder-mead, pattern-search or bfgs
    #[arg(long, default_value = "nelder-mead")]
    pub optimizer: OptimizerKind,

    /// Maximum deviance evaluations per fit
    #[arg(long, default_value = "10000")]
    pub max_evals: usize,

    /// Absolute deviance change treated as no progress (every optimizer)
    #[arg(long, default_value = "1e-8")]
    pub tol: f64,

    /// Projected gradient norm at which bfgs stops
    #[arg(long, default_value = "1e-5")]
    pub gtol: f64,

    /// Skip the post-fit gradient and Hessian checks
    #[arg(long, default_value = "false")]
    pub no_check: bool,
}

impl FitArgs {
    pub fn criterion(&self) -> Criterion {
        match (self.reml, self.ml) {
            (false, true) => Criterion::Ml,
            _ => Criterion::Reml,
        }
    }

    pub fn config(&self) -> FitConfig {
        let mut config = FitConfig::default()
            .with_criterion(self.criterion())
            .with_optimizer(self.optimizer);
        config.control = OptimControl {
            max_evals: self.max_evals,
            ftol_abs: self.tol,
            gtol: self.gtol,
            ..OptimControl::default()
        };
        config.check_convergence = !self.no_check;
        config
    }
}

/// Write `<prefix>.mixlm.model` and optionally its JSON sidecar.
pub fn write_model(model: &FittedModel, prefix: &str, json: bool) -> Result<()> {
    let path = model_path(prefix);
    save_model(model, &path).with_context(|| format!("writing {}", path.display()))?;
    if json {
        let sidecar = sidecar_path(&path);
        save_model_json(model, &sidecar)
            .with_context(|| format!("writing {}", sidecar.display()))?;
        info!("Saved JSON sidecar to {}", sidecar.display());
    }
    Ok(())
}

/// Split a comma-separated option into trimmed, non-empty items.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Write `text` to `path`, or to stdout when no path is given.
pub fn emit(text: &str, path: Option<&str>) -> Result<()> {
    match path {
        Some(p) => {
            std::fs::write(p, text).with_context(|| format!("writing {}", p))?;
            info!("Wrote {}", p);
        }
        None => print!("{}", text),
    }
    Ok(())
}
