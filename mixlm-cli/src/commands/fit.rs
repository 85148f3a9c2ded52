//! Fit a linear mixed model and print its summary.
//!
//! mixlm fit --data survey.tsv --formula "therm_dem ~ scale(age) + partyid + (1 | state)" --output-prefix out/m1

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use mixlm_core::formula::ModelSpec;
use mixlm_core::lmm::ModelFitter;
use mixlm_core::model::summary::model_summary;

use super::{write_model, DataArgs, FitArgs};

#[derive(Args)]
pub struct FitCmdArgs {
    #[command(flatten)]
    data: DataArgs,

    /// Model formula in lme4 syntax
    #[arg(long)]
    formula: String,

    #[command(flatten)]
    fit: FitArgs,

    /// Output prefix for <prefix>.mixlm.model
    #[arg(long)]
    output_prefix: Option<String>,

    /// Also save JSON sidecar for inspection
    #[arg(long, default_value = "false")]
    save_json: bool,
}

pub fn run(args: FitCmdArgs) -> Result<()> {
    let spec = ModelSpec::parse(&args.formula)?;
    let data = args.data.load()?;
    let config = args.fit.config();
    info!("=== mixlm fit: {} ===", spec);
    info!("Criterion: {}, optimizer: {}", config.criterion, config.optimizer);

    let model = ModelFitter::new(config)
        .fit(&data, &spec)
        .with_context(|| format!("fitting {}", spec))?;

    print!("{}", model_summary(&model));

    if let Some(prefix) = &args.output_prefix {
        write_model(&model, prefix, args.save_json)?;
    }
    Ok(())
}
