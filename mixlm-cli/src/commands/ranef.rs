//! Export random-effect predictions (BLUPs) with conditional SDs.
//!
//! mixlm ranef --model-file m1.mixlm.model --output blups.tsv

use std::path::Path;

use anyhow::Result;
use clap::Args;

use mixlm_core::model::serialization::load_model;
use mixlm_core::ranef::{cluster_coefficients, random_effects, ranef_dataset};

use super::emit;

#[derive(Args)]
pub struct RanefArgs {
    /// Model file (.mixlm.model)
    #[arg(long)]
    model_file: String,

    /// Report fixed + random coefficients per cluster instead of deviations
    #[arg(long, default_value = "false")]
    coefficients: bool,

    /// Output TSV (stdout when omitted)
    #[arg(long)]
    output: Option<String>,
}

pub fn run(args: RanefArgs) -> Result<()> {
    let model = load_model(Path::new(&args.model_file))?;
    if model.design.random.is_empty() {
        anyhow::bail!("'{}' has no random-effect terms", model.formula());
    }
    let tables = if args.coefficients {
        cluster_coefficients(&model)
    } else {
        random_effects(&model)
    };
    let data = ranef_dataset(&tables)?;
    emit(&data.to_tsv(), args.output.as_deref())
}
