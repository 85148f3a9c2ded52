//! Print the summary of a saved model.
//!
//! mixlm summary --model-file m1.mixlm.model

use std::path::Path;

use anyhow::Result;
use clap::Args;

use mixlm_core::model::serialization::load_model;
use mixlm_core::model::summary::model_summary;

#[derive(Args)]
pub struct SummaryArgs {
    /// Model file (.mixlm.model)
    #[arg(long)]
    model_file: String,
}

pub fn run(args: SummaryArgs) -> Result<()> {
    let model = load_model(Path::new(&args.model_file))?;
    print!("{}", model_summary(&model));
    Ok(())
}
