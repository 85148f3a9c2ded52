//! Likelihood-ratio test between two saved ML fits.
//!
//! mixlm compare --model-a m0.mixlm.model --model-b m1.mixlm.model

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use mixlm_core::compare::likelihood_ratio_test;
use mixlm_core::model::serialization::load_model;

#[derive(Args)]
pub struct CompareArgs {
    /// First model file (.mixlm.model)
    #[arg(long)]
    model_a: String,

    /// Second model file (.mixlm.model)
    #[arg(long)]
    model_b: String,
}

pub fn run(args: CompareArgs) -> Result<()> {
    let a = load_model(Path::new(&args.model_a))
        .with_context(|| format!("loading {}", args.model_a))?;
    let b = load_model(Path::new(&args.model_b))
        .with_context(|| format!("loading {}", args.model_b))?;
    let result = likelihood_ratio_test(&a, &b)?;
    println!("{}", result);
    Ok(())
}
