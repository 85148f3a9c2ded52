//! mixlm: linear mixed-effects models for clustered survey data.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mixlm",
    version,
    about = "Fit, diagnose and compare linear mixed models on survey data",
    long_about = "Fits lme4-style linear mixed models by REML or ML to respondent-level\n\
                   survey tables, with convergence diagnostics across optimizers,\n\
                   likelihood-ratio tests, BLUP export and grid predictions."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a model and print its summary
    Fit(commands::fit::FitCmdArgs),

    /// Fit a model under several optimizers and report convergence
    Diagnose(commands::diagnose::DiagnoseArgs),

    /// Likelihood-ratio test between two nested ML fits
    Compare(commands::compare::CompareArgs),

    /// Export random-effect predictions (BLUPs)
    Ranef(commands::ranef::RanefArgs),

    /// Predict on a covariate grid or a table
    Predict(commands::predict::PredictArgs),

    /// Write a simulated survey table
    Simulate(commands::simulate::SimulateArgs),

    /// Print the summary of a saved model
    Summary(commands::summary::SummaryArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("mixlm v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::Fit(args) => commands::fit::run(args),
        Commands::Diagnose(args) => commands::diagnose::run(args),
        Commands::Compare(args) => commands::compare::run(args),
        Commands::Ranef(args) => commands::ranef::run(args),
        Commands::Predict(args) => commands::predict::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Summary(args) => commands::summary::run(args),
    }
}
