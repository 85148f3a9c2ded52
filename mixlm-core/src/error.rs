//! Error type shared by every stage of the modeling pipeline.

use mixlm_data::DataError;
use mixlm_linalg::LinalgError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MixlmError {
    /// The optimizer stopped without meeting its tolerance, or the optimum
    /// failed the post-fit gradient check. Not fatal: retry with another
    /// optimizer or rescaled predictors.
    #[error("{optimizer}: {message}")]
    ConvergenceFailure { optimizer: String, message: String },

    /// Likelihood-ratio test requested for models that are not nested fits
    /// of the same data under maximum likelihood.
    #[error("Invalid model comparison: {0}")]
    InvalidComparison(String),

    #[error("Invalid model formula: {0}")]
    Specification(String),

    #[error("Cannot build model matrices: {0}")]
    Design(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] LinalgError),

    #[error("Model file error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MixlmError>;
