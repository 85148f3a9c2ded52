//! Fitted model representation, persistence and text summaries.

pub mod fitted;
pub mod serialization;
pub mod summary;

pub use fitted::{FittedModel, FixedEffect, OptimizerOutcome, VarianceComponent};
