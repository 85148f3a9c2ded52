//! mixlm-data: Survey tables for mixlm
//!
//! Loads delimited respondent files into column-oriented datasets, checks
//! them against the survey schema, standardizes continuous predictors,
//! expands prediction grids and simulates survey data for demos and tests.

pub mod error;
pub mod grid;
pub mod scale;
pub mod simulate;
pub mod survey;
pub mod table;

pub use error::DataError;
pub use grid::PredictionGrid;
pub use scale::Scaling;
pub use survey::Observation;
pub use table::{Column, Dataset, Factor};
