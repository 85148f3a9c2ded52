//! Error type for table loading and reshaping.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Column '{name}' is not {expected}")]
    ColumnType { name: String, expected: &'static str },

    #[error("Column '{name}' has {got} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Cannot standardize '{name}': {reason}")]
    Scaling { name: String, reason: String },

    #[error("Prediction grid axis '{0}' has no values")]
    EmptyAxis(String),
}
