//! mixlm-linalg: Linear algebra wrappers for mixlm
//!
//! Provides the dense and sparse matrix types, Cholesky/QR factorizations
//! and symmetric eigenvalues used by the mixed model deviance evaluation.

pub mod dense;
pub mod sparse;
pub mod decomposition;

pub use decomposition::LinalgError;
pub use dense::DenseMatrix;
pub use sparse::SparseMatrix;
