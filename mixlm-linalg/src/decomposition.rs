#![allow(clippy::needless_range_loop)]
//! Matrix decompositions and solvers.
//!
//! Cholesky factorization with separate triangular solves (the profiled
//! deviance needs L^{-1} applied on its own), thin QR for least squares
//! and rank checks, and symmetric eigenvalues through faer.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Singular matrix encountered")]
    SingularMatrix,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Result of a Cholesky decomposition.
#[derive(Debug, Clone)]
pub struct CholeskyDecomp {
    /// Lower triangular factor L such that A = L * L'.
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Compute the Cholesky decomposition of a symmetric positive definite matrix.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            let diag = a.get(j, j) - sum;
            if diag <= 0.0 || !diag.is_finite() {
                return Err(LinalgError::NotPositiveDefinite);
            }
            l.set(j, j, diag.sqrt());

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Dimension of the factored matrix.
    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// Forward substitution: solve L * y = b.
    pub fn solve_lower(&self, b: &[f64]) -> Vec<f64> {
        let n = self.dim();
        assert_eq!(b.len(), n);
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * y[j];
            }
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }
        y
    }

    /// Backward substitution: solve L' * x = y.
    pub fn solve_upper(&self, y: &[f64]) -> Vec<f64> {
        let n = self.dim();
        assert_eq!(y.len(), n);
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * x[j];
            }
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }
        x
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        self.solve_upper(&self.solve_lower(b))
    }

    /// Apply L^{-1} to every column of `b`.
    pub fn solve_lower_mat(&self, b: &DenseMatrix) -> DenseMatrix {
        assert_eq!(b.nrows(), self.dim());
        let mut out = DenseMatrix::zeros(b.nrows(), b.ncols());
        for j in 0..b.ncols() {
            out.set_col(j, &self.solve_lower(&b.col(j)));
        }
        out
    }

    /// log|A| = 2 * sum(log(diag(L))).
    pub fn log_det(&self) -> f64 {
        2.0 * self.l.diag().iter().map(|d| d.ln()).sum::<f64>()
    }

    /// Compute the inverse of the original matrix A^{-1} = (L L')^{-1}.
    pub fn inverse(&self) -> DenseMatrix {
        let n = self.dim();
        let mut inv = DenseMatrix::zeros(n, n);
        for j in 0..n {
            let mut e = vec![0.0; n];
            e[j] = 1.0;
            let col = self.solve(&e);
            inv.set_col(j, &col);
        }
        inv
    }
}

/// Result of a QR decomposition: A = Q * R.
pub struct QrDecomp {
    pub q: DenseMatrix,
    pub r: DenseMatrix,
}

impl QrDecomp {
    /// Compute the thin QR decomposition of an m x n matrix (m >= n).
    /// Uses modified Gram-Schmidt. Columns that are (numerically) linear
    /// combinations of earlier columns yield `SingularMatrix`.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let m = a.nrows();
        let n = a.ncols();
        if m < n {
            return Err(LinalgError::DimensionMismatch { expected: n, got: m });
        }

        let mut q = DenseMatrix::zeros(m, n);
        let mut r = DenseMatrix::zeros(n, n);

        let mut cols: Vec<Vec<f64>> = (0..n).map(|j| a.col(j)).collect();

        for j in 0..n {
            let original_norm = DenseMatrix::dot(&cols[j], &cols[j]).sqrt();
            for i in 0..j {
                let q_col = q.col(i);
                let rij = DenseMatrix::dot(&q_col, &cols[j]);
                r.set(i, j, rij);
                for k in 0..m {
                    cols[j][k] -= rij * q_col[k];
                }
            }

            let norm = DenseMatrix::dot(&cols[j], &cols[j]).sqrt();
            if norm < 1e-14 || norm < 1e-10 * original_norm {
                return Err(LinalgError::SingularMatrix);
            }
            r.set(j, j, norm);
            for k in 0..m {
                q.set(k, j, cols[j][k] / norm);
            }
        }

        Ok(QrDecomp { q, r })
    }

    /// Solve R * x = Q' * b (least squares).
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.r.nrows();
        let qtb = self.q.t_mat_vec(b);

        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.r.get(i, j) * x[j];
            }
            x[i] = (qtb[i] - sum) / self.r.get(i, i);
        }
        x
    }
}

/// Compute eigenvalues of a symmetric matrix.
/// Returns eigenvalues sorted in descending order.
pub fn symmetric_eigenvalues(a: &DenseMatrix) -> Result<Vec<f64>, LinalgError> {
    let n = a.nrows();
    if n != a.ncols() {
        return Err(LinalgError::DimensionMismatch {
            expected: n,
            got: a.ncols(),
        });
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let mat = a.as_faer();
    let eigen = mat.selfadjoint_eigendecomposition(faer::Side::Lower);
    let s = eigen.s();
    let mut evals: Vec<f64> = (0..n).map(|i| s.column_vector().read(i)).collect();
    if evals.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::SingularMatrix);
    }
    evals.sort_by(|a, b| b.total_cmp(a));
    Ok(evals)
}

/// Solve a symmetric positive definite system A*x = b using Cholesky.
pub fn solve_spd(a: &DenseMatrix, b: &[f64]) -> Result<Vec<f64>, LinalgError> {
    let chol = CholeskyDecomp::new(a)?;
    Ok(chol.solve(b))
}
