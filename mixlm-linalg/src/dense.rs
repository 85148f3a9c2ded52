#![allow(clippy::needless_range_loop)]
//! Dense matrix operations backed by faer.
//!
//! Wraps faer's column-major Mat<f64> with the handful of operations the
//! mixed model code needs: products, cross-products, column access and
//! column summaries of design matrices.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create a dense matrix from a 2D slice (row-major input).
    #[cfg(test)]
    pub(crate) fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]);
        Self { inner }
    }

    /// Create a matrix whose columns are the given vectors.
    pub fn from_columns(nrows: usize, columns: &[Vec<f64>]) -> Self {
        for c in columns {
            assert_eq!(c.len(), nrows);
        }
        let inner = Mat::from_fn(nrows, columns.len(), |i, j| columns[j][i]);
        Self { inner }
    }

    /// Create an identity matrix of size n x n.
    pub fn identity(n: usize) -> Self {
        let inner = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
        Self { inner }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Get a reference to the underlying faer matrix.
    pub(crate) fn as_faer(&self) -> &Mat<f64> {
        &self.inner
    }

    /// Matrix-vector product: self * v -> result vector.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut result = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            for i in 0..n {
                result[i] += self.inner.read(i, j) * vj;
            }
        }
        result
    }

    /// Transposed matrix-vector product: self' * v.
    pub fn t_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.nrows(), v.len());
        (0..self.ncols())
            .map(|j| {
                let mut s = 0.0;
                for i in 0..self.nrows() {
                    s += self.inner.read(i, j) * v[i];
                }
                s
            })
            .collect()
    }

    /// Matrix-matrix product: self * other.
    pub fn mat_mul(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.ncols(), other.nrows());
        if self.nrows() == 0 || self.ncols() == 0 || other.ncols() == 0 {
            return DenseMatrix::zeros(self.nrows(), other.ncols());
        }
        let result = &self.inner * &other.inner;
        DenseMatrix { inner: result }
    }

    /// Transpose.
    pub fn transpose(&self) -> DenseMatrix {
        let inner = self.inner.transpose().to_owned();
        DenseMatrix { inner }
    }

    /// Extract column as a Vec<f64>.
    pub fn col(&self, j: usize) -> Vec<f64> {
        let n = self.nrows();
        let mut v = Vec::with_capacity(n);
        for i in 0..n {
            v.push(self.inner.read(i, j));
        }
        v
    }

    /// Extract row as a Vec<f64>.
    pub fn row(&self, i: usize) -> Vec<f64> {
        let m = self.ncols();
        let mut v = Vec::with_capacity(m);
        for j in 0..m {
            v.push(self.inner.read(i, j));
        }
        v
    }

    /// Set an entire column from a slice.
    pub(crate) fn set_col(&mut self, j: usize, data: &[f64]) {
        assert_eq!(data.len(), self.nrows());
        for i in 0..self.nrows() {
            self.inner.write(i, j, data[i]);
        }
    }

    /// Element-wise subtraction: self - other.
    pub fn sub(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        assert_eq!(self.ncols(), other.ncols());
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) - other.inner.read(i, j)
        });
        DenseMatrix { inner }
    }

    /// Scalar multiplication.
    pub fn scale(&self, s: f64) -> DenseMatrix {
        let inner = Mat::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.inner.read(i, j) * s
        });
        DenseMatrix { inner }
    }

    /// Add `s` to every diagonal entry in place.
    pub fn add_to_diag(&mut self, s: f64) {
        let n = self.nrows().min(self.ncols());
        for i in 0..n {
            let v = self.inner.read(i, i);
            self.inner.write(i, i, v + s);
        }
    }

    /// Diagonal of a square matrix.
    pub fn diag(&self) -> Vec<f64> {
        let n = self.nrows().min(self.ncols());
        let mut d = Vec::with_capacity(n);
        for i in 0..n {
            d.push(self.inner.read(i, i));
        }
        d
    }

    /// Dot product of two vectors.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    /// Cross-product X'X, a p x p symmetric matrix.
    pub fn crossprod(&self) -> DenseMatrix {
        let n = self.nrows();
        let p = self.ncols();
        let mut result = DenseMatrix::zeros(p, p);
        for j in 0..p {
            for k in j..p {
                let mut s = 0.0;
                for i in 0..n {
                    s += self.inner.read(i, j) * self.inner.read(i, k);
                }
                result.set(j, k, s);
                if j != k {
                    result.set(k, j, s);
                }
            }
        }
        result
    }

    /// Per-column sample standard deviations (n - 1 denominator).
    pub fn column_sds(&self) -> Vec<f64> {
        let n = self.nrows();
        (0..self.ncols())
            .map(|j| {
                if n < 2 {
                    return 0.0;
                }
                let col = self.col(j);
                let mean = col.iter().sum::<f64>() / n as f64;
                let ss: f64 = col.iter().map(|v| (v - mean).powi(2)).sum();
                (ss / (n - 1) as f64).sqrt()
            })
            .collect()
    }
}

impl std::fmt::Display for DenseMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                if j > 0 {
                    write!(f, "\t")?;
                }
                write!(f, "{:.6}", self.inner.read(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let m = DenseMatrix::zeros(3, 4);
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.ncols(), 4);
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn test_identity() {
        let m = DenseMatrix::identity(3);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.get(2, 2), 1.0);
    }

    #[test]
    fn test_mat_vec_and_transpose_product() {
        let a = DenseMatrix::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(a.mat_vec(&[1.0, 0.0, 1.0]), vec![4.0, 10.0]);
        assert_eq!(a.t_mat_vec(&[1.0, 1.0]), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_mat_mul() {
        let a = DenseMatrix::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = DenseMatrix::from_row_major(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = a.mat_mul(&b);
        assert!((c.get(0, 0) - 58.0).abs() < 1e-10);
        assert!((c.get(0, 1) - 64.0).abs() < 1e-10);
        assert!((c.get(1, 0) - 139.0).abs() < 1e-10);
        assert!((c.get(1, 1) - 154.0).abs() < 1e-10);
    }

    #[test]
    fn test_mat_mul_empty() {
        let a = DenseMatrix::zeros(3, 0);
        let b = DenseMatrix::zeros(0, 2);
        let c = a.mat_mul(&b);
        assert_eq!((c.nrows(), c.ncols()), (3, 2));
        assert_eq!(c.get(2, 1), 0.0);
    }

    #[test]
    fn test_transpose() {
        let a = DenseMatrix::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let at = a.transpose();
        assert_eq!(at.nrows(), 3);
        assert_eq!(at.get(1, 0), 2.0);
        assert_eq!(at.get(0, 1), 4.0);
    }

    #[test]
    fn test_crossprod() {
        let x = DenseMatrix::from_row_major(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let xtx = x.crossprod();
        assert!((xtx.get(0, 0) - 2.0).abs() < 1e-10);
        assert!((xtx.get(0, 1) - 1.0).abs() < 1e-10);
        assert!((xtx.get(1, 1) - 2.0).abs() < 1e-10);
        assert_eq!(xtx.get(0, 1), xtx.get(1, 0));
    }

    #[test]
    fn test_from_columns() {
        let m = DenseMatrix::from_columns(2, &[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(m.row(1), vec![2.0, 4.0]);
    }

    #[test]
    fn test_column_sds() {
        let m = DenseMatrix::from_columns(4, &[vec![1.0; 4], vec![1.0, 2.0, 3.0, 4.0]]);
        let sds = m.column_sds();
        assert_eq!(sds[0], 0.0);
        assert!((sds[1] - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
