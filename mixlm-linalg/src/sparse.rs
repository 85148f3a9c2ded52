#![allow(clippy::needless_range_loop)]
//! Sparse matrix operations backed by sprs.
//!
//! The random-effects model matrix Z has one non-zero per observation for
//! each varying parameter of each grouping term, so it is stored in CSR
//! form and only ever touched through products.

use sprs::{CsMatI, TriMat};

use crate::dense::DenseMatrix;

/// A sparse matrix wrapper around sprs CSR format.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    inner: CsMatI<f64, usize>,
    nrows: usize,
    ncols: usize,
}

impl SparseMatrix {
    /// Create a sparse matrix from COO (coordinate) triplets.
    /// Duplicate coordinates are summed.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[f64],
    ) -> Self {
        assert_eq!(rows.len(), cols.len());
        assert_eq!(rows.len(), vals.len());
        let mut tri = TriMat::new((nrows, ncols));
        for i in 0..rows.len() {
            tri.add_triplet(rows[i], cols[i], vals[i]);
        }
        let csr = tri.to_csr();
        Self {
            inner: csr,
            nrows,
            ncols,
        }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Get element at (row, col). Returns 0.0 if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self.inner.get(row, col) {
            Some(&v) => v,
            None => 0.0,
        }
    }

    /// Stored (column, value) pairs of one row.
    fn row_entries(&self, i: usize) -> Vec<(usize, f64)> {
        match self.inner.outer_view(i) {
            Some(row) => row.iter().map(|(j, &x)| (j, x)).collect(),
            None => Vec::new(),
        }
    }

    /// Sparse matrix-vector product: self * v.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.ncols);
        (0..self.nrows)
            .map(|i| self.row_entries(i).into_iter().map(|(j, x)| x * v[j]).sum::<f64>())
            .collect()
    }

    /// Transposed product: self' * v.
    pub fn t_mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(v.len(), self.nrows);
        let mut result = vec![0.0; self.ncols];
        for i in 0..self.nrows {
            for (j, x) in self.row_entries(i) {
                result[j] += x * v[i];
            }
        }
        result
    }

    /// Dense cross-product Z'Z (ncols x ncols).
    pub fn crossprod_dense(&self) -> DenseMatrix {
        let q = self.ncols;
        let mut out = DenseMatrix::zeros(q, q);
        for i in 0..self.nrows {
            let entries = self.row_entries(i);
            for &(a, xa) in &entries {
                for &(b, xb) in &entries {
                    out.set(a, b, out.get(a, b) + xa * xb);
                }
            }
        }
        out
    }

    /// Dense product Z' * X for a dense X with the same number of rows.
    pub fn t_mul_dense(&self, x: &DenseMatrix) -> DenseMatrix {
        assert_eq!(x.nrows(), self.nrows);
        let p = x.ncols();
        let mut out = DenseMatrix::zeros(self.ncols, p);
        for i in 0..self.nrows {
            let xrow = x.row(i);
            for (a, za) in self.row_entries(i) {
                for k in 0..p {
                    out.set(a, k, out.get(a, k) + za * xrow[k]);
                }
            }
        }
        out
    }
}
