//! Sparse matrices and iterative solver for the normal equations.
//!
//! This module provides a lightweight sparse matrix (CSR format) with the
//! products needed to form `AᵗA` and `AᵗB`, and a conjugate gradient solver
//! for symmetric positive definite systems.

use nalgebra::{DMatrix, DVector};

use crate::error::{DecodeError, Result};

/// Compressed Sparse Row (CSR) matrix.
///
/// Column indices within each row are sorted and unique.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    /// Number of rows.
    rows: usize,
    /// Number of columns.
    cols: usize,
    /// Row pointers: row_ptr[i] is the index in col_idx/values where row i starts.
    /// Length is rows + 1, with row_ptr[rows] = nnz.
    row_ptr: Vec<usize>,
    /// Column indices for each non-zero value.
    col_idx: Vec<usize>,
    /// Non-zero values.
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from triplets (row, col, value).
    ///
    /// Triplets may come in any order. Duplicate entries at the same
    /// (row, col) are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        debug_assert!(triplets.iter().all(|&(r, c, _)| r < rows && c < cols));

        triplets.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());

        let mut prev = None;
        for (row, col, val) in triplets {
            if prev == Some((row, col)) {
                // Same position: accumulate value
                if let Some(last) = values.last_mut() {
                    *last += val;
                }
            } else {
                col_idx.push(col);
                values.push(val);
                row_ptr[row + 1] += 1;
                prev = Some((row, col));
            }
        }

        // Counts to offsets
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column indices and values of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        (&self.col_idx[range.clone()], &self.values[range])
    }

    /// Stored value at `(i, j)`, or zero.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (cols, vals) = self.row(i);
        match cols.binary_search(&j) {
            Ok(k) => vals[k],
            Err(_) => 0.0,
        }
    }

    /// Largest absolute value on the diagonal.
    pub fn max_abs_diagonal(&self) -> f64 {
        (0..self.rows.min(self.cols))
            .map(|i| self.get(i, i).abs())
            .fold(0.0, f64::max)
    }

    /// Transpose, keeping column indices sorted.
    pub fn transpose(&self) -> CsrMatrix {
        let mut row_ptr = vec![0usize; self.cols + 1];
        for &c in &self.col_idx {
            row_ptr[c + 1] += 1;
        }
        for c in 0..self.cols {
            row_ptr[c + 1] += row_ptr[c];
        }

        let mut next = row_ptr.clone();
        let mut col_idx = vec![0usize; self.nnz()];
        let mut values = vec![0.0; self.nnz()];

        // Rows are visited in order, so each output row receives sorted columns.
        for i in 0..self.rows {
            let (cols, vals) = self.row(i);
            for (&c, &v) in cols.iter().zip(vals) {
                let dst = next[c];
                col_idx[dst] = i;
                values[dst] = v;
                next[c] += 1;
            }
        }

        CsrMatrix {
            rows: self.cols,
            cols: self.rows,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Sparse product `self * other`.
    pub fn mul(&self, other: &CsrMatrix) -> CsrMatrix {
        assert_eq!(self.cols, other.rows, "Matrix dimension mismatch");

        let mut row_ptr = Vec::with_capacity(self.rows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);

        // Dense accumulator per output row (Gustavson's algorithm)
        let mut acc = vec![0.0; other.cols];
        let mut marker = vec![usize::MAX; other.cols];
        let mut pattern: Vec<usize> = Vec::new();

        for i in 0..self.rows {
            pattern.clear();
            let (a_cols, a_vals) = self.row(i);
            for (&k, &a_ik) in a_cols.iter().zip(a_vals) {
                let (b_cols, b_vals) = other.row(k);
                for (&j, &b_kj) in b_cols.iter().zip(b_vals) {
                    if marker[j] != i {
                        marker[j] = i;
                        acc[j] = 0.0;
                        pattern.push(j);
                    }
                    acc[j] += a_ik * b_kj;
                }
            }
            pattern.sort_unstable();
            for &j in &pattern {
                col_idx.push(j);
                values.push(acc[j]);
            }
            row_ptr.push(col_idx.len());
        }

        CsrMatrix {
            rows: self.rows,
            cols: other.cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");

        DVector::from_fn(self.rows, |i, _| {
            let (cols, vals) = self.row(i);
            cols.iter().zip(vals).map(|(&c, &v)| v * x[c]).sum()
        })
    }

    /// Multiply matrix by a dense matrix: Y = A * X.
    pub fn mul_dense(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        assert_eq!(x.nrows(), self.cols, "Matrix dimension mismatch");

        let mut y = DMatrix::<f64>::zeros(self.rows, x.ncols());
        for i in 0..self.rows {
            let (cols, vals) = self.row(i);
            for (&c, &v) in cols.iter().zip(vals) {
                for j in 0..x.ncols() {
                    y[(i, j)] += v * x[(c, j)];
                }
            }
        }
        y
    }
}

/// Solve A*x = b using the Conjugate Gradient method.
///
/// Requires A to be symmetric positive definite.
///
/// # Arguments
///
/// * `a` - The system matrix (must be symmetric positive definite)
/// * `b` - The right-hand side vector (the iteration starts from zero)
/// * `max_iter` - Maximum number of iterations
/// * `tolerance` - Convergence tolerance (relative residual norm)
///
/// # Returns
///
/// The solution vector x, or an error if convergence fails.
pub fn conjugate_gradient(
    a: &CsrMatrix,
    b: &DVector<f64>,
    max_iter: usize,
    tolerance: f64,
) -> Result<DVector<f64>> {
    let n = b.len();
    assert_eq!(a.nrows(), n, "Matrix-vector dimension mismatch");
    assert_eq!(a.ncols(), n, "Matrix must be square");

    let mut x = DVector::zeros(n);

    let b_norm = b.norm();
    if b_norm < 1e-15 {
        return Ok(x);
    }

    // r = b - A*0
    let mut r = b.clone();
    let mut r_norm_sq = r.dot(&r);

    let mut p = r.clone();

    for _iter in 0..max_iter {
        let ap = a.mul_vec(&p);

        // alpha = (r · r) / (p · Ap)
        let p_ap = p.dot(&ap);
        if p_ap.abs() < 1e-300 {
            // Search direction in the null space: singular matrix
            break;
        }
        let alpha = r_norm_sq / p_ap;

        x += alpha * &p;
        r -= alpha * &ap;

        let new_r_norm_sq = r.dot(&r);
        if new_r_norm_sq.sqrt() / b_norm < tolerance {
            return Ok(x);
        }

        // beta = (r_new · r_new) / (r_old · r_old)
        let beta = new_r_norm_sq / r_norm_sq;
        p = &r + beta * &p;

        r_norm_sq = new_r_norm_sq;
    }

    Err(DecodeError::ConvergenceFailed {
        iterations: max_iter,
    })
}
