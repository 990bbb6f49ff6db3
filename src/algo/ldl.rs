//! Sparse LDLᵀ factorization for symmetric positive (semi-)definite matrices.
//!
//! Up-looking simplicial factorization driven by the elimination tree
//! (Davis, "Algorithm 849: A concise sparse Cholesky factorization package",
//! ACM TOMS 2005). No fill-reducing ordering is applied; the adjacency graphs
//! handled here have at most three neighbours per face, which keeps the factor
//! sparse for the usual face orderings.
//!
//! # Example
//!
//! ```
//! use deltarot::algo::ldl::LdlFactorization;
//! use deltarot::algo::sparse::CsrMatrix;
//! use nalgebra::DVector;
//!
//! let a = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
//! let ldl = LdlFactorization::factor(&a, 1e-12).unwrap();
//! let x = ldl.solve(&DVector::from_vec(vec![1.0, 2.0]));
//! assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
//! ```

use nalgebra::{DMatrix, DVector};

use super::sparse::CsrMatrix;

/// Sentinel for "no parent" in the elimination tree.
const NONE: usize = usize::MAX;

/// A pivot that vanished during factorization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroPivot {
    /// Column of the matrix whose pivot failed.
    pub column: usize,
    /// The pivot value.
    pub pivot: f64,
}

/// Factorization `A = L·D·Lᵀ` with unit lower-triangular `L` and diagonal `D`.
#[derive(Debug, Clone)]
pub struct LdlFactorization {
    n: usize,
    /// Column pointers of `L` (strictly lower part, column-compressed).
    l_ptr: Vec<usize>,
    /// Row indices of `L`.
    l_idx: Vec<usize>,
    /// Values of `L`.
    l_val: Vec<f64>,
    /// Diagonal of `D`.
    d: Vec<f64>,
}

impl LdlFactorization {
    /// Factorize a symmetric matrix.
    ///
    /// Only entries on or below the diagonal of each row are read. A pivot
    /// `d_k ≤ tolerance · max|a_ii|` is reported as [`ZeroPivot`]: the
    /// matrix is singular or indefinite to working precision.
    pub fn factor(a: &CsrMatrix, tolerance: f64) -> Result<Self, ZeroPivot> {
        assert_eq!(a.nrows(), a.ncols(), "Matrix must be square");
        let n = a.nrows();
        let threshold = tolerance * a.max_abs_diagonal();

        let (parent, l_nz) = symbolic(a);

        let mut l_ptr = vec![0usize; n + 1];
        for k in 0..n {
            l_ptr[k + 1] = l_ptr[k] + l_nz[k];
        }
        let total = l_ptr[n];

        let mut l_idx = vec![0usize; total];
        let mut l_val = vec![0.0; total];
        let mut d = vec![0.0; n];

        let mut y = vec![0.0; n];
        let mut pattern = vec![0usize; n];
        let mut flag = vec![NONE; n];
        let mut filled = vec![0usize; n];

        for k in 0..n {
            // Nonzero pattern of row k of L, in topological order, at pattern[top..n]
            let mut top = n;
            flag[k] = k;

            let (cols, vals) = a.row(k);
            for (&i, &v) in cols.iter().zip(vals) {
                if i > k {
                    continue;
                }
                y[i] += v;

                let mut len = 0;
                let mut j = i;
                while flag[j] != k {
                    pattern[len] = j;
                    len += 1;
                    flag[j] = k;
                    j = parent[j];
                }
                while len > 0 {
                    top -= 1;
                    len -= 1;
                    pattern[top] = pattern[len];
                }
            }

            d[k] = y[k];
            y[k] = 0.0;

            for &i in &pattern[top..n] {
                let yi = y[i];
                y[i] = 0.0;

                let start = l_ptr[i];
                let end = start + filled[i];
                for p in start..end {
                    y[l_idx[p]] -= l_val[p] * yi;
                }

                let l_ki = yi / d[i];
                d[k] -= l_ki * yi;
                l_idx[end] = k;
                l_val[end] = l_ki;
                filled[i] += 1;
            }

            if d[k].is_nan() || d[k] <= threshold {
                return Err(ZeroPivot {
                    column: k,
                    pivot: d[k],
                });
            }
        }

        Ok(Self {
            n,
            l_ptr,
            l_idx,
            l_val,
            d,
        })
    }

    /// Dimension of the factorized matrix.
    #[inline]
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Number of stored off-diagonal entries of `L`.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.l_val.len()
    }

    /// Solve `A·x = b`.
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        assert_eq!(b.len(), self.n, "Vector dimension mismatch");
        let mut x = b.clone();

        // L·z = b
        for j in 0..self.n {
            let xj = x[j];
            for p in self.l_ptr[j]..self.l_ptr[j + 1] {
                x[self.l_idx[p]] -= self.l_val[p] * xj;
            }
        }

        // D·w = z
        for j in 0..self.n {
            x[j] /= self.d[j];
        }

        // Lᵀ·x = w
        for j in (0..self.n).rev() {
            let mut xj = x[j];
            for p in self.l_ptr[j]..self.l_ptr[j + 1] {
                xj -= self.l_val[p] * x[self.l_idx[p]];
            }
            x[j] = xj;
        }

        x
    }

    /// Solve `A·X = B` column by column.
    pub fn solve_matrix(&self, b: &DMatrix<f64>) -> DMatrix<f64> {
        let mut x = DMatrix::<f64>::zeros(b.nrows(), b.ncols());
        for j in 0..b.ncols() {
            let col = self.solve(&b.column(j).into_owned());
            x.set_column(j, &col);
        }
        x
    }
}

/// Elimination tree and column counts of `L`.
fn symbolic(a: &CsrMatrix) -> (Vec<usize>, Vec<usize>) {
    let n = a.nrows();
    let mut parent = vec![NONE; n];
    let mut flag = vec![NONE; n];
    let mut l_nz = vec![0usize; n];

    for k in 0..n {
        flag[k] = k;
        let (cols, _) = a.row(k);
        for &i in cols {
            if i >= k {
                continue;
            }
            let mut j = i;
            while flag[j] != k {
                if parent[j] == NONE {
                    parent[j] = k;
                }
                l_nz[j] += 1;
                flag[j] = k;
                j = parent[j];
            }
        }
    }

    (parent, l_nz)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_to_csr(m: &DMatrix<f64>) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..m.nrows() {
            for j in 0..m.ncols() {
                if m[(i, j)] != 0.0 {
                    triplets.push((i, j, m[(i, j)]));
                }
            }
        }
        CsrMatrix::from_triplets(m.nrows(), m.ncols(), triplets)
    }

    #[test]
    fn test_factor_tridiagonal() {
        // 1D Laplacian plus identity: SPD with a path elimination tree
        let n = 6;
        let mut m = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 3.0;
            if i + 1 < n {
                m[(i, i + 1)] = -1.0;
                m[(i + 1, i)] = -1.0;
            }
        }
        let ldl = LdlFactorization::factor(&dense_to_csr(&m), 1e-12).unwrap();
        assert_eq!(ldl.dim(), n);
        assert_eq!(ldl.nnz(), n - 1);

        let b = DVector::from_fn(n, |i, _| i as f64 + 1.0);
        let x = ldl.solve(&b);
        assert!((&m * x - b).norm() < 1e-12);
    }

    #[test]
    fn test_factor_with_fill_in() {
        // Arrow matrix pointing up-left creates fill in every column
        let n = 5;
        let mut m = DMatrix::<f64>::identity(n, n) * 10.0;
        for i in 1..n {
            m[(0, i)] = 1.0;
            m[(i, 0)] = 1.0;
        }
        m[(2, 4)] = 0.5;
        m[(4, 2)] = 0.5;

        let ldl = LdlFactorization::factor(&dense_to_csr(&m), 1e-12).unwrap();
        let b = DMatrix::from_fn(n, 3, |i, j| (i * 3 + j) as f64 - 4.0);
        let x = ldl.solve_matrix(&b);
        assert!((&m * x - b).norm() < 1e-10);
    }

    #[test]
    fn test_singular_matrix_is_detected() {
        // Graph Laplacian of a path: singular (constant null vector)
        let m = DMatrix::from_row_slice(3, 3, &[1.0, -1.0, 0.0, -1.0, 2.0, -1.0, 0.0, -1.0, 1.0]);
        let err = LdlFactorization::factor(&dense_to_csr(&m), 1e-10).unwrap_err();
        assert_eq!(err.column, 2);
    }

    #[test]
    fn test_zero_row_is_detected() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.0]);
        let err = LdlFactorization::factor(&dense_to_csr(&m), 1e-10).unwrap_err();
        assert_eq!(err.column, 1);
        assert_eq!(err.pivot, 0.0);
    }
}
