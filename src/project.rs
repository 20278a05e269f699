use faer::{Mat, MatRef};
use rayon::prelude::*;

use crate::nnls::{llt_of, solve_nnls, NmfError, NnlsOptions};
use crate::sparse::CscMatRef;

/// Column-wise access to the data matrix, shared by the projection and loss
/// kernels so that dense and CSC inputs run through the same driver code.
pub(crate) trait DataColumns: Sync {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
    /// Accumulates `b += X·A[:,col]` for a wide factor `X` of shape k×nrows.
    fn accumulate_rhs(&self, col: usize, x: MatRef<'_, f64>, b: &mut [f64]);
    /// Accumulates column `col`'s contribution to `X·Aᵀ`:
    /// `out[:, row] += value · X[:, col]` for every entry of the column.
    fn scatter_rhs(&self, col: usize, x: MatRef<'_, f64>, out: &mut Mat<f64>);
    /// Subtracts `A[:,col]` from `out`.
    fn subtract_column(&self, col: usize, out: &mut [f64]);
}

impl DataColumns for MatRef<'_, f64> {
    fn nrows(&self) -> usize {
        MatRef::nrows(self)
    }

    fn ncols(&self) -> usize {
        MatRef::ncols(self)
    }

    fn accumulate_rhs(&self, col: usize, x: MatRef<'_, f64>, b: &mut [f64]) {
        let k = x.nrows();
        for i in 0..MatRef::nrows(self) {
            let value = self[(i, col)];
            if value != 0.0 {
                for l in 0..k {
                    b[l] += value * x[(l, i)];
                }
            }
        }
    }

    fn scatter_rhs(&self, col: usize, x: MatRef<'_, f64>, out: &mut Mat<f64>) {
        let k = x.nrows();
        for i in 0..MatRef::nrows(self) {
            let value = self[(i, col)];
            if value != 0.0 {
                for l in 0..k {
                    out[(l, i)] += value * x[(l, col)];
                }
            }
        }
    }

    fn subtract_column(&self, col: usize, out: &mut [f64]) {
        for (i, v) in out.iter_mut().enumerate() {
            *v -= self[(i, col)];
        }
    }
}

impl DataColumns for CscMatRef<'_> {
    fn nrows(&self) -> usize {
        CscMatRef::nrows(self)
    }

    fn ncols(&self) -> usize {
        CscMatRef::ncols(self)
    }

    fn accumulate_rhs(&self, col: usize, x: MatRef<'_, f64>, b: &mut [f64]) {
        let k = x.nrows();
        for (row, value) in self.col_iter(col) {
            for l in 0..k {
                b[l] += value * x[(l, row)];
            }
        }
    }

    fn scatter_rhs(&self, col: usize, x: MatRef<'_, f64>, out: &mut Mat<f64>) {
        let k = x.nrows();
        for (row, value) in self.col_iter(col) {
            for l in 0..k {
                out[(l, row)] += value * x[(l, col)];
            }
        }
    }

    fn subtract_column(&self, col: usize, out: &mut [f64]) {
        for (row, value) in self.col_iter(col) {
            out[row] -= value;
        }
    }
}

/// Runs `f` on a pool of the requested size; 0 selects the ambient pool.
pub(crate) fn with_threads<T: Send>(threads: usize, f: impl FnOnce() -> T + Send) -> T {
    if threads == 0 {
        return f();
    }
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(f),
        Err(_) => f(),
    }
}

/// Solves `A ≈ Wᵀ·H` for `H` column by column against a shared Gram matrix.
pub(crate) fn project_columns<M: DataColumns>(
    a: M,
    w: MatRef<'_, f64>,
    l1: f64,
    options: &NnlsOptions,
    threads: usize,
) -> Result<Mat<f64>, NmfError> {
    if w.ncols() != a.nrows() {
        return Err(NmfError::ShapeMismatch {
            what: "factor columns",
            expected: a.nrows(),
            actual: w.ncols(),
        });
    }
    let k = w.nrows();
    let n = a.ncols();

    // gram = W·Wᵀ with a small ridge to keep the Cholesky well posed
    let mut gram = Mat::<f64>::zeros(k, k);
    for c in 0..w.ncols() {
        for i in 0..k {
            let wic = w[(i, c)];
            if wic != 0.0 {
                for j in 0..k {
                    gram[(i, j)] += wic * w[(j, c)];
                }
            }
        }
    }
    for i in 0..k {
        gram[(i, i)] += 1e-15;
    }
    let chol = llt_of(gram.as_ref())?;

    let mut h = Mat::<f64>::zeros(k, n);
    let gram = gram.as_ref();
    let chol = &chol;
    let a = &a;
    with_threads(threads, || {
        h.as_mut()
            .par_col_chunks_mut(1)
            .enumerate()
            .try_for_each(|(j, mut out)| -> Result<(), NmfError> {
                let mut b = vec![0.0; k];
                let mut x = vec![0.0; k];
                a.accumulate_rhs(j, w, &mut b);
                if l1 != 0.0 {
                    for bi in b.iter_mut() {
                        *bi -= l1;
                    }
                }
                solve_nnls(gram, chol, &b, &mut x, options)?;
                for i in 0..k {
                    out[(i, 0)] = x[i];
                }
                Ok(())
            })
    })?;
    Ok(h)
}

/// Projects a dense input: given A (m×n) and W (k×m), returns H (k×n).
pub fn project_dense(
    a: MatRef<'_, f64>,
    w: MatRef<'_, f64>,
    l1: f64,
    options: &NnlsOptions,
    threads: usize,
) -> Result<Mat<f64>, NmfError> {
    project_columns(a, w, l1, options, threads)
}

/// Projects a sparse CSC input: given A (m×n) and W (k×m), returns H (k×n).
pub fn project_sparse(
    a: CscMatRef<'_>,
    w: MatRef<'_, f64>,
    l1: f64,
    options: &NnlsOptions,
    threads: usize,
) -> Result<Mat<f64>, NmfError> {
    project_columns(a, w, l1, options, threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn l1_shrinkage_shifts_the_solution() {
        // W·Wᵀ = I, so projecting b = (3, 3) with L1 = 1 yields (2, 2)
        let w = mat![[1.0, 0.0], [0.0, 1.0]];
        let a = mat![[3.0], [3.0]];
        let h = project_dense(a.as_ref(), w.as_ref(), 1.0, &NnlsOptions::default(), 1).unwrap();
        assert!((h[(0, 0)] - 2.0).abs() < 1e-9);
        assert!((h[(1, 0)] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn unconstrained_projection_recovers_h() {
        // A = Wᵀ·H with full-row-rank W recovers H exactly
        let w = mat![
            [0.9, 0.4, 0.1, 0.7],
            [0.2, 0.8, 0.5, 0.3],
            [0.6, 0.1, 0.9, 0.2]
        ];
        let h_true = mat![
            [0.3, 1.2, 0.7, 0.0, 2.1],
            [1.5, 0.2, 0.9, 1.1, 0.4],
            [0.8, 0.6, 0.0, 1.3, 0.5]
        ];
        let (m, n) = (w.ncols(), h_true.ncols());
        let a = Mat::from_fn(m, n, |i, j| {
            (0..3).map(|l| w[(l, i)] * h_true[(l, j)]).sum::<f64>()
        });
        let options = NnlsOptions {
            nonneg: false,
            ..NnlsOptions::default()
        };
        let h = project_dense(a.as_ref(), w.as_ref(), 0.0, &options, 1).unwrap();
        for i in 0..3 {
            for j in 0..n {
                assert!((h[(i, j)] - h_true[(i, j)]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn dense_and_sparse_projections_agree() {
        let w = mat![[0.9, 0.4, 0.1], [0.2, 0.8, 0.5]];
        let a = mat![[1.0, 0.0], [0.0, 2.0], [3.0, 0.5]];
        // CSC form of `a`
        let col_ptr = [0, 2, 4];
        let row_idx = [0, 2, 1, 2];
        let values = [1.0, 3.0, 2.0, 0.5];
        let a_csc = CscMatRef::new(3, 2, &col_ptr, &row_idx, &values).unwrap();

        let options = NnlsOptions::default();
        let dense = project_dense(a.as_ref(), w.as_ref(), 0.0, &options, 1).unwrap();
        let sparse = project_sparse(a_csc, w.as_ref(), 0.0, &options, 1).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert!((dense[(i, j)] - sparse[(i, j)]).abs() < 1e-12);
            }
        }
    }
}
