use faer::{Mat, MatRef};
use rayon::prelude::*;

use crate::nnls::NmfError;
use crate::project::{with_threads, DataColumns};
use crate::sparse::CscMatRef;

/// Mean squared reconstruction error of `A ≈ W·diag(d)·H`.
///
/// `w` may be passed as m×k or k×m; when its row count matches `h`'s it is
/// treated as the wide orientation and transposed before scaling by `d`.
pub(crate) fn mse_columns<M: DataColumns>(
    a: M,
    w: MatRef<'_, f64>,
    d: &[f64],
    h: MatRef<'_, f64>,
    threads: usize,
) -> Result<f64, NmfError> {
    let k = h.nrows();
    let mut wd: Mat<f64> = if w.nrows() == k {
        Mat::from_fn(w.ncols(), k, |i, j| w[(j, i)])
    } else {
        w.to_owned()
    };
    let m = wd.nrows();

    if m != a.nrows() {
        return Err(NmfError::ShapeMismatch {
            what: "left factor rows",
            expected: a.nrows(),
            actual: m,
        });
    }
    if wd.ncols() != k {
        return Err(NmfError::ShapeMismatch {
            what: "left factor columns",
            expected: k,
            actual: wd.ncols(),
        });
    }
    if d.len() != k {
        return Err(NmfError::ShapeMismatch {
            what: "scaling vector length",
            expected: k,
            actual: d.len(),
        });
    }
    if h.ncols() != a.ncols() {
        return Err(NmfError::ShapeMismatch {
            what: "right factor columns",
            expected: a.ncols(),
            actual: h.ncols(),
        });
    }

    for j in 0..k {
        for i in 0..m {
            wd[(i, j)] *= d[j];
        }
    }

    let a = &a;
    let wd = wd.as_ref();
    let total: f64 = with_threads(threads, || {
        (0..a.ncols())
            .into_par_iter()
            .map(|col| {
                let mut residual = vec![0.0; m];
                for l in 0..k {
                    let hl = h[(l, col)];
                    if hl != 0.0 {
                        for i in 0..m {
                            residual[i] += wd[(i, l)] * hl;
                        }
                    }
                }
                a.subtract_column(col, &mut residual);
                residual.iter().map(|v| v * v).sum::<f64>()
            })
            .sum()
    });
    Ok(total / (a.nrows() as f64 * a.ncols() as f64))
}

/// Mean squared reconstruction error against a dense input.
pub fn mse_dense(
    a: MatRef<'_, f64>,
    w: MatRef<'_, f64>,
    d: &[f64],
    h: MatRef<'_, f64>,
    threads: usize,
) -> Result<f64, NmfError> {
    mse_columns(a, w, d, h, threads)
}

/// Mean squared reconstruction error against a sparse CSC input.
pub fn mse_sparse(
    a: CscMatRef<'_>,
    w: MatRef<'_, f64>,
    d: &[f64],
    h: MatRef<'_, f64>,
    threads: usize,
) -> Result<f64, NmfError> {
    mse_columns(a, w, d, h, threads)
}
