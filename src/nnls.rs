use core::fmt;

use faer::linalg::solvers::{Llt, Solve};
use faer::{Mat, MatRef, Side};

/// Errors reported by the solver, projection, and factorization entry points.
#[derive(Debug, Clone)]
pub enum NmfError {
    /// Dimensions of two arguments disagree.
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A Gram matrix (or an active-set submatrix of one) is not positive definite.
    NotPositiveDefinite,
    /// A rank-2 Gram matrix has zero determinant.
    SingularGram,
    /// An asymmetric sparse factorization needs the caller-supplied transpose.
    MissingTranspose,
}

impl fmt::Display for NmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeMismatch {
                what,
                expected,
                actual,
            } => {
                write!(f, "{what}: got {actual}, expected {expected}")
            }
            Self::NotPositiveDefinite => {
                write!(f, "gram matrix is not positive definite")
            }
            Self::SingularGram => write!(f, "rank-2 gram matrix has zero determinant"),
            Self::MissingTranspose => {
                write!(
                    f,
                    "asymmetric sparse factorization requires the transpose of the input"
                )
            }
        }
    }
}

impl std::error::Error for NmfError {}

/// Options controlling the two-stage least squares solve.
#[derive(Debug, Clone)]
pub struct NnlsOptions {
    /// Maximum number of active-set reduction rounds.
    pub fast_maxit: usize,
    /// Maximum number of coordinate descent passes over the coordinates.
    pub cd_maxit: usize,
    /// Stop refinement once the largest relative coordinate change in a pass
    /// falls below this.
    pub cd_tol: f64,
    /// Constrain solutions to be non-negative.
    pub nonneg: bool,
}

impl Default for NnlsOptions {
    fn default() -> Self {
        Self {
            fast_maxit: 10,
            cd_maxit: 100,
            cd_tol: 1e-8,
            nonneg: true,
        }
    }
}

pub(crate) fn llt_of(a: MatRef<'_, f64>) -> Result<Llt<f64>, NmfError> {
    a.llt(Side::Lower)
        .map_err(|_| NmfError::NotPositiveDefinite)
}

pub(crate) fn chol_solve(chol: &Llt<f64>, x: &mut [f64]) {
    let mut rhs = Mat::from_fn(x.len(), 1, |i, _| x[i]);
    chol.solve_in_place(rhs.as_mut());
    for (i, v) in x.iter_mut().enumerate() {
        *v = rhs[(i, 0)];
    }
}

/// Two-stage least squares for one right-hand side sharing a prefactorized Gram.
///
/// Stage 1 starts from the unconstrained solution and repeatedly re-solves on
/// the feasible set while negative entries remain. The reduction is a
/// heuristic; stage 2 refines the iterate by coordinate descent and handles
/// whatever stage 1 left unresolved.
pub(crate) fn solve_nnls(
    a: MatRef<'_, f64>,
    chol: &Llt<f64>,
    b: &[f64],
    x: &mut [f64],
    options: &NnlsOptions,
) -> Result<(), NmfError> {
    let k = b.len();
    x.copy_from_slice(b);
    chol_solve(chol, x);

    if options.nonneg {
        let mut it = 0;
        while it < options.fast_maxit && x.iter().any(|&v| v < 0.0) {
            let feasible: Vec<usize> = (0..k).filter(|&i| x[i] > 0.0).collect();
            if feasible.is_empty() {
                x.fill(0.0);
                break;
            }
            let asub = Mat::from_fn(feasible.len(), feasible.len(), |r, c| {
                a[(feasible[r], feasible[c])]
            });
            let mut xsub: Vec<f64> = feasible.iter().map(|&i| b[i]).collect();
            chol_solve(&llt_of(asub.as_ref())?, &mut xsub);
            x.fill(0.0);
            for (r, &i) in feasible.iter().enumerate() {
                x[i] = xsub[r];
            }
            it += 1;
        }
        if options.cd_maxit == 0 {
            return Ok(());
        }
    }

    coordinate_descent(a, b, x, options.cd_maxit, options.cd_tol, options.nonneg);
    Ok(())
}

/// Coordinate descent on `||a·x - b||` from the given iterate, in place.
///
/// Coordinates are visited in order 0..k-1; the visit order is part of the
/// algorithm, not an implementation detail.
pub(crate) fn coordinate_descent(
    a: MatRef<'_, f64>,
    b: &[f64],
    x: &mut [f64],
    cd_maxit: usize,
    cd_tol: f64,
    nonneg: bool,
) {
    let k = x.len();

    // residual r = a·x - b, maintained across coordinate updates
    let mut r = vec![0.0; k];
    for j in 0..k {
        let xj = x[j];
        if xj != 0.0 {
            for i in 0..k {
                r[i] += a[(i, j)] * xj;
            }
        }
    }
    for i in 0..k {
        r[i] -= b[i];
    }

    let mut tol_it = 1.0 + cd_tol;
    let mut it = 0;
    while it < cd_maxit && tol_it > cd_tol {
        tol_it = 0.0;
        for i in 0..k {
            let mut xi = x[i] - r[i] / a[(i, i)];
            if nonneg && xi < 0.0 {
                xi = 0.0;
            }
            if xi != x[i] {
                let delta = xi - x[i];
                for j in 0..k {
                    r[j] += a[(j, i)] * delta;
                }
                let tol_xi = 2.0 * (x[i] - xi).abs() / (xi + x[i] + 1e-16);
                if tol_xi > tol_it {
                    tol_it = tol_xi;
                }
                x[i] = xi;
            }
        }
        it += 1;
    }
}

/// Applies the two-stage solver to every column of a right-hand-side matrix.
///
/// `a` is the k×k Gram matrix, `b` is k×n; the Cholesky factor of `a` is
/// computed once and shared across columns.
pub fn nnls(
    a: MatRef<'_, f64>,
    b: MatRef<'_, f64>,
    options: &NnlsOptions,
) -> Result<Mat<f64>, NmfError> {
    let k = a.nrows();
    if a.ncols() != k {
        return Err(NmfError::ShapeMismatch {
            what: "gram matrix columns",
            expected: k,
            actual: a.ncols(),
        });
    }
    if b.nrows() != k {
        return Err(NmfError::ShapeMismatch {
            what: "right-hand-side rows",
            expected: k,
            actual: b.nrows(),
        });
    }

    let chol = llt_of(a)?;
    let mut x = Mat::<f64>::zeros(k, b.ncols());
    let mut bj = vec![0.0; k];
    let mut xj = vec![0.0; k];
    for j in 0..b.ncols() {
        for i in 0..k {
            bj[i] = b[(i, j)];
        }
        solve_nnls(a, &chol, &bj, &mut xj, options)?;
        for i in 0..k {
            x[(i, j)] = xj[i];
        }
    }
    Ok(x)
}

/// Coordinate-descent-only solve for every column of `b`, starting each
/// column from the corresponding column of `x0`.
pub fn cdnnls(
    a: MatRef<'_, f64>,
    b: MatRef<'_, f64>,
    x0: MatRef<'_, f64>,
    cd_maxit: usize,
    cd_tol: f64,
    nonneg: bool,
) -> Result<Mat<f64>, NmfError> {
    let k = a.nrows();
    if a.ncols() != k {
        return Err(NmfError::ShapeMismatch {
            what: "gram matrix columns",
            expected: k,
            actual: a.ncols(),
        });
    }
    if b.nrows() != k {
        return Err(NmfError::ShapeMismatch {
            what: "right-hand-side rows",
            expected: k,
            actual: b.nrows(),
        });
    }
    if x0.nrows() != k || x0.ncols() != b.ncols() {
        return Err(NmfError::ShapeMismatch {
            what: "initial solution columns",
            expected: b.ncols(),
            actual: x0.ncols(),
        });
    }

    let mut x = Mat::<f64>::zeros(k, b.ncols());
    let mut bj = vec![0.0; k];
    let mut xj = vec![0.0; k];
    for j in 0..b.ncols() {
        for i in 0..k {
            bj[i] = b[(i, j)];
            xj[i] = x0[(i, j)];
        }
        coordinate_descent(a, &bj, &mut xj, cd_maxit, cd_tol, nonneg);
        for i in 0..k {
            x[(i, j)] = xj[i];
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn unconstrained_matches_direct_solve() {
        let a = mat![[4.0, 2.0], [2.0, 3.0]];
        let b = mat![[-1.0], [5.0]];
        let options = NnlsOptions {
            nonneg: false,
            ..NnlsOptions::default()
        };
        let x = nnls(a.as_ref(), b.as_ref(), &options).unwrap();
        // a^-1 b = (-13/8, 22/8)
        assert!((x[(0, 0)] + 13.0 / 8.0).abs() < 1e-12);
        assert!((x[(1, 0)] - 22.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn clamps_negative_coordinate() {
        let a = mat![[4.0, 2.0], [2.0, 3.0]];
        let b = mat![[-1.0], [5.0]];
        let x = nnls(a.as_ref(), b.as_ref(), &NnlsOptions::default()).unwrap();
        assert_eq!(x[(0, 0)], 0.0);
        assert!((x[(1, 0)] - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn kkt_conditions_hold_for_random_problems() {
        let mut state = 0x5eed_u64;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 32) as u32 as f64) / (u32::MAX as f64)
        };
        let k = 5;
        let r = Mat::from_fn(k, k, |_, _| next() * 2.0 - 1.0);
        // SPD gram: R·R^T plus a diagonal shift
        let mut a = Mat::<f64>::zeros(k, k);
        for i in 0..k {
            for j in 0..k {
                let mut sum = 0.0;
                for l in 0..k {
                    sum += r[(i, l)] * r[(j, l)];
                }
                a[(i, j)] = sum;
            }
            a[(i, i)] += 0.1;
        }
        let b = Mat::from_fn(k, 3, |_, _| next() * 4.0 - 2.0);

        let options = NnlsOptions {
            cd_maxit: 1000,
            cd_tol: 1e-12,
            ..NnlsOptions::default()
        };
        let x = nnls(a.as_ref(), b.as_ref(), &options).unwrap();
        for col in 0..3 {
            for i in 0..k {
                let xi = x[(i, col)];
                assert!(xi >= 0.0);
                let mut grad = -b[(i, col)];
                for j in 0..k {
                    grad += a[(i, j)] * x[(j, col)];
                }
                // either the bound is active or the gradient vanishes
                assert!(xi == 0.0 || grad.abs() < 1e-8, "kkt violated: x={xi}, grad={grad}");
            }
        }
    }

    #[test]
    fn cd_only_reaches_the_clamped_solution() {
        let a = mat![[4.0, 2.0], [2.0, 3.0]];
        let b = mat![[-1.0], [5.0]];
        let x0 = Mat::<f64>::zeros(2, 1);
        let x = cdnnls(a.as_ref(), b.as_ref(), x0.as_ref(), 200, 1e-12, true).unwrap();
        assert_eq!(x[(0, 0)], 0.0);
        assert!((x[(1, 0)] - 5.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn rejects_shape_mismatch() {
        let a = Mat::<f64>::zeros(2, 3);
        let b = Mat::<f64>::zeros(2, 1);
        assert!(matches!(
            nnls(a.as_ref(), b.as_ref(), &NnlsOptions::default()),
            Err(NmfError::ShapeMismatch { .. })
        ));
    }
}
