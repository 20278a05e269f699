use faer::{Mat, MatRef};

use crate::nmf::{correlation_gap, poll_cancel, rescale_rows, Factorization};
use crate::nnls::NmfError;
use crate::project::DataColumns;
use crate::report::{FactorizeStatus, IterationReport, Reporter, ReporterSlot};
use crate::sparse::CscMatRef;

/// Options controlling the rank-2 driver.
#[derive(Debug, Clone)]
pub struct Nmf2Options {
    /// Stop once `1 - pearson(H, H_prev)` falls below this.
    pub tol: f64,
    /// Maximum number of alternating iterations.
    pub maxit: usize,
    /// Constrain factors to be non-negative.
    pub nonneg: bool,
    /// Track the diagonal scaling and order the factors by it on exit.
    pub diag: bool,
    /// Emit per-iteration diagnostics when no reporter is supplied.
    pub verbose: bool,
}

impl Default for Nmf2Options {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            maxit: 100,
            nonneg: true,
            diag: true,
            verbose: false,
        }
    }
}

/// 2×2 Gram of a wide factor, with the same diagonal ridge as the general path.
struct Gram2 {
    a00: f64,
    a01: f64,
    a11: f64,
    denom: f64,
}

impl Gram2 {
    fn from_factor(x: MatRef<'_, f64>) -> Result<Self, NmfError> {
        let mut a00 = 0.0;
        let mut a01 = 0.0;
        let mut a11 = 0.0;
        for j in 0..x.ncols() {
            let x0 = x[(0, j)];
            let x1 = x[(1, j)];
            a00 += x0 * x0;
            a01 += x0 * x1;
            a11 += x1 * x1;
        }
        a00 += 1e-15;
        a11 += 1e-15;
        let denom = a00 * a11 - a01 * a01;
        if denom == 0.0 {
            return Err(NmfError::SingularGram);
        }
        Ok(Self {
            a00,
            a01,
            a11,
            denom,
        })
    }

    /// Closed-form least squares for one right-hand side.
    fn solve(&self, b0: f64, b1: f64, nonneg: bool) -> (f64, f64) {
        if nonneg {
            let a01b1 = self.a01 * b1;
            let a11b0 = self.a11 * b0;
            if a11b0 < a01b1 {
                return (0.0, b1 / self.a11);
            }
            let a01b0 = self.a01 * b0;
            let a00b1 = self.a00 * b1;
            if a00b1 < a01b0 {
                return (b0 / self.a00, 0.0);
            }
            ((a11b0 - a01b1) / self.denom, (a00b1 - a01b0) / self.denom)
        } else {
            (
                (self.a11 * b0 - self.a01 * b1) / self.denom,
                (self.a00 * b1 - self.a01 * b0) / self.denom,
            )
        }
    }
}

/// Rank-2 alternating least squares with the closed-form column solver
/// inlined in both update halves. Convergence is measured on H.
pub(crate) fn factorize_rank2<M: DataColumns + Copy>(
    a: M,
    h0: MatRef<'_, f64>,
    options: &Nmf2Options,
    reporter: Option<&mut dyn Reporter>,
    should_cancel: Option<&dyn Fn() -> bool>,
) -> Result<Factorization, NmfError> {
    if h0.nrows() != 2 {
        return Err(NmfError::ShapeMismatch {
            what: "initial factor rows",
            expected: 2,
            actual: h0.nrows(),
        });
    }
    if h0.ncols() != a.ncols() {
        return Err(NmfError::ShapeMismatch {
            what: "initial factor columns",
            expected: a.ncols(),
            actual: h0.ncols(),
        });
    }

    let m = a.nrows();
    let n = a.ncols();
    let mut reporter = ReporterSlot::new(reporter, options.verbose);

    let mut h = h0.to_owned();
    let mut w = Mat::<f64>::zeros(2, m);
    let mut d = vec![1.0; 2];
    let mut tol_it = 1.0;
    let mut status = FactorizeStatus::MaxIterations;
    let mut it = 0;

    while it < options.maxit {
        if poll_cancel(should_cancel) {
            status = FactorizeStatus::Cancelled;
            break;
        }

        // W update against the Gram of H
        let gram = Gram2::from_factor(h.as_ref())?;
        let mut wb = Mat::<f64>::zeros(2, m);
        for j in 0..n {
            a.scatter_rhs(j, h.as_ref(), &mut wb);
        }
        for i in 0..m {
            let (x0, x1) = gram.solve(wb[(0, i)], wb[(1, i)], options.nonneg);
            w[(0, i)] = x0;
            w[(1, i)] = x1;
        }
        if options.diag {
            rescale_rows(&mut w, &mut d);
        }

        // H update against the Gram of W
        let h_prev = h.clone();
        let gram = Gram2::from_factor(w.as_ref())?;
        for j in 0..n {
            let mut b = [0.0; 2];
            a.accumulate_rhs(j, w.as_ref(), &mut b);
            let (x0, x1) = gram.solve(b[0], b[1], options.nonneg);
            h[(0, j)] = x0;
            h[(1, j)] = x1;
        }
        if options.diag {
            rescale_rows(&mut h, &mut d);
        }

        tol_it = correlation_gap(h.as_ref(), h_prev.as_ref());
        if let Some(r) = reporter.as_mut() {
            r.on_iteration(&IterationReport {
                iteration: it,
                tol: tol_it,
            });
        }
        if tol_it < options.tol {
            status = FactorizeStatus::Converged;
            break;
        }
        it += 1;
    }
    reporter.finish();

    if options.diag && d[0] < d[1] {
        for i in 0..m {
            let t = w[(0, i)];
            w[(0, i)] = w[(1, i)];
            w[(1, i)] = t;
        }
        for j in 0..n {
            let t = h[(0, j)];
            h[(0, j)] = h[(1, j)];
            h[(1, j)] = t;
        }
        d.swap(0, 1);
    }

    Ok(Factorization {
        w: w.as_ref().transpose().to_owned(),
        d,
        h,
        tol: tol_it,
        iterations: it,
        status,
    })
}

/// Rank-2 factorization of a dense input, starting from the 2×n factor `h0`.
pub fn nmf2_dense(
    a: MatRef<'_, f64>,
    h0: MatRef<'_, f64>,
    options: &Nmf2Options,
    reporter: Option<&mut dyn Reporter>,
    should_cancel: Option<&dyn Fn() -> bool>,
) -> Result<Factorization, NmfError> {
    factorize_rank2(a, h0, options, reporter, should_cancel)
}

/// Rank-2 factorization of a sparse CSC input, starting from the 2×n factor `h0`.
pub fn nmf2_sparse(
    a: CscMatRef<'_>,
    h0: MatRef<'_, f64>,
    options: &Nmf2Options,
    reporter: Option<&mut dyn Reporter>,
    should_cancel: Option<&dyn Fn() -> bool>,
) -> Result<Factorization, NmfError> {
    factorize_rank2(a, h0, options, reporter, should_cancel)
}
