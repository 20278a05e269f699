use faer::{Mat, MatRef};

use crate::nnls::{NmfError, NnlsOptions};
use crate::project::{project_columns, DataColumns};
use crate::report::{FactorizeStatus, IterationReport, Reporter, ReporterSlot};
use crate::sparse::CscMatRef;

/// Options controlling the alternating least squares driver.
#[derive(Debug, Clone)]
pub struct NmfOptions {
    /// Stop once `1 - pearson(W, W_prev)` falls below this.
    pub tol: f64,
    /// Maximum number of alternating iterations.
    pub maxit: usize,
    /// Constrain factors to be non-negative.
    pub nonneg: bool,
    /// Track the diagonal scaling: rescale factor rows to unit sum after
    /// each update and sort factors by descending scale on exit.
    pub diag: bool,
    /// The input is symmetric; the W update reuses A instead of Aᵀ.
    pub symmetric: bool,
    /// L1 shrinkage applied during W updates.
    pub l1_w: f64,
    /// L1 shrinkage applied during H updates.
    pub l1_h: f64,
    /// Active-set reduction rounds per least squares solve.
    pub fast_maxit: usize,
    /// Coordinate descent passes per least squares solve.
    pub cd_maxit: usize,
    /// Coordinate descent stopping tolerance.
    pub cd_tol: f64,
    /// Emit per-iteration diagnostics when no reporter is supplied.
    pub verbose: bool,
    /// Worker threads per projection; 0 uses the ambient pool.
    pub threads: usize,
}

impl Default for NmfOptions {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            maxit: 100,
            nonneg: true,
            diag: true,
            symmetric: false,
            l1_w: 0.0,
            l1_h: 0.0,
            fast_maxit: 10,
            cd_maxit: 100,
            cd_tol: 1e-8,
            verbose: false,
            threads: 0,
        }
    }
}

impl NmfOptions {
    pub(crate) fn nnls_options(&self) -> NnlsOptions {
        NnlsOptions {
            fast_maxit: self.fast_maxit,
            cd_maxit: self.cd_maxit,
            cd_tol: self.cd_tol,
            nonneg: self.nonneg,
        }
    }
}

/// Factors returned by the drivers.
#[derive(Debug, Clone)]
pub struct Factorization {
    /// Left factor, m×k. Columns sum to 1 when `diag` is enabled.
    pub w: Mat<f64>,
    /// Diagonal scaling, length k; sorted descending when `diag` is enabled.
    pub d: Vec<f64>,
    /// Right factor, k×n. Rows sum to 1 when `diag` is enabled.
    pub h: Mat<f64>,
    /// Final factor-stability tolerance.
    pub tol: f64,
    /// Iteration index at termination.
    pub iterations: usize,
    /// How the driver stopped.
    pub status: FactorizeStatus,
}

pub(crate) fn poll_cancel(hook: Option<&dyn Fn() -> bool>) -> bool {
    matches!(hook, Some(f) if f())
}

/// `1 - pearson(x, y)` over the flattened matrices.
pub(crate) fn correlation_gap(x: MatRef<'_, f64>, y: MatRef<'_, f64>) -> f64 {
    let n = (x.nrows() * x.ncols()) as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    let mut sum_y2 = 0.0;
    for j in 0..x.ncols() {
        for i in 0..x.nrows() {
            let xi = x[(i, j)];
            let yi = y[(i, j)];
            sum_x += xi;
            sum_y += yi;
            sum_xy += xi * yi;
            sum_x2 += xi * xi;
            sum_y2 += yi * yi;
        }
    }
    1.0 - (n * sum_xy - sum_x * sum_y)
        / ((n * sum_x2 - sum_x * sum_x) * (n * sum_y2 - sum_y * sum_y)).sqrt()
}

/// Sets `d[i]` to the i-th row sum of `x` and rescales that row to unit sum.
pub(crate) fn rescale_rows(x: &mut Mat<f64>, d: &mut [f64]) {
    for i in 0..x.nrows() {
        let mut sum = 0.0;
        for j in 0..x.ncols() {
            sum += x[(i, j)];
        }
        let di = sum + 1e-15;
        d[i] = di;
        for j in 0..x.ncols() {
            x[(i, j)] /= di;
        }
    }
}

fn sort_index_desc(d: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..d.len()).collect();
    order.sort_by(|&a, &b| d[b].total_cmp(&d[a]));
    order
}

fn reorder_rows(x: MatRef<'_, f64>, order: &[usize]) -> Mat<f64> {
    Mat::from_fn(x.nrows(), x.ncols(), |i, j| x[(order[i], j)])
}

/// Alternating least squares over any column-accessible input.
///
/// `at` carries the transpose used for the W update; `None` means the input
/// is symmetric and A itself is reused.
pub(crate) fn factorize_columns<M: DataColumns + Copy>(
    a: M,
    at: Option<M>,
    w0: MatRef<'_, f64>,
    options: &NmfOptions,
    reporter: Option<&mut dyn Reporter>,
    should_cancel: Option<&dyn Fn() -> bool>,
) -> Result<Factorization, NmfError> {
    if w0.ncols() != a.nrows() {
        return Err(NmfError::ShapeMismatch {
            what: "initial factor columns",
            expected: a.nrows(),
            actual: w0.ncols(),
        });
    }
    if let Some(at) = &at {
        if at.nrows() != a.ncols() || at.ncols() != a.nrows() {
            return Err(NmfError::ShapeMismatch {
                what: "transpose rows",
                expected: a.ncols(),
                actual: at.nrows(),
            });
        }
    }

    let k = w0.nrows();
    let nnls_options = options.nnls_options();
    let mut reporter = ReporterSlot::new(reporter, options.verbose);

    log::debug!(
        "factorizing a {}x{} input at rank {}",
        a.nrows(),
        a.ncols(),
        k
    );

    let mut w = w0.to_owned();
    let mut h = Mat::<f64>::zeros(k, a.ncols());
    let mut d = vec![1.0; k];
    let mut tol_it = 1.0;
    let mut status = FactorizeStatus::MaxIterations;
    let mut it = 0;

    while it < options.maxit {
        if poll_cancel(should_cancel) {
            status = FactorizeStatus::Cancelled;
            break;
        }

        h = project_columns(a, w.as_ref(), options.l1_h, &nnls_options, options.threads)?;
        if options.diag {
            rescale_rows(&mut h, &mut d);
        }

        if poll_cancel(should_cancel) {
            status = FactorizeStatus::Cancelled;
            break;
        }

        let w_prev = w;
        w = match &at {
            Some(at) => {
                project_columns(*at, h.as_ref(), options.l1_w, &nnls_options, options.threads)?
            }
            None => project_columns(a, h.as_ref(), options.l1_w, &nnls_options, options.threads)?,
        };
        if options.diag {
            rescale_rows(&mut w, &mut d);
        }

        tol_it = correlation_gap(w.as_ref(), w_prev.as_ref());
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

    if options.diag {
        let order = sort_index_desc(&d);
        w = reorder_rows(w.as_ref(), &order);
        h = reorder_rows(h.as_ref(), &order);
        d = order.iter().map(|&i| d[i]).collect();
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

/// Factorizes a dense input by alternating least squares.
///
/// `w0` is the k×m initial left factor in the wide orientation; the returned
/// left factor is m×k. Asymmetric problems transpose A internally.
pub fn nmf_dense(
    a: MatRef<'_, f64>,
    w0: MatRef<'_, f64>,
    options: &NmfOptions,
    reporter: Option<&mut dyn Reporter>,
    should_cancel: Option<&dyn Fn() -> bool>,
) -> Result<Factorization, NmfError> {
    if options.symmetric {
        factorize_columns(a, None, w0, options, reporter, should_cancel)
    } else {
        let at = Mat::from_fn(a.ncols(), a.nrows(), |i, j| a[(j, i)]);
        factorize_columns(a, Some(at.as_ref()), w0, options, reporter, should_cancel)
    }
}

/// Factorizes a sparse CSC input by alternating least squares.
///
/// Asymmetric problems require the caller-supplied transpose `at`; it is
/// ignored when `options.symmetric` is set.
pub fn nmf_sparse(
    a: CscMatRef<'_>,
    at: Option<CscMatRef<'_>>,
    w0: MatRef<'_, f64>,
    options: &NmfOptions,
    reporter: Option<&mut dyn Reporter>,
    should_cancel: Option<&dyn Fn() -> bool>,
) -> Result<Factorization, NmfError> {
    if options.symmetric {
        factorize_columns(a, None, w0, options, reporter, should_cancel)
    } else {
        let at = at.ok_or(NmfError::MissingTranspose)?;
        factorize_columns(a, Some(at), w0, options, reporter, should_cancel)
    }
}
