//! Non-negative matrix factorization by alternating least squares.
//!
//! This crate factors a real m×n matrix `A` as `A ≈ W·diag(d)·H`, with `W`
//! and `H` non-negative and `d` carrying the row scales. Each half-update
//! solves one least squares problem per column of `A` against a shared
//! Cholesky-factorized Gram matrix, using a two-stage solver: a fast
//! active-set reduction followed by coordinate descent refinement.
//!
//! How it works (high level):
//! - `project` solves `A ≈ Wᵀ·H` for `H` column by column, in parallel.
//! - `nmf` alternates H and W projections with diagonal rescaling until the
//!   Pearson correlation of successive W iterates stabilizes, then orders
//!   the factors by descending scale.
//! - `nmf2` is a rank-2 specialization with a closed-form column solver.
//!
//! Calling it:
//! - Dense inputs are column-major `faer` matrices; sparse inputs are
//!   zero-copy [`CscMatRef`] views over a CSC triple.
//! - Pass an initial `W` (k×m, the wide orientation) and [`NmfOptions`].
//! - Inspect the returned [`Factorization`] and score it with [`mse_dense`]
//!   or [`mse_sparse`].
//!
//! Example:
//! ```rust
//! use faer::mat;
//! use nmf_als::{mse_dense, nmf_dense, NmfOptions};
//!
//! let a = mat![[1.0, 0.0], [0.0, 1.0]];
//! let w0 = mat![[0.9, 0.1], [0.2, 0.8]];
//! let fit = nmf_dense(a.as_ref(), w0.as_ref(), &NmfOptions::default(), None, None).unwrap();
//! let err = mse_dense(a.as_ref(), fit.w.as_ref(), &fit.d, fit.h.as_ref(), 1).unwrap();
//! assert!(err < 1e-10);
//! ```

mod loss;
mod nmf;
mod nnls;
mod project;
mod rank2;
mod report;
mod sparse;

pub use loss::{mse_dense, mse_sparse};
pub use nmf::{nmf_dense, nmf_sparse, Factorization, NmfOptions};
pub use nnls::{cdnnls, nnls, NmfError, NnlsOptions};
pub use project::{project_dense, project_sparse};
pub use rank2::{nmf2_dense, nmf2_sparse, Nmf2Options};
pub use report::{FactorizeStatus, IterationReport, Reporter, StdoutReporter};
pub use sparse::{CscError, CscMatRef};
