use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

use faer::Mat;
use nmf_als::{
    nmf2_dense, nmf_dense, nnls, project_dense, project_sparse, CscMatRef, Nmf2Options,
    NmfOptions, NnlsOptions,
};

struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u32() as f64) / (u32::MAX as f64)
    }
}

fn random_mat(rng: &mut Lcg, nrows: usize, ncols: usize) -> Mat<f64> {
    Mat::from_fn(nrows, ncols, |_, _| rng.next_f64())
}

fn spd_gram(rng: &mut Lcg, k: usize) -> Mat<f64> {
    let r = random_mat(rng, k, k);
    let mut a = Mat::<f64>::zeros(k, k);
    for i in 0..k {
        for j in 0..k {
            let mut sum = 0.0;
            for l in 0..k {
                sum += r[(i, l)] * r[(j, l)];
            }
            a[(i, j)] = sum;
        }
        a[(i, i)] += 0.5;
    }
    a
}

fn sparse_triple(
    rng: &mut Lcg,
    nrows: usize,
    ncols: usize,
    fill: f64,
) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let mut col_ptr = Vec::with_capacity(ncols + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    col_ptr.push(0);
    for _ in 0..ncols {
        for row in 0..nrows {
            if rng.next_f64() < fill {
                row_idx.push(row);
                values.push(rng.next_f64());
            }
        }
        col_ptr.push(row_idx.len());
    }
    (col_ptr, row_idx, values)
}

fn bench_nnls(c: &mut Criterion) {
    let mut rng = Lcg::new(0x1bad);
    let a = spd_gram(&mut rng, 10);
    let b = random_mat(&mut rng, 10, 50);
    let options = NnlsOptions::default();
    c.bench_function("nnls_10x50", |bench| {
        bench.iter(|| {
            let x = nnls(a.as_ref(), b.as_ref(), &options).unwrap();
            black_box(&x);
        });
    });
}

fn bench_project_dense(c: &mut Criterion) {
    let mut rng = Lcg::new(0x5eed);
    let a = random_mat(&mut rng, 120, 80);
    let w = random_mat(&mut rng, 5, 120);
    let options = NnlsOptions::default();
    c.bench_function("project_dense_120x80_k5", |bench| {
        bench.iter(|| {
            let h = project_dense(a.as_ref(), w.as_ref(), 0.0, &options, 1).unwrap();
            black_box(&h);
        });
    });
}

fn bench_project_sparse(c: &mut Criterion) {
    let mut rng = Lcg::new(0x5eed);
    let (col_ptr, row_idx, values) = sparse_triple(&mut rng, 120, 80, 0.1);
    let a = CscMatRef::new(120, 80, &col_ptr, &row_idx, &values).unwrap();
    let w = random_mat(&mut rng, 5, 120);
    let options = NnlsOptions::default();
    c.bench_function("project_sparse_120x80_k5", |bench| {
        bench.iter(|| {
            let h = project_sparse(a, w.as_ref(), 0.0, &options, 1).unwrap();
            black_box(&h);
        });
    });
}

fn bench_nmf_dense(c: &mut Criterion) {
    let mut rng = Lcg::new(0xfade);
    let a = random_mat(&mut rng, 60, 40);
    let w0 = random_mat(&mut rng, 4, 60);
    let options = NmfOptions {
        tol: -1.0,
        maxit: 10,
        threads: 1,
        ..NmfOptions::default()
    };
    c.bench_function("nmf_dense_60x40_k4_10it", |bench| {
        bench.iter(|| {
            let fit = nmf_dense(a.as_ref(), w0.as_ref(), &options, None, None).unwrap();
            black_box(&fit);
        });
    });
}

fn bench_nmf2_dense(c: &mut Criterion) {
    let mut rng = Lcg::new(0xfade);
    let a = random_mat(&mut rng, 60, 40);
    let h0 = random_mat(&mut rng, 2, 40);
    let options = Nmf2Options {
        tol: -1.0,
        maxit: 10,
        ..Nmf2Options::default()
    };
    c.bench_function("nmf2_dense_60x40_10it", |bench| {
        bench.iter(|| {
            let fit = nmf2_dense(a.as_ref(), h0.as_ref(), &options, None, None).unwrap();
            black_box(&fit);
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_millis(1000));
    targets =
        bench_nnls,
        bench_project_dense,
        bench_project_sparse,
        bench_nmf_dense,
        bench_nmf2_dense
}
criterion_main!(benches);
