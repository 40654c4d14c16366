use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// The tridiagonal matrix `tridiag(-1, 2, -1)` of the one-dimensional Laplacian.
pub fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(n, n);
    for i in 0..n {
        if i > 0 {
            coo.push(i, i - 1, -1.0);
        }
        coo.push(i, i, 2.0);
        if i + 1 < n {
            coo.push(i, i + 1, -1.0);
        }
    }
    CsrMatrix::from(&coo)
}

/// Converts a dense matrix to CSR, keeping every entry (including explicit zeros).
pub fn dense_to_csr_full_pattern(matrix: &DMatrix<f64>) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(matrix.nrows(), matrix.ncols());
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            coo.push(i, j, matrix[(i, j)]);
        }
    }
    CsrMatrix::from(&coo)
}

/// Deterministic vector with entries `1, 2, ..., n` scaled by `scale`.
pub fn ramp(n: usize, scale: f64) -> DVector<f64> {
    DVector::from_fn(n, |i, _| scale * (i + 1) as f64)
}
