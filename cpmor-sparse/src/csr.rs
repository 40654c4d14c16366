//! Small helpers for inspecting CSR matrices.
use cpmor_traits::Real;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Returns the diagonal of a square CSR matrix. Entries absent from the sparsity pattern are zero.
pub fn diagonal<T: Real>(matrix: &CsrMatrix<T>) -> DVector<T> {
    let n = matrix.nrows().min(matrix.ncols());
    DVector::from_fn(n, |i, _| diagonal_entry(matrix, i).unwrap_or_else(T::zero))
}

/// The stored diagonal entry of row `i`, if present in the sparsity pattern.
pub fn diagonal_entry<T: Real>(matrix: &CsrMatrix<T>, i: usize) -> Option<T> {
    let row = matrix.row(i);
    row.col_indices()
        .binary_search(&i)
        .ok()
        .map(|local_idx| row.values()[local_idx])
}

/// Computes $1 / \sum_j |a_{ij}|$ for each row. Rows whose entries are all zero map to zero.
pub fn inverse_absolute_row_sums<T: Real>(matrix: &CsrMatrix<T>) -> DVector<T> {
    DVector::from_iterator(
        matrix.nrows(),
        matrix.row_iter().map(|row| {
            let sum = row
                .values()
                .iter()
                .fold(T::zero(), |acc, a_ij| acc + a_ij.abs());
            if sum > T::zero() {
                T::one() / sum
            } else {
                T::zero()
            }
        }),
    )
}
