//! Sanity checks on full-order outputs.
//!
//! A failing check writes the offending residual or Jacobian in MatrixMarket format before
//! returning the error, so that the failure can be inspected offline.
use crate::io::market::{write_csr_to_file, write_dense_to_file};
use crate::rom::RomError;
use cpmor_sparse::csr::diagonal;
use cpmor_traits::Real;
use log::{trace, warn};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::path::Path;

/// Fails if the residual contains NaN or infinite entries. The residual is then written to
/// `Rerr{index}.mm` in `output_dir`.
pub fn check_residual_finite<T: Real>(f: &DVector<T>, output_dir: &Path, index: usize) -> Result<(), RomError> {
    if f.iter().all(|f_i| f_i.is_finite()) {
        return Ok(());
    }

    let rows: Vec<usize> = f
        .iter()
        .enumerate()
        .filter(|(_, f_i)| !f_i.is_finite())
        .map(|(i, _)| i)
        .collect();
    for &i in &rows {
        trace!("r({}) = {}", i, f[i]);
    }

    let dump = output_dir.join(format!("Rerr{}.mm", index));
    if let Err(err) = write_dense_to_file(&dump, f) {
        warn!("Could not write non-finite residual: {:#}", err);
    }
    Err(RomError::NonFiniteResidual {
        count: rows.len(),
        rows,
        dump,
    })
}

/// Fails if the Jacobian has zero (or unstored) diagonal entries. The Jacobian is then written
/// to `Jerr{index}.mm` in `output_dir`.
pub fn check_jacobian_nonsingular<T: Real>(
    jacobian: &CsrMatrix<T>,
    output_dir: &Path,
    index: usize,
) -> Result<(), RomError> {
    let rows: Vec<usize> = diagonal(jacobian)
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == T::zero())
        .map(|(i, _)| i)
        .collect();
    if rows.is_empty() {
        return Ok(());
    }
    for &i in &rows {
        trace!("J({}, {}) = 0", i, i);
    }

    let dump = output_dir.join(format!("Jerr{}.mm", index));
    if let Err(err) = write_csr_to_file(&dump, jacobian) {
        warn!("Could not write singular Jacobian: {:#}", err);
    }
    Err(RomError::SingularJacobian {
        count: rows.len(),
        rows,
        dump,
    })
}
