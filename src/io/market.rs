//! Writers for the MatrixMarket exchange format.
//!
//! Dense matrices and vectors are written in `array` format (column-major), CSR matrices in
//! `coordinate` format with one-based indices.
use eyre::WrapErr;
use nalgebra::storage::Storage;
use nalgebra::{Dim, Matrix, RealField};
use nalgebra_sparse::CsrMatrix;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes a dense matrix (or vector) in MatrixMarket `array` format.
pub fn write_dense<T, R, C, S>(mut writer: impl Write, matrix: &Matrix<T, R, C, S>) -> std::io::Result<()>
where
    T: RealField,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
{
    writeln!(writer, "%%MatrixMarket matrix array real general")?;
    writeln!(writer, "{} {}", matrix.nrows(), matrix.ncols())?;
    for j in 0..matrix.ncols() {
        for i in 0..matrix.nrows() {
            writeln!(writer, "{}", matrix[(i, j)])?;
        }
    }
    writer.flush()
}

/// Writes a CSR matrix in MatrixMarket `coordinate` format. Explicitly stored zeros are kept.
pub fn write_csr<T: RealField>(mut writer: impl Write, matrix: &CsrMatrix<T>) -> std::io::Result<()> {
    writeln!(writer, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(writer, "{} {} {}", matrix.nrows(), matrix.ncols(), matrix.nnz())?;
    for (i, j, v) in matrix.triplet_iter() {
        writeln!(writer, "{} {} {}", i + 1, j + 1, v)?;
    }
    writer.flush()
}

fn create_file(path: &Path) -> eyre::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create output directory {}", parent.display()))?;
        }
    }
    let file = File::create(path).wrap_err_with(|| format!("failed to create file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Writes a dense matrix (or vector) to the file at `path`, creating parent directories as needed.
pub fn write_dense_to_file<T, R, C, S>(path: impl AsRef<Path>, matrix: &Matrix<T, R, C, S>) -> eyre::Result<()>
where
    T: RealField,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
{
    let path = path.as_ref();
    write_dense(create_file(path)?, matrix).wrap_err_with(|| format!("failed to write {}", path.display()))
}

/// Writes a CSR matrix to the file at `path`, creating parent directories as needed.
pub fn write_csr_to_file<T: RealField>(path: impl AsRef<Path>, matrix: &CsrMatrix<T>) -> eyre::Result<()> {
    let path = path.as_ref();
    write_csr(create_file(path)?, matrix).wrap_err_with(|| format!("failed to write {}", path.display()))
}
