//! Stationary and incomplete-factorization preconditioners for CSR matrices.
//!
//! Every preconditioner approximates $A^{-1}$ and implements [`LinearOperator`], so that
//! applying it to $x$ yields $y \approx A^{-1} x$.
use crate::csr::diagonal_entry;
use crate::operator::LinearOperator;
use cpmor_traits::Real;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Dyn, LU};
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PreconditionerType {
    Jacobi,
    GaussSeidel,
    SymmetricGaussSeidel,
    /// Incomplete LU factorization with the given level of fill.
    Ilu(usize),
    /// Incomplete Cholesky factorization with the given level of fill.
    Ic(usize),
    /// Exact factorization by dense LU decomposition.
    Direct,
}

impl Display for PreconditionerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionerType::Jacobi => write!(f, "Jacobi"),
            PreconditionerType::GaussSeidel => write!(f, "Gauss-Seidel"),
            PreconditionerType::SymmetricGaussSeidel => write!(f, "symmetric Gauss-Seidel"),
            PreconditionerType::Ilu(level) => write!(f, "ILU({})", level),
            PreconditionerType::Ic(level) => write!(f, "IC({})", level),
            PreconditionerType::Direct => write!(f, "direct LU"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorizationError {
    NotSquare { nrows: usize, ncols: usize },
    /// A diagonal entry (or pivot) is zero or absent from the sparsity pattern.
    ZeroPivot { row: usize },
    /// A pivot of a Cholesky-type factorization is not positive.
    NonPositivePivot { row: usize },
    Singular,
}

impl Display for FactorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorizationError::NotSquare { nrows, ncols } => {
                write!(f, "Cannot factorize non-square {}x{} matrix", nrows, ncols)
            }
            FactorizationError::ZeroPivot { row } => write!(f, "Zero pivot encountered in row {}", row),
            FactorizationError::NonPositivePivot { row } => {
                write!(f, "Non-positive pivot encountered in row {}", row)
            }
            FactorizationError::Singular => write!(f, "Matrix is singular"),
        }
    }
}

impl Error for FactorizationError {}

/// Builds the requested preconditioner for `matrix`.
pub fn build_preconditioner<T: Real>(
    preconditioner_type: PreconditionerType,
    matrix: &CsrMatrix<T>,
) -> Result<Box<dyn LinearOperator<T> + Send + Sync>, FactorizationError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(FactorizationError::NotSquare {
            nrows: matrix.nrows(),
            ncols: matrix.ncols(),
        });
    }

    Ok(match preconditioner_type {
        PreconditionerType::Jacobi => Box::new(Jacobi::new(matrix)?),
        PreconditionerType::GaussSeidel => Box::new(GaussSeidel::new(matrix, false)?),
        PreconditionerType::SymmetricGaussSeidel => Box::new(GaussSeidel::new(matrix, true)?),
        PreconditionerType::Ilu(level) => Box::new(IncompleteLu::new(matrix, level)?),
        PreconditionerType::Ic(level) => Box::new(IncompleteCholesky::new(matrix, level)?),
        PreconditionerType::Direct => Box::new(DirectSolver::new(matrix)?),
    })
}

fn nonzero_diagonal<T: Real>(matrix: &CsrMatrix<T>) -> Result<DVector<T>, FactorizationError> {
    let n = matrix.nrows();
    let mut diagonal = DVector::zeros(n);
    for i in 0..n {
        match diagonal_entry(matrix, i) {
            Some(d) if d != T::zero() => diagonal[i] = d,
            _ => return Err(FactorizationError::ZeroPivot { row: i }),
        }
    }
    Ok(diagonal)
}

/// $y = D^{-1} x$.
#[derive(Debug, Clone)]
pub struct Jacobi<T: Real> {
    inverse_diagonal: DVector<T>,
}

impl<T: Real> Jacobi<T> {
    pub fn new(matrix: &CsrMatrix<T>) -> Result<Self, FactorizationError> {
        let inverse_diagonal = nonzero_diagonal(matrix)?.map(|d| T::one() / d);
        Ok(Self { inverse_diagonal })
    }
}

impl<T: Real> LinearOperator<T> for Jacobi<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x.component_mul(&self.inverse_diagonal));
        Ok(())
    }
}

/// One forward Gauss-Seidel sweep from a zero initial guess, $y = (D + L)^{-1} x$.
///
/// The symmetric variant follows up with a backward sweep, giving
/// $y = (D + U)^{-1} D (D + L)^{-1} x$.
#[derive(Debug, Clone)]
pub struct GaussSeidel<T: Real> {
    matrix: CsrMatrix<T>,
    diagonal: DVector<T>,
    symmetric: bool,
}

impl<T: Real> GaussSeidel<T> {
    pub fn new(matrix: &CsrMatrix<T>, symmetric: bool) -> Result<Self, FactorizationError> {
        let diagonal = nonzero_diagonal(matrix)?;
        Ok(Self {
            matrix: matrix.clone(),
            diagonal,
            symmetric,
        })
    }
}

impl<T: Real> LinearOperator<T> for GaussSeidel<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let n = self.diagonal.len();
        let mut forward = DVector::zeros(n);
        for i in 0..n {
            let row = self.matrix.row(i);
            let mut sum = x[i];
            for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
                if j < i {
                    sum -= a_ij * forward[j];
                }
            }
            forward[i] = sum / self.diagonal[i];
        }

        if !self.symmetric {
            y.copy_from(&forward);
            return Ok(());
        }

        let mut backward = DVector::zeros(n);
        for i in (0..n).rev() {
            let row = self.matrix.row(i);
            let mut sum = self.diagonal[i] * forward[i];
            for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
                if j > i {
                    sum -= a_ij * backward[j];
                }
            }
            backward[i] = sum / self.diagonal[i];
        }
        y.copy_from(&backward);
        Ok(())
    }
}

/// Row-compressed triangular factor.
#[derive(Debug, Clone)]
struct TriangularFactor<T> {
    offsets: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<T>,
}

impl<T: Real> TriangularFactor<T> {
    fn new() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    fn push(&mut self, col: usize, value: T) {
        self.indices.push(col);
        self.values.push(value);
    }

    fn finish_row(&mut self) {
        self.offsets.push(self.indices.len());
    }

    fn row(&self, i: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.offsets[i]..self.offsets[i + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Solves $L y = x$ in place, where the factor holds the strictly lower part of a unit
    /// lower triangular $L$.
    fn solve_unit_lower_in_place(&self, x: &mut DVector<T>) {
        for i in 0..x.len() {
            let mut sum = x[i];
            for (j, l_ij) in self.row(i) {
                sum -= l_ij * x[j];
            }
            x[i] = sum;
        }
    }

    /// Solves $L^T y = x$ in place for the same unit lower triangular $L$.
    fn solve_unit_lower_transpose_in_place(&self, x: &mut DVector<T>) {
        for i in (0..x.len()).rev() {
            let x_i = x[i];
            for (j, l_ij) in self.row(i) {
                x[j] -= l_ij * x_i;
            }
        }
    }

    /// Solves $U y = x$ in place, where each row of the factor starts with its diagonal entry.
    fn solve_upper_in_place(&self, x: &mut DVector<T>) {
        for i in (0..x.len()).rev() {
            // Rows start with their (nonzero) diagonal entry
            let u_ii = self.values[self.offsets[i]];
            let mut sum = x[i];
            for (j, u_ij) in self.row(i).skip(1) {
                sum -= u_ij * x[j];
            }
            x[i] = sum / u_ii;
        }
    }
}

/// Level-of-fill incomplete LU factorization, ILU(k).
///
/// Entry $(i, j)$ carries a level, zero for entries of $A$ and
/// $\min(\mathrm{lev}_{ij}, \mathrm{lev}_{ik} + \mathrm{lev}_{kj} + 1)$ for fill created by
/// eliminating with row $k$. Fill with level greater than $k$ is discarded.
#[derive(Debug, Clone)]
pub struct IncompleteLu<T: Real> {
    lower: TriangularFactor<T>,
    upper: TriangularFactor<T>,
    level: usize,
}

impl<T: Real> IncompleteLu<T> {
    pub fn new(matrix: &CsrMatrix<T>, level: usize) -> Result<Self, FactorizationError> {
        let n = matrix.nrows();
        let mut lower = TriangularFactor::new();
        let mut upper = TriangularFactor::new();
        let mut upper_levels: Vec<usize> = Vec::new();

        // Dense work row, with usize::MAX marking entries outside the current pattern
        let mut work = vec![T::zero(); n];
        let mut levels = vec![usize::MAX; n];

        for i in 0..n {
            let mut pattern = BTreeSet::new();
            let row = matrix.row(i);
            for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
                work[j] = a_ij;
                levels[j] = 0;
                pattern.insert(j);
            }

            let mut next = pattern.range(..i).next().copied();
            while let Some(k) = next {
                let u_start = upper.offsets[k];
                let u_kk = upper.values[u_start];
                let l_ik = work[k] / u_kk;
                work[k] = l_ik;
                let level_ik = levels[k];

                for (local, (j, u_kj)) in upper.row(k).enumerate().skip(1) {
                    let fill_level = level_ik
                        .saturating_add(upper_levels[u_start + local])
                        .saturating_add(1);
                    if levels[j] == usize::MAX {
                        if fill_level <= level {
                            work[j] = -l_ik * u_kj;
                            levels[j] = fill_level;
                            pattern.insert(j);
                        }
                    } else {
                        work[j] -= l_ik * u_kj;
                        levels[j] = levels[j].min(fill_level);
                    }
                }
                next = pattern.range(k + 1..i).next().copied();
            }

            if !pattern.contains(&i) || work[i] == T::zero() || !work[i].is_finite() {
                return Err(FactorizationError::ZeroPivot { row: i });
            }

            for &j in &pattern {
                if j < i {
                    lower.push(j, work[j]);
                } else {
                    upper.push(j, work[j]);
                    upper_levels.push(levels[j]);
                }
                work[j] = T::zero();
                levels[j] = usize::MAX;
            }
            lower.finish_row();
            upper.finish_row();
        }

        Ok(Self { lower, upper, level })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Number of stored entries in the combined factors.
    pub fn nnz(&self) -> usize {
        self.lower.nnz() + self.upper.nnz()
    }
}

impl<T: Real> LinearOperator<T> for IncompleteLu<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let mut z = x.clone_owned();
        self.lower.solve_unit_lower_in_place(&mut z);
        self.upper.solve_upper_in_place(&mut z);
        y.copy_from(&z);
        Ok(())
    }
}

/// Level-of-fill incomplete Cholesky factorization, IC(k), in the form $A \approx L D L^T$.
///
/// The factor is obtained from ILU(k) of a symmetric matrix, for which $U = D L^T$ holds. Only
/// $L$ and $D$ are kept, which makes the preconditioner symmetric even when the matrix is
/// only approximately so.
#[derive(Debug, Clone)]
pub struct IncompleteCholesky<T: Real> {
    lower: TriangularFactor<T>,
    diagonal: DVector<T>,
    level: usize,
}

impl<T: Real> IncompleteCholesky<T> {
    pub fn new(matrix: &CsrMatrix<T>, level: usize) -> Result<Self, FactorizationError> {
        let IncompleteLu { lower, upper, level } = IncompleteLu::new(matrix, level)?;
        let n = matrix.nrows();
        let mut diagonal = DVector::zeros(n);
        for i in 0..n {
            let d = upper.values[upper.offsets[i]];
            if !(d > T::zero()) {
                return Err(FactorizationError::NonPositivePivot { row: i });
            }
            diagonal[i] = d;
        }
        Ok(Self { lower, diagonal, level })
    }

    pub fn level(&self) -> usize {
        self.level
    }
}

impl<T: Real> LinearOperator<T> for IncompleteCholesky<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let mut z = x.clone_owned();
        self.lower.solve_unit_lower_in_place(&mut z);
        z.component_div_assign(&self.diagonal);
        self.lower.solve_unit_lower_transpose_in_place(&mut z);
        y.copy_from(&z);
        Ok(())
    }
}

/// Exact solve through a dense LU decomposition.
#[derive(Debug, Clone)]
pub struct DirectSolver<T: Real> {
    lu: LU<T, Dyn, Dyn>,
}

impl<T: Real> DirectSolver<T> {
    pub fn new(matrix: &CsrMatrix<T>) -> Result<Self, FactorizationError> {
        Self::from_dense(DMatrix::from(matrix))
    }

    pub fn from_dense(matrix: DMatrix<T>) -> Result<Self, FactorizationError> {
        if !matrix.is_square() {
            return Err(FactorizationError::NotSquare {
                nrows: matrix.nrows(),
                ncols: matrix.ncols(),
            });
        }
        let lu = matrix.lu();
        if lu.is_invertible() {
            Ok(Self { lu })
        } else {
            Err(FactorizationError::Singular)
        }
    }

    /// Computes the explicit inverse of the factorized matrix.
    pub fn inverse(&self) -> Result<DMatrix<T>, FactorizationError> {
        self.lu.try_inverse().ok_or(FactorizationError::Singular)
    }

    pub fn solve_in_place(&self, b: &mut DVector<T>) -> Result<(), FactorizationError> {
        if self.lu.solve_mut(b) {
            Ok(())
        } else {
            Err(FactorizationError::Singular)
        }
    }
}

impl<T: Real> LinearOperator<T> for DirectSolver<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let mut z = x.clone_owned();
        self.solve_in_place(&mut z)?;
        y.copy_from(&z);
        Ok(())
    }
}
