use crate::rom::RomError;
use cpmor_traits::Real;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// The affine trial space $\{ \Phi x_r + x_0 \}$ spanned by the columns of a reduced basis.
#[derive(Debug, Clone)]
pub struct ReducedSpace<T: Real> {
    basis: DMatrix<T>,
    origin: Option<DVector<T>>,
    gram: Cholesky<T, Dyn>,
}

impl<T: Real> ReducedSpace<T> {
    /// A linear space through the origin.
    pub fn new(basis: DMatrix<T>) -> Result<Self, RomError> {
        let gram = (basis.transpose() * &basis)
            .cholesky()
            .ok_or(RomError::RankDeficientBasis)?;
        Ok(Self {
            basis,
            origin: None,
            gram,
        })
    }

    pub fn with_origin(basis: DMatrix<T>, origin: DVector<T>) -> Result<Self, RomError> {
        if origin.len() != basis.nrows() {
            return Err(RomError::DimensionMismatch {
                context: "origin of reduced space",
                expected: basis.nrows(),
                actual: origin.len(),
            });
        }
        let mut space = Self::new(basis)?;
        space.origin = Some(origin);
        Ok(space)
    }

    pub fn basis(&self) -> &DMatrix<T> {
        &self.basis
    }

    pub fn origin(&self) -> Option<&DVector<T>> {
        self.origin.as_ref()
    }

    pub fn full_dim(&self) -> usize {
        self.basis.nrows()
    }

    pub fn reduced_dim(&self) -> usize {
        self.basis.ncols()
    }

    /// $x = \Phi x_r + x_0$.
    pub fn expansion(&self, x_r: &DVector<T>) -> DVector<T> {
        let mut x = self.linear_expansion(x_r);
        if let Some(origin) = &self.origin {
            x += origin;
        }
        x
    }

    /// $\Phi v_r$, for increments and rates.
    pub fn linear_expansion(&self, v_r: &DVector<T>) -> DVector<T> {
        &self.basis * v_r
    }

    /// The least-squares coordinates $\arg\min_y \| \Phi y - (x - x_0) \|$.
    pub fn reduction(&self, x: &DVector<T>) -> DVector<T> {
        let mut rhs = match &self.origin {
            Some(origin) => self.basis.tr_mul(&(x - origin)),
            None => self.basis.tr_mul(x),
        };
        self.gram.solve_mut(&mut rhs);
        rhs
    }

    /// The least-squares coordinates of an increment or rate, ignoring the origin.
    pub fn increment_reduction(&self, v: &DVector<T>) -> DVector<T> {
        let mut rhs = self.basis.tr_mul(v);
        self.gram.solve_mut(&mut rhs);
        rhs
    }

    /// $\Phi^T v$, for residual-like quantities.
    pub fn linear_reduction(&self, v: &DVector<T>) -> DVector<T> {
        self.basis.tr_mul(v)
    }

    /// $\Phi^T M$, applied column by column.
    pub fn linear_reduction_columns(&self, m: &DMatrix<T>) -> DMatrix<T> {
        self.basis.tr_mul(m)
    }
}
