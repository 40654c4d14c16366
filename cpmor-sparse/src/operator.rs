use nalgebra::base::constraint::AreMultipliable;
use nalgebra::constraint::{DimEq, ShapeConstraint};
use nalgebra::storage::Storage;
use nalgebra::{ClosedAdd, ClosedMul, DMatrix, DVector, DVectorView, DVectorViewMut, Dim, Dyn, Matrix, Scalar, U1};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::{One, Zero};
use std::error::Error;

/// A linear map $y = A x$ that can be applied to vectors without being formed explicitly.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T, R, C, S> LinearOperator<T> for Matrix<T, R, C, S>
where
    T: Scalar + One + Zero + ClosedMul + ClosedAdd,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
    ShapeConstraint: DimEq<Dyn, R> + DimEq<C, Dyn> + AreMultipliable<R, C, Dyn, U1>,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: Scalar + Zero + One + ClosedMul + ClosedAdd,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Overwrites every column $x_j$ of `x` with $A x_j$.
pub fn apply_to_columns_in_place<T, A>(operator: &A, x: &mut DMatrix<T>) -> Result<(), Box<dyn Error>>
where
    T: Scalar + Zero,
    A: ?Sized + LinearOperator<T>,
{
    let mut result = DVector::zeros(x.nrows());
    for j in 0..x.ncols() {
        operator.apply(DVectorViewMut::from(&mut result), x.column(j))?;
        x.column_mut(j).copy_from(&result);
    }
    Ok(())
}

/// Overwrites `x` with $A x$.
pub fn apply_in_place<T, A>(operator: &A, x: &mut DVector<T>) -> Result<(), Box<dyn Error>>
where
    T: Scalar + Zero,
    A: ?Sized + LinearOperator<T>,
{
    let mut result = DVector::zeros(x.nrows());
    operator.apply(DVectorViewMut::from(&mut result), DVectorView::from(&*x))?;
    x.copy_from(&result);
    Ok(())
}

/// Forms the dense matrix representation of `operator` by applying it to the columns of the
/// $n \times n$ identity.
pub fn materialize<T, A>(operator: &A, n: usize) -> Result<DMatrix<T>, Box<dyn Error>>
where
    T: Scalar + Zero + One,
    A: ?Sized + LinearOperator<T>,
{
    let mut identity = DMatrix::identity(n, n);
    apply_to_columns_in_place(operator, &mut identity)?;
    Ok(identity)
}
