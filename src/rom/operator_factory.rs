//! Construction of reduced operators from full-order residuals and Jacobians.
//!
//! With the right basis $\Phi$ and a left basis $L$, the reduced residual is $f_r = L^T f$ and
//! the reduced Jacobian is $J_r = L^T (J \Phi)$. The projection determines $L$:
//!
//! | Projection | $L$ |
//! | --- | --- |
//! | Galerkin | $\Phi$ |
//! | Petrov-Galerkin | $\Psi$ |
//! | Gauss-Newton | $J \Phi$ |
//! | Gauss-Newton with metric | $G J \Phi$ |
//!
//! The factory keeps working copies of $J \Phi$ and $L$, which the evaluator may precondition
//! in place before the contraction.
use crate::rom::RomError;
use cpmor_traits::Real;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

#[derive(Debug, Clone, PartialEq)]
pub enum Projection<T: Real> {
    Galerkin,
    PetrovGalerkin { left_basis: DMatrix<T> },
    GaussNewton,
    GaussNewtonMetric { metric: CsrMatrix<T> },
}

impl<T: Real> Projection<T> {
    pub fn name(&self) -> &'static str {
        match self {
            Projection::Galerkin => "Galerkin",
            Projection::PetrovGalerkin { .. } => "Petrov-Galerkin",
            Projection::GaussNewton => "Gauss-Newton",
            Projection::GaussNewtonMetric { .. } => "Gauss-Newton with metric",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReducedOperatorFactory<T: Real> {
    projection: Projection<T>,
    right_basis: DMatrix<T>,
    premultiplied_basis: DMatrix<T>,
    left_basis: DMatrix<T>,
}

impl<T: Real> ReducedOperatorFactory<T> {
    pub fn new(right_basis: DMatrix<T>, projection: Projection<T>) -> Result<Self, RomError> {
        let n = right_basis.nrows();
        match &projection {
            Projection::PetrovGalerkin { left_basis } => {
                if left_basis.shape() != right_basis.shape() {
                    return Err(RomError::DimensionMismatch {
                        context: "Petrov-Galerkin left basis",
                        expected: n,
                        actual: left_basis.nrows(),
                    });
                }
            }
            Projection::GaussNewtonMetric { metric } => {
                if metric.nrows() != n || metric.ncols() != n {
                    return Err(RomError::DimensionMismatch {
                        context: "Gauss-Newton metric",
                        expected: n,
                        actual: metric.nrows(),
                    });
                }
            }
            _ => {}
        }

        // Until the first Jacobian arrives, the least-squares projections fall back to Galerkin
        let left_basis = match &projection {
            Projection::PetrovGalerkin { left_basis } => left_basis.clone(),
            _ => right_basis.clone(),
        };
        let premultiplied_basis = DMatrix::zeros(n, right_basis.ncols());
        Ok(Self {
            projection,
            right_basis,
            premultiplied_basis,
            left_basis,
        })
    }

    pub fn galerkin(basis: DMatrix<T>) -> Result<Self, RomError> {
        Self::new(basis, Projection::Galerkin)
    }

    pub fn petrov_galerkin(basis: DMatrix<T>, left_basis: DMatrix<T>) -> Result<Self, RomError> {
        Self::new(basis, Projection::PetrovGalerkin { left_basis })
    }

    pub fn gauss_newton(basis: DMatrix<T>) -> Result<Self, RomError> {
        Self::new(basis, Projection::GaussNewton)
    }

    pub fn gauss_newton_metric(basis: DMatrix<T>, metric: CsrMatrix<T>) -> Result<Self, RomError> {
        Self::new(basis, Projection::GaussNewtonMetric { metric })
    }

    pub fn projection(&self) -> &Projection<T> {
        &self.projection
    }

    pub fn reduced_dim(&self) -> usize {
        self.right_basis.ncols()
    }

    /// Whether the full Jacobian must be evaluated to produce the requested reduced outputs.
    ///
    /// The least-squares projections need it for the residual too, since their left basis
    /// depends on the Jacobian.
    pub fn full_jacobian_required(&self, residual_requested: bool, jacobian_requested: bool) -> bool {
        match self.projection {
            Projection::Galerkin | Projection::PetrovGalerkin { .. } => jacobian_requested,
            Projection::GaussNewton | Projection::GaussNewtonMetric { .. } => {
                residual_requested || jacobian_requested
            }
        }
    }

    /// Updates $J \Phi$ and resets the left basis copy for a new full Jacobian.
    pub fn full_jacobian_is(&mut self, jacobian: &CsrMatrix<T>) {
        self.premultiplied_basis = jacobian * &self.right_basis;
        self.left_basis = match &self.projection {
            Projection::Galerkin => self.right_basis.clone(),
            Projection::PetrovGalerkin { left_basis } => left_basis.clone(),
            Projection::GaussNewton => self.premultiplied_basis.clone(),
            Projection::GaussNewtonMetric { metric } => metric * &self.premultiplied_basis,
        };
    }

    pub fn right_basis(&self) -> &DMatrix<T> {
        &self.right_basis
    }

    pub fn left_basis(&self) -> &DMatrix<T> {
        &self.left_basis
    }

    pub fn left_basis_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.left_basis
    }

    pub fn premultiplied_basis(&self) -> &DMatrix<T> {
        &self.premultiplied_basis
    }

    pub fn premultiplied_basis_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.premultiplied_basis
    }

    /// $L^T v$.
    pub fn left_projection(&self, v: &DVector<T>) -> DVector<T> {
        self.left_basis.tr_mul(v)
    }

    /// $L^T M$.
    pub fn left_projection_columns(&self, m: &DMatrix<T>) -> DMatrix<T> {
        self.left_basis.tr_mul(m)
    }

    /// $\Phi^T v$.
    pub fn right_projection(&self, v: &DVector<T>) -> DVector<T> {
        self.right_basis.tr_mul(v)
    }

    /// $J_r = L^T (J \Phi)$, based on the last full Jacobian.
    pub fn reduced_jacobian(&self) -> DMatrix<T> {
        self.left_basis.tr_mul(&self.premultiplied_basis)
    }
}
