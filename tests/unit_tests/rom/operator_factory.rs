use super::{non_orthogonal_basis, orthonormal_basis};
use cpmor::rom::{Projection, ReducedOperatorFactory, RomError};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use util::{dense_to_csr_full_pattern, laplacian_1d};

fn scaled_identity(n: usize, scale: f64) -> CsrMatrix<f64> {
    dense_to_csr_full_pattern(&(DMatrix::identity(n, n) * scale))
}

#[test]
fn full_jacobian_requirement_depends_on_projection() {
    let basis = orthonormal_basis(6, 2);
    let galerkin = ReducedOperatorFactory::galerkin(basis.clone()).unwrap();
    let petrov_galerkin = ReducedOperatorFactory::petrov_galerkin(basis.clone(), non_orthogonal_basis(6, 2)).unwrap();
    let gauss_newton = ReducedOperatorFactory::gauss_newton(basis.clone()).unwrap();
    let metric = ReducedOperatorFactory::gauss_newton_metric(basis, scaled_identity(6, 2.0)).unwrap();

    for factory in [&galerkin, &petrov_galerkin] {
        assert!(!factory.full_jacobian_required(false, false));
        assert!(!factory.full_jacobian_required(true, false));
        assert!(factory.full_jacobian_required(false, true));
        assert!(factory.full_jacobian_required(true, true));
    }
    for factory in [&gauss_newton, &metric] {
        assert!(!factory.full_jacobian_required(false, false));
        assert!(factory.full_jacobian_required(true, false));
        assert!(factory.full_jacobian_required(false, true));
        assert!(factory.full_jacobian_required(true, true));
    }

    assert_eq!(galerkin.projection().name(), "Galerkin");
    assert_eq!(petrov_galerkin.projection().name(), "Petrov-Galerkin");
    assert_eq!(gauss_newton.projection().name(), "Gauss-Newton");
    assert_eq!(metric.projection().name(), "Gauss-Newton with metric");
}

#[test]
fn left_basis_follows_projection() {
    let n = 7;
    let basis = non_orthogonal_basis(n, 3);
    let left = orthonormal_basis(n, 3);
    let jacobian = laplacian_1d(n);
    let dense_jacobian = DMatrix::from(&jacobian);
    let jacobian_basis = &dense_jacobian * &basis;

    let mut galerkin = ReducedOperatorFactory::galerkin(basis.clone()).unwrap();
    galerkin.full_jacobian_is(&jacobian);
    assert_matrix_eq!(*galerkin.premultiplied_basis(), jacobian_basis, comp = abs, tol = 1e-12);
    assert_matrix_eq!(*galerkin.left_basis(), basis, comp = abs, tol = 0.0);
    assert_matrix_eq!(
        galerkin.reduced_jacobian(),
        basis.transpose() * &jacobian_basis,
        comp = abs,
        tol = 1e-12
    );

    let mut petrov_galerkin = ReducedOperatorFactory::petrov_galerkin(basis.clone(), left.clone()).unwrap();
    petrov_galerkin.full_jacobian_is(&jacobian);
    assert_matrix_eq!(*petrov_galerkin.left_basis(), left, comp = abs, tol = 0.0);

    let mut gauss_newton = ReducedOperatorFactory::gauss_newton(basis.clone()).unwrap();
    gauss_newton.full_jacobian_is(&jacobian);
    assert_matrix_eq!(*gauss_newton.left_basis(), jacobian_basis, comp = abs, tol = 1e-12);

    let mut metric = ReducedOperatorFactory::gauss_newton_metric(basis.clone(), scaled_identity(n, 3.0)).unwrap();
    metric.full_jacobian_is(&jacobian);
    assert_matrix_eq!(*metric.left_basis(), &jacobian_basis * 3.0, comp = abs, tol = 1e-12);
    assert_matrix_eq!(
        metric.reduced_jacobian(),
        jacobian_basis.transpose() * &jacobian_basis * 3.0,
        comp = abs,
        tol = 1e-10
    );

    let v = DVector::from_fn(n, |i, _| i as f64 - 3.0);
    assert_matrix_eq!(metric.left_projection(&v), (&jacobian_basis * 3.0).tr_mul(&v), comp = abs, tol = 1e-12);
    assert_matrix_eq!(metric.right_projection(&v), basis.tr_mul(&v), comp = abs, tol = 1e-12);
}

#[test]
fn least_squares_projections_fall_back_to_right_basis() {
    let basis = orthonormal_basis(5, 2);
    let factory = ReducedOperatorFactory::gauss_newton(basis.clone()).unwrap();
    assert_eq!(factory.left_basis(), &basis);
    assert_eq!(factory.premultiplied_basis(), &DMatrix::zeros(5, 2));
    assert_eq!(factory.reduced_dim(), 2);
}

#[test]
fn mismatched_operators_are_rejected() {
    let basis = orthonormal_basis(6, 2);
    let error = ReducedOperatorFactory::petrov_galerkin(basis.clone(), orthonormal_basis(5, 2)).unwrap_err();
    assert!(matches!(
        error,
        RomError::DimensionMismatch {
            context: "Petrov-Galerkin left basis",
            ..
        }
    ));

    let error = ReducedOperatorFactory::gauss_newton_metric(basis.clone(), scaled_identity(4, 1.0)).unwrap_err();
    assert_eq!(
        error,
        RomError::DimensionMismatch {
            context: "Gauss-Newton metric",
            expected: 6,
            actual: 4
        }
    );

    let projection = Projection::PetrovGalerkin {
        left_basis: orthonormal_basis(6, 3),
    };
    assert!(ReducedOperatorFactory::new(basis, projection).is_err());
}
