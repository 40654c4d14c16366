use super::{non_orthogonal_basis, orthonormal_basis};
use cpmor::rom::{ReducedSpace, RomError};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;
use util::assert_panics;

#[test]
fn reduction_inverts_expansion_with_origin() {
    let basis = non_orthogonal_basis(10, 3);
    let origin = DVector::from_fn(10, |i, _| 0.5 - 0.1 * i as f64);
    let space = ReducedSpace::with_origin(basis.clone(), origin.clone()).unwrap();
    assert_eq!(space.full_dim(), 10);
    assert_eq!(space.reduced_dim(), 3);

    let x_r = DVector::from_column_slice(&[0.3, -1.2, 2.0]);
    let x = space.expansion(&x_r);
    assert_matrix_eq!(x, &basis * &x_r + &origin, comp = abs, tol = 1e-14);
    assert_matrix_eq!(space.reduction(&x), x_r, comp = abs, tol = 1e-12);

    // Increments ignore the origin
    assert_matrix_eq!(space.linear_expansion(&x_r), &basis * &x_r, comp = abs, tol = 1e-14);
    assert_matrix_eq!(space.increment_reduction(&(&basis * &x_r)), x_r, comp = abs, tol = 1e-12);
}

#[test]
fn reduction_is_least_squares_projection() {
    let basis = non_orthogonal_basis(8, 2);
    let space = ReducedSpace::new(basis.clone()).unwrap();
    let x = DVector::from_fn(8, |i, _| (i as f64).cos());
    let x_r = space.reduction(&x);

    // The residual of the least-squares problem is orthogonal to the basis
    let residual = &basis * &x_r - &x;
    assert_matrix_eq!(basis.tr_mul(&residual), DVector::zeros(2), comp = abs, tol = 1e-12);
}

#[test]
fn linear_reduction_is_transpose_product() {
    let basis = non_orthogonal_basis(6, 2);
    let space = ReducedSpace::with_origin(basis.clone(), DVector::from_element(6, 1.0)).unwrap();
    let v = DVector::from_fn(6, |i, _| i as f64);
    assert_matrix_eq!(space.linear_reduction(&v), basis.transpose() * &v, comp = abs, tol = 1e-14);

    let m = DMatrix::from_fn(6, 3, |i, j| (i * j) as f64);
    assert_matrix_eq!(space.linear_reduction_columns(&m), basis.transpose() * &m, comp = abs, tol = 1e-14);
}

#[test]
fn rank_deficient_basis_is_rejected() {
    let mut basis = orthonormal_basis(6, 3);
    basis.column_mut(1).fill(0.0);
    assert_eq!(ReducedSpace::new(basis).unwrap_err(), RomError::RankDeficientBasis);
}

#[test]
fn origin_must_match_full_dimension() {
    let error = ReducedSpace::with_origin(orthonormal_basis(6, 2), DVector::zeros(5)).unwrap_err();
    assert_eq!(
        error,
        RomError::DimensionMismatch {
            context: "origin of reduced space",
            expected: 6,
            actual: 5
        }
    );
}

#[test]
fn expansion_requires_reduced_dimension() {
    let space = ReducedSpace::new(orthonormal_basis(6, 3)).unwrap();
    assert_panics!(space.expansion(&DVector::zeros(2)));
}

proptest! {
    #[test]
    fn orthonormal_reduction_is_transpose_product(
        basis in cpmor::proptest::orthonormal_basis(8, 3),
        entries in proptest::collection::vec(-10.0..10.0, 8),
    ) {
        let space = ReducedSpace::new(basis.clone()).unwrap();
        let x = DVector::from_vec(entries);
        let x_r = space.reduction(&x);
        assert_matrix_eq!(x_r, basis.tr_mul(&x), comp = abs, tol = 1e-10);
        // Expanding and reducing again is the identity on the reduced space
        assert_matrix_eq!(space.reduction(&space.expansion(&x_r)), x_r, comp = abs, tol = 1e-10);
    }
}
