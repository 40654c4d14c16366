use cpmor_sparse::operator::materialize;
use cpmor_sparse::precond::{DirectSolver, IncompleteLu, Jacobi};
use cpmor_sparse::{build_preconditioner, FactorizationError, LinearOperator, PreconditionerType};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use proptest::prelude::*;

fn apply<A: LinearOperator<f64> + ?Sized>(operator: &A, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(x.len());
    operator
        .apply(DVectorViewMut::from(&mut y), DVectorView::from(x))
        .unwrap();
    y
}

/// Arrow-shaped SPD matrix with a dense first row and column on top of a diagonal.
/// Eliminating the first row fills in the trailing block, so ILU(0) drops fill whereas ILU(1)
/// is exact.
fn arrow_matrix(n: usize) -> CsrMatrix<f64> {
    let mut dense = DMatrix::zeros(n, n);
    for i in 0..n {
        dense[(i, i)] = 4.0 + i as f64;
        if i > 0 {
            dense[(i, 0)] = 1.0;
            dense[(0, i)] = 1.0;
        }
    }
    CsrMatrix::from(&dense)
}

#[test]
fn jacobi_inverts_diagonal() {
    let csr = util::laplacian_1d(3);
    let jacobi = Jacobi::new(&csr).unwrap();
    let y = apply(&jacobi, &util::ramp(3, 2.0));
    assert_matrix_eq!(y, DVector::from_column_slice(&[1.0, 2.0, 3.0]), comp = float);
}

#[test]
fn missing_diagonal_is_reported() {
    let dense = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
    let csr = CsrMatrix::from(&dense);
    for kind in [
        PreconditionerType::Jacobi,
        PreconditionerType::GaussSeidel,
        PreconditionerType::SymmetricGaussSeidel,
        PreconditionerType::Ilu(0),
    ] {
        let result = build_preconditioner(kind, &csr);
        assert_eq!(result.err(), Some(FactorizationError::ZeroPivot { row: 0 }));
    }
}

#[test]
fn non_square_matrices_are_rejected() {
    let csr = CsrMatrix::from(&DMatrix::from_element(2, 3, 1.0));
    let result = build_preconditioner(PreconditionerType::Direct, &csr);
    assert_eq!(result.err(), Some(FactorizationError::NotSquare { nrows: 2, ncols: 3 }));
}

#[test]
fn gauss_seidel_solves_lower_triangular_systems_exactly() {
    let dense = DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 0.0, 1.0, 4.0, 0.0, -1.0, 2.0, 5.0]);
    let csr = CsrMatrix::from(&dense);
    let preconditioner = build_preconditioner(PreconditionerType::GaussSeidel, &csr).unwrap();
    let b = DVector::from_column_slice(&[2.0, 5.0, 6.0]);
    let x = apply(preconditioner.as_ref(), &b);
    assert_matrix_eq!(&dense * x, b, comp = abs, tol = 1e-12);
}

#[test]
fn symmetric_gauss_seidel_is_symmetric_for_symmetric_matrices() {
    let csr = util::laplacian_1d(6);
    let preconditioner = build_preconditioner(PreconditionerType::SymmetricGaussSeidel, &csr).unwrap();
    let m = materialize(preconditioner.as_ref(), 6).unwrap();
    assert_matrix_eq!(m, m.transpose(), comp = abs, tol = 1e-12);
}

#[test]
fn tridiagonal_factorizations_are_exact() {
    // A tridiagonal matrix produces no fill, so level zero factorizations are exact
    let csr = util::laplacian_1d(8);
    let dense = DMatrix::from(&csr);
    let inverse = dense.clone().try_inverse().unwrap();

    for kind in [PreconditionerType::Ilu(0), PreconditionerType::Ic(0), PreconditionerType::Direct] {
        let preconditioner = build_preconditioner(kind, &csr).unwrap();
        let m = materialize(preconditioner.as_ref(), 8).unwrap();
        assert_matrix_eq!(m, inverse, comp = abs, tol = 1e-10);
    }
}

#[test]
fn fill_level_controls_accuracy() {
    let n = 6;
    let csr = arrow_matrix(n);
    let dense = DMatrix::from(&csr);
    let identity = DMatrix::<f64>::identity(n, n);

    let ilu0 = IncompleteLu::new(&csr, 0).unwrap();
    let ilu1 = IncompleteLu::new(&csr, 1).unwrap();
    assert!(ilu1.nnz() > ilu0.nnz());

    let error0 = (&dense * materialize(&ilu0, n).unwrap() - &identity).norm();
    let error1 = (&dense * materialize(&ilu1, n).unwrap() - &identity).norm();
    assert!(error0 > 1e-6);
    assert!(error1 < 1e-10);

    let ic1 = build_preconditioner(PreconditionerType::Ic(1), &csr).unwrap();
    let ic_error = (&dense * materialize(ic1.as_ref(), n).unwrap() - &identity).norm();
    assert!(ic_error < 1e-10);
}

#[test]
fn incomplete_cholesky_requires_positive_pivots() {
    let dense = DMatrix::from_row_slice(2, 2, &[-2.0, 1.0, 1.0, -2.0]);
    let csr = CsrMatrix::from(&dense);
    let result = build_preconditioner(PreconditionerType::Ic(0), &csr);
    assert_eq!(result.err(), Some(FactorizationError::NonPositivePivot { row: 0 }));
}

#[test]
fn direct_solver_reports_singular_matrices() {
    let dense = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
    assert_eq!(DirectSolver::from_dense(dense).err(), Some(FactorizationError::Singular));
}

#[test]
fn preconditioner_type_display() {
    assert_eq!(PreconditionerType::Ilu(2).to_string(), "ILU(2)");
    assert_eq!(PreconditionerType::Ic(0).to_string(), "IC(0)");
}

proptest! {
    #[test]
    fn direct_solver_inverts_diagonally_dominant_matrices(
        entries in proptest::collection::vec(-1.0..1.0f64, 16),
        rhs in proptest::collection::vec(-10.0..10.0f64, 4),
    ) {
        let mut dense = DMatrix::from_row_slice(4, 4, &entries);
        for i in 0..4 {
            dense[(i, i)] += 5.0;
        }
        let b = DVector::from_column_slice(&rhs);
        let solver = DirectSolver::from_dense(dense.clone()).unwrap();
        let x = apply(&solver, &b);
        prop_assert!((&dense * x - b).amax() < 1e-10);
    }
}
