use cpmor_optimize::calculus::*;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector, DVectorView};

#[test]
fn approximate_jacobian_fd_simple_function() {
    let x = DVector::from_column_slice(&[3.0, 4.0]);
    let mut x_work = x.clone();
    let j = approximate_jacobian_fd(
        2,
        |x, mut f| {
            let (x1, x2) = (x[0], x[1]);
            f[0] = x1 * x2 + 3.0;
            f[1] = x1 * x1 + x2 * x2 + x1 + 5.0;
        },
        &mut x_work,
        1e-6,
    );

    // J = [   x2           x1 ]
    //     [ 2*x1 + 1     2*x2 ]
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);

    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
    // The perturbed input is restored
    assert_eq!(x_work, x);
}

#[test]
fn test_approximate_gradient_fd() {
    // Define some function f and its gradient
    let f = |x: DVectorView<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        3.0 * x * x * x + 3.0 * x * y - 5.0 * z * z + 2.0
    };
    let f_grad = |x: DVectorView<f64>| {
        let (x, y, z) = (x[0], x[1], x[2]);
        DVector::from_column_slice(&[9.0 * x * x + 3.0 * y, 3.0 * x, -10.0 * z])
    };

    let mut x = DVector::from_column_slice(&[3.0, 4.0, 5.0]);
    let f_grad_fd = approximate_gradient_fd(f, &mut x, 1e-6);

    assert_matrix_eq!(f_grad_fd, f_grad(DVectorView::from(&x)), comp = abs, tol = 1e-6);
}

#[test]
fn finite_difference_step_scales_with_magnitude() {
    let small = DVector::from_column_slice(&[1e-3, -2e-3]);
    let large = DVector::from_column_slice(&[10.0, -1e4]);
    let eps = f64::EPSILON.sqrt();

    assert_scalar_eq!(finite_difference_step(DVectorView::from(&small)), eps, comp = float);
    assert_scalar_eq!(finite_difference_step(DVectorView::from(&large)), 1e4 * eps, comp = float);
}
