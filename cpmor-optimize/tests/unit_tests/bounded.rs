use cpmor_optimize::bounded::{minimize_bounded, BoundedSettings, BoxConstraints};
use cpmor_optimize::minimizer::NonlinearSystem;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use proptest::prelude::*;
use std::cell::Cell;
use std::error::Error;

/// r(x) = x - target, possibly coupled through a nonlinear term.
struct ShiftedSystem {
    target: DVector<f64>,
    coupling: f64,
}

impl NonlinearSystem<f64> for ShiftedSystem {
    fn dimension(&self) -> usize {
        self.target.len()
    }

    fn residual_into(&self, mut r: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        for i in 0..x.len() {
            let next = x[(i + 1) % x.len()];
            r[i] = x[i] - self.target[i] + self.coupling * next * next;
        }
        Ok(())
    }
}

struct LogarithmicSystem;

impl NonlinearSystem<f64> for LogarithmicSystem {
    fn dimension(&self) -> usize {
        1
    }

    fn residual_into(&self, mut r: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        r[0] = x[0].ln();
        Ok(())
    }
}

/// r(x) = 2x - 1, failing once `budget` residual evaluations have been used up.
struct ExhaustibleSystem {
    budget: Cell<usize>,
}

impl NonlinearSystem<f64> for ExhaustibleSystem {
    fn dimension(&self) -> usize {
        1
    }

    fn residual_into(&self, mut r: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let remaining = self.budget.get();
        if remaining == 0 {
            return Err(Box::from("evaluation budget exhausted"));
        }
        self.budget.set(remaining - 1);
        r[0] = 2.0 * x[0] - 1.0;
        Ok(())
    }

    fn hessian(&self, _x: DVectorView<f64>) -> Result<DMatrix<f64>, Box<dyn Error>> {
        Ok(DMatrix::from_element(1, 1, 2.0))
    }
}

fn wide_bounds(n: usize) -> BoxConstraints<f64> {
    BoxConstraints::new(DVector::from_element(n, -1e50), DVector::from_element(n, 1e50))
}

#[test]
fn wide_bounds_recover_unconstrained_solution() {
    let system = ShiftedSystem {
        target: DVector::from_column_slice(&[0.5, -0.25, 0.1]),
        coupling: 0.1,
    };
    let mut x = DVector::zeros(3);
    let result = minimize_bounded(&system, &mut x, &wide_bounds(3), &BoundedSettings::default());

    assert!(result.converged, "{:?}", result);
    let r = system.residual(DVectorView::from(&x)).unwrap();
    assert!(r.norm() <= 1e-6);
}

#[test]
fn active_bounds_are_respected() {
    let system = ShiftedSystem {
        target: DVector::from_column_slice(&[2.0, -3.0]),
        coupling: 0.0,
    };
    let bounds = BoxConstraints::new(DVector::from_column_slice(&[0.0, -1.0]), DVector::from_column_slice(&[1.0, 1.0]));
    let mut x = DVector::from_column_slice(&[0.5, 0.0]);
    let result = minimize_bounded(&system, &mut x, &bounds, &BoundedSettings::default());

    assert!(result.converged, "{:?}", result);
    assert!(!result.failed);
    assert_matrix_eq!(x, DVector::from_column_slice(&[1.0, -1.0]), comp = abs, tol = 1e-14);
}

#[test]
fn degenerate_interval_fixes_component() {
    let system = ShiftedSystem {
        target: DVector::from_column_slice(&[0.3, 0.7]),
        coupling: 0.0,
    };
    let bounds = BoxConstraints::new(
        DVector::from_column_slice(&[-1e50, -1e-50]),
        DVector::from_column_slice(&[1e50, 1e-50]),
    );
    assert!(!bounds.is_fixed(0));
    assert!(bounds.is_fixed(1));

    let mut x = DVector::zeros(2);
    let result = minimize_bounded(&system, &mut x, &bounds, &BoundedSettings::default());

    assert!(result.converged, "{:?}", result);
    assert!((x[0] - 0.3).abs() <= 1e-12);
    assert!(x[1].abs() <= 1e-50);
}

#[test]
fn non_finite_initial_residual_is_reported() {
    let mut x = DVector::from_element(1, -1.0);
    let result = minimize_bounded(&LogarithmicSystem, &mut x, &wide_bounds(1), &BoundedSettings::default());

    assert!(result.failed);
    assert!(!result.converged);
    assert!(result
        .failure_message
        .contains("Non-finite residual after 0 iterations"));
}

#[test]
fn residual_failure_after_accepted_step_reports_iteration() {
    // Initial residual and the line search value use up the budget
    let system = ExhaustibleSystem { budget: Cell::new(2) };
    let mut x = DVector::zeros(1);
    let result = minimize_bounded(&system, &mut x, &wide_bounds(1), &BoundedSettings::default());

    assert!(result.failed);
    assert_eq!(result.iterations, 1);
    assert!(result
        .failure_message
        .contains("Residual evaluation failed at iteration 1: evaluation budget exhausted"));
    assert_eq!(x[0], 0.5);
}

proptest! {
    #[test]
    fn solution_is_always_feasible(lower in -2.0..0.0f64, width in 0.0..3.0f64, target in -5.0..5.0f64) {
        let system = ShiftedSystem {
            target: DVector::from_column_slice(&[target, -target]),
            coupling: 0.0,
        };
        let bounds = BoxConstraints::new(
            DVector::from_element(2, lower),
            DVector::from_element(2, lower + width),
        );
        let mut x = DVector::zeros(2);
        let result = minimize_bounded(&system, &mut x, &bounds, &BoundedSettings::default());

        prop_assert!(!result.failed);
        for &x_i in x.iter() {
            prop_assert!(x_i >= lower && x_i <= lower + width);
        }
    }
}
