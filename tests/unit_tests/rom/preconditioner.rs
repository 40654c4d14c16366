use super::node_sets;
use cpmor::rom::dirichlet::{DirichletConditions, DirichletValueParameters};
use cpmor::rom::{PreconditionerCache, PreconditionerMode, RecomputePolicy, RomError, RomParameters};
use cpmor::sparse::csr::inverse_absolute_row_sums;
use cpmor::sparse::PreconditionerType;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use serde_json::json;
use std::collections::BTreeMap;
use util::{laplacian_1d, ramp};

fn left_condition() -> DirichletConditions<f64> {
    let params: BTreeMap<_, _> = [("DBC on NS left for DOF X".to_string(), DirichletValueParameters::Constant(0.0))].into();
    DirichletConditions::from_parameters(&params, &node_sets(&[("left", &[0])])).unwrap()
}

#[test]
fn modes_round_trip_through_names() {
    let names = PreconditionerMode::names();
    assert_eq!(names.len(), PreconditionerMode::ALL.len());
    for name in ["None", "DiagonalScaling", "Ifpack_Jacobi", "Ifpack_ILU1", "Ifpack_IC0", "Ifpack_Amesos"] {
        assert!(names.iter().any(|n| n == name), "{}", name);
    }
    for mode in PreconditionerMode::ALL {
        assert_eq!(mode.name().parse::<PreconditionerMode>().unwrap(), mode);
    }
    assert_eq!(
        "Ifpack_ILU1".parse::<PreconditionerMode>().unwrap(),
        PreconditionerMode::Algebraic(PreconditionerType::Ilu(1))
    );
}

#[test]
fn unknown_mode_lists_valid_names() {
    let error = "Ifpack_ILUT".parse::<PreconditionerMode>().unwrap_err();
    assert_eq!(
        error,
        RomError::UnknownPreconditioner {
            name: "Ifpack_ILUT".to_string()
        }
    );
    let message = error.to_string();
    assert!(message.contains("\"Ifpack_ILUT\""));
    assert!(message.contains("ProjectedSolution"));
    assert!(message.contains("Ifpack_SymmetricGaussSeidel"));
}

#[test]
fn parameters_deserialize_preconditioner_settings() {
    let params: RomParameters = serde_json::from_value(json!({
        "Preconditioner Type": "Ifpack_IC0",
        "Preconditioner Recompute Policy": "Step Start",
        "Number of DBC Modes": 2,
        "Output": { "Write Residual": true }
    }))
    .unwrap();
    assert_eq!(params.preconditioner, PreconditionerMode::Algebraic(PreconditionerType::Ic(0)));
    assert_eq!(params.recompute_policy, RecomputePolicy::StepStart);
    assert_eq!(params.num_dbc_modes, 2);
    assert!(params.output.residual);
    assert!(!params.output.jacobian);
    assert!(params.full_order_applies_bcs);
    assert!(params.run_nan_check);

    let defaults: RomParameters = serde_json::from_value(json!({})).unwrap();
    assert_eq!(defaults, RomParameters::default());

    let invalid = serde_json::from_value::<RomParameters>(json!({ "Preconditioner Type": "Ifpack_ILUT" }));
    assert!(invalid.is_err());
}

#[test]
fn recompute_follows_policy() {
    let jacobian = laplacian_1d(4);

    let none = PreconditionerCache::<f64>::new(PreconditionerMode::None, RecomputePolicy::StepStart);
    assert!(none.is_dirty());
    assert!(!none.needs_recompute());

    let mut every = PreconditionerCache::new(PreconditionerMode::Identity, RecomputePolicy::EveryJacobian);
    every.recompute(&jacobian, None).unwrap();
    assert!(every.needs_recompute());

    let mut step_start = PreconditionerCache::new(PreconditionerMode::DiagonalScaling, RecomputePolicy::StepStart);
    assert!(step_start.needs_recompute());
    step_start.recompute(&jacobian, None).unwrap();
    assert!(!step_start.is_dirty());
    assert!(!step_start.needs_recompute());
    step_start.mark_dirty();
    assert!(step_start.needs_recompute());
    step_start.recompute(&jacobian, None).unwrap();
    assert_eq!(step_start.recomputations(), 2);
}

#[test]
fn diagonal_scaling_scales_rows() {
    let jacobian = laplacian_1d(5);
    let mut cache = PreconditionerCache::new(PreconditionerMode::DiagonalScaling, RecomputePolicy::EveryJacobian);
    cache.recompute(&jacobian, None).unwrap();
    let scaling = inverse_absolute_row_sums(&jacobian);
    assert_eq!(cache.scaling(), Some(&scaling));
    assert!(cache.matrix().is_none());

    let mut v = ramp(5, 1.0);
    cache.apply(&mut v).unwrap();
    assert_matrix_eq!(v, ramp(5, 1.0).component_mul(&scaling), comp = float);

    let mut m = DMatrix::from_element(5, 2, 1.0);
    cache.apply_to_columns(&mut m).unwrap();
    for column in m.column_iter() {
        assert_matrix_eq!(column, scaling, comp = float);
    }
}

#[test]
fn inverse_jacobian_inverts_jacobian() {
    let jacobian = laplacian_1d(6);
    let dense = DMatrix::from(&jacobian);
    let mut cache = PreconditionerCache::new(PreconditionerMode::InverseJacobian, RecomputePolicy::EveryJacobian);
    cache.recompute(&jacobian, None).unwrap();

    let inverse = cache.matrix().unwrap();
    assert_matrix_eq!(inverse * &dense, DMatrix::<f64>::identity(6, 6), comp = abs, tol = 1e-12);

    let x = ramp(6, 0.5);
    let mut v = &dense * &x;
    cache.apply(&mut v).unwrap();
    assert_matrix_eq!(v, x, comp = abs, tol = 1e-12);
}

#[test]
fn projected_solution_solves_with_jacobian() {
    let jacobian = laplacian_1d(6);
    let dense = DMatrix::from(&jacobian);
    let mut cache = PreconditionerCache::new(PreconditionerMode::ProjectedSolution, RecomputePolicy::EveryJacobian);
    assert!(!cache.mode().preconditions_bases());
    cache.recompute(&jacobian, None).unwrap();
    assert!(cache.matrix().is_none());

    let x = DMatrix::from_fn(6, 2, |i, j| (i + j) as f64);
    let mut m = &dense * &x;
    cache.apply_to_columns(&mut m).unwrap();
    assert_matrix_eq!(m, x, comp = abs, tol = 1e-12);
}

#[test]
fn jacobi_is_applied_as_operator() {
    let jacobian = laplacian_1d(4);
    let mode = PreconditionerMode::Algebraic(PreconditionerType::Jacobi);
    assert!(mode.preconditions_bases());
    let mut cache = PreconditionerCache::new(mode, RecomputePolicy::EveryJacobian);
    cache.recompute(&jacobian, None).unwrap();
    assert!(cache.matrix().is_none());

    let mut v = DVector::from_element(4, 3.0);
    cache.apply(&mut v).unwrap();
    assert_eq!(v, DVector::from_element(4, 1.5));
}

#[test]
fn explicit_preconditioner_receives_dirichlet_conditions() {
    let jacobian = laplacian_1d(4);
    let conditions = left_condition();

    let mode = PreconditionerMode::Algebraic(PreconditionerType::Jacobi);
    let mut cache = PreconditionerCache::new(mode, RecomputePolicy::EveryJacobian);
    cache.recompute(&jacobian, Some(&conditions)).unwrap();
    let expected = DMatrix::from_diagonal(&DVector::from_column_slice(&[1.0, 0.5, 0.5, 0.5]));
    assert_matrix_eq!(*cache.matrix().unwrap(), expected, comp = abs, tol = 1e-15);

    let mut cache = PreconditionerCache::new(PreconditionerMode::InverseJacobian, RecomputePolicy::EveryJacobian);
    cache.recompute(&jacobian, Some(&conditions)).unwrap();
    let matrix = cache.matrix().unwrap();
    assert_eq!(matrix[(0, 0)], 1.0);
    for j in 1..4 {
        assert_eq!(matrix[(0, j)], 0.0);
        assert_eq!(matrix[(j, 0)], 0.0);
    }
}

#[test]
fn failed_recompute_is_reported() {
    let mut coo = nalgebra_sparse::CooMatrix::new(2, 2);
    coo.push(0, 1, 1.0);
    coo.push(1, 0, 1.0);
    let jacobian = nalgebra_sparse::CsrMatrix::from(&coo);

    let mode = PreconditionerMode::Algebraic(PreconditionerType::Jacobi);
    let mut cache = PreconditionerCache::<f64>::new(mode, RecomputePolicy::StepStart);
    assert!(cache.recompute(&jacobian, None).is_err());
    assert_eq!(cache.recomputations(), 0);
    assert!(cache.is_dirty());
}
