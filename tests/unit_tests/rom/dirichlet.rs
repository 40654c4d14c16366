use super::node_sets;
use cpmor::rom::dirichlet::{
    apply_to_reduced_jacobian, ConditionName, DirichletCondition, DirichletConditions, DirichletValue,
    DirichletValueParameters,
};
use cpmor::rom::RomError;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde_json::json;
use std::collections::BTreeMap;
use util::laplacian_1d;

fn parameters(value: serde_json::Value) -> BTreeMap<String, DirichletValueParameters> {
    serde_json::from_value(value).expect("Dirichlet parameters must deserialize")
}

/// A non-soft condition on the first and a soft condition on the last of five rows.
fn mixed_conditions() -> DirichletConditions<f64> {
    let params = parameters(json!({
        "DBC on NS left for DOF X": 0.0,
        "SDBC on NS right for DOF X": 0.5
    }));
    DirichletConditions::from_parameters(&params, &node_sets(&[("left", &[0]), ("right", &[4])])).unwrap()
}

fn expected_constrained_laplacian() -> DMatrix<f64> {
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(5, 5, &[
        1.0,  0.0,  0.0,  0.0,  0.0,
        0.0,  2.0, -1.0,  0.0,  0.0,
        0.0, -1.0,  2.0, -1.0,  0.0,
        0.0,  0.0, -1.0,  2.0, -1.0,
        0.0,  0.0,  0.0,  0.0,  2.0,
    ]);
    expected
}

#[test]
fn condition_names_are_parsed() {
    assert_eq!(
        ConditionName::parse("DBC on NS left for DOF X").unwrap(),
        ConditionName {
            time_dependent: false,
            soft: false,
            node_set: "left".to_string(),
            dof: 0
        }
    );
    assert_eq!(
        ConditionName::parse("Time Dependent SDBC on NS top_face for DOF Z").unwrap(),
        ConditionName {
            time_dependent: true,
            soft: true,
            node_set: "top_face".to_string(),
            dof: 2
        }
    );

    for name in [
        "DBC on NS left for DOF W",
        "NBC on NS left for DOF X",
        "DBC on left for DOF X",
        "Time DBC on NS left for DOF Y",
        "DBC on NS left for DOF X extra",
        "",
    ] {
        assert_eq!(
            ConditionName::parse(name).unwrap_err(),
            RomError::InvalidDirichletName { name: name.to_string() }
        );
    }
}

#[test]
fn time_dependent_values_are_linear_in_time() {
    let params = parameters(json!({
        "Time Dependent DBC on NS left for DOF Y": { "Time Values": [1.0, 3.0, 4.0], "BC Values": [0.5, 1.5, 0.0] }
    }));
    let sets: BTreeMap<String, Vec<Vec<usize>>> = [("left".to_string(), vec![vec![0, 1, 2], vec![3, 4, 5]])].into();
    let conditions = DirichletConditions::<f64>::from_parameters(&params, &sets).unwrap();
    let condition = &conditions.conditions()[0];
    assert_eq!(condition.dof, 1);
    assert_eq!(condition.rows(), &[1, 4]);
    // Only the first two points define the line
    assert_eq!(
        condition.value,
        DirichletValue::Linear {
            t1: 1.0,
            y1: 0.5,
            slope: 0.5
        }
    );
    assert_eq!(condition.value.value_at(1.0), 0.5);
    assert_eq!(condition.value.value_at(5.0), 2.5);
    assert_eq!(DirichletValue::Constant(3.0).value_at(100.0), 3.0);
}

#[test]
fn invalid_values_are_rejected() {
    let sets = node_sets(&[("left", &[0])]);
    let cases = [
        ("Time Dependent DBC on NS left for DOF X", json!(1.0)),
        ("DBC on NS left for DOF X", json!({ "Time Values": [0.0, 1.0], "BC Values": [0.0, 1.0] })),
        (
            "Time Dependent DBC on NS left for DOF X",
            json!({ "Time Values": [1.0, 1.0], "BC Values": [0.0, 1.0] }),
        ),
        (
            "Time Dependent DBC on NS left for DOF X",
            json!({ "Time Values": [0.0], "BC Values": [0.0] }),
        ),
    ];
    for (name, value) in cases {
        let params: DirichletValueParameters = serde_json::from_value(value).unwrap();
        let error = DirichletCondition::<f64>::new(name, &params, &sets).unwrap_err();
        assert!(
            matches!(error, RomError::InvalidDirichletValues { name: ref n, .. } if n == name),
            "{}",
            error
        );
    }
}

#[test]
fn node_sets_must_provide_constrained_dofs() {
    let sets = node_sets(&[("left", &[0])]);
    let value = DirichletValueParameters::Constant(0.0);
    assert_eq!(
        DirichletCondition::<f64>::new("DBC on NS right for DOF X", &value, &sets).unwrap_err(),
        RomError::UnknownNodeSet {
            name: "right".to_string()
        }
    );
    assert_eq!(
        DirichletCondition::<f64>::new("DBC on NS left for DOF Y", &value, &sets).unwrap_err(),
        RomError::DimensionMismatch {
            context: "degrees of freedom per node",
            expected: 2,
            actual: 1
        }
    );
}

#[test]
fn constrained_rows_are_sorted_and_unique() {
    let sets = node_sets(&[("mixed", &[7, 2, 7, 5])]);
    let condition =
        DirichletCondition::<f64>::new("SDBC on NS mixed for DOF X", &DirichletValueParameters::Constant(1.0), &sets)
            .unwrap();
    assert!(condition.soft);
    assert_eq!(condition.rows(), &[2, 5, 7]);
    assert!(condition.constrains(5));
    assert!(!condition.constrains(6));

    let conditions = DirichletConditions::new(vec![condition]);
    assert!(conditions.has_soft());
    assert!(!conditions.is_empty());
    assert_eq!(conditions.max_row(), Some(7));
    assert_eq!(DirichletConditions::<f64>::default().max_row(), None);
}

#[test]
fn later_conditions_take_precedence_on_shared_rows() {
    let params = parameters(json!({
        "DBC on NS a for DOF X": 1.0,
        "Time Dependent DBC on NS b for DOF X": { "Time Values": [0.0, 1.0], "BC Values": [0.0, 4.0] }
    }));
    let sets = node_sets(&[("a", &[1, 3]), ("b", &[3])]);
    let conditions = DirichletConditions::<f64>::from_parameters(&params, &sets).unwrap();
    let values = conditions.prescribed_values(0.5);
    assert_eq!(values.len(), 2);
    assert_eq!(values[&1], 1.0);
    assert_eq!(values[&3], 2.0);
}

#[test]
fn csr_matrix_follows_truth_table() {
    let mut matrix = laplacian_1d(5);
    mixed_conditions().apply_to_csr(&mut matrix).unwrap();
    assert_matrix_eq!(DMatrix::from(&matrix), expected_constrained_laplacian(), comp = abs, tol = 0.0);
    // The sparsity pattern is preserved
    assert_eq!(matrix.nnz(), 13);
}

#[test]
fn dense_matrix_follows_truth_table() {
    let mut matrix = DMatrix::from(&laplacian_1d(5));
    mixed_conditions().apply_to_dense(&mut matrix);
    assert_matrix_eq!(matrix, expected_constrained_laplacian(), comp = abs, tol = 0.0);
}

#[test]
fn vectors_have_constrained_rows_zeroed() {
    let conditions = mixed_conditions();
    let mut v = DVector::from_element(5, 3.0);
    conditions.apply_to_vector(&mut v);
    assert_eq!(v, DVector::from_column_slice(&[0.0, 3.0, 3.0, 3.0, 0.0]));

    // Single columns are treated as vectors, including the soft rows
    let mut column = DMatrix::from_element(5, 1, 3.0);
    conditions.apply_to_dense(&mut column);
    assert_eq!(column, DMatrix::from_column_slice(5, 1, &[0.0, 3.0, 3.0, 3.0, 0.0]));
}

#[test]
fn missing_diagonal_leaves_matrix_untouched() {
    let mut coo = CooMatrix::new(3, 3);
    coo.push(0, 1, 1.0);
    coo.push(1, 0, 1.0);
    coo.push(1, 1, 1.0);
    coo.push(2, 2, 1.0);
    let original = CsrMatrix::from(&coo);

    let sets = node_sets(&[("left", &[0]), ("last", &[2])]);
    let params = parameters(json!({ "DBC on NS last for DOF X": 0.0, "DBC on NS left for DOF X": 0.0 }));
    let conditions = DirichletConditions::<f64>::from_parameters(&params, &sets).unwrap();
    let mut matrix = original.clone();
    assert_eq!(
        conditions.apply_to_csr(&mut matrix).unwrap_err(),
        RomError::MissingDiagonal { row: 0 }
    );
    assert_eq!(matrix, original);

    // Soft conditions keep the diagonal, so they do not need one
    let params = parameters(json!({ "SDBC on NS left for DOF X": 0.0 }));
    let conditions = DirichletConditions::<f64>::from_parameters(&params, &sets).unwrap();
    conditions.apply_to_csr(&mut matrix).unwrap();
    assert_eq!(matrix.get_entry(0, 1).unwrap().into_value(), 0.0);
    assert_eq!(matrix.get_entry(1, 0).unwrap().into_value(), 1.0);
}

#[test]
fn reduced_jacobian_constrains_leading_modes() {
    let original = DMatrix::from_fn(3, 3, |i, j| (1 + i + 3 * j) as f64);

    let mut jacobian = original.clone();
    apply_to_reduced_jacobian(&mut jacobian, 0, false);
    assert_eq!(jacobian, original);

    let mut jacobian = original.clone();
    apply_to_reduced_jacobian(&mut jacobian, 1, false);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        1.0, 0.0, 0.0,
        0.0, 5.0, 8.0,
        0.0, 6.0, 9.0,
    ]);
    assert_eq!(jacobian, expected);

    let mut jacobian = original.clone();
    apply_to_reduced_jacobian(&mut jacobian, 1, true);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
        1.0, 0.0, 0.0,
        2.0, 5.0, 8.0,
        3.0, 6.0, 9.0,
    ]);
    assert_eq!(jacobian, expected);
}
