//! Enforcement of Dirichlet conditions on full-order and reduced operators.
//!
//! Conditions are named after the node set and degree of freedom they constrain, as in
//! `"DBC on NS left for DOF X"` or `"Time Dependent SDBC on NS top for DOF Z"`. The `SDBC`
//! variant denotes a soft condition, which only decouples the constrained rows and leaves
//! their diagonal to the full-order model.
//!
//! For every constrained row $i$ and column $j$, the entries of a matrix are treated as follows:
//!
//! | Entry | Non-soft | Soft |
//! | --- | --- | --- |
//! | diagonal of a constrained row | set to one | kept |
//! | off-diagonal of a constrained row | zeroed | zeroed |
//! | off-diagonal of a constrained column | zeroed | kept |
//!
//! Vectors have their constrained rows zeroed.
use crate::rom::RomError;
use cpmor_sparse::csr::diagonal_entry;
use cpmor_traits::Real;
use nalgebra::{convert, DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lookup of node sets by name. Each node lists the global row index of each of its degrees of
/// freedom.
pub trait NodeSets {
    fn node_set(&self, name: &str) -> Option<&[Vec<usize>]>;
}

impl NodeSets for FxHashMap<String, Vec<Vec<usize>>> {
    fn node_set(&self, name: &str) -> Option<&[Vec<usize>]> {
        self.get(name).map(Vec::as_slice)
    }
}

impl NodeSets for BTreeMap<String, Vec<Vec<usize>>> {
    fn node_set(&self, name: &str) -> Option<&[Vec<usize>]> {
        self.get(name).map(Vec::as_slice)
    }
}

/// The structured content of a condition name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionName {
    pub time_dependent: bool,
    pub soft: bool,
    pub node_set: String,
    pub dof: usize,
}

impl ConditionName {
    pub fn parse(name: &str) -> Result<Self, RomError> {
        let invalid = || RomError::InvalidDirichletName { name: name.to_string() };
        let tokens: Vec<&str> = name.split_whitespace().collect();

        let (time_dependent, rest) = match tokens.as_slice() {
            ["Time", "Dependent", rest @ ..] => (true, rest),
            rest => (false, rest),
        };

        match rest {
            [kind, "on", "NS", node_set, "for", "DOF", dof] => {
                let soft = match *kind {
                    "DBC" => false,
                    "SDBC" => true,
                    _ => return Err(invalid()),
                };
                let dof = match *dof {
                    "X" => 0,
                    "Y" => 1,
                    "Z" => 2,
                    _ => return Err(invalid()),
                };
                Ok(Self {
                    time_dependent,
                    soft,
                    node_set: node_set.to_string(),
                    dof,
                })
            }
            _ => Err(invalid()),
        }
    }
}

/// Values of a condition as given in the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirichletValueParameters {
    Constant(f64),
    TimeDependent {
        #[serde(rename = "Time Values")]
        time_values: Vec<f64>,
        #[serde(rename = "BC Values")]
        bc_values: Vec<f64>,
    },
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DirichletValue<T> {
    Constant(T),
    /// $y_1 + (t - t_1) s$.
    Linear { t1: T, y1: T, slope: T },
}

impl<T: Real> DirichletValue<T> {
    pub fn value_at(&self, t: T) -> T {
        match *self {
            DirichletValue::Constant(value) => value,
            DirichletValue::Linear { t1, y1, slope } => y1 + (t - t1) * slope,
        }
    }

    fn from_parameters(name: &str, time_dependent: bool, parameters: &DirichletValueParameters) -> Result<Self, RomError> {
        let invalid = |reason: &str| RomError::InvalidDirichletValues {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        match (time_dependent, parameters) {
            (false, DirichletValueParameters::Constant(value)) => Ok(DirichletValue::Constant(convert(*value))),
            (true, DirichletValueParameters::TimeDependent { time_values, bc_values }) => {
                if time_values.len() < 2 || bc_values.len() < 2 {
                    return Err(invalid("\"Time Values\" and \"BC Values\" need at least two entries"));
                }
                let (t1, t2) = (time_values[0], time_values[1]);
                let (y1, y2) = (bc_values[0], bc_values[1]);
                if t2 == t1 {
                    return Err(invalid("the first two time values coincide"));
                }
                Ok(DirichletValue::Linear {
                    t1: convert(t1),
                    y1: convert(y1),
                    slope: convert((y2 - y1) / (t2 - t1)),
                })
            }
            (true, _) => Err(invalid("time dependent conditions need \"Time Values\" and \"BC Values\"")),
            (false, _) => Err(invalid("expected a single constant value")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirichletCondition<T> {
    pub name: String,
    pub node_set: String,
    pub dof: usize,
    pub soft: bool,
    pub value: DirichletValue<T>,
    /// Sorted global rows constrained by the condition.
    rows: Vec<usize>,
}

impl<T: Real> DirichletCondition<T> {
    pub fn new(
        name: &str,
        parameters: &DirichletValueParameters,
        node_sets: &(impl ?Sized + NodeSets),
    ) -> Result<Self, RomError> {
        let parsed = ConditionName::parse(name)?;
        let value = DirichletValue::from_parameters(name, parsed.time_dependent, parameters)?;
        let nodes = node_sets
            .node_set(&parsed.node_set)
            .ok_or_else(|| RomError::UnknownNodeSet {
                name: parsed.node_set.clone(),
            })?;

        let mut rows = Vec::with_capacity(nodes.len());
        for node in nodes {
            let row = node
                .get(parsed.dof)
                .copied()
                .ok_or(RomError::DimensionMismatch {
                    context: "degrees of freedom per node",
                    expected: parsed.dof + 1,
                    actual: node.len(),
                })?;
            rows.push(row);
        }
        rows.sort_unstable();
        rows.dedup();

        Ok(Self {
            name: name.to_string(),
            node_set: parsed.node_set,
            dof: parsed.dof,
            soft: parsed.soft,
            value,
            rows,
        })
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn constrains(&self, row: usize) -> bool {
        self.rows.binary_search(&row).is_ok()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum EntryAction {
    Keep,
    Zero,
    One,
}

fn entry_action(row_constrained: bool, col_constrained: bool, diagonal: bool, soft: bool) -> EntryAction {
    if diagonal {
        if row_constrained && !soft {
            EntryAction::One
        } else {
            EntryAction::Keep
        }
    } else if row_constrained || (col_constrained && !soft) {
        EntryAction::Zero
    } else {
        EntryAction::Keep
    }
}

fn apply_action<T: Real>(action: EntryAction, value: &mut T) {
    match action {
        EntryAction::Keep => {}
        EntryAction::Zero => *value = T::zero(),
        EntryAction::One => *value = T::one(),
    }
}

/// The ordered collection of configured Dirichlet conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletConditions<T> {
    conditions: Vec<DirichletCondition<T>>,
}

impl<T> Default for DirichletConditions<T> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }
}

impl<T: Real> DirichletConditions<T> {
    pub fn new(conditions: Vec<DirichletCondition<T>>) -> Self {
        Self { conditions }
    }

    /// Builds the conditions from the named entries of a Dirichlet parameter list.
    pub fn from_parameters(
        parameters: &BTreeMap<String, DirichletValueParameters>,
        node_sets: &(impl ?Sized + NodeSets),
    ) -> Result<Self, RomError> {
        parameters
            .iter()
            .map(|(name, values)| DirichletCondition::new(name, values, node_sets))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn conditions(&self) -> &[DirichletCondition<T>] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn has_soft(&self) -> bool {
        self.conditions.iter().any(|c| c.soft)
    }

    /// The largest constrained row, if any.
    pub fn max_row(&self) -> Option<usize> {
        self.conditions
            .iter()
            .filter_map(|c| c.rows.last().copied())
            .max()
    }

    /// The prescribed value of each constrained row at time `t`. Later conditions take
    /// precedence over earlier ones on shared rows.
    pub fn prescribed_values(&self, t: T) -> BTreeMap<usize, T> {
        let mut values = BTreeMap::new();
        for condition in &self.conditions {
            let value = condition.value.value_at(t);
            for &row in &condition.rows {
                values.insert(row, value);
            }
        }
        values
    }

    /// Zeroes the constrained rows of a vector.
    pub fn apply_to_vector(&self, v: &mut DVector<T>) {
        for condition in &self.conditions {
            for &row in &condition.rows {
                if row < v.len() {
                    v[row] = T::zero();
                }
            }
        }
    }

    /// Applies the conditions to a dense matrix. Matrices with a single column are treated as
    /// vectors.
    pub fn apply_to_dense(&self, m: &mut DMatrix<T>) {
        if m.ncols() == 1 {
            for condition in &self.conditions {
                for &row in &condition.rows {
                    if row < m.nrows() {
                        m[(row, 0)] = T::zero();
                    }
                }
            }
            return;
        }

        for condition in &self.conditions {
            for j in 0..m.ncols() {
                let col_constrained = condition.constrains(j);
                for i in 0..m.nrows() {
                    let action = entry_action(condition.constrains(i), col_constrained, i == j, condition.soft);
                    apply_action(action, &mut m[(i, j)]);
                }
            }
        }
    }

    /// Applies the conditions to the stored entries of a square CSR matrix.
    ///
    /// Fails if a non-soft constrained row does not store its diagonal, in which case the
    /// matrix is left unchanged.
    pub fn apply_to_csr(&self, matrix: &mut CsrMatrix<T>) -> Result<(), RomError> {
        for condition in self.conditions.iter().filter(|c| !c.soft) {
            for &row in condition.rows.iter().filter(|&&row| row < matrix.nrows()) {
                if diagonal_entry(matrix, row).is_none() {
                    return Err(RomError::MissingDiagonal { row });
                }
            }
        }

        for condition in &self.conditions {
            for (i, mut row) in matrix.row_iter_mut().enumerate() {
                let row_constrained = condition.constrains(i);
                let (cols, values) = row.cols_and_values_mut();
                for (&j, value) in cols.iter().zip(values.iter_mut()) {
                    let action = entry_action(row_constrained, condition.constrains(j), i == j, condition.soft);
                    apply_action(action, value);
                }
            }
        }
        Ok(())
    }
}

/// Applies the Dirichlet truth table to the leading `num_modes` rows and columns of a reduced
/// Jacobian, whose leading modes carry the boundary data.
pub fn apply_to_reduced_jacobian<T: Real>(jacobian: &mut DMatrix<T>, num_modes: usize, soft: bool) {
    if num_modes == 0 {
        return;
    }
    for j in 0..jacobian.ncols() {
        for i in 0..jacobian.nrows() {
            let action = entry_action(i < num_modes, j < num_modes, i == j, soft);
            apply_action(action, &mut jacobian[(i, j)]);
        }
    }
}
