//! Preconditioning of the full-order operators before projection.
use crate::rom::dirichlet::DirichletConditions;
use crate::rom::RomError;
use cpmor_sparse::csr::inverse_absolute_row_sums;
use cpmor_sparse::operator::{apply_in_place, apply_to_columns_in_place, materialize};
use cpmor_sparse::precond::{build_preconditioner, DirectSolver};
use cpmor_sparse::{LinearOperator, PreconditionerType};
use cpmor_traits::Real;
use eyre::eyre;
use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PreconditionerMode {
    #[default]
    None,
    Identity,
    /// Row scaling by the inverse absolute row sums of the Jacobian.
    DiagonalScaling,
    /// The dense inverse of the Jacobian.
    InverseJacobian,
    /// Newton-like projection $f \leftarrow J^{-1} f$, with the identity as reduced Jacobian.
    ProjectedSolution,
    /// An algebraic preconditioner built from the sparse Jacobian.
    Algebraic(PreconditionerType),
}

impl PreconditionerMode {
    pub const ALL: [PreconditionerMode; 15] = [
        PreconditionerMode::None,
        PreconditionerMode::Identity,
        PreconditionerMode::DiagonalScaling,
        PreconditionerMode::InverseJacobian,
        PreconditionerMode::ProjectedSolution,
        PreconditionerMode::Algebraic(PreconditionerType::Jacobi),
        PreconditionerMode::Algebraic(PreconditionerType::GaussSeidel),
        PreconditionerMode::Algebraic(PreconditionerType::SymmetricGaussSeidel),
        PreconditionerMode::Algebraic(PreconditionerType::Ilu(0)),
        PreconditionerMode::Algebraic(PreconditionerType::Ilu(1)),
        PreconditionerMode::Algebraic(PreconditionerType::Ilu(2)),
        PreconditionerMode::Algebraic(PreconditionerType::Ic(0)),
        PreconditionerMode::Algebraic(PreconditionerType::Ic(1)),
        PreconditionerMode::Algebraic(PreconditionerType::Ic(2)),
        PreconditionerMode::Algebraic(PreconditionerType::Direct),
    ];

    pub fn name(&self) -> String {
        match self {
            PreconditionerMode::None => "None".to_string(),
            PreconditionerMode::Identity => "Identity".to_string(),
            PreconditionerMode::DiagonalScaling => "DiagonalScaling".to_string(),
            PreconditionerMode::InverseJacobian => "InverseJacobian".to_string(),
            PreconditionerMode::ProjectedSolution => "ProjectedSolution".to_string(),
            PreconditionerMode::Algebraic(kind) => match kind {
                PreconditionerType::Jacobi => "Ifpack_Jacobi".to_string(),
                PreconditionerType::GaussSeidel => "Ifpack_GaussSeidel".to_string(),
                PreconditionerType::SymmetricGaussSeidel => "Ifpack_SymmetricGaussSeidel".to_string(),
                PreconditionerType::Ilu(level) => format!("Ifpack_ILU{}", level),
                PreconditionerType::Ic(level) => format!("Ifpack_IC{}", level),
                PreconditionerType::Direct => "Ifpack_Amesos".to_string(),
            },
        }
    }

    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(Self::name).collect()
    }

    /// Whether the premultiplied and left bases are preconditioned.
    pub fn preconditions_bases(&self) -> bool {
        !matches!(self, PreconditionerMode::None | PreconditionerMode::ProjectedSolution)
    }
}

impl Display for PreconditionerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PreconditionerMode {
    type Err = RomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| RomError::UnknownPreconditioner { name: s.to_string() })
    }
}

impl TryFrom<String> for PreconditionerMode {
    type Error = RomError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PreconditionerMode> for String {
    fn from(mode: PreconditionerMode) -> Self {
        mode.name()
    }
}

/// When the preconditioner is rebuilt from the full Jacobian.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecomputePolicy {
    #[default]
    #[serde(rename = "Every Jacobian")]
    EveryJacobian,
    /// Rebuild only when marked stale, typically once per continuation step.
    #[serde(rename = "Step Start")]
    StepStart,
}

enum Stored<T: Real> {
    Empty,
    Matrix(DMatrix<T>),
    Scaling(DVector<T>),
    Operator(Box<dyn LinearOperator<T> + Send + Sync>),
    Solver(DirectSolver<T>),
}

/// The preconditioner of the current mode, rebuilt from the full Jacobian when stale.
pub struct PreconditionerCache<T: Real> {
    mode: PreconditionerMode,
    policy: RecomputePolicy,
    dirty: bool,
    recomputations: usize,
    stored: Stored<T>,
}

impl<T: Real> fmt::Debug for PreconditionerCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreconditionerCache")
            .field("mode", &self.mode)
            .field("policy", &self.policy)
            .field("dirty", &self.dirty)
            .field("recomputations", &self.recomputations)
            .finish()
    }
}

impl<T: Real> PreconditionerCache<T> {
    pub fn new(mode: PreconditionerMode, policy: RecomputePolicy) -> Self {
        Self {
            mode,
            policy,
            dirty: true,
            recomputations: 0,
            stored: Stored::Empty,
        }
    }

    pub fn mode(&self) -> PreconditionerMode {
        self.mode
    }

    pub fn policy(&self) -> RecomputePolicy {
        self.policy
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn recomputations(&self) -> usize {
        self.recomputations
    }

    /// Whether the next full Jacobian must be used to rebuild the preconditioner.
    pub fn needs_recompute(&self) -> bool {
        self.mode != PreconditionerMode::None && (self.dirty || self.policy == RecomputePolicy::EveryJacobian)
    }

    /// The explicit preconditioner matrix, for modes that form one.
    pub fn matrix(&self) -> Option<&DMatrix<T>> {
        match &self.stored {
            Stored::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn scaling(&self) -> Option<&DVector<T>> {
        match &self.stored {
            Stored::Scaling(s) => Some(s),
            _ => None,
        }
    }

    /// Rebuilds the preconditioner from `jacobian`.
    ///
    /// With `explicit_dirichlet`, the preconditioner is formed as a dense matrix and the given
    /// Dirichlet conditions are applied to it.
    pub fn recompute(
        &mut self,
        jacobian: &CsrMatrix<T>,
        explicit_dirichlet: Option<&DirichletConditions<T>>,
    ) -> eyre::Result<()> {
        let n = jacobian.nrows();
        let mut stored = match self.mode {
            PreconditionerMode::None => Stored::Empty,
            PreconditionerMode::Identity => Stored::Matrix(DMatrix::identity(n, n)),
            PreconditionerMode::DiagonalScaling => Stored::Scaling(inverse_absolute_row_sums(jacobian)),
            PreconditionerMode::InverseJacobian => Stored::Matrix(DirectSolver::new(jacobian)?.inverse()?),
            PreconditionerMode::ProjectedSolution => Stored::Solver(DirectSolver::new(jacobian)?),
            PreconditionerMode::Algebraic(kind) => {
                let operator = build_preconditioner(kind, jacobian)?;
                if explicit_dirichlet.is_some() {
                    Stored::Matrix(
                        materialize(operator.as_ref(), n).map_err(|err| eyre!("failed to form {} preconditioner: {}", kind, err))?,
                    )
                } else {
                    Stored::Operator(operator)
                }
            }
        };

        if let (Some(conditions), Stored::Matrix(m)) = (explicit_dirichlet, &mut stored) {
            conditions.apply_to_dense(m);
        }

        self.stored = stored;
        self.recomputations += 1;
        if self.policy == RecomputePolicy::StepStart {
            self.dirty = false;
        }
        debug!("Recomputed {} preconditioner (recomputation {})", self.mode, self.recomputations);
        Ok(())
    }

    /// Overwrites every column of `m` with the preconditioned column.
    pub fn apply_to_columns(&self, m: &mut DMatrix<T>) -> eyre::Result<()> {
        match &self.stored {
            Stored::Empty => {}
            Stored::Matrix(p) => *m = p * &*m,
            Stored::Scaling(s) => {
                for mut column in m.column_iter_mut() {
                    column.component_mul_assign(s);
                }
            }
            Stored::Operator(op) => apply_to_columns_in_place(op.as_ref(), m)
                .map_err(|err| eyre!("failed to apply {} preconditioner: {}", self.mode, err))?,
            Stored::Solver(solver) => {
                for mut column in m.column_iter_mut() {
                    let mut x = column.clone_owned();
                    solver.solve_in_place(&mut x)?;
                    column.copy_from(&x);
                }
            }
        }
        Ok(())
    }

    /// Overwrites `v` with the preconditioned vector.
    pub fn apply(&self, v: &mut DVector<T>) -> eyre::Result<()> {
        match &self.stored {
            Stored::Empty => {}
            Stored::Matrix(p) => *v = p * &*v,
            Stored::Scaling(s) => v.component_mul_assign(s),
            Stored::Operator(op) => apply_in_place(op.as_ref(), v)
                .map_err(|err| eyre!("failed to apply {} preconditioner: {}", self.mode, err))?,
            Stored::Solver(solver) => solver.solve_in_place(v)?,
        }
        Ok(())
    }
}
