//! Projection-based reduced-order model evaluation.
//!
//! A [`ReducedOrderModelEvaluator`] wraps an opaque full-order [`ModelEvaluator`] and exposes it
//! in reduced coordinates $x = \Phi x_r + x_0$. Residuals and Jacobians of the full-order model
//! are projected onto a left basis $L$ chosen by the [`ReducedOperatorFactory`], optionally after
//! preconditioning and enforcement of Dirichlet conditions.
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::path::PathBuf;

pub mod args;
pub mod checks;
pub mod config;
pub mod dirichlet;
pub mod evaluator;
pub mod operator_factory;
pub mod preconditioner;
pub mod space;

pub use args::{InArgs, ModelEvaluator, ModelSupport, OutArgs};
pub use config::{OutputFlags, RomParameters};
pub use dirichlet::{DirichletConditions, NodeSets};
pub use evaluator::ReducedOrderModelEvaluator;
pub use operator_factory::{Projection, ReducedOperatorFactory};
pub use preconditioner::{PreconditionerCache, PreconditionerMode, RecomputePolicy};
pub use space::ReducedSpace;

#[derive(Debug, Clone, PartialEq)]
pub enum RomError {
    /// The full residual contains NaN or infinite entries.
    NonFiniteResidual {
        count: usize,
        rows: Vec<usize>,
        dump: PathBuf,
    },
    /// The full Jacobian has zero diagonal entries.
    SingularJacobian {
        count: usize,
        rows: Vec<usize>,
        dump: PathBuf,
    },
    UnknownPreconditioner {
        name: String,
    },
    InvalidDirichletName {
        name: String,
    },
    InvalidDirichletValues {
        name: String,
        reason: String,
    },
    UnknownNodeSet {
        name: String,
    },
    /// A non-soft Dirichlet row of a CSR matrix has no stored diagonal entry.
    MissingDiagonal {
        row: usize,
    },
    RankDeficientBasis,
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
}

impl Display for RomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFiniteResidual { count, rows, dump } => write!(
                f,
                "The residual has {} non-finite entries (rows {:?}). The residual was written to {}",
                count,
                rows,
                dump.display()
            ),
            Self::SingularJacobian { count, rows, dump } => write!(
                f,
                "The Jacobian has {} zero diagonal entries (rows {:?}) and is probably singular. \
                 The Jacobian was written to {}",
                count,
                rows,
                dump.display()
            ),
            Self::UnknownPreconditioner { name } => write!(
                f,
                "\"{}\" is not a valid preconditioner type. Valid types are: {}",
                name,
                PreconditionerMode::names().join(", ")
            ),
            Self::InvalidDirichletName { name } => {
                write!(f, "cannot interpret \"{}\" as a Dirichlet condition", name)
            }
            Self::InvalidDirichletValues { name, reason } => {
                write!(f, "invalid values for Dirichlet condition \"{}\": {}", name, reason)
            }
            Self::UnknownNodeSet { name } => write!(f, "unknown node set \"{}\"", name),
            Self::MissingDiagonal { row } => write!(
                f,
                "Dirichlet row {} has no diagonal entry in the sparsity pattern",
                row
            ),
            Self::RankDeficientBasis => write!(f, "reduced basis is rank deficient"),
            Self::DimensionMismatch {
                context,
                expected,
                actual,
            } => write!(f, "{}: expected dimension {}, got {}", context, expected, actual),
        }
    }
}

impl Error for RomError {}
