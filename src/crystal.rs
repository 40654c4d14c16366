//! Crystal-plasticity constitutive integration at material points.
//!
//! The plastic deformation gradient $F^p$ evolves through slip on a catalog of slip systems,
//! and the stress follows from the elastic part $F^e = F (F^p)^{-1}$ of the multiplicative
//! decomposition. Each material point is advanced in time by an [`integrator::Integrator`],
//! selected by the [`factory`] from the configured scheme and residual type.
use std::error::Error;
use std::fmt;
use std::fmt::Display;

pub mod elasticity;
pub mod factory;
pub mod integrator;
pub mod kernels;
pub mod model;
pub mod parameters;
pub mod residual;
pub mod slip;
pub mod state;
pub mod trajectory;

/// A numerical failure in one of the constitutive kernels.
///
/// Kernel failures are local to a material point. They are never retried locally; instead the
/// integrator requests a reduction of the global load step.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstitutiveFailure {
    SingularPlasticDeformation,
    NonFiniteStress,
    NonFiniteHardness { slip_system: usize },
    NonPositiveResistance { slip_system: usize },
    NonFiniteSlip { slip_system: usize },
}

impl Display for ConstitutiveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingularPlasticDeformation => write!(f, "plastic deformation gradient is singular"),
            Self::NonFiniteStress => write!(f, "non-finite stress"),
            Self::NonFiniteHardness { slip_system } => {
                write!(f, "non-finite hardness on slip system {}", slip_system)
            }
            Self::NonPositiveResistance { slip_system } => {
                write!(f, "non-positive resistance on slip system {}", slip_system)
            }
            Self::NonFiniteSlip { slip_system } => write!(f, "non-finite slip on slip system {}", slip_system),
        }
    }
}

impl Error for ConstitutiveFailure {}

/// An invalid or incomplete crystal-plasticity configuration, detected at setup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    MissingParameter { context: String, name: String },
    InvalidParameter { context: String, name: String, reason: String },
    NonOrthogonalSlipSystem { index: usize },
    UnknownSlipFamily { slip_system: usize, family: usize },
    UnknownOption { option: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParameter { context, name } => write!(f, "{}: missing parameter \"{}\"", context, name),
            Self::InvalidParameter { context, name, reason } => {
                write!(f, "{}: invalid parameter \"{}\": {}", context, name, reason)
            }
            Self::NonOrthogonalSlipSystem { index } => write!(
                f,
                "slip direction and slip normal of slip system {} are not orthogonal",
                index
            ),
            Self::UnknownSlipFamily { slip_system, family } => write!(
                f,
                "slip system {} refers to slip family {}, which does not exist",
                slip_system, family
            ),
            Self::UnknownOption { option, value } => write!(f, "unrecognized {}: \"{}\"", option, value),
        }
    }
}

impl Error for ConfigError {}
