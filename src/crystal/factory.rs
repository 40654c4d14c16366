//! Selection of the integrator from the configured scheme and residual type.
use crate::crystal::integrator::{Integrator, IntegratorContext, IntegratorKind};
use crate::crystal::ConfigError;
use cpmor_traits::Real;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IntegrationScheme {
    #[default]
    Explicit,
    Implicit,
}

impl IntegrationScheme {
    pub const ALL: [IntegrationScheme; 2] = [IntegrationScheme::Explicit, IntegrationScheme::Implicit];

    pub fn name(&self) -> &'static str {
        match self {
            IntegrationScheme::Explicit => "Explicit",
            IntegrationScheme::Implicit => "Implicit",
        }
    }
}

/// Unknowns of the local residual solved by the implicit scheme.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResidualType {
    #[default]
    #[serde(rename = "Slip")]
    Slip,
    #[serde(rename = "Slip Hardness")]
    SlipHardness,
    #[serde(rename = "Constrained Slip Hardness")]
    ConstrainedSlipHardness,
}

impl ResidualType {
    pub const ALL: [ResidualType; 3] = [
        ResidualType::Slip,
        ResidualType::SlipHardness,
        ResidualType::ConstrainedSlipHardness,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResidualType::Slip => "Slip",
            ResidualType::SlipHardness => "Slip Hardness",
            ResidualType::ConstrainedSlipHardness => "Constrained Slip Hardness",
        }
    }
}

macro_rules! impl_named_option {
    ($type:ty, $option:expr) => {
        impl Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl FromStr for $type {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$type>::ALL
                    .iter()
                    .copied()
                    .find(|value| value.name() == s)
                    .ok_or_else(|| ConfigError::UnknownOption {
                        option: $option,
                        value: s.to_string(),
                    })
            }
        }
    };
}

impl_named_option!(IntegrationScheme, "integration scheme");
impl_named_option!(ResidualType, "residual type");

/// The integrator variant for a scheme and residual type. The residual type is irrelevant to
/// the explicit scheme.
pub fn integrator_kind(scheme: IntegrationScheme, residual_type: ResidualType) -> IntegratorKind {
    match (scheme, residual_type) {
        (IntegrationScheme::Explicit, _) => IntegratorKind::Explicit,
        (IntegrationScheme::Implicit, ResidualType::Slip) => IntegratorKind::ImplicitSlip,
        (IntegrationScheme::Implicit, ResidualType::SlipHardness) => IntegratorKind::ImplicitSlipHardness,
        (IntegrationScheme::Implicit, ResidualType::ConstrainedSlipHardness) => {
            IntegratorKind::ImplicitConstrainedSlipHardness
        }
    }
}

/// Creates integrators of a fixed kind for the points of a pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IntegratorFactory {
    kind: IntegratorKind,
}

impl IntegratorFactory {
    pub fn new(scheme: IntegrationScheme, residual_type: ResidualType) -> Self {
        Self {
            kind: integrator_kind(scheme, residual_type),
        }
    }

    /// Parses scheme and residual type from their configuration names.
    pub fn from_names(scheme: &str, residual_type: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(scheme.parse()?, residual_type.parse()?))
    }

    pub fn kind(&self) -> IntegratorKind {
        self.kind
    }

    pub fn create<'a, T: Real>(&self, context: &'a IntegratorContext<'a, T>) -> Integrator<'a, T> {
        Integrator::new(self.kind, context)
    }
}
