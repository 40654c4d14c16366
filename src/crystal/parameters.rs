//! Configuration of the crystal-plasticity model.
//!
//! The parameter names follow the conventions of the input decks the model is driven from,
//! for example `"Integration Scheme"` or `"Slip System Families"`.
use crate::crystal::elasticity::{ElasticityTensor, LameParameters, YoungPoisson};
use crate::crystal::factory::{IntegrationScheme, ResidualType};
use crate::crystal::slip::{FlowRule, HardeningLaw, SlipFamily, SlipSystem};
use crate::crystal::ConfigError;
use cpmor_optimize::minimizer::{Minimizer, MinimizerSettings};
use cpmor_optimize::steps::StepType;
use cpmor_traits::Real;
use log::warn;
use nalgebra::{convert, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowRuleType {
    #[serde(rename = "Power Law")]
    PowerLaw,
    #[serde(rename = "Thermal Activation")]
    ThermalActivation,
    #[serde(rename = "Power Law with Drag")]
    PowerLawDrag,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardeningLawType {
    #[serde(rename = "Linear Minus Recovery")]
    LinearMinusRecovery,
    #[serde(rename = "Saturation")]
    Saturation,
    #[serde(rename = "Dislocation Density")]
    DislocationDensity,
}

/// A law selected by `"Type"`, together with its named numeric parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedParameters<Type> {
    #[serde(rename = "Type")]
    pub law: Type,
    #[serde(flatten)]
    pub parameters: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipFamilyParameters {
    #[serde(rename = "Flow Rule")]
    pub flow_rule: NamedParameters<FlowRuleType>,
    #[serde(rename = "Hardening Law")]
    pub hardening_law: NamedParameters<HardeningLawType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipSystemParameters {
    #[serde(rename = "Slip Direction")]
    pub direction: [f64; 3],
    #[serde(rename = "Slip Normal")]
    pub normal: [f64; 3],
    #[serde(rename = "Family", default)]
    pub family: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum ElasticityParameters {
    #[serde(rename = "Cubic")]
    Cubic {
        #[serde(rename = "C11")]
        c11: f64,
        #[serde(rename = "C12")]
        c12: f64,
        #[serde(rename = "C44")]
        c44: f64,
    },
    #[serde(rename = "Isotropic")]
    Isotropic {
        #[serde(rename = "Young's Modulus")]
        young: f64,
        #[serde(rename = "Poisson's Ratio")]
        poisson: f64,
    },
}

fn default_relative_tolerance() -> f64 {
    1.0e-6
}

fn default_absolute_tolerance() -> f64 {
    1.0e-10
}

fn default_max_iterations() -> usize {
    100
}

fn default_min_iterations() -> usize {
    2
}

fn default_hardness_bound() -> f64 {
    1.0e-50
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrystalPlasticityParameters {
    #[serde(rename = "Integration Scheme", default)]
    pub integration_scheme: IntegrationScheme,
    #[serde(rename = "Residual Type", default)]
    pub residual_type: ResidualType,
    #[serde(rename = "Nonlinear Solver Step Type", default)]
    pub step_type: StepType,
    #[serde(
        rename = "Implicit Integration Relative Tolerance",
        default = "default_relative_tolerance"
    )]
    pub relative_tolerance: f64,
    #[serde(
        rename = "Implicit Integration Absolute Tolerance",
        default = "default_absolute_tolerance"
    )]
    pub absolute_tolerance: f64,
    #[serde(rename = "Implicit Integration Max Iterations", default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(rename = "Implicit Integration Min Iterations", default = "default_min_iterations")]
    pub min_iterations: usize,
    /// Half-width of the admissible hardness deviation of the constrained residual.
    #[serde(rename = "Hardness Bound", default = "default_hardness_bound")]
    pub hardness_bound: f64,
    #[serde(rename = "Elasticity")]
    pub elasticity: ElasticityParameters,
    /// Rows of the rotation from the crystal frame to the sample frame.
    #[serde(rename = "Crystal Orientation", default)]
    pub orientation: Option<[[f64; 3]; 3]>,
    #[serde(rename = "Slip System Families")]
    pub slip_families: Vec<SlipFamilyParameters>,
    #[serde(rename = "Slip Systems")]
    pub slip_systems: Vec<SlipSystemParameters>,
    /// Directory of the per-point trajectory logs. Logging is disabled if absent.
    #[serde(rename = "Trajectory Output Directory", default)]
    pub trajectory_directory: Option<PathBuf>,
}

impl CrystalPlasticityParameters {
    pub fn minimizer<T: Real>(&self) -> Minimizer<T> {
        let settings = MinimizerSettings {
            relative_tolerance: convert(self.relative_tolerance),
            absolute_tolerance: convert(self.absolute_tolerance),
            max_iterations: self.max_iterations,
            min_iterations: self.min_iterations,
        };
        Minimizer::new(settings, self.step_type)
    }

    pub fn orientation_matrix<T: Real>(&self) -> Option<Matrix3<T>> {
        self.orientation
            .map(|rows| Matrix3::from_fn(|i, j| convert(rows[i][j])))
    }

    pub fn elasticity_tensor<T: Real>(&self) -> ElasticityTensor<T> {
        let tensor: ElasticityTensor<T> = match self.elasticity {
            ElasticityParameters::Cubic { c11, c12, c44 } => {
                ElasticityTensor::cubic(convert(c11), convert(c12), convert(c44))
            }
            ElasticityParameters::Isotropic { young, poisson } => {
                let young_poisson = YoungPoisson {
                    young: convert(young),
                    poisson: convert(poisson),
                };
                ElasticityTensor::isotropic(LameParameters::from(young_poisson))
            }
        };
        match self.orientation_matrix::<T>() {
            Some(rotation) => tensor.rotated(&rotation),
            None => tensor,
        }
    }

    /// Builds the slip families and the slip systems, with the per-system parameters taken
    /// from the family each system belongs to.
    pub fn slip_catalog<T: Real>(&self) -> Result<(Vec<SlipSystem<T>>, Vec<SlipFamily<T>>), ConfigError> {
        let mut families = Vec::with_capacity(self.slip_families.len());
        let mut family_scalars = Vec::with_capacity(self.slip_families.len());
        for (index, family) in self.slip_families.iter().enumerate() {
            let (family, scalars) = parse_family(index, family)?;
            families.push(family);
            family_scalars.push(scalars);
        }

        let rotation = self.orientation_matrix::<T>();
        let mut systems = Vec::with_capacity(self.slip_systems.len());
        for (index, params) in self.slip_systems.iter().enumerate() {
            let to_vector = |v: [f64; 3]| -> Vector3<T> { Vector3::new(convert(v[0]), convert(v[1]), convert(v[2])) };
            let (mut direction, mut normal) = (to_vector(params.direction), to_vector(params.normal));
            if let Some(rotation) = &rotation {
                direction = rotation * direction;
                normal = rotation * normal;
            }

            let mut system =
                SlipSystem::new(direction, normal).ok_or(ConfigError::NonOrthogonalSlipSystem { index })?;
            let scalars: &SystemScalars = family_scalars
                .get(params.family)
                .ok_or(ConfigError::UnknownSlipFamily {
                    slip_system: index,
                    family: params.family,
                })?;
            system.family = params.family;
            system.tau_critical = convert(scalars.tau_critical);
            system.gamma_dot_0 = convert(scalars.gamma_dot_0);
            system.gamma_exp = convert(scalars.gamma_exp);
            system.hardening_modulus = convert(scalars.hardening_modulus);
            system.recovery_modulus = convert(scalars.recovery_modulus);
            families[params.family].slip_systems.push(index);
            systems.push(system);
        }

        Ok((systems, families))
    }
}

/// Family-wide parameters copied into each slip system.
#[derive(Debug, Default)]
struct SystemScalars {
    tau_critical: f64,
    gamma_dot_0: f64,
    gamma_exp: f64,
    hardening_modulus: f64,
    recovery_modulus: f64,
}

/// Reads named parameters, keeping track of which names were consumed.
struct ParameterReader<'p> {
    context: String,
    parameters: &'p BTreeMap<String, f64>,
    consumed: Vec<&'static str>,
}

impl<'p> ParameterReader<'p> {
    fn new(context: String, parameters: &'p BTreeMap<String, f64>) -> Self {
        Self {
            context,
            parameters,
            consumed: Vec::new(),
        }
    }

    fn optional(&mut self, name: &'static str, default: f64) -> Result<f64, ConfigError> {
        self.consumed.push(name);
        match self.parameters.get(name) {
            Some(value) if value.is_finite() => Ok(*value),
            Some(_) => Err(ConfigError::InvalidParameter {
                context: self.context.clone(),
                name: name.to_string(),
                reason: "value must be finite".to_string(),
            }),
            None => Ok(default),
        }
    }

    fn required(&mut self, name: &'static str) -> Result<f64, ConfigError> {
        if !self.parameters.contains_key(name) {
            return Err(ConfigError::MissingParameter {
                context: self.context.clone(),
                name: name.to_string(),
            });
        }
        self.optional(name, 0.0)
    }

    fn positive(&mut self, name: &'static str) -> Result<f64, ConfigError> {
        let value = self.required(name)?;
        self.check_positive(name, value)
    }

    fn optional_positive(&mut self, name: &'static str, default: f64) -> Result<f64, ConfigError> {
        let value = self.optional(name, default)?;
        self.check_positive(name, value)
    }

    fn check_positive(&self, name: &'static str, value: f64) -> Result<f64, ConfigError> {
        if value > 0.0 {
            Ok(value)
        } else {
            Err(ConfigError::InvalidParameter {
                context: self.context.clone(),
                name: name.to_string(),
                reason: "value must be positive".to_string(),
            })
        }
    }

    /// Warns about parameters that were never read.
    fn finish(self) {
        for name in self.parameters.keys() {
            if !self.consumed.contains(&name.as_str()) {
                warn!("{}: ignoring unknown parameter \"{}\"", self.context, name);
            }
        }
    }
}

fn parse_family<T: Real>(index: usize, params: &SlipFamilyParameters) -> Result<(SlipFamily<T>, SystemScalars), ConfigError> {
    let mut scalars = SystemScalars::default();

    let mut reader = ParameterReader::new(
        format!("Slip System Family {}, Flow Rule", index),
        &params.flow_rule.parameters,
    );
    scalars.gamma_dot_0 = reader.required("Reference Slip Rate")?;
    let flow_rule = match params.flow_rule.law {
        FlowRuleType::PowerLaw => {
            scalars.gamma_exp = reader.required("Rate Exponent")?;
            FlowRule::PowerLaw
        }
        FlowRuleType::ThermalActivation => FlowRule::ThermalActivation {
            activation_energy: convert(reader.required("Activation Energy")?),
            athermal_resistance: convert(reader.optional("Athermal Resistance", 0.0)?),
            p: convert(reader.required("Exponent p")?),
            q: convert(reader.required("Exponent q")?),
        },
        FlowRuleType::PowerLawDrag => {
            scalars.gamma_exp = reader.required("Rate Exponent")?;
            FlowRule::PowerLawDrag {
                drag_coefficient: convert(reader.positive("Drag Coefficient")?),
            }
        }
    };
    reader.finish();

    let mut reader = ParameterReader::new(
        format!("Slip System Family {}, Hardening Law", index),
        &params.hardening_law.parameters,
    );
    scalars.tau_critical = reader.required("Initial Resistance")?;
    let initial_hardening = reader.optional("Initial Hardening", 0.0)?;
    let hardening_law = match params.hardening_law.law {
        HardeningLawType::LinearMinusRecovery => {
            scalars.hardening_modulus = reader.required("Hardening Modulus")?;
            scalars.recovery_modulus = reader.optional("Recovery Modulus", 0.0)?;
            HardeningLaw::LinearMinusRecovery
        }
        HardeningLawType::Saturation => HardeningLaw::Saturation {
            rate_coefficient: convert(reader.required("Rate Coefficient")?),
            saturation_limit: convert(reader.positive("Saturation Limit")?),
            saturation_exponent: convert(reader.optional("Saturation Exponent", 0.0)?),
            reference_rate: convert(reader.optional_positive("Reference Rate", 1.0)?),
        },
        HardeningLawType::DislocationDensity => HardeningLaw::DislocationDensity {
            generation: convert(reader.required("Factor Generation")?),
            annihilation: convert(reader.required("Factor Annihilation")?),
            passing: convert(reader.required("Factor Passing")?),
            shear_modulus: convert(reader.required("Shear Modulus")?),
            burgers: convert(reader.required("Burgers Vector Magnitude")?),
        },
    };
    reader.finish();

    let family = SlipFamily {
        flow_rule,
        hardening_law,
        slip_systems: Vec::new(),
        initial_hardening: convert(initial_hardening),
    };
    Ok((family, scalars))
}
