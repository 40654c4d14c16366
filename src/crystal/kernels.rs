//! Constitutive kernels of the crystal-plasticity model.
//!
//! The kernels are pure functions of their arguments. Numerical breakdown (non-finite values,
//! singular tensors) is reported as a [`ConstitutiveFailure`] rather than a panic, leaving
//! recovery to the caller.
use crate::crystal::elasticity::ElasticityTensor;
use crate::crystal::slip::{HardeningLaw, SlipFamily, SlipSystem};
use crate::crystal::ConstitutiveFailure;
use cpmor_traits::Real;
use itertools::izip;
use nalgebra::{DVector, Matrix3};
use numeric_literals::replace_float_literals;

#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq)]
pub struct StressUpdate<T: Real> {
    /// Cauchy stress.
    pub sigma: Matrix3<T>,
    /// Second Piola-Kirchhoff stress in the intermediate configuration.
    pub S: Matrix3<T>,
    /// Resolved shear stress on each slip system.
    pub shear: DVector<T>,
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq)]
pub struct PlasticUpdate<T: Real> {
    pub Lp: Matrix3<T>,
    pub Fp: Matrix3<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HardnessUpdate<T: Real> {
    pub hardening: DVector<T>,
    pub resistance: DVector<T>,
}

fn all_finite<'a, T: Real>(values: impl IntoIterator<Item = &'a T>) -> bool {
    values.into_iter().all(|v| v.is_finite())
}

/// Computes the stress from the total and plastic deformation gradients.
///
/// With $F^e = F (F^p)^{-1}$, $C^e = (F^e)^T F^e$ and $E^e = \frac{1}{2}(C^e - I)$, the
/// second Piola-Kirchhoff stress is $S = \mathbb{C} : E^e$, the Cauchy stress is
/// $\sigma = \det(F^e)^{-1} F^e S (F^e)^T$ and the resolved shear on system $i$ is
/// $\tau_i = (C^e S) : P_i$.
#[allow(non_snake_case)]
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn compute_stress<T: Real>(
    slip_systems: &[SlipSystem<T>],
    elasticity: &ElasticityTensor<T>,
    F: &Matrix3<T>,
    Fp: &Matrix3<T>,
) -> Result<StressUpdate<T>, ConstitutiveFailure> {
    let Fp_inv = Fp
        .try_inverse()
        .ok_or(ConstitutiveFailure::SingularPlasticDeformation)?;
    let Fe = F * Fp_inv;
    let Ce = Fe.transpose() * Fe;
    let Ee = (Ce - Matrix3::identity()) * 0.5;
    let S = elasticity.contract(&Ee);

    let J = Fe.determinant();
    if J == 0.0 {
        return Err(ConstitutiveFailure::NonFiniteStress);
    }
    let sigma = Fe * S * Fe.transpose() / J;

    let mandel = Ce * S;
    let shear = DVector::from_iterator(
        slip_systems.len(),
        slip_systems
            .iter()
            .map(|system| mandel.dot(&system.projector)),
    );

    if all_finite(sigma.iter()) && all_finite(S.iter()) && all_finite(shear.iter()) {
        Ok(StressUpdate { sigma, S, shear })
    } else {
        Err(ConstitutiveFailure::NonFiniteStress)
    }
}

/// Slip rates $(\gamma_{n+1} - \gamma_n) / \Delta t$, or zero if $\Delta t \leq 0$.
pub fn slip_rate<T: Real>(dt: T, slip_n: &DVector<T>, slip_np1: &DVector<T>) -> DVector<T> {
    if dt > T::zero() {
        (slip_np1 - slip_n) / dt
    } else {
        DVector::zeros(slip_n.len())
    }
}

/// Integrates the plastic deformation gradient over a step with the exponential map,
/// $F^p_{n+1} = \exp(\Delta L^p) F^p_n$ with $\Delta L^p = \sum_i \Delta\gamma_i P_i$.
///
/// A vanishing slip increment reproduces $F^p_n$ exactly.
#[allow(non_snake_case)]
pub fn apply_slip_increment<T: Real>(
    slip_systems: &[SlipSystem<T>],
    dt: T,
    slip_n: &DVector<T>,
    slip_np1: &DVector<T>,
    Fp_n: &Matrix3<T>,
) -> PlasticUpdate<T> {
    let mut delta_Lp = Matrix3::zeros();
    for (system, gamma_n, gamma_np1) in izip!(slip_systems, slip_n.iter(), slip_np1.iter()) {
        delta_Lp += system.projector * (*gamma_np1 - *gamma_n);
    }

    let Lp = if dt > T::zero() {
        delta_Lp / dt
    } else {
        Matrix3::zeros()
    };

    let Fp = if delta_Lp.iter().all(|v| *v == T::zero()) {
        *Fp_n
    } else {
        delta_Lp.exp() * Fp_n
    };

    PlasticUpdate { Lp, Fp }
}

/// Slip resistance of each system given the hardness variables.
///
/// For the phenomenological laws the resistance is $\tau_c + h$. For the dislocation density
/// law it is $\tau_c + k_{pass} G b \sqrt{\rho_P}$, where $\rho_P$ is the parallel density.
pub fn compute_resistance<T: Real>(
    slip_systems: &[SlipSystem<T>],
    slip_families: &[SlipFamily<T>],
    hardening: &DVector<T>,
) -> Result<DVector<T>, ConstitutiveFailure> {
    let mut resistance = DVector::zeros(slip_systems.len());
    for family in slip_families {
        for &i in &family.slip_systems {
            let system = &slip_systems[i];
            resistance[i] = match family.hardening_law {
                HardeningLaw::LinearMinusRecovery | HardeningLaw::Saturation { .. } => {
                    system.tau_critical + hardening[i]
                }
                HardeningLaw::DislocationDensity {
                    passing,
                    shear_modulus,
                    burgers,
                    ..
                } => {
                    let (_, parallel) = interaction_densities(slip_systems, family, i, hardening);
                    system.tau_critical + passing * shear_modulus * burgers * parallel.sqrt()
                }
            };
            if !resistance[i].is_finite() {
                return Err(ConstitutiveFailure::NonFiniteHardness { slip_system: i });
            }
        }
    }
    Ok(resistance)
}

/// Forest and parallel dislocation densities seen by system `i`, weighting the densities of
/// the family with $|n_i \cdot t_j|$ and $\| n_i \times t_j \|$, respectively.
fn interaction_densities<T: Real>(
    slip_systems: &[SlipSystem<T>],
    family: &SlipFamily<T>,
    i: usize,
    densities: &DVector<T>,
) -> (T, T) {
    let normal = &slip_systems[i].normal;
    let mut forest = T::zero();
    let mut parallel = T::zero();
    for &j in &family.slip_systems {
        let line = slip_systems[j].line_direction();
        forest += normal.dot(&line).abs() * densities[j];
        parallel += normal.cross(&line).norm() * densities[j];
    }
    (forest, parallel)
}

/// Updates the hardness variables over a step of size `dt` with the given slip rates, applying
/// the hardening law of each family.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn update_hardness<T: Real>(
    slip_systems: &[SlipSystem<T>],
    slip_families: &[SlipFamily<T>],
    dt: T,
    rate_slip: &DVector<T>,
    hardening_n: &DVector<T>,
) -> Result<HardnessUpdate<T>, ConstitutiveFailure> {
    let mut hardening = hardening_n.clone();

    for family in slip_families {
        match family.hardening_law {
            HardeningLaw::LinearMinusRecovery => {
                for &i in &family.slip_systems {
                    let system = &slip_systems[i];
                    let effective_rate = dt * rate_slip[i].abs();
                    hardening[i] = (hardening_n[i] + system.hardening_modulus * effective_rate)
                        / (1.0 + system.recovery_modulus * effective_rate);
                }
            }
            HardeningLaw::Saturation {
                rate_coefficient,
                saturation_limit,
                saturation_exponent,
                reference_rate,
            } => {
                let family_rate = family
                    .slip_systems
                    .iter()
                    .fold(T::zero(), |sum, &j| sum + rate_slip[j].abs());
                let saturation = if saturation_exponent > 0.0 && family_rate > 0.0 {
                    saturation_limit * (family_rate / reference_rate).powf(saturation_exponent)
                } else {
                    saturation_limit
                };
                let effective_rate = dt * rate_coefficient * family_rate;
                for &i in &family.slip_systems {
                    let tau_critical = slip_systems[i].tau_critical;
                    hardening[i] = (hardening_n[i] + effective_rate * (1.0 - tau_critical / saturation))
                        / (1.0 + effective_rate / saturation);
                }
            }
            HardeningLaw::DislocationDensity {
                generation,
                annihilation,
                ..
            } => {
                for &i in &family.slip_systems {
                    let (forest, _) = interaction_densities(slip_systems, family, i, hardening_n);
                    let generated = generation * forest.sqrt() - annihilation * hardening_n[i];
                    hardening[i] = hardening_n[i] + dt * rate_slip[i].abs() * generated;
                }
            }
        }
    }

    for (i, h) in hardening.iter().enumerate() {
        if !h.is_finite() {
            return Err(ConstitutiveFailure::NonFiniteHardness { slip_system: i });
        }
    }

    let resistance = compute_resistance(slip_systems, slip_families, &hardening)?;
    Ok(HardnessUpdate { hardening, resistance })
}

/// Integrates the slip over a step of size `dt` with the flow rule of each family,
/// $\gamma_{n+1} = \gamma_n + \Delta t \, \dot\gamma(\tau, g)$.
pub fn update_slip<T: Real>(
    slip_systems: &[SlipSystem<T>],
    slip_families: &[SlipFamily<T>],
    dt: T,
    resistance: &DVector<T>,
    shear: &DVector<T>,
    slip_n: &DVector<T>,
) -> Result<DVector<T>, ConstitutiveFailure> {
    let mut slip_np1 = slip_n.clone();
    for (i, system) in slip_systems.iter().enumerate() {
        let g = resistance[i];
        if !(g > T::zero()) {
            return Err(ConstitutiveFailure::NonPositiveResistance { slip_system: i });
        }
        let rate = slip_families[system.family]
            .flow_rule
            .slip_rate(system, shear[i], g);
        slip_np1[i] += dt * rate;
        if !slip_np1[i].is_finite() {
            return Err(ConstitutiveFailure::NonFiniteSlip { slip_system: i });
        }
    }
    Ok(slip_np1)
}
