//! Slip systems, slip families and their flow and hardening laws.
use cpmor_traits::Real;
use nalgebra::{Matrix3, Vector3};
use numeric_literals::replace_float_literals;

/// A crystallographic slip system, given by a slip direction $s$ and a slip plane normal $n$.
///
/// The Schmid tensor $P = s \otimes n$ projects stress onto the resolved shear of the system.
#[derive(Debug, Clone, PartialEq)]
pub struct SlipSystem<T: Real> {
    pub direction: Vector3<T>,
    pub normal: Vector3<T>,
    pub projector: Matrix3<T>,
    /// Index of the slip family the system belongs to.
    pub family: usize,
    /// Critical resolved shear stress.
    pub tau_critical: T,
    /// Reference slip rate of the flow rule.
    pub gamma_dot_0: T,
    /// Rate sensitivity exponent of the flow rule.
    pub gamma_exp: T,
    pub hardening_modulus: T,
    /// Dynamic recovery coefficient.
    pub recovery_modulus: T,
}

impl<T: Real> SlipSystem<T> {
    /// Creates a slip system from (not necessarily normalized) direction and normal vectors.
    ///
    /// Returns `None` if either vector vanishes, or if they are not orthogonal. All scalar
    /// parameters are initialized to zero and the family index to 0.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn new(direction: Vector3<T>, normal: Vector3<T>) -> Option<Self> {
        let direction = direction.try_normalize(T::default_epsilon())?;
        let normal = normal.try_normalize(T::default_epsilon())?;
        if direction.dot(&normal).abs() > 1e-10 {
            return None;
        }
        Some(Self {
            projector: direction * normal.transpose(),
            direction,
            normal,
            family: 0,
            tau_critical: 0.0,
            gamma_dot_0: 0.0,
            gamma_exp: 0.0,
            hardening_modulus: 0.0,
            recovery_modulus: 0.0,
        })
    }

    /// The dislocation line direction $t = s \times n$.
    pub fn line_direction(&self) -> Vector3<T> {
        self.direction.cross(&self.normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowRule<T> {
    /// $\dot\gamma = \dot\gamma_0 |\tau / g|^m \operatorname{sgn} \tau$.
    PowerLaw,
    /// Thermally activated glide over obstacles,
    /// $\dot\gamma = \dot\gamma_0 \exp(-Q (1 - r^p)^q) \operatorname{sgn} \tau$
    /// with $r = (|\tau| - \tau_a) / g$ clamped to $[0, 1]$.
    ThermalActivation {
        activation_energy: T,
        athermal_resistance: T,
        p: T,
        q: T,
    },
    /// Power law in series with viscous drag $\dot\gamma_d = |\tau| / B$.
    PowerLawDrag { drag_coefficient: T },
}

impl<T: Real> FlowRule<T> {
    /// Evaluates the slip rate of `system` under resolved shear `shear` and slip resistance
    /// `resistance`.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn slip_rate(&self, system: &SlipSystem<T>, shear: T, resistance: T) -> T {
        let sign = if shear > 0.0 {
            1.0
        } else if shear < 0.0 {
            -1.0
        } else {
            return 0.0;
        };
        let power_law = || system.gamma_dot_0 * (shear / resistance).abs().powf(system.gamma_exp);

        match *self {
            FlowRule::PowerLaw => sign * power_law(),
            FlowRule::ThermalActivation {
                activation_energy,
                athermal_resistance,
                p,
                q,
            } => {
                let ratio = (shear.abs() - athermal_resistance) / resistance;
                if ratio <= 0.0 {
                    0.0
                } else {
                    let ratio = ratio.min(1.0);
                    let barrier = (1.0 - ratio.powf(p)).powf(q);
                    sign * system.gamma_dot_0 * (-activation_energy * barrier).exp()
                }
            }
            FlowRule::PowerLawDrag { drag_coefficient } => {
                let rate_power_law = power_law();
                let rate_drag = shear.abs() / drag_coefficient;
                let sum = rate_power_law + rate_drag;
                if sum > 0.0 {
                    sign * rate_power_law * rate_drag / sum
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HardeningLaw<T> {
    /// Linear hardening with dynamic recovery, per slip system.
    LinearMinusRecovery,
    /// Voce-type saturation driven by the total slip rate of the family.
    Saturation {
        rate_coefficient: T,
        saturation_limit: T,
        saturation_exponent: T,
        reference_rate: T,
    },
    /// Evolution of dislocation densities, with forest and parallel densities obtained through
    /// the interaction between the systems of the family.
    DislocationDensity {
        generation: T,
        annihilation: T,
        passing: T,
        shear_modulus: T,
        burgers: T,
    },
}

/// A group of slip systems sharing flow rule and hardening law.
#[derive(Debug, Clone, PartialEq)]
pub struct SlipFamily<T> {
    pub flow_rule: FlowRule<T>,
    pub hardening_law: HardeningLaw<T>,
    /// Indices of the slip systems in the family.
    pub slip_systems: Vec<usize>,
    /// Initial value of the hardness variable of each slip system in the family.
    pub initial_hardening: T,
}
