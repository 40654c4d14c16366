//! Per-point state containers.
//!
//! Quantities suffixed `_n` are read at the start of a step and never modified by an
//! integrator. Quantities suffixed `_np1` are written once per converged step. After a failed
//! step they are stale and must not be trusted.
use cpmor_traits::Real;
use nalgebra::{DVector, Matrix3};

/// Location of a material point, used only to name diagnostic output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointLocation {
    pub cell: usize,
    pub point: usize,
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq)]
pub struct StateMechanical<T: Real> {
    pub F_n: Matrix3<T>,
    pub F_np1: Matrix3<T>,
    pub Fp_n: Matrix3<T>,
    pub Fp_np1: Matrix3<T>,
    pub Lp_np1: Matrix3<T>,
    pub sigma_np1: Matrix3<T>,
    pub S_np1: Matrix3<T>,
}

impl<T: Real> Default for StateMechanical<T> {
    fn default() -> Self {
        Self {
            F_n: Matrix3::identity(),
            F_np1: Matrix3::identity(),
            Fp_n: Matrix3::identity(),
            Fp_np1: Matrix3::identity(),
            Lp_np1: Matrix3::zeros(),
            sigma_np1: Matrix3::zeros(),
            S_np1: Matrix3::zeros(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateInternal<T: Real> {
    pub slip_n: DVector<T>,
    pub slip_np1: DVector<T>,
    pub rate_slip: DVector<T>,
    pub shear_np1: DVector<T>,
    pub hardening_n: DVector<T>,
    pub hardening_np1: DVector<T>,
    pub resistance: DVector<T>,
    pub location: Option<PointLocation>,
}

impl<T: Real> StateInternal<T> {
    pub fn new(num_slip_systems: usize) -> Self {
        let zeros = DVector::zeros(num_slip_systems);
        Self {
            slip_n: zeros.clone(),
            slip_np1: zeros.clone(),
            rate_slip: zeros.clone(),
            shear_np1: zeros.clone(),
            hardening_n: zeros.clone(),
            hardening_np1: zeros.clone(),
            resistance: zeros,
            location: None,
        }
    }

    pub fn num_slip_systems(&self) -> usize {
        self.slip_n.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialPointState<T: Real> {
    pub mechanical: StateMechanical<T>,
    pub internal: StateInternal<T>,
}

impl<T: Real> MaterialPointState<T> {
    /// Undeformed state with zero slip and hardening.
    pub fn new(num_slip_systems: usize) -> Self {
        Self {
            mechanical: StateMechanical::default(),
            internal: StateInternal::new(num_slip_systems),
        }
    }

    pub fn with_location(mut self, cell: usize, point: usize) -> Self {
        self.internal.location = Some(PointLocation { cell, point });
        self
    }

    /// Accepts the current step, copying every `_np1` quantity into its `_n` counterpart.
    #[allow(non_snake_case)]
    pub fn advance(&mut self) {
        let StateMechanical {
            F_n, F_np1, Fp_n, Fp_np1, ..
        } = &mut self.mechanical;
        F_n.copy_from(F_np1);
        Fp_n.copy_from(Fp_np1);

        let internal = &mut self.internal;
        internal.slip_n.copy_from(&internal.slip_np1);
        internal.hardening_n.copy_from(&internal.hardening_np1);
    }

    /// Prepares a new step towards the deformation gradient `F_np1`, predicting the
    /// `_np1` quantities from the current state.
    #[allow(non_snake_case)]
    pub fn begin_step(&mut self, F_np1: &Matrix3<T>) {
        let mechanical = &mut self.mechanical;
        mechanical.F_np1.copy_from(F_np1);
        mechanical.Fp_np1.copy_from(&mechanical.Fp_n);
        let internal = &mut self.internal;
        internal.slip_np1.copy_from(&internal.slip_n);
        internal.hardening_np1.copy_from(&internal.hardening_n);
    }
}
