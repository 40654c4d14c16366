//! Local residual formulations solved by the implicit integrators.
//!
//! Each formulation captures the data of one step by reference and evaluates its residual as
//! a pure function of the unknowns.
use crate::crystal::elasticity::ElasticityTensor;
use crate::crystal::kernels::{apply_slip_increment, compute_resistance, compute_stress, slip_rate, update_hardness, update_slip};
use crate::crystal::slip::{SlipFamily, SlipSystem};
use crate::crystal::ConstitutiveFailure;
use cpmor_optimize::minimizer::NonlinearSystem;
use cpmor_traits::Real;
use nalgebra::{DVector, DVectorView, DVectorViewMut, Matrix3};
use std::error::Error;

/// Data of a single step at a single material point.
#[allow(non_snake_case)]
#[derive(Debug, Clone, Copy)]
pub struct StepData<'a, T: Real> {
    pub elasticity: &'a ElasticityTensor<T>,
    pub slip_systems: &'a [SlipSystem<T>],
    pub slip_families: &'a [SlipFamily<T>],
    pub Fp_n: &'a Matrix3<T>,
    pub hardening_n: &'a DVector<T>,
    pub slip_n: &'a DVector<T>,
    pub F_np1: &'a Matrix3<T>,
    pub dt: T,
}

impl<'a, T: Real> StepData<'a, T> {
    pub fn num_slip_systems(&self) -> usize {
        self.slip_systems.len()
    }

    /// Slip predicted by the flow rule for the stress implied by `slip_np1` and the
    /// given slip resistance.
    fn flow_slip(&self, slip_np1: &DVector<T>, resistance: &DVector<T>) -> Result<DVector<T>, ConstitutiveFailure> {
        let plastic = apply_slip_increment(self.slip_systems, self.dt, self.slip_n, slip_np1, self.Fp_n);
        let stress = compute_stress(self.slip_systems, self.elasticity, self.F_np1, &plastic.Fp)?;
        update_slip(
            self.slip_systems,
            self.slip_families,
            self.dt,
            resistance,
            &stress.shear,
            self.slip_n,
        )
    }

    /// Hardness obtained by integrating the hardening laws with the rate implied by `slip_np1`.
    fn hardness_update(&self, slip_np1: &DVector<T>) -> Result<DVector<T>, ConstitutiveFailure> {
        let rate = slip_rate(self.dt, self.slip_n, slip_np1);
        let update = update_hardness(self.slip_systems, self.slip_families, self.dt, &rate, self.hardening_n)?;
        Ok(update.hardening)
    }
}

/// Residual $r(\gamma) = \gamma - \gamma^{flow}(\gamma)$ with slip as the only unknown.
///
/// The hardness is updated explicitly from the slip rate implied by the iterate.
#[derive(Debug, Clone, Copy)]
pub struct ResidualSlip<'a, T: Real> {
    data: StepData<'a, T>,
}

impl<'a, T: Real> ResidualSlip<'a, T> {
    pub fn new(data: StepData<'a, T>) -> Self {
        Self { data }
    }
}

impl<'a, T: Real> NonlinearSystem<T> for ResidualSlip<'a, T> {
    fn dimension(&self) -> usize {
        self.data.num_slip_systems()
    }

    fn residual_into(&self, mut r: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let slip = x.clone_owned();
        let rate = slip_rate(self.data.dt, self.data.slip_n, &slip);
        let hardness = update_hardness(
            self.data.slip_systems,
            self.data.slip_families,
            self.data.dt,
            &rate,
            self.data.hardening_n,
        )?;
        let slip_computed = self.data.flow_slip(&slip, &hardness.resistance)?;
        r.copy_from(&(slip - slip_computed));
        Ok(())
    }
}

/// Residual with slip and hardness as joint unknowns $x = [\gamma; h]$,
///
/// $$
/// r(x) = \begin{bmatrix} \gamma - \gamma^{flow}(\gamma, g(h)) \\ h - h^{update}(\gamma) \end{bmatrix}.
/// $$
#[derive(Debug, Clone, Copy)]
pub struct ResidualSlipHardness<'a, T: Real> {
    data: StepData<'a, T>,
}

impl<'a, T: Real> ResidualSlipHardness<'a, T> {
    pub fn new(data: StepData<'a, T>) -> Self {
        Self { data }
    }
}

impl<'a, T: Real> NonlinearSystem<T> for ResidualSlipHardness<'a, T> {
    fn dimension(&self) -> usize {
        2 * self.data.num_slip_systems()
    }

    fn residual_into(&self, mut r: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let n = self.data.num_slip_systems();
        let slip = x.rows(0, n).clone_owned();
        let hardness = x.rows(n, n).clone_owned();

        let resistance = compute_resistance(self.data.slip_systems, self.data.slip_families, &hardness)?;
        let slip_computed = self.data.flow_slip(&slip, &resistance)?;
        let hardness_computed = self.data.hardness_update(&slip)?;

        r.rows_mut(0, n).copy_from(&(slip - slip_computed));
        r.rows_mut(n, n).copy_from(&(hardness - hardness_computed));
        Ok(())
    }
}

/// Joint slip and hardness residual parametrized by the deviation of the hardness from its
/// explicit update, $x = [\gamma; \delta h]$ with $h = h^{update}(\gamma) + \delta h$,
///
/// $$
/// r(x) = \begin{bmatrix} \gamma - \gamma^{flow}(\gamma, g(h)) \\ \delta h \end{bmatrix}.
/// $$
///
/// Bounds on $\delta h$ therefore directly constrain how far the hardness may deviate from
/// the hardening law. Collapsing the bounds to zero recovers [`ResidualSlip`].
#[derive(Debug, Clone, Copy)]
pub struct ResidualConstrainedSlipHardness<'a, T: Real> {
    data: StepData<'a, T>,
}

impl<'a, T: Real> ResidualConstrainedSlipHardness<'a, T> {
    pub fn new(data: StepData<'a, T>) -> Self {
        Self { data }
    }

    /// Hardness represented by the unknowns `x`.
    pub fn hardness(&self, x: DVectorView<T>) -> Result<DVector<T>, ConstitutiveFailure> {
        let n = self.data.num_slip_systems();
        let slip = x.rows(0, n).clone_owned();
        Ok(self.data.hardness_update(&slip)? + x.rows(n, n))
    }
}

impl<'a, T: Real> NonlinearSystem<T> for ResidualConstrainedSlipHardness<'a, T> {
    fn dimension(&self) -> usize {
        2 * self.data.num_slip_systems()
    }

    fn residual_into(&self, mut r: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let n = self.data.num_slip_systems();
        let slip = x.rows(0, n).clone_owned();
        let hardness = self.hardness(x)?;

        let resistance = compute_resistance(self.data.slip_systems, self.data.slip_families, &hardness)?;
        let slip_computed = self.data.flow_slip(&slip, &resistance)?;

        r.rows_mut(0, n).copy_from(&(slip - slip_computed));
        r.rows_mut(n, n).copy_from(&x.rows(n, n));
        Ok(())
    }
}
