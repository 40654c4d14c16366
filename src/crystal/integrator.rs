//! Time integration of a single material point.
use crate::crystal::elasticity::ElasticityTensor;
use crate::crystal::kernels::{
    apply_slip_increment, compute_stress, slip_rate, update_hardness, update_slip,
    HardnessUpdate,
};
use crate::crystal::residual::{ResidualConstrainedSlipHardness, ResidualSlip, ResidualSlipHardness, StepData};
use crate::crystal::slip::{SlipFamily, SlipSystem};
use crate::crystal::state::MaterialPointState;
use crate::crystal::trajectory::{TrajectoryLog, TrajectoryRecord};
use crate::status::LoadStepStatus;
use cpmor_optimize::bounded::{minimize_bounded, BoundedSettings, BoxConstraints};
use cpmor_optimize::minimizer::{Minimizer, MinimizerResult};
use cpmor_traits::{Real, ScalarValue};
use log::debug;
use nalgebra::DVector;
use numeric_literals::replace_float_literals;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IntegratorKind {
    Explicit,
    ImplicitSlip,
    ImplicitSlipHardness,
    ImplicitConstrainedSlipHardness,
}

impl Display for IntegratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntegratorKind::Explicit => "explicit",
            IntegratorKind::ImplicitSlip => "implicit slip",
            IntegratorKind::ImplicitSlipHardness => "implicit slip-hardness",
            IntegratorKind::ImplicitConstrainedSlipHardness => "implicit constrained slip-hardness",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IntegratorState {
    #[default]
    Uninitialized,
    Running,
    Converged,
    Failed(String),
}

/// Read-only data shared by the integrators of all material points in a pass.
#[derive(Debug, Clone, Copy)]
pub struct IntegratorContext<'a, T: Real> {
    pub slip_systems: &'a [SlipSystem<T>],
    pub slip_families: &'a [SlipFamily<T>],
    pub elasticity: &'a ElasticityTensor<T>,
    pub dt: T,
    pub minimizer: &'a Minimizer<T>,
    /// Half-width of the admissible interval of the hardness deviation in the constrained
    /// formulation.
    pub hardness_bound: T,
    pub status: &'a LoadStepStatus,
    pub trajectory: Option<&'a TrajectoryLog>,
}

/// Integrates one material point over one step.
///
/// Integrators are cheap values borrowing the shared [`IntegratorContext`]. Success or failure
/// of [`update`](Self::update) is observed through [`state`](Self::state) and, for failures,
/// through the [`LoadStepStatus`] of the context, which receives a request to reduce the global
/// load step.
#[derive(Debug, Clone)]
pub struct Integrator<'a, T: Real> {
    kind: IntegratorKind,
    context: &'a IntegratorContext<'a, T>,
    state: IntegratorState,
    norm_residual: f64,
    num_iterations: usize,
}

/// Outcome of the unknowns' solve, with failures described by the message forwarded to the
/// load step status.
type StepOutcome = Result<(), String>;

impl<'a, T: Real> Integrator<'a, T> {
    pub fn new(kind: IntegratorKind, context: &'a IntegratorContext<'a, T>) -> Self {
        Self {
            kind,
            context,
            state: IntegratorState::Uninitialized,
            norm_residual: 0.0,
            num_iterations: 0,
        }
    }

    pub fn kind(&self) -> IntegratorKind {
        self.kind
    }

    pub fn state(&self) -> &IntegratorState {
        &self.state
    }

    /// Residual norm of the last update, for diagnostics.
    pub fn norm_residual(&self) -> f64 {
        self.norm_residual
    }

    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    /// Advances `point` from $t_n$ to $t_{n+1}$.
    ///
    /// The `_n` quantities and `F_np1` of `point` are inputs, while `slip_np1` and
    /// `hardening_np1` serve as the initial guess for implicit schemes. If the update fails,
    /// the `_np1` quantities are left untouched.
    pub fn update(&mut self, point: &mut MaterialPointState<T>) {
        self.state = IntegratorState::Running;
        self.norm_residual = 0.0;
        self.num_iterations = 0;

        let outcome = match self.kind {
            IntegratorKind::Explicit => self.update_explicit(point),
            IntegratorKind::ImplicitSlip => self.update_implicit_slip(point),
            IntegratorKind::ImplicitSlipHardness => self.update_implicit_slip_hardness(point),
            IntegratorKind::ImplicitConstrainedSlipHardness => self.update_implicit_constrained(point),
        };

        match outcome {
            Ok(()) => self.state = IntegratorState::Converged,
            Err(message) => {
                if let Some(location) = point.internal.location {
                    debug!(
                        "{} integration failed at cell {}, point {}: {}",
                        self.kind, location.cell, location.point, message
                    );
                }
                self.context.status.force_load_step_reduction(message.clone());
                self.state = IntegratorState::Failed(message);
            }
        }
    }

    fn step_data<'p>(&self, point: &'p MaterialPointState<T>) -> StepData<'p, T>
    where
        'a: 'p,
    {
        StepData {
            elasticity: self.context.elasticity,
            slip_systems: self.context.slip_systems,
            slip_families: self.context.slip_families,
            Fp_n: &point.mechanical.Fp_n,
            hardening_n: &point.internal.hardening_n,
            slip_n: &point.internal.slip_n,
            F_np1: &point.mechanical.F_np1,
            dt: self.context.dt,
        }
    }

    #[allow(non_snake_case)]
    fn update_explicit(&mut self, point: &mut MaterialPointState<T>) -> StepOutcome {
        let ctx = self.context;
        let (systems, families, dt) = (ctx.slip_systems, ctx.slip_families, ctx.dt);
        let mechanical = &point.mechanical;
        let internal = &point.internal;

        let stress_n = compute_stress(systems, ctx.elasticity, &mechanical.F_np1, &mechanical.Fp_n)
            .map_err(|_| "ComputeStress failed.".to_string())?;
        let hardness = update_hardness(systems, families, dt, &internal.rate_slip, &internal.hardening_n)
            .map_err(|_| "Failed on hardness".to_string())?;
        let slip_np1 = update_slip(systems, families, dt, &hardness.resistance, &stress_n.shear, &internal.slip_n)
            .map_err(|err| format!("UpdateSlip failed: {}", err))?;

        let plastic = apply_slip_increment(systems, dt, &internal.slip_n, &slip_np1, &mechanical.Fp_n);
        let stress_np1 = compute_stress(systems, ctx.elasticity, &mechanical.F_np1, &plastic.Fp)
            .map_err(|_| "ComputeStress failed.".to_string())?;

        // Deviation of the slip from the flow rule evaluated at the end-of-step stress
        let slip_computed = update_slip(
            systems,
            families,
            dt,
            &hardness.resistance,
            &stress_np1.shear,
            &internal.slip_n,
        )
        .map_err(|err| format!("UpdateSlip failed: {}", err))?;
        self.norm_residual = (&slip_np1 - slip_computed).norm().scalar_value();

        let rate = slip_rate(dt, &internal.slip_n, &slip_np1);
        let mechanical = &mut point.mechanical;
        mechanical.Fp_np1 = plastic.Fp;
        mechanical.Lp_np1 = plastic.Lp;
        mechanical.sigma_np1 = stress_np1.sigma;
        mechanical.S_np1 = stress_np1.S;

        let internal = &mut point.internal;
        internal.shear_np1 = stress_np1.shear;
        internal.hardening_np1 = hardness.hardening;
        internal.resistance = hardness.resistance;
        if dt > T::zero() {
            internal.rate_slip = rate;
        }
        internal.slip_np1 = slip_np1;
        Ok(())
    }

    fn log_predictor(&self, point: &MaterialPointState<T>) {
        if let Some(trajectory) = self.context.trajectory {
            let slip = &point.internal.slip_np1;
            trajectory.append(
                point.internal.location,
                &TrajectoryRecord::Predictor {
                    dt: self.context.dt.scalar_value(),
                    max_slip: slip.amax().scalar_value(),
                    total_slip: slip.lp_norm(1).scalar_value(),
                },
            );
        }
    }

    /// Translates the minimizer result into a step outcome.
    fn check_minimizer(&self, point: &MaterialPointState<T>, result: &MinimizerResult<T>) -> StepOutcome {
        let record = if result.failed {
            TrajectoryRecord::MinimizerFailed
        } else if !result.converged {
            TrajectoryRecord::MinimizerNotConverged
        } else {
            return Ok(());
        };

        if let Some(trajectory) = self.context.trajectory {
            trajectory.append(point.internal.location, &record);
        }

        if result.failed {
            Err(result.failure_message.clone())
        } else {
            Err("Minisolver not converged".to_string())
        }
    }

    fn update_implicit_slip(&mut self, point: &mut MaterialPointState<T>) -> StepOutcome {
        self.log_predictor(point);
        let mut x = point.internal.slip_np1.clone();
        let result = {
            let system = ResidualSlip::new(self.step_data(point));
            self.context.minimizer.minimize(&system, &mut x)
        };
        self.check_minimizer(point, &result)?;

        let rate = slip_rate(self.context.dt, &point.internal.slip_n, &x);
        let hardness = self.hardness_update(point, &rate)?;
        self.reevaluate_state(point, x, hardness, &result)
    }

    fn update_implicit_slip_hardness(&mut self, point: &mut MaterialPointState<T>) -> StepOutcome {
        self.log_predictor(point);
        let n = point.internal.num_slip_systems();
        let mut x = DVector::zeros(2 * n);
        x.rows_mut(0, n).copy_from(&point.internal.slip_np1);
        x.rows_mut(n, n).copy_from(&point.internal.hardening_np1);

        let result = {
            let system = ResidualSlipHardness::new(self.step_data(point));
            self.context.minimizer.minimize(&system, &mut x)
        };
        self.check_minimizer(point, &result)?;

        let slip = x.rows(0, n).clone_owned();
        let rate = slip_rate(self.context.dt, &point.internal.slip_n, &slip);
        let hardness = self.hardness_update(point, &rate)?;
        self.reevaluate_state(point, slip, hardness, &result)
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn update_implicit_constrained(&mut self, point: &mut MaterialPointState<T>) -> StepOutcome {
        self.log_predictor(point);
        let n = point.internal.num_slip_systems();
        let mut x = DVector::zeros(2 * n);
        x.rows_mut(0, n).copy_from(&point.internal.slip_np1);

        let slip_bound = 1.0e50;
        let hardness_bound = self.context.hardness_bound;
        let lower = DVector::from_fn(2 * n, |i, _| if i < n { -slip_bound } else { -hardness_bound });
        let upper = DVector::from_fn(2 * n, |i, _| if i < n { slip_bound } else { hardness_bound });
        let bounds = BoxConstraints::new(lower, upper);
        let settings = BoundedSettings {
            minimizer: self.context.minimizer.settings,
            ..BoundedSettings::default()
        };

        let result = {
            let system = ResidualConstrainedSlipHardness::new(self.step_data(point));
            minimize_bounded(&system, &mut x, &bounds, &settings)
        };
        self.check_minimizer(point, &result)?;

        let slip = x.rows(0, n).clone_owned();
        let rate = slip_rate(self.context.dt, &point.internal.slip_n, &slip);
        let hardness = self.hardness_update(point, &rate)?;
        self.reevaluate_state(point, slip, hardness, &result)
    }

    fn hardness_update(&self, point: &MaterialPointState<T>, rate: &DVector<T>) -> Result<HardnessUpdate<T>, String> {
        let ctx = self.context;
        update_hardness(
            ctx.slip_systems,
            ctx.slip_families,
            ctx.dt,
            rate,
            &point.internal.hardening_n,
        )
        .map_err(|_| "Failed on hardness".to_string())
    }

    /// Recomputes every quantity depending on the converged slip, and commits the step.
    fn reevaluate_state(
        &mut self,
        point: &mut MaterialPointState<T>,
        slip_np1: DVector<T>,
        hardness: HardnessUpdate<T>,
        result: &MinimizerResult<T>,
    ) -> StepOutcome {
        let ctx = self.context;
        let dt = ctx.dt;
        let plastic = apply_slip_increment(
            ctx.slip_systems,
            dt,
            &point.internal.slip_n,
            &slip_np1,
            &point.mechanical.Fp_n,
        );
        let stress = compute_stress(ctx.slip_systems, ctx.elasticity, &point.mechanical.F_np1, &plastic.Fp)
            .map_err(|_| "ComputeStress failed.".to_string())?;

        let rate = slip_rate(dt, &point.internal.slip_n, &slip_np1);
        let mechanical = &mut point.mechanical;
        mechanical.Fp_np1 = plastic.Fp;
        mechanical.Lp_np1 = plastic.Lp;
        mechanical.sigma_np1 = stress.sigma;
        mechanical.S_np1 = stress.S;

        let internal = &mut point.internal;
        internal.shear_np1 = stress.shear;
        internal.hardening_np1 = hardness.hardening;
        internal.resistance = hardness.resistance;
        if dt > T::zero() {
            internal.rate_slip = rate;
        }
        internal.slip_np1 = slip_np1;

        if let Some(trajectory) = ctx.trajectory {
            trajectory.append(
                internal.location,
                &TrajectoryRecord::Converged {
                    max_slip: internal.slip_np1.amax().scalar_value(),
                    max_hardening: internal.hardening_np1.amax().scalar_value(),
                    max_shear: internal.shear_np1.amax().scalar_value(),
                },
            );
        }

        self.norm_residual = (2.0 * result.final_value.scalar_value()).sqrt();
        self.num_iterations = result.iterations;
        Ok(())
    }
}
