//! The crystal-plasticity model evaluated over all material points of a pass.
use crate::crystal::elasticity::ElasticityTensor;
use crate::crystal::factory::IntegratorFactory;
use crate::crystal::integrator::{IntegratorContext, IntegratorKind, IntegratorState};
use crate::crystal::kernels::compute_resistance;
use crate::crystal::parameters::CrystalPlasticityParameters;
use crate::crystal::slip::{SlipFamily, SlipSystem};
use crate::crystal::state::MaterialPointState;
use crate::crystal::trajectory::TrajectoryLog;
use crate::crystal::ConstitutiveFailure;
use crate::status::LoadStepStatus;
use cpmor_optimize::minimizer::Minimizer;
use cpmor_traits::Real;
use eyre::WrapErr;
use log::{debug, info};
use nalgebra::convert;
use rayon::prelude::*;

/// Outcome of the last update of a single material point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointOutcome {
    pub state: IntegratorState,
    pub norm_residual: f64,
    pub num_iterations: usize,
}

/// Aggregated outcome of a pass over all material points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PassSummary {
    pub num_points: usize,
    pub num_converged: usize,
    pub num_failed: usize,
    pub max_norm_residual: f64,
    pub max_iterations: usize,
}

impl PassSummary {
    pub fn all_converged(&self) -> bool {
        self.num_converged == self.num_points
    }
}

#[derive(Debug, Clone)]
pub struct CrystalPlasticityModel<T: Real> {
    slip_systems: Vec<SlipSystem<T>>,
    slip_families: Vec<SlipFamily<T>>,
    elasticity: ElasticityTensor<T>,
    factory: IntegratorFactory,
    minimizer: Minimizer<T>,
    hardness_bound: T,
    trajectory: Option<TrajectoryLog>,
    outcomes: Vec<PointOutcome>,
}

impl<T: Real> CrystalPlasticityModel<T> {
    pub fn new(
        slip_systems: Vec<SlipSystem<T>>,
        slip_families: Vec<SlipFamily<T>>,
        elasticity: ElasticityTensor<T>,
        factory: IntegratorFactory,
        minimizer: Minimizer<T>,
    ) -> Self {
        Self {
            slip_systems,
            slip_families,
            elasticity,
            factory,
            minimizer,
            hardness_bound: convert(1.0e-50),
            trajectory: None,
            outcomes: Vec::new(),
        }
    }

    pub fn from_parameters(parameters: &CrystalPlasticityParameters) -> eyre::Result<Self> {
        let (slip_systems, slip_families) = parameters
            .slip_catalog()
            .wrap_err("failed to set up slip systems")?;
        let factory = IntegratorFactory::new(parameters.integration_scheme, parameters.residual_type);
        info!(
            "Crystal plasticity: {} slip systems in {} families, {} integration, {} steps",
            slip_systems.len(),
            slip_families.len(),
            factory.kind(),
            parameters.step_type
        );

        let mut model = Self::new(
            slip_systems,
            slip_families,
            parameters.elasticity_tensor(),
            factory,
            parameters.minimizer(),
        )
        .with_hardness_bound(convert(parameters.hardness_bound));
        if let Some(directory) = &parameters.trajectory_directory {
            model = model.with_trajectory_log(TrajectoryLog::new(directory));
        }
        Ok(model)
    }

    pub fn with_hardness_bound(self, hardness_bound: T) -> Self {
        Self { hardness_bound, ..self }
    }

    pub fn with_trajectory_log(self, trajectory: TrajectoryLog) -> Self {
        Self {
            trajectory: Some(trajectory),
            ..self
        }
    }

    pub fn slip_systems(&self) -> &[SlipSystem<T>] {
        &self.slip_systems
    }

    pub fn slip_families(&self) -> &[SlipFamily<T>] {
        &self.slip_families
    }

    pub fn elasticity(&self) -> &ElasticityTensor<T> {
        &self.elasticity
    }

    pub fn minimizer(&self) -> &Minimizer<T> {
        &self.minimizer
    }

    pub fn integrator_kind(&self) -> IntegratorKind {
        self.factory.kind()
    }

    /// Outcomes of the last pass, in the order of the points passed to
    /// [`compute_state`](Self::compute_state).
    pub fn outcomes(&self) -> &[PointOutcome] {
        &self.outcomes
    }

    /// Undeformed state of a point, with the initial hardening of each family.
    pub fn initial_state(&self) -> Result<MaterialPointState<T>, ConstitutiveFailure> {
        let mut state = MaterialPointState::new(self.slip_systems.len());
        for family in &self.slip_families {
            for &i in &family.slip_systems {
                state.internal.hardening_n[i] = family.initial_hardening;
            }
        }
        state.internal.hardening_np1 = state.internal.hardening_n.clone();
        state.internal.resistance =
            compute_resistance(&self.slip_systems, &self.slip_families, &state.internal.hardening_n)?;
        Ok(state)
    }

    /// Integrates every point over a step of size `dt`, in parallel.
    ///
    /// All points are updated even if some fail. Failures are recorded in the point outcomes
    /// and forwarded to `status`, which decides on a reduction of the global load step once
    /// the pass is complete.
    pub fn compute_state(
        &mut self,
        points: &mut [MaterialPointState<T>],
        dt: T,
        status: &LoadStepStatus,
    ) -> PassSummary {
        let Self {
            slip_systems,
            slip_families,
            elasticity,
            factory,
            minimizer,
            hardness_bound,
            trajectory,
            outcomes,
        } = self;

        let context = IntegratorContext {
            slip_systems,
            slip_families,
            elasticity,
            dt,
            minimizer,
            hardness_bound: *hardness_bound,
            status,
            trajectory: trajectory.as_ref(),
        };

        let factory = *factory;
        outcomes.resize(points.len(), PointOutcome::default());
        points
            .par_iter_mut()
            .zip(outcomes.par_iter_mut())
            .for_each(|(point, outcome)| {
                let mut integrator = factory.create(&context);
                integrator.update(point);
                *outcome = PointOutcome {
                    state: integrator.state().clone(),
                    norm_residual: integrator.norm_residual(),
                    num_iterations: integrator.num_iterations(),
                };
            });

        let summary = outcomes.iter().fold(
            PassSummary {
                num_points: points.len(),
                ..PassSummary::default()
            },
            |mut summary, outcome| {
                match outcome.state {
                    IntegratorState::Converged => summary.num_converged += 1,
                    IntegratorState::Failed(_) => summary.num_failed += 1,
                    _ => {}
                }
                summary.max_norm_residual = summary.max_norm_residual.max(outcome.norm_residual);
                summary.max_iterations = summary.max_iterations.max(outcome.num_iterations);
                summary
            },
        );
        debug!(
            "Crystal plasticity pass: {}/{} points converged, max residual {:e}, max iterations {}",
            summary.num_converged, summary.num_points, summary.max_norm_residual, summary.max_iterations
        );
        summary
    }
}
