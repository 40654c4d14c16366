use crate::io::market::{write_csr_to_file, write_dense_to_file};
use crate::rom::args::{InArgs, ModelEvaluator, ModelSupport, OutArgs};
use crate::rom::checks::{check_jacobian_nonsingular, check_residual_finite};
use crate::rom::config::RomParameters;
use crate::rom::dirichlet::{apply_to_reduced_jacobian, DirichletConditions, NodeSets};
use crate::rom::operator_factory::ReducedOperatorFactory;
use crate::rom::preconditioner::{PreconditionerCache, PreconditionerMode, RecomputePolicy};
use crate::rom::space::ReducedSpace;
use crate::rom::RomError;
use cpmor_traits::Real;
use eyre::{eyre, WrapErr};
use log::{info, log, Level};
use nalgebra::storage::Storage;
use nalgebra::{DMatrix, DVector, Dim, Matrix};
use nalgebra_sparse::CsrMatrix;
use std::mem;

/// Running counts of the evaluator's work, also used to index diagnostic output.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EvaluationCounters {
    pub calls: usize,
    /// Continuation steps, advanced by evaluations that request neither residual nor Jacobian.
    pub step: usize,
    /// Jacobian evaluations within the current step.
    pub iteration: usize,
    pub solutions: usize,
    pub residuals: usize,
    pub jacobians: usize,
    pub preconditioners: usize,
}

/// A model evaluator in reduced coordinates, wrapping a full-order model with a sparse
/// Jacobian.
///
/// Every evaluation expands the reduced state, evaluates the full-order model and projects
/// the requested outputs. The reduced Jacobian is dense.
#[derive(Debug)]
pub struct ReducedOrderModelEvaluator<T: Real, M> {
    full_order_model: M,
    space: ReducedSpace<T>,
    factory: ReducedOperatorFactory<T>,
    preconditioner: PreconditionerCache<T>,
    dirichlet: DirichletConditions<T>,
    parameters: RomParameters,
    x_init: Option<DVector<T>>,
    x_dot_init: Option<DVector<T>>,
    prev_time: Option<T>,
    counters: EvaluationCounters,
}

impl<T, M> ReducedOrderModelEvaluator<T, M>
where
    T: Real,
    M: ModelEvaluator<T, Jacobian = CsrMatrix<T>>,
{
    pub fn new(
        full_order_model: M,
        space: ReducedSpace<T>,
        factory: ReducedOperatorFactory<T>,
        parameters: RomParameters,
        node_sets: &(impl ?Sized + NodeSets),
    ) -> eyre::Result<Self> {
        let support = full_order_model.support();
        let check_dim = |context: &'static str, expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(RomError::DimensionMismatch {
                    context,
                    expected,
                    actual,
                })
            }
        };
        check_dim("reduced space", support.state_dim, space.full_dim())?;
        check_dim("right basis of operator factory", space.basis().nrows(), factory.right_basis().nrows())?;
        check_dim("reduced dimension of operator factory", space.reduced_dim(), factory.reduced_dim())?;
        if parameters.num_dbc_modes > space.reduced_dim() {
            return Err(eyre!(
                "number of DBC modes ({}) exceeds the reduced dimension ({})",
                parameters.num_dbc_modes,
                space.reduced_dim()
            ));
        }

        let dirichlet = DirichletConditions::from_parameters(&parameters.dirichlet, node_sets)
            .wrap_err("failed to set up Dirichlet conditions")?;
        if let Some(max_row) = dirichlet.max_row() {
            if max_row >= support.state_dim {
                return Err(eyre!(
                    "Dirichlet row {} is out of bounds for a model with {} degrees of freedom",
                    max_row,
                    support.state_dim
                ));
            }
        }

        info!(
            "Reduced-order model: {} projection onto {} modes, preconditioner {}",
            factory.projection().name(),
            space.reduced_dim(),
            parameters.preconditioner
        );

        let preconditioner = PreconditionerCache::new(parameters.preconditioner, parameters.recompute_policy);
        let mut evaluator = Self {
            full_order_model,
            space,
            factory,
            preconditioner,
            dirichlet,
            parameters,
            x_init: None,
            x_dot_init: None,
            prev_time: None,
            counters: EvaluationCounters::default(),
        };
        evaluator.reset_initial_values();
        Ok(evaluator)
    }

    /// Recomputes the reduced initial values from those of the full-order model.
    pub fn reset_initial_values(&mut self) {
        self.x_init = self
            .full_order_model
            .x_init()
            .map(|x| self.space.reduction(x));
        self.x_dot_init = self
            .full_order_model
            .x_dot_init()
            .map(|x_dot| self.space.increment_reduction(x_dot));
    }

    pub fn full_order_model(&self) -> &M {
        &self.full_order_model
    }

    pub fn full_order_model_mut(&mut self) -> &mut M {
        &mut self.full_order_model
    }

    pub fn space(&self) -> &ReducedSpace<T> {
        &self.space
    }

    pub fn factory(&self) -> &ReducedOperatorFactory<T> {
        &self.factory
    }

    pub fn preconditioner(&self) -> &PreconditionerCache<T> {
        &self.preconditioner
    }

    pub fn dirichlet(&self) -> &DirichletConditions<T> {
        &self.dirichlet
    }

    pub fn parameters(&self) -> &RomParameters {
        &self.parameters
    }

    pub fn counters(&self) -> EvaluationCounters {
        self.counters
    }

    fn trace_level(&self) -> Level {
        if self.parameters.output.trace {
            Level::Info
        } else {
            Level::Debug
        }
    }

    fn dump_dense<R, C, S>(&self, name: &str, index: usize, matrix: &Matrix<T, R, C, S>) -> eyre::Result<()>
    where
        R: Dim,
        C: Dim,
        S: Storage<T, R, C>,
    {
        let path = self
            .parameters
            .output_directory
            .join(format!("{}{}.mm", name, index));
        log!(self.trace_level(), "Writing {}", path.display());
        write_dense_to_file(path, matrix)
    }

    fn dump_csr(&self, name: &str, index: usize, matrix: &CsrMatrix<T>) -> eyre::Result<()> {
        let path = self
            .parameters
            .output_directory
            .join(format!("{}{}.mm", name, index));
        log!(self.trace_level(), "Writing {}", path.display());
        write_csr_to_file(path, matrix)
    }

    /// Enforces Dirichlet conditions and checks the full Jacobian, then rebuilds the
    /// preconditioner if needed.
    fn process_full_jacobian(&mut self, jacobian: &mut CsrMatrix<T>) -> eyre::Result<()> {
        let enforce_bcs = !self.parameters.full_order_applies_bcs;
        let precondition_full = self.parameters.precondition_full_jacobian;

        if enforce_bcs && !precondition_full {
            self.dirichlet.apply_to_csr(jacobian)?;
        }
        if self.parameters.run_singular_check {
            check_jacobian_nonsingular(jacobian, &self.parameters.output_directory, self.counters.jacobians + 1)?;
        }
        self.factory.full_jacobian_is(jacobian);
        self.counters.jacobians += 1;
        if self.parameters.output.jacobian {
            self.dump_csr("J", self.counters.jacobians, jacobian)?;
        }

        if self.preconditioner.needs_recompute() {
            log!(
                self.trace_level(),
                "Recomputing {} preconditioner (call {})",
                self.preconditioner.mode(),
                self.counters.calls
            );
            let explicit_dirichlet = precondition_full.then_some(&self.dirichlet);
            self.preconditioner
                .recompute(jacobian, explicit_dirichlet)
                .wrap_err_with(|| format!("failed to build {} preconditioner", self.preconditioner.mode()))?;
            self.counters.preconditioners += 1;
            if self.parameters.output.preconditioner {
                if let Some(m) = self.preconditioner.matrix() {
                    self.dump_dense("M", self.counters.jacobians, m)?;
                }
            }
        }

        if enforce_bcs && precondition_full {
            self.dirichlet.apply_to_csr(jacobian)?;
        }
        Ok(())
    }

    /// Preconditions the working copies of $J \Phi$ and $L$.
    fn precondition_bases(&mut self) -> eyre::Result<()> {
        if self.parameters.output.jacobian {
            self.dump_dense("Phi", self.counters.jacobians, self.factory.right_basis())?;
            self.dump_dense("JPhi", self.counters.jacobians, self.factory.premultiplied_basis())?;
            self.dump_dense("Psi", self.counters.jacobians, self.factory.left_basis())?;
        }
        if !self.preconditioner.mode().preconditions_bases() {
            return Ok(());
        }
        self.preconditioner
            .apply_to_columns(self.factory.premultiplied_basis_mut())?;
        self.preconditioner
            .apply_to_columns(self.factory.left_basis_mut())?;
        if self.parameters.output.preconditioner {
            self.dump_dense("MJPhi", self.counters.jacobians, self.factory.premultiplied_basis())?;
            self.dump_dense("MPsi", self.counters.jacobians, self.factory.left_basis())?;
        }
        Ok(())
    }

    /// Projects the full residual `f` into `f_r`.
    fn project_residual(&mut self, f: &mut DVector<T>, f_r: &mut DVector<T>, full_jacobian: bool) -> eyre::Result<()> {
        if !self.parameters.full_order_applies_bcs {
            self.dirichlet.apply_to_vector(f);
        }
        if self.parameters.run_nan_check {
            check_residual_finite(f, &self.parameters.output_directory, self.counters.residuals + 1)?;
        }
        self.counters.residuals += 1;
        log!(
            self.trace_level(),
            "Full residual norm {} (residual {})",
            f.norm(),
            self.counters.residuals
        );
        if self.parameters.output.residual {
            self.dump_dense("R", self.counters.residuals, &*f)?;
        }

        // The Dirichlet modes keep the unpreconditioned projection
        let unpreconditioned = self.space.linear_reduction(f);

        let mode = self.preconditioner.mode();
        if full_jacobian && mode != PreconditionerMode::None {
            self.preconditioner.apply(f)?;
            log!(self.trace_level(), "Preconditioned residual norm {}", f.norm());
            if self.parameters.output.preconditioner {
                self.dump_dense("MR", self.counters.residuals, &*f)?;
            }
        }

        *f_r = match mode {
            PreconditionerMode::ProjectedSolution => self.factory.right_projection(f),
            _ => self.factory.left_projection(f),
        };
        let num_dbc_modes = self.parameters.num_dbc_modes.min(f_r.len());
        f_r.rows_mut(0, num_dbc_modes)
            .copy_from(&unpreconditioned.rows(0, num_dbc_modes));

        log!(self.trace_level(), "Reduced residual norm {}", f_r.norm());
        if self.parameters.output.residual {
            self.dump_dense("Rr", self.counters.residuals, &*f_r)?;
        }
        Ok(())
    }

    fn project_jacobian(&self, jacobian_r: &mut DMatrix<T>) -> eyre::Result<()> {
        *jacobian_r = match self.preconditioner.mode() {
            PreconditionerMode::ProjectedSolution => {
                let n_r = self.space.reduced_dim();
                DMatrix::identity(n_r, n_r)
            }
            _ => self.factory.reduced_jacobian(),
        };
        let index = self.counters.calls;
        if self.parameters.output.jacobian {
            self.dump_dense("Jr_pre", index, &*jacobian_r)?;
        }
        apply_to_reduced_jacobian(jacobian_r, self.parameters.num_dbc_modes, self.dirichlet.has_soft());
        if self.parameters.output.jacobian {
            self.dump_dense("Jr", index, &*jacobian_r)?;
        }
        Ok(())
    }
}

impl<T, M> ModelEvaluator<T> for ReducedOrderModelEvaluator<T, M>
where
    T: Real,
    M: ModelEvaluator<T, Jacobian = CsrMatrix<T>>,
{
    type Jacobian = DMatrix<T>;

    fn support(&self) -> ModelSupport {
        ModelSupport {
            state_dim: self.space.reduced_dim(),
            ..self.full_order_model.support()
        }
    }

    fn x_init(&self) -> Option<&DVector<T>> {
        self.x_init.as_ref()
    }

    fn x_dot_init(&self) -> Option<&DVector<T>> {
        self.x_dot_init.as_ref()
    }

    fn create_jacobian(&self) -> DMatrix<T> {
        let n_r = self.space.reduced_dim();
        DMatrix::zeros(n_r, n_r)
    }

    fn eval_model(&mut self, in_args: &mut InArgs<T>, out_args: &mut OutArgs<T, DMatrix<T>>) -> eyre::Result<()> {
        self.counters.calls += 1;
        let level = self.trace_level();
        log!(level, "Reduced-order model evaluation, call {}", self.counters.calls);

        if in_args.x.len() != self.space.reduced_dim() {
            return Err(RomError::DimensionMismatch {
                context: "reduced state",
                expected: self.space.reduced_dim(),
                actual: in_args.x.len(),
            }
            .into());
        }

        let mut full_in_args = InArgs {
            x: self.space.expansion(&in_args.x),
            x_dot: in_args
                .x_dot
                .as_ref()
                .map(|x_dot| self.space.linear_expansion(x_dot)),
            t: in_args.t,
            alpha: in_args.alpha,
            beta: in_args.beta,
            p: in_args.p.clone(),
        };
        self.counters.solutions += 1;
        if self.parameters.output.solution {
            self.dump_dense("xr", self.counters.solutions, &in_args.x)?;
            self.dump_dense("x", self.counters.solutions, &full_in_args.x)?;
        }

        let support = self.full_order_model.support();
        let residual_requested = support.residual && out_args.residual_requested();
        let jacobian_requested = support.jacobian && out_args.jacobian_requested();
        log!(
            level,
            "Call {} (step {}, iteration {}): residual requested: {}, Jacobian requested: {}",
            self.counters.calls,
            self.counters.step,
            self.counters.iteration,
            residual_requested,
            jacobian_requested
        );

        if out_args.any_response_requested() && self.preconditioner.mode().preconditions_bases() {
            self.preconditioner.mark_dirty();
        }

        let projection_requested = residual_requested || out_args.any_df_dp_requested();
        let skip_initial_jacobian = self.counters.step == 0 && self.parameters.thermo_mechanical;
        let full_jacobian_required = self
            .factory
            .full_jacobian_required(projection_requested, jacobian_requested)
            && !skip_initial_jacobian;

        let n = support.state_dim;
        let full_derivative = |reduced: &Option<DMatrix<T>>| reduced.as_ref().map(|d| DMatrix::zeros(n, d.ncols()));
        let mut full_out_args: OutArgs<T, CsrMatrix<T>> = OutArgs {
            f: residual_requested.then(|| DVector::zeros(n)),
            jacobian: full_jacobian_required.then(|| self.full_order_model.create_jacobian()),
            g: mem::take(&mut out_args.g),
            dg_dx: out_args.dg_dx.iter().map(&full_derivative).collect(),
            dg_dx_dot: out_args.dg_dx_dot.iter().map(&full_derivative).collect(),
            df_dp: out_args.df_dp.iter().map(&full_derivative).collect(),
            dg_dp: mem::take(&mut out_args.dg_dp),
        };

        let result = self
            .full_order_model
            .eval_model(&mut full_in_args, &mut full_out_args)
            .wrap_err_with(|| format!("full-order model evaluation failed (call {})", self.counters.calls));
        // Responses and their parameter derivatives are passed through unchanged
        out_args.g = mem::take(&mut full_out_args.g);
        out_args.dg_dp = mem::take(&mut full_out_args.dg_dp);
        result?;

        // Soft conditions prescribe state entries, which must be reflected in the reduced state
        if self.dirichlet.has_soft() && self.prev_time != Some(in_args.t) {
            in_args.x = self.space.reduction(&full_in_args.x);
            self.prev_time = Some(in_args.t);
            if self.parameters.output.solution {
                self.dump_dense("xr_post", self.counters.solutions, &in_args.x)?;
                self.dump_dense("x_post", self.counters.solutions, &full_in_args.x)?;
            }
        }

        if full_jacobian_required {
            let mut jacobian = full_out_args
                .jacobian
                .take()
                .ok_or_else(|| eyre!("full-order model did not provide the requested Jacobian"))?;
            self.process_full_jacobian(&mut jacobian)?;
            self.precondition_bases()?;
        }

        if residual_requested {
            let (Some(f), Some(f_r)) = (full_out_args.f.as_mut(), out_args.f.as_mut()) else {
                return Err(eyre!("full-order model did not provide the requested residual"));
            };
            self.project_residual(f, f_r, full_jacobian_required)?;
        }

        if jacobian_requested {
            if let Some(jacobian_r) = out_args.jacobian.as_mut() {
                self.project_jacobian(jacobian_r)?;
            }
        }

        for (reduced, full) in out_args.dg_dx.iter_mut().zip(&full_out_args.dg_dx) {
            if let (Some(reduced), Some(full)) = (reduced.as_mut(), full) {
                *reduced = self.space.linear_reduction_columns(full);
            }
        }
        for (reduced, full) in out_args.dg_dx_dot.iter_mut().zip(&full_out_args.dg_dx_dot) {
            if let (Some(reduced), Some(full)) = (reduced.as_mut(), full) {
                *reduced = self.space.linear_reduction_columns(full);
            }
        }
        for (reduced, full) in out_args.df_dp.iter_mut().zip(&full_out_args.df_dp) {
            if let (Some(reduced), Some(full)) = (reduced.as_mut(), full) {
                *reduced = self.factory.left_projection_columns(full);
            }
        }

        if jacobian_requested {
            self.counters.iteration += 1;
        }
        if !residual_requested && !jacobian_requested {
            self.counters.step += 1;
            self.counters.iteration = 0;
            if self.preconditioner.policy() == RecomputePolicy::StepStart {
                self.preconditioner.mark_dirty();
            }
        }
        log!(level, "Reduced-order model evaluation done, call {}", self.counters.calls);
        Ok(())
    }
}
