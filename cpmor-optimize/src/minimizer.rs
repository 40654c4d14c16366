use crate::calculus::{approximate_jacobian_fd, finite_difference_step};
use crate::steps::{Step, StepType};
use cpmor_traits::Real;
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;

/// A square system of nonlinear equations $r(x) = 0$, posed as the minimization of
/// $\frac{1}{2} \| r(x) \|^2$.
///
/// Only the residual is mandatory. The residual Jacobian defaults to a central finite
/// difference approximation. Evaluation may fail (for example when the constitutive response
/// becomes non-finite), in which case the error is propagated to the solver, which then
/// reports failure instead of panicking.
pub trait NonlinearSystem<T: Real> {
    fn dimension(&self) -> usize;

    fn residual_into(&self, r: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;

    fn residual(&self, x: DVectorView<T>) -> Result<DVector<T>, Box<dyn Error>> {
        let mut r = DVector::zeros(self.dimension());
        self.residual_into(DVectorViewMut::from(&mut r), x)?;
        Ok(r)
    }

    /// The objective $\frac{1}{2} \| r(x) \|^2$.
    fn value(&self, x: DVectorView<T>) -> Result<T, Box<dyn Error>> {
        let r = self.residual(x)?;
        Ok(half::<T>() * r.norm_squared())
    }

    /// The residual, which plays the role of the gradient for the local solvers.
    fn gradient(&self, x: DVectorView<T>) -> Result<DVector<T>, Box<dyn Error>> {
        self.residual(x)
    }

    /// The Jacobian of the residual.
    fn hessian(&self, x: DVectorView<T>) -> Result<DMatrix<T>, Box<dyn Error>> {
        let mut failure = None;
        let mut x_work = x.clone_owned();
        let h = finite_difference_step(x);
        let jacobian = approximate_jacobian_fd(
            self.dimension(),
            |x, r| {
                if failure.is_none() {
                    if let Err(err) = self.residual_into(r, x) {
                        failure = Some(err);
                    }
                }
            },
            &mut x_work,
            h,
        );
        match failure {
            Some(err) => Err(err),
            None => Ok(jacobian),
        }
    }
}

impl<'a, T, S> NonlinearSystem<T> for &'a S
where
    T: Real,
    S: ?Sized + NonlinearSystem<T>,
{
    fn dimension(&self) -> usize {
        S::dimension(self)
    }

    fn residual_into(&self, r: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        S::residual_into(self, r, x)
    }

    fn hessian(&self, x: DVectorView<T>) -> Result<DMatrix<T>, Box<dyn Error>> {
        S::hessian(self, x)
    }
}

fn half<T: Real>() -> T {
    T::from_f64(0.5).expect("Literal must fit in T")
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MinimizerSettings<T> {
    pub relative_tolerance: T,
    pub absolute_tolerance: T,
    pub max_iterations: usize,
    pub min_iterations: usize,
}

impl<T: Real> Default for MinimizerSettings<T> {
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn default() -> Self {
        Self {
            relative_tolerance: 1.0e-6,
            absolute_tolerance: 1.0e-10,
            max_iterations: 100,
            min_iterations: 2,
        }
    }
}

impl<T: Real> MinimizerSettings<T> {
    /// Whether a residual of norm `norm` is converged, given the norm of the initial residual.
    pub fn is_converged(&self, norm: T, initial_norm: T, iterations: usize) -> bool {
        // An exactly vanishing residual cannot be improved upon
        if norm == T::zero() {
            return true;
        }
        let relative = if initial_norm > T::zero() {
            norm / initial_norm
        } else {
            T::zero()
        };
        let tolerance_met = norm <= self.absolute_tolerance || relative <= self.relative_tolerance;
        tolerance_met && iterations >= self.min_iterations
    }
}

/// Outcome of a local minimization.
///
/// `failed` signals a breakdown (non-finite residual, singular system, failed line search),
/// while `converged == false && failed == false` means that the iteration budget ran out.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerResult<T> {
    pub converged: bool,
    pub failed: bool,
    pub failure_message: String,
    pub iterations: usize,
    pub final_value: T,
}

impl<T: Scalar + Copy> MinimizerResult<T> {
    pub(crate) fn new(initial_value: T) -> Self {
        Self {
            converged: false,
            failed: false,
            failure_message: String::new(),
            iterations: 0,
            final_value: initial_value,
        }
    }

    pub(crate) fn fail(mut self, message: impl Into<String>) -> Self {
        self.failed = true;
        self.converged = false;
        self.failure_message = message.into();
        self
    }
}

/// Generic minimizer for small dense nonlinear systems, dispatching on the configured step type.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimizer<T> {
    pub settings: MinimizerSettings<T>,
    pub step_type: StepType,
}

impl<T: Real> Minimizer<T> {
    pub fn new(settings: MinimizerSettings<T>, step_type: StepType) -> Self {
        Self { settings, step_type }
    }

    /// Minimizes $\frac{1}{2} \| r(x) \|^2$ starting from the initial guess stored in `x`.
    ///
    /// On return, `x` holds the last accepted iterate, regardless of convergence.
    pub fn minimize<S>(&self, system: &S, x: &mut DVector<T>) -> MinimizerResult<T>
    where
        S: ?Sized + NonlinearSystem<T>,
    {
        assert_eq!(x.len(), system.dimension(), "Initial guess must match system dimension.");

        let mut result = MinimizerResult::new(T::zero());
        let mut r = match system.gradient(DVectorView::from(&*x)) {
            Ok(r) => r,
            Err(err) => return result.fail(format!("Residual evaluation failed: {}", err)),
        };
        let initial_norm = r.norm();
        let mut step = Step::new(self.step_type);

        loop {
            let norm = r.norm();
            result.final_value = half::<T>() * norm * norm;
            if !norm.is_finite() {
                let message = format!(
                    "Non-finite residual after {} iterations ({} step)",
                    result.iterations, self.step_type
                );
                return result.fail(message);
            }

            if self
                .settings
                .is_converged(norm, initial_norm, result.iterations)
            {
                result.converged = true;
                break;
            }

            if result.iterations >= self.settings.max_iterations {
                debug!(
                    "Minimizer ({}) reached maximum number of iterations ({}) with residual norm {}",
                    self.step_type, self.settings.max_iterations, norm
                );
                break;
            }

            match step.step(system, &*x, &r) {
                Ok(dx) => *x += dx,
                Err(err) => return result.fail(format!("{} step failed: {}", self.step_type, err)),
            }
            result.iterations += 1;

            r = match system.gradient(DVectorView::from(&*x)) {
                Ok(r) => r,
                Err(err) => {
                    let message = format!("Residual evaluation failed at iteration {}: {}", result.iterations, err);
                    return result.fail(message);
                }
            };
            debug!(
                "Minimizer ({}) iteration {}: residual norm {}",
                self.step_type,
                result.iterations,
                r.norm()
            );
        }

        result
    }
}
