use crate::minimizer::NonlinearSystem;
use cpmor_traits::Real;
use itertools::iterate;
use nalgebra::{DMatrix, DVector, DVectorView};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// The step strategy used by [`Minimizer`](crate::minimizer::Minimizer).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StepType {
    #[default]
    #[serde(rename = "Newton")]
    Newton,
    #[serde(rename = "Trust Region")]
    TrustRegion,
    #[serde(rename = "Conjugate Gradient")]
    ConjugateGradient,
    #[serde(rename = "Line Search Regularized")]
    LineSearchRegularized,
    #[serde(rename = "Newton with Line Search")]
    NewtonWithLineSearch,
}

impl StepType {
    pub const ALL: [StepType; 5] = [
        StepType::Newton,
        StepType::TrustRegion,
        StepType::ConjugateGradient,
        StepType::LineSearchRegularized,
        StepType::NewtonWithLineSearch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StepType::Newton => "Newton",
            StepType::TrustRegion => "Trust Region",
            StepType::ConjugateGradient => "Conjugate Gradient",
            StepType::LineSearchRegularized => "Line Search Regularized",
            StepType::NewtonWithLineSearch => "Newton with Line Search",
        }
    }
}

impl Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStepType(pub String);

impl Display for UnknownStepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown nonlinear solver step type \"{}\"", self.0)
    }
}

impl Error for UnknownStepType {}

impl FromStr for StepType {
    type Err = UnknownStepType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepType::ALL
            .iter()
            .copied()
            .find(|step_type| step_type.name() == s)
            .ok_or_else(|| UnknownStepType(s.to_string()))
    }
}

#[derive(Debug)]
pub enum MinimizerStepError {
    /// The residual Jacobian could not be factorized.
    SingularJacobian,
    /// The computed direction does not decrease the objective.
    NotDescentDirection,
    /// The line search failed to find an acceptable step length.
    LineSearchFailed(String),
    /// The trust region shrank below the resolution of the iterate.
    TrustRegionCollapsed,
    /// The nonlinear system could not be evaluated.
    SystemEvaluation(Box<dyn Error>),
}

impl Display for MinimizerStepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            MinimizerStepError::SingularJacobian => write!(f, "Residual Jacobian is singular."),
            MinimizerStepError::NotDescentDirection => write!(f, "Step direction is not a descent direction."),
            MinimizerStepError::LineSearchFailed(ref msg) => write!(f, "Line search failed. {}", msg),
            MinimizerStepError::TrustRegionCollapsed => write!(f, "Trust region radius collapsed."),
            MinimizerStepError::SystemEvaluation(ref err) => {
                write!(f, "Failed to evaluate nonlinear system. Error: {}", err)
            }
        }
    }
}

impl Error for MinimizerStepError {}

impl From<Box<dyn Error>> for MinimizerStepError {
    fn from(err: Box<dyn Error>) -> Self {
        MinimizerStepError::SystemEvaluation(err)
    }
}

/// Per-solve state of a step strategy.
#[derive(Debug, Clone)]
pub(crate) enum Step<T: Real> {
    Newton,
    NewtonWithLineSearch,
    TrustRegion { radius: T },
    ConjugateGradient { previous: Option<(DVector<T>, DVector<T>)> },
    LineSearchRegularized { regularization: T },
}

impl<T: Real> Step<T> {
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub(crate) fn new(step_type: StepType) -> Self {
        match step_type {
            StepType::Newton => Step::Newton,
            StepType::NewtonWithLineSearch => Step::NewtonWithLineSearch,
            StepType::TrustRegion => Step::TrustRegion { radius: 1.0 },
            StepType::ConjugateGradient => Step::ConjugateGradient { previous: None },
            StepType::LineSearchRegularized => Step::LineSearchRegularized { regularization: 1e-3 },
        }
    }

    /// Computes the increment to add to `x`, given the residual `r` at `x`.
    pub(crate) fn step<S>(&mut self, system: &S, x: &DVector<T>, r: &DVector<T>) -> Result<DVector<T>, MinimizerStepError>
    where
        S: ?Sized + NonlinearSystem<T>,
    {
        match self {
            Step::Newton => {
                let jacobian = system.hessian(DVectorView::from(x))?;
                newton_direction(jacobian, r)
            }
            Step::NewtonWithLineSearch => {
                let jacobian = system.hessian(DVectorView::from(x))?;
                let direction = newton_direction(jacobian, r)?;
                // For the exact Newton direction, grad(1/2 |r|^2)^T p = r^T J p = -|r|^2
                let slope = -r.norm_squared();
                backtracking_line_search(system, x, r, &direction, slope, T::one())
            }
            Step::TrustRegion { radius } => trust_region_step(radius, system, x, r),
            Step::ConjugateGradient { previous } => conjugate_gradient_step(previous, system, x, r),
            Step::LineSearchRegularized { regularization } => regularized_step(regularization, system, x, r),
        }
    }
}

fn newton_direction<T: Real>(jacobian: DMatrix<T>, r: &DVector<T>) -> Result<DVector<T>, MinimizerStepError> {
    jacobian
        .lu()
        .solve(&(-r))
        .filter(|direction| direction.iter().all(|d_i| d_i.is_finite()))
        .ok_or(MinimizerStepError::SingularJacobian)
}

/// Standard backtracking line search using the Armijo condition.
///
/// See Jorge & Nocedal (2006), Numerical Optimization, Chapter 3.1. The objective is
/// $g(x) = \frac{1}{2} \| r(x) \|^2$ and `slope` is its directional derivative along
/// `direction`. Returns the accepted increment.
#[replace_float_literals(T::from_f64(literal).unwrap())]
fn backtracking_line_search<T, S>(
    system: &S,
    x: &DVector<T>,
    r: &DVector<T>,
    direction: &DVector<T>,
    slope: T,
    initial_alpha: T,
) -> Result<DVector<T>, MinimizerStepError>
where
    T: Real,
    S: ?Sized + NonlinearSystem<T>,
{
    let c = 1e-4;
    let alpha_min = 1e-6;

    if !(slope < 0.0) {
        return Err(MinimizerStepError::NotDescentDirection);
    }

    let g_initial = 0.5 * r.norm_squared();

    // Start out with some alphas that don't decrease too quickly, then
    // start decreasing them much faster if the first few iterations don't let us
    // take a step.
    let initial_alphas = [1.0, 0.75, 0.5];
    let mut alpha_iter = initial_alphas
        .iter()
        .copied()
        .chain(iterate(0.25, |alpha_i| 0.25 * *alpha_i));

    let mut x_trial = x.clone();
    loop {
        let alpha_scale = alpha_iter.next().unwrap();
        let alpha = initial_alpha * alpha_scale;
        x_trial.copy_from(x);
        x_trial.axpy(alpha, direction, 1.0);

        // A failed evaluation counts as insufficient decrease
        if let Ok(g) = system.value(DVectorView::from(&x_trial)) {
            if g.is_finite() && g <= g_initial + c * alpha * slope {
                return Ok(direction * alpha);
            }
        }

        if alpha_scale < alpha_min {
            return Err(MinimizerStepError::LineSearchFailed(format!(
                "Alpha {} is smaller than minimum allowed alpha {}.",
                alpha_scale, alpha_min
            )));
        }
    }
}

/// Dogleg step on the Gauss-Newton model $m(p) = \frac{1}{2} \| r + J p \|^2$.
#[replace_float_literals(T::from_f64(literal).unwrap())]
fn trust_region_step<T, S>(
    radius: &mut T,
    system: &S,
    x: &DVector<T>,
    r: &DVector<T>,
) -> Result<DVector<T>, MinimizerStepError>
where
    T: Real,
    S: ?Sized + NonlinearSystem<T>,
{
    let max_radius = 100.0;
    let eta = 0.1;

    let jacobian = system.hessian(DVectorView::from(x))?;
    let g = jacobian.tr_mul(r);
    let g_norm = g.norm();
    if g_norm == 0.0 {
        return Ok(DVector::zeros(x.len()));
    }

    let jg_norm_squared = (&jacobian * &g).norm_squared();
    let cauchy = if jg_norm_squared > 0.0 {
        &g * (-(g_norm * g_norm) / jg_norm_squared)
    } else {
        &g * (-*radius / g_norm)
    };
    let newton = newton_direction(jacobian.clone(), r).ok();
    let p = dogleg(&cauchy, newton.as_ref(), *radius);

    let predicted = -g.dot(&p) - 0.5 * (&jacobian * &p).norm_squared();
    let current = 0.5 * r.norm_squared();
    let trial = x + &p;
    let rho = match system.value(DVectorView::from(&trial)) {
        Ok(value) if value.is_finite() && predicted > 0.0 => (current - value) / predicted,
        _ => -1.0,
    };

    let p_norm = p.norm();
    if rho < 0.25 {
        *radius = 0.25 * p_norm;
    } else if rho > 0.75 && p_norm >= 0.99 * *radius {
        *radius = (2.0 * *radius).min(max_radius);
    }

    if *radius <= T::default_epsilon() * x.norm().max(1.0) {
        return Err(MinimizerStepError::TrustRegionCollapsed);
    }

    if rho > eta {
        Ok(p)
    } else {
        // Rejected step, the iterate stays put while the region shrinks
        Ok(DVector::zeros(x.len()))
    }
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn dogleg<T: Real>(cauchy: &DVector<T>, newton: Option<&DVector<T>>, radius: T) -> DVector<T> {
    let cauchy_norm = cauchy.norm();
    match newton {
        Some(newton) if newton.norm() <= radius => newton.clone(),
        Some(newton) if cauchy_norm < radius => {
            // Find tau in [0, 1] such that |p_c + tau (p_n - p_c)| = radius
            let d = newton - cauchy;
            let a = d.norm_squared();
            let b = 2.0 * cauchy.dot(&d);
            let c = cauchy.norm_squared() - radius * radius;
            let tau = (-b + (b * b - 4.0 * a * c).max(0.0).sqrt()) / (2.0 * a);
            cauchy + d * tau
        }
        None if cauchy_norm <= radius => cauchy.clone(),
        _ => cauchy * (radius / cauchy_norm),
    }
}

/// Polak-Ribière nonlinear conjugate gradient on $\frac{1}{2} \| r(x) \|^2$.
///
/// The initial step length along each direction is the exact minimizer of the Gauss-Newton
/// model, which is then safeguarded by backtracking.
#[replace_float_literals(T::from_f64(literal).unwrap())]
fn conjugate_gradient_step<T, S>(
    previous: &mut Option<(DVector<T>, DVector<T>)>,
    system: &S,
    x: &DVector<T>,
    r: &DVector<T>,
) -> Result<DVector<T>, MinimizerStepError>
where
    T: Real,
    S: ?Sized + NonlinearSystem<T>,
{
    let jacobian = system.hessian(DVectorView::from(x))?;
    let g = jacobian.tr_mul(r);
    if g.norm() == 0.0 {
        return Ok(DVector::zeros(x.len()));
    }

    let steepest = -&g;
    let direction = match previous.as_ref() {
        Some((g_prev, d_prev)) => {
            let beta = (g.dot(&(&g - g_prev)) / g_prev.norm_squared()).max(0.0);
            let candidate = &steepest + d_prev * beta;
            // Restart along steepest descent if conjugacy is lost
            if g.dot(&candidate) < 0.0 && beta.is_finite() {
                candidate
            } else {
                steepest
            }
        }
        None => steepest,
    };

    let slope = g.dot(&direction);
    let curvature = (&jacobian * &direction).norm_squared();
    if !(curvature > 0.0) {
        return Err(MinimizerStepError::NotDescentDirection);
    }
    let alpha = -slope / curvature;
    let increment = backtracking_line_search(system, x, r, &direction, slope, alpha)?;
    *previous = Some((g, direction));
    Ok(increment)
}

/// Levenberg-Marquardt regularized Gauss-Newton direction, safeguarded by backtracking.
#[replace_float_literals(T::from_f64(literal).unwrap())]
fn regularized_step<T, S>(
    regularization: &mut T,
    system: &S,
    x: &DVector<T>,
    r: &DVector<T>,
) -> Result<DVector<T>, MinimizerStepError>
where
    T: Real,
    S: ?Sized + NonlinearSystem<T>,
{
    let jacobian = system.hessian(DVectorView::from(x))?;
    let g = jacobian.tr_mul(r);
    if g.norm() == 0.0 {
        return Ok(DVector::zeros(x.len()));
    }

    let normal = jacobian.tr_mul(&jacobian);
    let scale = normal.diagonal().amax().max(T::default_epsilon());
    let mut mu = *regularization;
    let mut direction = None;
    for _ in 0..12 {
        let mut regularized = normal.clone();
        for i in 0..regularized.nrows() {
            regularized[(i, i)] += mu * scale;
        }
        if let Some(cholesky) = regularized.cholesky() {
            direction = Some(cholesky.solve(&(-&g)));
            break;
        }
        mu *= 10.0;
    }
    let direction = direction.ok_or(MinimizerStepError::SingularJacobian)?;

    let slope = g.dot(&direction);
    let increment = backtracking_line_search(system, x, r, &direction, slope, T::one())?;
    *regularization = (0.5 * mu).max(1e-12);
    Ok(increment)
}
