//! Projected Gauss-Newton method for nonlinear least-squares problems with box constraints.
use crate::minimizer::{MinimizerResult, MinimizerSettings, NonlinearSystem};
use cpmor_traits::Real;
use itertools::{iterate, izip};
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView};
use numeric_literals::replace_float_literals;

/// Lower and upper bounds for each component of the unknown vector.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxConstraints<T: Real> {
    pub lower: DVector<T>,
    pub upper: DVector<T>,
}

impl<T: Real> BoxConstraints<T> {
    pub fn new(lower: DVector<T>, upper: DVector<T>) -> Self {
        assert_eq!(lower.len(), upper.len(), "Bounds must have the same dimension.");
        assert!(
            izip!(lower.iter(), upper.iter()).all(|(l, u)| l <= u),
            "Lower bounds must not exceed upper bounds."
        );
        Self { lower, upper }
    }

    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    pub fn project(&self, x: &mut DVector<T>) {
        for (x_i, &l, &u) in izip!(x.iter_mut(), self.lower.iter(), self.upper.iter()) {
            *x_i = x_i.clamp(l, u);
        }
    }

    /// Whether the interval of component `i` is too narrow to resolve, so that the component
    /// is effectively fixed.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn is_fixed(&self, i: usize) -> bool {
        let (l, u) = (self.lower[i], self.upper[i]);
        u - l <= T::default_epsilon() * l.abs().max(u.abs()).max(1.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundedSettings<T> {
    pub minimizer: MinimizerSettings<T>,
    /// Tolerance on the norm of the projected gradient.
    pub gradient_tolerance: T,
    /// Tolerance on the norm of the accepted increment.
    pub step_tolerance: T,
}

impl<T: Real> Default for BoundedSettings<T> {
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn default() -> Self {
        Self {
            minimizer: MinimizerSettings {
                max_iterations: 128,
                ..MinimizerSettings::default()
            },
            gradient_tolerance: 1e-16,
            step_tolerance: 1e-16,
        }
    }
}

/// Minimizes $\frac{1}{2} \| r(x) \|^2$ subject to `lower <= x <= upper`.
///
/// Each iteration solves the Gauss-Newton system restricted to the free variables (those not
/// held at a bound by the gradient, and not confined to a degenerate interval), followed by a
/// backtracking search along the projected path $P(x + \alpha d)$.
///
/// The initial guess is projected onto the feasible set before the first iteration.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn minimize_bounded<T, S>(
    system: &S,
    x: &mut DVector<T>,
    bounds: &BoxConstraints<T>,
    settings: &BoundedSettings<T>,
) -> MinimizerResult<T>
where
    T: Real,
    S: ?Sized + NonlinearSystem<T>,
{
    let n = system.dimension();
    assert_eq!(x.len(), n, "Initial guess must match system dimension.");
    assert_eq!(bounds.dimension(), n, "Bounds must match system dimension.");

    let mut result = MinimizerResult::new(0.0);
    bounds.project(x);

    let mut r = match system.residual(DVectorView::from(&*x)) {
        Ok(r) => r,
        Err(err) => return result.fail(format!("Residual evaluation failed: {}", err)),
    };
    let initial_norm = r.norm();

    loop {
        let norm = r.norm();
        result.final_value = 0.5 * norm * norm;
        if !norm.is_finite() {
            let message = format!(
                "Non-finite residual after {} iterations (bound-constrained solve)",
                result.iterations
            );
            return result.fail(message);
        }

        let jacobian = match system.hessian(DVectorView::from(&*x)) {
            Ok(jacobian) => jacobian,
            Err(err) => return result.fail(format!("Jacobian evaluation failed: {}", err)),
        };
        let gradient = jacobian.tr_mul(&r);

        let mut projected = &*x - &gradient;
        bounds.project(&mut projected);
        let projected_gradient_norm = (&*x - projected).norm();

        let settings_met = settings
            .minimizer
            .is_converged(norm, initial_norm, result.iterations)
            || (projected_gradient_norm <= settings.gradient_tolerance
                && result.iterations >= settings.minimizer.min_iterations);
        if settings_met {
            result.converged = true;
            break;
        }

        if result.iterations >= settings.minimizer.max_iterations {
            debug!(
                "Bound-constrained solve reached maximum number of iterations ({}) with residual norm {}",
                settings.minimizer.max_iterations, norm
            );
            break;
        }

        let free: Vec<usize> = (0..n)
            .filter(|&i| !is_active(bounds, x, &gradient, i))
            .collect();
        let direction = match free_gauss_newton_direction(&jacobian, &r, &free, n) {
            Some(direction) => direction,
            None => return result.fail("Reduced Gauss-Newton system is singular"),
        };

        let x_new = match projected_search(system, x, &r, &gradient, &direction, bounds) {
            Some(x_new) => x_new,
            None => return result.fail("Projected line search failed to decrease the objective"),
        };
        let step_norm = (&x_new - &*x).norm();
        x.copy_from(&x_new);
        result.iterations += 1;

        r = match system.residual(DVectorView::from(&*x)) {
            Ok(r) => r,
            Err(err) => {
                let message = format!("Residual evaluation failed at iteration {}: {}", result.iterations, err);
                return result.fail(message);
            }
        };
        debug!(
            "Bound-constrained iteration {}: residual norm {}, step norm {}",
            result.iterations,
            r.norm(),
            step_norm
        );

        if step_norm <= settings.step_tolerance && result.iterations >= settings.minimizer.min_iterations {
            result.final_value = 0.5 * r.norm_squared();
            result.converged = r.norm().is_finite();
            break;
        }
    }

    result
}

fn is_active<T: Real>(bounds: &BoxConstraints<T>, x: &DVector<T>, gradient: &DVector<T>, i: usize) -> bool {
    let at_lower = x[i] <= bounds.lower[i] && gradient[i] > T::zero();
    let at_upper = x[i] >= bounds.upper[i] && gradient[i] < T::zero();
    bounds.is_fixed(i) || at_lower || at_upper
}

/// Solves $(J_F^T J_F) d_F = -J_F^T r$ on the free set $F$, with $d = 0$ elsewhere.
#[replace_float_literals(T::from_f64(literal).unwrap())]
fn free_gauss_newton_direction<T: Real>(
    jacobian: &DMatrix<T>,
    r: &DVector<T>,
    free: &[usize],
    n: usize,
) -> Option<DVector<T>> {
    let mut direction = DVector::zeros(n);
    if free.is_empty() {
        return Some(direction);
    }

    let jacobian_free = jacobian.select_columns(free);
    let normal = jacobian_free.tr_mul(&jacobian_free);
    let rhs = -jacobian_free.tr_mul(r);
    let scale = normal.diagonal().amax();

    // Fall back on a slightly regularized system if the normal equations are rank deficient
    let direction_free = normal
        .clone()
        .cholesky()
        .map(|cholesky| cholesky.solve(&rhs))
        .or_else(|| {
            let mut regularized = normal;
            for i in 0..regularized.nrows() {
                regularized[(i, i)] += 1e-12 * scale.max(1.0);
            }
            regularized.cholesky().map(|cholesky| cholesky.solve(&rhs))
        })?;

    for (&i, &d_i) in izip!(free, direction_free.iter()) {
        direction[i] = d_i;
    }
    direction.iter().all(|d_i| d_i.is_finite()).then_some(direction)
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn projected_search<T, S>(
    system: &S,
    x: &DVector<T>,
    r: &DVector<T>,
    gradient: &DVector<T>,
    direction: &DVector<T>,
    bounds: &BoxConstraints<T>,
) -> Option<DVector<T>>
where
    T: Real,
    S: ?Sized + NonlinearSystem<T>,
{
    let c = 1e-4;
    let alpha_min = 1e-6;
    let g_initial = 0.5 * r.norm_squared();

    let initial_alphas = [1.0, 0.75, 0.5];
    let mut alpha_iter = initial_alphas
        .iter()
        .copied()
        .chain(iterate(0.25, |alpha_i| 0.25 * *alpha_i));

    loop {
        let alpha = alpha_iter.next().unwrap();
        let mut x_trial = x + direction * alpha;
        bounds.project(&mut x_trial);

        let decrease = gradient.dot(&(&x_trial - x));
        if let Ok(g) = system.value(DVectorView::from(&x_trial)) {
            if g.is_finite() && g <= g_initial + c * decrease {
                return Some(x_trial);
            }
        }

        if alpha < alpha_min {
            return None;
        }
    }
}
