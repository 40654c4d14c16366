//! Input and output arguments of model evaluators.
//!
//! Outputs are requested by passing `Some(buffer)`. An evaluator writes its results into the
//! requested buffers and leaves the others untouched.
use cpmor_traits::Real;
use nalgebra::{DMatrix, DVector, Scalar};

/// Capabilities and dimensions of a model evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelSupport {
    pub state_dim: usize,
    pub residual: bool,
    pub jacobian: bool,
    pub x_dot: bool,
    pub parameter_dims: Vec<usize>,
    pub response_dims: Vec<usize>,
}

impl ModelSupport {
    pub fn num_parameters(&self) -> usize {
        self.parameter_dims.len()
    }

    pub fn num_responses(&self) -> usize {
        self.response_dims.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InArgs<T: Scalar> {
    pub x: DVector<T>,
    pub x_dot: Option<DVector<T>>,
    pub t: T,
    /// Coefficient of $\partial f / \partial \dot{x}$ in the Jacobian.
    pub alpha: T,
    /// Coefficient of $\partial f / \partial x$ in the Jacobian.
    pub beta: T,
    pub p: Vec<DVector<T>>,
}

impl<T: Real> InArgs<T> {
    /// Arguments for the state `x` at time zero, with the Jacobian $\partial f / \partial x$.
    pub fn new(x: DVector<T>) -> Self {
        Self {
            x,
            x_dot: None,
            t: T::zero(),
            alpha: T::zero(),
            beta: T::one(),
            p: Vec::new(),
        }
    }

    pub fn with_time(mut self, t: T) -> Self {
        self.t = t;
        self
    }

    pub fn with_x_dot(mut self, x_dot: DVector<T>) -> Self {
        self.x_dot = Some(x_dot);
        self
    }
}

/// Requested outputs.
///
/// Derivatives of responses with respect to the state are stored transposed, one column per
/// response component (`dg_dx[j]` is `state_dim x response_dim`). Parameter derivatives of the
/// residual are stored one column per parameter component.
#[derive(Debug, Clone, PartialEq)]
pub struct OutArgs<T: Scalar, J> {
    pub f: Option<DVector<T>>,
    pub jacobian: Option<J>,
    pub g: Vec<Option<DVector<T>>>,
    pub dg_dx: Vec<Option<DMatrix<T>>>,
    pub dg_dx_dot: Vec<Option<DMatrix<T>>>,
    pub df_dp: Vec<Option<DMatrix<T>>>,
    /// Indexed as `dg_dp[response][parameter]`.
    pub dg_dp: Vec<Vec<Option<DMatrix<T>>>>,
}

impl<T: Scalar, J> Default for OutArgs<T, J> {
    fn default() -> Self {
        Self {
            f: None,
            jacobian: None,
            g: Vec::new(),
            dg_dx: Vec::new(),
            dg_dx_dot: Vec::new(),
            df_dp: Vec::new(),
            dg_dp: Vec::new(),
        }
    }
}

impl<T: Real, J> OutArgs<T, J> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_residual(mut self, dim: usize) -> Self {
        self.f = Some(DVector::zeros(dim));
        self
    }

    pub fn with_jacobian(mut self, jacobian: J) -> Self {
        self.jacobian = Some(jacobian);
        self
    }

    pub fn residual_requested(&self) -> bool {
        self.f.is_some()
    }

    pub fn jacobian_requested(&self) -> bool {
        self.jacobian.is_some()
    }

    pub fn any_response_requested(&self) -> bool {
        self.g.iter().any(Option::is_some)
    }

    pub fn any_df_dp_requested(&self) -> bool {
        self.df_dp.iter().any(Option::is_some)
    }
}

/// A model $f(\dot{x}, x, p, t) = 0$ with responses $g(x, p)$.
pub trait ModelEvaluator<T: Real> {
    type Jacobian;

    fn support(&self) -> ModelSupport;

    fn x_init(&self) -> Option<&DVector<T>>;

    fn x_dot_init(&self) -> Option<&DVector<T>>;

    /// A Jacobian with the structure the evaluator fills in.
    fn create_jacobian(&self) -> Self::Jacobian;

    /// Evaluates all requested outputs.
    ///
    /// The input is mutable because models with soft Dirichlet conditions overwrite the
    /// prescribed entries of the state.
    fn eval_model(&mut self, in_args: &mut InArgs<T>, out_args: &mut OutArgs<T, Self::Jacobian>) -> eyre::Result<()>;
}

impl<T, M> ModelEvaluator<T> for Box<M>
where
    T: Real,
    M: ?Sized + ModelEvaluator<T>,
{
    type Jacobian = M::Jacobian;

    fn support(&self) -> ModelSupport {
        M::support(self)
    }

    fn x_init(&self) -> Option<&DVector<T>> {
        M::x_init(self)
    }

    fn x_dot_init(&self) -> Option<&DVector<T>> {
        M::x_dot_init(self)
    }

    fn create_jacobian(&self) -> Self::Jacobian {
        M::create_jacobian(self)
    }

    fn eval_model(&mut self, in_args: &mut InArgs<T>, out_args: &mut OutArgs<T, Self::Jacobian>) -> eyre::Result<()> {
        M::eval_model(self, in_args, out_args)
    }
}
