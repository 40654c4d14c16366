/// Bound-constrained minimization of nonlinear least-squares objectives
pub mod bounded;
/// Calculus helpers and numerical differentiation
pub mod calculus;
/// Generic minimizer for small dense nonlinear systems
pub mod minimizer;
/// Step strategies (Newton, trust region, conjugate gradient and line search variants)
pub mod steps;
