//! Sparse linear algebra helpers for cpmor: linear operators, CSR inspection and
//! preconditioners.
pub mod csr;
pub mod operator;
pub mod precond;

pub use operator::{IdentityOperator, LinearOperator};
pub use precond::{build_preconditioner, FactorizationError, PreconditionerType};
