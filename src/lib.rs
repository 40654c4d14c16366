//! Crystal-plasticity local integration and projection-based reduced-order model evaluation.
//!
//! The crate consists of two loosely coupled parts:
//!
//! - [`crystal`] integrates the crystal-plasticity constitutive model at material points,
//!   using explicit or implicit schemes built on the local solvers of `cpmor-optimize`.
//!   Failed points request a reduction of the global load step through [`status::LoadStepStatus`].
//! - [`rom`] wraps an opaque full-order model evaluator and exposes it in reduced coordinates,
//!   with a choice of projections, preconditioners and Dirichlet enforcement.
pub mod crystal;
pub mod io;
pub mod rom;
pub mod status;

pub mod optimize {
    pub use cpmor_optimize::*;
}

pub mod sparse {
    pub use cpmor_sparse::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use cpmor_traits::{Real, ScalarValue};
