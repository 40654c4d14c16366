use nalgebra::RealField;

pub use nalgebra;

/// Scalar capability required by the constitutive kernels, the local solvers and the
/// reduced-order projections.
///
/// Any type offering field arithmetic, ordering and the elementary functions of
/// [`RealField`] qualifies, which includes forward-mode dual numbers carrying sensitivities
/// as well as plain `f32`/`f64`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Extraction of the plain floating-point value of a scalar.
///
/// For scalars that carry derivative information, only the value part is returned. This is
/// used for diagnostics (residual norms, logs) that must not depend on sensitivities.
pub trait ScalarValue {
    fn scalar_value(&self) -> f64;
}

impl<T: Real> ScalarValue for T {
    fn scalar_value(&self) -> f64 {
        // Scalars without an f64 representation are reported as NaN
        nalgebra::try_convert::<T, f64>(*self).unwrap_or(f64::NAN)
    }
}
