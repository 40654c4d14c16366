use crate::crystal::slip::SlipSystem;
use ::proptest::prelude::*;
use nalgebra::{DMatrix, Matrix3, Rotation3, Vector3};

pub fn vector3() -> impl Strategy<Value = Vector3<f64>> {
    // Keep the range modest, huge coordinates only produce overflow in the kernels
    let range = -10.0..10.0;
    [range.clone(), range.clone(), range].prop_map(|[x, y, z]| Vector3::new(x, y, z))
}

/// Unit vectors, rejecting directions too short to normalize reliably.
pub fn unit_vector3() -> impl Strategy<Value = Vector3<f64>> {
    vector3()
        .prop_filter("vector must be normalizable", |v| v.norm() > 1e-3)
        .prop_map(|v| v.normalize())
}

pub fn rotation3() -> impl Strategy<Value = Rotation3<f64>> {
    let angle = -std::f64::consts::PI..std::f64::consts::PI;
    (unit_vector3(), angle)
        .prop_map(|(axis, angle)| Rotation3::from_scaled_axis(axis * angle))
}

/// Deformation gradients $F = I + H$ with $|H_{ij}| \leq$ `max_perturbation`.
///
/// For perturbations well below one third, $\det F > 0$ is guaranteed.
pub fn deformation_gradient(max_perturbation: f64) -> impl Strategy<Value = Matrix3<f64>> {
    let range = -max_perturbation..=max_perturbation;
    ::proptest::array::uniform9(range).prop_map(|h| Matrix3::identity() + Matrix3::from_column_slice(&h))
}

/// Slip systems with a random orthogonal pair of slip direction and slip normal.
pub fn slip_system() -> impl Strategy<Value = SlipSystem<f64>> {
    (unit_vector3(), unit_vector3())
        .prop_filter("direction and normal must not be parallel", |(s, n)| {
            s.cross(n).norm() > 1e-2
        })
        .prop_filter_map("slip system must be valid", |(s, n)| {
            // Orthogonalize the normal against the direction
            let normal = n - s * s.dot(&n);
            SlipSystem::new(s, normal)
        })
}

/// Matrices of size `nrows x ncols` with orthonormal columns, requiring `ncols <= nrows`.
pub fn orthonormal_basis(nrows: usize, ncols: usize) -> impl Strategy<Value = DMatrix<f64>> {
    assert!(ncols <= nrows, "Basis cannot have more columns than rows.");
    ::proptest::collection::vec(-1.0..1.0, nrows * ncols)
        .prop_map(move |entries: Vec<f64>| DMatrix::from_vec(nrows, ncols, entries))
        .prop_filter_map("basis must have full column rank", move |m| {
            let qr = m.qr();
            let r = qr.r();
            let full_rank = r.diagonal().iter().all(|d| d.abs() > 1e-6);
            full_rank.then(|| qr.q())
        })
}
