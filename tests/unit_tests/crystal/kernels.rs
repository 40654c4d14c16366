use crate::{cubic_elasticity, stretch_x, two_slip_catalog};
use cpmor::crystal::kernels::{apply_slip_increment, compute_stress, slip_rate, update_hardness, update_slip};
use cpmor::crystal::slip::{FlowRule, HardeningLaw, SlipSystem};
use cpmor::crystal::ConstitutiveFailure;
use cpmor::proptest::{deformation_gradient, slip_system};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DVector, Matrix3, Vector3};
use proptest::prelude::*;

#[test]
fn compute_stress_vanishes_in_reference_configuration() {
    let (systems, _) = two_slip_catalog();
    let identity = Matrix3::identity();
    let stress = compute_stress(&systems, &cubic_elasticity(), &identity, &identity).unwrap();
    assert_matrix_eq!(stress.sigma, Matrix3::zeros(), comp = abs, tol = 1e-12);
    assert_matrix_eq!(stress.S, Matrix3::zeros(), comp = abs, tol = 1e-12);
    assert_matrix_eq!(stress.shear, DVector::zeros(2), comp = abs, tol = 1e-12);
}

#[test]
fn compute_stress_uniaxial_stretch_resolves_opposite_shear() {
    let (systems, _) = two_slip_catalog();
    let stress = compute_stress(&systems, &cubic_elasticity(), &stretch_x(1.001), &Matrix3::identity()).unwrap();

    // S_xx = c11 E_xx and S_zz = c12 E_xx with E_xx = (1.001^2 - 1) / 2
    let e_xx = 0.5 * (1.001f64.powi(2) - 1.0);
    assert!((stress.S[(0, 0)] - 204.6e3 * e_xx).abs() < 1e-9);
    assert!((stress.S[(2, 2)] - 137.7e3 * e_xx).abs() < 1e-9);

    let tau = &stress.shear;
    assert!(tau[0] < 0.0);
    assert!(tau[1] > 0.0);
    assert!((tau[0] + tau[1]).abs() < 1e-10 * tau[1].abs());
    // Just above the critical resolved shear stress of 30
    assert!(tau[1] > 30.0 && tau[1] < 40.0, "{}", tau[1]);
}

#[test]
fn compute_stress_rejects_singular_plastic_deformation() {
    let (systems, _) = two_slip_catalog();
    let result = compute_stress(&systems, &cubic_elasticity(), &Matrix3::identity(), &Matrix3::zeros());
    assert_eq!(result.unwrap_err(), ConstitutiveFailure::SingularPlasticDeformation);
}

#[test]
fn slip_rate_vanishes_for_non_positive_time_step() {
    let slip_n = DVector::from_column_slice(&[0.0, 1.0]);
    let slip_np1 = DVector::from_column_slice(&[1.0, 3.0]);
    assert_eq!(slip_rate(0.0, &slip_n, &slip_np1), DVector::zeros(2));
    assert_eq!(slip_rate(-1.0, &slip_n, &slip_np1), DVector::zeros(2));
    assert_eq!(
        slip_rate(0.5, &slip_n, &slip_np1),
        DVector::from_column_slice(&[2.0, 4.0])
    );
}

#[test]
fn update_slip_follows_sign_of_shear() {
    let (systems, families) = two_slip_catalog();
    let resistance = DVector::from_element(2, 30.0);
    let shear = DVector::from_column_slice(&[-30.0, 30.0]);
    let slip_n = DVector::from_column_slice(&[0.5, 0.5]);
    let slip_np1 = update_slip(&systems, &families, 0.1, &resistance, &shear, &slip_n).unwrap();

    // At tau = g the power law gives the reference rate 0.001
    assert!((slip_np1[0] - (0.5 - 0.1 * 0.001)).abs() < 1e-15);
    assert!((slip_np1[1] - (0.5 + 0.1 * 0.001)).abs() < 1e-15);
}

#[test]
fn update_slip_rejects_non_positive_resistance() {
    let (systems, families) = two_slip_catalog();
    let resistance = DVector::from_column_slice(&[30.0, 0.0]);
    let shear = DVector::from_element(2, 10.0);
    let slip_n = DVector::zeros(2);
    let result = update_slip(&systems, &families, 0.1, &resistance, &shear, &slip_n);
    assert_eq!(
        result.unwrap_err(),
        ConstitutiveFailure::NonPositiveResistance { slip_system: 1 }
    );
}

#[test]
fn flow_rules_vanish_without_shear() {
    let (systems, _) = two_slip_catalog();
    let rules = [
        FlowRule::PowerLaw,
        FlowRule::ThermalActivation {
            activation_energy: 2.0,
            athermal_resistance: 5.0,
            p: 0.5,
            q: 1.5,
        },
        FlowRule::PowerLawDrag { drag_coefficient: 10.0 },
    ];
    for rule in &rules {
        assert_eq!(rule.slip_rate(&systems[0], 0.0, 30.0), 0.0);
    }
}

#[test]
fn thermal_activation_is_inactive_below_athermal_resistance() {
    let (systems, _) = two_slip_catalog();
    let rule = FlowRule::ThermalActivation {
        activation_energy: 2.0,
        athermal_resistance: 5.0,
        p: 0.5,
        q: 1.5,
    };
    assert_eq!(rule.slip_rate(&systems[0], 4.0, 30.0), 0.0);
    assert_eq!(rule.slip_rate(&systems[0], -4.0, 30.0), 0.0);
    // Beyond the obstacle strength the barrier vanishes and the reference rate is recovered
    assert_eq!(rule.slip_rate(&systems[0], 50.0, 30.0), 0.001);
    assert_eq!(rule.slip_rate(&systems[0], -50.0, 30.0), -0.001);
}

#[test]
fn drag_limits_power_law_rate() {
    let (systems, _) = two_slip_catalog();
    let drag = FlowRule::PowerLawDrag { drag_coefficient: 1.0e4 };
    let power_law = FlowRule::PowerLaw.slip_rate(&systems[0], 40.0, 30.0);
    let limited = drag.slip_rate(&systems[0], 40.0, 30.0);
    assert!(limited > 0.0);
    assert!(limited < power_law);
    assert!(limited < 40.0 / 1.0e4);
}

#[test]
fn slip_system_requires_orthogonal_nonzero_vectors() {
    let x = Vector3::new(1.0, 0.0, 0.0);
    let y = Vector3::new(0.0, 2.0, 0.0);
    assert!(SlipSystem::new(x, Vector3::new(1.0, 1.0, 0.0)).is_none());
    assert!(SlipSystem::new(Vector3::zeros(), y).is_none());

    let system = SlipSystem::new(x, y).unwrap();
    assert_eq!(system.normal, Vector3::new(0.0, 1.0, 0.0));
    assert_eq!(system.line_direction(), Vector3::new(0.0, 0.0, 1.0));
    assert_matrix_eq!(system.projector, x * Vector3::new(0.0, 1.0, 0.0).transpose());
}

proptest! {
    #[test]
    fn zero_slip_increment_preserves_plastic_deformation(fp in deformation_gradient(0.2), dt in 0.0..1.0) {
        let (systems, _) = two_slip_catalog();
        let slip = DVector::from_column_slice(&[0.3, -0.1]);
        let update = apply_slip_increment(&systems, dt, &slip, &slip, &fp);
        prop_assert_eq!(update.Fp, fp);
        prop_assert_eq!(update.Lp, Matrix3::zeros());
    }

    #[test]
    fn slip_increment_is_isochoric(system in slip_system(), increment in -0.1..0.1) {
        let systems = vec![system];
        let slip_n = DVector::zeros(1);
        let slip_np1 = DVector::from_element(1, increment);
        let fp_n = Matrix3::identity();
        let update = apply_slip_increment(&systems, 1.0, &slip_n, &slip_np1, &fp_n);
        prop_assert!((update.Fp.determinant() - 1.0).abs() < 1e-12);
        prop_assert!(update.Lp.trace().abs() < 1e-12);
    }

    #[test]
    fn linear_hardening_is_monotone_below_saturation(
        rate_0 in -10.0..10.0,
        rate_1 in -10.0..10.0,
        h_0 in 0.0..100.0,
        h_1 in 0.0..100.0,
        dt in 0.0..0.1,
    ) {
        // Saturation at hardening_modulus / recovery_modulus = 355
        let (systems, families) = two_slip_catalog();
        let rate = DVector::from_column_slice(&[rate_0, rate_1]);
        let hardening_n = DVector::from_column_slice(&[h_0, h_1]);
        let update = update_hardness(&systems, &families, dt, &rate, &hardening_n).unwrap();
        for i in 0..2 {
            prop_assert!(update.hardening[i] >= hardening_n[i]);
            prop_assert_eq!(update.resistance[i], 30.0 + update.hardening[i]);
        }
    }

    #[test]
    fn saturation_hardening_is_monotone_below_saturation(
        rate_0 in -10.0..10.0,
        rate_1 in -10.0..10.0,
        h_0 in 0.0..120.0,
        h_1 in 0.0..120.0,
        dt in 0.0..0.1,
    ) {
        // Without rate sensitivity the saturation is the limit itself, so h_n < 150 - 30
        let (systems, mut families) = two_slip_catalog();
        families[0].hardening_law = HardeningLaw::Saturation {
            rate_coefficient: 200.0,
            saturation_limit: 150.0,
            saturation_exponent: 0.0,
            reference_rate: 1.0,
        };
        let rate = DVector::from_column_slice(&[rate_0, rate_1]);
        let hardening_n = DVector::from_column_slice(&[h_0, h_1]);
        let update = update_hardness(&systems, &families, dt, &rate, &hardening_n).unwrap();
        for i in 0..2 {
            // Up to rounding for vanishing increments
            prop_assert!(update.hardening[i] - hardening_n[i] >= -1e-12);
            prop_assert!(update.hardening[i] <= 120.0 + 1e-12);
        }
    }
}
