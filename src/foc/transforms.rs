// Coordinate transformations for FOC (Field Oriented Control)
// Inverse Park/Clarke, angle normalization and duty conversion.

use libm::{cosf, fmodf, sinf};

// Enable idsp-based fast trigonometric functions
const USE_IDSP_COSSIN: bool = true;

const SQRT3: f32 = 1.732_050_8;

/// Normalize angle to range [0, 2*PI)
///
/// Single fmod pass plus one correction, no loop: inputs here are bounded
/// by pole_pairs * accumulated angle and never more than one period off
/// after the fmod.
pub fn normalize_angle(angle: f32) -> f32 {
    use core::f32::consts::TAU;

    let wrapped = fmodf(angle, TAU);
    if wrapped < 0.0 {
        // Adding a period to a tiny negative remainder rounds to exactly
        // TAU, which is outside the half-open range.
        let shifted = wrapped + TAU;
        if shifted >= TAU {
            0.0
        } else {
            shifted
        }
    } else {
        wrapped
    }
}

/// Electrical angle of the rotor from its mechanical angle.
///
/// # Arguments
/// * `mechanical_angle` - shaft angle in radians
/// * `pole_pairs` - motor pole pair count
/// * `direction` - +1 or -1, sensor counting direction vs. phase order
/// * `zero_offset` - electrical angle offset captured during calibration
pub fn electrical_angle(mechanical_angle: f32, pole_pairs: u8, direction: i8, zero_offset: f32) -> f32 {
    normalize_angle(pole_pairs as f32 * direction as f32 * mechanical_angle - zero_offset)
}

/// Inverse Park transformation (dq -> alpha/beta)
///
/// Transforms from the rotating dq reference frame to the stationary
/// alpha/beta frame.
///
/// # Arguments
/// * `vd` - d-axis voltage (aligned with rotor flux)
/// * `vq` - q-axis voltage (perpendicular to rotor flux, produces torque)
/// * `theta` - electrical angle in radians
///
/// # Returns
/// Tuple of (v_alpha, v_beta) in the stationary frame
///
/// # Implementation
/// Uses idsp::cossin() for fast trigonometric calculation (~40 cycles on
/// Cortex-M) compared to libm::cosf/sinf (~100-200 cycles). Can be switched
/// via USE_IDSP_COSSIN.
pub fn inverse_park(vd: f32, vq: f32, theta: f32) -> (f32, f32) {
    if USE_IDSP_COSSIN {
        inverse_park_idsp(vd, vq, theta)
    } else {
        inverse_park_libm(vd, vq, theta)
    }
}

/// Inverse Park using idsp::cossin() (fast, ~40 cycles on Cortex-M)
#[inline]
fn inverse_park_idsp(vd: f32, vq: f32, theta: f32) -> (f32, f32) {
    let (cos_theta, sin_theta) = cossin(theta);

    let v_alpha = vd * cos_theta - vq * sin_theta;
    let v_beta = vd * sin_theta + vq * cos_theta;

    (v_alpha, v_beta)
}

/// Inverse Park using libm (slower, but more familiar)
#[inline]
fn inverse_park_libm(vd: f32, vq: f32, theta: f32) -> (f32, f32) {
    let cos_theta = cosf(theta);
    let sin_theta = sinf(theta);

    let v_alpha = vd * cos_theta - vq * sin_theta;
    let v_beta = vd * sin_theta + vq * cos_theta;

    (v_alpha, v_beta)
}

/// Fast (cos, sin) via idsp's integer CORDIC table.
///
/// idsp uses i32::MIN..=i32::MAX to represent -PI..PI, so the angle is
/// normalized to [-PI, PI] before scaling to the phase word.
pub fn cossin(theta: f32) -> (f32, f32) {
    use core::f32::consts::{PI, TAU};

    let wrapped = normalize_angle(theta);
    let normalized = if wrapped > PI { wrapped - TAU } else { wrapped };

    const SCALE: f32 = 2147483648.0 / PI; // 2^31 / PI
    let phase: i32 = (normalized * SCALE) as i32;

    let (cos_i32, sin_i32) = idsp::cossin(phase);

    const I32_TO_F32: f32 = 1.0 / 2147483648.0;
    (cos_i32 as f32 * I32_TO_F32, sin_i32 as f32 * I32_TO_F32)
}

/// Inverse Clarke (alpha/beta -> three phase), referenced to half the
/// supply voltage so the phases stay non-negative for single-supply PWM.
///
/// # Arguments
/// * `v_alpha` - alpha-axis voltage
/// * `v_beta` - beta-axis voltage
/// * `supply_voltage` - DC bus voltage
///
/// # Returns
/// Tuple of (v_a, v_b, v_c) phase voltages centered on supply/2
pub fn phase_voltages(v_alpha: f32, v_beta: f32, supply_voltage: f32) -> (f32, f32, f32) {
    let mid = supply_voltage / 2.0;

    let v_a = v_alpha + mid;
    let v_b = (SQRT3 * v_beta - v_alpha) / 2.0 + mid;
    let v_c = (-v_alpha - SQRT3 * v_beta) / 2.0 + mid;

    (v_a, v_b, v_c)
}

/// Convert a phase voltage to a PWM duty in [0, 1].
///
/// The voltage is clamped to [0, supply] before dividing, and the ratio is
/// clamped again so float rounding can never push a duty past full scale.
pub fn to_duty(voltage: f32, supply_voltage: f32) -> f32 {
    let clamped = voltage.clamp(0.0, supply_voltage);
    (clamped / supply_voltage).clamp(0.0, 1.0)
}
