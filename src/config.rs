//! Motor control and protocol configuration parameters.

use core::f32::consts::PI;

/// Highest addressable device id on the shared command channel.
pub const MAX_MOTORS: u8 = 10;

/// Device id used when the owning firmware does not override it.
pub const DEFAULT_DEVICE_ID: u8 = 6;

/// Minimum change of the decoded target before a command is treated as new.
/// Repeated identical frames (including channel retransmissions) are debounced.
pub const COMMAND_EPSILON: f32 = 0.001;

/// Minimum change of the gear-converted motor target [rad].
pub const TARGET_EPSILON: f32 = 0.0001;

/// Output shaft → rotor gear ratio. BLE angle commands address the output
/// shaft in degrees; the cascade runs on rotor radians.
pub const GEAR_RATIO: f32 = 225.0;

/// Supply voltage [V] (default value).
pub const DEFAULT_SUPPLY_VOLTAGE: f32 = 12.0;

/// Motor pole pairs (default value).
pub const DEFAULT_POLE_PAIRS: u8 = 7;

/// Rotation direction, +1 or -1 (default value).
pub const DEFAULT_DIRECTION: i8 = 1;

/// Control period [us] (1 kHz) (default value).
pub const DEFAULT_CONTROL_PERIOD_US: u64 = 1_000;

/// Safety clamp on the q-axis current reference [A].
pub const IQ_LIMIT: f32 = 6.5;

/// Wire scale factors, one per data kind. The velocity and current scales
/// are deployment-specific, so they are injected rather than hard-coded in
/// the decoder.
#[derive(Debug, Clone, Copy)]
pub struct ScaleConfig {
    /// Angle commands [LSB per degree].
    pub angle: f32,
    /// Velocity commands [LSB per rad/s].
    pub velocity: f32,
    /// Current commands [LSB per A].
    pub current: f32,
}

impl ScaleConfig {
    pub const fn new() -> Self {
        Self {
            angle: 10.0,
            velocity: 100.0,
            current: 1000.0,
        }
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-stage PID gains of the cascade.
pub mod gains {
    /// Position stage: error in degrees, output is a velocity reference.
    pub const POSITION_P: f32 = 2.0;
    pub const POSITION_I: f32 = 0.0;
    pub const POSITION_D: f32 = 0.0;
    pub const POSITION_RAMP: f32 = 100_000.0;
    pub const POSITION_LIMIT: f32 = 100.0;

    /// Velocity stage: output is the q-axis current reference.
    pub const VELOCITY_P: f32 = 2.0;
    pub const VELOCITY_I: f32 = 0.0;
    pub const VELOCITY_D: f32 = 0.0;
    pub const VELOCITY_RAMP: f32 = 100_000.0;
    /// Symmetric output limit; half the supply voltage by convention.
    pub const VELOCITY_LIMIT: f32 = super::DEFAULT_SUPPLY_VOLTAGE / 2.0;

    /// Current stage: output is the q-axis voltage command.
    pub const CURRENT_P: f32 = 1.2;
    pub const CURRENT_I: f32 = 0.0;
    pub const CURRENT_D: f32 = 0.0;
    pub const CURRENT_RAMP: f32 = 100_000.0;
    pub const CURRENT_LIMIT: f32 = 12.6;
}

/// Inline current sensing front end.
pub mod sensing {
    /// Shunt resistance [ohm].
    pub const SHUNT_RESISTANCE: f32 = 0.01;

    /// Current amplifier gain.
    pub const AMP_GAIN: f32 = 50.0;

    /// Volts at the ADC pin per amp through the shunt.
    pub const VOLTS_PER_AMP: f32 = SHUNT_RESISTANCE * AMP_GAIN;
}

/// Measurement low-pass time constants [s].
pub mod filters {
    pub const VELOCITY_TF: f32 = 0.01;
    pub const CURRENT_TF: f32 = 0.05;
}

/// Calibration tunables.
pub mod calibration {
    use super::PI;

    /// q-axis voltage applied while the rotor settles [V].
    pub const ALIGN_VOLTAGE: f32 = 3.0;

    /// Reference electrical angle the rotor is pulled to [rad].
    pub const ALIGN_ELECTRICAL_ANGLE: f32 = 3.0 * PI / 2.0;

    /// Mechanical settling time before the zero angle is sampled [ms].
    pub const SETTLE_TIME_MS: u32 = 1_000;

    /// Samples averaged per phase for the current zero offsets.
    pub const OFFSET_ROUNDS: u32 = 1_000;

    /// Pause between offset samples [us].
    pub const OFFSET_SAMPLE_DELAY_US: u32 = 1_000;
}
