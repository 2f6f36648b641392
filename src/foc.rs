// FOC (Field Oriented Control) module
// Encoder-based cascaded position/velocity/current control for a gimbal
// class BLDC motor.

pub mod calibration;
pub mod current_sense;
pub mod lowpass;
pub mod motor;
pub mod pid;
pub mod transforms;

// Re-export main types for easier access
pub use calibration::CalibrationError;
pub use current_sense::CurrentSense;
pub use lowpass::LowPassFilter;
pub use motor::FocMotor;
pub use pid::PidController;
pub use transforms::{electrical_angle, inverse_park, normalize_angle, phase_voltages, to_duty};
