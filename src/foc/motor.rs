// Cascaded position -> velocity -> current FOC controller
//
// Outer position loop in degrees, middle velocity loop in rad/s, inner
// current loop on the measured q-axis current. The inner loop output is a
// q-axis voltage written to the PWM through the inverse Park/Clarke pair.

use core::f32::consts::PI;

use embedded_hal::delay::DelayNs;

use crate::config::{self, filters, gains, IQ_LIMIT, TARGET_EPSILON};
use crate::fmt::*;
use crate::foc::calibration::{self, CalibrationError};
use crate::foc::current_sense::CurrentSense;
use crate::foc::lowpass::LowPassFilter;
use crate::foc::pid::PidController;
use crate::foc::transforms::{
    electrical_angle, inverse_park, normalize_angle, phase_voltages, to_duty,
};
use crate::hardware::{AngleSensor, CurrentAdc, DutySink, SensorError};

/// Write a q-axis voltage at electrical angle `theta` to the PWM outputs.
///
/// The voltage is clamped to half the bus so the phase voltages stay inside
/// [0, supply] after the half-rail shift.
pub fn apply_torque<D: DutySink>(duty: &mut D, uq: f32, theta: f32, supply_voltage: f32) {
    let half = supply_voltage / 2.0;
    let uq = uq.clamp(-half, half);
    let theta = normalize_angle(theta);

    let (v_alpha, v_beta) = inverse_park(0.0, uq, theta);
    let (v_a, v_b, v_c) = phase_voltages(v_alpha, v_beta, supply_voltage);

    duty.set_duty(
        to_duty(v_a, supply_voltage),
        to_duty(v_b, supply_voltage),
        to_duty(v_c, supply_voltage),
    );
}

/// One motor axis: sensor, current sensing, PWM and the control cascade.
pub struct FocMotor<S, A, D> {
    sensor: S,
    current_sense: CurrentSense<A>,
    duty: D,
    supply_voltage: f32,
    pole_pairs: u8,
    direction: i8,
    zero_electrical_angle: f32,
    calibrated: bool,
    /// Target position in rotor radians.
    target: f32,
    position_pid: PidController,
    velocity_pid: PidController,
    current_pid: PidController,
    velocity_filter: LowPassFilter,
    current_filter: LowPassFilter,
}

impl<S, A, D> FocMotor<S, A, D>
where
    S: AngleSensor,
    A: CurrentAdc,
    D: DutySink,
{
    pub fn new(sensor: S, adc: A, duty: D) -> Self {
        Self {
            sensor,
            current_sense: CurrentSense::new(adc),
            duty,
            supply_voltage: config::DEFAULT_SUPPLY_VOLTAGE,
            pole_pairs: config::DEFAULT_POLE_PAIRS,
            direction: config::DEFAULT_DIRECTION,
            zero_electrical_angle: 0.0,
            calibrated: false,
            target: 0.0,
            position_pid: PidController::new(
                gains::POSITION_P,
                gains::POSITION_I,
                gains::POSITION_D,
                gains::POSITION_RAMP,
                gains::POSITION_LIMIT,
            ),
            velocity_pid: PidController::new(
                gains::VELOCITY_P,
                gains::VELOCITY_I,
                gains::VELOCITY_D,
                gains::VELOCITY_RAMP,
                gains::VELOCITY_LIMIT,
            ),
            current_pid: PidController::new(
                gains::CURRENT_P,
                gains::CURRENT_I,
                gains::CURRENT_D,
                gains::CURRENT_RAMP,
                gains::CURRENT_LIMIT,
            ),
            velocity_filter: LowPassFilter::new(filters::VELOCITY_TF),
            current_filter: LowPassFilter::new(filters::CURRENT_TF),
        }
    }

    /// Override the defaults before calibration.
    pub fn with_motor_params(mut self, supply_voltage: f32, pole_pairs: u8, direction: i8) -> Self {
        self.supply_voltage = supply_voltage;
        self.pole_pairs = pole_pairs;
        self.direction = direction;
        self
    }

    /// Full startup calibration: current offsets first (zero torque, no
    /// excitation), then the zero electrical angle.
    ///
    /// Failure is terminal. The rotor is left torque-free and the motor
    /// refuses to close the loop until a later calibration succeeds.
    pub fn calibrate(&mut self, delay: &mut impl DelayNs) -> Result<(), CalibrationError> {
        apply_torque(&mut self.duty, 0.0, 0.0, self.supply_voltage);
        self.current_sense.calibrate_offsets(delay);

        self.zero_electrical_angle = calibration::find_zero_electrical_angle(
            &mut self.sensor,
            &mut self.duty,
            self.pole_pairs,
            self.direction,
            self.supply_voltage,
            delay,
        )?;

        self.position_pid.reset();
        self.velocity_pid.reset();
        self.current_pid.reset();
        self.velocity_filter.reset();
        self.current_filter.reset();
        self.target = self.sensor.angle();
        self.calibrated = true;

        info!("Motor calibrated, holding at {} rad", self.target);
        Ok(())
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// Set the target from an output shaft angle in degrees, through the
    /// gear train. Returns whether the rotor target actually moved.
    pub fn set_target_degrees(&mut self, output_degrees: f32) -> bool {
        let target = output_degrees * config::GEAR_RATIO * PI / 180.0;
        if (target - self.target).abs() > TARGET_EPSILON {
            self.target = target;
            true
        } else {
            false
        }
    }

    /// Target position in rotor radians.
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Accumulated rotor angle from the last refreshed sensor state [rad].
    pub fn angle(&self) -> f32 {
        self.sensor.angle()
    }

    /// Rotor velocity from the last refreshed sensor state [rad/s].
    pub fn velocity(&self) -> f32 {
        self.sensor.velocity()
    }

    /// Rotor electrical angle from the last refreshed sensor state [rad].
    pub fn electrical_angle(&self) -> f32 {
        electrical_angle(
            self.sensor.mechanical_angle(),
            self.pole_pairs,
            self.direction,
            self.zero_electrical_angle,
        )
    }

    /// Run one control tick: refresh feedback, advance the cascade and
    /// write the new phase duties.
    ///
    /// # Arguments
    /// * `dt` - seconds since the previous tick
    pub fn update(&mut self, dt: f32) -> Result<(), SensorError> {
        self.sensor.refresh()?;
        self.current_sense.refresh();

        // Position loop works in degrees; the gains were tuned that way.
        let position_error = (self.target - self.sensor.angle()) * (180.0 / PI);
        let velocity_ref = self.position_pid.update(position_error, dt);

        let velocity = self.velocity_filter.update(self.sensor.velocity(), dt);
        let iq_ref = self
            .velocity_pid
            .update(velocity_ref - velocity, dt)
            .clamp(-IQ_LIMIT, IQ_LIMIT);

        let theta = self.electrical_angle();
        let iq = self.current_filter.update(self.current_sense.iq(theta), dt);
        let uq = self.current_pid.update(iq_ref - iq, dt);

        apply_torque(&mut self.duty, uq, theta, self.supply_voltage);
        Ok(())
    }

    /// Release the motor: zero torque, cascade state cleared.
    pub fn release(&mut self) {
        self.position_pid.reset();
        self.velocity_pid.reset();
        self.current_pid.reset();
        apply_torque(&mut self.duty, 0.0, 0.0, self.supply_voltage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::rc::Rc;

    extern crate std;

    struct MockSensor {
        angle: f32,
        velocity: f32,
        fail: bool,
    }

    impl AngleSensor for MockSensor {
        fn refresh(&mut self) -> Result<(), SensorError> {
            if self.fail {
                Err(SensorError::Unresponsive)
            } else {
                Ok(())
            }
        }
        fn mechanical_angle(&self) -> f32 {
            normalize_angle(self.angle)
        }
        fn angle(&self) -> f32 {
            self.angle
        }
        fn velocity(&self) -> f32 {
            self.velocity
        }
    }

    struct MockAdc;

    impl CurrentAdc for MockAdc {
        fn phase_a(&mut self) -> f32 {
            0.0
        }
        fn phase_b(&mut self) -> f32 {
            0.0
        }
        fn phase_c(&mut self) -> Option<f32> {
            None
        }
    }

    #[derive(Clone)]
    struct MockDuty {
        last: Rc<Cell<(f32, f32, f32)>>,
    }

    impl MockDuty {
        fn new() -> Self {
            Self {
                last: Rc::new(Cell::new((0.0, 0.0, 0.0))),
            }
        }
    }

    impl DutySink for MockDuty {
        fn set_duty(&mut self, a: f32, b: f32, c: f32) {
            self.last.set((a, b, c));
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn motor(
        angle: f32,
        velocity: f32,
    ) -> (FocMotor<MockSensor, MockAdc, MockDuty>, MockDuty) {
        let duty = MockDuty::new();
        let sensor = MockSensor {
            angle,
            velocity,
            fail: false,
        };
        (FocMotor::new(sensor, MockAdc, duty.clone()), duty)
    }

    #[test]
    fn test_apply_torque_zero_is_mid_rail() {
        let mut duty = MockDuty::new();
        apply_torque(&mut duty, 0.0, 1.0, 12.0);
        let (a, b, c) = duty.last.get();
        assert!((a - 0.5).abs() < 1e-4);
        assert!((b - 0.5).abs() < 1e-4);
        assert!((c - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_apply_torque_duties_stay_in_range() {
        let mut duty = MockDuty::new();
        // Well past the half-bus clamp.
        apply_torque(&mut duty, 100.0, 2.0, 12.0);
        let (a, b, c) = duty.last.get();
        for d in [a, b, c] {
            assert!((0.0..=1.0).contains(&d));
        }
    }

    #[test]
    fn test_target_gear_conversion() {
        let (mut motor, _) = motor(0.0, 0.0);
        assert!(motor.set_target_degrees(1.0));
        assert!((motor.target() - 225.0 * PI / 180.0).abs() < 1e-4);
    }

    #[test]
    fn test_target_debounced_below_threshold() {
        let (mut motor, _) = motor(0.0, 0.0);
        motor.set_target_degrees(1.0);
        assert!(!motor.set_target_degrees(1.0));
        assert!(motor.set_target_degrees(1.1));
    }

    #[test]
    fn test_calibrate_captures_hold_target() {
        let (mut motor, _) = motor(2.0, 0.0);
        motor.calibrate(&mut NoDelay).unwrap();
        assert!(motor.is_calibrated());
        assert!((motor.target() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_calibrate_fails_on_dead_sensor() {
        let duty = MockDuty::new();
        let sensor = MockSensor {
            angle: 0.0,
            velocity: 0.0,
            fail: true,
        };
        let mut motor = FocMotor::new(sensor, MockAdc, duty);
        assert_eq!(
            motor.calibrate(&mut NoDelay),
            Err(CalibrationError::SensorUnresponsive)
        );
        assert!(!motor.is_calibrated());
    }

    #[test]
    fn test_update_at_target_holds_mid_rail() {
        let (mut motor, duty) = motor(0.0, 0.0);
        motor.calibrate(&mut NoDelay).unwrap();

        // Zero error everywhere: every stage outputs zero, duties stay at
        // mid-rail.
        motor.update(0.001).unwrap();
        let (a, b, c) = duty.last.get();
        assert!((a - 0.5).abs() < 1e-3);
        assert!((b - 0.5).abs() < 1e-3);
        assert!((c - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_update_drives_toward_positive_error() {
        let (mut motor, duty) = motor(0.0, 0.0);
        motor.calibrate(&mut NoDelay).unwrap();
        motor.set_target_degrees(1.0);

        motor.update(0.001).unwrap();

        // Positive position error at electrical angle 0: Uq > 0 puts the
        // beta axis voltage on phase B over phase C.
        let (_, b, c) = duty.last.get();
        assert!(b > c);
    }

    #[test]
    fn test_update_propagates_sensor_fault() {
        let (mut motor, _) = motor(0.0, 0.0);
        motor.sensor.fail = true;
        assert_eq!(motor.update(0.001), Err(SensorError::Unresponsive));
    }
}
