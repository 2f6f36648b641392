// Zero electrical angle calibration
//
// Pulls the rotor to a known electrical angle with a fixed q-axis voltage,
// waits for it to settle mechanically, then records the sensor reading as
// the zero offset for all later electrical angle computations.

use embedded_hal::delay::DelayNs;

use crate::config::calibration::{ALIGN_ELECTRICAL_ANGLE, ALIGN_VOLTAGE, SETTLE_TIME_MS};
use crate::fmt::*;
use crate::foc::motor::apply_torque;
use crate::foc::transforms::electrical_angle;
use crate::hardware::{AngleSensor, DutySink};

/// Calibration failure. Terminal: the motor must not enter closed loop
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    /// The angle sensor failed to produce a reading during alignment.
    SensorUnresponsive,
}

/// Align the rotor and capture the zero electrical angle.
///
/// Torque is always released before returning, on the failure path too, so
/// a dead sensor never leaves the windings energized.
///
/// # Returns
/// The electrical angle offset [rad] to subtract in closed loop.
pub fn find_zero_electrical_angle<S, D>(
    sensor: &mut S,
    duty: &mut D,
    pole_pairs: u8,
    direction: i8,
    supply_voltage: f32,
    delay: &mut impl DelayNs,
) -> Result<f32, CalibrationError>
where
    S: AngleSensor,
    D: DutySink,
{
    info!("Aligning rotor for zero angle calibration...");
    apply_torque(duty, ALIGN_VOLTAGE, ALIGN_ELECTRICAL_ANGLE, supply_voltage);
    delay.delay_ms(SETTLE_TIME_MS);

    if sensor.refresh().is_err() {
        apply_torque(duty, 0.0, ALIGN_ELECTRICAL_ANGLE, supply_voltage);
        error!("Calibration failed: angle sensor did not respond");
        return Err(CalibrationError::SensorUnresponsive);
    }

    // Offset computed with a zero offset: the raw electrical angle at the
    // aligned position.
    let offset = electrical_angle(sensor.mechanical_angle(), pole_pairs, direction, 0.0);

    apply_torque(duty, 0.0, ALIGN_ELECTRICAL_ANGLE, supply_voltage);

    info!("Zero electrical angle: {} rad", offset);
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foc::transforms::normalize_angle;
    use crate::hardware::SensorError;

    struct MockSensor {
        mechanical: f32,
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
            self.mechanical
        }
        fn angle(&self) -> f32 {
            self.mechanical
        }
        fn velocity(&self) -> f32 {
            0.0
        }
    }

    struct MockDuty {
        last: (f32, f32, f32),
    }

    impl DutySink for MockDuty {
        fn set_duty(&mut self, a: f32, b: f32, c: f32) {
            self.last = (a, b, c);
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_captures_raw_electrical_angle() {
        let mut sensor = MockSensor {
            mechanical: 0.5,
            fail: false,
        };
        let mut duty = MockDuty {
            last: (0.0, 0.0, 0.0),
        };

        let offset =
            find_zero_electrical_angle(&mut sensor, &mut duty, 7, 1, 12.0, &mut NoDelay).unwrap();
        assert!((offset - normalize_angle(7.0 * 0.5)).abs() < 1e-4);
    }

    #[test]
    fn test_releases_torque_after_success() {
        let mut sensor = MockSensor {
            mechanical: 0.1,
            fail: false,
        };
        let mut duty = MockDuty {
            last: (1.0, 1.0, 1.0),
        };

        find_zero_electrical_angle(&mut sensor, &mut duty, 7, 1, 12.0, &mut NoDelay).unwrap();
        // Zero q voltage leaves every phase at mid-rail.
        let (a, b, c) = duty.last;
        assert!((a - 0.5).abs() < 1e-4);
        assert!((b - 0.5).abs() < 1e-4);
        assert!((c - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_dead_sensor_fails_with_torque_released() {
        let mut sensor = MockSensor {
            mechanical: 0.0,
            fail: true,
        };
        let mut duty = MockDuty {
            last: (1.0, 1.0, 1.0),
        };

        let result =
            find_zero_electrical_angle(&mut sensor, &mut duty, 7, 1, 12.0, &mut NoDelay);
        assert_eq!(result, Err(CalibrationError::SensorUnresponsive));

        let (a, b, c) = duty.last;
        assert!((a - 0.5).abs() < 1e-4);
        assert!((b - 0.5).abs() < 1e-4);
        assert!((c - 0.5).abs() < 1e-4);
    }
}
