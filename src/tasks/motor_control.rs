//! Motor control task.
//!
//! Calibrates once at startup, then runs the 1 kHz cascaded control loop,
//! picking up debounced targets published by the command task.

use embassy_time::{Delay, Duration, Timer};

use crate::config::DEFAULT_CONTROL_PERIOD_US;
use crate::fmt::*;
use crate::foc::motor::FocMotor;
use crate::hardware::{AngleSensor, CurrentAdc, DutySink};
use crate::state::COMMAND_TARGET;

/// Run the motor forever. Calibration failure is terminal: the task parks
/// with the windings released instead of closing the loop on bad feedback.
pub async fn motor_control_task<S, A, D>(mut motor: FocMotor<S, A, D>) -> !
where
    S: AngleSensor,
    A: CurrentAdc,
    D: DutySink,
{
    info!("Motor control task started");

    if let Err(err) = motor.calibrate(&mut Delay) {
        error!("Calibration failed: {:?}", err);
        park_released(&mut motor).await;
    }

    let dt = DEFAULT_CONTROL_PERIOD_US as f32 / 1_000_000.0;
    info!(
        "Control loop running at {} Hz",
        1_000_000 / DEFAULT_CONTROL_PERIOD_US
    );

    loop {
        if let Some(degrees) = COMMAND_TARGET.consume() {
            if motor.set_target_degrees(degrees) {
                debug!("New target: {} deg (output shaft)", degrees);
            }
        }

        if let Err(err) = motor.update(dt) {
            error!("Angle sensor fault in closed loop: {:?}", err);
            park_released(&mut motor).await;
        }

        Timer::after(Duration::from_micros(DEFAULT_CONTROL_PERIOD_US)).await;
    }
}

/// Zero the torque and never come back. A watchdog reset is the only way
/// out of a feedback fault.
async fn park_released<S, A, D>(motor: &mut FocMotor<S, A, D>) -> !
where
    S: AngleSensor,
    A: CurrentAdc,
    D: DutySink,
{
    motor.release();
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}
