// PID controller with integral clamping and output slew limiting

/// PID controller used by all three cascade stages.
///
/// The integral term uses Tustin (trapezoidal) integration and is clamped
/// to the output limit on its own, so it cannot wind up past what the
/// output could ever deliver. The final output is clamped to the same
/// limit and then slew-limited by `ramp` (units per second).
pub struct PidController {
    /// Proportional gain
    p: f32,
    /// Integral gain
    i: f32,
    /// Derivative gain
    d: f32,
    /// Maximum output change rate, units per second. Zero disables.
    ramp: f32,
    /// Symmetric output limit
    limit: f32,
    /// Integral accumulator
    integral: f32,
    /// Error from the previous update
    prev_error: f32,
    /// Output from the previous update, the slew reference
    prev_output: f32,
}

impl PidController {
    /// # Arguments
    /// * `p`, `i`, `d` - gains
    /// * `ramp` - output slew limit in units per second (0 disables)
    /// * `limit` - symmetric output limit
    pub const fn new(p: f32, i: f32, d: f32, ramp: f32, limit: f32) -> Self {
        Self {
            p,
            i,
            d,
            ramp,
            limit,
            integral: 0.0,
            prev_error: 0.0,
            prev_output: 0.0,
        }
    }

    /// Advance the controller one step.
    ///
    /// # Arguments
    /// * `error` - setpoint minus measurement
    /// * `dt` - time since the previous update, seconds
    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        let proportional = self.p * error;

        self.integral += self.i * dt * 0.5 * (error + self.prev_error);
        self.integral = self.integral.clamp(-self.limit, self.limit);

        let derivative = if dt > 0.0 {
            self.d * (error - self.prev_error) / dt
        } else {
            0.0
        };

        let mut output =
            (proportional + self.integral + derivative).clamp(-self.limit, self.limit);

        if self.ramp > 0.0 && dt > 0.0 {
            let max_step = self.ramp * dt;
            let step = output - self.prev_output;
            if step > max_step {
                output = self.prev_output + max_step;
            } else if step < -max_step {
                output = self.prev_output - max_step;
            }
        }

        self.prev_error = error;
        self.prev_output = output;
        output
    }

    /// Clear all accumulated state. Used when the loop (re)starts so stale
    /// integrals cannot kick the motor.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.prev_output = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportional_only() {
        let mut pid = PidController::new(2.0, 0.0, 0.0, 0.0, 100.0);
        assert_eq!(pid.update(5.0, 0.001), 10.0);
    }

    #[test]
    fn test_output_limiting() {
        let mut pid = PidController::new(1.0, 0.0, 0.0, 0.0, 10.0);
        assert_eq!(pid.update(50.0, 0.001), 10.0);
        assert_eq!(pid.update(-50.0, 0.001), -10.0);
    }

    #[test]
    fn test_tustin_integral() {
        let mut pid = PidController::new(0.0, 1.0, 0.0, 0.0, 100.0);
        // First step: 0.5 * (10 + 0) * 0.1 = 0.5
        assert_eq!(pid.update(10.0, 0.1), 0.5);
        // Second step adds 0.5 * (10 + 10) * 0.1 = 1.0
        assert_eq!(pid.update(10.0, 0.1), 1.5);
    }

    #[test]
    fn test_integral_clamped_to_limit() {
        let mut pid = PidController::new(0.0, 100.0, 0.0, 0.0, 5.0);
        for _ in 0..100 {
            pid.update(10.0, 0.1);
        }
        assert_eq!(pid.update(10.0, 0.1), 5.0);
        // The integral itself was clamped, so reversing the error acts
        // immediately instead of unwinding a huge accumulator.
        pid.update(-10.0, 0.1);
        assert!(pid.update(-10.0, 0.1) < 5.0);
    }

    #[test]
    fn test_ramp_limits_slew() {
        let mut pid = PidController::new(1.0, 0.0, 0.0, 100.0, 1000.0);
        // A 500 step with ramp 100/s and dt 0.1 may move at most 10.
        assert_eq!(pid.update(500.0, 0.1), 10.0);
        assert_eq!(pid.update(500.0, 0.1), 20.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut pid = PidController::new(1.0, 1.0, 0.0, 0.0, 100.0);
        pid.update(10.0, 0.1);
        pid.reset();
        assert_eq!(pid.update(0.0, 0.1), 0.0);
    }

    #[test]
    fn test_derivative_acts_on_error_change() {
        let mut pid = PidController::new(0.0, 0.0, 1.0, 0.0, 100.0);
        pid.update(1.0, 0.1);
        // Error unchanged: derivative term is zero.
        assert_eq!(pid.update(1.0, 0.1), 0.0);
    }
}
