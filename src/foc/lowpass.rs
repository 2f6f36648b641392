// First-order low-pass filter for velocity and current feedback

/// Exponential low-pass filter with time constant `tf` seconds.
pub struct LowPassFilter {
    tf: f32,
    prev: f32,
}

impl LowPassFilter {
    pub const fn new(tf: f32) -> Self {
        Self { tf, prev: 0.0 }
    }

    /// Filter one sample taken `dt` seconds after the previous one.
    ///
    /// After a long gap the filter state is stale and the sample passes
    /// through unfiltered instead of being dragged by ancient history.
    pub fn update(&mut self, input: f32, dt: f32) -> f32 {
        if dt <= 0.0 || dt > 0.3 {
            self.prev = input;
            return input;
        }

        let alpha = self.tf / (self.tf + dt);
        let output = alpha * self.prev + (1.0 - alpha) * input;
        self.prev = output;
        output
    }

    pub fn reset(&mut self) {
        self.prev = 0.0;
    }
}
