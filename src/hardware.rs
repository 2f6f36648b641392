//! Hardware abstraction boundary.
//!
//! The control core is written against these traits so the board-specific
//! peripherals (magnetic encoder, current-sense amplifiers, PWM timer,
//! BLE link) stay out of the algorithm code and the whole loop runs under
//! test with mock implementations.

/// Angle sensor fault, surfaced during calibration and refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The sensor did not answer on its bus.
    Unresponsive,
    /// The sensor answered with an out-of-range or corrupt reading.
    InvalidReading,
}

/// Absolute angle sensor on the rotor shaft.
///
/// `refresh` samples the hardware; the getters return the values captured
/// by the most recent refresh so one control tick sees a consistent state.
pub trait AngleSensor {
    /// Sample the sensor. Must be called once per control tick before the
    /// getters.
    fn refresh(&mut self) -> Result<(), SensorError>;

    /// Mechanical angle within one turn, radians in [0, 2*PI).
    fn mechanical_angle(&self) -> f32;

    /// Accumulated mechanical angle across turns, radians.
    fn angle(&self) -> f32;

    /// Shaft velocity, radians per second.
    fn velocity(&self) -> f32;
}

/// Phase current measurement inputs, in volts at the shunt amplifier
/// outputs. Phase C is optional; two-shunt boards reconstruct without it.
pub trait CurrentAdc {
    fn phase_a(&mut self) -> f32;
    fn phase_b(&mut self) -> f32;
    fn phase_c(&mut self) -> Option<f32>;
}

/// Three-phase PWM output. Duties are normalized to [0, 1].
pub trait DutySink {
    fn set_duty(&mut self, a: f32, b: f32, c: f32);
}

/// Byte transport for command frames and responses.
pub trait Transport {
    /// Send a response frame. Errors are swallowed by callers; a dropped
    /// acknowledgement must never stall the control loop.
    fn send(&mut self, data: &[u8]);

    /// Whether a peer is connected. Responses are skipped when not.
    fn is_connected(&self) -> bool;
}
