// Inline phase current sensing and q-axis current reconstruction

use embedded_hal::delay::DelayNs;

use crate::config::{calibration, sensing};
use crate::fmt::*;
use crate::foc::transforms::cossin;
use crate::hardware::CurrentAdc;

const ONE_OVER_SQRT3: f32 = 0.577_350_26;
const TWO_OVER_SQRT3: f32 = 1.154_700_5;

/// Instantaneous phase currents [A].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhaseCurrents {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

/// Inline shunt current sensing.
///
/// Converts amplifier output voltages to phase currents and projects them
/// onto the rotor q axis. Boards with only two shunts report phase C as
/// zero; the q-axis projection only needs two phases anyway.
pub struct CurrentSense<A> {
    adc: A,
    gain_a: f32,
    gain_b: f32,
    gain_c: f32,
    offset_a: f32,
    offset_b: f32,
    offset_c: f32,
    latest: PhaseCurrents,
}

impl<A: CurrentAdc> CurrentSense<A> {
    pub fn new(adc: A) -> Self {
        let gain = 1.0 / sensing::VOLTS_PER_AMP;
        Self {
            adc,
            gain_a: gain,
            gain_b: gain,
            gain_c: gain,
            offset_a: 0.0,
            offset_b: 0.0,
            offset_c: 0.0,
            latest: PhaseCurrents::default(),
        }
    }

    /// Measure the zero-current ADC offsets.
    ///
    /// Must run with the driver outputting zero torque. Averages
    /// [`calibration::OFFSET_ROUNDS`] samples per phase with a short pause
    /// between rounds so the samples are not correlated.
    pub fn calibrate_offsets(&mut self, delay: &mut impl DelayNs) {
        let mut sum_a = 0.0f32;
        let mut sum_b = 0.0f32;
        let mut sum_c = 0.0f32;
        let mut have_c = true;

        for _ in 0..calibration::OFFSET_ROUNDS {
            sum_a += self.adc.phase_a();
            sum_b += self.adc.phase_b();
            match self.adc.phase_c() {
                Some(v) => sum_c += v,
                None => have_c = false,
            }
            delay.delay_us(calibration::OFFSET_SAMPLE_DELAY_US);
        }

        let rounds = calibration::OFFSET_ROUNDS as f32;
        self.offset_a = sum_a / rounds;
        self.offset_b = sum_b / rounds;
        self.offset_c = if have_c { sum_c / rounds } else { 0.0 };

        info!(
            "Current offsets: a={} b={} c={}",
            self.offset_a, self.offset_b, self.offset_c
        );
    }

    /// Sample all phases once. Call once per control tick.
    pub fn refresh(&mut self) {
        let a = (self.adc.phase_a() - self.offset_a) * self.gain_a;
        let b = (self.adc.phase_b() - self.offset_b) * self.gain_b;
        let c = match self.adc.phase_c() {
            Some(v) => (v - self.offset_c) * self.gain_c,
            None => 0.0,
        };
        self.latest = PhaseCurrents { a, b, c };
    }

    /// Phase currents captured by the last [`refresh`](Self::refresh).
    pub fn currents(&self) -> PhaseCurrents {
        self.latest
    }

    /// q-axis current at electrical angle `theta`, from the last refresh.
    ///
    /// Clarke from phases A and B, then the q projection of the Park
    /// transform. Phase C is not needed for a balanced winding.
    pub fn iq(&self, theta: f32) -> f32 {
        let i_alpha = self.latest.a;
        let i_beta = ONE_OVER_SQRT3 * self.latest.a + TWO_OVER_SQRT3 * self.latest.b;

        let (cos_theta, sin_theta) = cossin(theta);
        i_beta * cos_theta - i_alpha * sin_theta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::FRAC_PI_2;

    struct MockAdc {
        a: f32,
        b: f32,
        c: Option<f32>,
    }

    impl CurrentAdc for MockAdc {
        fn phase_a(&mut self) -> f32 {
            self.a
        }
        fn phase_b(&mut self) -> f32 {
            self.b
        }
        fn phase_c(&mut self) -> Option<f32> {
            self.c
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_offsets_cancel_bias() {
        // 1.65 V mid-rail bias on both phases.
        let adc = MockAdc {
            a: 1.65,
            b: 1.65,
            c: Some(1.65),
        };
        let mut sense = CurrentSense::new(adc);
        sense.calibrate_offsets(&mut NoDelay);
        sense.refresh();

        let i = sense.currents();
        assert!(i.a.abs() < 1e-4);
        assert!(i.b.abs() < 1e-4);
        assert!(i.c.abs() < 1e-4);
    }

    #[test]
    fn test_missing_phase_c_reads_zero() {
        let adc = MockAdc {
            a: 0.0,
            b: 0.0,
            c: None,
        };
        let mut sense = CurrentSense::new(adc);
        sense.calibrate_offsets(&mut NoDelay);
        sense.refresh();
        assert_eq!(sense.currents().c, 0.0);
    }

    #[test]
    fn test_gain_converts_volts_to_amps() {
        // 0.5 ohm*gain product: 0.5 V across the amplifier output is 1 A.
        let adc = MockAdc {
            a: sensing::VOLTS_PER_AMP,
            b: 0.0,
            c: Some(0.0),
        };
        let mut sense = CurrentSense::new(adc);
        sense.refresh();
        assert!((sense.currents().a - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_iq_projection() {
        // ia = 1, ib = -0.5 gives i_alpha = 1, i_beta ~ 0 (balanced set).
        let adc = MockAdc {
            a: sensing::VOLTS_PER_AMP,
            b: -0.5 * sensing::VOLTS_PER_AMP,
            c: Some(0.0),
        };
        let mut sense = CurrentSense::new(adc);
        sense.refresh();

        // At theta = 0: iq = i_beta. At theta = PI/2: iq = -i_alpha.
        assert!(sense.iq(0.0).abs() < 1e-2);
        assert!((sense.iq(FRAC_PI_2) + 1.0).abs() < 1e-2);
    }
}
