//! Two-band biquad crossover
//!
//! Splits a mono signal into a bass and a treble band with a 12 dB/oct
//! lowpass/highpass pair sharing one cutoff. With Q = 0.707 both halves are
//! Butterworth; the pair does not sum perfectly flat around the cutoff, so the
//! mixer only inserts this stage when tone shaping is switched on.
//!
//! Coefficients follow the RBJ cookbook in the `K = tan(π·fc)` form, where
//! `fc` is the cutoff normalised to the sample rate (`cutoff_hz / sample_rate`).

use serde::{Deserialize, Serialize};

use crate::types::SAMPLE_RATE;

/// Default crossover frequency in Hz
pub const DEFAULT_CUTOFF_HZ: f32 = 500.0;

/// Butterworth Q
pub const DEFAULT_Q: f32 = 0.707;

/// Crossover settings, normalised to the sample rate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverConfig {
    /// Insert the bass/treble stage before the gain stage
    pub enabled: bool,
    /// Cutoff as a fraction of the sample rate, in (0, 0.5)
    pub cutoff_norm: f32,
    /// Filter quality factor
    pub q: f32,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cutoff_norm: DEFAULT_CUTOFF_HZ / SAMPLE_RATE as f32,
            q: DEFAULT_Q,
        }
    }
}

impl CrossoverConfig {
    /// Check that the cutoff lies below Nyquist and Q is positive
    pub fn is_valid(&self) -> bool {
        self.cutoff_norm.is_finite()
            && self.cutoff_norm > 0.0
            && self.cutoff_norm < 0.5
            && self.q.is_finite()
            && self.q > 0.0
    }
}

/// Biquad filter coefficients (b = feed-forward, a = feedback, a0 normalised)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    /// Second-order lowpass at normalised cutoff `fc`
    pub fn lowpass(fc: f32, q: f32) -> Self {
        let k = (std::f32::consts::PI * fc).tan();
        let norm = 1.0 / (1.0 + k / q + k * k);
        let b0 = k * k * norm;
        Self {
            b0,
            b1: 2.0 * b0,
            b2: b0,
            a1: 2.0 * (k * k - 1.0) * norm,
            a2: (1.0 - k / q + k * k) * norm,
        }
    }

    /// Second-order highpass at normalised cutoff `fc`
    pub fn highpass(fc: f32, q: f32) -> Self {
        let k = (std::f32::consts::PI * fc).tan();
        let norm = 1.0 / (1.0 + k / q + k * k);
        Self {
            b0: norm,
            b1: -2.0 * norm,
            b2: norm,
            a1: 2.0 * (k * k - 1.0) * norm,
            a2: (1.0 - k / q + k * k) * norm,
        }
    }
}

/// Direct-form I history for one mono filter
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f32, c: &BiquadCoeffs) -> f32 {
        let out = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = out;
        out
    }
}

/// Lowpass/highpass pair for one mono channel
///
/// Filter history persists across blocks; call [`reset`](Self::reset) only
/// when the stream restarts.
#[derive(Debug, Clone)]
pub struct TwoBandCrossover {
    low_coeffs: BiquadCoeffs,
    high_coeffs: BiquadCoeffs,
    low: BiquadState,
    high: BiquadState,
}

impl TwoBandCrossover {
    pub fn new(cutoff_norm: f32, q: f32) -> Self {
        Self {
            low_coeffs: BiquadCoeffs::lowpass(cutoff_norm, q),
            high_coeffs: BiquadCoeffs::highpass(cutoff_norm, q),
            low: BiquadState::default(),
            high: BiquadState::default(),
        }
    }

    pub fn from_config(config: &CrossoverConfig) -> Self {
        Self::new(config.cutoff_norm, config.q)
    }

    /// Split one sample into `(low, high)`
    #[inline]
    pub fn split(&mut self, input: f32) -> (f32, f32) {
        let low = self.low.process(input, &self.low_coeffs);
        let high = self.high.process(input, &self.high_coeffs);
        (low, high)
    }

    /// Clear filter history
    pub fn reset(&mut self) {
        self.low = BiquadState::default();
        self.high = BiquadState::default();
    }
}
