//! AudioMixer - Blends two mono sources into one interleaved stereo block
//!
//! Signal flow per sample index `i`:
//!
//! ```text
//!   src1[i] ─┬─[tone]─► × gain_ch1 ─► × master ─► × (1 - pan) if pan > 0 ─► clip ─► left
//!   src2[i] ─┴─[tone]─► × gain_ch2 ─► × master ─► × (1 + pan) if pan < 0 ─► clip ─► right
//! ```
//!
//! Pan is a one-sided linear balance, not an equal-power law: only the
//! opposite channel is attenuated and centre leaves both untouched.
//!
//! The gain stages run in Q16 fixed point on `i64` (48 bits of headroom above
//! the fraction), each stage rounding half away from zero. The optional tone
//! stage (`low·bass + high·treble` through a [`TwoBandCrossover`]) runs in
//! `f32` and is quantised to Q16 before the gain stages.

use serde::{Deserialize, Serialize};

use super::crossover::{CrossoverConfig, TwoBandCrossover};
use crate::types::{Sample, StereoFrame};

const FRAC_BITS: u32 = 16;
const ONE: i64 = 1 << FRAC_BITS;

/// Largest tone-stage output accepted before quantisation (keeps Q16 products in i64)
const TONE_LIMIT: f32 = (1 << 20) as f32;

/// Gain, balance and master volume for the two sources
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerParameters {
    /// Source 1 (left) gain, 0.0..=2.0
    pub gain_ch1: f32,
    /// Source 2 (right) gain, 0.0..=2.0
    pub gain_ch2: f32,
    /// Balance, -1.0 (left only) ..= 1.0 (right only)
    pub pan: f32,
    /// Output volume, 0.0..=2.0
    pub master_gain: f32,
}

impl Default for MixerParameters {
    fn default() -> Self {
        Self {
            gain_ch1: 0.7,
            gain_ch2: 0.7,
            pan: 0.0,
            master_gain: 0.3,
        }
    }
}

impl MixerParameters {
    /// Unity gains, centred, unity master
    pub fn unity() -> Self {
        Self {
            gain_ch1: 1.0,
            gain_ch2: 1.0,
            pan: 0.0,
            master_gain: 1.0,
        }
    }
}

/// Per-channel bass/treble gains applied by the crossover stage
///
/// `1.0` is flat; the range is 0.0..=10.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneGains {
    pub bass_l: f32,
    pub treble_l: f32,
    pub bass_r: f32,
    pub treble_r: f32,
}

impl Default for ToneGains {
    fn default() -> Self {
        Self {
            bass_l: 1.0,
            treble_l: 1.0,
            bass_r: 1.0,
            treble_r: 1.0,
        }
    }
}

/// Shift right by `FRAC_BITS`, rounding half away from zero
#[inline]
fn round_shift(value: i64) -> i64 {
    let half = ONE >> 1;
    if value >= 0 {
        (value + half) >> FRAC_BITS
    } else {
        -((-value + half) >> FRAC_BITS)
    }
}

/// Quantise a linear gain to Q16; NaN maps to 0
#[inline]
fn to_q16(gain: f32) -> i64 {
    (gain as f64 * ONE as f64).round() as i64
}

#[inline]
fn clip(value: i64) -> Sample {
    value.clamp(Sample::MIN as i64, Sample::MAX as i64) as Sample
}

/// Gain stage coefficients for one block, all Q16
#[derive(Debug, Clone, Copy)]
struct GainStage {
    gain_l: i64,
    gain_r: i64,
    master: i64,
    pan_l: Option<i64>,
    pan_r: Option<i64>,
}

impl GainStage {
    fn new(params: &MixerParameters) -> Self {
        let pan = params.pan;
        Self {
            gain_l: to_q16(params.gain_ch1),
            gain_r: to_q16(params.gain_ch2),
            master: to_q16(params.master_gain),
            pan_l: (pan > 0.0).then(|| to_q16(1.0 - pan)),
            pan_r: (pan < 0.0).then(|| to_q16(1.0 + pan)),
        }
    }

    /// Run one Q16 input through gain, master and balance; returns the clipped sample
    #[inline]
    fn apply(input_q16: i64, gain: i64, master: i64, pan: Option<i64>) -> Sample {
        let mut v = round_shift(input_q16 * gain);
        v = round_shift(v * master);
        if let Some(factor) = pan {
            v = round_shift(v * factor);
        }
        clip(round_shift(v))
    }

    #[inline]
    fn frame(&self, left_q16: i64, right_q16: i64) -> StereoFrame {
        StereoFrame::new(
            Self::apply(left_q16, self.gain_l, self.master, self.pan_l),
            Self::apply(right_q16, self.gain_r, self.master, self.pan_r),
        )
    }
}

/// Stereo mixer for two mono sources
///
/// Owns one crossover per channel; their filter history carries over between
/// blocks and is cleared by [`reset`](Self::reset) when the pipeline restarts.
pub struct AudioMixer {
    crossover: CrossoverConfig,
    left: TwoBandCrossover,
    right: TwoBandCrossover,
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new(CrossoverConfig::default())
    }
}

impl AudioMixer {
    pub fn new(crossover: CrossoverConfig) -> Self {
        Self {
            left: TwoBandCrossover::from_config(&crossover),
            right: TwoBandCrossover::from_config(&crossover),
            crossover,
        }
    }

    /// Mix `src1` (left) and `src2` (right) into `dest`
    ///
    /// Processes `n = min(src1.len(), src2.len(), dest.len())` frames and
    /// returns `n`; frames of `dest` past `n` are left untouched.
    pub fn mix(
        &self,
        dest: &mut [StereoFrame],
        src1: &[Sample],
        src2: &[Sample],
        params: &MixerParameters,
    ) -> usize {
        let stage = GainStage::new(params);
        let n = src1.len().min(src2.len()).min(dest.len());

        for ((out, &l), &r) in dest[..n].iter_mut().zip(src1).zip(src2) {
            *out = stage.frame((l as i64) << FRAC_BITS, (r as i64) << FRAC_BITS);
        }
        n
    }

    /// Like [`mix`](Self::mix), with the bass/treble stage in front when enabled
    pub fn mix_with_tone(
        &mut self,
        dest: &mut [StereoFrame],
        src1: &[Sample],
        src2: &[Sample],
        params: &MixerParameters,
        tone: &ToneGains,
    ) -> usize {
        if !self.crossover.enabled {
            return self.mix(dest, src1, src2, params);
        }

        let stage = GainStage::new(params);
        let n = src1.len().min(src2.len()).min(dest.len());

        for ((out, &l), &r) in dest[..n].iter_mut().zip(src1).zip(src2) {
            let (low_l, high_l) = self.left.split(l as f32);
            let (low_r, high_r) = self.right.split(r as f32);
            let eq_l = low_l * tone.bass_l + high_l * tone.treble_l;
            let eq_r = low_r * tone.bass_r + high_r * tone.treble_r;
            *out = stage.frame(Self::quantise(eq_l), Self::quantise(eq_r));
        }
        n
    }

    /// Clear crossover history (pipeline restart)
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    #[inline]
    fn quantise(sample: f32) -> i64 {
        let bounded = if sample.is_nan() {
            0.0
        } else {
            sample.clamp(-TONE_LIMIT, TONE_LIMIT)
        };
        (bounded as f64 * ONE as f64).round() as i64
    }
}
