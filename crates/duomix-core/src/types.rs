//! Common types for duomix
//!
//! Fundamental sample and control types shared by the audio path and the
//! control plane: 16-bit PCM frames, byte conversion helpers, EQ bands and
//! control sources.

use serde::{Deserialize, Serialize};

/// Default output sample rate of the device (Hz)
pub const SAMPLE_RATE: u32 = 44_000;

/// Bytes per mono 16-bit sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes per interleaved stereo frame (two 16-bit samples)
pub const BYTES_PER_FRAME: usize = BYTES_PER_SAMPLE * 2;

/// Size of the canonical RIFF/WAVE header skipped at stream open
pub const WAV_HEADER_LEN: u64 = 44;

/// Mono PCM sample as stored on the SD card
pub type Sample = i16;

/// A single interleaved stereo frame
///
/// `#[repr(C)]` keeps the layout `[left, right]`, so a `&[StereoFrame]`
/// can be viewed as interleaved `&[i16]` with bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoFrame {
    pub left: Sample,
    pub right: Sample,
}

impl StereoFrame {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }
}

/// View a frame slice as interleaved samples (`[l0, r0, l1, r1, ...]`)
pub fn frames_as_samples(frames: &[StereoFrame]) -> &[Sample] {
    bytemuck::cast_slice(frames)
}

/// Decode little-endian 16-bit PCM bytes into samples
///
/// A trailing odd byte (torn sample) is ignored. Returns the number of
/// samples written, which is bounded by `out.len()`.
pub fn decode_pcm_le(bytes: &[u8], out: &mut [Sample]) -> usize {
    let mut count = 0;
    for (chunk, slot) in bytes.chunks_exact(BYTES_PER_SAMPLE).zip(out.iter_mut()) {
        *slot = i16::from_le_bytes([chunk[0], chunk[1]]);
        count += 1;
    }
    count
}

/// Encode stereo frames as little-endian interleaved PCM bytes
///
/// `out` is cleared first; its capacity is reused.
pub fn encode_frames_le(frames: &[StereoFrame], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(frames.len() * BYTES_PER_FRAME);
    for sample in frames_as_samples(frames) {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

/// Equalizer band identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(usize)]
pub enum EqBand {
    Low = 0,
    Mid = 1,
    High = 2,
}

impl EqBand {
    /// All bands in display order
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];

    /// Lowercase name used on the wire and in status messages
    pub fn name(&self) -> &'static str {
        match self {
            EqBand::Low => "low",
            EqBand::Mid => "mid",
            EqBand::High => "high",
        }
    }

    /// Parse a band name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|band| band.name().eq_ignore_ascii_case(name))
    }

    #[inline]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for EqBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which input channel last set a band's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlSource {
    /// Rotary potentiometer on the front panel
    #[default]
    Physical,
    /// Web UI / network command
    Digital,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_view_is_interleaved() {
        let frames = [StereoFrame::new(1, -1), StereoFrame::new(2, -2)];
        assert_eq!(frames_as_samples(&frames), &[1, -1, 2, -2]);
    }

    #[test]
    fn test_decode_ignores_torn_sample() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x7f];
        let mut out = [0i16; 4];
        assert_eq!(decode_pcm_le(&bytes, &mut out), 2);
        assert_eq!(&out[..2], &[1, -1]);
    }

    #[test]
    fn test_encode_frames_little_endian() {
        let mut out = Vec::new();
        encode_frames_le(&[StereoFrame::new(0x0102, -2)], &mut out);
        assert_eq!(out, vec![0x02, 0x01, 0xfe, 0xff]);
    }

    #[test]
    fn test_band_names() {
        assert_eq!(EqBand::from_name("HIGH"), Some(EqBand::High));
        assert_eq!(EqBand::from_name("treble"), None);
        assert_eq!(EqBand::Mid.index(), 1);
    }
}
