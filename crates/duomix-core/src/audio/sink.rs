//! Audio sinks - consumers of the mixed interleaved PCM stream
//!
//! The consumer hands the sink whatever the ring buffer yields, which is not
//! necessarily frame aligned. [`FrameAssembler`] carries split frames over to
//! the next write so sinks only ever see whole `[left, right]` pairs.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::error::SinkError;
use crate::types::{Sample, StereoFrame, BYTES_PER_FRAME};

/// Hardware (or stand-in) output for the mixed stream
pub trait AudioSink: Send {
    /// Queue `bytes` of little-endian interleaved stereo PCM for output
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Flush and release the output; further writes fail with [`SinkError::Closed`]
    fn release(&mut self) -> Result<(), SinkError>;
}

/// Reassembles whole stereo frames from an unaligned byte stream
#[derive(Debug, Default)]
pub struct FrameAssembler {
    carry: [u8; BYTES_PER_FRAME],
    carry_len: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, calling `emit` for every completed frame
    pub fn push(&mut self, mut bytes: &[u8], mut emit: impl FnMut(StereoFrame)) {
        if self.carry_len > 0 {
            let need = BYTES_PER_FRAME - self.carry_len;
            let take = need.min(bytes.len());
            self.carry[self.carry_len..self.carry_len + take].copy_from_slice(&bytes[..take]);
            self.carry_len += take;
            bytes = &bytes[take..];
            if self.carry_len < BYTES_PER_FRAME {
                return;
            }
            emit(Self::decode(&self.carry));
            self.carry_len = 0;
        }

        let mut frames = bytes.chunks_exact(BYTES_PER_FRAME);
        for frame in &mut frames {
            emit(Self::decode(frame));
        }
        let rest = frames.remainder();
        self.carry[..rest.len()].copy_from_slice(rest);
        self.carry_len = rest.len();
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending(&self) -> usize {
        self.carry_len
    }

    #[inline]
    fn decode(bytes: &[u8]) -> StereoFrame {
        StereoFrame::new(
            Sample::from_le_bytes([bytes[0], bytes[1]]),
            Sample::from_le_bytes([bytes[2], bytes[3]]),
        )
    }
}

/// Writes the mixed stream to a 16-bit stereo WAV file
pub struct WavFileSink {
    path: PathBuf,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    assembler: FrameAssembler,
    frames_written: u64,
}

impl WavFileSink {
    /// Create (or truncate) `path`
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, SinkError> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)?;
        log::info!("WAV sink opened: {:?} ({} Hz)", path, sample_rate);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            assembler: FrameAssembler::new(),
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl AudioSink for WavFileSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        let mut result = Ok(());
        let mut frames = 0u64;
        self.assembler.push(bytes, |frame| {
            if result.is_ok() {
                result = writer.write_sample(frame.left);
                if result.is_ok() {
                    result = writer.write_sample(frame.right);
                }
                frames += 1;
            }
        });
        self.frames_written += frames;
        result.map_err(SinkError::from)
    }

    fn release(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            if self.assembler.pending() > 0 {
                log::debug!(
                    "WAV sink dropping {} bytes of an incomplete frame",
                    self.assembler.pending()
                );
            }
            writer.finalize()?;
            log::info!(
                "WAV sink closed: {:?} ({} frames)",
                self.path,
                self.frames_written
            );
        }
        Ok(())
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to finalize WAV sink {:?}: {}", self.path, e);
        }
    }
}
