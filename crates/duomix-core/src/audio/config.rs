//! Audio pipeline configuration
//!
//! Sizes of the chunk, ring and sink transfer blocks, worker cadence, the
//! startup retry window and where the mixed stream goes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{BYTES_PER_FRAME, BYTES_PER_SAMPLE, SAMPLE_RATE, WAV_HEADER_LEN};

/// Mono bytes read from each source per producer cycle
pub const DEFAULT_CHUNK_BYTES: usize = 2048;

/// Ring buffer capacity in bytes
pub const DEFAULT_RING_CAPACITY: usize = 16384;

/// Bytes handed to the sink per consumer cycle
pub const DEFAULT_TRANSFER_SIZE: usize = 1024;

/// Where the mixed stream is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputTarget {
    /// 16-bit stereo WAV file (host stand-in for the I2S DAC)
    Wav { path: PathBuf },
    /// Default system output device (requires the `cpal-backend` feature)
    Cpal,
}

impl Default for OutputTarget {
    fn default() -> Self {
        OutputTarget::Wav {
            path: PathBuf::from("duomix-out.wav"),
        }
    }
}

/// Configuration for the audio pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// The two mono sources: left channel, right channel
    pub sources: [PathBuf; 2],

    /// Header bytes skipped at open and on every loop
    pub header_len: u64,

    /// Mono bytes read from each source per producer cycle
    pub chunk_bytes: usize,

    /// Ring buffer capacity in bytes (one byte is always kept free)
    pub ring_capacity: usize,

    /// Bytes written to the sink per consumer cycle
    pub transfer_size: usize,

    /// Consumer cadence; `None` = playback time of one transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_period_us: Option<u64>,

    /// Producer sleep when the ring is full or sources are dry
    pub idle_backoff_us: u64,

    /// Total time allowed for acquiring sources and sink
    pub startup_timeout_ms: u64,

    /// Delay between startup attempts
    pub startup_retry_ms: u64,

    /// Sink selection
    pub output: OutputTarget,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            sources: [PathBuf::from("left.wav"), PathBuf::from("right.wav")],
            header_len: WAV_HEADER_LEN,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            ring_capacity: DEFAULT_RING_CAPACITY,
            transfer_size: DEFAULT_TRANSFER_SIZE,
            consumer_period_us: None,
            idle_backoff_us: 500,
            startup_timeout_ms: 2000,
            startup_retry_ms: 250,
            output: OutputTarget::default(),
        }
    }
}

impl AudioConfig {
    /// Mono samples per source per producer cycle
    pub fn chunk_samples(&self) -> usize {
        (self.chunk_bytes / BYTES_PER_SAMPLE).max(1)
    }

    /// Consumer cadence
    pub fn consumer_period(&self) -> Duration {
        match self.consumer_period_us {
            Some(us) => Duration::from_micros(us),
            None => {
                let frames = (self.transfer_size / BYTES_PER_FRAME).max(1) as u64;
                Duration::from_micros(frames * 1_000_000 / self.sample_rate.max(1) as u64)
            }
        }
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_micros(self.idle_backoff_us)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn startup_retry(&self) -> Duration {
        Duration::from_millis(self.startup_retry_ms)
    }

    /// Replace zero sizes with the defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.sample_rate == 0 {
            log::warn!("audio.sample_rate is 0, using {}", defaults.sample_rate);
            self.sample_rate = defaults.sample_rate;
        }
        if self.chunk_bytes < BYTES_PER_SAMPLE {
            log::warn!("audio.chunk_bytes too small, using {}", defaults.chunk_bytes);
            self.chunk_bytes = defaults.chunk_bytes;
        }
        if self.transfer_size < BYTES_PER_FRAME {
            log::warn!("audio.transfer_size too small, using {}", defaults.transfer_size);
            self.transfer_size = defaults.transfer_size;
        } else if self.transfer_size % BYTES_PER_FRAME != 0 {
            let aligned = self.transfer_size / BYTES_PER_FRAME * BYTES_PER_FRAME;
            log::warn!(
                "audio.transfer_size {} is not a whole number of frames, using {}",
                self.transfer_size,
                aligned
            );
            self.transfer_size = aligned;
        }
        // One slot stays free, so a full transfer needs one extra byte
        let min_ring = self.transfer_size + 1;
        if self.ring_capacity < min_ring {
            let capacity = defaults.ring_capacity.max(min_ring);
            log::warn!(
                "audio.ring_capacity {} cannot hold one transfer, using {}",
                self.ring_capacity,
                capacity
            );
            self.ring_capacity = capacity;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_consumer_period() {
        let config = AudioConfig::default();
        // 1024 bytes = 256 frames at 44 kHz
        assert_eq!(config.consumer_period(), Duration::from_micros(5818));
        assert_eq!(config.chunk_samples(), 1024);
    }

    #[test]
    fn test_explicit_consumer_period() {
        let config = AudioConfig {
            consumer_period_us: Some(100),
            ..Default::default()
        };
        assert_eq!(config.consumer_period(), Duration::from_micros(100));
    }

    #[test]
    fn test_sanitized_replaces_zero_sizes() {
        let config = AudioConfig {
            transfer_size: 0,
            ring_capacity: 1,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.transfer_size, DEFAULT_TRANSFER_SIZE);
        assert_eq!(config.ring_capacity, DEFAULT_RING_CAPACITY);
    }

    #[test]
    fn test_sanitized_ring_holds_one_transfer() {
        let config = AudioConfig {
            ring_capacity: 4,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.ring_capacity, DEFAULT_RING_CAPACITY);

        let config = AudioConfig {
            ring_capacity: 64,
            transfer_size: 64,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.ring_capacity, DEFAULT_RING_CAPACITY);

        let config = AudioConfig {
            ring_capacity: 33,
            transfer_size: 32,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.ring_capacity, 33);
    }

    #[test]
    fn test_sanitized_transfer_is_whole_frames() {
        let config = AudioConfig {
            transfer_size: 6,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.transfer_size, 4);

        let config = AudioConfig {
            transfer_size: 3,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.transfer_size, DEFAULT_TRANSFER_SIZE);
        assert_eq!(config.transfer_size % BYTES_PER_FRAME, 0);
    }

    #[test]
    fn test_output_target_yaml_shape() {
        let yaml = serde_yaml::to_string(&OutputTarget::Cpal).unwrap();
        assert!(yaml.contains("kind: cpal"));
        let parsed: OutputTarget = serde_yaml::from_str("kind: wav\npath: /tmp/out.wav\n").unwrap();
        assert_eq!(
            parsed,
            OutputTarget::Wav {
                path: PathBuf::from("/tmp/out.wav")
            }
        );
    }
}
