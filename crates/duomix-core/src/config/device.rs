//! DeviceConfig - top-level YAML document
//!
//! ```yaml
//! audio:
//!   sources: [left.wav, right.wav]
//!   output: { kind: wav, path: duomix-out.wav }
//! mixer: { gain_ch1: 0.7, gain_ch2: 0.7, pan: 0.0, master_gain: 0.3 }
//! tone: { bass_l: 1.0, treble_l: 1.0, bass_r: 1.0, treble_r: 1.0 }
//! crossover: { enabled: false, cutoff_norm: 0.01136, q: 0.707 }
//! eq:
//!   deadzone: 300
//!   poll_interval_ms: 50
//!   inputs: { low: /sys/bus/iio/devices/iio:device0/in_voltage0_raw, ... }
//! serial: { device: /dev/ttyUSB0 }
//! voice: { mode: music, muted: false }
//! ```
//!
//! Every section and field is optional; missing values take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::io::load_config;
use crate::audio::AudioConfig;
use crate::control::{EqConfig, ParameterSnapshot, VoiceState};
use crate::engine::{CrossoverConfig, MixerParameters, ToneGains};

/// Serial relay settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// DSP serial port; `None` disables relaying
    pub device: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub audio: AudioConfig,
    pub mixer: MixerParameters,
    pub tone: ToneGains,
    pub crossover: CrossoverConfig,
    pub eq: EqConfig,
    pub serial: SerialConfig,
    /// Voice state at power-up
    pub voice: VoiceState,
}

impl DeviceConfig {
    /// Initial contents for the parameter store
    pub fn initial_parameters(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            mixer: self.mixer,
            tone: self.tone,
        }
    }

    pub fn dial_poll_interval(&self) -> Duration {
        Duration::from_millis(self.eq.poll_interval_ms.max(1))
    }

    /// Replace out-of-range values with defaults, logging each one
    pub fn validated(mut self) -> Self {
        self.audio = self.audio.sanitized();

        let params = self.initial_parameters().sanitized();
        self.mixer = params.mixer;
        self.tone = params.tone;

        if !self.crossover.is_valid() {
            log::warn!(
                "crossover: invalid cutoff_norm {} / q {}, using defaults",
                self.crossover.cutoff_norm,
                self.crossover.q
            );
            self.crossover = CrossoverConfig {
                enabled: self.crossover.enabled,
                ..CrossoverConfig::default()
            };
        }
        self
    }
}

/// Load and validate the device configuration at `path`
pub fn load_device_config(path: &Path) -> DeviceConfig {
    load_config::<DeviceConfig>(path).validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OutputTarget;
    use crate::config::save_config;
    use crate::control::{DialInputs, VoiceMode};

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "mixer:\n  pan: -0.5\nserial:\n  device: /dev/ttyS1\nvoice:\n  mode: live\n",
        )
        .unwrap();

        let config = load_device_config(&path);
        assert_eq!(config.mixer.pan, -0.5);
        assert_eq!(config.mixer.gain_ch1, 0.7);
        assert_eq!(config.mixer.master_gain, 0.3);
        assert_eq!(config.serial.device, Some(PathBuf::from("/dev/ttyS1")));
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.eq.deadzone, 300);
        assert!(config.eq.inputs.is_none());
        assert_eq!(config.voice.mode, VoiceMode::Live);
        assert!(!config.voice.muted);
        assert_eq!(config.dial_poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "mixer:\n  gain_ch2: 5.0\n  pan: 0.25\ntone:\n  bass_l: -1.0\ncrossover:\n  enabled: true\n  cutoff_norm: 0.9\n",
        )
        .unwrap();

        let config = load_device_config(&path);
        assert_eq!(config.mixer.gain_ch2, 0.7);
        assert_eq!(config.mixer.pan, 0.25);
        assert_eq!(config.tone.bass_l, 1.0);
        assert!(config.crossover.enabled);
        assert!(config.crossover.is_valid());
    }

    #[test]
    fn test_round_trip_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duomix").join("config.yaml");

        let mut config = DeviceConfig::default();
        config.audio.output = OutputTarget::Wav {
            path: PathBuf::from("/tmp/mix.wav"),
        };
        config.mixer.master_gain = 1.2;
        config.crossover.enabled = true;
        config.eq.inputs = Some(DialInputs {
            low: PathBuf::from("/sys/adc/0"),
            mid: PathBuf::from("/sys/adc/1"),
            high: PathBuf::from("/sys/adc/2"),
            full_scale: 1023,
        });
        config.voice.muted = true;

        save_config(&config, &path).unwrap();
        assert_eq!(load_device_config(&path), config);
    }
}
