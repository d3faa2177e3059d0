//! Physical dial poller
//!
//! Samples each band's potentiometer at a fixed interval and offers the raw
//! readings to the [`EqInputArbiter`], which decides whether they count as
//! deliberate movement.
//!
//! [`FileDialSensor`] reads one text file per band holding the ADC count,
//! the way Linux IIO exposes it (`/sys/bus/iio/devices/iio:device0/in_voltage0_raw`),
//! and scales it to the 16-bit range the arbiter expects.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::eq::{EqInputArbiter, DEFAULT_DEADZONE};
use crate::types::EqBand;

/// Source of raw 16-bit dial readings
pub trait DialSensor: Send {
    /// Current reading for `band`, or `None` if the sensor is unavailable
    fn read_raw(&mut self, band: EqBand) -> Option<u16>;
}

/// Per-band ADC input files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialInputs {
    pub low: PathBuf,
    pub mid: PathBuf,
    pub high: PathBuf,
    /// Largest count the ADC reports (4095 for 12 bits)
    #[serde(default = "default_full_scale")]
    pub full_scale: u32,
}

fn default_full_scale() -> u32 {
    4095
}

/// Dial handling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqConfig {
    /// Minimum raw delta treated as deliberate movement
    pub deadzone: u16,
    /// Interval between sensor sweeps
    pub poll_interval_ms: u64,
    /// Physical dials; `None` leaves the EQ to digital control only
    pub inputs: Option<DialInputs>,
}

impl Default for EqConfig {
    fn default() -> Self {
        Self {
            deadzone: DEFAULT_DEADZONE,
            poll_interval_ms: 50,
            inputs: None,
        }
    }
}

/// Reads ADC counts from text files and scales them to `0..=65535`
pub struct FileDialSensor {
    paths: [PathBuf; 3],
    full_scale: u32,
    /// Bands whose last read failed, so each outage is logged once
    failing: [bool; 3],
}

impl FileDialSensor {
    pub fn new(inputs: &DialInputs) -> Self {
        Self {
            paths: [inputs.low.clone(), inputs.mid.clone(), inputs.high.clone()],
            full_scale: inputs.full_scale.max(1),
            failing: [false; 3],
        }
    }

    /// Scale an ADC count to 16 bits, rounding to nearest
    pub fn scale(&self, count: u32) -> u16 {
        let count = u64::from(count.min(self.full_scale));
        let full = u64::from(self.full_scale);
        ((count * 65535 + full / 2) / full) as u16
    }

    fn read_count(&self, band: EqBand) -> Result<u32, String> {
        let text = fs::read_to_string(&self.paths[band.index()]).map_err(|e| e.to_string())?;
        text.trim()
            .parse::<u32>()
            .map_err(|_| format!("unexpected contents {:?}", text.trim()))
    }
}

impl DialSensor for FileDialSensor {
    fn read_raw(&mut self, band: EqBand) -> Option<u16> {
        let index = band.index();
        match self.read_count(band) {
            Ok(count) => {
                if self.failing[index] {
                    log::info!("Dial {} readable again", band);
                    self.failing[index] = false;
                }
                Some(self.scale(count))
            }
            Err(e) => {
                if !self.failing[index] {
                    log::warn!("Dial {} unreadable ({:?}): {}", band, self.paths[index], e);
                    self.failing[index] = true;
                }
                None
            }
        }
    }
}

/// Running poller; stops and joins on [`stop`](Self::stop) or drop
pub struct DialPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DialPoller {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Dial poller thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for DialPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One sweep over all bands; returns how many readings were accepted
pub fn poll_once(sensor: &mut dyn DialSensor, arbiter: &EqInputArbiter) -> usize {
    EqBand::ALL
        .into_iter()
        .filter_map(|band| sensor.read_raw(band).map(|raw| (band, raw)))
        .filter(|&(band, raw)| arbiter.on_physical_sample(band, raw).is_some())
        .count()
}

/// Spawn a thread polling `sensor` every `interval`
pub fn spawn_dial_poller(
    mut sensor: Box<dyn DialSensor>,
    arbiter: Arc<EqInputArbiter>,
    interval: Duration,
) -> std::io::Result<DialPoller> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let handle = thread::Builder::new()
        .name("duomix-dials".into())
        .spawn(move || {
            log::info!("Dial poller started ({:?} interval)", interval);
            while !stop_flag.load(Ordering::Acquire) {
                poll_once(sensor.as_mut(), &arbiter);
                thread::sleep(interval);
            }
            log::info!("Dial poller stopped");
        })?;

    Ok(DialPoller {
        stop,
        handle: Some(handle),
    })
}
