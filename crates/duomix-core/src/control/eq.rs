//! EqInputArbiter - resolves physical dial vs. digital updates per EQ band
//!
//! Two input classes write the same three bands: rotary potentiometers
//! sampled by a poller, and digital commands from the network/console.
//!
//! - Digital updates are always accepted and make the band "sticky digital".
//!   There is no timeout.
//! - A physical sample replaces the value only when it moved far enough from
//!   the last accepted raw reading: more than `deadzone` while the dial owns
//!   the band, more than `2 × deadzone` to take the band back from digital.
//! - The first physical sample of a band is always accepted, so the dial
//!   position is picked up at boot, unless a digital value arrived first.
//!
//! Rejected samples do not move the reference reading, so slow drift cannot
//! creep past the threshold one small step at a time.
//!
//! Listeners are called in the order updates were committed, the same way as
//! for the [`ParameterStore`](super::ParameterStore).

use std::sync::{Mutex, RwLock};

use serde::Serialize;

use super::error::{check_range, ValidationResult};
use crate::sync::{lock, read, write};
use crate::types::{ControlSource, EqBand};

/// Default minimum raw delta treated as deliberate dial movement
pub const DEFAULT_DEADZONE: u16 = 300;

/// Displayed EQ range in dB
pub const EQ_DB_RANGE: (f32, f32) = (-12.0, 12.0);

/// Convert a raw 16-bit dial reading to dB
///
/// The pots are wired reversed: fully clockwise (65535) reads as -12 dB.
/// Values are rounded to one decimal.
pub fn adc_to_db(raw: u16) -> f32 {
    let (min, max) = EQ_DB_RANGE;
    let db = (min + raw as f32 / 65535.0 * (max - min)).clamp(min, max);
    // `+ 0.0` folds -0.0 into 0.0
    -(db * 10.0).round() / 10.0 + 0.0
}

/// Live state of one band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EqBandState {
    /// Current value in dB, -12..=12
    pub live_db: f32,
    /// Input class that set `live_db`
    pub last_source: ControlSource,
    /// Last accepted dial reading
    pub last_raw_adc: u16,
}

impl Default for EqBandState {
    fn default() -> Self {
        Self {
            live_db: 0.0,
            last_source: ControlSource::Physical,
            last_raw_adc: 0,
        }
    }
}

/// All three bands at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EqSnapshot {
    pub bands: [EqBandState; 3],
}

impl EqSnapshot {
    pub fn band(&self, band: EqBand) -> &EqBandState {
        &self.bands[band.index()]
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BandSlot {
    state: EqBandState,
    /// Set by the first accepted physical sample or any digital update
    primed: bool,
}

/// Listener for accepted band changes
pub type EqListener = Box<dyn Fn(EqBand, &EqSnapshot) + Send + Sync>;

pub struct EqInputArbiter {
    deadzone: u16,
    bands: Mutex<[BandSlot; 3]>,
    notify_order: Mutex<()>,
    listeners: RwLock<Vec<EqListener>>,
}

impl Default for EqInputArbiter {
    fn default() -> Self {
        Self::new(DEFAULT_DEADZONE)
    }
}

impl EqInputArbiter {
    pub fn new(deadzone: u16) -> Self {
        Self {
            deadzone,
            bands: Mutex::new([BandSlot::default(); 3]),
            notify_order: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn deadzone(&self) -> u16 {
        self.deadzone
    }

    /// Offer a raw dial reading; returns the new dB value if it was accepted
    pub fn on_physical_sample(&self, band: EqBand, raw: u16) -> Option<f32> {
        let _order = lock(&self.notify_order);
        let snapshot = {
            let mut bands = lock(&self.bands);
            let slot = &mut bands[band.index()];

            let delta = raw.abs_diff(slot.state.last_raw_adc);
            let threshold = match slot.state.last_source {
                ControlSource::Physical => self.deadzone as u32,
                ControlSource::Digital => 2 * self.deadzone as u32,
            };
            if slot.primed && delta as u32 <= threshold {
                return None;
            }

            slot.primed = true;
            slot.state = EqBandState {
                live_db: adc_to_db(raw),
                last_source: ControlSource::Physical,
                last_raw_adc: raw,
            };
            Self::snapshot_of(&bands)
        };

        let db = snapshot.band(band).live_db;
        log::debug!("EQ {} = {} dB (physical, raw {})", band, db, raw);
        self.notify(band, &snapshot);
        Some(db)
    }

    /// Apply a digital update; always wins until the dial moves past `2 × deadzone`
    pub fn set_digital(&self, band: EqBand, db: f32) -> ValidationResult<()> {
        let (min, max) = EQ_DB_RANGE;
        let db = check_range(band.name(), db, min, max).map_err(|e| {
            log::warn!("Rejected EQ update: {}", e);
            e
        })?;

        let _order = lock(&self.notify_order);
        let snapshot = {
            let mut bands = lock(&self.bands);
            let slot = &mut bands[band.index()];
            slot.primed = true;
            slot.state.live_db = db;
            slot.state.last_source = ControlSource::Digital;
            Self::snapshot_of(&bands)
        };

        log::debug!("EQ {} = {} dB (digital)", band, db);
        self.notify(band, &snapshot);
        Ok(())
    }

    pub fn band(&self, band: EqBand) -> EqBandState {
        lock(&self.bands)[band.index()].state
    }

    pub fn snapshot(&self) -> EqSnapshot {
        Self::snapshot_of(&lock(&self.bands))
    }

    /// Register a listener for accepted changes (same re-entrancy rule as the parameter store)
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(EqBand, &EqSnapshot) + Send + Sync + 'static,
    {
        write(&self.listeners).push(Box::new(listener));
    }

    fn snapshot_of(bands: &[BandSlot; 3]) -> EqSnapshot {
        EqSnapshot {
            bands: [bands[0].state, bands[1].state, bands[2].state],
        }
    }

    fn notify(&self, band: EqBand, snapshot: &EqSnapshot) {
        for listener in read(&self.listeners).iter() {
            listener(band, snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_adc_to_db_endpoints() {
        assert_eq!(adc_to_db(0), 12.0);
        assert_eq!(adc_to_db(65535), -12.0);
        assert_eq!(adc_to_db(32768), 0.0);
        assert!(adc_to_db(32768).is_sign_positive());
        // 49151 / 65535 * 24 - 12 = 6.0 -> reversed
        assert_eq!(adc_to_db(49151), -6.0);
    }

    #[test]
    fn test_first_sample_always_accepted() {
        let arb = EqInputArbiter::new(300);
        assert_eq!(arb.on_physical_sample(EqBand::Low, 100), Some(adc_to_db(100)));
        assert_eq!(arb.band(EqBand::Low).last_raw_adc, 100);
    }

    #[test]
    fn test_physical_jitter_filtered() {
        let arb = EqInputArbiter::new(300);
        arb.on_physical_sample(EqBand::Mid, 30_000);
        assert_eq!(arb.on_physical_sample(EqBand::Mid, 30_300), None);
        assert_eq!(arb.band(EqBand::Mid).last_raw_adc, 30_000);
        assert!(arb.on_physical_sample(EqBand::Mid, 30_301).is_some());
    }

    #[test]
    fn test_digital_is_sticky() {
        let arb = EqInputArbiter::new(300);
        arb.on_physical_sample(EqBand::High, 20_000);
        arb.set_digital(EqBand::High, 4.5).unwrap();

        // Within deadzone and within 2x deadzone: both ignored
        assert_eq!(arb.on_physical_sample(EqBand::High, 20_300), None);
        assert_eq!(arb.on_physical_sample(EqBand::High, 20_600), None);

        let state = arb.band(EqBand::High);
        assert_eq!(state.live_db, 4.5);
        assert_eq!(state.last_source, ControlSource::Digital);
    }

    #[test]
    fn test_large_physical_move_overrides_digital() {
        let arb = EqInputArbiter::new(300);
        arb.on_physical_sample(EqBand::Low, 20_000);
        arb.set_digital(EqBand::Low, -3.0).unwrap();

        let db = arb.on_physical_sample(EqBand::Low, 20_601).unwrap();
        let state = arb.band(EqBand::Low);
        assert_eq!(state.last_source, ControlSource::Physical);
        assert_eq!(state.live_db, adc_to_db(20_601));
        assert_eq!(db, state.live_db);
    }

    #[test]
    fn test_digital_range_checked() {
        let arb = EqInputArbiter::default();
        arb.set_digital(EqBand::Mid, 2.0).unwrap();
        assert!(arb.set_digital(EqBand::Mid, 12.5).is_err());
        assert!(arb.set_digital(EqBand::Mid, f32::NAN).is_err());
        assert_eq!(arb.band(EqBand::Mid).live_db, 2.0);
    }

    #[test]
    fn test_listeners_see_accepted_changes_only() {
        let arb = EqInputArbiter::new(300);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        arb.add_listener(move |band, snapshot| {
            s.lock().unwrap().push((band, snapshot.band(band).live_db));
        });

        arb.on_physical_sample(EqBand::Low, 0);
        arb.on_physical_sample(EqBand::Low, 10);
        arb.set_digital(EqBand::High, -1.5).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(EqBand::Low, 12.0), (EqBand::High, -1.5)]);
    }

    #[test]
    fn test_digital_before_any_dial_reading() {
        let arb = EqInputArbiter::new(300);
        arb.set_digital(EqBand::Low, 3.0).unwrap();
        assert_eq!(arb.on_physical_sample(EqBand::Low, 500), None);
        assert_eq!(arb.band(EqBand::Low).live_db, 3.0);
        assert!(arb.on_physical_sample(EqBand::Low, 601).is_some());
    }

    #[test]
    fn test_listener_order_follows_commits() {
        use std::sync::Barrier;
        use std::thread;
        use std::time::Duration;

        let arbiter = Arc::new(EqInputArbiter::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let entered = Arc::new(Barrier::new(2));
        {
            let seen = Arc::clone(&seen);
            let entered = Arc::clone(&entered);
            arbiter.add_listener(move |band, snapshot| {
                let db = snapshot.band(band).live_db;
                if db == 3.0 {
                    entered.wait();
                    thread::sleep(Duration::from_millis(50));
                }
                seen.lock().unwrap().push(db);
            });
        }

        let first = {
            let arbiter = Arc::clone(&arbiter);
            thread::spawn(move || arbiter.set_digital(EqBand::Low, 3.0).unwrap())
        };
        entered.wait();
        arbiter.set_digital(EqBand::Low, -6.0).unwrap();
        first.join().unwrap();

        assert_eq!(arbiter.band(EqBand::Low).live_db, -6.0);
        assert_eq!(*seen.lock().unwrap(), vec![3.0, -6.0]);
    }

    #[test]
    fn test_bands_are_independent() {
        let arb = EqInputArbiter::new(300);
        arb.set_digital(EqBand::Low, 6.0).unwrap();
        assert!(arb.on_physical_sample(EqBand::High, 1000).is_some());
        assert_eq!(arb.band(EqBand::Low).last_source, ControlSource::Digital);
        assert_eq!(arb.snapshot().band(EqBand::High).last_source, ControlSource::Physical);
    }
}
