//! ParameterStore - the single owner of live mixer and tone parameters
//!
//! Every context that reads or changes mixing parameters (producer thread,
//! console, serial reader, EQ bridge) goes through one shared store:
//!
//! ```text
//!   set(param, v) ──► validate ──► [notify lock
//!                                     [values lock] store, copy snapshot [unlock]
//!                                     listeners(param, &snapshot)
//!                                  unlock]
//! ```
//!
//! The value lock is held only for the copy in or out, so the producer never
//! waits on a listener. Listeners run after it is released and receive a value
//! snapshot, never a reference into the store. The notify lock spans the
//! update and the listener calls, so listeners observe changes in the order
//! they were committed.
//!
//! # Re-entrancy
//!
//! Listeners must not call back into the store synchronously (no `set` or
//! `add_listener` from inside a listener; `get` is fine). Anything that performs I/O must be
//! handed off (e.g. over a channel) rather than done inline.

use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::error::{check_range, ValidationError, ValidationResult};
use crate::engine::{MixerParameters, ToneGains};
use crate::sync::{lock, read, write};

/// Range of the per-channel and master gains
pub const GAIN_RANGE: (f32, f32) = (0.0, 2.0);

/// Range of the balance control
pub const PAN_RANGE: (f32, f32) = (-1.0, 1.0);

/// Range of the bass/treble gains driven from the EQ
pub const TONE_RANGE: (f32, f32) = (0.0, 10.0);

/// Every parameter held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixParam {
    GainCh1,
    GainCh2,
    Pan,
    MasterGain,
    BassL,
    TrebleL,
    BassR,
    TrebleR,
}

impl MixParam {
    pub const ALL: [MixParam; 8] = [
        MixParam::GainCh1,
        MixParam::GainCh2,
        MixParam::Pan,
        MixParam::MasterGain,
        MixParam::BassL,
        MixParam::TrebleL,
        MixParam::BassR,
        MixParam::TrebleR,
    ];

    /// Canonical parameter name
    pub fn name(&self) -> &'static str {
        match self {
            MixParam::GainCh1 => "gain_ch1",
            MixParam::GainCh2 => "gain_ch2",
            MixParam::Pan => "pan",
            MixParam::MasterGain => "master_gain",
            MixParam::BassL => "bass_l",
            MixParam::TrebleL => "treble_l",
            MixParam::BassR => "bass_r",
            MixParam::TrebleR => "treble_r",
        }
    }

    /// Look up a parameter by canonical name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    /// Inclusive `(min, max)` accepted by [`ParameterStore::set`]
    pub fn range(&self) -> (f32, f32) {
        match self {
            MixParam::GainCh1 | MixParam::GainCh2 | MixParam::MasterGain => GAIN_RANGE,
            MixParam::Pan => PAN_RANGE,
            MixParam::BassL | MixParam::TrebleL | MixParam::BassR | MixParam::TrebleR => {
                TONE_RANGE
            }
        }
    }

    pub fn is_tone(&self) -> bool {
        matches!(
            self,
            MixParam::BassL | MixParam::TrebleL | MixParam::BassR | MixParam::TrebleR
        )
    }

    /// Validate `value` against this parameter's range
    pub fn validate(&self, value: f32) -> ValidationResult<f32> {
        let (min, max) = self.range();
        check_range(self.name(), value, min, max)
    }
}

impl std::fmt::Display for MixParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for MixParam {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ValidationError::UnknownParameter(s.to_string()))
    }
}

/// Copy of every parameter at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSnapshot {
    pub mixer: MixerParameters,
    pub tone: ToneGains,
}

impl ParameterSnapshot {
    pub fn get(&self, param: MixParam) -> f32 {
        match param {
            MixParam::GainCh1 => self.mixer.gain_ch1,
            MixParam::GainCh2 => self.mixer.gain_ch2,
            MixParam::Pan => self.mixer.pan,
            MixParam::MasterGain => self.mixer.master_gain,
            MixParam::BassL => self.tone.bass_l,
            MixParam::TrebleL => self.tone.treble_l,
            MixParam::BassR => self.tone.bass_r,
            MixParam::TrebleR => self.tone.treble_r,
        }
    }

    fn slot(&mut self, param: MixParam) -> &mut f32 {
        match param {
            MixParam::GainCh1 => &mut self.mixer.gain_ch1,
            MixParam::GainCh2 => &mut self.mixer.gain_ch2,
            MixParam::Pan => &mut self.mixer.pan,
            MixParam::MasterGain => &mut self.mixer.master_gain,
            MixParam::BassL => &mut self.tone.bass_l,
            MixParam::TrebleL => &mut self.tone.treble_l,
            MixParam::BassR => &mut self.tone.bass_r,
            MixParam::TrebleR => &mut self.tone.treble_r,
        }
    }

    /// Replace out-of-range fields with their defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        for param in MixParam::ALL {
            if let Err(e) = param.validate(self.get(param)) {
                log::warn!("{}; using default {}", e, defaults.get(param));
                *self.slot(param) = defaults.get(param);
            }
        }
        self
    }
}

/// Change listener: receives the parameter that changed and the full snapshot
pub type ParameterListener = Box<dyn Fn(MixParam, &ParameterSnapshot) + Send + Sync>;

/// Thread-safe parameter map with change notification
pub struct ParameterStore {
    values: Mutex<ParameterSnapshot>,
    /// Serializes commit + notification of concurrent `set`s
    notify_order: Mutex<()>,
    listeners: RwLock<Vec<ParameterListener>>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(ParameterSnapshot::default())
    }
}

impl ParameterStore {
    /// Create a store; out-of-range initial values fall back to defaults
    pub fn new(initial: ParameterSnapshot) -> Self {
        Self {
            values: Mutex::new(initial.sanitized()),
            notify_order: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Validate and store `value`, then notify listeners
    ///
    /// On rejection the stored value is unchanged and no listener runs.
    pub fn set(&self, param: MixParam, value: f32) -> ValidationResult<ParameterSnapshot> {
        let value = param.validate(value).map_err(|e| {
            log::warn!("Rejected parameter update: {}", e);
            e
        })?;

        let _order = lock(&self.notify_order);
        let snapshot = {
            let mut values = lock(&self.values);
            *values.slot(param) = value;
            *values
        };

        log::debug!("{} = {}", param, value);
        self.notify(param, &snapshot);
        Ok(snapshot)
    }

    /// Parse a parameter name and set it
    pub fn set_by_name(&self, name: &str, value: f32) -> ValidationResult<ParameterSnapshot> {
        let param = name.parse::<MixParam>().map_err(|e| {
            log::warn!("Rejected parameter update: {}", e);
            e
        })?;
        self.set(param, value)
    }

    pub fn get(&self, param: MixParam) -> f32 {
        lock(&self.values).get(param)
    }

    pub fn get_all(&self) -> ParameterSnapshot {
        *lock(&self.values)
    }

    /// Mixer half of the snapshot, taken by the producer once per cycle
    pub fn mixer(&self) -> MixerParameters {
        lock(&self.values).mixer
    }

    pub fn tone(&self) -> ToneGains {
        lock(&self.values).tone
    }

    /// Register a listener, invoked synchronously on every accepted `set`
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(MixParam, &ParameterSnapshot) + Send + Sync + 'static,
    {
        write(&self.listeners).push(Box::new(listener));
    }

    fn notify(&self, param: MixParam, snapshot: &ParameterSnapshot) {
        for listener in read(&self.listeners).iter() {
            listener(param, snapshot);
        }
    }
}
