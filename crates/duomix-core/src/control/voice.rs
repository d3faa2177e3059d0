//! VoiceModeManager - voice mode plus the mute, ducking and feedback toggles
//!
//! ```text
//!   music ─► live ─► club ─► monitor ─► off ─┐
//!     ▲                                      │
//!     └──────────────────────────────────────┘
//! ```
//!
//! Mute is the only toggle that reaches the audio path: the consumer checks
//! [`VoiceModeManager::is_muted`] once per transfer (a single atomic load)
//! and writes silence while it is set. Mode, ducking and feedback are device
//! state relayed to clients through listeners.
//!
//! Listeners follow the same rules as the parameter store: they run after
//! the state lock is released, in commit order, and must not call back into
//! the manager synchronously.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::sync::{lock, read, write};

/// Voice processing preset selected on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceMode {
    Music,
    Live,
    Club,
    Monitor,
    #[default]
    Off,
}

impl VoiceMode {
    /// Cycle order used by [`VoiceModeManager::toggle_mode`]
    pub const ALL: [VoiceMode; 5] = [
        VoiceMode::Music,
        VoiceMode::Live,
        VoiceMode::Club,
        VoiceMode::Monitor,
        VoiceMode::Off,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VoiceMode::Music => "music",
            VoiceMode::Live => "live",
            VoiceMode::Club => "club",
            VoiceMode::Monitor => "monitor",
            VoiceMode::Off => "off",
        }
    }

    /// Case-insensitive lookup by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(name))
    }

    /// The mode after this one, wrapping from `off` back to `music`
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|&m| m == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for VoiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Complete voice state; also the `voice` section of the device config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceState {
    pub mode: VoiceMode,
    pub muted: bool,
    pub ducking: bool,
    pub feedback: bool,
}

/// One accepted voice change, as handed to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceEvent {
    Mode(VoiceMode),
    Mute(bool),
    Ducking(bool),
    Feedback(bool),
}

pub type VoiceListener = Box<dyn Fn(VoiceEvent) + Send + Sync>;

pub struct VoiceModeManager {
    state: Mutex<VoiceState>,
    /// Mirror of `state.muted` for the audio path
    muted: AtomicBool,
    notify_order: Mutex<()>,
    listeners: RwLock<Vec<VoiceListener>>,
}

impl Default for VoiceModeManager {
    fn default() -> Self {
        Self::new(VoiceState::default())
    }
}

impl VoiceModeManager {
    pub fn new(initial: VoiceState) -> Self {
        Self {
            state: Mutex::new(initial),
            muted: AtomicBool::new(initial.muted),
            notify_order: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> VoiceState {
        *lock(&self.state)
    }

    pub fn mode(&self) -> VoiceMode {
        lock(&self.state).mode
    }

    /// Lock-free; safe to call from the audio path
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Advance to the next mode and return it
    pub fn toggle_mode(&self) -> VoiceMode {
        self.update(|state| {
            state.mode = state.mode.next();
            Some(VoiceEvent::Mode(state.mode))
        })
        .0
        .mode
    }

    /// Select `mode`; returns false (and notifies nobody) if already active
    pub fn set_mode(&self, mode: VoiceMode) -> bool {
        self.update(|state| {
            (state.mode != mode).then(|| {
                state.mode = mode;
                VoiceEvent::Mode(mode)
            })
        })
        .1
    }

    /// Flip mute and return the new value
    pub fn toggle_mute(&self) -> bool {
        self.update(|state| {
            state.muted = !state.muted;
            Some(VoiceEvent::Mute(state.muted))
        })
        .0
        .muted
    }

    /// Returns false if mute was already `muted`
    pub fn set_muted(&self, muted: bool) -> bool {
        self.update(|state| {
            (state.muted != muted).then(|| {
                state.muted = muted;
                VoiceEvent::Mute(muted)
            })
        })
        .1
    }

    pub fn toggle_ducking(&self) -> bool {
        self.update(|state| {
            state.ducking = !state.ducking;
            Some(VoiceEvent::Ducking(state.ducking))
        })
        .0
        .ducking
    }

    pub fn toggle_feedback(&self) -> bool {
        self.update(|state| {
            state.feedback = !state.feedback;
            Some(VoiceEvent::Feedback(state.feedback))
        })
        .0
        .feedback
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(VoiceEvent) + Send + Sync + 'static,
    {
        write(&self.listeners).push(Box::new(listener));
    }

    /// Apply one change under the state lock, then notify outside it
    ///
    /// Returns the resulting state and whether anything changed.
    fn update<F>(&self, apply: F) -> (VoiceState, bool)
    where
        F: FnOnce(&mut VoiceState) -> Option<VoiceEvent>,
    {
        let _order = lock(&self.notify_order);
        let (state, event) = {
            let mut state = lock(&self.state);
            let event = apply(&mut *state);
            self.muted.store(state.muted, Ordering::Release);
            (*state, event)
        };

        let Some(event) = event else {
            return (state, false);
        };
        log::info!("Voice change: {:?}", event);
        for listener in read(&self.listeners).iter() {
            listener(event);
        }
        (state, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorded(manager: &VoiceModeManager) -> Arc<Mutex<Vec<VoiceEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        manager.add_listener(move |event| sink.lock().unwrap().push(event));
        events
    }

    #[test]
    fn test_mode_cycles_and_wraps() {
        let manager = VoiceModeManager::default();
        assert_eq!(manager.mode(), VoiceMode::Off);

        let seen: Vec<VoiceMode> = (0..5).map(|_| manager.toggle_mode()).collect();
        assert_eq!(
            seen,
            vec![
                VoiceMode::Music,
                VoiceMode::Live,
                VoiceMode::Club,
                VoiceMode::Monitor,
                VoiceMode::Off
            ]
        );
    }

    #[test]
    fn test_toggles_notify_listeners() {
        let manager = VoiceModeManager::default();
        let events = recorded(&manager);

        assert!(manager.toggle_mute());
        assert!(manager.toggle_ducking());
        assert!(manager.toggle_feedback());
        assert!(!manager.toggle_mute());
        manager.toggle_mode();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                VoiceEvent::Mute(true),
                VoiceEvent::Ducking(true),
                VoiceEvent::Feedback(true),
                VoiceEvent::Mute(false),
                VoiceEvent::Mode(VoiceMode::Music),
            ]
        );
    }

    #[test]
    fn test_setters_skip_unchanged_values() {
        let manager = VoiceModeManager::default();
        let events = recorded(&manager);

        assert!(!manager.set_mode(VoiceMode::Off));
        assert!(!manager.set_muted(false));
        assert!(manager.set_mode(VoiceMode::Club));
        assert!(manager.set_muted(true));

        assert_eq!(
            *events.lock().unwrap(),
            vec![VoiceEvent::Mode(VoiceMode::Club), VoiceEvent::Mute(true)]
        );
    }

    #[test]
    fn test_mute_flag_tracks_state() {
        let manager = VoiceModeManager::new(VoiceState {
            muted: true,
            ..Default::default()
        });
        assert!(manager.is_muted());
        manager.toggle_mute();
        assert!(!manager.is_muted());
        assert!(!manager.state().muted);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(VoiceMode::from_name("CLUB"), Some(VoiceMode::Club));
        assert_eq!(VoiceMode::from_name("karaoke"), None);
        assert_eq!(VoiceMode::Monitor.to_string(), "monitor");

        let state: VoiceState = serde_yaml::from_str("mode: club\nmuted: true\n").unwrap();
        assert_eq!(state.mode, VoiceMode::Club);
        assert!(state.muted);
        assert!(!state.ducking);
    }
}
