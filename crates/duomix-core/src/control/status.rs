//! Status messages pushed to UI clients
//!
//! The broadcast layer serialises these to JSON on every accepted change:
//!
//! ```json
//! {"type":"dial","low":0.0,"mid":-3.5,"high":6.0,
//!  "control_sources":{"low":"physical","mid":"digital","high":"physical"}}
//! {"type":"dsp_mixer","master_gain":0.3,"gain_ch1":0.7,"gain_ch2":0.7,"pan":0.0}
//! {"type":"mode","mode":"club"}
//! {"type":"mute","enabled":true}
//! ```
//!
//! `ducking` and `feedback` have the same shape as `mute`.

use serde::Serialize;

use super::eq::EqSnapshot;
use super::voice::{VoiceEvent, VoiceMode, VoiceState};
use crate::engine::MixerParameters;
use crate::types::{ControlSource, EqBand};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlSources {
    pub low: ControlSource,
    pub mid: ControlSource,
    pub high: ControlSource,
}

/// One message for UI clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusMessage {
    Dial {
        low: f32,
        mid: f32,
        high: f32,
        control_sources: ControlSources,
    },
    DspMixer {
        master_gain: f32,
        gain_ch1: f32,
        gain_ch2: f32,
        pan: f32,
    },
    Mode {
        mode: VoiceMode,
    },
    Mute {
        enabled: bool,
    },
    Ducking {
        enabled: bool,
    },
    Feedback {
        enabled: bool,
    },
}

impl StatusMessage {
    pub fn dial(eq: &EqSnapshot) -> Self {
        let db = |band: EqBand| eq.band(band).live_db;
        let src = |band: EqBand| eq.band(band).last_source;
        StatusMessage::Dial {
            low: db(EqBand::Low),
            mid: db(EqBand::Mid),
            high: db(EqBand::High),
            control_sources: ControlSources {
                low: src(EqBand::Low),
                mid: src(EqBand::Mid),
                high: src(EqBand::High),
            },
        }
    }

    pub fn dsp_mixer(mixer: &MixerParameters) -> Self {
        StatusMessage::DspMixer {
            master_gain: mixer.master_gain,
            gain_ch1: mixer.gain_ch1,
            gain_ch2: mixer.gain_ch2,
            pan: mixer.pan,
        }
    }

    pub fn voice(event: VoiceEvent) -> Self {
        match event {
            VoiceEvent::Mode(mode) => StatusMessage::Mode { mode },
            VoiceEvent::Mute(enabled) => StatusMessage::Mute { enabled },
            VoiceEvent::Ducking(enabled) => StatusMessage::Ducking { enabled },
            VoiceEvent::Feedback(enabled) => StatusMessage::Feedback { enabled },
        }
    }

    /// One message per voice field, e.g. for a newly connected client
    pub fn voice_state(state: &VoiceState) -> [Self; 4] {
        [
            Self::voice(VoiceEvent::Mode(state.mode)),
            Self::voice(VoiceEvent::Mute(state.muted)),
            Self::voice(VoiceEvent::Ducking(state.ducking)),
            Self::voice(VoiceEvent::Feedback(state.feedback)),
        ]
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::EqInputArbiter;

    #[test]
    fn test_dial_message_shape() {
        let arbiter = EqInputArbiter::default();
        arbiter.set_digital(EqBand::Mid, -3.5).unwrap();

        let json = StatusMessage::dial(&arbiter.snapshot()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "dial");
        assert_eq!(value["mid"], -3.5);
        assert_eq!(value["low"], 0.0);
        assert_eq!(value["control_sources"]["mid"], "digital");
        assert_eq!(value["control_sources"]["high"], "physical");
    }

    #[test]
    fn test_dsp_mixer_message_shape() {
        let json = StatusMessage::dsp_mixer(&MixerParameters::unity()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "dsp_mixer");
        assert_eq!(value["master_gain"], 1.0);
        assert_eq!(value["gain_ch1"], 1.0);
        assert_eq!(value["pan"], 0.0);
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_voice_message_shapes() {
        let mode = StatusMessage::voice(VoiceEvent::Mode(VoiceMode::Club)).to_json().unwrap();
        assert_eq!(mode, r#"{"type":"mode","mode":"club"}"#);

        let mute = StatusMessage::voice(VoiceEvent::Mute(true)).to_json().unwrap();
        assert_eq!(mute, r#"{"type":"mute","enabled":true}"#);

        let state = VoiceState {
            feedback: true,
            ..Default::default()
        };
        let all: Vec<String> = StatusMessage::voice_state(&state)
            .iter()
            .map(|m| m.to_json().unwrap())
            .collect();
        assert_eq!(
            all,
            vec![
                r#"{"type":"mode","mode":"off"}"#,
                r#"{"type":"mute","enabled":false}"#,
                r#"{"type":"ducking","enabled":false}"#,
                r#"{"type":"feedback","enabled":true}"#,
            ]
        );
    }
}
