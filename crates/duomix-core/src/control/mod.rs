//! Control plane - parameter store, EQ arbitration and status
//!
//! Control inputs (dials, console/network commands, inbound serial lines)
//! never touch the audio path directly; they go through two synchronized
//! owners:
//!
//! - [`ParameterStore`]: gains, balance, master and tone, read by the producer
//!   once per mixing cycle
//! - [`EqInputArbiter`]: the three displayed EQ bands, with physical vs.
//!   digital source arbitration
//!
//! - [`VoiceModeManager`]: voice mode and the mute/ducking/feedback toggles;
//!   mute silences the consumer output
//!
//! [`connect_eq_to_tone`] relays EQ changes into the store's tone gains.

mod bridge;
mod dials;
mod eq;
mod error;
mod params;
mod status;
mod voice;

pub use bridge::{connect_eq_to_tone, eq_db_to_dsp_gain, tone_params_for};
pub use dials::{
    poll_once, spawn_dial_poller, DialInputs, DialPoller, DialSensor, EqConfig, FileDialSensor,
};
pub use eq::{adc_to_db, EqBandState, EqInputArbiter, EqListener, EqSnapshot, DEFAULT_DEADZONE, EQ_DB_RANGE};
pub use error::{check_range, ValidationError, ValidationResult};
pub use params::{
    MixParam, ParameterListener, ParameterSnapshot, ParameterStore, GAIN_RANGE, PAN_RANGE,
    TONE_RANGE,
};
pub use status::{ControlSources, StatusMessage};
pub use voice::{VoiceEvent, VoiceListener, VoiceMode, VoiceModeManager, VoiceState};
