//! EQ → tone gain relay
//!
//! The three-band EQ shown on the panel drives the two-band tone stage:
//! `low` sets both bass gains, `high` sets both treble gains, `mid` is
//! display only. dB values map onto the DSP's linear gain range piecewise:
//!
//! ```text
//!   -12 dB ──► 0.0      0 dB ──► 1.0      +12 dB ──► 10.0
//!          (linear)            (linear)
//! ```

use std::sync::{Arc, Weak};

use super::eq::{EqInputArbiter, EQ_DB_RANGE};
use super::params::{MixParam, ParameterStore, TONE_RANGE};
use crate::types::EqBand;

/// Map an EQ value in dB onto the tone gain range
pub fn eq_db_to_dsp_gain(db: f32) -> f32 {
    let (min_db, max_db) = EQ_DB_RANGE;
    let (_, max_gain) = TONE_RANGE;
    let db = db.clamp(min_db, max_db);
    if db <= 0.0 {
        (db - min_db) / -min_db
    } else {
        1.0 + db * (max_gain - 1.0) / max_db
    }
}

/// Tone parameters driven by `band`; empty for display-only bands
pub fn tone_params_for(band: EqBand) -> &'static [MixParam] {
    match band {
        EqBand::Low => &[MixParam::BassL, MixParam::BassR],
        EqBand::Mid => &[],
        EqBand::High => &[MixParam::TrebleL, MixParam::TrebleR],
    }
}

/// Forward accepted EQ changes into the parameter store's tone gains
///
/// The arbiter only holds a weak handle, so the wiring does not keep the
/// store alive.
pub fn connect_eq_to_tone(arbiter: &EqInputArbiter, store: &Arc<ParameterStore>) {
    let store: Weak<ParameterStore> = Arc::downgrade(store);
    arbiter.add_listener(move |band, snapshot| {
        let Some(store) = store.upgrade() else {
            return;
        };
        let gain = eq_db_to_dsp_gain(snapshot.band(band).live_db);
        for &param in tone_params_for(band) {
            if let Err(e) = store.set(param, gain) {
                log::warn!("EQ relay: {}", e);
            }
        }
    });
}
