//! Serial control link to the external DSP chip
//!
//! Parameter changes accepted by the [`ParameterStore`](crate::control::ParameterStore)
//! are mirrored to the DSP as `param value` text lines. The same format is
//! accepted inbound so a host console can drive the store.

mod command;
mod error;
mod link;

pub use command::{param_from_token, parse_line, wire_token, SerialCommand};
pub use error::{SerialError, SerialResult};
pub use link::{SerialControlLink, SerialForwarder, SerialReader};
