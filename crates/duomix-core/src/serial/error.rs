//! Serial link error types

use thiserror::Error;

use crate::control::ValidationError;

#[derive(Error, Debug)]
pub enum SerialError {
    /// I/O failure on the serial channel
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Line is not of the form `<param> <value>`
    #[error("Malformed command line: {0:?}")]
    Malformed(String),

    /// Unknown parameter, non-numeric or out-of-range value
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The forwarder thread is gone
    #[error("Serial forwarder disconnected")]
    Disconnected,
}

pub type SerialResult<T> = Result<T, SerialError>;
