//! Control-plane validation errors

use thiserror::Error;

/// A parameter update rejected at the boundary; the previous value is kept
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Parameter name not recognised
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Value could not be parsed as a number (or is NaN)
    #[error("Invalid value for {param}: {raw:?}")]
    NotANumber { param: String, raw: String },

    /// Value outside the allowed range
    #[error("{param} = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        param: String,
        value: f32,
        min: f32,
        max: f32,
    },
}

/// Result type for parameter validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Check `value` against `[min, max]`, rejecting NaN
pub fn check_range(param: &str, value: f32, min: f32, max: f32) -> ValidationResult<f32> {
    if value.is_nan() {
        return Err(ValidationError::NotANumber {
            param: param.to_string(),
            raw: value.to_string(),
        });
    }
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            param: param.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(value)
}
