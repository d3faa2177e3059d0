//! Line-oriented DSP command protocol
//!
//! One command per line, `"<token> <value>\n"`:
//!
//! | token    | parameter     | range        |
//! |----------|---------------|--------------|
//! | `g1`     | `gain_ch1`    | 0.0 ..= 2.0  |
//! | `g2`     | `gain_ch2`    | 0.0 ..= 2.0  |
//! | `pan`    | `pan`         | -1.0 ..= 1.0 |
//! | `master` | `master_gain` | 0.0 ..= 2.0  |
//! | `bl`     | `bass_l`      | 0.0 ..= 10.0 |
//! | `tl`     | `treble_l`    | 0.0 ..= 10.0 |
//! | `br`     | `bass_r`      | 0.0 ..= 10.0 |
//! | `tr`     | `treble_r`    | 0.0 ..= 10.0 |
//!
//! Outgoing lines always use the short token. Incoming lines accept either
//! column, case-insensitively.

use super::error::{SerialError, SerialResult};
use crate::control::{MixParam, ValidationError};

/// Short wire token for `param`
pub fn wire_token(param: MixParam) -> &'static str {
    match param {
        MixParam::GainCh1 => "g1",
        MixParam::GainCh2 => "g2",
        MixParam::Pan => "pan",
        MixParam::MasterGain => "master",
        MixParam::BassL => "bl",
        MixParam::TrebleL => "tl",
        MixParam::BassR => "br",
        MixParam::TrebleR => "tr",
    }
}

/// Resolve a wire token or canonical parameter name
pub fn param_from_token(token: &str) -> Option<MixParam> {
    MixParam::ALL
        .into_iter()
        .find(|&p| wire_token(p).eq_ignore_ascii_case(token))
        .or_else(|| MixParam::from_name(token))
}

/// One validated DSP command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SerialCommand {
    pub param: MixParam,
    pub value: f32,
}

impl SerialCommand {
    /// Build a command, validating `value` against the parameter's range
    pub fn new(param: MixParam, value: f32) -> SerialResult<Self> {
        let value = param.validate(value)?;
        Ok(Self { param, value })
    }

    /// Wire form including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{} {}\n", wire_token(self.param), self.value)
    }
}

impl std::fmt::Display for SerialCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", wire_token(self.param), self.value)
    }
}

/// Parse one `param value` line
pub fn parse_line(line: &str) -> SerialResult<SerialCommand> {
    let mut parts = line.split_whitespace();
    let (Some(token), Some(raw), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SerialError::Malformed(line.trim_end().to_string()));
    };

    let param = param_from_token(token)
        .ok_or_else(|| ValidationError::UnknownParameter(token.to_string()))?;
    let value = raw
        .parse::<f32>()
        .map_err(|_| ValidationError::NotANumber {
            param: param.name().to_string(),
            raw: raw.to_string(),
        })?;

    SerialCommand::new(param, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format() {
        let cmd = SerialCommand::new(MixParam::MasterGain, 0.5).unwrap();
        assert_eq!(cmd.to_line(), "master 0.5\n");
        let cmd = SerialCommand::new(MixParam::TrebleR, 10.0).unwrap();
        assert_eq!(cmd.to_line(), "tr 10\n");
        let cmd = SerialCommand::new(MixParam::Pan, -0.25).unwrap();
        assert_eq!(cmd.to_string(), "pan -0.25");
    }

    #[test]
    fn test_parse_tokens_and_aliases() {
        assert_eq!(
            parse_line("g1 1.5\n").unwrap(),
            SerialCommand::new(MixParam::GainCh1, 1.5).unwrap()
        );
        assert_eq!(parse_line("  BL   3 ").unwrap().param, MixParam::BassL);
        assert_eq!(parse_line("master_gain 0.2").unwrap().param, MixParam::MasterGain);
        assert_eq!(parse_line("Treble_R 4").unwrap().param, MixParam::TrebleR);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(matches!(parse_line(""), Err(SerialError::Malformed(_))));
        assert!(matches!(parse_line("g1"), Err(SerialError::Malformed(_))));
        assert!(matches!(parse_line("g1 1 2"), Err(SerialError::Malformed(_))));
        assert!(matches!(
            parse_line("volume 1"),
            Err(SerialError::Invalid(ValidationError::UnknownParameter(_)))
        ));
        assert!(matches!(
            parse_line("g1 loud"),
            Err(SerialError::Invalid(ValidationError::NotANumber { .. }))
        ));
        assert!(matches!(
            parse_line("pan 1.5"),
            Err(SerialError::Invalid(ValidationError::OutOfRange { .. }))
        ));
        assert!(parse_line("pan NaN").is_err());
    }

    #[test]
    fn test_tokens_round_trip_through_parser() {
        for param in MixParam::ALL {
            let line = SerialCommand::new(param, 0.0).unwrap().to_line();
            assert_eq!(parse_line(&line).unwrap().param, param);
        }
    }
}
