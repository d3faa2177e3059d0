//! Line console on stdin
//!
//! Accepts the serial protocol (`g1 1.2`, `pan -0.3`, `master_gain 0.5`, ...)
//! plus a few device commands:
//!
//! | command               | effect                                      |
//! |-----------------------|---------------------------------------------|
//! | `eq <band> <db>`      | digital EQ update (`low`, `mid`, `high`)    |
//! | `dial <band> <raw>`   | inject a raw physical dial reading          |
//! | `mode [name]`         | next voice mode, or select one by name      |
//! | `mute`                | toggle output mute                          |
//! | `ducking`             | toggle ducking                              |
//! | `feedback`            | toggle feedback suppression                 |
//! | `status`              | print every status message                  |
//! | `resend`              | re-send every parameter to the DSP          |
//! | `help`                | list commands                               |
//! | `quit` / `exit`       | stop the device                             |
//!
//! Lines arrive over a channel from a `duomix-stdin` thread, so the loop can
//! also wake up to check whether the device has to shut down on its own.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};

use duomix_core::control::{
    EqInputArbiter, ParameterStore, StatusMessage, VoiceMode, VoiceModeManager,
};
use duomix_core::serial::{parse_line, SerialForwarder};
use duomix_core::EqBand;

const HELP: &str = "\
commands:
  <param> <value>     g1 g2 pan master bl tl br tr (or long names)
  eq <band> <db>      band = low | mid | high, db = -12..12
  dial <band> <raw>   raw = 0..65535
  mode [name]         music | live | club | monitor | off
  mute | ducking | feedback
  status
  resend
  quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Continue,
    Quit,
}

/// Why [`Console::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// `quit` or `exit`
    Quit,
    /// End of input
    InputClosed,
    /// The halt check fired
    Halted,
}

/// Forward lines of `input` over a channel from a `duomix-stdin` thread
///
/// The channel disconnects at end of input or on a read error.
pub fn spawn_line_reader<R>(input: R) -> io::Result<Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = channel::unbounded();
    thread::Builder::new()
        .name("duomix-stdin".into())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("Console input failed: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

pub struct Console<'a> {
    store: Arc<ParameterStore>,
    arbiter: Arc<EqInputArbiter>,
    voice: Arc<VoiceModeManager>,
    forwarder: Option<&'a SerialForwarder>,
}

impl<'a> Console<'a> {
    pub fn new(
        store: Arc<ParameterStore>,
        arbiter: Arc<EqInputArbiter>,
        voice: Arc<VoiceModeManager>,
        forwarder: Option<&'a SerialForwarder>,
    ) -> Self {
        Self {
            store,
            arbiter,
            voice,
            forwarder,
        }
    }

    /// Process lines until `quit`, end of input, or `halted()` returns true
    ///
    /// `halted` is checked before each line and at least every `poll`.
    pub fn run<W, H>(
        &self,
        lines: &Receiver<String>,
        out: &mut W,
        poll: Duration,
        halted: H,
    ) -> io::Result<ConsoleExit>
    where
        W: Write,
        H: Fn() -> bool,
    {
        loop {
            if halted() {
                return Ok(ConsoleExit::Halted);
            }
            match lines.recv_timeout(poll) {
                Ok(line) => {
                    if self.handle_line(&line, out)? == ConsoleAction::Quit {
                        return Ok(ConsoleExit::Quit);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(ConsoleExit::InputClosed),
            }
        }
    }

    pub fn handle_line<W: Write>(&self, line: &str, out: &mut W) -> io::Result<ConsoleAction> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => return Ok(ConsoleAction::Quit),
            ["help"] => writeln!(out, "{}", HELP)?,
            ["status"] => self.print_status(out)?,
            ["resend"] => match self.forwarder {
                Some(forwarder) => match forwarder.resend_all(&self.store.get_all()) {
                    Ok(count) => writeln!(out, "ok: queued {} commands", count)?,
                    Err(e) => writeln!(out, "error: {}", e)?,
                },
                None => writeln!(out, "error: no serial device configured")?,
            },
            ["mode"] => writeln!(out, "ok: mode = {}", self.voice.toggle_mode())?,
            ["mode", name] => {
                let Some(mode) = VoiceMode::from_name(name) else {
                    return self.reject(out, format!("unknown mode '{}'", name));
                };
                self.voice.set_mode(mode);
                writeln!(out, "ok: mode = {}", mode)?;
            }
            ["mute"] => writeln!(out, "ok: mute = {}", self.voice.toggle_mute())?,
            ["ducking"] => writeln!(out, "ok: ducking = {}", self.voice.toggle_ducking())?,
            ["feedback"] => writeln!(out, "ok: feedback = {}", self.voice.toggle_feedback())?,
            ["eq", band, db] => {
                let Some(band) = EqBand::from_name(band) else {
                    return self.reject(out, format!("unknown band '{}'", band));
                };
                let Ok(db) = db.parse::<f32>() else {
                    return self.reject(out, format!("'{}' is not a number", db));
                };
                match self.arbiter.set_digital(band, db) {
                    Ok(()) => writeln!(out, "ok: {} = {} dB", band, db)?,
                    Err(e) => writeln!(out, "error: {}", e)?,
                }
            }
            ["dial", band, raw] => {
                let Some(band) = EqBand::from_name(band) else {
                    return self.reject(out, format!("unknown band '{}'", band));
                };
                let Ok(raw) = raw.parse::<u16>() else {
                    return self.reject(out, format!("'{}' is not a raw reading", raw));
                };
                match self.arbiter.on_physical_sample(band, raw) {
                    Some(db) => writeln!(out, "ok: {} = {} dB", band, db)?,
                    None => writeln!(out, "ignored: within deadzone")?,
                }
            }
            _ => match parse_line(line) {
                Ok(command) => match self.store.set(command.param, command.value) {
                    Ok(_) => writeln!(out, "ok: {}", command)?,
                    Err(e) => writeln!(out, "error: {}", e)?,
                },
                Err(e) => writeln!(out, "error: {}", e)?,
            },
        }
        Ok(ConsoleAction::Continue)
    }

    fn reject<W: Write>(&self, out: &mut W, message: String) -> io::Result<ConsoleAction> {
        writeln!(out, "error: {}", message)?;
        Ok(ConsoleAction::Continue)
    }

    fn print_status<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let messages = [
            StatusMessage::dial(&self.arbiter.snapshot()),
            StatusMessage::dsp_mixer(&self.store.mixer()),
        ]
        .into_iter()
        .chain(StatusMessage::voice_state(&self.voice.state()));
        for message in messages {
            let json = message
                .to_json()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(out, "{}", json)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duomix_core::control::{connect_eq_to_tone, MixParam};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    fn console() -> Console<'static> {
        let store = Arc::new(ParameterStore::default());
        let arbiter = Arc::new(EqInputArbiter::default());
        connect_eq_to_tone(&arbiter, &store);
        Console::new(store, arbiter, Arc::new(VoiceModeManager::default()), None)
    }

    fn output(console: &Console<'_>, line: &str) -> String {
        let mut out = Vec::new();
        console.handle_line(line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parameter_lines_reach_the_store() {
        let console = console();
        assert_eq!(output(&console, "g2 1.5"), "ok: g2 1.5\n");
        assert_eq!(console.store.get(MixParam::GainCh2), 1.5);
        assert!(output(&console, "pan 3").starts_with("error:"));
        assert_eq!(console.store.get(MixParam::Pan), 0.0);
    }

    #[test]
    fn test_eq_drives_tone_gains() {
        let console = console();
        assert_eq!(output(&console, "eq low 12"), "ok: low = 12 dB\n");
        assert_eq!(console.store.get(MixParam::BassL), 10.0);
        assert_eq!(console.store.get(MixParam::BassR), 10.0);
        assert!(output(&console, "eq low 13").starts_with("error:"));
        assert!(output(&console, "eq sub 1").starts_with("error:"));
    }

    #[test]
    fn test_dial_respects_deadzone() {
        let console = console();
        assert!(output(&console, "dial high 32768").starts_with("ok:"));
        assert_eq!(output(&console, "dial high 32800"), "ignored: within deadzone\n");
    }

    #[test]
    fn test_voice_commands() {
        let console = console();
        assert_eq!(output(&console, "mode"), "ok: mode = music\n");
        assert_eq!(output(&console, "mode monitor"), "ok: mode = monitor\n");
        assert!(output(&console, "mode karaoke").starts_with("error:"));
        assert_eq!(output(&console, "mute"), "ok: mute = true\n");
        assert_eq!(output(&console, "ducking"), "ok: ducking = true\n");
        assert_eq!(output(&console, "feedback"), "ok: feedback = true\n");

        assert!(console.voice.is_muted());
        assert_eq!(console.voice.mode(), VoiceMode::Monitor);
    }

    #[test]
    fn test_status_prints_every_message() {
        let console = console();
        let text = output(&console, "status");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("\"type\":\"dial\""));
        assert!(lines[1].contains("\"type\":\"dsp_mixer\""));
        assert_eq!(lines[2], r#"{"type":"mode","mode":"off"}"#);
        assert_eq!(lines[3], r#"{"type":"mute","enabled":false}"#);
    }

    #[test]
    fn test_resend_without_serial() {
        let console = console();
        assert!(output(&console, "resend").starts_with("error:"));
    }

    #[test]
    fn test_run_stops_at_quit() {
        let console = console();
        let lines = spawn_line_reader(Cursor::new("g1 0.5\nquit\ng1 1.0\n")).unwrap();
        let mut out = Vec::new();

        let exit = console
            .run(&lines, &mut out, Duration::from_millis(10), || false)
            .unwrap();
        assert_eq!(exit, ConsoleExit::Quit);
        assert_eq!(console.store.get(MixParam::GainCh1), 0.5);
    }

    #[test]
    fn test_run_ends_with_input() {
        let console = console();
        let lines = spawn_line_reader(Cursor::new("pan 0.5\n")).unwrap();
        let mut out = Vec::new();

        let exit = console
            .run(&lines, &mut out, Duration::from_millis(10), || false)
            .unwrap();
        assert_eq!(exit, ConsoleExit::InputClosed);
        assert_eq!(console.store.get(MixParam::Pan), 0.5);
    }

    #[test]
    fn test_run_halts_without_input() {
        let console = console();
        // Sender kept alive: no line ever arrives
        let (_tx, lines) = channel::unbounded::<String>();
        let fault = Arc::new(AtomicBool::new(false));

        let trigger = Arc::clone(&fault);
        let raiser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            trigger.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let mut out = Vec::new();
        let exit = console
            .run(&lines, &mut out, Duration::from_millis(5), || fault.load(Ordering::SeqCst))
            .unwrap();
        raiser.join().unwrap();

        assert_eq!(exit, ConsoleExit::Halted);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
