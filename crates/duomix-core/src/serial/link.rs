//! SerialControlLink - drives the external DSP over a text serial channel
//!
//! Outbound commands are fire-and-forget: there is no acknowledgement, so
//! after the DSP chip resets the owner calls
//! [`SerialForwarder::resend_all`] to reapply every parameter.
//!
//! The store never writes to the port itself. Its listener converts each
//! accepted change into a [`SerialCommand`] and hands it to the forwarder
//! thread over a channel:
//!
//! ```text
//!   ParameterStore::set ─► listener ─► channel ─► duomix-serial thread ─► port
//!   port ─► duomix-serial-rx thread ─► SerialReader ─► ParameterStore::set
//! ```
//!
//! Inbound values equal to what the store already holds are dropped, so a
//! DSP that echoes commands back cannot start a feedback loop.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};

use super::command::{parse_line, SerialCommand};
use super::error::{SerialError, SerialResult};
use crate::control::{MixParam, ParameterSnapshot, ParameterStore};

/// Writer half of the serial protocol
pub struct SerialControlLink<W: Write> {
    writer: W,
    sent: u64,
}

impl SerialControlLink<File> {
    /// Open a serial device node for writing (line settings are left to the OS)
    pub fn open(path: &Path) -> SerialResult<Self> {
        let file = OpenOptions::new().write(true).open(path)?;
        log::info!("Serial link opened: {:?}", path);
        Ok(Self::new(file))
    }

    /// Open a serial device node for both directions
    ///
    /// # Arguments
    ///
    /// * `path` - Device node, e.g. `/dev/ttyUSB0`
    ///
    /// # Returns
    ///
    /// The writer half and a reader over a second handle to the same node
    pub fn open_duplex(path: &Path) -> SerialResult<(Self, SerialReader<BufReader<File>>)> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let reader = SerialReader::new(BufReader::new(file.try_clone()?));
        log::info!("Serial link opened (read/write): {:?}", path);
        Ok((Self::new(file), reader))
    }
}

impl<W: Write> SerialControlLink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, sent: 0 }
    }

    /// Validate, format and write one command line
    pub fn send(&mut self, param: MixParam, value: f32) -> SerialResult<()> {
        let command = SerialCommand::new(param, value)?;
        self.send_command(&command)
    }

    pub fn send_command(&mut self, command: &SerialCommand) -> SerialResult<()> {
        self.writer.write_all(command.to_line().as_bytes())?;
        self.writer.flush()?;
        self.sent += 1;
        log::debug!("Sent -> {}", command);
        Ok(())
    }

    /// Commands written so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Reader half: inbound `param value` lines
pub struct SerialReader<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> SerialReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    /// Read and parse the next line; `None` at end of input
    ///
    /// A bad line yields `Some(Err(..))`; the next call continues with the
    /// following line. Blank lines are skipped.
    pub fn receive_line(&mut self) -> Option<SerialResult<SerialCommand>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) if self.line.trim().is_empty() => continue,
                Ok(_) => return Some(parse_line(&self.line)),
                Err(e) => return Some(Err(SerialError::Io(e))),
            }
        }
    }

    /// Apply every line to `store` until end of input or an I/O error
    ///
    /// Bad lines are logged and skipped, as are values the store already
    /// holds. Returns the number of applied commands.
    pub fn run(&mut self, store: &ParameterStore) -> SerialResult<usize> {
        let mut applied = 0;
        while let Some(result) = self.receive_line() {
            match result {
                Ok(command) => {
                    if store.get(command.param) == command.value {
                        log::trace!("Serial RX: {} unchanged", command);
                        continue;
                    }
                    if store.set(command.param, command.value).is_ok() {
                        applied += 1;
                    }
                }
                Err(SerialError::Io(e)) => return Err(SerialError::Io(e)),
                Err(e) => log::warn!("Serial RX: skipping line: {}", e),
            }
        }
        Ok(applied)
    }
}

impl<R: BufRead + Send + 'static> SerialReader<R> {
    /// Run [`run`](Self::run) on a `duomix-serial-rx` thread
    ///
    /// The thread ends when the port reaches end of input or fails. A read
    /// blocked on an idle port cannot be interrupted, so owners detach the
    /// handle at shutdown instead of joining it.
    pub fn spawn(mut self, store: Arc<ParameterStore>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("duomix-serial-rx".into())
            .spawn(move || {
                log::info!("Serial reader started");
                match self.run(&store) {
                    Ok(applied) => log::info!("Serial reader finished ({} commands applied)", applied),
                    Err(e) => log::error!("Serial reader stopped: {}", e),
                }
            })
    }
}

enum ForwarderMsg {
    Command(SerialCommand),
    Shutdown,
}

/// Background writer thread owning a [`SerialControlLink`]
pub struct SerialForwarder {
    tx: Sender<ForwarderMsg>,
    handle: Option<JoinHandle<()>>,
    sent: Arc<AtomicU64>,
}

impl SerialForwarder {
    pub fn spawn<W>(mut link: SerialControlLink<W>) -> SerialResult<Self>
    where
        W: Write + Send + 'static,
    {
        let (tx, rx) = channel::unbounded::<ForwarderMsg>();
        let sent = Arc::new(AtomicU64::new(0));
        let sent_counter = Arc::clone(&sent);

        let handle = thread::Builder::new()
            .name("duomix-serial".into())
            .spawn(move || {
                log::info!("Serial forwarder started");
                while let Ok(ForwarderMsg::Command(command)) = rx.recv() {
                    match link.send_command(&command) {
                        Ok(()) => {
                            sent_counter.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => log::warn!("Serial TX failed for '{}': {}", command, e),
                    }
                }
                log::info!("Serial forwarder stopped");
            })?;

        Ok(Self {
            tx,
            handle: Some(handle),
            sent,
        })
    }

    /// Queue a command; never blocks
    pub fn submit(&self, command: SerialCommand) -> SerialResult<()> {
        self.tx
            .send(ForwarderMsg::Command(command))
            .map_err(|_| SerialError::Disconnected)
    }

    /// Commands successfully written by the forwarder thread
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Mirror every accepted store change to the DSP
    ///
    /// Only the parameter that changed is sent.
    pub fn connect_store(&self, store: &ParameterStore) {
        let tx = self.tx.clone();
        store.add_listener(move |param, snapshot| {
            let command = match SerialCommand::new(param, snapshot.get(param)) {
                Ok(command) => command,
                Err(e) => {
                    log::warn!("Serial TX: {}", e);
                    return;
                }
            };
            if tx.send(ForwarderMsg::Command(command)).is_err() {
                log::debug!("Serial forwarder gone; dropping {}", command);
            }
        });
    }

    /// Queue every parameter of `snapshot` (e.g. after the DSP chip reset)
    pub fn resend_all(&self, snapshot: &ParameterSnapshot) -> SerialResult<usize> {
        for param in MixParam::ALL {
            self.submit(SerialCommand::new(param, snapshot.get(param))?)?;
        }
        log::info!("Queued full parameter resend ({} commands)", MixParam::ALL.len());
        Ok(MixParam::ALL.len())
    }

    /// Flush queued commands and join the writer thread
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(ForwarderMsg::Shutdown);
            if handle.join().is_err() {
                log::error!("Serial forwarder thread panicked");
            }
        }
    }
}

impl Drop for SerialForwarder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Shared in-memory port
    #[derive(Clone, Default)]
    struct MemoryPort(Arc<Mutex<Vec<u8>>>);

    impl Write for MemoryPort {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl MemoryPort {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_send_writes_one_line() {
        let mut link = SerialControlLink::new(Vec::new());
        link.send(MixParam::GainCh2, 1.25).unwrap();
        link.send(MixParam::BassL, 6.0).unwrap();
        assert!(link.send(MixParam::Pan, -2.0).is_err());
        assert_eq!(link.sent(), 2);
        assert_eq!(link.into_inner(), b"g2 1.25\nbl 6\n".to_vec());
    }

    #[test]
    fn test_reader_skips_bad_lines() {
        let input = "g1 1.5\nbogus 1\n\npan 7\nMASTER 0.9\nnot-a-command\n";
        let mut reader = SerialReader::new(Cursor::new(input));
        let store = ParameterStore::default();

        assert_eq!(reader.run(&store).unwrap(), 2);
        assert_eq!(store.get(MixParam::GainCh1), 1.5);
        assert_eq!(store.get(MixParam::MasterGain), 0.9);
        assert_eq!(store.get(MixParam::Pan), 0.0);
    }

    #[test]
    fn test_echoed_values_are_not_forwarded_again() {
        let port = MemoryPort::default();
        let mut forwarder = SerialForwarder::spawn(SerialControlLink::new(port.clone())).unwrap();
        let store = ParameterStore::default();
        forwarder.connect_store(&store);

        // g1 0.7 is the current value; only pan changes
        let mut reader = SerialReader::new(Cursor::new("g1 0.7\npan 0.5\npan 0.5\n"));
        assert_eq!(reader.run(&store).unwrap(), 1);
        forwarder.shutdown();

        assert_eq!(port.text(), "pan 0.5\n");
    }

    #[test]
    fn test_spawned_reader_applies_lines() {
        let store = Arc::new(ParameterStore::default());
        let reader = SerialReader::new(Cursor::new("master 1.1\nbr 4\n"));
        reader.spawn(Arc::clone(&store)).unwrap().join().unwrap();

        assert_eq!(store.get(MixParam::MasterGain), 1.1);
        assert_eq!(store.get(MixParam::BassR), 4.0);
    }

    #[test]
    fn test_open_duplex_shares_one_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tty");
        std::fs::write(&path, "").unwrap();

        let (mut link, _reader) = SerialControlLink::open_duplex(&path).unwrap();
        link.send(MixParam::GainCh1, 0.5).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "g1 0.5\n");
        assert!(SerialControlLink::open_duplex(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_receive_line_reports_each_line() {
        let mut reader = SerialReader::new(Cursor::new("tr 2\nxx\n"));
        assert!(matches!(reader.receive_line(), Some(Ok(_))));
        assert!(matches!(reader.receive_line(), Some(Err(_))));
        assert!(reader.receive_line().is_none());
    }

    #[test]
    fn test_forwarder_mirrors_store_changes() {
        let port = MemoryPort::default();
        let mut forwarder = SerialForwarder::spawn(SerialControlLink::new(port.clone())).unwrap();
        let store = ParameterStore::default();
        forwarder.connect_store(&store);

        store.set(MixParam::Pan, 0.5).unwrap();
        store.set(MixParam::Pan, 9.0).unwrap_err();
        store.set(MixParam::TrebleL, 3.0).unwrap();
        forwarder.shutdown();

        assert_eq!(port.text(), "pan 0.5\ntl 3\n");
        assert_eq!(forwarder.sent(), 2);
    }

    #[test]
    fn test_resend_all_covers_every_parameter() {
        let port = MemoryPort::default();
        let mut forwarder = SerialForwarder::spawn(SerialControlLink::new(port.clone())).unwrap();

        let count = forwarder.resend_all(&ParameterSnapshot::default()).unwrap();
        forwarder.shutdown();

        assert_eq!(count, 8);
        assert_eq!(
            port.text(),
            "g1 0.7\ng2 0.7\npan 0\nmaster 0.3\nbl 1\ntl 1\nbr 1\ntr 1\n"
        );
    }

    #[test]
    fn test_submit_after_shutdown_is_disconnected() {
        let mut forwarder = SerialForwarder::spawn(SerialControlLink::new(Vec::new())).unwrap();
        forwarder.shutdown();
        let command = SerialCommand::new(MixParam::Pan, 0.0).unwrap();
        assert!(matches!(forwarder.submit(command), Err(SerialError::Disconnected)));
    }
}
