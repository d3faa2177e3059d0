//! AudioPipeline - producer/consumer threads around the ring buffer
//!
//! ```text
//!   left src ─┐                                          ┌─► AudioSink
//!             ├─► Producer ──► RingBuffer ──► Consumer ──┤  (fixed cadence,
//!   right src ┘   (mix with                               │   silence on underrun)
//!                 store snapshot)
//! ```
//!
//! State machine:
//!
//! ```text
//!   Stopped ─► Starting ─► Running ─► Stopping ─► Stopped
//!                 │                                  ▲
//!                 └──────────── (fault) ─────────────┘
//! ```
//!
//! Startup acquires both sources and the sink, retrying for at most the
//! configured timeout. A worker that hits a resource fault while running
//! records it, raises the shared stop flag and moves the state to
//! `Stopping`; both workers exit at their next iteration. The owner sees the
//! fault through [`AudioPipeline::state`] or [`AudioPipeline::has_faulted`],
//! and [`AudioPipeline::stop`] reports it after joining the workers and
//! releasing the sink.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::config::{AudioConfig, OutputTarget};
use super::error::{PipelineError, PipelineResult};
use super::ring_buffer::RingBuffer;
use super::sink::{AudioSink, WavFileSink};
use super::source::{HeaderedPcmSource, PcmSource};
use crate::control::{ParameterStore, VoiceModeManager};
use crate::engine::{AudioMixer, CrossoverConfig};
use crate::sync::lock;
use crate::types::{
    decode_pcm_le, encode_frames_le, Sample, StereoFrame, BYTES_PER_FRAME, BYTES_PER_SAMPLE,
};

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Starting,
            2 => PipelineState::Running,
            3 => PipelineState::Stopping,
            _ => PipelineState::Stopped,
        }
    }
}

/// Opens the resources a pipeline run needs
///
/// Both methods are called again on every startup retry, so an
/// implementation must not hold on to half-opened resources between calls.
/// Tests plug in in-memory sources and sinks here; the device uses
/// [`FileBackend`].
pub trait PipelineBackend {
    /// Open the left and right sources, in that order
    fn open_sources(&self, config: &AudioConfig) -> PipelineResult<[Box<dyn PcmSource>; 2]>;

    /// Open the output described by `config.output`
    fn open_sink(&self, config: &AudioConfig) -> PipelineResult<Box<dyn AudioSink>>;
}

/// Headered PCM files in, [`OutputTarget`] out
#[derive(Debug, Default, Clone, Copy)]
pub struct FileBackend;

impl FileBackend {
    fn open_source(path: &std::path::Path, header_len: u64) -> PipelineResult<Box<dyn PcmSource>> {
        let source =
            HeaderedPcmSource::from_path(path, header_len).map_err(|e| PipelineError::SourceOpen {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(source))
    }
}

impl PipelineBackend for FileBackend {
    fn open_sources(&self, config: &AudioConfig) -> PipelineResult<[Box<dyn PcmSource>; 2]> {
        let left = Self::open_source(&config.sources[0], config.header_len)?;
        let right = Self::open_source(&config.sources[1], config.header_len)?;
        Ok([left, right])
    }

    fn open_sink(&self, config: &AudioConfig) -> PipelineResult<Box<dyn AudioSink>> {
        match &config.output {
            OutputTarget::Wav { path } => {
                let sink = WavFileSink::create(path, config.sample_rate)
                    .map_err(|e| PipelineError::SinkInit(e.to_string()))?;
                Ok(Box::new(sink))
            }
            #[cfg(feature = "cpal-backend")]
            OutputTarget::Cpal => {
                let sink = super::cpal_sink::CpalSink::open(config.sample_rate)
                    .map_err(|e| PipelineError::SinkInit(e.to_string()))?;
                Ok(Box::new(sink))
            }
            #[cfg(not(feature = "cpal-backend"))]
            OutputTarget::Cpal => Err(PipelineError::SinkInit(
                "built without the cpal-backend feature".into(),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Producer
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one producer iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerCycle {
    /// The pending block was fully written (`n` bytes this cycle)
    Complete(usize),
    /// Ring full: `n` bytes written, the rest stays pending for the next cycle
    Backpressure(usize),
    /// Both sources returned no data
    Idle,
}

/// Counters reported when a run ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub blocks_mixed: u64,
    pub short_writes: u64,
    pub idle_cycles: u64,
    pub transfers: u64,
    pub underruns: u64,
    /// Transfers written as silence because the device was muted
    pub muted_transfers: u64,
}

/// Storage reader + mixer side
///
/// A mixed block that does not fit in the ring is kept and retried before any
/// new source data is read, so nothing is dropped or duplicated.
pub struct Producer {
    sources: [Box<dyn PcmSource>; 2],
    store: Arc<ParameterStore>,
    mixer: AudioMixer,
    ring: Arc<RingBuffer>,
    raw: [Vec<u8>; 2],
    samples: [Vec<Sample>; 2],
    frames: Vec<StereoFrame>,
    pending: Vec<u8>,
    pending_offset: usize,
    stats: PipelineStats,
}

impl Producer {
    pub fn new(
        sources: [Box<dyn PcmSource>; 2],
        store: Arc<ParameterStore>,
        mixer: AudioMixer,
        ring: Arc<RingBuffer>,
        chunk_samples: usize,
    ) -> Self {
        let chunk_bytes = chunk_samples * BYTES_PER_SAMPLE;
        Self {
            sources,
            store,
            mixer,
            ring,
            raw: [vec![0; chunk_bytes], vec![0; chunk_bytes]],
            samples: [vec![0; chunk_samples], vec![0; chunk_samples]],
            frames: vec![StereoFrame::silence(); chunk_samples],
            pending: Vec::with_capacity(chunk_samples * 2 * BYTES_PER_SAMPLE),
            pending_offset: 0,
            stats: PipelineStats::default(),
        }
    }

    /// Bytes of the current block not yet accepted by the ring
    pub fn pending_bytes(&self) -> usize {
        self.pending.len() - self.pending_offset
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Run one iteration: retry the pending block, or read, mix and write a new one
    pub fn cycle(&mut self) -> PipelineResult<ProducerCycle> {
        if self.pending_bytes() == 0 && !self.mix_next_block()? {
            self.stats.idle_cycles += 1;
            return Ok(ProducerCycle::Idle);
        }

        // Only whole frames go into the ring, so a sink never sees a torn
        // frame next to an underrun silence block.
        let room = self.ring.space() / BYTES_PER_FRAME * BYTES_PER_FRAME;
        let end = self.pending.len().min(self.pending_offset + room);
        let written = self.ring.write(&self.pending[self.pending_offset..end]);
        self.pending_offset += written;
        if self.pending_bytes() > 0 {
            self.stats.short_writes += 1;
            Ok(ProducerCycle::Backpressure(written))
        } else {
            Ok(ProducerCycle::Complete(written))
        }
    }

    /// Read both sources and mix them into `pending`; false if both are dry
    fn mix_next_block(&mut self) -> PipelineResult<bool> {
        let mut frames = 0;
        for ch in 0..2 {
            let read = self.sources[ch].read_chunk(&mut self.raw[ch])?;
            let decoded = decode_pcm_le(&self.raw[ch][..read], &mut self.samples[ch]);
            // A short source contributes silence for the rest of the block
            self.samples[ch][decoded..].fill(0);
            frames = frames.max(decoded);
        }
        if frames == 0 {
            return Ok(false);
        }

        let snapshot = self.store.get_all();
        let mixed = self.mixer.mix_with_tone(
            &mut self.frames[..frames],
            &self.samples[0][..frames],
            &self.samples[1][..frames],
            &snapshot.mixer,
            &snapshot.tone,
        );
        encode_frames_le(&self.frames[..mixed], &mut self.pending);
        self.pending_offset = 0;
        self.stats.blocks_mixed += 1;
        Ok(true)
    }

    fn into_mixer(self) -> AudioMixer {
        self.mixer
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Consumer
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one consumer iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerCycle {
    /// `n` bytes of mixed audio written
    Data(usize),
    /// Ring empty: one zero-filled transfer written
    Silence(usize),
}

/// Sink writer side; performs exactly one bounded write per cycle
///
/// While muted the ring is still drained at the normal cadence, but the data
/// goes out as zeros.
pub struct Consumer {
    ring: Arc<RingBuffer>,
    sink: Box<dyn AudioSink>,
    transfer: Vec<u8>,
    voice: Option<Arc<VoiceModeManager>>,
    stats: PipelineStats,
}

impl Consumer {
    /// `transfer_size` is rounded down to whole frames (at least one)
    pub fn new(ring: Arc<RingBuffer>, sink: Box<dyn AudioSink>, transfer_size: usize) -> Self {
        let transfer_size = (transfer_size / BYTES_PER_FRAME).max(1) * BYTES_PER_FRAME;
        Self {
            ring,
            sink,
            transfer: vec![0; transfer_size],
            voice: None,
            stats: PipelineStats::default(),
        }
    }

    /// Honour the mute toggle of `voice`
    pub fn with_voice(mut self, voice: Arc<VoiceModeManager>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    fn is_muted(&self) -> bool {
        self.voice.as_ref().is_some_and(|voice| voice.is_muted())
    }

    pub fn cycle(&mut self) -> PipelineResult<ConsumerCycle> {
        let read = self.ring.read_into(&mut self.transfer);
        self.stats.transfers += 1;
        if read > 0 {
            if self.is_muted() {
                self.transfer[..read].fill(0);
                self.stats.muted_transfers += 1;
            }
            self.sink.write(&self.transfer[..read])?;
            Ok(ConsumerCycle::Data(read))
        } else {
            self.transfer.fill(0);
            self.sink.write(&self.transfer)?;
            self.stats.underruns += 1;
            Ok(ConsumerCycle::Silence(self.transfer.len()))
        }
    }

    /// Write out whatever is still buffered (no silence)
    fn drain(&mut self) -> PipelineResult<usize> {
        let mut total = 0;
        loop {
            let read = self.ring.read_into(&mut self.transfer);
            if read == 0 {
                return Ok(total);
            }
            if self.is_muted() {
                self.transfer[..read].fill(0);
            }
            self.sink.write(&self.transfer[..read])?;
            total += read;
        }
    }

    fn release(&mut self) -> PipelineResult<()> {
        self.sink.release()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Run state shared by the pipeline handle and its workers
struct RunShared {
    state: AtomicU8,
    stop: AtomicBool,
    fault: Mutex<Option<PipelineError>>,
}

impl RunShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PipelineState::Stopped as u8),
            stop: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn has_fault(&self) -> bool {
        lock(&self.fault).is_some()
    }

    /// Keep the first fault (later ones are consequences) and wind the run down
    fn record_fault(&self, worker: &str, error: PipelineError) {
        log::error!("{} fault: {}", worker, error);
        {
            let mut fault = lock(&self.fault);
            if fault.is_none() {
                *fault = Some(error);
            }
        }
        self.stop.store(true, Ordering::Release);
        let previous = self.state.swap(PipelineState::Stopping as u8, Ordering::AcqRel);
        if previous != PipelineState::Stopping as u8 {
            log::warn!(
                "Pipeline {:?} -> Stopping (fault)",
                PipelineState::from_u8(previous)
            );
        }
    }
}

struct Workers {
    producer: JoinHandle<Producer>,
    consumer: JoinHandle<Consumer>,
}

/// Owns the worker threads of one playback run at a time
pub struct AudioPipeline {
    config: AudioConfig,
    crossover: CrossoverConfig,
    store: Arc<ParameterStore>,
    voice: Option<Arc<VoiceModeManager>>,
    shared: Arc<RunShared>,
    workers: Option<Workers>,
    /// Kept between runs so its filter state can be reset on restart
    mixer: Option<AudioMixer>,
    last_stats: PipelineStats,
}

impl AudioPipeline {
    /// Create a stopped pipeline
    ///
    /// # Arguments
    /// * `config` - Buffer sizes, timing and I/O targets; sanitized here
    /// * `crossover` - Tone stage settings for the mixer
    /// * `store` - Parameters the producer snapshots once per block
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mut pipeline = AudioPipeline::new(config.audio, config.crossover, store)
    ///     .with_voice(voice);
    /// pipeline.start(&FileBackend)?;
    /// ```
    pub fn new(config: AudioConfig, crossover: CrossoverConfig, store: Arc<ParameterStore>) -> Self {
        Self {
            config: config.sanitized(),
            crossover,
            store,
            voice: None,
            shared: Arc::new(RunShared::new()),
            workers: None,
            mixer: None,
            last_stats: PipelineStats::default(),
        }
    }

    /// Silence the output whenever `voice` is muted (applies from the next start)
    pub fn with_voice(mut self, voice: Arc<VoiceModeManager>) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Current lifecycle state; `Stopping` while running means a worker faulted
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// True once a worker has stopped the run because of a fault
    pub fn has_faulted(&self) -> bool {
        self.shared.has_fault()
    }

    /// Counters from the last completed run
    pub fn last_stats(&self) -> PipelineStats {
        self.last_stats
    }

    fn set_state(&self, state: PipelineState) {
        let previous = PipelineState::from_u8(self.shared.state.swap(state as u8, Ordering::AcqRel));
        log::info!("Pipeline {:?} -> {:?}", previous, state);
    }

    /// Acquire resources and start both workers
    ///
    /// Sources and sink are opened through `backend`, retrying every
    /// `startup_retry_ms` until `startup_timeout_ms` has passed.
    ///
    /// # Arguments
    /// * `backend` - Opens the sources and the sink
    ///
    /// # Errors
    ///
    /// [`PipelineError::AlreadyRunning`] unless stopped. Otherwise the open
    /// error of a single attempt, or [`PipelineError::StartupTimeout`] after
    /// several; both leave the pipeline `Stopped`.
    pub fn start(&mut self, backend: &dyn PipelineBackend) -> PipelineResult<()> {
        if self
            .shared
            .state
            .compare_exchange(
                PipelineState::Stopped as u8,
                PipelineState::Starting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(PipelineError::AlreadyRunning);
        }
        log::info!("Pipeline Stopped -> Starting");

        let (sources, sink) = match self.acquire(backend) {
            Ok(resources) => resources,
            Err(e) => {
                log::error!("Pipeline startup failed: {}", e);
                self.set_state(PipelineState::Stopped);
                return Err(e);
            }
        };

        self.shared.stop.store(false, Ordering::Release);
        *lock(&self.shared.fault) = None;

        let ring = Arc::new(RingBuffer::new(self.config.ring_capacity));
        let mut mixer = self
            .mixer
            .take()
            .unwrap_or_else(|| AudioMixer::new(self.crossover));
        mixer.reset();

        let producer = Producer::new(
            sources,
            Arc::clone(&self.store),
            mixer,
            Arc::clone(&ring),
            self.config.chunk_samples(),
        );
        let mut consumer = Consumer::new(ring, sink, self.config.transfer_size);
        if let Some(voice) = &self.voice {
            consumer = consumer.with_voice(Arc::clone(voice));
        }

        match self.spawn_workers(producer, consumer) {
            Ok(workers) => {
                self.workers = Some(workers);
                // A worker may already have faulted and moved the state on
                if self
                    .shared
                    .state
                    .compare_exchange(
                        PipelineState::Starting as u8,
                        PipelineState::Running as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    log::info!("Pipeline Starting -> Running");
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Pipeline startup failed: {}", e);
                self.set_state(PipelineState::Stopped);
                Err(e)
            }
        }
    }

    /// Open sources and sink, retrying within the startup window
    fn acquire(
        &self,
        backend: &dyn PipelineBackend,
    ) -> PipelineResult<([Box<dyn PcmSource>; 2], Box<dyn AudioSink>)> {
        let deadline = Instant::now() + self.config.startup_timeout();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let result = backend
                .open_sources(&self.config)
                .and_then(|sources| Ok((sources, backend.open_sink(&self.config)?)));

            let error = match result {
                Ok(resources) => return Ok(resources),
                Err(e) => e,
            };

            let retry = self.config.startup_retry();
            if Instant::now() + retry > deadline {
                return Err(if attempts == 1 {
                    error
                } else {
                    PipelineError::StartupTimeout {
                        attempts,
                        last_error: error.to_string(),
                    }
                });
            }
            log::warn!(
                "Pipeline startup attempt {} failed: {}; retrying in {:?}",
                attempts,
                error,
                retry
            );
            thread::sleep(retry);
        }
    }

    fn spawn_workers(&self, producer: Producer, consumer: Consumer) -> PipelineResult<Workers> {
        let backoff = self.config.idle_backoff();
        let period = self.config.consumer_period();

        let shared = Arc::clone(&self.shared);
        let producer_handle = thread::Builder::new()
            .name("duomix-producer".into())
            .spawn(move || run_producer(producer, &shared, backoff))
            .map_err(|e| PipelineError::ThreadSpawn("producer", e.to_string()))?;

        let shared = Arc::clone(&self.shared);
        let consumer_handle = thread::Builder::new()
            .name("duomix-consumer".into())
            .spawn(move || run_consumer(consumer, &shared, period));

        match consumer_handle {
            Ok(consumer) => Ok(Workers {
                producer: producer_handle,
                consumer,
            }),
            Err(e) => {
                self.shared.stop.store(true, Ordering::Release);
                let _ = producer_handle.join();
                Err(PipelineError::ThreadSpawn("consumer", e.to_string()))
            }
        }
    }

    /// Stop both workers, wait for them, then release the sink
    ///
    /// Audio still in the ring is written out before the release unless the
    /// run faulted. Calling this on a stopped pipeline is a no-op.
    ///
    /// # Errors
    ///
    /// The first fault recorded during the run, if any. The pipeline is
    /// `Stopped` and can be started again either way.
    ///
    /// # Example
    ///
    /// ```ignore
    /// if pipeline.has_faulted() {
    ///     if let Err(fault) = pipeline.stop() {
    ///         log::error!("playback ended: {}", fault);
    ///     }
    /// }
    /// ```
    pub fn stop(&mut self) -> PipelineResult<()> {
        let Some(workers) = self.workers.take() else {
            return Ok(());
        };

        if self.state() != PipelineState::Stopping {
            self.set_state(PipelineState::Stopping);
        }
        self.shared.stop.store(true, Ordering::Release);

        let mut stats = PipelineStats::default();
        match workers.producer.join() {
            Ok(producer) => {
                stats = producer.stats();
                self.mixer = Some(producer.into_mixer());
            }
            Err(_) => self
                .shared
                .record_fault("producer", PipelineError::WorkerPanicked("producer")),
        }

        match workers.consumer.join() {
            Ok(mut consumer) => {
                let consumed = consumer.stats();
                stats.transfers = consumed.transfers;
                stats.underruns = consumed.underruns;
                stats.muted_transfers = consumed.muted_transfers;
                if let Err(e) = consumer.release() {
                    self.shared.record_fault("consumer", e);
                }
            }
            Err(_) => self
                .shared
                .record_fault("consumer", PipelineError::WorkerPanicked("consumer")),
        }

        log::debug!(
            "Pipeline run stats: {} blocks mixed, {} short writes, {} idle cycles, {} transfers, {} underruns",
            stats.blocks_mixed,
            stats.short_writes,
            stats.idle_cycles,
            stats.transfers,
            stats.underruns
        );
        self.last_stats = stats;
        self.set_state(PipelineState::Stopped);

        match lock(&self.shared.fault).take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Pipeline stopped with fault: {}", e);
        }
    }
}

fn run_producer(mut producer: Producer, shared: &RunShared, backoff: std::time::Duration) -> Producer {
    log::info!("Producer started");
    while !shared.stopping() {
        match producer.cycle() {
            Ok(ProducerCycle::Complete(_)) => {}
            Ok(ProducerCycle::Backpressure(_)) | Ok(ProducerCycle::Idle) => thread::sleep(backoff),
            Err(e) => {
                shared.record_fault("Producer", e);
                break;
            }
        }
    }
    log::info!("Producer stopped");
    producer
}

fn run_consumer(mut consumer: Consumer, shared: &RunShared, period: std::time::Duration) -> Consumer {
    log::info!("Consumer started ({:?} period)", period);
    let mut next = Instant::now();
    while !shared.stopping() {
        if let Err(e) = consumer.cycle() {
            shared.record_fault("Consumer", e);
            return consumer;
        }

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else if now - next > period {
            // Fell more than a period behind; resync instead of bursting
            next = now;
        }
    }

    if !shared.has_fault() {
        match consumer.drain() {
            Ok(bytes) if bytes > 0 => log::debug!("Consumer drained {} bytes on stop", bytes),
            Ok(_) => {}
            Err(e) => shared.record_fault("Consumer", e),
        }
    }
    log::info!("Consumer stopped");
    consumer
}
