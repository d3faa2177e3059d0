//! Audio pipeline error types

use thiserror::Error;

/// Errors raised by an [`AudioSink`](super::AudioSink)
#[derive(Error, Debug)]
pub enum SinkError {
    /// I/O failure on the output
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV encoder failure
    #[error("WAV writer error: {0}")]
    Wav(#[from] hound::Error),

    /// Output device could not be opened or configured
    #[error("Audio device error: {0}")]
    Device(String),

    /// Write after release
    #[error("Sink already released")]
    Closed,
}

/// Errors that can occur while starting or running the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A PCM source could not be opened (storage missing or unreadable)
    #[error("Failed to open PCM source {path}: {reason}")]
    SourceOpen { path: String, reason: String },

    /// Reading a PCM source failed during playback
    #[error("PCM source read error: {0}")]
    SourceIo(#[from] std::io::Error),

    /// The output sink could not be initialised
    #[error("Failed to initialise audio sink: {0}")]
    SinkInit(String),

    /// Writing to the output sink failed during playback
    #[error("Audio sink error: {0}")]
    Sink(#[from] SinkError),

    /// `start` was called while the pipeline was not stopped
    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// Resources could not be acquired within the startup window
    #[error("Pipeline startup timed out after {attempts} attempt(s): {last_error}")]
    StartupTimeout { attempts: u32, last_error: String },

    /// A worker thread could not be spawned
    #[error("Failed to spawn {0} thread: {1}")]
    ThreadSpawn(&'static str, String),

    /// A worker thread panicked
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
