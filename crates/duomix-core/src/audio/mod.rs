//! Real-time audio path for duomix
//!
//! Two genuinely parallel workers exchange data only through the
//! [`RingBuffer`] and read parameters only through the
//! [`ParameterStore`](crate::control::ParameterStore):
//!
//! - **Producer**: reads one chunk from each PCM source, takes a parameter
//!   snapshot, mixes, writes to the ring (retrying short writes)
//! - **Consumer**: on a fixed cadence, drains up to one transfer into the
//!   [`AudioSink`], or writes a silence block when the ring is empty
//!
//! # Example Usage
//!
//! ```ignore
//! use duomix_core::audio::{AudioConfig, AudioPipeline, FileBackend};
//!
//! let mut pipeline = AudioPipeline::new(AudioConfig::default(), crossover, store);
//! pipeline.start(&FileBackend)?;
//! // ...
//! pipeline.stop()?;
//! ```

mod config;
mod error;
mod pipeline;
mod ring_buffer;
mod sink;
mod source;

#[cfg(feature = "cpal-backend")]
mod cpal_sink;

pub use config::{
    AudioConfig, OutputTarget, DEFAULT_CHUNK_BYTES, DEFAULT_RING_CAPACITY, DEFAULT_TRANSFER_SIZE,
};
pub use error::{PipelineError, PipelineResult, SinkError};
pub use pipeline::{
    AudioPipeline, Consumer, ConsumerCycle, FileBackend, PipelineBackend, PipelineState,
    PipelineStats, Producer, ProducerCycle,
};
pub use ring_buffer::RingBuffer;
pub use sink::{AudioSink, FrameAssembler, WavFileSink};
pub use source::{HeaderedPcmSource, PcmSource};

#[cfg(feature = "cpal-backend")]
pub use cpal_sink::CpalSink;
