//! Duomix Core - two-source stereo mixer and DSP control plane

pub mod audio;
pub mod config;
pub mod control;
pub mod engine;
pub mod serial;
pub mod types;

mod sync;

pub use types::*;
