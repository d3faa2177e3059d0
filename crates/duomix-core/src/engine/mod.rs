//! Mixing engine - gain/balance mixer and two-band crossover
//!
//! - AudioMixer: two mono sources into one interleaved stereo block
//! - TwoBandCrossover: bass/treble split feeding the tone stage

mod crossover;
mod mixer;

pub use crossover::*;
pub use mixer::*;
