//! System audio output via CPAL
//!
//! The consumer thread pushes frames into a lock-free SPSC queue (rtrb); the
//! device callback pops them and plays silence when the queue runs dry.
//!
//! `cpal::Stream` is not `Send` on every platform, so the stream is built and
//! owned by a small dedicated thread that parks until the sink is released.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam::channel::{self, Sender};

use super::error::SinkError;
use super::sink::{AudioSink, FrameAssembler};
use crate::types::StereoFrame;

/// Queue depth between the consumer thread and the device callback (frames)
const QUEUE_FRAMES: usize = 8192;

/// Longest one `write` waits for queue space before dropping the rest
const MAX_QUEUE_WAIT: Duration = Duration::from_millis(50);

/// Sleep between queue space checks
const QUEUE_POLL: Duration = Duration::from_micros(250);

pub struct CpalSink {
    producer: rtrb::Producer<StereoFrame>,
    assembler: FrameAssembler,
    shutdown: Option<Sender<()>>,
    stream_thread: Option<JoinHandle<()>>,
    dropped_frames: u64,
}

impl CpalSink {
    /// Open the default output device at `sample_rate`
    pub fn open(sample_rate: u32) -> Result<Self, SinkError> {
        let (producer, consumer) = rtrb::RingBuffer::<StereoFrame>::new(QUEUE_FRAMES);
        let (ready_tx, ready_rx) = channel::bounded::<Result<(), SinkError>>(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let stream_thread = thread::Builder::new()
            .name("duomix-cpal".into())
            .spawn(move || match build_stream(sample_rate, consumer) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Park until release (or the sink is dropped)
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| SinkError::Device(format!("Failed to spawn stream thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                producer,
                assembler: FrameAssembler::new(),
                shutdown: Some(shutdown_tx),
                stream_thread: Some(stream_thread),
                dropped_frames: 0,
            }),
            Ok(Err(e)) => {
                let _ = stream_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = stream_thread.join();
                Err(SinkError::Device("Stream thread exited during setup".into()))
            }
        }
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.shutdown.is_none() {
            return Err(SinkError::Closed);
        }
        let deadline = Instant::now() + MAX_QUEUE_WAIT;
        self.dropped_frames += enqueue(&mut self.producer, &mut self.assembler, bytes, deadline);
        Ok(())
    }

    fn release(&mut self) -> Result<(), SinkError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            if let Some(handle) = self.stream_thread.take() {
                let _ = handle.join();
            }
            log::info!(
                "CPAL sink released ({} frames dropped on full queue)",
                self.dropped_frames
            );
        }
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Push every whole frame of `bytes`, waiting for queue space until `deadline`
///
/// Once the deadline has passed, frames that do not fit are dropped without
/// waiting. Returns the number of dropped frames.
fn enqueue(
    producer: &mut rtrb::Producer<StereoFrame>,
    assembler: &mut FrameAssembler,
    bytes: &[u8],
    deadline: Instant,
) -> u64 {
    let mut dropped = 0;
    assembler.push(bytes, |frame| {
        let mut frame = frame;
        loop {
            match producer.push(frame) {
                Ok(()) => return,
                Err(rtrb::PushError::Full(rejected)) => {
                    if Instant::now() >= deadline {
                        dropped += 1;
                        return;
                    }
                    frame = rejected;
                    thread::sleep(QUEUE_POLL);
                }
            }
        }
    });
    dropped
}

fn build_stream(
    sample_rate: u32,
    mut consumer: rtrb::Consumer<StereoFrame>,
) -> Result<Stream, SinkError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| SinkError::Device("No default output device".into()))?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .supported_output_configs()
        .map_err(|e| SinkError::Device(e.to_string()))?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0)
        .ok_or_else(|| {
            SinkError::Device(format!(
                "{} has no f32 stereo config at {} Hz",
                device_name, sample_rate
            ))
        })?
        .with_sample_rate(cpal::SampleRate(sample_rate));

    let config: StreamConfig = supported.into();
    let channels = config.channels as usize;
    log::info!(
        "CPAL sink: {} ({} channels, {} Hz)",
        device_name,
        channels,
        sample_rate
    );

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = consumer.pop().unwrap_or_default();
                    frame[0] = sample.left as f32 / 32768.0;
                    frame[1] = sample.right as f32 / 32768.0;
                    for ch in frame.iter_mut().skip(2) {
                        *ch = 0.0;
                    }
                }
            },
            move |err| {
                log::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| SinkError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| SinkError::Device(e.to_string()))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stalled_queue_bounds_one_write() {
        let (mut producer, _consumer) = rtrb::RingBuffer::<StereoFrame>::new(2);
        let mut assembler = FrameAssembler::new();
        // 256 frames against a queue nobody drains
        let bytes = vec![0u8; 1024];

        let started = Instant::now();
        let dropped = enqueue(
            &mut producer,
            &mut assembler,
            &bytes,
            Instant::now() + Duration::from_millis(20),
        );

        assert_eq!(dropped, 254);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_enqueue_with_room_drops_nothing() {
        let (mut producer, mut consumer) = rtrb::RingBuffer::<StereoFrame>::new(8);
        let mut assembler = FrameAssembler::new();
        let bytes: Vec<u8> = [1i16, 2, 3, 4].iter().flat_map(|s| s.to_le_bytes()).collect();

        assert_eq!(enqueue(&mut producer, &mut assembler, &bytes, Instant::now()), 0);
        assert_eq!(consumer.pop().unwrap(), StereoFrame::new(1, 2));
        assert_eq!(consumer.pop().unwrap(), StereoFrame::new(3, 4));
    }
}
