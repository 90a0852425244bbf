//! Speaker playback.
//!
//! The output device callback runs on its own OS thread and drains the
//! shared playback queue, so the queue is handed over behind a mutex at
//! start. Underruns are filled with silence rather than blocking the device
//! (the conversation simply goes quiet until frames arrive).

use crate::defaults;
use crate::error::{Result, VoxlinkError};
use crate::session::playback::PlaybackQueue;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Trait for audio playback devices.
pub trait AudioSink: Send {
    /// Begin pulling frames from `queue` and playing them.
    fn start(&mut self, queue: Arc<Mutex<PlaybackQueue>>) -> Result<()>;

    /// Stop playback and release the device.
    fn stop(&mut self) -> Result<()>;
}

/// See `SendableStream` in the capture module; same single-access argument.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real speaker output via CPAL at 24kHz mono.
pub struct CpalAudioSink {
    device: cpal::Device,
    stream: Option<SendableStream>,
}

impl CpalAudioSink {
    /// Opens the default output device.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device =
            host.default_output_device()
                .ok_or_else(|| VoxlinkError::AudioDeviceNotFound {
                    device: "default output".to_string(),
                })?;
        Ok(Self {
            device,
            stream: None,
        })
    }
}

impl AudioSink for CpalAudioSink {
    fn start(&mut self, queue: Arc<Mutex<PlaybackQueue>>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(()); // Already started
        }

        let config = cpal::StreamConfig {
            channels: defaults::CHANNELS,
            sample_rate: defaults::SAMPLE_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        // Tail of the last dequeued frame when the callback buffer size
        // doesn't line up with FRAME_SAMPLES.
        let mut leftover: Vec<i16> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |out: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut filled = 0;
                    while filled < out.len() {
                        if leftover.is_empty() {
                            let frame = queue.lock().ok().and_then(|mut q| q.dequeue());
                            match frame {
                                Some(frame) => leftover = frame.samples(),
                                None => {
                                    // Underrun: go quiet until data arrives
                                    out[filled..].fill(0);
                                    return;
                                }
                            }
                        }
                        let take = leftover.len().min(out.len() - filled);
                        out[filled..filled + take].copy_from_slice(&leftover[..take]);
                        leftover.drain(..take);
                        filled += take;
                    }
                },
                |err| {
                    tracing::error!("audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| VoxlinkError::AudioPlayback {
                message: format!("failed to build output stream: {}", e),
            })?;

        stream.play().map_err(|e| VoxlinkError::AudioPlayback {
            message: format!("failed to start playback: {}", e),
        })?;

        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.0.pause().map_err(|e| VoxlinkError::AudioPlayback {
                message: format!("failed to stop playback: {}", e),
            })?;
        }
        Ok(())
    }
}

/// Shared observation point for [`MockAudioSink`] calls.
#[derive(Debug, Default)]
pub struct SinkProbe {
    pub starts: AtomicU32,
    pub stops: AtomicU32,
    queue: Mutex<Option<Arc<Mutex<PlaybackQueue>>>>,
}

impl SinkProbe {
    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    /// The queue handed over at start, for inspecting playback contents.
    pub fn queue(&self) -> Option<Arc<Mutex<PlaybackQueue>>> {
        self.queue.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Mock playback sink for testing. Consumes nothing; frames stay in the
/// queue where tests can inspect them through the probe.
#[derive(Debug, Default)]
pub struct MockAudioSink {
    probe: Arc<SinkProbe>,
}

impl MockAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> Arc<SinkProbe> {
        self.probe.clone()
    }
}

impl AudioSink for MockAudioSink {
    fn start(&mut self, queue: Arc<Mutex<PlaybackQueue>>) -> Result<()> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.probe.queue.lock() {
            *guard = Some(queue);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
