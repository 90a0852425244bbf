//! Microphone capture.
//!
//! The session engine reads from the [`AudioSource`] trait so real CPAL
//! capture and the test mock are interchangeable.

use crate::defaults;
use crate::error::{Result, VoxlinkError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Trait for audio capture devices.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Drain the samples captured since the last call.
    ///
    /// Non-blocking; returns an empty vector when nothing has arrived yet.
    fn read_samples(&mut self) -> Result<Vec<i16>>;
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only accessed under the Mutex in CpalAudioSource,
/// never concurrently from multiple threads.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real microphone capture via CPAL, fixed at 24kHz mono i16.
///
/// Tries the i16 format first, then f32 with software conversion — PipeWire
/// and PulseAudio both resample transparently, so a fixed-rate config works
/// across devices.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<i16>>>,
}

impl CpalAudioSource {
    /// Opens `device_name`, or the default input device when `None`.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let devices = host
                .input_devices()
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("failed to enumerate devices: {}", e),
                })?;

            let mut found = None;
            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    found = Some(dev);
                    break;
                }
            }
            found.ok_or_else(|| VoxlinkError::AudioDeviceNotFound {
                device: name.to_string(),
            })?
        } else {
            host.default_input_device()
                .ok_or_else(|| VoxlinkError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })?
        };

        Ok(Self {
            device,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: defaults::CHANNELS,
            sample_rate: defaults::SAMPLE_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::error!("audio input stream error: {}", err);
        };

        // Preferred: i16 at the wire format, no conversion
        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: f32 devices, convert in the callback
        let buffer = Arc::clone(&self.buffer);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| VoxlinkError::AudioCapture {
                message: format!("failed to build input stream: {}", e),
            })
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        {
            let guard = self.stream.lock().map_err(|e| VoxlinkError::AudioCapture {
                message: format!("failed to lock stream: {}", e),
            })?;
            if guard.is_some() {
                return Ok(()); // Already started
            }
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("failed to start audio stream: {}", e),
        })?;

        let mut guard = self.stream.lock().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("failed to lock stream: {}", e),
        })?;
        *guard = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut guard = self.stream.lock().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("failed to lock stream: {}", e),
        })?;

        if let Some(stream) = guard.take() {
            stream.0.pause().map_err(|e| VoxlinkError::AudioCapture {
                message: format!("failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut buffer = self.buffer.lock().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("failed to lock audio buffer: {}", e),
        })?;
        Ok(std::mem::take(&mut *buffer))
    }
}

/// Shared observation point for [`MockAudioSource`] calls.
#[derive(Debug, Default)]
pub struct SourceProbe {
    pub starts: AtomicU32,
    pub stops: AtomicU32,
}

impl SourceProbe {
    pub fn start_count(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Mock audio source for testing.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    samples: Vec<i16>,
    repeat: bool,
    exhausted: bool,
    should_fail_start: bool,
    probe: Arc<SourceProbe>,
}

impl MockAudioSource {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            repeat: false,
            exhausted: false,
            should_fail_start: false,
            probe: Arc::new(SourceProbe::default()),
        }
    }

    /// Configure the samples returned by `read_samples`. By default they are
    /// returned once; see [`Self::repeating`].
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.samples = samples;
        self
    }

    /// Return the configured samples on every read instead of once.
    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Handle for asserting start/stop call counts after the source has been
    /// consumed by a session.
    pub fn probe(&self) -> Arc<SourceProbe> {
        self.probe.clone()
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(VoxlinkError::AudioCapture {
                message: "mock start failure".to_string(),
            });
        }
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.exhausted {
            return Ok(Vec::new());
        }
        if !self.repeat {
            self.exhausted = true;
        }
        Ok(self.samples.clone())
    }
}
