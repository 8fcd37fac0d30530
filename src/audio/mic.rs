//! Microphone capture backed by CPAL (Cross-Platform Audio Library).
//!
//! Captures 16-bit PCM mono audio at the requested rate. Tries the
//! preferred format first (i16), then falls back to f32, then to the
//! device's native config with software conversion.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::DeviceError;

use super::device::{AudioChunk, CaptureConstraints, CaptureDevice, CaptureTrack, DeviceEvent};

/// Classify a backend failure message into the device error taxonomy.
///
/// CPAL surfaces most platform problems as backend-specific strings, so
/// classification works on the message text.
fn classify_capture_error(message: &str) -> DeviceError {
    let lower = message.to_lowercase();

    if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("not permitted")
        || lower.contains("not authorized")
    {
        DeviceError::PermissionDenied
    } else if lower.contains("busy") || lower.contains("in use") || lower.contains("exclusive") {
        DeviceError::Busy
    } else if lower.contains("no device")
        || lower.contains("not found")
        || lower.contains("disconnected")
        || lower.contains("not available")
        || lower.contains("no longer available")
        || lower.contains("unplugged")
    {
        DeviceError::NotFound
    } else if lower.contains("format") || lower.contains("sample type") {
        DeviceError::UnsupportedFormat
    } else if lower.contains("config") || lower.contains("not supported") {
        DeviceError::UnsupportedConstraints
    } else {
        DeviceError::Other {
            message: message.to_string(),
        }
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is owned by exactly one track and only touched from
/// that track's release call, so it never sees concurrent access.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Track holding the live hardware stream.
struct StreamTrack {
    stream: Option<SendableStream>,
}

impl CaptureTrack for StreamTrack {
    fn label(&self) -> &str {
        "input stream"
    }

    fn release(mut self: Box<Self>) -> Result<(), DeviceError> {
        if let Some(stream) = self.stream.take() {
            // The stream is freed when dropped even if pausing fails.
            stream
                .0
                .pause()
                .map_err(|e| classify_capture_error(&e.to_string()))?;
        }
        Ok(())
    }
}

/// Track holding the chunk timer task.
struct TickerTrack {
    ticker: JoinHandle<()>,
}

impl CaptureTrack for TickerTrack {
    fn label(&self) -> &str {
        "chunk timer"
    }

    fn release(self: Box<Self>) -> Result<(), DeviceError> {
        self.ticker.abort();
        Ok(())
    }
}

/// Build a stream error callback that forwards faults into the event feed.
///
/// Runs on the audio thread, so it must not block; a full channel just
/// drops the fault.
fn fault_forwarder(
    events: &mpsc::Sender<DeviceEvent>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    let events = events.clone();
    move |err| {
        warn!("Audio stream error: {}", err);
        let fault = classify_capture_error(&err.to_string());
        let _ = events.try_send(DeviceEvent::Fault(fault));
    }
}

/// The default system microphone, exposed as a [`CaptureDevice`].
pub struct MicrophoneDevice {
    /// Resolved hardware device, present after a successful acquire
    device: Option<cpal::Device>,

    /// Device name for logging
    device_name: String,

    /// Constraints recorded at acquisition
    constraints: CaptureConstraints,
}

impl MicrophoneDevice {
    pub fn new() -> Self {
        Self {
            device: None,
            device_name: "default input".to_string(),
            constraints: CaptureConstraints::default(),
        }
    }

    /// Build the audio stream with the configured format.
    ///
    /// Tries in order:
    /// 1. i16 mono at the requested rate (preferred, zero-copy path)
    /// 2. f32 mono at the requested rate (for devices that only expose floats)
    /// 3. Device default config, converting from native rate/channels in software
    fn build_stream(
        &self,
        buffer: Arc<Mutex<Vec<i16>>>,
        events: &mpsc::Sender<DeviceEvent>,
    ) -> Result<cpal::Stream, DeviceError> {
        let device = self.device.as_ref().ok_or(DeviceError::NotFound)?;

        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: self.constraints.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        // Try i16 mono first; PipeWire/PulseAudio convert transparently
        let chunk_buffer = Arc::clone(&buffer);
        if let Ok(stream) = device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = chunk_buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            fault_forwarder(events),
            None,
        ) {
            return Ok(stream);
        }

        // Try f32 mono for devices that only expose float formats
        let chunk_buffer = Arc::clone(&buffer);
        if let Ok(stream) = device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = chunk_buffer.lock() {
                    buf.extend(
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                    );
                }
            },
            fault_forwarder(events),
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: capture at the device's native config, convert in software
        self.build_stream_native(buffer, events)
    }

    /// Build a stream using the device's native config, with software channel
    /// mixing and resampling down to the requested rate.
    fn build_stream_native(
        &self,
        buffer: Arc<Mutex<Vec<i16>>>,
        events: &mpsc::Sender<DeviceEvent>,
    ) -> Result<cpal::Stream, DeviceError> {
        use cpal::SampleFormat;

        let device = self.device.as_ref().ok_or(DeviceError::NotFound)?;

        let default_config = device
            .default_input_config()
            .map_err(|e| classify_capture_error(&e.to_string()))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels() as usize;
        let target_rate = self.constraints.sample_rate;

        let stream_config: cpal::StreamConfig = default_config.clone().into();

        info!(
            "Using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        match default_config.sample_format() {
            SampleFormat::I16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let converted =
                            mix_to_mono_and_resample(data, native_channels, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    fault_forwarder(events),
                    None,
                )
                .map_err(|e| classify_capture_error(&e.to_string())),
            SampleFormat::F32 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let i16_data: Vec<i16> = data
                            .iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect();
                        let converted = mix_to_mono_and_resample(
                            &i16_data,
                            native_channels,
                            native_rate,
                            target_rate,
                        );
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    fault_forwarder(events),
                    None,
                )
                .map_err(|e| classify_capture_error(&e.to_string())),
            _ => Err(DeviceError::UnsupportedFormat),
        }
    }
}

impl Default for MicrophoneDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for MicrophoneDevice {
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<(), DeviceError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(DeviceError::NotFound)?;
        let name = device
            .name()
            .unwrap_or_else(|_| "unknown input".to_string());

        // A device that advertises no input configs at all cannot satisfy
        // any capture request.
        let mut configs = device
            .supported_input_configs()
            .map_err(|e| classify_capture_error(&e.to_string()))?;
        if configs.next().is_none() {
            warn!("Input device {} advertises no capture configs", name);
            return Err(DeviceError::UnsupportedConstraints);
        }

        // Echo cancellation and noise suppression live in the platform audio
        // stack (PipeWire filter chains, CoreAudio voice processing); we record
        // the request and the platform applies what it supports.
        info!(
            "Acquired input device: {} (echo_cancellation={}, noise_suppression={}, {}Hz)",
            name, constraints.echo_cancellation, constraints.noise_suppression, constraints.sample_rate,
        );

        self.device = Some(device);
        self.device_name = name;
        self.constraints = constraints.clone();
        Ok(())
    }

    async fn start(
        &mut self,
        interval: Duration,
        events: mpsc::Sender<DeviceEvent>,
    ) -> Result<Vec<Box<dyn CaptureTrack>>, DeviceError> {
        if self.device.is_none() {
            let constraints = self.constraints.clone();
            self.acquire(&constraints).await?;
        }

        let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));

        let stream = self.build_stream(Arc::clone(&buffer), &events)?;
        stream
            .play()
            .map_err(|e| classify_capture_error(&e.to_string()))?;

        info!(
            "Microphone capture started on {} ({}ms chunks)",
            self.device_name,
            interval.as_millis(),
        );

        // Drain the accumulation buffer on a fixed cadence, one chunk per
        // tick. Intervals with no samples still emit so delivery stays
        // regular; empty slices are filtered downstream.
        let ticker = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await; // first tick completes immediately

            loop {
                ticks.tick().await;

                let samples: Vec<i16> = match buffer.lock() {
                    Ok(mut buf) => buf.drain(..).collect(),
                    Err(_) => break,
                };

                let mut bytes = Vec::with_capacity(samples.len() * 2);
                for sample in samples {
                    bytes.extend_from_slice(&sample.to_le_bytes());
                }

                if events
                    .send(DeviceEvent::Chunk(AudioChunk::new(bytes)))
                    .await
                    .is_err()
                {
                    debug!("Capture event channel closed; stopping chunk timer");
                    break;
                }
            }
        });

        Ok(vec![
            Box::new(StreamTrack {
                stream: Some(SendableStream(stream)),
            }),
            Box::new(TickerTrack { ticker }),
        ])
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

/// Mix multi-channel audio to mono and resample to the target rate.
fn mix_to_mono_and_resample(
    samples: &[i16],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<i16> {
    // Mix to mono by averaging channels
    let mono: Vec<i16> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    if source_rate == target_rate {
        mono
    } else {
        resample(&mono, source_rate, target_rate)
    }
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_permission_denials() {
        assert_eq!(
            classify_capture_error("Access to the device was denied"),
            DeviceError::PermissionDenied
        );
        assert_eq!(
            classify_capture_error("operation not permitted"),
            DeviceError::PermissionDenied
        );
    }

    #[test]
    fn classify_recognizes_busy_devices() {
        assert_eq!(
            classify_capture_error("Device or resource busy"),
            DeviceError::Busy
        );
        assert_eq!(
            classify_capture_error("device already in use"),
            DeviceError::Busy
        );
    }

    #[test]
    fn classify_recognizes_missing_devices() {
        assert_eq!(
            classify_capture_error("the requested device is no longer available"),
            DeviceError::NotFound
        );
        // The exact text an unplug produces mid-session
        assert_eq!(
            classify_capture_error(
                "The requested device is no longer available. For example, it has been unplugged."
            ),
            DeviceError::NotFound
        );
        assert_eq!(
            classify_capture_error("input device disconnected"),
            DeviceError::NotFound
        );
    }

    #[test]
    fn classify_falls_back_to_other() {
        let err = classify_capture_error("something inexplicable");
        assert_eq!(
            err,
            DeviceError::Other {
                message: "something inexplicable".to_string()
            }
        );
    }

    #[test]
    fn mono_mixdown_averages_channels() {
        let stereo = [100i16, 300, -50, -150];
        let mono = mix_to_mono_and_resample(&stereo, 2, 16000, 16000);
        assert_eq!(mono, vec![200, -100]);
    }

    #[test]
    fn resample_identity_at_same_rate() {
        let samples = [1i16, 2, 3, 4];
        assert_eq!(resample(&samples, 16000, 16000), samples.to_vec());
    }

    #[test]
    fn resample_halves_sample_count_for_2x_downsample() {
        let samples: Vec<i16> = (0..100).collect();
        let out = resample(&samples, 32000, 16000);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn resample_handles_empty_input() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires audio hardware
    async fn acquire_default_device() {
        let mut device = MicrophoneDevice::new();
        let result = device.acquire(&CaptureConstraints::default()).await;
        assert!(result.is_ok(), "Failed to acquire default device");
        println!("Acquired: {}", device.name());
    }

    #[tokio::test]
    #[ignore] // Requires audio hardware
    async fn capture_delivers_chunks() {
        let mut device = MicrophoneDevice::new();
        device
            .acquire(&CaptureConstraints::default())
            .await
            .expect("acquire failed");

        let (tx, mut rx) = mpsc::channel(32);
        let tracks = device
            .start(Duration::from_millis(100), tx)
            .await
            .expect("start failed");

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no event within 2s");
        assert!(event.is_some(), "Event channel closed unexpectedly");

        for track in tracks {
            track.release().expect("release failed");
        }
    }
}
