//! Microphone capture lifecycle.
//!
//! [`CaptureSource`] owns the device for one capture at a time: `start()`
//! yields a stream of non-empty audio chunks on a fixed cadence, `stop()`
//! releases every device resource and can be called at any time, any
//! number of times. Runtime device faults land in an error slot instead
//! of breaking the chunk pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DeviceError;

use super::device::{AudioChunk, CaptureConstraints, CaptureDevice, CaptureTrack, DeviceEvent};

/// Cadence at which captured audio is sliced into chunks
pub const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Chunks buffered toward the consumer before the relay blocks
const CHUNK_CHANNEL_CAPACITY: usize = 32;

/// Device events buffered between the device and the relay
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Owns the microphone for one capture at a time.
pub struct CaptureSource {
    /// The capture capability behind the source
    device: Box<dyn CaptureDevice>,

    /// Constraints applied at acquisition
    constraints: CaptureConstraints,

    /// Whether device access has been granted
    acquired: bool,

    /// Live resources backing the active capture
    tracks: Vec<Box<dyn CaptureTrack>>,

    /// Whether capture is currently active
    recording: Arc<AtomicBool>,

    /// Latest capture-side error or warning
    last_error: Arc<RwLock<Option<DeviceError>>>,

    /// Relay between the device event feed and the consumer
    relay: Option<JoinHandle<()>>,
}

impl CaptureSource {
    /// Create a source over `device` with default constraints.
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self::with_constraints(device, CaptureConstraints::default())
    }

    pub fn with_constraints(device: Box<dyn CaptureDevice>, constraints: CaptureConstraints) -> Self {
        Self {
            device,
            constraints,
            acquired: false,
            tracks: Vec::new(),
            recording: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(RwLock::new(None)),
            relay: None,
        }
    }

    /// Request device access without starting capture.
    ///
    /// `start()` acquires on its own; calling this first fronts the
    /// permission prompt so the user sees it before recording begins.
    pub async fn acquire(&mut self) -> Result<(), DeviceError> {
        if self.acquired {
            debug!("Capture device already acquired");
            return Ok(());
        }

        match self.device.acquire(&self.constraints).await {
            Ok(()) => {
                self.acquired = true;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to acquire capture device: {}", e);
                self.set_error(e.clone());
                Err(e)
            }
        }
    }

    /// Begin capturing, returning the chunk feed.
    ///
    /// Acquires the device first when needed. Zero-length slices are
    /// dropped here so consumers only ever see chunks with audio in them.
    /// Fails with [`DeviceError::Busy`] while a capture is already active.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<AudioChunk>, DeviceError> {
        if self.recording.load(Ordering::SeqCst) {
            warn!("Capture already active");
            return Err(DeviceError::Busy);
        }

        self.acquire().await?;

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

        let tracks = match self.device.start(CHUNK_INTERVAL, event_tx).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Failed to start capture: {}", e);
                self.set_error(e.clone());
                return Err(e);
            }
        };
        self.tracks = tracks;

        info!(
            "Capture started on {} ({} tracks)",
            self.device.name(),
            self.tracks.len(),
        );

        // Mark as recording
        self.recording.store(true, Ordering::SeqCst);

        let recording = Arc::clone(&self.recording);
        let last_error = Arc::clone(&self.last_error);
        let relay = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if !recording.load(Ordering::SeqCst) {
                    break;
                }

                match event {
                    DeviceEvent::Chunk(chunk) => {
                        if chunk.is_empty() {
                            debug!("Dropping empty capture slice");
                            continue;
                        }
                        if chunk_tx.send(chunk).await.is_err() {
                            debug!("Chunk consumer gone; stopping relay");
                            break;
                        }
                    }
                    DeviceEvent::Fault(fault) => {
                        // Faults are reported, not fatal; the device decides
                        // whether chunks keep flowing.
                        warn!("Capture fault: {}", fault);
                        if let Ok(mut slot) = last_error.write() {
                            *slot = Some(fault);
                        }
                    }
                }
            }
            debug!("Capture relay finished");
        });
        self.relay = Some(relay);

        Ok(chunk_rx)
    }

    /// Stop capturing and release every device resource.
    ///
    /// Idempotent; a source that never started returns without touching
    /// the device. Each track is released even when an earlier release
    /// fails, and the recording flag is forced off no matter what. A
    /// failed release is remembered as a warning, not an error.
    pub fn stop(&mut self) {
        if !self.recording.load(Ordering::SeqCst) && self.tracks.is_empty() && self.relay.is_none()
        {
            debug!("Capture not active; nothing to stop");
            return;
        }

        info!("Stopping capture");

        // Mark as stopped before teardown so nothing is delivered after
        // this call returns
        self.recording.store(false, Ordering::SeqCst);

        if let Some(relay) = self.relay.take() {
            relay.abort();
        }

        let mut failed_releases = 0usize;
        for track in self.tracks.drain(..) {
            let label = track.label().to_string();
            match track.release() {
                Ok(()) => debug!("Released {}", label),
                Err(e) => {
                    warn!("Failed to release {}: {}", label, e);
                    failed_releases += 1;
                }
            }
        }

        if failed_releases > 0 {
            self.set_error(DeviceError::stop_failure());
        }
    }

    /// Whether capture is currently active.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Whether device access has been granted.
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Latest capture-side error or warning, if any.
    pub fn last_error(&self) -> Option<DeviceError> {
        self.last_error.read().ok().and_then(|slot| (*slot).clone())
    }

    /// Clear the error slot.
    pub fn clear_error(&self) {
        if let Ok(mut slot) = self.last_error.write() {
            *slot = None;
        }
    }

    /// Constraints this source acquires with.
    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }

    fn set_error(&self, error: DeviceError) {
        if let Ok(mut slot) = self.last_error.write() {
            *slot = Some(error);
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}
