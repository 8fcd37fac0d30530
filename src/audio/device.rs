use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::DeviceError;

/// Constraints requested when acquiring the microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Ask the device stack to cancel far-end echo
    pub echo_cancellation: bool,

    /// Ask the device stack to suppress steady background noise
    pub noise_suppression: bool,

    /// Capture sample rate in Hz
    pub sample_rate: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: 16000, // what the speech service expects
        }
    }
}

/// An opaque, immutable slice of encoded audio captured from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    data: Vec<u8>,
}

impl AudioChunk {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Encoded byte length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// What a capture device pushes while active
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// One slice of encoded audio (may be empty when the device had
    /// nothing for the interval)
    Chunk(AudioChunk),
    /// A runtime fault; capture may or may not continue
    Fault(DeviceError),
}

/// One resource held while capturing (a hardware stream, a chunk timer).
///
/// Tracks are released individually so a failing release cannot pin the
/// remaining resources.
pub trait CaptureTrack: Send {
    /// Label for logging
    fn label(&self) -> &str;

    /// Release the resource. Failing is allowed; the caller keeps going.
    fn release(self: Box<Self>) -> Result<(), DeviceError>;
}

/// Microphone capture capability
///
/// Implementations deliver one event per chunk interval into the supplied
/// channel until their tracks are released.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Request device access under `constraints`. `start` acquires on its
    /// own when needed; calling this first fronts the permission prompt.
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<(), DeviceError>;

    /// Begin capturing, emitting a [`DeviceEvent`] roughly every `interval`
    /// into `events`. Returns the live tracks backing the capture.
    async fn start(
        &mut self,
        interval: Duration,
        events: mpsc::Sender<DeviceEvent>,
    ) -> Result<Vec<Box<dyn CaptureTrack>>, DeviceError>;

    /// Device name for logging
    fn name(&self) -> &str;
}
