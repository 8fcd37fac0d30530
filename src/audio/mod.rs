pub mod capture;
pub mod device;
pub mod mic;

pub use capture::{CaptureSource, CHUNK_INTERVAL};
pub use device::{AudioChunk, CaptureConstraints, CaptureDevice, CaptureTrack, DeviceEvent};
pub use mic::MicrophoneDevice;
