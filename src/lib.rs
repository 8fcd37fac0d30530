pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use audio::{
    AudioChunk, CaptureConstraints, CaptureDevice, CaptureSource, CaptureTrack, DeviceEvent,
    MicrophoneDevice, CHUNK_INTERVAL,
};
pub use config::Config;
pub use error::{DeviceError, SessionError, TransportError};
pub use session::{
    ConnectionState, SessionConfig, SessionStats, TranscriptBuffer, TranscriptionSession,
    DEFAULT_OPEN_TIMEOUT, KEEPALIVE_INTERVAL,
};
pub use transport::{
    ControlMessage, OutboundFrame, ReadyFlag, TranscriptEvent, Transport, TransportEvent,
    WsTransport,
};
