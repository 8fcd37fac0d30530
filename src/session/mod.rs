//! Live transcription session management
//!
//! This module provides the `TranscriptionSession` abstraction that manages:
//! - Connection lifecycle for the live speech-to-text stream
//! - Keepalive heartbeat while the stream is open
//! - Forwarding captured audio chunks to the service
//! - Folding interim/final fragments into one growing transcript
//! - Session statistics and error state

mod config;
mod session;
mod stats;
mod transcript;

pub use config::{SessionConfig, DEFAULT_OPEN_TIMEOUT, KEEPALIVE_INTERVAL};
pub use session::{ConnectionState, TranscriptionSession};
pub use stats::SessionStats;
pub use transcript::TranscriptBuffer;
