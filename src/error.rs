//! Error types for the capture and transcription pipeline.
//!
//! Every variant carries a ready-to-display message; callers branch on the
//! variant itself for programmatic handling.

use thiserror::Error;

/// Failures from the microphone capture side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The user (or OS policy) denied microphone access.
    #[error("Microphone access denied. Please allow microphone access and try again.")]
    PermissionDenied,

    /// No input device is present.
    #[error("No microphone found. Please connect a microphone and try again.")]
    NotFound,

    /// The device exists but cannot be opened right now.
    #[error("Microphone is already in use by another application.")]
    Busy,

    /// The device cannot satisfy the requested constraints (rate/channels).
    #[error("Microphone does not support the required audio settings.")]
    UnsupportedConstraints,

    /// The device offers no sample format we can encode.
    #[error("Audio capture format not supported by this device.")]
    UnsupportedFormat,

    /// Anything else the audio backend reports.
    #[error("Recording error: {message}")]
    Other { message: String },
}

impl DeviceError {
    /// Warning used when releasing capture resources partially fails.
    /// Recording is still forced off; this is informational.
    pub fn stop_failure() -> Self {
        DeviceError::Other {
            message: "failed to stop cleanly. Please reload if issues persist.".to_string(),
        }
    }
}

/// Low-level faults from the wire transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The service refused the handshake outright.
    #[error("connection rejected by the service (HTTP {status})")]
    Rejected { status: u16 },

    /// The connection could not be established.
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// An established connection refused a frame.
    #[error("send failed: {message}")]
    Send { message: String },

    /// Operation on a transport that is not open.
    #[error("transport is not connected")]
    NotConnected,
}

/// Failures surfaced by a transcription session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The service rejected the credential.
    #[error("Invalid API key. Please check your credentials.")]
    Unauthorized,

    /// Quota exhausted or too many concurrent streams.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    /// Timeout or connectivity problem reaching the service.
    #[error("Network error. Please check your connection.")]
    Network,

    /// `connect()` was called without a credential configured.
    #[error("API key is missing")]
    MissingCredential,

    /// The remote closed the stream with an abnormal close code.
    #[error("Connection closed unexpectedly (code {code}). Please try reconnecting.")]
    UnexpectedClose { code: u16 },

    /// A chunk could not be turned into a transmissible frame.
    #[error("Failed to process audio data")]
    Processing,

    /// Service-reported error that fits no other bucket.
    #[error("Transcription error: {message}")]
    Unknown { message: String },

    /// Capture-side failure surfaced through the session's error slot.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl SessionError {
    /// Classify a service/transport error message into a taxonomy bucket.
    ///
    /// The live endpoint reports most failures as free-form text, so this
    /// inspects the code/message content the way its status strings are
    /// commonly written ("401 Unauthorized", "rate limit exceeded", ...).
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if message.contains("401") || message.contains("403") || lower.contains("unauthorized") {
            SessionError::Unauthorized
        } else if message.contains("429") || lower.contains("rate limit") {
            SessionError::RateLimited
        } else if lower.contains("network") || lower.contains("timeout") || lower.contains("timed out") {
            SessionError::Network
        } else {
            SessionError::Unknown {
                message: message.to_string(),
            }
        }
    }

    /// Map a typed transport fault into a taxonomy bucket.
    pub fn from_transport(err: &TransportError) -> Self {
        match err {
            TransportError::Rejected { status } => match status {
                401 | 403 => SessionError::Unauthorized,
                429 => SessionError::RateLimited,
                _ => SessionError::Unknown {
                    message: err.to_string(),
                },
            },
            TransportError::Connect { message } | TransportError::Send { message } => {
                Self::classify(message)
            }
            TransportError::NotConnected => SessionError::Network,
        }
    }
}
