use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a live transcription session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier these numbers belong to
    pub session_id: String,

    /// Whether the stream is currently open
    pub connected: bool,

    /// When the current connection attempt started, if there was one
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since the connection attempt started
    pub duration_secs: f64,

    /// Audio chunks forwarded to the service
    pub chunks_forwarded: usize,

    /// Transcript events applied to the transcript
    pub events_processed: usize,

    /// Final fragments committed
    pub finals_committed: usize,

    /// Keepalive frames sent
    pub keepalives_sent: usize,
}
