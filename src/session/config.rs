use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Keepalive period while the stream is open
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Conventional upper bound for waiting on the open acknowledgment
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(8);

/// Configuration for a live transcription session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "live-84f1c2...")
    pub session_id: String,

    /// Credential for the live endpoint; must be non-empty to connect
    pub api_key: String,

    /// Endpoint base URL (wss://...)
    pub endpoint: String,

    /// Speech model requested from the service
    pub model: String,

    /// Spoken language hint
    pub language: String,

    /// Server-side punctuation and formatting
    pub smart_format: bool,

    /// Deliver provisional fragments while an utterance is still in flight
    pub interim_results: bool,

    /// Server-side silence threshold (ms) before an utterance is finalized
    pub endpointing_ms: u32,

    /// Audio encoding on the wire; fixed for the whole session
    pub encoding: String,

    /// Sample rate of the audio on the wire (capture runs at the same rate)
    pub sample_rate: u32,

    /// How often to ping the service while the stream is open
    pub keepalive_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("live-{}", uuid::Uuid::new_v4()),
            api_key: String::new(),
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            smart_format: true,
            interim_results: true,
            endpointing_ms: 200,
            encoding: "linear16".to_string(),
            sample_rate: 16000, // matches the capture constraints
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }
}

impl SessionConfig {
    /// Full endpoint URL with the stream options in the query string.
    /// The credential is never part of the URL; it travels in a header.
    pub fn stream_url(&self) -> String {
        format!(
            "{}?model={}&language={}&smart_format={}&interim_results={}&endpointing={}&encoding={}&sample_rate={}",
            self.endpoint,
            self.model,
            self.language,
            self.smart_format,
            self.interim_results,
            self.endpointing_ms,
            self.encoding,
            self.sample_rate,
        )
    }
}
