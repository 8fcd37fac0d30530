use serde::{Deserialize, Serialize};

/// Control frame sent to the live endpoint as JSON text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Liveness ping; keeps the stream open through silence.
    KeepAlive,
    /// Ask the service to flush pending audio and finish the stream.
    CloseStream,
}

/// Transcript result received from the live endpoint
///
/// Unknown message shapes (metadata, housekeeping) deserialize to an empty
/// transcript and are dropped upstream like any other empty fragment.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptEvent {
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
}

impl TranscriptEvent {
    /// The best transcript fragment, if the message carried one.
    pub fn transcript(&self) -> Option<&str> {
        self.channel
            .alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
    }
}
