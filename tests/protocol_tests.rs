// Tests for the wire protocol shapes
//
// These pin the JSON the service actually speaks: outbound control
// frames, inbound transcript events, and the classification of
// service-reported errors.

use anyhow::Result;
use streamscribe::transport::{ControlMessage, TranscriptEvent};
use streamscribe::{SessionError, TransportError};

#[test]
fn test_keepalive_serializes_to_tagged_json() -> Result<()> {
    let json = serde_json::to_string(&ControlMessage::KeepAlive)?;
    assert_eq!(json, r#"{"type":"KeepAlive"}"#);
    Ok(())
}

#[test]
fn test_close_stream_serializes_to_tagged_json() -> Result<()> {
    let json = serde_json::to_string(&ControlMessage::CloseStream)?;
    assert_eq!(json, r#"{"type":"CloseStream"}"#);
    Ok(())
}

#[test]
fn test_transcript_event_parses_service_shape() -> Result<()> {
    let payload = r#"{
        "channel": {
            "alternatives": [
                { "transcript": "hello world", "confidence": 0.98 }
            ]
        },
        "is_final": true,
        "duration": 1.5,
        "start": 0.0
    }"#;

    let event: TranscriptEvent = serde_json::from_str(payload)?;
    assert_eq!(event.transcript(), Some("hello world"));
    assert!(event.is_final);
    Ok(())
}

#[test]
fn test_transcript_event_defaults_when_fields_missing() -> Result<()> {
    // Housekeeping messages (metadata and friends) share the channel but
    // not the shape; they must parse into an empty event, not fail
    let event: TranscriptEvent = serde_json::from_str(r#"{"type":"Metadata"}"#)?;
    assert_eq!(event.transcript(), None);
    assert!(!event.is_final);

    let event: TranscriptEvent =
        serde_json::from_str(r#"{"channel":{"alternatives":[{}]},"is_final":false}"#)?;
    assert_eq!(event.transcript(), Some(""));
    Ok(())
}

#[test]
fn test_transcript_event_uses_first_alternative() -> Result<()> {
    let payload = r#"{
        "channel": {
            "alternatives": [
                { "transcript": "best guess" },
                { "transcript": "worse guess" }
            ]
        },
        "is_final": false
    }"#;

    let event: TranscriptEvent = serde_json::from_str(payload)?;
    assert_eq!(event.transcript(), Some("best guess"));
    Ok(())
}

#[test]
fn test_error_classification_by_message_content() {
    assert_eq!(
        SessionError::classify("401 Unauthorized"),
        SessionError::Unauthorized
    );
    assert_eq!(
        SessionError::classify("invalid credentials: unauthorized"),
        SessionError::Unauthorized
    );
    assert_eq!(
        SessionError::classify("429 Too Many Requests"),
        SessionError::RateLimited
    );
    assert_eq!(
        SessionError::classify("rate limit exceeded"),
        SessionError::RateLimited
    );
    assert_eq!(
        SessionError::classify("network unreachable"),
        SessionError::Network
    );
    assert_eq!(
        SessionError::classify("handshake timed out"),
        SessionError::Network
    );
    assert_eq!(
        SessionError::classify("something else entirely"),
        SessionError::Unknown {
            message: "something else entirely".to_string()
        }
    );
}

#[test]
fn test_rejected_handshakes_map_by_status() {
    assert_eq!(
        SessionError::from_transport(&TransportError::Rejected { status: 401 }),
        SessionError::Unauthorized
    );
    assert_eq!(
        SessionError::from_transport(&TransportError::Rejected { status: 403 }),
        SessionError::Unauthorized
    );
    assert_eq!(
        SessionError::from_transport(&TransportError::Rejected { status: 429 }),
        SessionError::RateLimited
    );
    assert!(matches!(
        SessionError::from_transport(&TransportError::Rejected { status: 500 }),
        SessionError::Unknown { .. }
    ));
    assert_eq!(
        SessionError::from_transport(&TransportError::NotConnected),
        SessionError::Network
    );
}
