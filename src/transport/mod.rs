//! Wire transport to the live transcription service.
//!
//! This module handles:
//! - The transport capability trait and its event/frame types
//! - JSON control/result message shapes for the live endpoint
//! - The WebSocket implementation used in production

pub mod connection;
pub mod messages;
pub mod ws;

pub use connection::{
    OutboundFrame, ReadyFlag, Transport, TransportEvent, ABNORMAL_CLOSE_CODE, NORMAL_CLOSE_CODE,
    NO_STATUS_CLOSE_CODE,
};
pub use messages::{Alternative, Channel, ControlMessage, TranscriptEvent};
pub use ws::WsTransport;
