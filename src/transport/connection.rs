use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

use super::messages::ControlMessage;

/// WebSocket close code for a normal, expected closure.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Close code reported when a close frame arrived without a status.
/// Not a normal closure; the session reports it as unexpected.
pub const NO_STATUS_CLOSE_CODE: u16 = 1005;

/// Close code reported when the connection drops without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Cheap, cloneable "can frames be sent right now" flag.
///
/// The transport flips this as the underlying channel comes and goes.
/// Everything else should only read it.
#[derive(Debug, Clone, Default)]
pub struct ReadyFlag(Arc<AtomicBool>);

impl ReadyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }
}

/// One outbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Opaque encoded audio, sent as a binary frame.
    Audio(Vec<u8>),
    /// JSON control frame.
    Control(ControlMessage),
}

/// Events delivered by an open transport, in arrival order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Inbound text payload (JSON from the service).
    Message(String),
    /// A fault on the connection. Does not by itself mean the connection
    /// closed; a `Closed` event follows if it did.
    Error(TransportError),
    /// The connection closed. `code` follows WebSocket close semantics
    /// (1000 = normal).
    Closed { code: u16, reason: String },
}

/// Bidirectional channel to the live transcription service.
///
/// Implementations own the socket. A single task drives each instance, so
/// methods take `&mut self`; cross-task readiness checks go through the
/// shared [`ReadyFlag`].
#[async_trait]
pub trait Transport: Send {
    /// Open the connection. Resolves once the remote acknowledged the
    /// stream, yielding the inbound event feed.
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Send one frame. Only valid after `open`.
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError>;

    /// Flag handle for synchronous readiness checks.
    fn readiness(&self) -> ReadyFlag;

    /// Gracefully close the connection. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Short human-readable name for logs.
    fn name(&self) -> &str;
}
