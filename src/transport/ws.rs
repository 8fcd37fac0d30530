use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::TransportError;

use super::connection::{
    OutboundFrame, ReadyFlag, Transport, TransportEvent, ABNORMAL_CLOSE_CODE, NO_STATUS_CLOSE_CODE,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, tungstenite::Message>;

/// Inbound events buffered between the socket reader and the session.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// WebSocket transport to the live transcription endpoint.
///
/// Owns the write half of the socket; a spawned reader task turns the read
/// half into [`TransportEvent`]s and keeps the [`ReadyFlag`] honest.
pub struct WsTransport {
    url: String,
    api_key: String,
    sink: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
    ready: ReadyFlag,
}

impl WsTransport {
    /// `url` is the fully assembled endpoint URL including query options;
    /// the credential travels in the `Authorization` header, never the URL.
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            url,
            api_key,
            sink: None,
            reader: None,
            ready: ReadyFlag::new(),
        }
    }

    fn build_request(&self) -> Result<tungstenite::http::Request<()>, TransportError> {
        let mut request =
            self.url
                .as_str()
                .into_client_request()
                .map_err(|e| TransportError::Connect {
                    message: format!("invalid endpoint URL: {}", e),
                })?;

        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key)).map_err(|e| {
            TransportError::Connect {
                message: format!("credential is not a valid header value: {}", e),
            }
        })?;
        request.headers_mut().insert("Authorization", auth);

        Ok(request)
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let request = self.build_request()?;

        info!("Connecting to live transcription endpoint");
        debug!("Endpoint URL: {}", self.url);

        let (stream, response) = connect_async(request).await.map_err(map_handshake_error)?;

        debug!("WebSocket handshake completed (HTTP {})", response.status());

        let (sink, mut read) = stream.split();
        self.sink = Some(sink);
        self.ready.set(true);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let ready = self.ready.clone();

        let reader = tokio::spawn(async move {
            let mut saw_close_frame = false;

            while let Some(message) = read.next().await {
                match message {
                    Ok(tungstenite::Message::Text(text)) => {
                        if event_tx
                            .send(TransportEvent::Message(text.to_string()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(tungstenite::Message::Close(frame)) => {
                        let (code, reason) = close_details(frame);
                        info!("WebSocket closed by remote (code {})", code);
                        ready.set(false);
                        let _ = event_tx.send(TransportEvent::Closed { code, reason }).await;
                        saw_close_frame = true;
                        break;
                    }
                    // Binary/ping/pong from the service: nothing to forward.
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket read error: {}", e);
                        let _ = event_tx
                            .send(TransportEvent::Error(TransportError::Connect {
                                message: e.to_string(),
                            }))
                            .await;
                        break;
                    }
                }
            }

            ready.set(false);
            if !saw_close_frame {
                // Stream ended without a close frame: report it as the
                // WebSocket abnormal-closure code.
                let _ = event_tx
                    .send(TransportEvent::Closed {
                        code: ABNORMAL_CLOSE_CODE,
                        reason: "connection lost".to_string(),
                    })
                    .await;
            }
        });
        self.reader = Some(reader);

        Ok(event_rx)
    }

    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        let sink = self.sink.as_mut().ok_or(TransportError::NotConnected)?;

        let message = match frame {
            OutboundFrame::Audio(bytes) => tungstenite::Message::Binary(bytes.into()),
            OutboundFrame::Control(control) => {
                let json =
                    serde_json::to_string(&control).map_err(|e| TransportError::Send {
                        message: format!("failed to encode control frame: {}", e),
                    })?;
                tungstenite::Message::Text(json.into())
            }
        };

        let ready = self.ready.clone();
        sink.send(message).await.map_err(move |e| {
            ready.set(false);
            TransportError::Send {
                message: e.to_string(),
            }
        })
    }

    fn readiness(&self) -> ReadyFlag {
        self.ready.clone()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.ready.set(false);

        if let Some(mut sink) = self.sink.take() {
            debug!("Closing WebSocket");
            let _ = sink.close().await;
        }

        // The reader drains the server's close handshake on its own; the
        // handle is dropped, not aborted, so the final events still arrive.
        self.reader.take();

        Ok(())
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

fn map_handshake_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) => TransportError::Rejected {
            status: response.status().as_u16(),
        },
        other => TransportError::Connect {
            message: other.to_string(),
        },
    }
}

/// Extract the close code and reason the session will see.
///
/// A close frame with no status is reported as 1005, never as a normal
/// closure; only an explicit 1000 counts as expected.
fn close_details(frame: Option<CloseFrame>) -> (u16, String) {
    match frame {
        Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
        None => (NO_STATUS_CLOSE_CODE, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use crate::transport::connection::NORMAL_CLOSE_CODE;

    #[test]
    fn close_with_status_keeps_code_and_reason() {
        let (code, reason) = close_details(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "stream finished".into(),
        }));
        assert_eq!(code, NORMAL_CLOSE_CODE);
        assert_eq!(reason, "stream finished");

        let (code, _) = close_details(Some(CloseFrame {
            code: CloseCode::from(4000),
            reason: "".into(),
        }));
        assert_eq!(code, 4000);
    }

    #[test]
    fn close_without_status_is_not_a_normal_closure() {
        let (code, reason) = close_details(None);
        assert_eq!(code, NO_STATUS_CLOSE_CODE);
        assert_ne!(code, NORMAL_CLOSE_CODE);
        assert!(reason.is_empty());
    }
}
