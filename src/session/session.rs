use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::audio::AudioChunk;
use crate::error::SessionError;
use crate::transport::{
    ControlMessage, OutboundFrame, ReadyFlag, TranscriptEvent, Transport, TransportEvent,
    WsTransport, ABNORMAL_CLOSE_CODE, NORMAL_CLOSE_CODE,
};

use super::config::SessionConfig;
use super::stats::SessionStats;
use super::transcript::TranscriptBuffer;

/// Connection lifecycle of a transcription session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress
    Disconnected,
    /// Connection requested; open acknowledgment not yet received
    Connecting,
    /// Stream is live
    Open,
    /// Graceful teardown requested
    Closing,
    /// The remote closed the stream; terminal for that connection
    Closed,
}

/// Outbound chunks buffered toward the driver. Anything beyond this is
/// dropped rather than queued; see `send_audio`.
const AUDIO_CHANNEL_CAPACITY: usize = 8;

enum Command {
    Audio(AudioChunk),
    Finish,
}

/// Handle to the driver task of one connection attempt.
struct Connection {
    command_tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// State shared between the session handle and its driver tasks.
///
/// Every driver write passes a generation check while holding the lock it
/// writes under, so a superseded connection can never touch current state.
struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    display_tx: watch::Sender<String>,
    transcript: RwLock<TranscriptBuffer>,
    last_error: RwLock<Option<SessionError>>,
    readiness: RwLock<ReadyFlag>,
    generation: AtomicU64,
    started_at: RwLock<Option<DateTime<Utc>>>,
    chunks_forwarded: AtomicUsize,
    events_processed: AtomicUsize,
    finals_committed: AtomicUsize,
    keepalives_sent: AtomicUsize,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Transition the state machine on behalf of `generation`.
    /// Returns false if that connection has been superseded.
    fn set_state(&self, generation: u64, state: ConnectionState) -> bool {
        let mut applied = false;
        self.state_tx.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            applied = true;
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if !applied {
            debug!("Discarding state change from superseded connection: {:?}", state);
        }
        applied
    }

    /// Owner-side transition, not tied to any connection generation.
    fn force_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn set_error(&self, generation: u64, error: SessionError) {
        if let Ok(mut slot) = self.last_error.write() {
            if !self.is_current(generation) {
                debug!("Discarding error from superseded connection: {}", error);
                return;
            }
            warn!("Session error: {}", error);
            *slot = Some(error);
        }
    }

    /// Recompute the displayed transcript and notify watchers.
    fn publish_display(&self) {
        if let Ok(buffer) = self.transcript.read() {
            let display = buffer.display();
            self.display_tx.send_if_modified(|current| {
                if *current == display {
                    false
                } else {
                    *current = display;
                    true
                }
            });
        }
    }
}

/// A live transcription session.
///
/// Owns the connection to the speech service: opens it, keeps it alive with
/// a heartbeat, forwards captured audio, and folds interim/final results
/// into one growing transcript. One connection is live at a time; calling
/// `connect()` again supersedes the previous one and stale events from it
/// are discarded.
pub struct TranscriptionSession {
    /// Session configuration
    config: SessionConfig,

    /// State shared with driver tasks
    shared: Arc<Shared>,

    /// Driver of the active connection, if any
    connection: Mutex<Option<Connection>>,

    /// Builds a fresh transport for each connection attempt
    connector: Box<dyn Fn(&SessionConfig) -> Box<dyn Transport> + Send + Sync>,
}

impl TranscriptionSession {
    /// Create a session backed by the production WebSocket transport.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, |config: &SessionConfig| {
            Box::new(WsTransport::new(config.stream_url(), config.api_key.clone()))
                as Box<dyn Transport>
        })
    }

    /// Create a session with a custom transport source. The connector runs
    /// once per `connect()` call.
    pub fn with_connector<F>(config: SessionConfig, connector: F) -> Self
    where
        F: Fn(&SessionConfig) -> Box<dyn Transport> + Send + Sync + 'static,
    {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (display_tx, _) = watch::channel(String::new());

        info!("Created transcription session: {}", config.session_id);

        Self {
            config,
            shared: Arc::new(Shared {
                state_tx,
                display_tx,
                transcript: RwLock::new(TranscriptBuffer::new()),
                last_error: RwLock::new(None),
                readiness: RwLock::new(ReadyFlag::new()),
                generation: AtomicU64::new(0),
                started_at: RwLock::new(None),
                chunks_forwarded: AtomicUsize::new(0),
                events_processed: AtomicUsize::new(0),
                finals_committed: AtomicUsize::new(0),
                keepalives_sent: AtomicUsize::new(0),
            }),
            connection: Mutex::new(None),
            connector: Box::new(connector),
        }
    }

    /// Open the stream. Returns once the attempt is underway, before the
    /// remote acknowledges; callers that need the stream live must wait via
    /// `wait_until_open` or the state watch rather than assuming readiness.
    ///
    /// Fails fast without any connection attempt if no credential is
    /// configured.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.config.api_key.trim().is_empty() {
            warn!("Refusing to connect without an API key");
            return Err(SessionError::MissingCredential);
        }

        // Supersede whatever came before; its events are stale from here on.
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let previous = match self.connection.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(previous) = previous {
            debug!("Superseding existing connection");
            let _ = previous.command_tx.try_send(Command::Finish);
        }

        // Fresh attempt: stale error and half-spoken interim go away,
        // committed text survives.
        if let Ok(mut slot) = self.shared.last_error.write() {
            *slot = None;
        }
        if let Ok(mut buffer) = self.shared.transcript.write() {
            buffer.clear_interim();
        }
        self.shared.publish_display();
        if let Ok(mut started) = self.shared.started_at.write() {
            *started = Some(Utc::now());
        }
        self.shared.chunks_forwarded.store(0, Ordering::SeqCst);
        self.shared.events_processed.store(0, Ordering::SeqCst);
        self.shared.finals_committed.store(0, Ordering::SeqCst);
        self.shared.keepalives_sent.store(0, Ordering::SeqCst);

        let transport = (self.connector)(&self.config);
        if let Ok(mut slot) = self.shared.readiness.write() {
            *slot = transport.readiness();
        }

        info!("Opening transcription stream: {}", self.config.session_id);
        self.shared.set_state(generation, ConnectionState::Connecting);

        let (command_tx, command_rx) = mpsc::channel(AUDIO_CHANNEL_CAPACITY);
        let shared = Arc::clone(&self.shared);
        let keepalive_interval = self.config.keepalive_interval;
        let task = tokio::spawn(drive(
            transport,
            shared,
            generation,
            command_rx,
            keepalive_interval,
        ));

        if let Ok(mut guard) = self.connection.lock() {
            *guard = Some(Connection { command_tx, task });
        }

        Ok(())
    }

    /// Wait until the stream reports open, up to `timeout`.
    ///
    /// Resolves immediately when the stream is already ready. Fails with the
    /// classified connection error, or `Network` when nothing more specific
    /// is known (including on timeout).
    pub async fn wait_until_open(&self, timeout: Duration) -> Result<(), SessionError> {
        if self.is_ready() {
            return Ok(());
        }

        let mut state_rx = self.shared.state_tx.subscribe();
        let wait = async move {
            loop {
                let state = *state_rx.borrow_and_update();
                match state {
                    ConnectionState::Open => return Ok(()),
                    ConnectionState::Connecting | ConnectionState::Closing => {}
                    ConnectionState::Disconnected | ConnectionState::Closed => {
                        return Err(self.connect_failure());
                    }
                }
                if state_rx.changed().await.is_err() {
                    return Err(self.connect_failure());
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Timed out waiting for the stream to open");
                Err(self.connect_failure())
            }
        }
    }

    fn connect_failure(&self) -> SessionError {
        self.last_error().unwrap_or(SessionError::Network)
    }

    /// Forward one captured chunk to the service.
    ///
    /// Chunks arriving while the stream is not open and ready are dropped,
    /// silently and on purpose: there is no buffering and no retry, so a
    /// stalled connection never grows an unbounded queue. The same policy
    /// applies when the driver's small hand-off buffer is full.
    pub fn send_audio(&self, chunk: AudioChunk) {
        if !self.is_ready() {
            debug!("Dropping {} byte chunk; stream not open", chunk.len());
            return;
        }

        if let Ok(guard) = self.connection.lock() {
            if let Some(connection) = guard.as_ref() {
                if connection
                    .command_tx
                    .try_send(Command::Audio(chunk))
                    .is_err()
                {
                    debug!("Driver backlog full; dropping chunk");
                }
            }
        }
    }

    /// Tear down the connection.
    ///
    /// Unconditionally effective from the caller's point of view: the state
    /// is `Disconnected` when this returns even if the remote never
    /// acknowledges the close, and no further keepalive or transcript
    /// activity from the torn-down connection is observable. Safe to call
    /// at any time, including twice in a row or mid-connection-attempt.
    pub async fn disconnect(&self) {
        // Supersede first so anything still in flight is discarded as stale.
        let _ = self.shared.generation.fetch_add(1, Ordering::SeqCst);

        let connection = match self.connection.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };

        match connection {
            Some(connection) => {
                info!("Disconnecting transcription session");
                self.shared.force_state(ConnectionState::Closing);
                // Ask the driver to finish gracefully; dropping the sender
                // ends it even if the command never lands.
                let _ = connection.command_tx.try_send(Command::Finish);
                drop(connection.command_tx);
                drop(connection.task);
            }
            None => {
                debug!("Disconnect requested with no active connection");
            }
        }

        if let Ok(mut buffer) = self.shared.transcript.write() {
            buffer.clear_interim();
        }
        self.shared.publish_display();
        self.shared.force_state(ConnectionState::Disconnected);
    }

    /// Reset the accumulated transcript. Connection state is untouched.
    pub fn clear_transcript(&self) {
        if let Ok(mut buffer) = self.shared.transcript.write() {
            buffer.clear();
        }
        self.shared.publish_display();
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Whether the stream is open.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Cheap synchronous check: open and able to take frames right now.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Open
            && self
                .shared
                .readiness
                .read()
                .map(|flag| flag.is_ready())
                .unwrap_or(false)
    }

    /// The displayed transcript: committed text plus the current interim.
    pub fn transcript(&self) -> String {
        self.shared.display_tx.borrow().clone()
    }

    pub fn committed_transcript(&self) -> String {
        self.shared
            .transcript
            .read()
            .map(|buffer| buffer.committed().to_string())
            .unwrap_or_default()
    }

    pub fn interim_transcript(&self) -> String {
        self.shared
            .transcript
            .read()
            .map(|buffer| buffer.interim().to_string())
            .unwrap_or_default()
    }

    /// Most recent error, if any. One slot; the newest error wins.
    pub fn last_error(&self) -> Option<SessionError> {
        self.shared
            .last_error
            .read()
            .ok()
            .and_then(|slot| (*slot).clone())
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Watch displayed-transcript changes.
    pub fn subscribe_transcript(&self) -> watch::Receiver<String> {
        self.shared.display_tx.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current session statistics.
    pub fn get_stats(&self) -> SessionStats {
        let started_at = self.shared.started_at.read().ok().and_then(|slot| *slot);
        let duration_secs = started_at
            .map(|t| Utc::now().signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            session_id: self.config.session_id.clone(),
            connected: self.is_connected(),
            started_at,
            duration_secs,
            chunks_forwarded: self.shared.chunks_forwarded.load(Ordering::SeqCst),
            events_processed: self.shared.events_processed.load(Ordering::SeqCst),
            finals_committed: self.shared.finals_committed.load(Ordering::SeqCst),
            keepalives_sent: self.shared.keepalives_sent.load(Ordering::SeqCst),
        }
    }
}

/// Driver task for one connection attempt.
///
/// Opens the transport, then serializes everything on one select loop:
/// inbound transport events, outbound commands, and the keepalive timer.
/// Processing events on a single task is what guarantees arrival-order
/// handling and that a final fragment always supersedes earlier interims.
async fn drive(
    mut transport: Box<dyn Transport>,
    shared: Arc<Shared>,
    generation: u64,
    mut commands: mpsc::Receiver<Command>,
    keepalive_interval: Duration,
) {
    let ready = transport.readiness();

    let mut events = match transport.open().await {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to open transcription stream: {}", e);
            shared.set_error(generation, SessionError::from_transport(&e));
            shared.set_state(generation, ConnectionState::Closed);
            return;
        }
    };

    if !shared.set_state(generation, ConnectionState::Open) {
        // Superseded while the handshake was in flight; tear down quietly.
        let _ = transport.close().await;
        return;
    }
    info!("Transcription stream open");

    let mut keepalive = tokio::time::interval(keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick.
    keepalive.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(TransportEvent::Message(text)) => {
                        handle_message(&shared, generation, &text);
                    }
                    Some(TransportEvent::Error(e)) => {
                        // An error alone never changes connection state;
                        // only a close event does.
                        shared.set_error(generation, SessionError::from_transport(&e));
                    }
                    Some(TransportEvent::Closed { code, reason }) => {
                        handle_close(&shared, generation, code, &reason);
                        break;
                    }
                    None => {
                        handle_close(&shared, generation, ABNORMAL_CLOSE_CODE, "event stream ended");
                        break;
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(Command::Audio(chunk)) => {
                        if !ready.is_ready() {
                            debug!("Transport not ready; dropping {} byte chunk", chunk.len());
                            continue;
                        }
                        match transport.send(OutboundFrame::Audio(chunk.into_bytes())).await {
                            Ok(()) => {
                                shared.chunks_forwarded.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                warn!("Failed to forward audio chunk: {}", e);
                                shared.set_error(generation, SessionError::Processing);
                            }
                        }
                    }
                    Some(Command::Finish) | None => {
                        debug!("Finishing transcription stream");
                        let _ = transport
                            .send(OutboundFrame::Control(ControlMessage::CloseStream))
                            .await;
                        let _ = transport.close().await;
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                // Send only when the channel can take it right now; a tick
                // that finds the channel not ready is skipped outright,
                // never queued or retried. A superseded driver stays off
                // the wire entirely.
                if ready.is_ready() && shared.is_current(generation) {
                    match transport
                        .send(OutboundFrame::Control(ControlMessage::KeepAlive))
                        .await
                    {
                        Ok(()) => {
                            debug!("Keepalive sent");
                            shared.keepalives_sent.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => warn!("Keepalive failed: {}", e),
                    }
                } else {
                    debug!("Skipping keepalive; transport not ready");
                }
            }
        }
    }

    // The loop never resumes. A driver that is still the current one must
    // not leave `Open` behind against a finished transport; the guard keeps
    // superseded drivers away from state a newer connection owns.
    shared.set_state(generation, ConnectionState::Closed);
}

/// Apply one inbound service message to the transcript.
fn handle_message(shared: &Shared, generation: u64, text: &str) {
    let event: TranscriptEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!("Ignoring unparseable service message: {}", e);
            return;
        }
    };

    let fragment = match event.transcript() {
        Some(fragment) => fragment,
        None => return,
    };
    if fragment.trim().is_empty() {
        return;
    }

    if let Ok(mut buffer) = shared.transcript.write() {
        // Generation check under the same lock teardown uses, so a
        // superseded connection can never slip a fragment in.
        if !shared.is_current(generation) {
            debug!("Discarding transcript event from superseded connection");
            return;
        }

        shared.events_processed.fetch_add(1, Ordering::Relaxed);
        buffer.apply(fragment, event.is_final);
        if event.is_final {
            shared.finals_committed.fetch_add(1, Ordering::Relaxed);
            info!("Committed final fragment ({} chars)", fragment.len());
        } else {
            debug!("Interim fragment ({} chars)", fragment.len());
        }
    }
    shared.publish_display();
}

/// React to the remote closing the stream.
fn handle_close(shared: &Shared, generation: u64, code: u16, reason: &str) {
    if reason.is_empty() {
        info!("Transcription stream closed (code {})", code);
    } else {
        info!("Transcription stream closed (code {}): {}", code, reason);
    }

    if code != NORMAL_CLOSE_CODE {
        shared.set_error(generation, SessionError::UnexpectedClose { code });
    }

    if let Ok(mut buffer) = shared.transcript.write() {
        if shared.is_current(generation) {
            buffer.clear_interim();
        }
    }
    shared.publish_display();
    shared.set_state(generation, ConnectionState::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::error::TransportError;

    /// Transport whose event feed stays pending for as long as the test
    /// keeps the sender alive.
    struct IdleTransport {
        ready: ReadyFlag,
        event_tx: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    }

    #[async_trait]
    impl Transport for IdleTransport {
        async fn open(&mut self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
            let (tx, rx) = mpsc::channel(8);
            *self.event_tx.lock().unwrap() = Some(tx);
            self.ready.set(true);
            Ok(rx)
        }

        async fn send(&mut self, _frame: OutboundFrame) -> Result<(), TransportError> {
            Ok(())
        }

        fn readiness(&self) -> ReadyFlag {
            self.ready.clone()
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.ready.set(false);
            Ok(())
        }

        fn name(&self) -> &str {
            "idle"
        }
    }

    async fn wait_for_state(session: &TranscriptionSession, state: ConnectionState) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while session.state() != state {
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for {:?}, still {:?}",
                state,
                session.state()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn command_channel_loss_closes_the_session() {
        let feed: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>> = Arc::new(Mutex::new(None));
        let connector_feed = Arc::clone(&feed);
        let config = SessionConfig {
            api_key: "test-key".to_string(),
            ..SessionConfig::default()
        };
        let session = TranscriptionSession::with_connector(config, move |_| {
            Box::new(IdleTransport {
                ready: ReadyFlag::new(),
                event_tx: Arc::clone(&connector_feed),
            }) as Box<dyn Transport>
        });

        session.connect().await.unwrap();
        wait_for_state(&session, ConnectionState::Open).await;

        // Overlapping connect() calls can drop the live driver's command
        // handle while its generation is still current. The driver must
        // then close out the state itself instead of leaving it at Open
        // against a finished transport.
        let orphaned = session.connection.lock().unwrap().take();
        drop(orphaned);

        wait_for_state(&session, ConnectionState::Closed).await;
    }
}
