//! Session state machine for the assistant conversation.
//!
//! Top-level orchestrator: consumes connection events, decodes frames,
//! drives the stream buffer, and maintains the message store. All
//! mutation happens on the single event-consuming path — each event is
//! fully processed before the next is handled, so processing order
//! matches delivery order.
//!
//! # Architecture
//!
//! ```text
//! user input ──► Session ──► Frame::encode ──► Connection::send_text
//!
//! Connection events ──► handle_event()
//!     ├── Opened          auto-subscribe + system turn
//!     ├── Closed/Failed   discard in-flight stream + system turn
//!     └── FrameText       Frame::decode ──► apply_frame() dispatch
//!             ├── claude_stream       StreamBuffer::append
//!             ├── claude_stream_end   finalize ──► MessageStore
//!             ├── claude_response     MessageStore
//!             ├── error               system turn, cancel stream
//!             └── anything else       ignored
//! ```
//!
//! Failure semantics: decode errors and unrecognized frame types are
//! logged and swallowed; connection failures transition the machine but
//! never surface as errors to the caller.

// Rust guideline compliant 2026-02

use tokio::sync::mpsc;

use crate::connection::{Connection, ConnectionEvent, ConnectionEventKind, ConnectionState};
use crate::frame::{self, Frame};
use crate::store::{ConversationTurn, MessageStore, Role};
use crate::stream::StreamBuffer;

/// The session's current activity state, distinct from the physical
/// [`ConnectionState`]. Meaningful only while connected.
///
/// Invariant: `Streaming` if and only if a stream buffer is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// A user message was sent; no reply frames seen yet.
    AwaitingResponse,
    /// A streamed reply is being accumulated.
    Streaming,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AwaitingResponse => write!(f, "AwaitingResponse"),
            Self::Streaming => write!(f, "Streaming"),
        }
    }
}

/// The logical conversation spanning one or more connections.
///
/// One session per client instance; no internal parallelism. The UI
/// drives [`send_user_message`] and pumps [`next_event`] /
/// [`handle_event`] from a single loop.
///
/// [`send_user_message`]: Session::send_user_message
/// [`next_event`]: Session::next_event
/// [`handle_event`]: Session::handle_event
#[derive(Debug)]
pub struct Session {
    conn: Connection,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    store: MessageStore,
    buffer: StreamBuffer,
    phase: SessionPhase,
    channel: String,
    /// Generation whose terminal event was already noted, for dropping
    /// the duplicate a racing close can produce.
    noted_down: Option<u64>,
}

impl Session {
    /// Create a disconnected session subscribed to `channel` on open.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        let (conn, events) = Connection::new();
        Self {
            conn,
            events,
            store: MessageStore::new(),
            buffer: StreamBuffer::new(),
            phase: SessionPhase::Idle,
            channel: channel.into(),
            noted_down: None,
        }
    }

    /// Current session phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Current physical connection state (read-only view).
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Whether the connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Committed conversation turns, in finalization order.
    #[must_use]
    pub fn messages(&self) -> &[ConversationTurn] {
        self.store.snapshot()
    }

    /// In-flight streamed content, if a reply is being accumulated.
    #[must_use]
    pub fn streaming_preview(&self) -> Option<&str> {
        self.buffer.preview()
    }

    /// Empty the message log and drop any in-flight stream preview.
    /// Connection state is unaffected.
    pub fn clear_messages(&mut self) {
        self.store.clear();
        self.buffer.discard();
        self.phase = SessionPhase::Idle;
    }

    /// Connect to the bridge at `endpoint`.
    ///
    /// If already connected, the prior connection is logically closed
    /// first (in-flight stream discarded, disconnection noted) — never
    /// two live connections. Success and failure are reported through
    /// the event stream, not a return value.
    pub async fn connect(&mut self, endpoint: &str) {
        // Only a connection the user was told was up gets a teardown
        // notice; a handshake that never opened has nothing to note
        if self.conn.state() == ConnectionState::Connected {
            self.note_connection_down("Disconnected from Core");
        }
        self.noted_down = None;
        self.conn.connect(endpoint).await;
    }

    /// Close the connection. The resulting `Closed` event is handled on
    /// the next [`Session::handle_event`] pump.
    pub async fn disconnect(&mut self) {
        self.conn.disconnect().await;
    }

    /// Send a user message.
    ///
    /// No-op for empty/whitespace-only text or while not connected.
    /// Otherwise the user turn is appended immediately (optimistic local
    /// echo), a `claude_message` frame is transmitted, and the phase
    /// moves to `AwaitingResponse`.
    pub async fn send_user_message(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.conn.is_connected() {
            log::debug!("[session] dropping user message while not connected");
            return;
        }

        self.store.append(ConversationTurn::new(Role::User, text));
        self.transmit(&Frame::user_message(text)).await;
        self.phase = SessionPhase::AwaitingResponse;
    }

    /// Wait for the next connection event.
    ///
    /// Pends while no event is available; never resolves to `None` during
    /// the session's lifetime (the connection holds the sending half).
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }

    /// Process one connection event.
    ///
    /// Events from a connection that has since been replaced are dropped.
    pub async fn handle_event(&mut self, event: ConnectionEvent) {
        if !self.conn.is_current(event.generation) {
            log::debug!(
                "[session] dropping event from stale connection generation {}",
                event.generation
            );
            return;
        }

        match event.kind {
            ConnectionEventKind::Opened => {
                self.noted_down = None;
                self.buffer.discard();
                self.phase = SessionPhase::Idle;
                self.store
                    .append(ConversationTurn::new(Role::System, "Connected to Core"));
                // Register interest on the assistant channel
                self.transmit(&Frame::subscribe(&self.channel)).await;
            }
            ConnectionEventKind::Closed { code, reason } => {
                log::debug!("[session] connection closed: {code} {reason}");
                self.on_connection_down(event.generation, "Disconnected from Core");
            }
            ConnectionEventKind::Failed(error) => {
                self.on_connection_down(
                    event.generation,
                    &format!("Connection failed: {error}"),
                );
            }
            ConnectionEventKind::FrameText(text) => {
                // The reader task may have marked the connection down
                // before this frame was pumped. Frames delivered ahead of
                // the close still apply — processing order must match
                // delivery order — so only frames behind a noted teardown
                // for this generation are dropped.
                if self.noted_down == Some(event.generation) {
                    log::debug!("[session] dropping frame behind connection teardown");
                    return;
                }
                match Frame::decode(&text) {
                    Ok(frame) => self.apply_frame(&frame),
                    Err(e) => log::warn!("[session] dropping inbound frame: {e}"),
                }
            }
        }
    }

    /// Dispatch one decoded inbound frame.
    fn apply_frame(&mut self, frame: &Frame) {
        match frame.kind.as_str() {
            frame::TYPE_CLAUDE_STREAM => {
                self.buffer
                    .append(frame.data_text().as_deref().unwrap_or_default());
                self.phase = SessionPhase::Streaming;
            }
            frame::TYPE_CLAUDE_STREAM_END => {
                // Empty streams commit no turn
                if let Some(content) = self.buffer.finalize() {
                    self.store
                        .append(ConversationTurn::new(Role::Assistant, content));
                }
                self.phase = SessionPhase::Idle;
            }
            frame::TYPE_CLAUDE_RESPONSE => {
                if self.buffer.is_active() {
                    // Complete response arrived mid-stream: the partial
                    // content is superseded, never merged
                    log::warn!(
                        "[session] complete response during active stream; discarding partial"
                    );
                    self.buffer.discard();
                }
                if let Some(text) = frame.data_text() {
                    self.store
                        .append(ConversationTurn::new(Role::Assistant, text));
                }
                self.phase = SessionPhase::Idle;
            }
            frame::TYPE_ERROR => {
                let detail = frame
                    .data_text()
                    .unwrap_or_else(|| "unknown error".to_string());
                self.store.append(ConversationTurn::new(
                    Role::System,
                    format!("Error: {detail}"),
                ));
                self.buffer.discard();
                self.phase = SessionPhase::Idle;
            }
            other => {
                log::debug!("[session] ignoring unrecognized frame type: {other}");
            }
        }

        debug_assert_eq!(
            self.phase == SessionPhase::Streaming,
            self.buffer.is_active(),
            "phase is Streaming iff a stream buffer is active"
        );
    }

    /// Note a terminated connection: discard any in-flight stream without
    /// committing it and append a system turn. Duplicate terminal events
    /// for the same generation are dropped.
    fn on_connection_down(&mut self, generation: u64, notice: &str) {
        if self.noted_down == Some(generation) {
            log::debug!("[session] duplicate terminal event for generation {generation}");
            return;
        }
        self.noted_down = Some(generation);
        self.note_connection_down(notice);
    }

    fn note_connection_down(&mut self, notice: &str) {
        self.buffer.discard();
        self.phase = SessionPhase::Idle;
        self.store
            .append(ConversationTurn::new(Role::System, notice));
    }

    /// Encode and transmit a frame. Encode failures are logged, not
    /// surfaced; the send itself is dropped if the connection is gone.
    async fn transmit(&mut self, frame: &Frame) {
        match frame.encode() {
            Ok(wire) => self.conn.send_text(&wire).await,
            Err(e) => log::warn!("[session] failed to encode outbound frame: {e:#}"),
        }
    }
}
