//! Connection manager for the Core bridge.
//!
//! Owns the physical WebSocket connection and exposes
//! connect/disconnect/send plus a single typed stream of lifecycle and
//! data events. One background reader task per live connection pushes
//! [`ConnectionEvent`]s into an unbounded channel; the session consumes
//! them in delivery order.
//!
//! # Architecture
//!
//! ```text
//! Connection
//!     ├── ws::connect() ──► (WsWriter, WsReader)
//!     ├── WsWriter          held for send_text()
//!     └── WsReader          owned by a spawned reader task
//!                           └── ConnectionEvent ──► mpsc ──► Session
//! ```
//!
//! Each `connect()` attempt bumps a generation counter carried on every
//! event, so events from a replaced connection are detectable after a
//! reconnect. There is no automatic reconnection, backoff, or send
//! queueing: a dropped connection stays `Disconnected` until an explicit
//! `connect()`, and sends while disconnected are dropped.

// Rust guideline compliant 2026-02

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Physical connection state. Owned by [`Connection`], observed read-only
/// by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected and ready.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// An event produced by the connection manager.
#[derive(Debug)]
pub struct ConnectionEvent {
    /// Which connection attempt produced this event.
    pub generation: u64,
    /// The event payload.
    pub kind: ConnectionEventKind,
}

/// Discriminant for connection events.
#[derive(Debug)]
pub enum ConnectionEventKind {
    /// Connection successfully established.
    Opened,
    /// Connection closed (by either side).
    Closed {
        /// WebSocket close code (1000 = normal).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
    /// Connection setup or transport error.
    Failed(String),
    /// A text frame was received.
    FrameText(String),
}

/// State shared between the connection handle and its reader task.
#[derive(Debug, Default)]
struct Shared {
    state: ConnectionState,
    generation: u64,
}

/// Owns the physical duplex connection to the Core bridge.
///
/// At most one live connection exists at a time: `connect()` while
/// connected closes the prior connection before opening the new one.
#[derive(Debug)]
pub struct Connection {
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    shared: Arc<Mutex<Shared>>,
    writer: Option<WsWriter>,
    reader_task: Option<JoinHandle<()>>,
}

impl Connection {
    /// Create a connection manager and the receiving end of its event
    /// stream.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let conn = Self {
            events_tx,
            shared: Arc::new(Mutex::new(Shared::default())),
            writer: None,
            reader_task: None,
        };
        (conn, events_rx)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().expect("connection state poisoned").state
    }

    /// Whether the connection is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether `generation` refers to the latest connection attempt.
    ///
    /// Used by the session to drop events queued by a connection that has
    /// since been replaced.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.shared
            .lock()
            .expect("connection state poisoned")
            .generation
            == generation
    }

    /// Establish a connection to `endpoint`.
    ///
    /// Any prior connection is closed first — connect is idempotent in
    /// effect and never leaves two live connections. Emits `Opened` on
    /// success or `Failed` on error; handshake failures are reported via
    /// the event stream, never returned synchronously.
    pub async fn connect(&mut self, endpoint: &str) {
        self.shutdown_transport().await;

        let generation = {
            let mut shared = self.shared.lock().expect("connection state poisoned");
            shared.generation += 1;
            shared.state = ConnectionState::Connecting;
            shared.generation
        };

        match ws::connect(endpoint).await {
            Ok((writer, reader)) => {
                self.writer = Some(writer);
                self.shared
                    .lock()
                    .expect("connection state poisoned")
                    .state = ConnectionState::Connected;
                self.emit(generation, ConnectionEventKind::Opened);

                let shared = Arc::clone(&self.shared);
                let events_tx = self.events_tx.clone();
                self.reader_task = Some(tokio::spawn(async move {
                    read_loop(reader, generation, shared, events_tx).await;
                }));
            }
            Err(e) => {
                self.shared
                    .lock()
                    .expect("connection state poisoned")
                    .state = ConnectionState::Disconnected;
                self.emit(generation, ConnectionEventKind::Failed(format!("{e:#}")));
            }
        }
    }

    /// Close the active connection if any.
    ///
    /// Safe to call when already disconnected (no-op). Emits `Closed` when
    /// a connection was actually torn down.
    pub async fn disconnect(&mut self) {
        let was_live = self.writer.is_some()
            || self.reader_task.is_some()
            || self.state() != ConnectionState::Disconnected;
        if !was_live {
            return;
        }

        self.shutdown_transport().await;

        let generation = {
            let mut shared = self.shared.lock().expect("connection state poisoned");
            shared.state = ConnectionState::Disconnected;
            shared.generation
        };
        self.emit(
            generation,
            ConnectionEventKind::Closed {
                code: 1000,
                reason: "client requested close".to_string(),
            },
        );
    }

    /// Transmit a text frame.
    ///
    /// Transmits only while `Connected`; otherwise the send is dropped
    /// (no queueing is provided — callers must check [`is_connected`]
    /// before depending on delivery). Send I/O errors are logged; the
    /// reader task observes the dying socket and reports it.
    ///
    /// [`is_connected`]: Connection::is_connected
    pub async fn send_text(&mut self, text: &str) {
        if !self.is_connected() {
            log::debug!("[connection] dropping send while not connected");
            return;
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.send_text(text).await {
                log::warn!("[connection] send failed: {e:#}");
            }
        }
    }

    /// Tear down the transport without emitting events.
    async fn shutdown_transport(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.send_close().await;
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }

    fn emit(&self, generation: u64, kind: ConnectionEventKind) {
        let _ = self.events_tx.send(ConnectionEvent { generation, kind });
    }
}

/// Read frames from the socket until it terminates.
///
/// Terminal outcomes flip the shared state to `Disconnected`, but only if
/// this task's generation is still current — a reconnect may already have
/// replaced us.
async fn read_loop(
    mut reader: WsReader,
    generation: u64,
    shared: Arc<Mutex<Shared>>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let emit = |kind| {
        let _ = events_tx.send(ConnectionEvent { generation, kind });
    };
    let mark_disconnected = || {
        let mut shared = shared.lock().expect("connection state poisoned");
        if shared.generation == generation {
            shared.state = ConnectionState::Disconnected;
        }
    };

    loop {
        match reader.recv().await {
            Some(Ok(WsMessage::Text(text))) => {
                emit(ConnectionEventKind::FrameText(text));
            }
            Some(Ok(WsMessage::Binary(data))) => {
                // Deliver binary as lossy UTF-8; the bridge protocol is textual
                emit(ConnectionEventKind::FrameText(
                    String::from_utf8_lossy(&data).into_owned(),
                ));
            }
            Some(Ok(WsMessage::Close { code, reason })) => {
                mark_disconnected();
                emit(ConnectionEventKind::Closed { code, reason });
                return;
            }
            Some(Err(e)) => {
                mark_disconnected();
                emit(ConnectionEventKind::Failed(format!("{e:#}")));
                return;
            }
            None => {
                // Stream ended without a Close frame
                mark_disconnected();
                emit(ConnectionEventKind::Closed {
                    code: 1006,
                    reason: "stream ended".to_string(),
                });
                return;
            }
        }
    }
}
