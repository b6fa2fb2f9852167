//! Core Chat - streaming assistant session client.
//!
//! This crate provides the session/protocol engine behind the Core
//! assistant panel: connection lifecycle management, frame
//! encoding/decoding, the session state machine, and stream reassembly.
//!
//! # Architecture
//!
//! The crate follows a single-event-path pattern:
//!
//! - **Session** - Top-level state machine, owns the conversation
//! - **Connection** - Owns the physical WebSocket, produces typed events
//! - **Frame** - Stateless wire codec
//! - **StreamBuffer** - Reassembles streamed reply fragments
//! - **MessageStore** - Append-only turn log, the UI's read model
//!
//! # Modules
//!
//! - [`session`] - Session state machine and phases
//! - [`connection`] - Connection manager and lifecycle events
//! - [`frame`] - Wire frame codec
//! - [`stream`] - Stream accumulator
//! - [`store`] - Conversation turn log
//! - [`config`] - Endpoint/channel configuration
//! - [`ws`] - WebSocket transport wrapper

// Library modules
pub mod config;
pub mod connection;
pub mod frame;
pub mod session;
pub mod store;
pub mod stream;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use connection::{Connection, ConnectionEvent, ConnectionEventKind, ConnectionState};
pub use frame::{DecodeError, Frame};
pub use session::{Session, SessionPhase};
pub use store::{ConversationTurn, MessageStore, Role};
pub use stream::StreamBuffer;
