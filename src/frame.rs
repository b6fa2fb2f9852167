//! Wire frame codec for the Core bridge protocol.
//!
//! The bridge exchanges small JSON frames over a persistent WebSocket
//! connection. Each frame carries an open-ended `type` string plus
//! optional routing and payload fields:
//!
//! ```text
//! { "type": "claude_stream", "data": "partial text", "timestamp": "..." }
//! ```
//!
//! The codec is stateless: [`Frame::encode`] stamps a timestamp if absent
//! and serializes; [`Frame::decode`] parses inbound text. A payload that
//! fails structural parsing yields [`DecodeError`] — callers log and drop
//! it. A frame whose `type` is simply unrecognized still decodes fine;
//! ignoring it is the session dispatcher's job, not the codec's.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};

/// Client→server: register interest in a named channel (`data` = channel name).
pub const TYPE_SUBSCRIBE: &str = "subscribe";
/// Client→server: user input (`data` = message text).
pub const TYPE_CLAUDE_MESSAGE: &str = "claude_message";
/// Server→client: complete, non-streamed assistant reply (`data` = text).
pub const TYPE_CLAUDE_RESPONSE: &str = "claude_response";
/// Server→client: one fragment of a streamed reply (`data` = text chunk).
pub const TYPE_CLAUDE_STREAM: &str = "claude_stream";
/// Server→client: terminates the current stream.
pub const TYPE_CLAUDE_STREAM_END: &str = "claude_stream_end";
/// Server→client: out-of-band failure notice (`data` = human-readable message).
pub const TYPE_ERROR: &str = "error";

/// One discrete message unit exchanged over the connection.
///
/// Immutable once received. `kind` is an open string so that frame types
/// introduced by newer backends decode without error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Frame type discriminator (open-ended).
    #[serde(rename = "type")]
    pub kind: String,

    /// Channel the frame is scoped to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Backend process the frame originated from, if any.
    #[serde(rename = "processId", skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,

    /// Frame payload; meaning depends on `kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// RFC 3339 timestamp; stamped at encode time if empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
}

/// Error decoding an inbound payload into a [`Frame`].
///
/// Distinct from "unrecognized type": a `DecodeError` means the payload
/// was not structurally valid at all.
#[derive(Debug)]
pub struct DecodeError(serde_json::Error);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed frame: {}", self.0)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl Frame {
    /// Create a frame of the given type with no payload.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            channel: None,
            process_id: None,
            data: None,
            timestamp: String::new(),
        }
    }

    /// Build a `subscribe` frame for the given channel name.
    #[must_use]
    pub fn subscribe(channel: &str) -> Self {
        Self {
            data: Some(serde_json::Value::String(channel.to_string())),
            ..Self::new(TYPE_SUBSCRIBE)
        }
    }

    /// Build a `claude_message` frame carrying user input.
    #[must_use]
    pub fn user_message(text: &str) -> Self {
        Self {
            data: Some(serde_json::Value::String(text.to_string())),
            ..Self::new(TYPE_CLAUDE_MESSAGE)
        }
    }

    /// Serialize to wire text, stamping `timestamp` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self) -> anyhow::Result<String> {
        use anyhow::Context;

        if self.timestamp.is_empty() {
            let mut stamped = self.clone();
            stamped.timestamp = chrono::Utc::now().to_rfc3339();
            serde_json::to_string(&stamped)
        } else {
            serde_json::to_string(self)
        }
        .context("Frame serialization failed")
    }

    /// Parse wire text into a frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload is not a structurally valid
    /// frame. The caller must log and drop it, never propagate partial
    /// state.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(DecodeError)
    }

    /// Extract the payload as text.
    ///
    /// String payloads pass through; other non-null payloads are
    /// stringified (the backend occasionally sends structured error
    /// details). Missing/null payloads yield `None`.
    #[must_use]
    pub fn data_text(&self) -> Option<String> {
        match self.data.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
