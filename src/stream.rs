//! Stream accumulator for in-flight assistant replies.
//!
//! A streamed reply arrives as a sequence of partial-content frames
//! terminated by a stream-end frame. [`StreamBuffer`] merges the
//! fragments into the final turn content. At most one buffer is active
//! per session; the buffer is transient and is discarded (not persisted)
//! if the session disconnects or errors mid-stream.

// Rust guideline compliant 2026-02

/// Mutable accumulation state for at most one in-flight assistant turn.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    partial: String,
    active: bool,
}

impl StreamBuffer {
    /// Create an inactive, empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stream is currently in flight.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Append a fragment, activating the buffer if needed.
    ///
    /// No length bound is enforced; arbitrarily long streams accumulate
    /// without truncation.
    pub fn append(&mut self, text: &str) {
        self.active = true;
        self.partial.push_str(text);
    }

    /// Return the accumulated content and clear the buffer.
    ///
    /// Returns `None` if the content is empty, signaling the caller to
    /// skip committing a turn.
    pub fn finalize(&mut self) -> Option<String> {
        self.active = false;
        let content = std::mem::take(&mut self.partial);
        if content.is_empty() {
            None
        } else {
            Some(content)
        }
    }

    /// Clear the buffer without producing output (disconnect/error path).
    pub fn discard(&mut self) {
        self.active = false;
        self.partial.clear();
    }

    /// In-flight content, for rendering a typing indicator.
    ///
    /// `None` when no stream is active.
    #[must_use]
    pub fn preview(&self) -> Option<&str> {
        self.active.then(|| self.partial.as_str())
    }
}
