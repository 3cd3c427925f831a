//! Typed frames sent to a connected client.

use serde::{Deserialize, Serialize};

/// One outbound frame of a streamed exchange.
///
/// An exchange emits zero or more `Token` frames followed by exactly one
/// terminal frame (`Done` or `Error`). The serialized shapes are part of the
/// wire contract: `{"token":…}`, `{"done":true}`, `{"error":…}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// One incremental fragment of the assistant's reply.
    Token { token: String },
    /// Normal end of the exchange.
    Done { done: bool },
    /// Terminal failure of the exchange.
    Error { error: String },
}

impl OutboundFrame {
    /// Token frame.
    #[must_use]
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { token: text.into() }
    }

    /// Terminal success frame.
    #[must_use]
    pub const fn done() -> Self {
        Self::Done { done: true }
    }

    /// Terminal error frame.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self::Error {
            error: detail.into(),
        }
    }

    /// Whether this frame ends the exchange.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
