//! Wire protocol for client-server communication.
//!
//! Inbound (WebSocket text message or `POST /chat` body):
//! `{"message": "...", "history": [{"role": "user", "content": "..."}]}`.
//! Outbound streamed frames are [`gateway_core::OutboundFrame`].

use gateway_core::Turn;
use serde::{Deserialize, Serialize};

/// One inbound exchange request.
///
/// `history` is optional prior turns the caller wants replayed before the
/// new message; it is appended verbatim, duplicates and all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<Turn>,
}

/// Stateless fallback response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}
