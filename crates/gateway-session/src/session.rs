//! Per-connection streaming exchange loop.
//!
//! One `ChatSession` serves exactly one connection. Exchanges run strictly
//! sequentially: the handler appends the inbound turns, starts a run,
//! forwards tokens as they arrive, persists the accumulated reply as one
//! assistant turn, and records the exchange span. The outbound channel is
//! bounded: a client that stops draining stalls the handler, which stops
//! pulling from the bridge, which stalls the producer within its send bound.
//! The channel's closed-receiver error is the disconnect signal; once it
//! fires, the run is cancelled through the bridge and nothing further is
//! sent.

use std::sync::Arc;

use gateway_core::{
    AssistantError, BridgeError, ContextId, ConversationClient, OutboundFrame, RunEvent,
    TelemetryRecorder, Turn,
};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::registry::SessionRegistry;

/// When a conversation context is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextPolicy {
    /// One context per connection, created on accept and reused across
    /// exchanges (persistent-session behavior).
    PerConnection,
    /// A fresh context for every exchange.
    PerExchange,
}

/// Outcome of a failed exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The remote service rejected a request. Session-fatal.
    #[error(transparent)]
    Upstream(#[from] AssistantError),
    /// The token stream failed or stalled. Session-fatal.
    #[error(transparent)]
    Stream(#[from] BridgeError),
    /// The client went away. Not an error: triggers cleanup, no frame is
    /// sent (none can be).
    #[error("client disconnected")]
    Disconnected,
}

impl ExchangeError {
    /// Whether this outcome is a client disconnect rather than a fault.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Handler state for one live connection.
pub struct ChatSession {
    client: Arc<dyn ConversationClient>,
    telemetry: Arc<dyn TelemetryRecorder>,
    registry: Arc<SessionRegistry>,
    connection_id: Uuid,
    policy: ContextPolicy,
    context: Option<ContextId>,
}

impl ChatSession {
    /// Accept a connection: under [`ContextPolicy::PerConnection`] this
    /// creates the remote context and registers the session.
    ///
    /// # Errors
    /// Returns an error if the remote context cannot be created.
    pub async fn connect(
        client: Arc<dyn ConversationClient>,
        telemetry: Arc<dyn TelemetryRecorder>,
        registry: Arc<SessionRegistry>,
        policy: ContextPolicy,
    ) -> Result<Self, AssistantError> {
        let connection_id = Uuid::new_v4();
        let context = match policy {
            ContextPolicy::PerConnection => {
                let context = client.create_context().await?;
                tracing::info!(%connection_id, context = %context, "session connected");
                registry.put(connection_id, context.clone());
                Some(context)
            }
            ContextPolicy::PerExchange => {
                tracing::info!(%connection_id, "session connected (context per exchange)");
                None
            }
        };

        Ok(Self {
            client,
            telemetry,
            registry,
            connection_id,
            policy,
            context,
        })
    }

    /// Connection identity of this session.
    #[must_use]
    pub const fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Context currently bound to this session, if any.
    #[must_use]
    pub const fn context(&self) -> Option<&ContextId> {
        self.context.as_ref()
    }

    async fn exchange_context(&mut self) -> Result<ContextId, AssistantError> {
        if self.policy == ContextPolicy::PerConnection {
            if let Some(context) = &self.context {
                return Ok(context.clone());
            }
        }
        let context = self.client.create_context().await?;
        self.registry.put(self.connection_id, context.clone());
        self.context = Some(context.clone());
        Ok(context)
    }

    /// Drive one exchange: append `history` then the user turn, stream the
    /// run's tokens into `out`, persist the accumulated reply, record the
    /// span, and emit the terminal `done` frame.
    ///
    /// History is replayed verbatim in the order received; the handler does
    /// not deduplicate against previously persisted turns.
    ///
    /// `out` must be bounded. A full channel blocks the handler here, so no
    /// more than the channel's capacity is ever buffered ahead of the
    /// client; the resulting stall propagates through the bridge to the
    /// token producer.
    ///
    /// Returns the full reply on success.
    ///
    /// # Errors
    /// - [`ExchangeError::Disconnected`] if the outbound channel closed; the
    ///   in-flight run is cancelled and no further frame is sent.
    /// - [`ExchangeError::Upstream`] / [`ExchangeError::Stream`] on remote
    ///   faults; the caller surfaces one error frame and closes the session.
    pub async fn run_exchange(
        &mut self,
        message: String,
        history: Vec<Turn>,
        out: &mpsc::Sender<OutboundFrame>,
    ) -> Result<String, ExchangeError> {
        let context = self.exchange_context().await?;
        tracing::debug!(
            connection_id = %self.connection_id,
            context = %context,
            history_len = history.len(),
            "starting exchange"
        );

        let span = self
            .telemetry
            .begin_span(
                "chat.exchange",
                json!({ "message": message, "history": history }),
                json!({
                    "connection.id": self.connection_id,
                    "context.id": context.to_string(),
                }),
            )
            .await;

        for turn in history {
            self.client.append_turn(&context, turn).await?;
        }
        self.client
            .append_turn(&context, Turn::user(message))
            .await?;

        let mut stream = self.client.start_run(&context).await?;
        let mut reply = String::new();
        loop {
            match stream.next_event().await? {
                RunEvent::Token(token) => {
                    if out.send(OutboundFrame::token(token.clone())).await.is_err() {
                        stream.cancel();
                        return Err(ExchangeError::Disconnected);
                    }
                    reply.push_str(&token);
                }
                RunEvent::Completed => break,
            }
        }

        self.client
            .append_turn(&context, Turn::assistant(reply.clone()))
            .await?;

        self.telemetry
            .end_span(span, json!({ "reply": reply }))
            .await;

        if out.send(OutboundFrame::done()).await.is_err() {
            return Err(ExchangeError::Disconnected);
        }

        tracing::debug!(
            connection_id = %self.connection_id,
            context = %context,
            reply_len = reply.len(),
            "exchange completed"
        );
        Ok(reply)
    }

    /// Tear the session down. Idempotent; safe after any failure.
    pub fn close(&self) {
        self.registry.remove(self.connection_id);
        tracing::info!(connection_id = %self.connection_id, "session closed");
    }
}
