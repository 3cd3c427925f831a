//! Capability trait for the remote conversation service.

use async_trait::async_trait;

use crate::bridge::RunStream;
use crate::turn::{ContextId, RunId, RunStatus, Turn};

/// Failure reported by (or on the way to) the assistant backend.
///
/// Any of these is session-fatal for a streaming exchange: it is surfaced to
/// the client as one terminal error frame and the connection is closed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AssistantError {
    /// The service rejected a request.
    #[error("assistant API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// The request never got a usable response.
    #[error("assistant transport error: {0}")]
    Transport(String),
    /// A run failed after it was accepted.
    #[error("assistant run failed: {0}")]
    RunFailed(String),
    /// The run emitted an event the gateway does not handle
    /// (tool calls, content filtering, non-text deltas).
    #[error("unsupported run event: {0}")]
    UnsupportedEvent(String),
    /// A completed run left no assistant turn behind.
    #[error("no assistant reply found")]
    MissingReply,
}

/// Opaque capability to drive a remote, ordered sequence of turns.
///
/// The gateway holds only identifiers; conversation content lives with the
/// backend.
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Identifier of the configured assistant/model (health reporting).
    fn assistant_id(&self) -> &str;

    /// Create a fresh conversation context.
    async fn create_context(&self) -> Result<ContextId, AssistantError>;

    /// Append one turn to a context. Append order is preserved.
    async fn append_turn(&self, context: &ContextId, turn: Turn) -> Result<(), AssistantError>;

    /// Start a streaming run over the context.
    ///
    /// The returned stream yields token events in emission order and
    /// terminates with exactly one success or error marker. Dropping the
    /// stream cancels the run.
    async fn start_run(&self, context: &ContextId) -> Result<RunStream, AssistantError>;

    /// Start a non-streaming run (stateless fallback path).
    async fn create_run(&self, context: &ContextId) -> Result<RunId, AssistantError>;

    /// Poll a non-streaming run's status.
    async fn run_status(
        &self,
        context: &ContextId,
        run: &RunId,
    ) -> Result<RunStatus, AssistantError>;

    /// List the turns of a context in order (fallback path only, to fetch
    /// the final assistant turn).
    async fn list_turns(&self, context: &ContextId) -> Result<Vec<Turn>, AssistantError>;
}
