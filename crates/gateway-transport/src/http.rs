//! Health probe and stateless chat fallback.
//!
//! The fallback creates a fresh context per call, replays the request's
//! history plus the new message, starts a non-streaming run, polls it to
//! completion, and returns the final assistant turn. No concurrency hazards
//! here; the only subtlety is the poll deadline.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gateway_core::{AssistantError, ConversationClient, Role, Turn};
use serde_json::json;

use crate::{
    GatewayState,
    protocol::{ChatResponse, ExchangeRequest},
};

/// Tuning for the fallback's run polling.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Overall bound on waiting for run completion.
    pub poll_deadline: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            poll_deadline: Duration::from_secs(120),
        }
    }
}

/// Fault surfaced by an HTTP endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Upstream(#[from] AssistantError),
    #[error("timed out waiting for run completion")]
    PollTimeout,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Upstream(AssistantError::MissingReply) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::PollTimeout => StatusCode::GATEWAY_TIMEOUT,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// `GET /` - report which assistant the gateway is wired to.
pub async fn health_handler(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "assistant_id": state.client.assistant_id(),
    }))
}

/// `POST /chat` - stateless request/poll/response exchange.
pub async fn chat_handler(
    State(state): State<GatewayState>,
    Json(request): Json<ExchangeRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = run_fallback_exchange(&state.client, &state.fallback, request).await?;
    Ok(Json(ChatResponse { reply }))
}

pub(crate) async fn run_fallback_exchange(
    client: &Arc<dyn ConversationClient>,
    config: &FallbackConfig,
    request: ExchangeRequest,
) -> Result<String, ApiError> {
    let context = client.create_context().await?;
    for turn in request.history {
        client.append_turn(&context, turn).await?;
    }
    client
        .append_turn(&context, Turn::user(request.message))
        .await?;

    let run = client.create_run(&context).await?;

    let deadline = tokio::time::Instant::now() + config.poll_deadline;
    let status = loop {
        let status = client.run_status(&context, &run).await?;
        if !status.is_pending() {
            break status;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(context = %context, run = %run, "run poll deadline exceeded");
            return Err(ApiError::PollTimeout);
        }
        tokio::time::sleep(config.poll_interval).await;
    };

    if !status.is_completed() {
        return Err(AssistantError::RunFailed(format!("run ended as {status:?}")).into());
    }

    // The last assistant turn holds the reply.
    client
        .list_turns(&context)
        .await?
        .into_iter()
        .rev()
        .find(|turn| turn.role == Role::Assistant)
        .map(|turn| turn.content)
        .ok_or(ApiError::Upstream(AssistantError::MissingReply))
}
