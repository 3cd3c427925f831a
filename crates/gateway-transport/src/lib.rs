//! Wire protocol and HTTP/WebSocket endpoints.
//!
//! Routes:
//! - `GET /` - health probe reporting the configured assistant
//! - `POST /chat` - stateless request/poll/response fallback
//! - `GET /ws/chat` - streaming exchange endpoint

pub mod http;
pub mod protocol;
pub mod websocket;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use gateway_core::{ConversationClient, TelemetryRecorder};
use gateway_session::{ContextPolicy, SessionRegistry};
use tower_http::cors::CorsLayer;

pub use http::FallbackConfig;
pub use protocol::{ChatResponse, ExchangeRequest};

/// Shared state behind every route.
#[derive(Clone)]
pub struct GatewayState {
    pub client: Arc<dyn ConversationClient>,
    pub telemetry: Arc<dyn TelemetryRecorder>,
    pub registry: Arc<SessionRegistry>,
    pub context_policy: ContextPolicy,
    pub fallback: FallbackConfig,
}

impl GatewayState {
    /// State with the default context policy (one context per connection)
    /// and default fallback tuning.
    #[must_use]
    pub fn new(
        client: Arc<dyn ConversationClient>,
        telemetry: Arc<dyn TelemetryRecorder>,
    ) -> Self {
        Self {
            client,
            telemetry,
            registry: Arc::new(SessionRegistry::new()),
            context_policy: ContextPolicy::PerConnection,
            fallback: FallbackConfig::default(),
        }
    }
}

/// Build the gateway router.
#[must_use]
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(http::health_handler))
        .route("/chat", post(http::chat_handler))
        .route("/ws/chat", get(websocket::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
