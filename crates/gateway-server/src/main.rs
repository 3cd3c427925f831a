//! Gateway server binary.
//!
//! Wires the assistant client, telemetry recorder, and session registry into
//! the transport router and serves it. Configuration comes entirely from the
//! environment; see [`config::GatewayConfig`].

mod config;

use std::sync::Arc;

use gateway_assistant::OpenAiAssistant;
use gateway_core::{ConversationClient, TelemetryRecorder};
use gateway_telemetry::{LangfuseRecorder, NoopRecorder};
use gateway_transport::GatewayState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = GatewayConfig::from_env()?;

    let mut assistant = OpenAiAssistant::new(&config.api_key, &config.assistant_id);
    if let Some(base_url) = &config.base_url {
        assistant = assistant.with_base_url(base_url);
    }
    let client: Arc<dyn ConversationClient> = Arc::new(assistant);

    let telemetry: Arc<dyn TelemetryRecorder> = match &config.langfuse {
        Some(langfuse) => {
            if let Err(error) = langfuse.auth_check().await {
                tracing::warn!(%error, "telemetry auth check failed, recording anyway");
            }
            Arc::new(LangfuseRecorder::spawn(langfuse.clone()))
        }
        None => {
            tracing::info!("telemetry keys not set, spans disabled");
            Arc::new(NoopRecorder)
        }
    };

    let mut state = GatewayState::new(client, Arc::clone(&telemetry));
    state.context_policy = config.context_policy;

    let app = gateway_transport::router(state);

    tracing::info!(
        assistant_id = %config.assistant_id,
        "Gateway listening on http://{}",
        config.bind_addr
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush buffered spans before the process exits.
    telemetry.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
    }
}
