//! Langfuse-compatible recorder.
//!
//! Spans are queued to a background worker which batches them into the
//! ingestion endpoint (`POST /api/public/ingestion`, basic auth). Ingestion
//! upserts by trace id, so ending a span is a second event for the same id
//! carrying the output. Every failure path ends in a log line, nothing else.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gateway_core::{SpanHandle, TelemetryRecorder};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Connection settings for a Langfuse-compatible ingestion host.
#[derive(Debug, Clone)]
pub struct LangfuseConfig {
    pub public_key: String,
    pub secret_key: String,
    pub host: String,
    /// Flush at least this often while events are buffered.
    pub flush_interval: Duration,
    /// Flush immediately once this many events are buffered.
    pub batch_size: usize,
}

impl LangfuseConfig {
    /// Settings for a host with the given key pair.
    #[must_use]
    pub fn new(
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: secret_key.into(),
            host: host.into(),
            flush_interval: Duration::from_secs(5),
            batch_size: 20,
        }
    }

    /// Verify the key pair against the host.
    ///
    /// # Errors
    /// Returns a description of the failure; callers log it and move on
    /// (an unreachable telemetry host never blocks the gateway).
    pub async fn auth_check(&self) -> Result<(), String> {
        let response = reqwest::Client::new()
            .get(format!("{}/api/public/projects", self.host))
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("telemetry auth check failed: HTTP {}", response.status()))
        }
    }
}

enum Command {
    Event(Value),
    Shutdown(oneshot::Sender<()>),
}

/// Batching recorder for a Langfuse-compatible backend.
pub struct LangfuseRecorder {
    tx: mpsc::UnboundedSender<Command>,
}

impl LangfuseRecorder {
    /// Start the background ingestion worker and return its handle.
    #[must_use]
    pub fn spawn(config: LangfuseConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tokio::spawn(worker(config, rx));
        Self { tx }
    }

    fn enqueue(&self, event_type: &str, body: Value) {
        let event = json!({
            "id": Uuid::new_v4(),
            "type": event_type,
            "timestamp": Utc::now().to_rfc3339(),
            "body": body,
        });
        if self.tx.send(Command::Event(event)).is_err() {
            tracing::warn!("telemetry worker is gone, span dropped");
        }
    }
}

#[async_trait]
impl TelemetryRecorder for LangfuseRecorder {
    async fn begin_span(&self, name: &str, input: Value, metadata: Value) -> SpanHandle {
        let handle = SpanHandle::new();
        self.enqueue(
            "trace-create",
            json!({
                "id": handle.trace_id,
                "name": name,
                "input": input,
                "metadata": metadata,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        );
        handle
    }

    async fn end_span(&self, span: SpanHandle, output: Value) {
        self.enqueue(
            "trace-create",
            json!({
                "id": span.trace_id,
                "output": output,
            }),
        );
    }

    async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(ack_tx)).is_err() {
            return;
        }
        // Bounded wait; a wedged flush must not hold up process exit.
        if tokio::time::timeout(Duration::from_secs(5), ack_rx)
            .await
            .is_err()
        {
            tracing::warn!("telemetry flush timed out during shutdown");
        }
    }
}

async fn worker(config: LangfuseConfig, mut rx: mpsc::UnboundedReceiver<Command>) {
    let http = reqwest::Client::new();
    let mut buffer: Vec<Value> = Vec::new();
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Event(event)) => {
                    buffer.push(event);
                    if buffer.len() >= config.batch_size {
                        flush(&http, &config, &mut buffer).await;
                    }
                }
                Some(Command::Shutdown(ack)) => {
                    flush(&http, &config, &mut buffer).await;
                    let _ = ack.send(());
                    return;
                }
                None => {
                    flush(&http, &config, &mut buffer).await;
                    return;
                }
            },
            _ = ticker.tick() => {
                flush(&http, &config, &mut buffer).await;
            }
        }
    }
}

async fn flush(http: &reqwest::Client, config: &LangfuseConfig, buffer: &mut Vec<Value>) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let count = batch.len();

    let result = http
        .post(format!("{}/api/public/ingestion", config.host))
        .basic_auth(&config.public_key, Some(&config.secret_key))
        .json(&json!({ "batch": batch }))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            tracing::debug!(count, "flushed telemetry batch");
        }
        Ok(response) => {
            tracing::warn!(
                status = response.status().as_u16(),
                count,
                "telemetry ingestion rejected"
            );
        }
        Err(error) => {
            tracing::warn!(%error, count, "telemetry ingestion failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn spans_are_batched_and_flushed_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/public/ingestion"))
            .respond_with(
                ResponseTemplate::new(207).set_body_json(json!({"successes": [], "errors": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let recorder = LangfuseRecorder::spawn(LangfuseConfig::new(
            "pk-test",
            "sk-test",
            server.uri(),
        ));

        let span = recorder
            .begin_span("chat.exchange", json!({"message": "hi"}), json!({}))
            .await;
        recorder.end_span(span, json!({"reply": "hello"})).await;
        recorder.shutdown().await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let batch = body["batch"].as_array().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0]["type"], "trace-create");
        assert_eq!(batch[0]["body"]["name"], "chat.exchange");
        assert_eq!(batch[1]["body"]["output"]["reply"], "hello");
        // Both events address the same trace.
        assert_eq!(batch[0]["body"]["id"], batch[1]["body"]["id"]);
    }

    #[tokio::test]
    async fn unreachable_host_is_swallowed() {
        // Port 9 is discard; the connection fails fast and the recorder
        // must neither panic nor block.
        let recorder = LangfuseRecorder::spawn(LangfuseConfig::new(
            "pk-test",
            "sk-test",
            "http://127.0.0.1:9",
        ));

        let span = recorder
            .begin_span("chat.exchange", json!({}), json!({}))
            .await;
        recorder.end_span(span, json!({})).await;
        recorder.shutdown().await;
    }

    #[tokio::test]
    async fn auth_check_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/public/projects"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = LangfuseConfig::new("pk-test", "sk-test", server.uri());
        assert!(config.auth_check().await.is_err());
    }
}
