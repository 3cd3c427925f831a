//! `reqwest`-backed conversation client.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use gateway_core::bridge::{self, BridgeConfig, RunSink};
use gateway_core::{AssistantError, ContextId, ConversationClient, RunId, RunStatus, RunStream, Turn};

use crate::wire::{
    ApiErrorEnvelope, CreateMessageRequest, CreateRunRequest, DeltaContentPart, MessageDeltaEvent,
    MessageList, RunObject, ThreadObject,
};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Beta header required by the Assistants v2 surface.
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Bound on establishing a connection, streaming runs included.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on a single socket read going silent. Long enough for the gaps
/// between SSE tokens, short enough that a wedged remote cannot hold a
/// handler task forever.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default total-time bound for non-streaming requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Conversation client for an Assistants-v2-shaped API.
#[derive(Debug, Clone)]
pub struct OpenAiAssistant {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    assistant_id: String,
    bridge: BridgeConfig,
    request_timeout: Duration,
}

impl OpenAiAssistant {
    /// Create a client against the default base URL.
    #[must_use]
    pub fn new(api_key: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .read_timeout(READ_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            assistant_id: assistant_id.into(),
            bridge: BridgeConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the base URL (tests, proxies).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the bridge tuning used for streaming runs.
    #[must_use]
    pub fn with_bridge_config(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Override the total-time bound applied to non-streaming requests.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Request builder for non-streaming calls, bounded in total time so a
    /// stalled remote cannot wedge a handler task mid-exchange or defeat the
    /// fallback's poll deadline.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.stream_request(method, path).timeout(self.request_timeout)
    }

    /// Request builder without the total-time bound. Only the streaming run
    /// uses it: its response body legitimately outlives any fixed request
    /// timeout, and the bridge's `recv_timeout` plus the client-level read
    /// timeout bound it instead.
    fn stream_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    /// Map a non-2xx response into an [`AssistantError::Api`].
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AssistantError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map_or_else(|_| format!("HTTP {status}: {body}"), |e| e.error.message);
        tracing::error!(status = status.as_u16(), %message, "assistant API error");
        Err(AssistantError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn transport(error: &reqwest::Error) -> AssistantError {
    AssistantError::Transport(error.to_string())
}

#[async_trait]
impl ConversationClient for OpenAiAssistant {
    fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    async fn create_context(&self) -> Result<ContextId, AssistantError> {
        let response = self
            .request(reqwest::Method::POST, "threads")
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let thread: ThreadObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| transport(&e))?;
        tracing::debug!(thread = %thread.id, "created conversation context");
        Ok(ContextId(thread.id))
    }

    async fn append_turn(&self, context: &ContextId, turn: Turn) -> Result<(), AssistantError> {
        let response = self
            .request(reqwest::Method::POST, &format!("threads/{context}/messages"))
            .json(&CreateMessageRequest {
                role: turn.role,
                content: &turn.content,
            })
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let _ = Self::check(response).await?;
        Ok(())
    }

    async fn start_run(&self, context: &ContextId) -> Result<RunStream, AssistantError> {
        let response = self
            .stream_request(reqwest::Method::POST, &format!("threads/{context}/runs"))
            .json(&CreateRunRequest {
                assistant_id: &self.assistant_id,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let response = Self::check(response).await?;

        let (sink, stream) = bridge::channel(&self.bridge);
        let events = response.bytes_stream().eventsource();
        // The SSE reader runs on its own task; the bridge is the only
        // contact point with the consumer. Dropping `events` on exit closes
        // the HTTP response and with it the remote run's stream.
        tokio::spawn(pump_run_events(events, sink));

        Ok(stream)
    }

    async fn create_run(&self, context: &ContextId) -> Result<RunId, AssistantError> {
        let response = self
            .request(reqwest::Method::POST, &format!("threads/{context}/runs"))
            .json(&CreateRunRequest {
                assistant_id: &self.assistant_id,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let run: RunObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| transport(&e))?;
        Ok(RunId(run.id))
    }

    async fn run_status(
        &self,
        context: &ContextId,
        run: &RunId,
    ) -> Result<RunStatus, AssistantError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("threads/{context}/runs/{run}"),
            )
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let run: RunObject = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| transport(&e))?;
        if let Some(error) = run.last_error {
            tracing::warn!(status = ?run.status, message = %error.message, "run reported an error");
        }
        Ok(run.status)
    }

    async fn list_turns(&self, context: &ContextId) -> Result<Vec<Turn>, AssistantError> {
        let response = self
            .request(reqwest::Method::GET, &format!("threads/{context}/messages"))
            .query(&[("order", "asc"), ("limit", "100")])
            .send()
            .await
            .map_err(|e| transport(&e))?;
        let list: MessageList = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| transport(&e))?;
        Ok(list
            .data
            .into_iter()
            .map(|message| Turn {
                role: message.role,
                content: message.text(),
            })
            .collect())
    }
}

/// Forward one run's SSE events into the bridge until a terminal event.
///
/// Exits early when the consumer cancels (a failed token send) and never
/// emits anything after a terminal marker.
async fn pump_run_events<S>(events: S, sink: RunSink)
where
    S: futures::Stream<
            Item = Result<
                eventsource_stream::Event,
                eventsource_stream::EventStreamError<reqwest::Error>,
            >,
        > + Send
        + 'static,
{
    let mut events = std::pin::pin!(events);
    while let Some(next) = events.next().await {
        let event = match next {
            Ok(event) => event,
            Err(error) => {
                sink.fail(AssistantError::Transport(error.to_string())).await;
                return;
            }
        };

        match event.event.as_str() {
            "thread.message.delta" => {
                let parsed: MessageDeltaEvent = match serde_json::from_str(&event.data) {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        sink.fail(AssistantError::Transport(format!(
                            "malformed delta event: {error}"
                        )))
                        .await;
                        return;
                    }
                };
                for part in parsed.delta.content {
                    match part {
                        DeltaContentPart::Text { text } => {
                            let Some(value) = text.and_then(|t| t.value) else {
                                continue;
                            };
                            if !value.is_empty() && sink.token(value).await.is_err() {
                                // Consumer cancelled the stream.
                                return;
                            }
                        }
                        DeltaContentPart::Other => {
                            sink.fail(AssistantError::UnsupportedEvent(
                                "non-text message delta".into(),
                            ))
                            .await;
                            return;
                        }
                    }
                }
            }
            "thread.run.completed" => {
                sink.complete().await;
                return;
            }
            "thread.run.failed" | "thread.run.cancelled" | "thread.run.expired" => {
                let detail = serde_json::from_str::<RunObject>(&event.data)
                    .ok()
                    .and_then(|run| run.last_error)
                    .map_or_else(|| event.event.clone(), |error| error.message);
                sink.fail(AssistantError::RunFailed(detail)).await;
                return;
            }
            "thread.run.requires_action" => {
                sink.fail(AssistantError::UnsupportedEvent(
                    "run requires tool action".into(),
                ))
                .await;
                return;
            }
            "thread.message.incomplete" => {
                sink.fail(AssistantError::UnsupportedEvent(
                    "message incomplete (content filtered)".into(),
                ))
                .await;
                return;
            }
            // Run/step lifecycle chatter and the closing "done" sentinel.
            _ => {}
        }
    }
    // Producer ended without a terminal event; dropping the sink surfaces
    // an interrupted-stream error to the consumer.
}
