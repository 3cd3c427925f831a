//! Streaming exchange endpoint.
//!
//! One task per connection. An outbound forwarder task owns the socket's
//! send half; the handler loop owns the receive half and drives exchanges
//! strictly sequentially. The frame channel between them is bounded, so a
//! client that stops reading stalls the handler rather than growing a
//! buffer. When the socket dies the forwarder exits, the channel closes, and
//! the session layer observes the disconnect on its next send.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use gateway_core::OutboundFrame;
use gateway_session::{ChatSession, ExchangeError};
use tokio::sync::mpsc;

use crate::{GatewayState, protocol::ExchangeRequest};

/// Outbound frame buffer per connection. Once full, the exchange stalls and
/// backpressure flows through the bridge to the token producer.
const OUTBOUND_BUFFER: usize = 32;

/// What the handler loop should do after one inbound message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LoopOutcome {
    Continue,
    Close,
}

/// Classification of one inbound socket message.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A text payload to hand to the exchange loop.
    Exchange(String),
    /// A payload that cannot even be decoded as text.
    Malformed,
    /// The client closed the socket.
    Closed,
    /// Pings, pongs and the like.
    Ignored,
}

pub(crate) fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => Inbound::Exchange(text.to_string()),
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Inbound::Exchange(text),
            Err(_) => Inbound::Malformed,
        },
        Message::Close(_) => Inbound::Closed,
        _ => Inbound::Ignored,
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut sender, mut receiver) = socket.split();

    // Frames flow through a bounded channel so the session layer never
    // touches the socket; a closed receiver below is the disconnect signal
    // upward, a full queue is the backpressure signal.
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_BUFFER);

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(error) => {
                    tracing::error!(%error, "failed to serialize frame");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = match ChatSession::connect(
        Arc::clone(&state.client),
        Arc::clone(&state.telemetry),
        Arc::clone(&state.registry),
        state.context_policy,
    )
    .await
    {
        Ok(session) => session,
        Err(error) => {
            tracing::error!(%error, "failed to establish session");
            let _ = tx.send(OutboundFrame::error(error.to_string())).await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(msg) => match classify(msg) {
                Inbound::Exchange(text) => text,
                Inbound::Malformed => {
                    let _ = tx
                        .send(OutboundFrame::error(
                            "invalid message: payload is not valid UTF-8",
                        ))
                        .await;
                    continue;
                }
                Inbound::Closed => break,
                Inbound::Ignored => continue,
            },
            Err(error) => {
                tracing::debug!(%error, "websocket receive error");
                break;
            }
        };

        if handle_text(&mut session, &text, &tx).await == LoopOutcome::Close {
            break;
        }
    }

    session.close();
    // Drain rather than abort: a terminal frame queued above still reaches
    // the client before the socket closes.
    drop(tx);
    let _ = send_task.await;
}

/// Handle one inbound text message.
///
/// Malformed payloads cost the client one error frame and nothing else; the
/// session stays open for the next exchange. Upstream faults are surfaced as
/// one terminal error frame and close the session.
pub(crate) async fn handle_text(
    session: &mut ChatSession,
    text: &str,
    tx: &mpsc::Sender<OutboundFrame>,
) -> LoopOutcome {
    let request: ExchangeRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(%error, "invalid exchange request");
            let _ = tx
                .send(OutboundFrame::error(format!("invalid message: {error}")))
                .await;
            return LoopOutcome::Continue;
        }
    };

    match session
        .run_exchange(request.message, request.history, tx)
        .await
    {
        Ok(_) => LoopOutcome::Continue,
        Err(error @ ExchangeError::Disconnected) => {
            tracing::debug!(%error, connection_id = %session.connection_id(), "client went away");
            LoopOutcome::Close
        }
        Err(error) => {
            tracing::error!(%error, connection_id = %session.connection_id(), "exchange failed");
            let _ = tx.send(OutboundFrame::error(error.to_string())).await;
            LoopOutcome::Close
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use gateway_core::bridge::{self, BridgeConfig};
    use gateway_core::{
        AssistantError, ContextId, ConversationClient, RunId, RunStatus, RunStream,
        TelemetryRecorder, Turn,
    };
    use gateway_session::{ContextPolicy, SessionRegistry};

    use super::*;

    /// Replies with one scripted token list per run, or fails.
    struct StubClient {
        runs: Mutex<VecDeque<Result<Vec<&'static str>, AssistantError>>>,
    }

    impl StubClient {
        fn new(runs: Vec<Result<Vec<&'static str>, AssistantError>>) -> Arc<Self> {
            Arc::new(Self {
                runs: Mutex::new(runs.into()),
            })
        }
    }

    #[async_trait]
    impl ConversationClient for StubClient {
        fn assistant_id(&self) -> &str {
            "asst_stub"
        }

        async fn create_context(&self) -> Result<ContextId, AssistantError> {
            Ok(ContextId("ctx".into()))
        }

        async fn append_turn(
            &self,
            _context: &ContextId,
            _turn: Turn,
        ) -> Result<(), AssistantError> {
            Ok(())
        }

        async fn start_run(&self, _context: &ContextId) -> Result<RunStream, AssistantError> {
            let script = self
                .runs
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted run left");
            let config = BridgeConfig {
                capacity: 8,
                send_timeout: Duration::from_millis(100),
                recv_timeout: Duration::from_secs(1),
            };
            let (sink, stream) = bridge::channel(&config);
            tokio::spawn(async move {
                match script {
                    Ok(tokens) => {
                        for token in tokens {
                            if sink.token(token).await.is_err() {
                                return;
                            }
                        }
                        sink.complete().await;
                    }
                    Err(error) => sink.fail(error).await,
                }
            });
            Ok(stream)
        }

        async fn create_run(&self, _context: &ContextId) -> Result<RunId, AssistantError> {
            Ok(RunId("run".into()))
        }

        async fn run_status(
            &self,
            _context: &ContextId,
            _run: &RunId,
        ) -> Result<RunStatus, AssistantError> {
            Ok(RunStatus::Completed)
        }

        async fn list_turns(&self, _context: &ContextId) -> Result<Vec<Turn>, AssistantError> {
            Ok(Vec::new())
        }
    }

    struct SilentTelemetry;

    #[async_trait]
    impl TelemetryRecorder for SilentTelemetry {
        async fn begin_span(
            &self,
            _name: &str,
            _input: serde_json::Value,
            _metadata: serde_json::Value,
        ) -> gateway_core::SpanHandle {
            gateway_core::SpanHandle::new()
        }
        async fn end_span(&self, _span: gateway_core::SpanHandle, _output: serde_json::Value) {}
        async fn shutdown(&self) {}
    }

    async fn session_for(client: Arc<StubClient>) -> ChatSession {
        ChatSession::connect(
            client,
            Arc::new(SilentTelemetry),
            Arc::new(SessionRegistry::new()),
            ContextPolicy::PerConnection,
        )
        .await
        .unwrap()
    }

    fn frames(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<OutboundFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn non_utf8_binary_payload_is_malformed() {
        assert!(matches!(
            classify(Message::Binary(vec![0xff, 0xfe].into())),
            Inbound::Malformed
        ));
        // Valid UTF-8 binary payloads are treated like text.
        assert!(matches!(
            classify(Message::Binary(b"{\"message\": \"hi\"}".to_vec().into())),
            Inbound::Exchange(_)
        ));
        assert!(matches!(classify(Message::Close(None)), Inbound::Closed));
    }

    #[tokio::test]
    async fn malformed_message_recovers_for_the_next_exchange() {
        let client = StubClient::new(vec![Ok(vec!["pong"])]);
        let mut session = session_for(client).await;
        let (tx, mut rx) = mpsc::channel(8);

        // Missing `message` field: one error frame, session stays open.
        let outcome = handle_text(&mut session, r#"{"history": []}"#, &tx).await;
        assert_eq!(outcome, LoopOutcome::Continue);
        let got = frames(&mut rx);
        assert_eq!(got.len(), 1);
        assert!(matches!(got[0], OutboundFrame::Error { .. }));

        // A well-formed exchange still goes through afterwards.
        let outcome = handle_text(&mut session, r#"{"message": "ping"}"#, &tx).await;
        assert_eq!(outcome, LoopOutcome::Continue);
        assert_eq!(
            frames(&mut rx),
            vec![OutboundFrame::token("pong"), OutboundFrame::done()]
        );
    }

    #[tokio::test]
    async fn upstream_fault_emits_one_error_frame_and_closes() {
        let client = StubClient::new(vec![Err(AssistantError::Api {
            status: 500,
            message: "upstream exploded".into(),
        })]);
        let mut session = session_for(client).await;
        let (tx, mut rx) = mpsc::channel(8);

        let outcome = handle_text(&mut session, r#"{"message": "hi"}"#, &tx).await;
        assert_eq!(outcome, LoopOutcome::Close);

        let got = frames(&mut rx);
        let terminals: Vec<_> = got.iter().filter(|f| f.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(terminals[0], OutboundFrame::Error { .. }));
    }

    #[tokio::test]
    async fn disconnect_closes_without_an_error_frame() {
        let client = StubClient::new(vec![Ok(vec!["a", "b", "c"])]);
        let mut session = session_for(client).await;
        let (tx, rx) = mpsc::channel(8);
        drop(rx); // Socket forwarder already gone.

        let outcome = handle_text(&mut session, r#"{"message": "hi"}"#, &tx).await;
        assert_eq!(outcome, LoopOutcome::Close);
    }
}
