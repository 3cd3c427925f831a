//! In-memory recorder, useful for tests and local inspection.

use std::sync::RwLock;

use async_trait::async_trait;
use gateway_core::{SpanHandle, TelemetryRecorder};
use serde_json::Value;
use uuid::Uuid;

/// One recorded span.
#[derive(Debug, Clone)]
pub struct RecordedSpan {
    pub trace_id: Uuid,
    pub name: String,
    pub input: Value,
    pub metadata: Value,
    pub output: Option<Value>,
}

/// Recorder keeping all spans in process memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    spans: RwLock<Vec<RecordedSpan>>,
}

impl MemoryRecorder {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans.read().unwrap().clone()
    }
}

#[async_trait]
impl TelemetryRecorder for MemoryRecorder {
    async fn begin_span(&self, name: &str, input: Value, metadata: Value) -> SpanHandle {
        let handle = SpanHandle::new();
        self.spans.write().unwrap().push(RecordedSpan {
            trace_id: handle.trace_id,
            name: name.to_string(),
            input,
            metadata,
            output: None,
        });
        handle
    }

    async fn end_span(&self, span: SpanHandle, output: Value) {
        let mut spans = self.spans.write().unwrap();
        if let Some(recorded) = spans.iter_mut().find(|s| s.trace_id == span.trace_id) {
            recorded.output = Some(output);
        }
    }

    async fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn records_begin_and_end() {
        let recorder = MemoryRecorder::new();

        let span = recorder
            .begin_span("chat.exchange", json!({"message": "hi"}), json!({}))
            .await;
        recorder.end_span(span, json!({"reply": "hello"})).await;

        let spans = recorder.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "chat.exchange");
        assert_eq!(spans[0].output.as_ref().unwrap()["reply"], "hello");
    }

    #[tokio::test]
    async fn end_span_for_unknown_trace_is_a_no_op() {
        let recorder = MemoryRecorder::new();
        recorder
            .end_span(SpanHandle::new(), json!({"reply": "?"}))
            .await;
        assert!(recorder.spans().is_empty());
    }
}
