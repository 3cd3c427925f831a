//! Capability trait for the exchange telemetry sink.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Handle for one recorded span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanHandle {
    /// Trace this span belongs to.
    pub trace_id: Uuid,
}

impl SpanHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
        }
    }
}

impl Default for SpanHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Fire-and-forget recorder for exchange spans.
///
/// Implementations must swallow their own failures: a telemetry fault is
/// logged, never surfaced to the client-facing control flow. That is why
/// none of these methods return a `Result`.
#[async_trait]
pub trait TelemetryRecorder: Send + Sync {
    /// Open a span with its input and metadata.
    async fn begin_span(&self, name: &str, input: Value, metadata: Value) -> SpanHandle;

    /// Close a span with its output.
    async fn end_span(&self, span: SpanHandle, output: Value);

    /// Flush buffered records before process termination.
    async fn shutdown(&self);
}
