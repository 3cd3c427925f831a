//! Recorder that records nothing (telemetry disabled).

use async_trait::async_trait;
use gateway_core::{SpanHandle, TelemetryRecorder};
use serde_json::Value;

/// Disabled telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

#[async_trait]
impl TelemetryRecorder for NoopRecorder {
    async fn begin_span(&self, _name: &str, _input: Value, _metadata: Value) -> SpanHandle {
        SpanHandle::new()
    }

    async fn end_span(&self, _span: SpanHandle, _output: Value) {}

    async fn shutdown(&self) {}
}
