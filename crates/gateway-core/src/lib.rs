//! Core abstractions for the streaming conversation gateway.
//!
//! This crate provides the fundamental building blocks:
//! - `Turn`, `ContextId`, `RunStatus` - the remote conversation data model
//! - `OutboundFrame` - typed frames sent to a connected client
//! - `bridge` - bounded hand-off from a run's event producer to its consumer
//! - `ConversationClient` and `TelemetryRecorder` capability traits

pub mod bridge;
pub mod client;
pub mod frame;
pub mod telemetry;
pub mod turn;

pub use bridge::{BridgeConfig, BridgeError, RunEvent, RunSink, RunStream};
pub use client::{AssistantError, ConversationClient};
pub use frame::OutboundFrame;
pub use telemetry::{SpanHandle, TelemetryRecorder};
pub use turn::{ContextId, Role, RunId, RunStatus, Turn};
