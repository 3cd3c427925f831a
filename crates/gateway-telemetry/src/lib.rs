//! Fire-and-forget recorders for exchange telemetry.
//!
//! All recorders uphold the same contract: their own failures are logged
//! and swallowed, never surfaced to the exchange control flow.

pub mod langfuse;
pub mod memory;
pub mod noop;

pub use langfuse::{LangfuseConfig, LangfuseRecorder};
pub use memory::MemoryRecorder;
pub use noop::NoopRecorder;
