//! Assistants-API implementation of the gateway's conversation client.
//!
//! Speaks the threads / messages / runs surface of an Assistants-v2-shaped
//! API over `reqwest`, and bridges the streaming run's SSE events into the
//! gateway's bounded token channel.

pub mod client;
pub mod wire;

pub use client::{DEFAULT_BASE_URL, OpenAiAssistant};
