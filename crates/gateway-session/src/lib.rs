//! Session bookkeeping and the streaming exchange loop.
//!
//! - `SessionRegistry` - process-wide connection → context map
//! - `ChatSession` - per-connection handler driving exchanges end to end

pub mod registry;
pub mod session;

pub use registry::SessionRegistry;
pub use session::{ChatSession, ContextPolicy, ExchangeError};
