//! # Core Runtime
//!
//! Ambient runtime services shared by the sync engine:
//!
//! - **Event Bus** (`events`): typed broadcast channel used as the
//!   fire-and-forget notification sink for sync and per-item events
//! - **Logging** (`logging`): `tracing` subscriber bootstrap with env-filter
//!   support and pretty/JSON output formats

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Result, RuntimeError};
pub use events::{CoreEvent, EventBus, ItemAction, ItemEvent, SyncEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
