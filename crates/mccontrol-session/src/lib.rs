//! Session orchestration for long-lived command executors.
//!
//! Provides:
//! - `SessionManager` - Registry keyed by generated session IDs
//! - `CommandSession` - One executor serialized behind its own lock
//! - `ExecutorProvider` - Source of connected executors for new sessions
//! - Idle sweep that closes sessions outside the registry lock

pub mod manager;
pub mod session;

pub use manager::{ExecutorProvider, SessionManager};
pub use session::{CommandSession, SessionInfo};
