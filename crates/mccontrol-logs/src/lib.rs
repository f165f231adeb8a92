//! mccontrol-logs: Game-server log retrieval.
//!
//! Provides:
//! - One-shot fetch with timestamp stripping and partial results on failure
//! - Follow streams with size/time batching, reconnect backoff and
//!   timestamp-cursor catch-up
//! - Log line parsing and batching primitives

pub mod batch;
pub mod engine;
mod follow;
pub mod line;

pub use batch::LineBatcher;
pub use engine::{FollowHandle, LogEngine};
pub use follow::FollowOutcome;
pub use line::{ParsedLine, parse_log_line};
