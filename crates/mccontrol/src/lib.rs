//! mccontrol: Remote administration of a containerized game server.
//!
//! Provides:
//! - Controller: One handle owning discovery, transports, logs, sessions and status
//! - Command execution with automatic transport fallback and re-targeting
//! - One-shot and follow log retrieval with gap-free reconnection
//! - Long-lived command sessions with idle expiry
//! - Status checks and background monitors
//! - Tracing initialisation

pub mod controller;
pub mod logging;
mod provider;

pub use controller::Controller;
pub use logging::{LogFormat, init_tracing};
pub use provider::IdentityExecutorProvider;

pub use mccontrol_core::{
    CancellationToken, ConsoleClient, ConsoleConnector, ControlError, ControllerConfig, Executor,
    Identity, LogEvent, LogQuery, LogSink, Platform, Result, SessionId, StatusPinger,
    StatusSnapshot, TransportType,
};
pub use mccontrol_logs::{FollowHandle, FollowOutcome};
pub use mccontrol_session::{CommandSession, SessionInfo};
