//! Core abstractions for remote game-server administration.
//!
//! This crate provides the fundamental building blocks:
//! - `ControllerConfig` - Configuration surface and retry policies
//! - `ControlError` - Error taxonomy shared by every component
//! - `Identity` - Discovered binding of a selector to one instance
//! - `Platform`, `ConsoleConnector`, `StatusPinger` - External boundaries
//! - `Executor` - Uniform command-execution capability
//! - `LogQuery`, `LogEvent`, `LogSink` - Log retrieval and delivery types

pub mod config;
pub mod error;
pub mod identity;
pub mod log;
pub mod status;
pub mod traits;

pub use config::{ControllerConfig, ReconnectPolicy, RetryPolicy, RunMode};
pub use error::{ControlError, PlatformError, Result};
pub use identity::{EndpointInfo, EndpointKind, EndpointPort, Identity, InstanceInfo, Phase, ProcessTarget};
pub use log::{LogEvent, LogQuery, LogSink, channel_sink};
pub use status::{ServerProperties, StatusSnapshot};
pub use traits::{
    ConsoleClient, ConsoleConnector, ExecOutput, Executor, LogReader, LogRequest, Platform,
    SessionId, StatusPinger, TransportType,
};

/// Cancellation handle governing the controller lifecycle.
pub use tokio_util::sync::CancellationToken;
