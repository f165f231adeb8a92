//! Boundary traits: the orchestration platform, the console protocol, the
//! status ping, and the uniform command executor.

use std::{fmt, pin::Pin, str::FromStr, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::{
    ControlError,
    error::{PlatformError, Result},
    identity::{EndpointInfo, InstanceInfo, ProcessTarget},
};

/// Session identifier.
pub type SessionId = Uuid;

/// Raw byte stream of a log query.
pub type LogReader = Pin<Box<dyn AsyncRead + Send>>;

/// Parameters of one platform log request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRequest {
    pub container: String,
    pub tail_lines: Option<i64>,
    pub since_time: Option<DateTime<Utc>>,
    pub previous: bool,
    pub follow: bool,
    /// Prefix every line with an RFC 3339 timestamp.
    pub timestamps: bool,
}

/// Captured output of a one-shot remote invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Operations consumed from the orchestration platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// List instances matching a label selector.
    async fn list_instances(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<InstanceInfo>, PlatformError>;

    /// List endpoints matching a label selector.
    async fn list_endpoints(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<EndpointInfo>, PlatformError>;

    /// Open a log stream of one instance.
    async fn open_logs(
        &self,
        namespace: &str,
        instance: &str,
        request: &LogRequest,
    ) -> Result<LogReader, PlatformError>;

    /// Write `input` to the stdin of the target's primary process.
    /// Output is not read back.
    async fn attach_stdin(&self, target: &ProcessTarget, input: Bytes) -> Result<(), PlatformError>;

    /// Run a short-lived command in the target, capturing stdout and stderr.
    async fn exec(
        &self,
        target: &ProcessTarget,
        command: Vec<String>,
        timeout: Duration,
    ) -> Result<ExecOutput, PlatformError>;
}

/// Authenticated console protocol connection (one TCP session).
#[async_trait]
pub trait ConsoleClient: Send {
    /// Returns `Ok(false)` when the credential is rejected.
    async fn authenticate(&mut self, credential: &str) -> std::io::Result<bool>;

    async fn command(&mut self, text: &str) -> std::io::Result<String>;

    async fn close(&mut self);
}

/// Factory for console protocol connections.
#[async_trait]
pub trait ConsoleConnector: Send + Sync {
    async fn connect(&self, address: &str, port: u16) -> std::io::Result<Box<dyn ConsoleClient>>;
}

/// Status-ping primitive. Returns the server properties document and the
/// round-trip latency in milliseconds.
#[async_trait]
pub trait StatusPinger: Send + Sync {
    async fn ping(&self, address: &str, port: u16) -> std::io::Result<(serde_json::Value, u64)>;
}

/// Command transport selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Persistent authenticated console session.
    Persistent,
    /// Fire-and-forget write to the process stdin.
    StdinInject,
    /// Short-lived remote shell invocation.
    OneShot,
    /// Try the others in priority order.
    #[default]
    Auto,
}

impl TransportType {
    /// Concrete transports in Auto priority order.
    pub const PRIORITY: [Self; 3] = [Self::Persistent, Self::StdinInject, Self::OneShot];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::StdinInject => "stdin_inject",
            Self::OneShot => "one_shot",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent" | "rcon" => Ok(Self::Persistent),
            "stdin_inject" | "stdin" | "attach" => Ok(Self::StdinInject),
            "one_shot" | "oneshot" | "exec" => Ok(Self::OneShot),
            "auto" | "" => Ok(Self::Auto),
            other => Err(ControlError::Configuration(format!(
                "unsupported transport type: {other}"
            ))),
        }
    }
}

/// Uniform command-execution capability.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Establish (or validate) the transport.
    async fn connect(&self) -> Result<()>;

    /// Execute one command and return its textual response.
    async fn execute(&self, command: &str) -> Result<String>;

    /// Release the transport. Idempotent.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    fn transport(&self) -> TransportType;
}
