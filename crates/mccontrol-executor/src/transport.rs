//! Transport implementations of [`Executor`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use mccontrol_core::{ControlError, Executor, Platform, ProcessTarget, Result, TransportType};

use crate::{command::CommandBuilder, console::ConsoleSession};

/// Default timeout of a one-shot invocation.
pub const ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor backed by a persistent [`ConsoleSession`].
pub struct PersistentExecutor {
    session: Arc<ConsoleSession>,
}

impl PersistentExecutor {
    #[must_use]
    pub const fn new(session: Arc<ConsoleSession>) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> &Arc<ConsoleSession> {
        &self.session
    }
}

#[async_trait]
impl Executor for PersistentExecutor {
    async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    async fn execute(&self, command: &str) -> Result<String> {
        self.session.command(command).await
    }

    async fn disconnect(&self) {
        self.session.disconnect().await;
    }

    fn is_connected(&self) -> bool {
        self.session.is_authenticated()
    }

    fn transport(&self) -> TransportType {
        TransportType::Persistent
    }
}

/// Writes each command to the primary process's stdin. Output is not
/// captured, so `execute` returns an empty string.
pub struct StdinExecutor {
    platform: Arc<dyn Platform>,
    target: ProcessTarget,
    connected: AtomicBool,
}

impl StdinExecutor {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, target: ProcessTarget) -> Self {
        Self {
            platform,
            target,
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Executor for StdinExecutor {
    /// Validates the target only; every command opens a fresh stream.
    async fn connect(&self) -> Result<()> {
        if !self.target.is_complete() {
            return Err(ControlError::Configuration(format!(
                "incomplete stdin target: {}",
                self.target
            )));
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<String> {
        if !self.is_connected() {
            self.connect().await?;
        }
        let payload = Bytes::from(format!("{command}\n"));
        self.platform
            .attach_stdin(&self.target, payload)
            .await
            .map_err(|e| ControlError::Connection(format!("stdin attach to {} failed: {e}", self.target)))?;
        tracing::debug!(target_process = %self.target, "Command written to stdin");
        Ok(String::new())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn transport(&self) -> TransportType {
        TransportType::StdinInject
    }
}

/// How a one-shot invocation reaches the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OneShotMode {
    /// Redirect the command into the primary process's console input.
    #[default]
    ConsoleInput,
    /// Run the command itself as the remote program.
    Direct,
}

/// Runs each command as a short-lived remote invocation.
pub struct OneShotExecutor {
    platform: Arc<dyn Platform>,
    target: ProcessTarget,
    mode: OneShotMode,
    timeout: Duration,
    connected: AtomicBool,
}

impl OneShotExecutor {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, target: ProcessTarget) -> Self {
        Self {
            platform,
            target,
            mode: OneShotMode::default(),
            timeout: ONE_SHOT_TIMEOUT,
            connected: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: OneShotMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> OneShotMode {
        self.mode
    }
}

#[async_trait]
impl Executor for OneShotExecutor {
    /// An empty container is allowed: the platform picks its default.
    async fn connect(&self) -> Result<()> {
        if self.target.namespace.is_empty() || self.target.instance.is_empty() {
            return Err(ControlError::Configuration(format!(
                "incomplete one-shot target: {}",
                self.target
            )));
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<String> {
        if !self.is_connected() {
            self.connect().await?;
        }
        let parts = match self.mode {
            OneShotMode::ConsoleInput => CommandBuilder::console_input(command)?,
            OneShotMode::Direct => CommandBuilder::direct(command)?,
        };

        let output = self
            .platform
            .exec(&self.target, parts.into_argv(), self.timeout)
            .await
            .map_err(|e| ControlError::Connection(format!("one-shot invocation in {} failed: {e}", self.target)))?;

        if output.stdout.is_empty() && !output.stderr.is_empty() {
            return Ok(output.stderr);
        }
        Ok(output.stdout)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn transport(&self) -> TransportType {
        TransportType::OneShot
    }
}
