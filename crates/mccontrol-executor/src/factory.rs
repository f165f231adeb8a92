//! Ordered transport construction with Auto fallback.

use std::{sync::Arc, time::Duration};

use mccontrol_core::{
    ConsoleConnector, ControlError, Executor, Identity, Platform, ProcessTarget, Result,
    RetryPolicy, TransportType,
};
use tokio_util::sync::CancellationToken;

use crate::{
    console::ConsoleSession,
    transport::{ONE_SHOT_TIMEOUT, OneShotExecutor, OneShotMode, PersistentExecutor, StdinExecutor},
};

/// Builds an unconnected executor.
pub type Constructor = Box<dyn Fn() -> Result<Arc<dyn Executor>> + Send + Sync>;

/// Transport parameters shared by every executor a factory builds.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// `None` disables the persistent transport.
    pub console_port: Option<u16>,
    pub console_password: String,
    pub retry: RetryPolicy,
    pub one_shot_mode: OneShotMode,
    pub command_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            console_port: None,
            console_password: String::new(),
            retry: RetryPolicy::default(),
            one_shot_mode: OneShotMode::default(),
            command_timeout: ONE_SHOT_TIMEOUT,
        }
    }
}

/// Ordered list of transport constructors.
///
/// `Auto` walks the list in order and returns the first executor that
/// connects; an explicit type uses only its own entry.
#[derive(Default)]
pub struct ExecutorFactory {
    constructors: Vec<(TransportType, Constructor)>,
}

impl ExecutorFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constructor. Auto tries entries in insertion order.
    #[must_use]
    pub fn with(mut self, transport: TransportType, constructor: Constructor) -> Self {
        self.constructors.push((transport, constructor));
        self
    }

    /// The standard Persistent, StdinInject, OneShot chain for one identity.
    #[must_use]
    pub fn standard(
        platform: &Arc<dyn Platform>,
        connector: &Arc<dyn ConsoleConnector>,
        identity: &Identity,
        target: &ProcessTarget,
        settings: &TransportSettings,
        cancel: &CancellationToken,
    ) -> Self {
        let persistent: Constructor = {
            let connector = Arc::clone(connector);
            let address = identity.address.clone();
            let settings = settings.clone();
            let cancel = cancel.clone();
            Box::new(move || {
                let port = settings.console_port.ok_or_else(|| {
                    ControlError::Configuration("console port is not configured".into())
                })?;
                if address.is_empty() {
                    return Err(ControlError::Configuration("instance has no address".into()));
                }
                let session = ConsoleSession::new(
                    Arc::clone(&connector),
                    address.clone(),
                    port,
                    settings.console_password.clone(),
                    settings.retry,
                    cancel.child_token(),
                );
                Ok(Arc::new(PersistentExecutor::new(Arc::new(session))) as Arc<dyn Executor>)
            })
        };

        let stdin: Constructor = {
            let platform = Arc::clone(platform);
            let target = target.clone();
            Box::new(move || {
                Ok(Arc::new(StdinExecutor::new(Arc::clone(&platform), target.clone()))
                    as Arc<dyn Executor>)
            })
        };

        let one_shot: Constructor = {
            let platform = Arc::clone(platform);
            let target = target.clone();
            let mode = settings.one_shot_mode;
            let timeout = settings.command_timeout;
            Box::new(move || {
                let executor = OneShotExecutor::new(Arc::clone(&platform), target.clone())
                    .with_mode(mode)
                    .with_timeout(timeout);
                Ok(Arc::new(executor) as Arc<dyn Executor>)
            })
        };

        Self::new()
            .with(TransportType::Persistent, persistent)
            .with(TransportType::StdinInject, stdin)
            .with(TransportType::OneShot, one_shot)
    }

    /// Transports in the order Auto tries them.
    #[must_use]
    pub fn transports(&self) -> Vec<TransportType> {
        self.constructors.iter().map(|(t, _)| *t).collect()
    }

    /// Build and connect an executor.
    ///
    /// # Errors
    /// For an explicit type, its construction or connect error, or
    /// `Configuration` if the type is not registered. For `Auto`, the last
    /// candidate's error once every candidate failed.
    pub async fn create(&self, transport: TransportType) -> Result<Arc<dyn Executor>> {
        if transport != TransportType::Auto {
            let (_, constructor) = self
                .constructors
                .iter()
                .find(|(t, _)| *t == transport)
                .ok_or_else(|| {
                    ControlError::Configuration(format!("unsupported transport type: {transport}"))
                })?;
            return connect_with(constructor).await;
        }

        let mut last_error = None;
        for (candidate, constructor) in &self.constructors {
            match connect_with(constructor).await {
                Ok(executor) => {
                    tracing::debug!(transport = %candidate, "Auto selected transport");
                    return Ok(executor);
                }
                Err(ControlError::Cancelled) => return Err(ControlError::Cancelled),
                Err(err) => {
                    tracing::debug!(transport = %candidate, error = %err, "Transport unavailable, trying next");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ControlError::Configuration("no transports registered".into())))
    }
}

async fn connect_with(constructor: &Constructor) -> Result<Arc<dyn Executor>> {
    let executor = constructor()?;
    executor.connect().await?;
    Ok(executor)
}
