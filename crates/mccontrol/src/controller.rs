//! The controller facade.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use mccontrol_core::{
    ConsoleConnector, ControlError, ControllerConfig, Executor, Identity, LogEvent, LogQuery,
    LogSink, Platform, Result, RetryPolicy, ServerProperties, SessionId, StatusPinger,
    StatusSnapshot, TransportType,
};
use mccontrol_discovery::DiscoveryCache;
use mccontrol_executor::ConsoleSession;
use mccontrol_logs::{FollowHandle, LogEngine};
use mccontrol_session::{CommandSession, ExecutorProvider, SessionInfo, SessionManager};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::provider::IdentityExecutorProvider;

struct Inner {
    config: ControllerConfig,
    connector: Arc<dyn ConsoleConnector>,
    pinger: Arc<dyn StatusPinger>,
    discovery: Arc<DiscoveryCache>,
    provider: Arc<IdentityExecutorProvider>,
    logs: LogEngine,
    sessions: Arc<SessionManager<Arc<IdentityExecutorProvider>>>,
    console: Mutex<Option<Arc<ConsoleSession>>>,
    status: RwLock<StatusSnapshot>,
    status_check: Mutex<()>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

/// Handle to one administered game server.
///
/// Cheap to clone; every clone shares the same lifecycle. Dropping the last
/// clone does not stop background tasks, [`Controller::shutdown`] does.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// Validate the configuration, wire every component and start the idle
    /// session sweeper.
    ///
    /// A failing initial discovery is logged and retried on first use.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid.
    pub async fn start(
        config: ControllerConfig,
        platform: Arc<dyn Platform>,
        connector: Arc<dyn ConsoleConnector>,
        pinger: Arc<dyn StatusPinger>,
    ) -> Result<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();

        let discovery = Arc::new(DiscoveryCache::new(
            Arc::clone(&platform),
            &config,
            cancel.child_token(),
        ));
        let provider = Arc::new(IdentityExecutorProvider::new(
            Arc::clone(&platform),
            Arc::clone(&connector),
            Arc::clone(&discovery),
            &config,
            cancel.child_token(),
        ));
        let logs = LogEngine::new(
            Arc::clone(&platform),
            Arc::clone(&discovery),
            config.container_name.clone(),
            cancel.child_token(),
        );
        let sessions = Arc::new(SessionManager::new(Arc::clone(&provider)));

        let tasks = TaskTracker::new();
        let sweep_interval = match config.session_sweep_interval() {
            d if d.is_zero() => Duration::from_secs(300),
            d => d,
        };
        let sweeper = sessions.spawn_sweeper(sweep_interval, cancel.child_token());
        tasks.spawn(watch_task("session sweeper", sweeper));

        if let Err(e) = discovery.refresh(false).await {
            tracing::warn!(error = %e, "Initial discovery failed, will retry on first use");
        }
        tracing::info!(
            namespace = %config.namespace,
            selector = %config.instance_selector,
            console_port = ?config.console_port(),
            "Controller started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                connector,
                pinger,
                discovery,
                provider,
                logs,
                sessions,
                console: Mutex::new(None),
                status: RwLock::new(StatusSnapshot::default()),
                status_check: Mutex::new(()),
                tasks,
                cancel,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// The lifecycle token. Cancelling it stops every task of this controller.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            Err(ControlError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Last discovered identity, without refreshing.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.inner.discovery.identity()
    }

    /// Refresh the identity now, regardless of the refresh interval.
    ///
    /// # Errors
    /// Returns `Discovery` if no instance matches.
    pub async fn force_refresh_identity(&self) -> Result<Identity> {
        self.inner.discovery.force_refresh().await
    }

    /// Change the minimum time between unforced refreshes. Zero restores
    /// the default of five minutes.
    pub fn set_identity_refresh_interval(&self, interval: Duration) {
        self.inner.discovery.set_interval(interval);
    }

    /// Build and connect an executor of the given transport.
    ///
    /// The caller owns the executor and must disconnect it.
    ///
    /// # Errors
    /// Returns `Configuration` for an unusable explicit transport, otherwise
    /// the connect error of the last transport tried.
    pub async fn create_executor(&self, transport: TransportType) -> Result<Arc<dyn Executor>> {
        self.ensure_running()?;
        self.inner.provider.provide(transport).await
    }

    async fn execute_once(&self, command: &str) -> Result<String> {
        let executor = self.inner.provider.provide(TransportType::Auto).await?;
        let result = executor.execute(command).await;
        executor.disconnect().await;
        result
    }

    /// Execute one command on a fresh Auto executor, released afterwards.
    ///
    /// On a non-terminal failure the identity is re-discovered; if the
    /// instance moved, the command is retried once against the new one.
    ///
    /// # Errors
    /// Returns the failure of the last attempt.
    pub async fn execute_command(&self, command: &str) -> Result<String> {
        self.ensure_running()?;
        let first = match self.execute_once(command).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => e,
        };

        let previous = self.inner.discovery.identity();
        let Ok(current) = self.inner.discovery.force_refresh().await else {
            return Err(first);
        };
        if previous.is_some_and(|p| !current.differs_from(&p)) {
            return Err(first);
        }

        tracing::info!(
            instance = %current.instance_name,
            error = %first,
            "Instance moved, retrying command"
        );
        self.execute_once(command).await
    }

    /// Execute on the controller's own long-lived console session, created
    /// on first use and re-targeted when the instance address changes.
    ///
    /// # Errors
    /// Returns `Configuration` when the console port is disabled, otherwise
    /// the discovery or console session error.
    pub async fn execute_console_command(&self, command: &str) -> Result<String> {
        self.ensure_running()?;
        let port = self.inner.config.console_port().ok_or_else(|| {
            ControlError::Configuration("console port is not configured".into())
        })?;
        let identity = self.inner.discovery.current().await?;

        let session = {
            let mut slot = self.inner.console.lock().await;
            match slot.as_ref() {
                Some(session) => Arc::clone(session),
                None => {
                    let session = Arc::new(ConsoleSession::new(
                        Arc::clone(&self.inner.connector),
                        identity.address.clone(),
                        port,
                        self.inner.config.console_password.clone(),
                        RetryPolicy::default(),
                        self.inner.cancel.child_token(),
                    ));
                    *slot = Some(Arc::clone(&session));
                    session
                }
            }
        };
        session.set_address(&identity.address).await;
        session.command(command).await
    }

    /// Read the queried log once.
    ///
    /// # Errors
    /// Returns `Stream` with the lines read so far on a read failure.
    pub async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<String>> {
        self.ensure_running()?;
        self.inner.logs.fetch(query).await
    }

    /// Follow the queried log, delivering events to `sink`.
    ///
    /// # Errors
    /// Returns the failure to open the first stream.
    pub async fn follow_logs(&self, query: LogQuery, sink: Arc<dyn LogSink>) -> Result<FollowHandle> {
        self.ensure_running()?;
        self.inner.logs.follow(query, sink).await
    }

    /// Follow the queried log as a stream of events.
    ///
    /// # Errors
    /// Returns the failure to open the first stream.
    pub async fn follow_logs_stream(
        &self,
        query: LogQuery,
    ) -> Result<(FollowHandle, UnboundedReceiverStream<LogEvent>)> {
        self.ensure_running()?;
        self.inner.logs.follow_stream(query).await
    }

    /// Last recorded status, without checking.
    #[must_use]
    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_status<T>(&self, f: impl FnOnce(&mut StatusSnapshot) -> T) -> T {
        f(&mut self.inner.status.write().unwrap_or_else(PoisonError::into_inner))
    }

    async fn ping(&self, identity: &Identity) -> std::result::Result<(ServerProperties, u64), String> {
        let port = self.inner.config.game_port;
        let ping = self.inner.pinger.ping(&identity.address, port);
        let (document, latency) = tokio::select! {
            () = self.inner.cancel.cancelled() => return Err(ControlError::Cancelled.to_string()),
            result = tokio::time::timeout(self.inner.config.command_timeout(), ping) => match result {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(format!("ping {}:{port} failed: {e}", identity.address)),
                Err(_) => return Err(format!("ping {}:{port} timed out", identity.address)),
            },
        };
        let properties = ServerProperties::from_value(document)
            .map_err(|e| format!("invalid status document: {e}"))?;
        Ok((properties, latency))
    }

    /// Ping the server and update the shared snapshot.
    ///
    /// An unreachable server is not an error: the snapshot is marked offline
    /// and returned. A failed ping is retried once after re-discovery.
    ///
    /// # Errors
    /// Returns the discovery error if the instance cannot be resolved; it is
    /// also recorded in the snapshot.
    pub async fn check_status(&self) -> Result<StatusSnapshot> {
        self.ensure_running()?;
        let _guard = self.inner.status_check.lock().await;

        let mut identity = match self.inner.discovery.current().await {
            Ok(identity) => identity,
            Err(e) => {
                self.update_status(|s| s.last_error = Some(e.to_string()));
                return Err(e);
            }
        };

        let mut outcome = self.ping(&identity).await;
        if let Err(first) = &outcome {
            match self.inner.discovery.force_refresh().await {
                Ok(fresh) => {
                    tracing::debug!(error = %first, instance = %fresh.instance_name, "Ping failed, retrying after re-discovery");
                    identity = fresh;
                    outcome = self
                        .ping(&identity)
                        .await
                        .map_err(|e| format!("ping failed even after re-discovery: {e}"));
                }
                Err(e) => tracing::debug!(error = %e, "Re-discovery after failed ping failed"),
            }
        }

        Ok(self.update_status(|snapshot| {
            snapshot.apply_identity(&identity);
            match &outcome {
                Ok((properties, latency)) => snapshot.apply_ping(properties, *latency),
                Err(message) => snapshot.mark_offline(message.clone()),
            }
            snapshot.clone()
        }))
    }

    /// Check status every `interval` until shutdown.
    pub fn start_status_monitoring(&self, interval: Duration) {
        let controller = self.clone();
        let cancel = self.inner.cancel.clone();
        self.inner.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = controller.check_status().await {
                            tracing::debug!(error = %e, "Status check failed");
                        }
                    }
                }
            }
        });
    }

    /// Force an identity refresh every `interval` until shutdown. Zero uses
    /// the configured refresh interval.
    pub fn start_identity_monitoring(&self, interval: Duration) {
        let interval = if interval.is_zero() {
            self.inner.discovery.interval()
        } else {
            interval
        };
        let discovery = Arc::clone(&self.inner.discovery);
        let cancel = self.inner.cancel.clone();
        self.inner.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = discovery.refresh(true).await {
                            tracing::debug!(error = %e, "Background identity refresh failed");
                        }
                    }
                }
            }
        });
    }

    /// Open a long-lived session, Auto transport unless one is given.
    ///
    /// # Errors
    /// Returns the executor connect error.
    pub async fn create_session(
        &self,
        idle_timeout: Duration,
        transport: Option<TransportType>,
    ) -> Result<Arc<CommandSession>> {
        self.ensure_running()?;
        self.inner.sessions.create_session(idle_timeout, transport).await
    }

    /// # Errors
    /// Returns `SessionNotFound` for unknown or closed sessions.
    pub async fn session_execute(&self, id: SessionId, command: &str) -> Result<String> {
        self.inner.sessions.execute_on(id, command).await
    }

    /// # Errors
    /// Returns `SessionNotFound` if the session is not registered.
    pub async fn close_session(&self, id: SessionId) -> Result<()> {
        self.inner.sessions.close(id).await
    }

    pub async fn close_all_sessions(&self) -> usize {
        self.inner.sessions.close_all().await
    }

    pub async fn list_sessions(&self) -> Vec<SessionId> {
        self.inner.sessions.list().await
    }

    pub async fn describe_sessions(&self) -> Vec<SessionInfo> {
        self.inner.sessions.describe().await
    }

    /// Close idle sessions now instead of waiting for the sweeper.
    pub async fn sweep_idle_sessions(&self) -> usize {
        self.inner.sessions.sweep_idle().await
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Cancel the lifecycle, wait for background tasks and release every
    /// persistent connection. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        if let Some(console) = self.inner.console.lock().await.take() {
            console.disconnect().await;
        }
        let closed = self.inner.sessions.close_all().await;
        tracing::info!(sessions_closed = closed, "Controller shut down");
    }
}

/// Await a background task and log it if it panicked or was aborted.
async fn watch_task(name: &'static str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        tracing::error!(task = name, error = %e, panicked = e.is_panic(), "Background task failed");
    }
}

#[cfg(test)]
mod tests {
    use mccontrol_test_utils::{FakeConsole, FakePinger, FakePlatform};

    use super::*;

    async fn controller(platform: &FakePlatform) -> Controller {
        let config = ControllerConfig {
            console_password: "secret".into(),
            ..ControllerConfig::default()
        };
        Controller::start(
            config,
            Arc::new(platform.clone()),
            Arc::new(FakeConsole::new("secret")),
            Arc::new(FakePinger::new()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = ControllerConfig {
            namespace: String::new(),
            ..ControllerConfig::default()
        };
        let result = Controller::start(
            config,
            Arc::new(FakePlatform::new()),
            Arc::new(FakeConsole::new("secret")),
            Arc::new(FakePinger::new()),
        )
        .await;
        assert!(matches!(result, Err(ControlError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_start_tolerates_failed_discovery() {
        let platform = FakePlatform::new();
        let controller = controller(&platform).await;
        assert!(controller.identity().is_none());
        assert_eq!(platform.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_operations_fail_after_shutdown() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        let controller = controller(&platform).await;
        controller.shutdown().await;
        controller.shutdown().await;
        assert!(controller.is_shut_down());
        assert!(matches!(
            controller.execute_command("list").await,
            Err(ControlError::Cancelled)
        ));
        assert!(matches!(
            controller.create_session(Duration::from_secs(1), None).await,
            Err(ControlError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_refresh_interval_zero_restores_default() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        let controller = controller(&platform).await;
        controller.set_identity_refresh_interval(Duration::from_secs(10));
        assert_eq!(controller.inner.discovery.interval(), Duration::from_secs(10));
        controller.set_identity_refresh_interval(Duration::ZERO);
        assert_eq!(controller.inner.discovery.interval(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_watch_task_absorbs_panicked_task() {
        let handle = tokio::spawn(async { panic!("sweep failed") });
        let tracker = TaskTracker::new();
        tracker.spawn(watch_task("session sweeper", handle));
        tracker.close();
        tracker.wait().await;
        assert!(tracker.is_empty());
    }
}
