//! Session manager for long-lived command sessions.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use mccontrol_core::{ControlError, Executor, Result, SessionId, TransportType};
use mccontrol_executor::ExecutorFactory;
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::session::{CommandSession, SessionInfo};

/// Source of connected executors.
#[async_trait]
pub trait ExecutorProvider: Send + Sync {
    /// Build and connect an executor of the requested transport.
    async fn provide(&self, transport: TransportType) -> Result<Arc<dyn Executor>>;
}

#[async_trait]
impl ExecutorProvider for ExecutorFactory {
    async fn provide(&self, transport: TransportType) -> Result<Arc<dyn Executor>> {
        self.create(transport).await
    }
}

#[async_trait]
impl<T: ExecutorProvider + ?Sized> ExecutorProvider for Arc<T> {
    async fn provide(&self, transport: TransportType) -> Result<Arc<dyn Executor>> {
        (**self).provide(transport).await
    }
}

/// Registry of command sessions keyed by generated ID.
pub struct SessionManager<P: ExecutorProvider> {
    provider: P,
    sessions: RwLock<HashMap<SessionId, Arc<CommandSession>>>,
}

impl<P: ExecutorProvider> SessionManager<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create and register a session over a freshly connected executor.
    ///
    /// # Errors
    /// Returns the provider's error if no executor can be connected.
    pub async fn create_session(
        &self,
        idle_timeout: Duration,
        transport: Option<TransportType>,
    ) -> Result<Arc<CommandSession>> {
        let executor = self
            .provider
            .provide(transport.unwrap_or_default())
            .await?;
        let session = Arc::new(CommandSession::new(executor, idle_timeout));

        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));

        tracing::info!(
            session_id = %session.id(),
            transport = %session.transport(),
            idle_timeout_secs = idle_timeout.as_secs(),
            "Session created"
        );
        Ok(session)
    }

    /// Look up a registered session.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the ID is not registered.
    pub async fn get(&self, id: SessionId) -> Result<Arc<CommandSession>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ControlError::SessionNotFound(id))
    }

    /// Execute a command on a session.
    ///
    /// The registry lock is released before the command runs.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for closed or unknown sessions, otherwise
    /// the executor's error.
    pub async fn execute_on(&self, id: SessionId, command: &str) -> Result<String> {
        let session = self.get(id).await?;
        session.touch();
        session.execute(command).await
    }

    /// Close and deregister one session.
    ///
    /// # Errors
    /// Returns `SessionNotFound` if the ID is not registered.
    pub async fn close(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(ControlError::SessionNotFound(id))?;
        session.close().await;
        Ok(())
    }

    /// Close every session. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<CommandSession>> =
            self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in &drained {
            session.close().await;
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Closed all sessions");
        }
        drained.len()
    }

    pub async fn list(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Session snapshots, oldest first.
    pub async fn describe(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> =
            self.sessions.read().await.values().map(|s| s.info()).collect();
        infos.sort_by_key(|info| info.created_at);
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove expired sessions, then disconnect them outside the registry
    /// lock. Returns how many were removed.
    pub async fn sweep_idle(&self) -> usize {
        let expired: Vec<Arc<CommandSession>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.is_expired())
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            tracing::info!(
                session_id = %session.id(),
                idle_secs = session.idle_for().as_secs(),
                "Closing idle session"
            );
            session.close().await;
        }
        expired.len()
    }
}

impl<P: ExecutorProvider + 'static> SessionManager<P> {
    /// Run [`Self::sweep_idle`] every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = manager.sweep_idle().await;
                        if removed > 0 {
                            tracing::debug!(removed, "Idle sweep finished");
                        }
                    }
                }
            }
        })
    }
}
