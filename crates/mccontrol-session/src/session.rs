//! A single long-lived command session.

use std::{
    sync::{
        Arc, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use mccontrol_core::{ControlError, Executor, Result, SessionId, TransportType};
use serde::Serialize;
use tokio::{sync::Mutex, time::Instant};
use uuid::Uuid;

/// Snapshot of a session for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub transport: TransportType,
    pub created_at: DateTime<Utc>,
    pub idle_for: Duration,
    pub idle_timeout: Duration,
}

/// An executor owned by the session manager.
///
/// Commands are serialized by `exec_lock`; the registry lock is never held
/// while a command runs.
pub struct CommandSession {
    id: SessionId,
    executor: Arc<dyn Executor>,
    transport: TransportType,
    idle_timeout: Duration,
    created_at: DateTime<Utc>,
    last_used: std::sync::Mutex<Instant>,
    exec_lock: Mutex<()>,
    closed: AtomicBool,
}

impl CommandSession {
    pub(crate) fn new(executor: Arc<dyn Executor>, idle_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport: executor.transport(),
            executor,
            idle_timeout,
            created_at: Utc::now(),
            last_used: std::sync::Mutex::new(Instant::now()),
            exec_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub const fn transport(&self) -> TransportType {
        self.transport
    }

    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the session was last used.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Idle beyond its timeout and not running a command.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.idle_for() > self.idle_timeout && self.exec_lock.try_lock().is_ok()
    }

    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            transport: self.transport,
            created_at: self.created_at,
            idle_for: self.idle_for(),
            idle_timeout: self.idle_timeout,
        }
    }

    /// Execute one command. Concurrent callers queue on the session lock.
    ///
    /// # Errors
    /// Returns `SessionNotFound` once the session is closed, otherwise the
    /// executor's error.
    pub async fn execute(&self, command: &str) -> Result<String> {
        let _guard = self.exec_lock.lock().await;
        if self.is_closed() {
            return Err(ControlError::SessionNotFound(self.id));
        }
        self.touch();
        let response = self.executor.execute(command).await?;
        self.touch();
        Ok(response)
    }

    /// Mark closed and release the executor. Idempotent.
    ///
    /// A command already running is allowed to finish; the executor is
    /// disconnected once it has, and queued commands see the session closed.
    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _guard = self.exec_lock.lock().await;
        self.executor.disconnect().await;
        tracing::debug!(session_id = %self.id, transport = %self.transport, "Session closed");
    }
}
