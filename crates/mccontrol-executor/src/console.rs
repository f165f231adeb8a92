//! Persistent console protocol session.

use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU32, Ordering},
};

use mccontrol_core::{ConsoleClient, ConsoleConnector, ControlError, Result, RetryPolicy};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Connection state of a [`ConsoleSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    Connected = 1,
    Authenticated = 2,
}

impl SessionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Authenticated,
            1 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

struct Inner {
    address: String,
    client: Option<Box<dyn ConsoleClient>>,
}

/// One authenticated console connection with bounded command retry.
///
/// `in_flight` is held for a whole command, including its backoff sleeps,
/// so a second caller never interleaves with a retry sequence. `inner` is
/// only held around individual I/O steps.
pub struct ConsoleSession {
    connector: Arc<dyn ConsoleConnector>,
    port: u16,
    password: String,
    policy: RetryPolicy,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
    in_flight: Mutex<()>,
    state: AtomicU8,
    retries: AtomicU32,
}

impl ConsoleSession {
    #[must_use]
    pub fn new(
        connector: Arc<dyn ConsoleConnector>,
        address: impl Into<String>,
        port: u16,
        password: impl Into<String>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            port,
            password: password.into(),
            policy,
            cancel,
            inner: Mutex::new(Inner {
                address: address.into(),
                client: None,
            }),
            in_flight: Mutex::new(()),
            state: AtomicU8::new(SessionState::Disconnected as u8),
            retries: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// Total retries performed across all commands.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    pub async fn address(&self) -> String {
        self.inner.lock().await.address.clone()
    }

    /// Point the session at a new address. An open connection to the old
    /// address is closed; the next command reconnects.
    pub async fn set_address(&self, address: &str) {
        let mut inner = self.inner.lock().await;
        if inner.address == address {
            return;
        }
        tracing::info!(from = %inner.address, to = %address, "Re-targeting console session");
        inner.address = address.to_string();
        self.close_client(&mut inner).await;
    }

    /// Connect and authenticate. No-op when already authenticated.
    ///
    /// # Errors
    /// Returns `Connection` if the transport cannot be opened and
    /// `Authentication` if the credential is rejected.
    pub async fn connect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.connect_locked(&mut inner).await
    }

    async fn connect_locked(&self, inner: &mut Inner) -> Result<()> {
        if self.is_authenticated() && inner.client.is_some() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(ControlError::Cancelled);
        }
        self.close_client(inner).await;

        let mut client = self
            .connector
            .connect(&inner.address, self.port)
            .await
            .map_err(|e| {
                ControlError::Connection(format!("{}:{}: {e}", inner.address, self.port))
            })?;
        self.set_state(SessionState::Connected);

        match client.authenticate(&self.password).await {
            Ok(true) => {
                inner.client = Some(client);
                self.set_state(SessionState::Authenticated);
                tracing::debug!(address = %inner.address, port = self.port, "Console session authenticated");
                Ok(())
            }
            Ok(false) => {
                client.close().await;
                self.set_state(SessionState::Disconnected);
                Err(ControlError::Authentication("console credential rejected".into()))
            }
            Err(e) => {
                client.close().await;
                self.set_state(SessionState::Disconnected);
                Err(ControlError::Connection(format!("authentication exchange failed: {e}")))
            }
        }
    }

    async fn close_client(&self, inner: &mut Inner) {
        if let Some(mut client) = inner.client.take() {
            client.close().await;
        }
        self.set_state(SessionState::Disconnected);
    }

    async fn attempt(&self, text: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        self.connect_locked(&mut inner).await?;
        let Some(client) = inner.client.as_mut() else {
            return Err(ControlError::Connection("console client missing".into()));
        };
        let result = client.command(text).await;
        match result {
            Ok(response) => Ok(response),
            Err(e) => {
                self.close_client(&mut inner).await;
                Err(ControlError::Connection(format!("console command failed: {e}")))
            }
        }
    }

    /// Execute one command, reconnecting with backoff on transient failure.
    ///
    /// # Errors
    /// Returns `Authentication` without retrying, `Cancelled` when the
    /// lifecycle ends, and `CommandExecution` once retries are exhausted.
    pub async fn command(&self, text: &str) -> Result<String> {
        let _in_flight = self.in_flight.lock().await;

        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ControlError::Cancelled);
            }
            let err = match self.attempt(text).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_terminal() => return Err(err),
                Err(err) => err,
            };

            if attempt >= self.policy.max_retries {
                tracing::warn!(attempts = attempt + 1, error = %err, "Console command retries exhausted");
                return Err(ControlError::CommandExecution {
                    attempts: attempt + 1,
                    source: Box::new(err),
                });
            }

            let delay = self.policy.delay_for(attempt);
            attempt += 1;
            self.retries.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Console command failed, retrying"
            );

            tokio::select! {
                () = self.cancel.cancelled() => return Err(ControlError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Close the connection. Idempotent.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.close_client(&mut inner).await;
    }
}
