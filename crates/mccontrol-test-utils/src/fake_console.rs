//! Scripted console protocol server.

use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mccontrol_core::{ConsoleClient, ConsoleConnector};

/// Outcome of one command on a fake console connection.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Reply(String),
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct Script {
    refuse_connects: usize,
    commands: VecDeque<CommandOutcome>,
    command_delay: Duration,
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    auths: AtomicUsize,
    commands: AtomicUsize,
    closes: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// In-memory [`ConsoleConnector`] accepting one password.
#[derive(Clone)]
pub struct FakeConsole {
    password: Arc<String>,
    script: Arc<Mutex<Script>>,
    counters: Arc<Counters>,
}

impl FakeConsole {
    #[must_use]
    pub fn new(password: &str) -> Self {
        Self {
            password: Arc::new(password.to_string()),
            script: Arc::new(Mutex::new(Script::default())),
            counters: Arc::new(Counters::default()),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_connects(&self, count: usize) {
        self.script().refuse_connects = count;
    }

    /// Queue command outcomes; once drained, commands echo `ok: <command>`.
    pub fn push_commands(&self, outcomes: impl IntoIterator<Item = CommandOutcome>) {
        self.script().commands.extend(outcomes);
    }

    /// Delay every command, to widen race windows in tests.
    pub fn set_command_delay(&self, delay: Duration) {
        self.script().command_delay = delay;
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn auths(&self) -> usize {
        self.counters.auths.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn commands(&self) -> usize {
        self.counters.commands.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Highest number of commands observed in flight at once.
    #[must_use]
    pub fn max_concurrent_commands(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsoleConnector for FakeConsole {
    async fn connect(&self, _address: &str, _port: u16) -> io::Result<Box<dyn ConsoleClient>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        {
            let mut script = self.script();
            if script.refuse_connects > 0 {
                script.refuse_connects -= 1;
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
            }
        }
        Ok(Box::new(FakeClient {
            console: self.clone(),
            open: true,
        }))
    }
}

struct FakeClient {
    console: FakeConsole,
    open: bool,
}

#[async_trait]
impl ConsoleClient for FakeClient {
    async fn authenticate(&mut self, credential: &str) -> io::Result<bool> {
        self.console.counters.auths.fetch_add(1, Ordering::SeqCst);
        Ok(credential == self.console.password.as_str())
    }

    async fn command(&mut self, text: &str) -> io::Result<String> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "client closed"));
        }
        let counters = &self.console.counters;
        counters.commands.fetch_add(1, Ordering::SeqCst);
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_active.fetch_max(active, Ordering::SeqCst);

        let (outcome, delay) = {
            let mut script = self.console.script();
            (script.commands.pop_front(), script.command_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        counters.active.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Some(CommandOutcome::Reply(reply)) => Ok(reply),
            Some(CommandOutcome::Fail(kind)) => {
                self.open = false;
                Err(io::Error::new(kind, format!("scripted {kind:?}")))
            }
            None => Ok(format!("ok: {text}")),
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
        }
        self.console.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}
