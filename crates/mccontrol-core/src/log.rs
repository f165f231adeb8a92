//! Log query parameters and the delivery channel of follow streams.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

/// Default number of lines per delivered batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default maximum time a non-empty batch is held back.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);

/// What to read from the game-server log.
#[derive(Debug, Clone)]
pub struct LogQuery {
    /// Container to read. Empty means the configured container.
    pub container: String,
    /// Only the last N lines. Not reapplied after a reconnect.
    pub tail_lines: Option<i64>,
    pub since_time: Option<DateTime<Utc>>,
    /// End of a follow stream; reaching it terminates without error.
    pub until_time: Option<DateTime<Utc>>,
    /// Read the previous (terminated) instance of the container.
    pub previous: bool,
    pub batch_size: usize,
    pub max_wait: Duration,
    /// External stop signal for follow streams.
    pub stop: Option<CancellationToken>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            container: String::new(),
            tail_lines: None,
            since_time: None,
            until_time: None,
            previous: false,
            batch_size: DEFAULT_BATCH_SIZE,
            max_wait: DEFAULT_MAX_WAIT,
            stop: None,
        }
    }
}

impl LogQuery {
    /// Query for the last `lines` lines.
    #[must_use]
    pub fn tail(lines: i64) -> Self {
        Self {
            tail_lines: Some(lines),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    #[must_use]
    pub const fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since_time = Some(since);
        self
    }

    #[must_use]
    pub const fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until_time = Some(until);
        self
    }

    #[must_use]
    pub const fn previous(mut self, previous: bool) -> Self {
        self.previous = previous;
        self
    }

    #[must_use]
    pub const fn batching(mut self, batch_size: usize, max_wait: Duration) -> Self {
        self.batch_size = batch_size;
        self.max_wait = max_wait;
        self
    }

    #[must_use]
    pub fn stop_on(mut self, stop: CancellationToken) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Batch size with non-positive values replaced by the default.
    #[must_use]
    pub const fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }

    /// Maximum wait with zero replaced by the default.
    #[must_use]
    pub fn effective_max_wait(&self) -> Duration {
        if self.max_wait.is_zero() {
            DEFAULT_MAX_WAIT
        } else {
            self.max_wait
        }
    }
}

/// One delivery from a follow stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// A batch of log lines, timestamps stripped.
    Lines(Vec<String>),
    /// Diagnostic text; the stream continues.
    Status(String),
    /// Terminal failure; always the last event of a stream.
    Error(String),
}

impl LogEvent {
    /// Lines carried by this event, if any.
    #[must_use]
    pub fn lines(&self) -> Option<&[String]> {
        match self {
            Self::Lines(lines) => Some(lines),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Observer receiving follow-stream deliveries.
///
/// Events are delivered in order from the follow task; the next read does
/// not start until `deliver` returns.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn deliver(&self, event: LogEvent);
}

#[async_trait]
impl LogSink for mpsc::UnboundedSender<LogEvent> {
    async fn deliver(&self, event: LogEvent) {
        if self.send(event).is_err() {
            tracing::trace!("Log sink receiver dropped");
        }
    }
}

#[async_trait]
impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    async fn deliver(&self, event: LogEvent) {
        (**self).deliver(event).await;
    }
}

/// Sink paired with a pull-based stream of its events.
#[must_use]
pub fn channel_sink() -> (Arc<dyn LogSink>, UnboundedReceiverStream<LogEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), UnboundedReceiverStream::new(rx))
}
