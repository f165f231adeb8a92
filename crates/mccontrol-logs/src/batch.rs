//! Size- and time-bounded line batching.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Accumulates lines until `batch_size` is reached or `max_wait` has passed
/// since the previous flush.
#[derive(Debug)]
pub struct LineBatcher {
    lines: Vec<String>,
    newest: Option<DateTime<Utc>>,
    batch_size: usize,
    max_wait: Duration,
    last_flush: Instant,
}

impl LineBatcher {
    #[must_use]
    pub fn new(batch_size: usize, max_wait: Duration) -> Self {
        Self {
            lines: Vec::with_capacity(batch_size),
            newest: None,
            batch_size: batch_size.max(1),
            max_wait,
            last_flush: Instant::now(),
        }
    }

    /// Add a line. Returns `true` when the batch is full.
    pub fn push(&mut self, content: String, timestamp: Option<DateTime<Utc>>) -> bool {
        self.lines.push(content);
        if timestamp > self.newest {
            self.newest = timestamp;
        }
        self.lines.len() >= self.batch_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// When pending lines must be flushed, or `None` if nothing is pending.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        (!self.lines.is_empty()).then(|| self.last_flush + self.max_wait)
    }

    /// Take the pending lines and the newest timestamp among them, and
    /// restart the wait timer.
    pub fn take(&mut self) -> Option<(Vec<String>, Option<DateTime<Utc>>)> {
        self.last_flush = Instant::now();
        if self.lines.is_empty() {
            return None;
        }
        let lines = std::mem::replace(&mut self.lines, Vec::with_capacity(self.batch_size));
        Some((lines, self.newest.take()))
    }
}
