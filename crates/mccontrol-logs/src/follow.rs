//! Follow-mode state machine.
//!
//! One task owns one `FollowTask`. It moves between reading a live stream,
//! catching up on lines missed while disconnected, and waiting to reconnect,
//! until it is cancelled, stopped, reaches its end time, or gives up.

use std::{io, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use mccontrol_core::{ControlError, LogEvent, LogQuery, LogRequest, LogSink};
use tokio::time::Instant;
use tokio_util::{codec::AnyDelimiterCodecError, sync::CancellationToken};

use crate::{
    batch::LineBatcher,
    engine::{LogEngine, LogLines, MAX_LINE_LENGTH, decode_line},
    line::parse_log_line,
};

/// Error text fragments of interruptions worth a reconnect.
const TRANSIENT_SIGNATURES: [&str; 6] = [
    "connection reset",
    "broken pipe",
    "response body closed",
    "stream closed",
    "unexpected eof",
    "connection aborted",
];

/// How a follow task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowOutcome {
    /// The governing lifecycle was cancelled.
    Cancelled,
    /// The stop signal fired.
    Stopped,
    /// The configured end time passed.
    EndTimeReached,
    /// Reconnecting failed or an unrecoverable read error occurred.
    Failed(String),
}

enum FollowState {
    Reading(LogLines),
    CatchingUp { instance: String },
    Reconnecting { reason: String },
    Terminated(FollowOutcome),
}

/// Why a stream pump returned.
enum PumpEnd {
    Eof,
    Interrupted(String),
    Broken(String),
    Done(FollowOutcome),
}

pub(crate) struct FollowTask {
    engine: LogEngine,
    query: LogQuery,
    sink: Arc<dyn LogSink>,
    stop: CancellationToken,
    batcher: LineBatcher,
    until: Option<Instant>,
    /// Newest timestamp delivered to the sink.
    cursor: Option<DateTime<Utc>>,
    /// Drop lines at or before the cursor until one passes it.
    dedup: bool,
    /// Consecutive reconnect attempts without a delivered line.
    attempt: u32,
    episode_started: Option<Instant>,
}

impl FollowTask {
    pub(crate) fn new(
        engine: LogEngine,
        query: LogQuery,
        sink: Arc<dyn LogSink>,
        stop: CancellationToken,
    ) -> Self {
        let batcher = LineBatcher::new(query.effective_batch_size(), query.effective_max_wait());
        let until = query.until_time.map(deadline_for);
        Self {
            engine,
            query,
            sink,
            stop,
            batcher,
            until,
            cursor: None,
            dedup: false,
            attempt: 0,
            episode_started: None,
        }
    }

    pub(crate) async fn run(mut self, lines: LogLines) -> FollowOutcome {
        let mut state = FollowState::Reading(lines);
        loop {
            state = match state {
                FollowState::Reading(lines) => self.read(lines).await,
                FollowState::CatchingUp { instance } => self.catch_up(&instance).await,
                FollowState::Reconnecting { reason } => self.reconnect(&reason).await,
                FollowState::Terminated(outcome) => {
                    self.finish(&outcome).await;
                    return outcome;
                }
            };
        }
    }

    async fn read(&mut self, mut lines: LogLines) -> FollowState {
        match self.pump(&mut lines).await {
            PumpEnd::Done(outcome) => FollowState::Terminated(outcome),
            PumpEnd::Eof if self.until_passed() => {
                FollowState::Terminated(FollowOutcome::EndTimeReached)
            }
            PumpEnd::Eof => FollowState::Reconnecting {
                reason: "log stream ended unexpectedly".into(),
            },
            PumpEnd::Interrupted(reason) => FollowState::Reconnecting { reason },
            PumpEnd::Broken(reason) => FollowState::Terminated(FollowOutcome::Failed(format!(
                "unrecoverable log stream error: {reason}"
            ))),
        }
    }

    async fn reconnect(&mut self, reason: &str) -> FollowState {
        if self.engine.cancel.is_cancelled() {
            return FollowState::Terminated(FollowOutcome::Cancelled);
        }
        let policy = self.engine.policy;
        let started = *self.episode_started.get_or_insert_with(Instant::now);
        let window_spent = policy.max_window.is_some_and(|window| started.elapsed() >= window);

        if self.attempt >= policy.max_retries || window_spent {
            return FollowState::Terminated(FollowOutcome::Failed(format!(
                "log stream lost after {} reconnect attempts: {reason}",
                self.attempt
            )));
        }

        self.attempt += 1;
        let delay = policy.delay_for(self.attempt);
        tracing::warn!(
            attempt = self.attempt,
            max = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason,
            "Log stream interrupted, reconnecting"
        );
        self.status(format!(
            "log stream interrupted, reconnecting (attempt {}/{}): {reason}",
            self.attempt, policy.max_retries
        ))
        .await;

        tokio::select! {
            biased;
            () = self.engine.cancel.cancelled() => return FollowState::Terminated(FollowOutcome::Cancelled),
            () = self.stop.cancelled() => return FollowState::Terminated(FollowOutcome::Stopped),
            () = sleep_until(self.until) => return FollowState::Terminated(FollowOutcome::EndTimeReached),
            () = tokio::time::sleep(delay) => {}
        }

        let instance = match self.engine.discovery.force_refresh().await {
            Ok(identity) => identity.instance_name,
            Err(ControlError::Cancelled) => return FollowState::Terminated(FollowOutcome::Cancelled),
            Err(err) => {
                self.status(format!("re-discovery before reconnect failed: {err}")).await;
                match self.engine.discovery.identity() {
                    Some(identity) => identity.instance_name,
                    None => {
                        return FollowState::Reconnecting {
                            reason: err.to_string(),
                        };
                    }
                }
            }
        };
        FollowState::CatchingUp { instance }
    }

    async fn catch_up(&mut self, instance: &str) -> FollowState {
        if let Some(cursor) = self.cursor {
            let request = LogRequest {
                tail_lines: None,
                since_time: Some(cursor + TimeDelta::nanoseconds(1)),
                ..self.engine.request_for(&self.query, false)
            };
            match self.engine.open_on(instance, &request).await {
                Ok(mut lines) => {
                    self.dedup = true;
                    match self.pump(&mut lines).await {
                        PumpEnd::Done(outcome) => return FollowState::Terminated(outcome),
                        PumpEnd::Eof => {}
                        PumpEnd::Interrupted(reason) | PumpEnd::Broken(reason) => {
                            self.status(format!("catch-up read failed: {reason}")).await;
                        }
                    }
                    self.flush().await;
                }
                Err(err) => self.status(format!("catch-up failed: {err}")).await,
            }
        }

        let request = LogRequest {
            tail_lines: None,
            since_time: self
                .cursor
                .map(|cursor| cursor + TimeDelta::nanoseconds(1))
                .or(self.query.since_time),
            ..self.engine.request_for(&self.query, true)
        };
        match self.engine.open_on(instance, &request).await {
            Ok(lines) => {
                self.dedup = self.cursor.is_some();
                tracing::info!(instance, attempt = self.attempt, "Log stream re-established");
                self.status("log stream re-established".to_string()).await;
                FollowState::Reading(lines)
            }
            Err(err) => FollowState::Reconnecting {
                reason: format!("reopening follow stream failed: {err}"),
            },
        }
    }

    /// Forward lines from `lines` until the stream ends or a terminal
    /// condition is observed.
    async fn pump(&mut self, lines: &mut LogLines) -> PumpEnd {
        loop {
            let deadline = self.batcher.deadline();
            tokio::select! {
                biased;
                () = self.engine.cancel.cancelled() => return PumpEnd::Done(FollowOutcome::Cancelled),
                () = self.stop.cancelled() => return PumpEnd::Done(FollowOutcome::Stopped),
                () = sleep_until(self.until) => return PumpEnd::Done(FollowOutcome::EndTimeReached),
                () = sleep_until(deadline) => self.flush().await,
                next = lines.next() => match next {
                    Some(Ok(raw)) => self.accept(&decode_line(&raw)).await,
                    Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                        self.status(format!("skipped a log line longer than {MAX_LINE_LENGTH} bytes")).await;
                    }
                    Some(Err(AnyDelimiterCodecError::Io(err))) => {
                        self.flush().await;
                        let reason = err.to_string();
                        return if is_transient(&err) {
                            PumpEnd::Interrupted(reason)
                        } else {
                            PumpEnd::Broken(reason)
                        };
                    }
                    None => {
                        self.flush().await;
                        return PumpEnd::Eof;
                    }
                },
            }
        }
    }

    async fn accept(&mut self, raw: &str) {
        let line = parse_log_line(raw);
        if self.dedup {
            match (line.timestamp, self.cursor) {
                (Some(ts), Some(cursor)) if ts <= cursor => return,
                (Some(_), _) => self.dedup = false,
                (None, _) => {}
            }
        }

        if self.attempt > 0 {
            tracing::debug!(attempts = self.attempt, "Log stream delivering again");
            self.attempt = 0;
            self.episode_started = None;
        }
        if self.batcher.push(line.content, line.timestamp) {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if let Some((lines, newest)) = self.batcher.take() {
            self.sink.deliver(LogEvent::Lines(lines)).await;
            if newest > self.cursor {
                self.cursor = newest;
            }
        }
    }

    async fn status(&self, message: String) {
        self.sink.deliver(LogEvent::Status(message)).await;
    }

    async fn finish(&mut self, outcome: &FollowOutcome) {
        self.flush().await;
        match outcome {
            FollowOutcome::Cancelled => tracing::debug!("Log follow cancelled"),
            FollowOutcome::Stopped => {
                self.status("log follow stopped by stop signal".to_string()).await;
            }
            FollowOutcome::EndTimeReached => {
                self.status("log follow reached its end time".to_string()).await;
            }
            FollowOutcome::Failed(message) => {
                tracing::error!(error = %message, "Log follow failed");
                self.sink.deliver(LogEvent::Error(message.clone())).await;
            }
        }
    }

    fn until_passed(&self) -> bool {
        self.until.is_some_and(|until| Instant::now() >= until)
    }
}

fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    ) {
        return true;
    }
    let message = err.to_string().to_ascii_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| message.contains(sig))
}

/// Map a wall-clock end time onto the runtime clock.
fn deadline_for(until: DateTime<Utc>) -> Instant {
    let now = Instant::now();
    (until - Utc::now()).to_std().map_or(now, |remaining| now + remaining)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use mccontrol_core::{ControllerConfig, ReconnectPolicy, channel_sink};
    use mccontrol_discovery::DiscoveryCache;
    use mccontrol_test_utils::{FakePlatform, LogScript, timestamped};
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::engine::FollowHandle;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap()
    }

    fn line(second: u32) -> String {
        timestamped(at(second), &format!("line {second}"))
    }

    fn engine(platform: &FakePlatform, cancel: &CancellationToken) -> LogEngine {
        let discovery = Arc::new(DiscoveryCache::new(
            Arc::new(platform.clone()),
            &ControllerConfig::default(),
            cancel.clone(),
        ));
        LogEngine::new(Arc::new(platform.clone()), discovery, "minecraft", cancel.clone())
    }

    async fn start(
        engine: &LogEngine,
        query: LogQuery,
    ) -> (FollowHandle, UnboundedReceiverStream<LogEvent>) {
        let (sink, events) = channel_sink();
        let handle = engine.follow(query, sink).await.unwrap();
        (handle, events)
    }

    fn delivered(events: &[LogEvent]) -> Vec<String> {
        events.iter().filter_map(LogEvent::lines).flatten().cloned().collect()
    }

    fn statuses(events: &[LogEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                LogEvent::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_by_size_then_time() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenHang(vec![line(1), line(2), line(3)]));
        let engine = engine(&platform, &CancellationToken::new());

        let query = LogQuery::default().batching(2, Duration::from_secs(1));
        let (handle, mut events) = start(&engine, query).await;

        assert_eq!(events.next().await, Some(LogEvent::Lines(vec!["line 1".into(), "line 2".into()])));
        let before = Instant::now();
        assert_eq!(events.next().await, Some(LogEvent::Lines(vec!["line 3".into()])));
        assert!(before.elapsed() >= Duration::from_millis(900));

        handle.stop();
        assert_eq!(handle.join().await, FollowOutcome::Stopped);
        let rest: Vec<LogEvent> = events.collect().await;
        assert_eq!(statuses(&rest), ["log follow stopped by stop signal"]);

        let (_, request) = platform.log_requests().remove(0);
        assert!(request.follow);
        assert!(request.timestamps);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_utf8_line_does_not_end_follow() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        let mut raw = format!("{}\n", line(1)).into_bytes();
        raw.extend_from_slice(timestamped(at(2), "bad ").as_bytes());
        raw.extend_from_slice(&[0xff, 0xfe]);
        raw.extend_from_slice(format!(" name\n{}\n", line(3)).as_bytes());
        platform.push_logs(LogScript::RawThenHang(raw));
        let engine = engine(&platform, &CancellationToken::new());

        let query = LogQuery::default().batching(3, Duration::from_secs(1));
        let (handle, mut events) = start(&engine, query).await;
        assert_eq!(
            events.next().await,
            Some(LogEvent::Lines(vec![
                "line 1".into(),
                "bad \u{fffd}\u{fffd} name".into(),
                "line 3".into(),
            ]))
        );
        assert!(!handle.is_finished());

        handle.stop();
        assert_eq!(handle.join().await, FollowOutcome::Stopped);
        assert_eq!(platform.log_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_catches_up_without_gaps_or_duplicates() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenError(
            vec![line(1), line(2), line(3)],
            io::ErrorKind::ConnectionReset,
        ));
        // catch-up overlaps the cursor by one line
        platform.push_logs(LogScript::Lines(vec![line(3), line(4), line(5)]));
        // reopened follow stream overlaps the advanced cursor
        platform.push_logs(LogScript::LinesThenHang(vec![line(5), line(6)]));
        let engine = engine(&platform, &CancellationToken::new());

        let query = LogQuery::tail(100).since(at(0)).batching(10, Duration::from_millis(100));
        let (handle, events) = start(&engine, query).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.stop();
        assert_eq!(handle.join().await, FollowOutcome::Stopped);

        let events: Vec<LogEvent> = events.collect().await;
        assert_eq!(
            delivered(&events),
            ["line 1", "line 2", "line 3", "line 4", "line 5", "line 6"]
        );
        let statuses = statuses(&events);
        assert!(statuses[0].contains("attempt 1/5"));
        assert!(statuses.iter().any(|s| s == "log stream re-established"));

        let requests = platform.log_requests();
        assert_eq!(requests.len(), 3);
        let catch_up = &requests[1].1;
        assert!(!catch_up.follow);
        assert_eq!(catch_up.since_time, Some(at(3) + TimeDelta::nanoseconds(1)));
        let reopened = &requests[2].1;
        assert!(reopened.follow);
        assert_eq!(reopened.tail_lines, None);
        assert_eq!(reopened.since_time, Some(at(5) + TimeDelta::nanoseconds(1)));
        assert_eq!(platform.list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_uses_original_start_when_nothing_delivered() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenError(vec![], io::ErrorKind::BrokenPipe));
        platform.push_logs(LogScript::LinesThenHang(vec![line(7)]));
        let engine = engine(&platform, &CancellationToken::new());

        let query = LogQuery::tail(20).since(at(0)).batching(1, Duration::from_secs(1));
        let (handle, mut events) = start(&engine, query).await;
        loop {
            match events.next().await {
                Some(LogEvent::Lines(lines)) => {
                    assert_eq!(lines, ["line 7"]);
                    break;
                }
                Some(_) => {}
                None => panic!("stream ended before the reopened line"),
            }
        }
        handle.stop();
        handle.join().await;

        let requests = platform.log_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].1.since_time, Some(at(0)));
        assert_eq!(requests[1].1.tail_lines, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries_with_backoff() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenError(vec![], io::ErrorKind::ConnectionReset));
        let engine = engine(&platform, &CancellationToken::new());

        let began = Instant::now();
        let (handle, events) = start(&engine, LogQuery::default()).await;
        let outcome = handle.join().await;
        assert!(matches!(outcome, FollowOutcome::Failed(_)));
        // 1 + 2 + 4 + 8 + 16 seconds of backoff
        assert!(began.elapsed() >= Duration::from_secs(31));

        let events: Vec<LogEvent> = events.collect().await;
        assert!(events.last().is_some_and(LogEvent::is_error));
        assert_eq!(events.iter().filter(|e| e.is_error()).count(), 1);
        let attempts = statuses(&events)
            .into_iter()
            .filter(|s| s.starts_with("log stream interrupted"))
            .count();
        assert_eq!(attempts, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminated_source_does_not_loop_forever() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::Lines(vec![line(1)]));
        for _ in 0..10 {
            platform.push_logs(LogScript::Lines(vec![]));
        }
        let engine = engine(&platform, &CancellationToken::new());

        let (handle, events) = start(&engine, LogQuery::default()).await;
        assert!(matches!(handle.join().await, FollowOutcome::Failed(_)));
        let events: Vec<LogEvent> = events.collect().await;
        assert_eq!(delivered(&events), ["line 1"]);
        assert!(events.last().is_some_and(LogEvent::is_error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_reset_after_delivery() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenError(vec![line(1)], io::ErrorKind::ConnectionReset));
        platform.push_logs(LogScript::Lines(vec![]));
        platform.push_logs(LogScript::LinesThenError(vec![line(2)], io::ErrorKind::ConnectionReset));
        platform.push_logs(LogScript::Lines(vec![]));
        platform.push_logs(LogScript::LinesThenHang(vec![line(3)]));
        let engine = engine(&platform, &CancellationToken::new());

        let query = LogQuery::default().batching(1, Duration::from_secs(1));
        let (handle, mut events) = start(&engine, query).await;
        let mut seen = Vec::new();
        while seen.len() < 3 {
            match events.next().await {
                Some(LogEvent::Lines(lines)) => seen.extend(lines),
                Some(event) => assert!(!event.is_error(), "unexpected {event:?}"),
                None => panic!("stream ended early"),
            }
        }
        handle.stop();
        handle.join().await;
        let rest: Vec<LogEvent> = events.collect().await;
        assert_eq!(seen, ["line 1", "line 2", "line 3"]);
        assert!(rest.iter().all(|e| !e.is_error()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_window_caps_episode() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenError(vec![], io::ErrorKind::ConnectionReset));
        let cancel = CancellationToken::new();
        let engine = engine(&platform, &cancel).with_policy(ReconnectPolicy {
            max_retries: 100,
            max_window: Some(Duration::from_secs(10)),
            ..ReconnectPolicy::default()
        });

        let began = Instant::now();
        let (handle, _events) = start(&engine, LogQuery::default()).await;
        assert!(matches!(handle.join().await, FollowOutcome::Failed(_)));
        assert!(began.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_time_flushes_and_terminates() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenHang(vec![line(1)]));
        let engine = engine(&platform, &CancellationToken::new());

        let query = LogQuery::default()
            .until(Utc::now() + TimeDelta::milliseconds(500))
            .batching(10, Duration::from_secs(5));
        let (handle, events) = start(&engine, query).await;
        assert_eq!(handle.join().await, FollowOutcome::EndTimeReached);

        let events: Vec<LogEvent> = events.collect().await;
        assert_eq!(
            events,
            [
                LogEvent::Lines(vec!["line 1".into()]),
                LogEvent::Status("log follow reached its end time".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_cancel_flushes_without_error() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenHang(vec![line(1), line(2)]));
        let cancel = CancellationToken::new();
        let engine = engine(&platform, &cancel);

        let query = LogQuery::default().batching(10, Duration::from_secs(60));
        let (handle, events) = start(&engine, query).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(handle.join().await, FollowOutcome::Cancelled);

        let events: Vec<LogEvent> = events.collect().await;
        assert_eq!(events, [LogEvent::Lines(vec!["line 1".into(), "line 2".into()])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_stop_signal() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenHang(vec![]));
        let engine = engine(&platform, &CancellationToken::new());

        let stop = CancellationToken::new();
        let (handle, _events) = start(&engine, LogQuery::default().stop_on(stop.clone())).await;
        stop.cancel();
        assert_eq!(handle.join().await, FollowOutcome::Stopped);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_terminal() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenError(vec![line(1)], io::ErrorKind::PermissionDenied));
        let engine = engine(&platform, &CancellationToken::new());

        let (handle, events) = start(&engine, LogQuery::default()).await;
        assert!(matches!(handle.join().await, FollowOutcome::Failed(_)));
        let events: Vec<LogEvent> = events.collect().await;
        assert_eq!(events[0], LogEvent::Lines(vec!["line 1".into()]));
        assert!(events[1].is_error());
        assert_eq!(platform.log_requests().len(), 1);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_transient(&io::Error::other("http2: response body closed")));
        assert!(is_transient(&io::Error::other("read: Connection Reset by peer")));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
