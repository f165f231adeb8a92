//! Log retrieval entry points.

use std::{borrow::Cow, sync::Arc};

use futures::StreamExt;
use mccontrol_core::{
    ControlError, LogEvent, LogQuery, LogRequest, LogSink, Platform, PlatformError,
    ReconnectPolicy, Result, channel_sink,
};
use mccontrol_discovery::DiscoveryCache;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::{
    codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead},
    sync::CancellationToken,
};

use crate::{
    follow::{FollowOutcome, FollowTask},
    line::parse_log_line,
};

/// Longest accepted log line in bytes.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

pub(crate) type LogLines = FramedRead<mccontrol_core::LogReader, AnyDelimiterCodec>;

fn line_codec() -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_LENGTH)
}

/// Log output is not guaranteed to be UTF-8; invalid sequences become U+FFFD.
pub(crate) fn decode_line(chunk: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(chunk)
}

/// Reads game-server logs through the platform, re-resolving the instance
/// through the discovery cache when a stream cannot be opened.
#[derive(Clone)]
pub struct LogEngine {
    pub(crate) platform: Arc<dyn Platform>,
    pub(crate) discovery: Arc<DiscoveryCache>,
    pub(crate) default_container: String,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) cancel: CancellationToken,
}

impl LogEngine {
    #[must_use]
    pub fn new(
        platform: Arc<dyn Platform>,
        discovery: Arc<DiscoveryCache>,
        default_container: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            platform,
            discovery,
            default_container: default_container.into(),
            policy: ReconnectPolicy::default(),
            cancel,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub(crate) fn container_for(&self, query: &LogQuery) -> String {
        if query.container.is_empty() {
            self.default_container.clone()
        } else {
            query.container.clone()
        }
    }

    pub(crate) fn request_for(&self, query: &LogQuery, follow: bool) -> LogRequest {
        LogRequest {
            container: self.container_for(query),
            tail_lines: query.tail_lines,
            since_time: query.since_time,
            previous: query.previous,
            follow,
            timestamps: true,
        }
    }

    /// Open a stream on a known instance, without re-discovery.
    pub(crate) async fn open_on(
        &self,
        instance: &str,
        request: &LogRequest,
    ) -> Result<LogLines, PlatformError> {
        let reader = self
            .platform
            .open_logs(self.discovery.namespace(), instance, request)
            .await?;
        Ok(FramedRead::new(reader, line_codec()))
    }

    /// Open a stream on the current instance, re-discovering once on failure.
    async fn open(&self, request: &LogRequest) -> Result<LogLines> {
        let identity = self.discovery.current().await?;
        match self.open_on(&identity.instance_name, request).await {
            Ok(lines) => Ok(lines),
            Err(first) => {
                tracing::debug!(instance = %identity.instance_name, error = %first, "Log stream open failed, re-discovering");
                let identity = self.discovery.force_refresh().await.map_err(|e| {
                    ControlError::stream(format!(
                        "opening log stream failed: {first}; re-discovery failed: {e}"
                    ))
                })?;
                self.open_on(&identity.instance_name, request)
                    .await
                    .map_err(|e| {
                        ControlError::stream(format!(
                            "opening log stream failed after re-discovery: {e}"
                        ))
                    })
            }
        }
    }

    /// Read the queried log once, up to the end of the stream.
    ///
    /// Timestamp prefixes are stripped from every line. Bytes that are not
    /// valid UTF-8 are replaced, never fatal.
    ///
    /// # Errors
    /// Returns `Stream` with the lines read so far if reading fails, and
    /// `Discovery` or `Stream` if the stream cannot be opened.
    pub async fn fetch(&self, query: &LogQuery) -> Result<Vec<String>> {
        let request = self.request_for(query, false);
        let mut lines = self.open(&request).await?;
        let mut collected = Vec::new();

        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => return Err(ControlError::Cancelled),
                next = lines.next() => next,
            };
            match next {
                Some(Ok(raw)) => collected.push(parse_log_line(&decode_line(&raw)).content),
                Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                    tracing::warn!(max = MAX_LINE_LENGTH, "Skipping oversized log line");
                }
                Some(Err(AnyDelimiterCodecError::Io(e))) => {
                    return Err(ControlError::Stream {
                        reason: format!("reading log stream failed: {e}"),
                        partial: collected,
                    });
                }
                None => break,
            }
        }

        tracing::debug!(lines = collected.len(), "Log fetch complete");
        Ok(collected)
    }

    /// Start a follow stream delivering to `sink`.
    ///
    /// The first stream is opened before this returns; everything after is
    /// reported through the sink.
    ///
    /// # Errors
    /// Returns the open failure of the first stream.
    pub async fn follow(&self, query: LogQuery, sink: Arc<dyn LogSink>) -> Result<FollowHandle> {
        let request = self.request_for(&query, true);
        let lines = self.open(&request).await?;

        let stop = query
            .stop
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let task = FollowTask::new(self.clone(), query, sink, stop.clone());
        let task = tokio::spawn(task.run(lines));
        Ok(FollowHandle { stop, task })
    }

    /// Start a follow stream consumed as a [`futures::Stream`] of events.
    ///
    /// # Errors
    /// Returns the open failure of the first stream.
    pub async fn follow_stream(
        &self,
        query: LogQuery,
    ) -> Result<(FollowHandle, UnboundedReceiverStream<LogEvent>)> {
        let (sink, events) = channel_sink();
        let handle = self.follow(query, sink).await?;
        Ok((handle, events))
    }
}

/// Handle of a running follow task.
pub struct FollowHandle {
    stop: CancellationToken,
    task: JoinHandle<FollowOutcome>,
}

impl FollowHandle {
    /// Ask the task to flush and stop.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end.
    pub async fn join(self) -> FollowOutcome {
        self.task
            .await
            .unwrap_or_else(|e| FollowOutcome::Failed(format!("follow task aborted: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use chrono::{TimeZone, Utc};
    use mccontrol_core::{ControllerConfig, Phase};
    use mccontrol_test_utils::{FakePlatform, LogScript, instance, timestamped};

    use super::*;

    fn engine_for(platform: &FakePlatform, cancel: &CancellationToken) -> LogEngine {
        let config = ControllerConfig::default();
        let discovery = Arc::new(DiscoveryCache::new(
            Arc::new(platform.clone()),
            &config,
            cancel.clone(),
        ));
        LogEngine::new(Arc::new(platform.clone()), discovery, "minecraft", cancel.clone())
    }

    fn numbered(count: usize) -> Vec<String> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let at = base + chrono::TimeDelta::milliseconds(i64::try_from(i).unwrap());
                timestamped(at, &format!("line {i}"))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_tail_returns_exact_lines() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::Lines(numbered(50)));
        let engine = engine_for(&platform, &CancellationToken::new());

        let lines = engine.fetch(&LogQuery::tail(50)).await.unwrap();
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[0], "line 0");
        assert_eq!(lines[49], "line 49");
        assert!(lines.iter().all(|l| !l.ends_with('\n') && !l.ends_with('\r')));

        let (instance, request) = platform.log_requests().remove(0);
        assert_eq!(instance, "mc-0");
        assert_eq!(request.tail_lines, Some(50));
        assert_eq!(request.container, "minecraft");
        assert!(request.timestamps);
        assert!(!request.follow);
    }

    #[tokio::test]
    async fn test_fetch_read_error_keeps_partial() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::LinesThenError(numbered(3), io::ErrorKind::ConnectionReset));
        let engine = engine_for(&platform, &CancellationToken::new());

        match engine.fetch(&LogQuery::default()).await {
            Err(ControlError::Stream { partial, .. }) => {
                assert_eq!(partial, ["line 0", "line 1", "line 2"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_reopens_after_rescheduling() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::OpenError("pod mc-0 not found".into()));
        platform.push_logs(LogScript::Lines(numbered(2)));
        let engine = engine_for(&platform, &CancellationToken::new());
        engine.discovery.refresh(false).await.unwrap();
        platform.set_instances(vec![instance("mc-1", "10.0.0.9", Phase::Running)]);

        let lines = engine.fetch(&LogQuery::default().container("sidecar")).await.unwrap();
        assert_eq!(lines.len(), 2);
        let requests = platform.log_requests();
        assert_eq!(requests[0].0, "mc-0");
        assert_eq!(requests[1].0, "mc-1");
        assert_eq!(requests[1].1.container, "sidecar");
        assert_eq!(platform.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_keeps_reading_past_invalid_utf8() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        let mut raw = b"2024-05-01T12:00:00Z first\n2024-05-01T12:00:01Z bad ".to_vec();
        raw.extend_from_slice(&[0xff, 0xfe]);
        raw.extend_from_slice(b" name\r\n2024-05-01T12:00:02Z third\n");
        platform.push_logs(LogScript::Raw(raw));
        let engine = engine_for(&platform, &CancellationToken::new());

        let lines = engine.fetch(&LogQuery::default()).await.unwrap();
        assert_eq!(lines, ["first", "bad \u{fffd}\u{fffd} name", "third"]);
    }

    #[tokio::test]
    async fn test_fetch_returns_unterminated_last_line() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        platform.push_logs(LogScript::Raw(b"2024-05-01T12:00:00Z only".to_vec()));
        let engine = engine_for(&platform, &CancellationToken::new());
        assert_eq!(engine.fetch(&LogQuery::default()).await.unwrap(), ["only"]);
    }

    #[tokio::test]
    async fn test_fetch_without_instance_is_discovery_error() {
        let platform = FakePlatform::new();
        let engine = engine_for(&platform, &CancellationToken::new());
        assert!(matches!(
            engine.fetch(&LogQuery::default()).await,
            Err(ControlError::Discovery(_))
        ));
        assert!(platform.log_requests().is_empty());
    }

    #[tokio::test]
    async fn test_follow_open_failure_is_returned() {
        let platform = FakePlatform::with_running("mc-0", "10.0.0.5");
        let engine = engine_for(&platform, &CancellationToken::new());
        let result = engine.follow_stream(LogQuery::default()).await;
        assert!(matches!(result, Err(ControlError::Stream { .. })));
    }
}
