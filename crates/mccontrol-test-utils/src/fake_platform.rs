//! Scripted orchestration platform.

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
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream::BoxStream};
use mccontrol_core::{
    EndpointInfo, ExecOutput, InstanceInfo, LogReader, LogRequest, Phase, Platform, PlatformError,
    ProcessTarget,
};
use tokio_util::io::StreamReader;

/// Response to one `open_logs` call.
#[derive(Debug, Clone)]
pub enum LogScript {
    /// Emit the lines, then end the stream.
    Lines(Vec<String>),
    /// Emit the lines, then fail with an I/O error of the given kind.
    LinesThenError(Vec<String>, io::ErrorKind),
    /// Emit the lines, then stay open without producing more data.
    LinesThenHang(Vec<String>),
    /// Emit the bytes verbatim, then end the stream.
    Raw(Vec<u8>),
    /// Emit the bytes verbatim, then stay open.
    RawThenHang(Vec<u8>),
    /// Fail to open the stream.
    OpenError(String),
}

#[derive(Default)]
struct State {
    instances: Option<Vec<InstanceInfo>>,
    instance_error: Option<String>,
    endpoints: Vec<EndpointInfo>,
    endpoint_error: Option<String>,
    logs: VecDeque<LogScript>,
    log_requests: Vec<(String, LogRequest)>,
    attached: Vec<(ProcessTarget, Bytes)>,
    attach_error: Option<String>,
    executed: Vec<(ProcessTarget, Vec<String>)>,
    exec_outputs: VecDeque<Result<ExecOutput, String>>,
}

/// In-memory [`Platform`] with scripted responses and recorded requests.
#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<State>>,
    list_calls: Arc<AtomicUsize>,
    list_delay: Arc<Mutex<Duration>>,
}

impl FakePlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform with a single running instance.
    #[must_use]
    pub fn with_running(name: &str, address: &str) -> Self {
        let platform = Self::new();
        platform.set_instances(vec![instance(name, address, Phase::Running)]);
        platform
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_instances(&self, instances: Vec<InstanceInfo>) {
        let mut state = self.state();
        state.instances = Some(instances);
        state.instance_error = None;
    }

    pub fn fail_instances(&self, message: &str) {
        self.state().instance_error = Some(message.to_string());
    }

    pub fn set_endpoints(&self, endpoints: Vec<EndpointInfo>) {
        self.state().endpoints = endpoints;
    }

    pub fn fail_endpoints(&self, message: &str) {
        self.state().endpoint_error = Some(message.to_string());
    }

    /// Delay every instance listing, to widen race windows in tests.
    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = delay;
    }

    pub fn push_logs(&self, script: LogScript) {
        self.state().logs.push_back(script);
    }

    pub fn fail_attach(&self, message: &str) {
        self.state().attach_error = Some(message.to_string());
    }

    pub fn push_exec(&self, output: Result<ExecOutput, String>) {
        self.state().exec_outputs.push_back(output);
    }

    /// Number of `list_instances` calls so far.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn log_requests(&self) -> Vec<(String, LogRequest)> {
        self.state().log_requests.clone()
    }

    #[must_use]
    pub fn attached(&self) -> Vec<(ProcessTarget, Bytes)> {
        self.state().attached.clone()
    }

    #[must_use]
    pub fn executed(&self) -> Vec<(ProcessTarget, Vec<String>)> {
        self.state().executed.clone()
    }
}

/// Build an instance record.
#[must_use]
pub fn instance(name: &str, address: &str, phase: Phase) -> InstanceInfo {
    InstanceInfo {
        name: name.to_string(),
        address: address.to_string(),
        phase,
        started_at: None,
    }
}

/// Format a log line the way the platform does with timestamps enabled.
#[must_use]
pub fn timestamped(at: DateTime<Utc>, content: &str) -> String {
    format!("{} {content}", at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
}

fn reader_for(lines: Vec<String>, tail: Tail) -> LogReader {
    let chunks = lines
        .into_iter()
        .map(|line| Bytes::from(format!("{line}\n")))
        .collect();
    reader_from_chunks(chunks, tail)
}

fn reader_from_chunks(chunks: Vec<Bytes>, tail: Tail) -> LogReader {
    let chunks: Vec<io::Result<Bytes>> = chunks.into_iter().map(Ok).collect();
    let body = futures::stream::iter(chunks);
    let stream: BoxStream<'static, io::Result<Bytes>> = match tail {
        Tail::End => body.boxed(),
        Tail::Error(kind) => body
            .chain(futures::stream::once(async move {
                Err(io::Error::new(kind, format!("scripted {kind:?}")))
            }))
            .boxed(),
        Tail::Hang => body.chain(futures::stream::pending()).boxed(),
    };
    Box::pin(StreamReader::new(stream))
}

enum Tail {
    End,
    Error(io::ErrorKind),
    Hang,
}

#[async_trait]
impl Platform for FakePlatform {
    async fn list_instances(
        &self,
        _namespace: &str,
        _selector: &str,
    ) -> Result<Vec<InstanceInfo>, PlatformError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        if let Some(message) = &state.instance_error {
            return Err(PlatformError::Api(message.clone()));
        }
        Ok(state.instances.clone().unwrap_or_default())
    }

    async fn list_endpoints(
        &self,
        _namespace: &str,
        _selector: &str,
    ) -> Result<Vec<EndpointInfo>, PlatformError> {
        let state = self.state();
        if let Some(message) = &state.endpoint_error {
            return Err(PlatformError::Api(message.clone()));
        }
        Ok(state.endpoints.clone())
    }

    async fn open_logs(
        &self,
        _namespace: &str,
        instance: &str,
        request: &LogRequest,
    ) -> Result<LogReader, PlatformError> {
        let script = {
            let mut state = self.state();
            state.log_requests.push((instance.to_string(), request.clone()));
            state.logs.pop_front()
        };
        match script {
            Some(LogScript::Lines(lines)) => Ok(reader_for(lines, Tail::End)),
            Some(LogScript::LinesThenError(lines, kind)) => Ok(reader_for(lines, Tail::Error(kind))),
            Some(LogScript::LinesThenHang(lines)) => Ok(reader_for(lines, Tail::Hang)),
            Some(LogScript::Raw(bytes)) => Ok(reader_from_chunks(vec![Bytes::from(bytes)], Tail::End)),
            Some(LogScript::RawThenHang(bytes)) => {
                Ok(reader_from_chunks(vec![Bytes::from(bytes)], Tail::Hang))
            }
            Some(LogScript::OpenError(message)) => Err(PlatformError::Api(message)),
            None => Err(PlatformError::NotFound("no scripted log response".to_string())),
        }
    }

    async fn attach_stdin(&self, target: &ProcessTarget, input: Bytes) -> Result<(), PlatformError> {
        let mut state = self.state();
        if let Some(message) = &state.attach_error {
            return Err(PlatformError::Api(message.clone()));
        }
        state.attached.push((target.clone(), input));
        Ok(())
    }

    async fn exec(
        &self,
        target: &ProcessTarget,
        command: Vec<String>,
        _timeout: Duration,
    ) -> Result<ExecOutput, PlatformError> {
        let mut state = self.state();
        state.executed.push((target.clone(), command));
        match state.exec_outputs.pop_front() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(PlatformError::Api(message)),
            None => Ok(ExecOutput::default()),
        }
    }
}
