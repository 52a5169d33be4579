//! Shared helpers for session tests: a scripted remote profiler and payloads
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpuscope::capture::Capture;
use cpuscope::domain::{ParseError, Timestamp};
use cpuscope::parsing::{check_cancelled, CancellationToken, ParseTrace, TraceParser};
use cpuscope::remote::{ManualClock, RemoteProfilingClient};
use cpuscope::session::{CaptureSession, SessionEvent};
use cpuscope::config::SessionConfig;
use cpuscope_common::{
    FetchTraceResponse, ProfilingConfiguration, ProfilingStateResponse, SaveTraceResponse,
    StartResponse, StopResponse, TargetRef, TraceId, TraceInfo, TraceInfoResponse, TracePayload,
    TRACE_FORMAT_INSTRUMENTED,
};
use crossbeam_channel::{Receiver, Sender};

pub const WAIT: Duration = Duration::from_secs(10);

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn fixture_payload(name: &str, format_tag: u32) -> TracePayload {
    TracePayload::new(std::fs::read(fixture(name)).unwrap(), format_tag)
}

/// A valid single-thread instrumented trace, padded to exactly 1024 bytes
pub fn single_thread_trace_1k() -> TracePayload {
    let mut json = String::from(
        r#"{"traceEvents": [
            {"ph": "M", "name": "thread_name", "tid": 7, "args": {"name": "main"}},
            {"ph": "X", "name": "Application.onCreate", "tid": 7, "ts": 1000, "dur": 5000},
            {"ph": "X", "name": "Dex.load", "tid": 7, "ts": 1200, "dur": 2000}
        ]}"#,
    );
    assert!(json.len() <= 1024);
    // Trailing whitespace is still valid JSON
    json.extend(std::iter::repeat(' ').take(1024 - json.len()));
    assert_eq!(json.len(), 1024);
    TracePayload::new(json.into_bytes(), TRACE_FORMAT_INSTRUMENTED)
}

pub fn target() -> TargetRef {
    TargetRef { pid: 4242, name: "com.example.app".to_string(), feature_level: 30 }
}

/// Remote profiler that answers from queues set up by the test
#[derive(Default)]
pub struct ScriptedClient {
    start: Mutex<VecDeque<StartResponse>>,
    stop: Mutex<VecDeque<StopResponse>>,
    state: Mutex<Option<ProfilingStateResponse>>,
    traces: Mutex<HashMap<TraceId, TracePayload>>,
    saved: Mutex<Vec<TraceInfo>>,
    started_with: Mutex<Vec<ProfilingConfiguration>>,
    panic_on_start: Mutex<bool>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_start(&self, response: StartResponse) {
        self.start.lock().unwrap().push_back(response);
    }

    pub fn push_stop(&self, response: StopResponse) {
        self.stop.lock().unwrap().push_back(response);
    }

    pub fn push_stop_trace(&self, trace_id: i64, payload: TracePayload) {
        self.push_stop(StopResponse::Success { trace_id: TraceId(trace_id), payload });
    }

    pub fn set_state(&self, response: ProfilingStateResponse) {
        *self.state.lock().unwrap() = Some(response);
    }

    pub fn add_trace(&self, trace_id: i64, payload: TracePayload) {
        self.traces.lock().unwrap().insert(TraceId(trace_id), payload);
    }

    pub fn panic_on_next_start(&self) {
        *self.panic_on_start.lock().unwrap() = true;
    }

    /// Metadata of a trace recorded outside this session
    pub fn add_trace_info(&self, info: TraceInfo) {
        self.saved.lock().unwrap().push(info);
    }

    pub fn saved(&self) -> Vec<TraceInfo> {
        self.saved.lock().unwrap().clone()
    }

    pub fn started_with(&self) -> Vec<ProfilingConfiguration> {
        self.started_with.lock().unwrap().clone()
    }
}

impl RemoteProfilingClient for ScriptedClient {
    fn start_capture(&self, _target: &TargetRef, config: &ProfilingConfiguration) -> StartResponse {
        if std::mem::take(&mut *self.panic_on_start.lock().unwrap()) {
            panic!("transport went away");
        }
        self.started_with.lock().unwrap().push(config.clone());
        self.start.lock().unwrap().pop_front().unwrap_or(StartResponse::Success)
    }

    fn stop_capture(&self, _target: &TargetRef, _config: &ProfilingConfiguration) -> StopResponse {
        self.stop.lock().unwrap().pop_front().unwrap_or(StopResponse::Failure {
            message: "no scripted stop response".to_string(),
        })
    }

    fn query_state(&self, _target: &TargetRef) -> ProfilingStateResponse {
        self.state.lock().unwrap().clone().unwrap_or(ProfilingStateResponse::NotCapturing)
    }

    fn fetch_trace(&self, _target: &TargetRef, trace_id: TraceId) -> FetchTraceResponse {
        match self.traces.lock().unwrap().get(&trace_id) {
            Some(payload) => FetchTraceResponse::Success(payload.clone()),
            None => FetchTraceResponse::NotFound,
        }
    }

    fn save_trace_info(&self, _target: &TargetRef, info: &TraceInfo) -> SaveTraceResponse {
        self.saved.lock().unwrap().push(info.clone());
        SaveTraceResponse::Success
    }

    fn trace_infos(&self, _target: &TargetRef, from_ns: u64, to_ns: u64) -> TraceInfoResponse {
        let mut infos: Vec<TraceInfo> = self
            .saved
            .lock()
            .unwrap()
            .iter()
            .filter(|info| info.overlaps(from_ns, to_ns))
            .cloned()
            .collect();
        infos.sort_by_key(|info| info.from_timestamp_ns);
        TraceInfoResponse::Success(infos)
    }
}

/// Parser that waits for the test to open its gate, then defers to the real one
///
/// Each message on the gate releases one parse.
pub struct GatedParser {
    gate: Receiver<()>,
}

impl GatedParser {
    pub fn new() -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(Self { gate: rx }), tx)
    }
}

impl ParseTrace for GatedParser {
    fn parse(
        &self,
        trace_id: TraceId,
        payload: &TracePayload,
        cancel: &CancellationToken,
    ) -> Result<Capture, ParseError> {
        let _ = self.gate.recv_timeout(WAIT);
        check_cancelled(cancel)?;
        TraceParser.parse(trace_id, payload, cancel)
    }
}

pub fn connect(client: &Arc<ScriptedClient>, clock: &Arc<ManualClock>) -> CaptureSession {
    connect_with(client, clock, SessionConfig::default(), Arc::new(TraceParser))
}

pub fn connect_with(
    client: &Arc<ScriptedClient>,
    clock: &Arc<ManualClock>,
    config: SessionConfig,
    parser: Arc<dyn ParseTrace>,
) -> CaptureSession {
    CaptureSession::builder(target(), client.clone())
        .clock(clock.clone())
        .config(config)
        .parser(parser)
        .connect()
        .unwrap()
}

pub fn manual_clock(seconds: u64) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Timestamp(seconds * 1_000_000_000)))
}

pub fn drain(events: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
    events.try_iter().collect()
}

/// Just the state changes, in order
pub fn states(events: &[SessionEvent]) -> Vec<cpuscope::session::CaptureState> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}
