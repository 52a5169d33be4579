//! File-backed remote profiler
//!
//! Plays back a trace recorded earlier: stopping a "recording" reads the trace
//! file from disk and returns it under a fresh trace ID. Used by the CLI and by
//! tests that want a real client without a device.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cpuscope_common::{
    FetchTraceResponse, ProfilingConfiguration, ProfilingStateResponse, SaveTraceResponse,
    StartResponse, StopResponse, TargetRef, TraceFormat, TraceId, TraceInfo, TraceInfoResponse,
    TracePayload,
};
use log::{debug, info};

use super::{DeviceClock, RemoteProfilingClient};
use crate::domain::Timestamp;

#[derive(Debug, Default)]
struct ReplayState {
    recording: Option<(Timestamp, ProfilingConfiguration)>,
    next_trace_id: i64,
    traces: HashMap<TraceId, TracePayload>,
    saved: Vec<TraceInfo>,
}

/// [`RemoteProfilingClient`] that serves a trace file from disk
pub struct ReplayClient {
    trace_path: PathBuf,
    /// Overrides the format implied by the recording configuration
    format: Option<TraceFormat>,
    clock: Arc<dyn DeviceClock>,
    state: Mutex<ReplayState>,
}

impl ReplayClient {
    pub fn new(trace_path: impl Into<PathBuf>, clock: Arc<dyn DeviceClock>) -> Self {
        Self {
            trace_path: trace_path.into(),
            format: None,
            clock,
            state: Mutex::new(ReplayState { next_trace_id: 1, ..ReplayState::default() }),
        }
    }

    /// Tag stopped traces with `format` regardless of the recording mode
    #[must_use]
    pub fn with_format(mut self, format: TraceFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Metadata saved by the session so far
    pub fn saved_trace_info(&self) -> Vec<TraceInfo> {
        self.lock().saved.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RemoteProfilingClient for ReplayClient {
    fn start_capture(&self, target: &TargetRef, config: &ProfilingConfiguration) -> StartResponse {
        let mut state = self.lock();
        if state.recording.is_some() {
            return StartResponse::Failure {
                message: format!("{target} is already being recorded"),
            };
        }
        info!("Replay: recording {target} with '{}'", config.name);
        state.recording = Some((self.clock.now(), config.clone()));
        StartResponse::Success
    }

    fn stop_capture(&self, target: &TargetRef, config: &ProfilingConfiguration) -> StopResponse {
        let mut state = self.lock();
        if state.recording.take().is_none() {
            return StopResponse::Failure { message: format!("{target} is not being recorded") };
        }

        let data = match std::fs::read(&self.trace_path) {
            Ok(data) => data,
            Err(e) => {
                return StopResponse::Failure {
                    message: format!("failed to read {}: {e}", self.trace_path.display()),
                };
            }
        };

        let format = self.format.unwrap_or_else(|| config.mode.trace_format());
        let payload = TracePayload::new(data, format.tag());
        let trace_id = TraceId(state.next_trace_id);
        state.next_trace_id += 1;
        state.traces.insert(trace_id, payload.clone());

        info!("Replay: stopped {target}, {trace_id} has {} bytes", payload.len());
        StopResponse::Success { trace_id, payload }
    }

    fn query_state(&self, _target: &TargetRef) -> ProfilingStateResponse {
        match &self.lock().recording {
            Some((start, config)) => ProfilingStateResponse::Capturing {
                start_timestamp_ns: start.0,
                check_timestamp_ns: self.clock.now().0,
                config: config.clone(),
            },
            None => ProfilingStateResponse::NotCapturing,
        }
    }

    fn fetch_trace(&self, _target: &TargetRef, trace_id: TraceId) -> FetchTraceResponse {
        match self.lock().traces.get(&trace_id) {
            Some(payload) => FetchTraceResponse::Success(payload.clone()),
            None => FetchTraceResponse::NotFound,
        }
    }

    fn save_trace_info(&self, _target: &TargetRef, info: &TraceInfo) -> SaveTraceResponse {
        debug!("Replay: saving metadata for {} ({} threads)", info.trace_id, info.threads.len());
        let mut state = self.lock();
        // Saving again replaces the earlier record
        state.saved.retain(|saved| saved.trace_id != info.trace_id);
        state.saved.push(info.clone());
        SaveTraceResponse::Success
    }

    fn trace_infos(&self, _target: &TargetRef, from_ns: u64, to_ns: u64) -> TraceInfoResponse {
        let mut infos: Vec<TraceInfo> = self
            .lock()
            .saved
            .iter()
            .filter(|info| info.overlaps(from_ns, to_ns))
            .cloned()
            .collect();
        infos.sort_by_key(|info| (info.from_timestamp_ns, info.trace_id));
        TraceInfoResponse::Success(infos)
    }
}
