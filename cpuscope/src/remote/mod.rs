//! # Remote Profiling Boundary
//!
//! Everything the session needs from the monitored target, expressed as two
//! traits:
//!
//! - [`RemoteProfilingClient`] - start/stop/query a recording, fetch stored
//!   traces, save and list trace metadata
//! - [`DeviceClock`] - the target's notion of "now", used for elapsed time
//!
//! Client calls may block for as long as the transport needs. The session
//! never calls them from its control context; they run on the worker pool and
//! their responses are posted back as messages.

use cpuscope_common::{
    FetchTraceResponse, ProfilingConfiguration, ProfilingStateResponse, SaveTraceResponse,
    StartResponse, StopResponse, TargetRef, TraceId, TraceInfo, TraceInfoResponse,
};

use crate::domain::Timestamp;

pub mod clock;
pub mod replay;

pub use clock::{ManualClock, MonotonicClock};
pub use replay::ReplayClient;

/// Blocking client for the profiler running on the monitored target
pub trait RemoteProfilingClient: Send + Sync {
    /// Begin recording with `config`
    fn start_capture(&self, target: &TargetRef, config: &ProfilingConfiguration) -> StartResponse;

    /// End the current recording and hand back its trace
    fn stop_capture(&self, target: &TargetRef, config: &ProfilingConfiguration) -> StopResponse;

    /// Report whether a recording is in progress, and since when
    fn query_state(&self, target: &TargetRef) -> ProfilingStateResponse;

    /// Retrieve a trace recorded earlier in this session
    fn fetch_trace(&self, target: &TargetRef, trace_id: TraceId) -> FetchTraceResponse;

    /// Persist metadata about a parsed trace
    fn save_trace_info(&self, target: &TargetRef, info: &TraceInfo) -> SaveTraceResponse;

    /// Saved metadata of every trace overlapping `[from_ns, to_ns]` (device
    /// nanoseconds), earliest first
    fn trace_infos(&self, target: &TargetRef, from_ns: u64, to_ns: u64) -> TraceInfoResponse;
}

/// Source of device-relative timestamps
pub trait DeviceClock: Send + Sync {
    fn now(&self) -> Timestamp;
}
