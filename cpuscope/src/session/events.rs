//! Messages into and out of the control context

use std::sync::Arc;

use cpuscope_common::{
    FetchTraceResponse, ProfilingConfiguration, ProfilingStateResponse, SaveTraceResponse,
    StartResponse, StopResponse, TraceId, TraceInfoResponse,
};

use super::CaptureState;
use crate::capture::{Capture, ClockType, Range};
use crate::domain::{Duration, ThreadId};
use crate::parsing::ParseOutcome;
use crate::selection::{CaptureFilter, DetailsType, FilterCounts};

/// User-visible transient notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub title: String,
    pub body: String,
}

/// Change notification delivered to observers, in the order changes happened
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(CaptureState),
    /// Periodic while capturing
    ElapsedTime(Duration),
    CaptureChanged(Option<Arc<Capture>>),
    ThreadChanged(Option<ThreadId>),
    ClockTypeChanged(ClockType),
    DetailsChanged(Option<DetailsType>),
    FilterChanged {
        filter: Option<CaptureFilter>,
        counts: Option<FilterCounts>,
    },
    ProfilingConfigurationChanged(ProfilingConfiguration),
    Banner(Banner),
}

/// Why a parse was requested; decides how its outcome is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseOrigin {
    /// The trace of the recording that was just stopped
    Stop,
    /// A trace picked with `select_trace`
    Selection,
}

/// Off-context result waiting to be applied on the control context.
///
/// Remote results are `Err` when the client call panicked.
#[derive(Debug)]
pub(crate) enum ControlMessage {
    StartCompleted {
        config: ProfilingConfiguration,
        response: Result<StartResponse, String>,
    },
    /// Remote state read back after a successful start
    StartConfirmed(Result<ProfilingStateResponse, String>),
    StopCompleted(Result<StopResponse, String>),
    TraceFetched {
        trace_id: TraceId,
        response: Result<FetchTraceResponse, String>,
    },
    ParseCompleted {
        trace_id: TraceId,
        origin: ParseOrigin,
        outcome: ParseOutcome,
    },
    TraceInfoSaved {
        trace_id: TraceId,
        response: Result<SaveTraceResponse, String>,
    },
    /// Saved traces overlapping a `select_range` request
    TraceInfosListed {
        range: Range,
        response: Result<TraceInfoResponse, String>,
    },
    Tick,
}
