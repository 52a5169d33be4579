//! # Shared Data Structures (Session ↔ Remote Profiler)
//!
//! Defines the vocabulary spoken across the remote profiling boundary: what a
//! session asks the monitored target to do, and what the target answers. The
//! session side lives in the `cpuscope` crate; anything that implements the
//! remote side (a device agent, a replay harness, a test double) only needs
//! this crate.
//!
//! ## Trace Formats
//!
//! A trace payload arrives as opaque bytes plus a numeric format tag. The tag
//! is kept as a raw `u32` on the wire so that an unknown tag can still be
//! carried to the parser and reported there, instead of being lost in
//! transport.
//!
//! 1. **Sampled** - periodic stack samples ([`TRACE_FORMAT_SAMPLED`])
//! 2. **Instrumented** - exact method entry/exit events ([`TRACE_FORMAT_INSTRUMENTED`])
//!
//! ## Key Types
//!
//! - [`TracePayload`] - Immutable trace bytes plus format tag
//! - [`ProfilingConfiguration`] - How the target should record
//! - [`StartResponse`], [`StopResponse`], [`ProfilingStateResponse`],
//!   [`FetchTraceResponse`], [`SaveTraceResponse`] - Closed response unions
//! - [`TraceInfo`] - Metadata persisted for a parsed trace

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Format Tag Constants
// ============================================================================

/// **Sampled trace**: stack samples taken at a fixed interval
///
/// Produced by: configurations with [`ProfilingMode::Sampled`]
pub const TRACE_FORMAT_SAMPLED: u32 = 1;

/// **Instrumented trace**: every method entry and exit is recorded
///
/// Produced by: configurations with [`ProfilingMode::Instrumented`]
pub const TRACE_FORMAT_INSTRUMENTED: u32 = 2;

/// Default buffer size requested from the target, in megabytes
pub const DEFAULT_BUFFER_SIZE_MB: u32 = 8;

/// Default sampling interval, in microseconds
pub const DEFAULT_SAMPLING_INTERVAL_US: u32 = 1000;

// ============================================================================
// Identifiers
// ============================================================================

/// Trace identifier assigned by the remote profiler
///
/// Unique within one monitored session. Opaque to the session: it is only
/// compared and used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraceId(pub i64);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace#{}", self.0)
    }
}

/// The monitored target a session profiles
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TargetRef {
    /// Process ID on the device
    pub pid: u32,
    /// Process name, for display and logging
    pub name: String,
    /// API/feature level of the device; gates which configurations apply
    pub feature_level: u32,
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.name, self.pid)
    }
}

// ============================================================================
// Trace Payload
// ============================================================================

/// Closed set of trace formats the parser understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TraceFormat {
    Sampled,
    Instrumented,
}

impl TraceFormat {
    /// Decode a wire tag. Returns `None` for tags this build does not know.
    #[must_use]
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            TRACE_FORMAT_SAMPLED => Some(TraceFormat::Sampled),
            TRACE_FORMAT_INSTRUMENTED => Some(TraceFormat::Instrumented),
            _ => None,
        }
    }

    #[must_use]
    pub fn tag(self) -> u32 {
        match self {
            TraceFormat::Sampled => TRACE_FORMAT_SAMPLED,
            TraceFormat::Instrumented => TRACE_FORMAT_INSTRUMENTED,
        }
    }
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceFormat::Sampled => f.write_str("sampled"),
            TraceFormat::Instrumented => f.write_str("instrumented"),
        }
    }
}

/// Raw trace bytes plus the format tag reported by the remote side
///
/// Cloning is cheap: the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct TracePayload {
    data: Arc<[u8]>,
    format_tag: u32,
}

impl TracePayload {
    pub fn new(data: impl Into<Arc<[u8]>>, format_tag: u32) -> Self {
        Self { data: data.into(), format_tag }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn format_tag(&self) -> u32 {
        self.format_tag
    }

    /// The decoded format, if the tag is recognized
    #[must_use]
    pub fn format(&self) -> Option<TraceFormat> {
        TraceFormat::from_tag(self.format_tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Payloads can be megabytes; never dump them into logs
impl fmt::Debug for TracePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracePayload")
            .field("len", &self.data.len())
            .field("format_tag", &self.format_tag)
            .finish()
    }
}

// ============================================================================
// Profiling Configuration
// ============================================================================

/// Recording technique requested from the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ProfilingMode {
    #[default]
    Sampled,
    Instrumented,
}

impl ProfilingMode {
    /// The trace format a recording in this mode produces
    #[must_use]
    pub fn trace_format(self) -> TraceFormat {
        match self {
            ProfilingMode::Sampled => TraceFormat::Sampled,
            ProfilingMode::Instrumented => TraceFormat::Instrumented,
        }
    }
}

/// A named set of recording options
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProfilingConfiguration {
    pub name: String,
    pub mode: ProfilingMode,
    pub buffer_size_mb: u32,
    /// Only meaningful for [`ProfilingMode::Sampled`]
    pub sampling_interval_us: u32,
    /// Minimum device feature level required to use this configuration
    pub min_feature_level: u32,
}

impl ProfilingConfiguration {
    pub fn new(name: impl Into<String>, mode: ProfilingMode) -> Self {
        Self { name: name.into(), mode, ..Self::default() }
    }

    #[must_use]
    pub fn with_min_feature_level(mut self, level: u32) -> Self {
        self.min_feature_level = level;
        self
    }

    /// Whether a device at `feature_level` can run this configuration
    #[must_use]
    pub fn is_supported_on(&self, feature_level: u32) -> bool {
        feature_level >= self.min_feature_level
    }
}

impl Default for ProfilingConfiguration {
    fn default() -> Self {
        Self {
            name: String::new(),
            mode: ProfilingMode::Sampled,
            buffer_size_mb: DEFAULT_BUFFER_SIZE_MB,
            sampling_interval_us: DEFAULT_SAMPLING_INTERVAL_US,
            min_feature_level: 0,
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Answer to a start-recording request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartResponse {
    Success,
    Failure { message: String },
}

/// Answer to a stop-recording request
///
/// A successful stop carries the trace exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopResponse {
    Success { trace_id: TraceId, payload: TracePayload },
    Failure { message: String },
}

/// Answer to a profiling state query
///
/// Timestamps are device-relative nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfilingStateResponse {
    NotCapturing,
    Capturing {
        /// When the current recording started
        start_timestamp_ns: u64,
        /// When the device answered this query
        check_timestamp_ns: u64,
        /// Configuration the recording was started with
        config: ProfilingConfiguration,
    },
    Failure { message: String },
}

/// Answer to a request for a previously recorded trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTraceResponse {
    Success(TracePayload),
    NotFound,
    Failure { message: String },
}

/// Answer to a trace metadata save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTraceResponse {
    Success,
    Failure { message: String },
}

/// Answer to a trace metadata listing, ordered by start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceInfoResponse {
    Success(Vec<TraceInfo>),
    Failure { message: String },
}

macro_rules! impl_status {
    ($ty:ty { $($pat:pat => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Short status name, for logging
            #[must_use]
            pub fn status(&self) -> &'static str {
                match self {
                    $($pat => $name),+
                }
            }
        }
    };
}

impl_status!(StartResponse {
    StartResponse::Success => "SUCCESS",
    StartResponse::Failure { .. } => "FAILURE",
});

impl_status!(StopResponse {
    StopResponse::Success { .. } => "SUCCESS",
    StopResponse::Failure { .. } => "FAILURE",
});

impl_status!(ProfilingStateResponse {
    ProfilingStateResponse::NotCapturing => "NOT_CAPTURING",
    ProfilingStateResponse::Capturing { .. } => "CAPTURING",
    ProfilingStateResponse::Failure { .. } => "FAILURE",
});

impl_status!(FetchTraceResponse {
    FetchTraceResponse::Success(_) => "SUCCESS",
    FetchTraceResponse::NotFound => "NOT_FOUND",
    FetchTraceResponse::Failure { .. } => "FAILURE",
});

impl_status!(SaveTraceResponse {
    SaveTraceResponse::Success => "SUCCESS",
    SaveTraceResponse::Failure { .. } => "FAILURE",
});

impl_status!(TraceInfoResponse {
    TraceInfoResponse::Success(_) => "SUCCESS",
    TraceInfoResponse::Failure { .. } => "FAILURE",
});

// ============================================================================
// Trace Metadata
// ============================================================================

/// A thread that appears in a parsed trace
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThreadRecord {
    pub tid: u32,
    pub name: String,
}

/// Metadata saved on the remote side once a trace has been parsed
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraceInfo {
    pub trace_id: TraceId,
    pub from_timestamp_ns: u64,
    pub to_timestamp_ns: u64,
    pub mode: ProfilingMode,
    pub threads: Vec<ThreadRecord>,
}

impl TraceInfo {
    /// Whether the recording overlaps `[from_ns, to_ns]`; both ends inclusive
    #[must_use]
    pub fn overlaps(&self, from_ns: u64, to_ns: u64) -> bool {
        from_ns <= to_ns && self.from_timestamp_ns <= to_ns && from_ns <= self.to_timestamp_ns
    }
}
