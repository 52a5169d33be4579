//! Structured error types for cpuscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Remote and parse faults never surface through these types at the session
//! boundary: they become capture states. `SessionError` is reserved for caller
//! bugs and local resource failures.

use cpuscope_common::TraceId;
use thiserror::Error;

use crate::session::CaptureState;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot {operation} while capture state is {state}")]
    InvalidTransition { operation: &'static str, state: CaptureState },

    #[error("No parse is known for {0}")]
    UnknownTrace(TraceId),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Trace payload is empty")]
    Empty,

    #[error("Trace payload is truncated: {0}")]
    Truncated(String),

    #[error("Unrecognized trace format tag: {0}")]
    UnrecognizedFormat(u32),

    #[error("Malformed trace: {0}")]
    Malformed(String),

    #[error("Parsing was cancelled")]
    Cancelled,

    #[error(transparent)]
    Json(serde_json::Error),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        // serde_json reports a cut-off document as EOF; that is a truncated upload,
        // not a format problem
        if err.is_eof() {
            ParseError::Truncated(err.to_string())
        } else {
            ParseError::Json(err)
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid filter pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
