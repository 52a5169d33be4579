use std::fmt;

/// Where the capture lifecycle currently is
///
/// The three failure states are transient: the session reports them once and
/// immediately falls back to [`CaptureState::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    /// Start requested, waiting for the remote side
    Starting,
    Capturing,
    /// Stop requested, waiting for the trace
    Stopping,
    Parsing,
    StartFailure,
    StopFailure,
    ParsingFailure,
}

impl CaptureState {
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            CaptureState::StartFailure | CaptureState::StopFailure | CaptureState::ParsingFailure
        )
    }

    /// Whether a remote call or parse is outstanding
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, CaptureState::Starting | CaptureState::Stopping | CaptureState::Parsing)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaptureState::Idle => "IDLE",
            CaptureState::Starting => "STARTING",
            CaptureState::Capturing => "CAPTURING",
            CaptureState::Stopping => "STOPPING",
            CaptureState::Parsing => "PARSING",
            CaptureState::StartFailure => "START_FAILURE",
            CaptureState::StopFailure => "STOP_FAILURE",
            CaptureState::ParsingFailure => "PARSING_FAILURE",
        })
    }
}
