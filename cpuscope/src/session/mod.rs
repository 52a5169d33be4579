//! # Capture Session
//!
//! The state machine that drives one profiling session against a monitored
//! target:
//!
//! ```text
//!            start()               ack ok                stop()
//!   Idle ─────────────► Starting ─────────► Capturing ─────────► Stopping
//!    ▲                     │                                        │
//!    │                 ack fail ──► StartFailure ──► Idle        ack ok
//!    │                                                              ▼
//!    │   ◄── parse ok / cancelled ─────────────────────────────── Parsing
//!    │   ◄── ParsingFailure ◄── parse failed ──────────────────────┘
//!    └── StopFailure ◄── ack fail (from Stopping)
//! ```
//!
//! ## Control Context
//!
//! The session is owned by one thread (the control context) and is only
//! mutated there. Remote calls and parses run on a worker pool; their results
//! come back as messages on an inbox that the owner drains in FIFO order with
//! [`CaptureSession::process_pending`], [`CaptureSession::process_next`] or
//! [`CaptureSession::run_until`]. Observers receive [`SessionEvent`]s in the
//! order the changes were applied.
//!
//! ## Failure Handling
//!
//! Remote and parse faults never escape as errors. They move the session into
//! a failure state, which is reported once (with a [`Banner`]) and then
//! immediately reset to `Idle`. Calling an operation from the wrong state is a
//! caller bug and returns [`SessionError::InvalidTransition`].

use std::sync::Arc;

use cpuscope_common::{
    FetchTraceResponse, ProfilingConfiguration, ProfilingMode, ProfilingStateResponse,
    SaveTraceResponse, StartResponse, StopResponse, TargetRef, ThreadRecord, TraceFormat, TraceId,
    TraceInfo, TraceInfoResponse,
};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::capture::{Capture, ClockType, Range};
use crate::config::SessionConfig;
use crate::domain::{Duration, SessionError, ThreadId, Timestamp};
use crate::parsing::{ParseHandle, ParseOutcome, ParseTrace, TraceCache, TraceParser};
use crate::remote::{DeviceClock, MonotonicClock, RemoteProfilingClient};
use crate::selection::{CaptureFilter, CaptureSelection, DetailsType};

mod configurations;
mod events;
mod state;
mod worker_pool;

pub use configurations::{default_configurations, ConfigModel};
pub use events::{Banner, SessionEvent};
pub use state::CaptureState;

use events::{ControlMessage, ParseOrigin};
use worker_pool::WorkerPool;

/// Configures and connects a [`CaptureSession`]
pub struct SessionBuilder {
    target: TargetRef,
    client: Arc<dyn RemoteProfilingClient>,
    clock: Arc<dyn DeviceClock>,
    parser: Arc<dyn ParseTrace>,
    config: SessionConfig,
}

impl SessionBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn DeviceClock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn parser(mut self, parser: Arc<dyn ParseTrace>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the worker pool and reconcile with the remote side.
    ///
    /// Blocks until the remote state query answers, so the returned session
    /// already reflects a recording that was in progress.
    pub fn connect(self) -> Result<CaptureSession, SessionError> {
        let pool = WorkerPool::new(self.config.parse_workers).map_err(SessionError::WorkerPool)?;
        let cache = TraceCache::new(self.parser, pool.handle().clone());
        let configurations = ConfigModel::new(
            self.target.feature_level,
            self.config.profiling_configurations.clone(),
            self.config.default_configuration.as_deref(),
        );
        let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();

        let mut session = CaptureSession {
            target: self.target,
            client: self.client,
            clock: self.clock,
            config: self.config,
            pool,
            cache,
            state: CaptureState::Idle,
            capture_start: None,
            in_progress_since: None,
            selection: CaptureSelection::new(),
            configurations,
            stop_parse: None,
            selected_trace: None,
            selected_range: None,
            ticker: None,
            inbox_tx,
            inbox_rx,
            observers: Vec::new(),
        };
        session.reconcile();
        Ok(session)
    }
}

/// One target's capture lifecycle plus what is being displayed
pub struct CaptureSession {
    target: TargetRef,
    client: Arc<dyn RemoteProfilingClient>,
    clock: Arc<dyn DeviceClock>,
    config: SessionConfig,
    pool: WorkerPool,
    cache: TraceCache,

    state: CaptureState,
    /// Device time the current recording started; only set while capturing
    capture_start: Option<Timestamp>,
    /// Open-ended "recording in progress" marker, starting at capture start
    in_progress_since: Option<Timestamp>,
    selection: CaptureSelection,
    configurations: ConfigModel,
    /// Trace of the last stop, while its parse is outstanding
    stop_parse: Option<TraceId>,
    /// Latest `select_trace` request; older requests are superseded
    selected_trace: Option<TraceId>,
    /// Outstanding `select_range` request
    selected_range: Option<Range>,
    ticker: Option<JoinHandle<()>>,

    inbox_tx: Sender<ControlMessage>,
    inbox_rx: Receiver<ControlMessage>,
    observers: Vec<Sender<SessionEvent>>,
}

impl CaptureSession {
    /// Builder with the default clock, parser and configuration
    pub fn builder(target: TargetRef, client: Arc<dyn RemoteProfilingClient>) -> SessionBuilder {
        SessionBuilder {
            target,
            client,
            clock: Arc::new(MonotonicClock::new()),
            parser: Arc::new(TraceParser),
            config: SessionConfig::default(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn target(&self) -> &TargetRef {
        &self.target
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.state
    }

    #[must_use]
    pub fn selection(&self) -> &CaptureSelection {
        &self.selection
    }

    #[must_use]
    pub fn capture(&self) -> Option<&Arc<Capture>> {
        self.selection.capture()
    }

    #[must_use]
    pub fn capture_start(&self) -> Option<Timestamp> {
        self.capture_start
    }

    /// Start of the in-progress marker; the marker extends to "now"
    #[must_use]
    pub fn in_progress_since(&self) -> Option<Timestamp> {
        self.in_progress_since
    }

    /// How long the current recording has been running.
    ///
    /// Only meaningful while capturing; `None` in every other state.
    #[must_use]
    pub fn capture_elapsed_time(&self) -> Option<Duration> {
        if self.state != CaptureState::Capturing {
            return None;
        }
        Some(self.clock.now().duration_since(self.capture_start?))
    }

    #[must_use]
    pub fn trace_cache(&self) -> &TraceCache {
        &self.cache
    }

    /// Receive every change from now on
    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.observers.push(tx);
        rx
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin periodic elapsed-time notifications
    pub fn enter(&mut self) {
        if self.ticker.is_none() {
            self.ticker = Some(self.pool.every(self.config.elapsed_tick(), &self.inbox_tx));
        }
    }

    /// Stop notifications and release the displayed capture
    pub fn exit(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.set_capture(None);
    }

    // ========================================================================
    // Capture lifecycle
    // ========================================================================

    /// Ask the target to start recording with the selected configuration
    pub fn start_capturing(&mut self) -> Result<(), SessionError> {
        self.require(CaptureState::Idle, "start capturing")?;

        let config = self.configurations.selected().clone();
        info!("Starting {} recording on {}", config.name, self.target);
        self.set_capture_state(CaptureState::Starting);

        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        let request = config.clone();
        self.pool.submit(
            &self.inbox_tx,
            move || client.start_capture(&target, &request),
            move |response| ControlMessage::StartCompleted { config, response },
        );
        Ok(())
    }

    /// Ask the target to stop recording and hand over the trace
    pub fn stop_capturing(&mut self) -> Result<(), SessionError> {
        self.require(CaptureState::Capturing, "stop capturing")?;

        // Optimistic: the marker goes away before the remote side confirms
        self.in_progress_since = None;
        self.set_capture_state(CaptureState::Stopping);

        let config = self
            .configurations
            .active()
            .unwrap_or_else(|| self.configurations.selected())
            .clone();
        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        self.pool.submit(
            &self.inbox_tx,
            move || client.stop_capture(&target, &config),
            ControlMessage::StopCompleted,
        );
        Ok(())
    }

    /// Abort parsing of the trace that was just stopped.
    ///
    /// Returns `false` if the parse finished before it could be cancelled; its
    /// outcome is applied as usual.
    pub fn cancel_parsing(&mut self) -> Result<bool, SessionError> {
        self.require(CaptureState::Parsing, "cancel parsing")?;
        let Some(trace_id) = self.stop_parse else {
            return Ok(false);
        };
        // The cancelled outcome arrives through the inbox like any other
        Ok(self.cache.cancel(trace_id))
    }

    /// Display a trace recorded earlier in the session.
    ///
    /// Reuses the cached parse if there is one, otherwise fetches the trace
    /// from the target first. The result is applied when it arrives.
    pub fn select_trace(&mut self, trace_id: TraceId) {
        self.selected_trace = Some(trace_id);
        self.selected_range = None;

        if let Some(handle) = self.cache.get(trace_id) {
            self.watch_parse(&handle, ParseOrigin::Selection);
            return;
        }

        debug!("{trace_id} not cached, fetching from {}", self.target);
        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        self.pool.submit(
            &self.inbox_tx,
            move || client.fetch_trace(&target, trace_id),
            move |response| ControlMessage::TraceFetched { trace_id, response },
        );
    }

    /// Display the first recorded trace overlapping `range` (microseconds),
    /// or nothing if no trace does.
    ///
    /// Asks the target for its saved trace metadata first; the result is
    /// applied when it arrives unless a newer selection came in meanwhile.
    pub fn select_range(&mut self, range: Range) {
        self.selected_trace = None;
        if range.is_empty() {
            self.selected_range = None;
            self.set_capture(None);
            return;
        }

        self.selected_range = Some(range);
        let (from_ns, to_ns) = range_ns(range);
        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        self.pool.submit(
            &self.inbox_tx,
            move || client.trace_infos(&target, from_ns, to_ns),
            move |response| ControlMessage::TraceInfosListed { range, response },
        );
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn set_selected_thread(&mut self, thread: Option<ThreadId>) {
        if self.selection.set_thread(thread) {
            self.emit(SessionEvent::ThreadChanged(thread));
        }
    }

    pub fn set_clock_type(&mut self, clock_type: ClockType) {
        if self.selection.set_clock_type(clock_type) {
            self.emit(SessionEvent::ClockTypeChanged(clock_type));
        }
    }

    pub fn set_details(&mut self, details: Option<DetailsType>) {
        if self.selection.set_details(details) {
            self.emit(SessionEvent::DetailsChanged(details));
        }
    }

    pub fn set_filter(&mut self, filter: Option<CaptureFilter>) {
        self.selection.set_filter(filter);
        self.emit_filter();
    }

    // ========================================================================
    // Profiling configurations
    // ========================================================================

    /// Configurations usable on this target, custom entries first
    #[must_use]
    pub fn profiling_configurations(&self) -> Vec<ProfilingConfiguration> {
        self.configurations.available()
    }

    /// Configuration the next start will use
    #[must_use]
    pub fn profiling_configuration(&self) -> &ProfilingConfiguration {
        self.configurations.selected()
    }

    pub fn set_profiling_configuration(&mut self, config: ProfilingConfiguration) {
        if self.configurations.set_selected(config.clone()) {
            self.emit(SessionEvent::ProfilingConfigurationChanged(config));
        }
    }

    /// Configuration of the current or last recording
    #[must_use]
    pub fn active_configuration(&self) -> Option<&ProfilingConfiguration> {
        self.configurations.active()
    }

    // ========================================================================
    // Control context
    // ========================================================================

    /// Apply every message already in the inbox. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    /// Wait up to `timeout` for one message and apply it
    pub fn process_next(&mut self, timeout: std::time::Duration) -> bool {
        match self.inbox_rx.recv_timeout(timeout) {
            Ok(message) => {
                self.apply(message);
                true
            }
            Err(_) => false,
        }
    }

    /// Apply messages until `done` holds or `timeout` runs out.
    ///
    /// Returns whether `done` was reached.
    pub fn run_until<F>(&mut self, timeout: std::time::Duration, mut done: F) -> bool
    where
        F: FnMut(&CaptureSession) -> bool,
    {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if done(self) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() || !self.process_next(remaining) {
                return done(self);
            }
        }
    }

    fn apply(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::StartCompleted { config, response } => {
                let response =
                    response.unwrap_or_else(|message| StartResponse::Failure { message });
                self.on_start_completed(config, response);
            }
            ControlMessage::StartConfirmed(response) => {
                let response = response
                    .unwrap_or_else(|message| ProfilingStateResponse::Failure { message });
                self.on_start_confirmed(response);
            }
            ControlMessage::StopCompleted(response) => {
                let response = response.unwrap_or_else(|message| StopResponse::Failure { message });
                self.on_stop_completed(response);
            }
            ControlMessage::TraceFetched { trace_id, response } => {
                let response =
                    response.unwrap_or_else(|message| FetchTraceResponse::Failure { message });
                self.on_trace_fetched(trace_id, response);
            }
            ControlMessage::ParseCompleted { trace_id, origin, outcome } => match origin {
                ParseOrigin::Stop => self.on_stop_parse_completed(trace_id, outcome),
                ParseOrigin::Selection => self.on_selection_parse_completed(trace_id, outcome),
            },
            ControlMessage::TraceInfoSaved { trace_id, response } => {
                let response =
                    response.unwrap_or_else(|message| SaveTraceResponse::Failure { message });
                if let SaveTraceResponse::Failure { message } = response {
                    warn!("Unable to save metadata for {trace_id}: {message}");
                }
            }
            ControlMessage::TraceInfosListed { range, response } => {
                let response =
                    response.unwrap_or_else(|message| TraceInfoResponse::Failure { message });
                self.on_trace_infos_listed(range, response);
            }
            ControlMessage::Tick => {
                if let Some(elapsed) = self.capture_elapsed_time() {
                    self.emit(SessionEvent::ElapsedTime(elapsed));
                }
            }
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn reconcile(&mut self) {
        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        let response = self
            .pool
            .call(move || client.query_state(&target))
            .unwrap_or_else(|message| ProfilingStateResponse::Failure { message });

        match response {
            ProfilingStateResponse::Capturing { start_timestamp_ns, check_timestamp_ns, config } => {
                let start = self.remote_start(start_timestamp_ns, check_timestamp_ns);
                info!(
                    "{} is already recording ({} so far)",
                    self.target,
                    self.clock.now().duration_since(start)
                );
                self.state = CaptureState::Capturing;
                self.capture_start = Some(start);
                self.in_progress_since = Some(start);
                self.configurations.set_active(config);
            }
            ProfilingStateResponse::NotCapturing => {
                self.state = CaptureState::Idle;
                self.capture_start = None;
            }
            ProfilingStateResponse::Failure { message } => {
                warn!("Unable to query profiling state of {}: {message}", self.target);
                self.state = CaptureState::Idle;
                self.capture_start = None;
            }
        }
    }

    fn on_start_completed(&mut self, config: ProfilingConfiguration, response: StartResponse) {
        if self.state != CaptureState::Starting {
            warn!("Ignoring start response while {}", self.state);
            return;
        }

        match &response {
            StartResponse::Success => {
                self.configurations.set_active(config);
                let now = self.clock.now();
                self.enter_capturing(now);

                // The device knows when recording really began; correct for
                // the round trip once it answers
                let client = Arc::clone(&self.client);
                let target = self.target.clone();
                self.pool.submit(
                    &self.inbox_tx,
                    move || client.query_state(&target),
                    ControlMessage::StartConfirmed,
                );
            }
            StartResponse::Failure { message } => {
                warn!("Unable to start tracing: {}", response.status());
                warn!("{message}");
                self.fail(
                    CaptureState::StartFailure,
                    Banner {
                        title: "Recording failed to start".to_string(),
                        body: format!("Try recording again, or restart the target. {message}"),
                    },
                );
            }
        }
    }

    fn on_start_confirmed(&mut self, response: ProfilingStateResponse) {
        if self.state != CaptureState::Capturing {
            debug!("Ignoring start confirmation while {}", self.state);
            return;
        }

        match response {
            ProfilingStateResponse::Capturing { start_timestamp_ns, check_timestamp_ns, .. } => {
                let start = self.remote_start(start_timestamp_ns, check_timestamp_ns);
                self.capture_start = Some(start);
                if self.in_progress_since.is_some() {
                    self.in_progress_since = Some(start);
                }
            }
            other => debug!("Keeping local start time, remote reports {}", other.status()),
        }
    }

    /// Device-reported start re-anchored on the local clock: the recording has
    /// been running for `check - start` as of the remote's answer
    fn remote_start(&self, start_timestamp_ns: u64, check_timestamp_ns: u64) -> Timestamp {
        let elapsed = Duration(check_timestamp_ns.saturating_sub(start_timestamp_ns));
        self.clock.now().saturating_sub(elapsed)
    }

    fn on_stop_completed(&mut self, response: StopResponse) {
        if self.state != CaptureState::Stopping {
            warn!("Ignoring stop response while {}", self.state);
            return;
        }

        match response {
            StopResponse::Success { trace_id, payload } => {
                if self.config.skips_trace_of(payload.len()) {
                    info!(
                        "{trace_id} is {} bytes, over the {} byte limit; not parsing",
                        payload.len(),
                        self.config.large_trace_threshold_bytes
                    );
                    self.set_capture_state(CaptureState::Idle);
                    return;
                }

                self.set_capture_state(CaptureState::Parsing);
                self.stop_parse = Some(trace_id);
                let handle = self.cache.parse(trace_id, payload);
                self.watch_parse(&handle, ParseOrigin::Stop);
            }
            StopResponse::Failure { message } => {
                warn!("Unable to stop tracing: FAILURE");
                warn!("{message}");
                self.fail(
                    CaptureState::StopFailure,
                    Banner {
                        title: "Recording failed to stop".to_string(),
                        body: format!("The trace could not be retrieved. {message}"),
                    },
                );
            }
        }
    }

    fn on_stop_parse_completed(&mut self, trace_id: TraceId, outcome: ParseOutcome) {
        if self.state != CaptureState::Parsing || self.stop_parse != Some(trace_id) {
            debug!("Ignoring stale parse result for {trace_id}");
            return;
        }
        self.stop_parse = None;

        match outcome {
            ParseOutcome::Success(capture) => {
                self.set_capture_state(CaptureState::Idle);
                self.selected_trace = Some(trace_id);
                self.selected_range = None;
                self.set_capture(Some(Arc::clone(&capture)));
                self.set_details(Some(DetailsType::CallChart));
                self.save_trace_info(&capture);
            }
            ParseOutcome::Failure(reason) => {
                warn!("Unable to parse {trace_id}: {reason}");
                self.fail(
                    CaptureState::ParsingFailure,
                    Banner {
                        title: "Trace data was not recorded".to_string(),
                        body: format!("The profiler was unable to parse the trace. {reason}"),
                    },
                );
                self.set_capture(None);
            }
            ParseOutcome::Cancelled => {
                info!("Parsing of {trace_id} was cancelled");
                self.set_capture_state(CaptureState::Idle);
            }
        }
    }

    fn on_trace_fetched(&mut self, trace_id: TraceId, response: FetchTraceResponse) {
        if self.selected_trace != Some(trace_id) {
            debug!("Ignoring superseded fetch of {trace_id}");
            return;
        }

        match response {
            FetchTraceResponse::Success(payload) => {
                let handle = self.cache.parse(trace_id, payload);
                self.watch_parse(&handle, ParseOrigin::Selection);
            }
            FetchTraceResponse::NotFound => {
                warn!("{}", SessionError::UnknownTrace(trace_id));
                self.set_capture(None);
            }
            FetchTraceResponse::Failure { message } => {
                warn!("Unable to fetch {trace_id}: {message}");
                self.set_capture(None);
            }
        }
    }

    fn on_selection_parse_completed(&mut self, trace_id: TraceId, outcome: ParseOutcome) {
        if self.selected_trace != Some(trace_id) {
            debug!("Ignoring superseded parse of {trace_id}");
            return;
        }

        match outcome {
            ParseOutcome::Success(capture) => self.set_capture(Some(capture)),
            ParseOutcome::Failure(reason) => {
                warn!("Unable to parse {trace_id}: {reason}");
                self.set_capture(None);
            }
            ParseOutcome::Cancelled => {}
        }
    }

    fn on_trace_infos_listed(&mut self, range: Range, response: TraceInfoResponse) {
        if self.selected_range != Some(range) {
            debug!("Ignoring superseded range selection");
            return;
        }
        self.selected_range = None;

        match response {
            TraceInfoResponse::Success(infos) => {
                let (from_ns, to_ns) = range_ns(range);
                match infos.iter().find(|info| info.overlaps(from_ns, to_ns)) {
                    Some(info) => self.select_trace(info.trace_id),
                    None => {
                        debug!("No trace overlaps {:.0}..{:.0}us", range.min, range.max);
                        self.set_capture(None);
                    }
                }
            }
            TraceInfoResponse::Failure { message } => {
                warn!("Unable to list traces of {}: {message}", self.target);
                self.set_capture(None);
            }
        }
    }

    /// Post the parse outcome to the inbox once it is known
    fn watch_parse(&self, handle: &ParseHandle, origin: ParseOrigin) {
        let inbox = self.inbox_tx.clone();
        let trace_id = handle.trace_id();
        handle.on_complete(move |outcome| {
            let _ = inbox.send(ControlMessage::ParseCompleted {
                trace_id,
                origin,
                outcome: outcome.clone(),
            });
        });
    }

    fn save_trace_info(&self, capture: &Capture) {
        let info = trace_info(capture);
        let trace_id = info.trace_id;
        let client = Arc::clone(&self.client);
        let target = self.target.clone();
        self.pool.submit(
            &self.inbox_tx,
            move || client.save_trace_info(&target, &info),
            move |response| ControlMessage::TraceInfoSaved { trace_id, response },
        );
    }

    fn require(&self, expected: CaptureState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            return Ok(());
        }
        let err = SessionError::InvalidTransition { operation, state: self.state };
        error!("{err}");
        Err(err)
    }

    /// Report a failure state once, then fall back to idle
    fn fail(&mut self, failure: CaptureState, banner: Banner) {
        self.set_capture_state(failure);
        self.emit(SessionEvent::Banner(banner));
        self.set_capture_state(CaptureState::Idle);
    }

    fn enter_capturing(&mut self, start: Timestamp) {
        self.state = CaptureState::Capturing;
        self.capture_start = Some(start);
        self.in_progress_since = Some(start);
        self.emit(SessionEvent::StateChanged(CaptureState::Capturing));
    }

    /// Any state other than capturing has no start time or marker
    fn set_capture_state(&mut self, state: CaptureState) {
        self.state = state;
        self.capture_start = None;
        self.in_progress_since = None;
        self.emit(SessionEvent::StateChanged(state));
    }

    fn set_capture(&mut self, capture: Option<Arc<Capture>>) {
        let had_thread = self.selection.thread().is_some();
        self.selection.set_capture(capture.clone());
        self.emit(SessionEvent::CaptureChanged(capture));
        if had_thread {
            self.emit(SessionEvent::ThreadChanged(None));
        }
        self.emit_filter();
    }

    fn emit_filter(&mut self) {
        let event = SessionEvent::FilterChanged {
            filter: self.selection.filter().cloned(),
            counts: self.selection.filter_counts(),
        };
        self.emit(event);
    }

    fn emit(&mut self, event: SessionEvent) {
        // Drop observers whose receiver is gone
        self.observers.retain(|observer| observer.send(event.clone()).is_ok());
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// Capture-range microseconds to device nanoseconds; negative times clamp to 0
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn range_ns(range: Range) -> (u64, u64) {
    ((range.min * 1000.0) as u64, (range.max * 1000.0) as u64)
}

/// Metadata saved for a parsed capture
fn trace_info(capture: &Capture) -> TraceInfo {
    let range = capture.range();
    let (from, to) = if range.is_empty() { (0, 0) } else { range_ns(range) };
    TraceInfo {
        trace_id: capture.trace_id(),
        from_timestamp_ns: from,
        to_timestamp_ns: to,
        mode: match capture.format() {
            TraceFormat::Sampled => ProfilingMode::Sampled,
            TraceFormat::Instrumented => ProfilingMode::Instrumented,
        },
        threads: capture
            .threads()
            .iter()
            .map(|t| ThreadRecord { tid: t.id.0, name: t.name.clone() })
            .collect(),
    }
}
