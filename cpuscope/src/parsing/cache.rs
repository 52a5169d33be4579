//! Deduplicating parse cache
//!
//! Maps each [`TraceId`] to a single [`ParseHandle`]. The first request for a
//! trace inserts a pending handle and dispatches the parse to the worker pool;
//! every later request gets the same handle, so a trace is parsed at most once
//! no matter how many callers race for it.
//!
//! Completed results (successes and failures) stay cached. Only an in-flight
//! parse can be cancelled, which evicts its entry so the next request starts
//! over.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use cpuscope_common::{TraceId, TracePayload};
use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::{CancellationToken, ParseOutcome, ParseTrace};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Slot {
    trace_id: TraceId,
    outcome: watch::Sender<Option<ParseOutcome>>,
    cancel: CancellationToken,
    /// Runs `on_complete` waiters
    runtime: Handle,
}

/// Shared, completable view of one trace's parse
///
/// Cloning is cheap; all clones observe the same outcome. The outcome is set
/// exactly once, either by the parse job or by cancellation, whichever comes
/// first.
#[derive(Clone)]
pub struct ParseHandle(Arc<Slot>);

impl ParseHandle {
    fn new(trace_id: TraceId, runtime: Handle) -> Self {
        let (outcome, _) = watch::channel(None);
        Self(Arc::new(Slot { trace_id, outcome, cancel: CancellationToken::new(), runtime }))
    }

    #[must_use]
    pub fn trace_id(&self) -> TraceId {
        self.0.trace_id
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.0.outcome.borrow().is_some()
    }

    /// The outcome, if the parse has finished
    #[must_use]
    pub fn outcome(&self) -> Option<ParseOutcome> {
        self.0.outcome.borrow().clone()
    }

    /// Block until the parse finishes.
    ///
    /// Must not be called from inside the runtime the cache parses on.
    pub fn wait(&self) -> ParseOutcome {
        if let Some(outcome) = self.outcome() {
            return outcome;
        }
        // A runtime shut down mid-parse can never settle the handle
        self.completion().recv().unwrap_or(ParseOutcome::Cancelled)
    }

    /// Block until the parse finishes or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ParseOutcome> {
        if let Some(outcome) = self.outcome() {
            return Some(outcome);
        }
        self.completion().recv_timeout(timeout).ok()
    }

    /// Run `callback` with the outcome once it is known.
    ///
    /// If the parse has already finished the callback runs immediately on the
    /// calling thread; otherwise a task on the parse runtime waits for the
    /// outcome and runs it there.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&ParseOutcome) + Send + 'static,
    {
        if let Some(outcome) = self.outcome() {
            callback(&outcome);
            return;
        }

        let mut outcome = self.0.outcome.subscribe();
        self.0.runtime.spawn(async move {
            let settled = match outcome.wait_for(Option::is_some).await {
                Ok(settled) => settled.clone(),
                Err(_) => None,
            };
            if let Some(settled) = settled {
                callback(&settled);
            }
        });
    }

    /// Whether both handles refer to the same parse
    #[must_use]
    pub fn same_as(&self, other: &ParseHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.0.cancel
    }

    fn is_cancelled(&self) -> bool {
        matches!(*self.0.outcome.borrow(), Some(ParseOutcome::Cancelled))
    }

    /// Set the outcome and wake every waiter. First writer wins; returns
    /// whether this call was it.
    pub(crate) fn complete(&self, outcome: ParseOutcome) -> bool {
        self.0.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    fn completion(&self) -> crossbeam_channel::Receiver<ParseOutcome> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.on_complete(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        rx
    }
}

impl fmt::Debug for ParseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseHandle")
            .field("trace_id", &self.0.trace_id)
            .field("outcome", &*self.0.outcome.borrow())
            .finish()
    }
}

/// Trace-ID keyed cache of parse results
pub struct TraceCache {
    entries: Mutex<HashMap<TraceId, ParseHandle>>,
    parser: Arc<dyn ParseTrace>,
    runtime: Handle,
}

impl TraceCache {
    /// Create a cache that runs `parser` on the blocking pool of `runtime`
    pub fn new(parser: Arc<dyn ParseTrace>, runtime: Handle) -> Self {
        Self { entries: Mutex::new(HashMap::new()), parser, runtime }
    }

    /// Handle for `trace_id`'s parse, starting one if none exists.
    ///
    /// On a hit the payload is ignored and the cached handle is returned, even
    /// if that handle holds a failure. An entry whose parse ended up
    /// cancelled counts as a miss.
    pub fn parse(&self, trace_id: TraceId, payload: TracePayload) -> ParseHandle {
        let mut entries = lock(&self.entries);
        if let Some(handle) = entries.get(&trace_id) {
            if !handle.is_cancelled() {
                debug!("{trace_id}: cache hit");
                return handle.clone();
            }
            debug!("{trace_id}: previous parse was cancelled, starting over");
        }

        let handle = ParseHandle::new(trace_id, self.runtime.clone());
        entries.insert(trace_id, handle.clone());
        drop(entries);

        self.dispatch(handle.clone(), payload);
        handle
    }

    /// Cached handle for `trace_id`, without starting a parse
    #[must_use]
    pub fn get(&self, trace_id: TraceId) -> Option<ParseHandle> {
        lock(&self.entries).get(&trace_id).cloned()
    }

    /// Cancel an in-flight parse.
    ///
    /// The handle completes as [`ParseOutcome::Cancelled`] right away and the
    /// entry is evicted. Returns `false` if there is no entry or its parse
    /// already succeeded or failed; those results are never evicted.
    pub fn cancel(&self, trace_id: TraceId) -> bool {
        let mut entries = lock(&self.entries);
        let Some(handle) = entries.get(&trace_id).cloned() else {
            return false;
        };

        handle.cancel_token().cancel();
        handle.complete(ParseOutcome::Cancelled);
        // The job may have seen the token and settled the handle first
        if !handle.is_cancelled() {
            return false;
        }
        entries.remove(&trace_id);
        drop(entries);

        info!("{trace_id}: parse cancelled");
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    fn dispatch(&self, handle: ParseHandle, payload: TracePayload) {
        let parser = Arc::clone(&self.parser);
        self.runtime.spawn_blocking(move || {
            let trace_id = handle.trace_id();
            if handle.cancel_token().is_cancelled() {
                return;
            }

            let started = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                parser.parse(trace_id, &payload, handle.cancel_token())
            }));
            let outcome = match result {
                Ok(result) => ParseOutcome::from_result(result),
                Err(cause) => {
                    ParseOutcome::Failure(format!("parser panicked: {}", panic_message(&*cause)))
                }
            };

            match &outcome {
                ParseOutcome::Success(capture) => info!(
                    "{trace_id}: parsed {} threads in {:.1}ms",
                    capture.threads().len(),
                    started.elapsed().as_secs_f64() * 1000.0
                ),
                ParseOutcome::Failure(reason) => warn!("{trace_id}: parse failed: {reason}"),
                ParseOutcome::Cancelled => {}
            }

            if !handle.complete(outcome) {
                debug!("{trace_id}: discarding result of cancelled parse");
            }
        });
    }
}

impl fmt::Debug for TraceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceCache").field("entries", &self.len()).finish_non_exhaustive()
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
