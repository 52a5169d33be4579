//! Off-context execution for remote calls, parses and the elapsed-time tick
//!
//! Wraps a small tokio runtime. Blocking work runs on its blocking pool and
//! reports back by posting a [`ControlMessage`] to the session inbox; nothing
//! here touches session state.

use std::io;

use crossbeam_channel::Sender;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use super::events::ControlMessage;

pub(crate) struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl WorkerPool {
    /// Pool with up to `workers` threads for blocking jobs
    pub(crate) fn new(workers: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name("cpuscope-worker")
            .enable_time()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self { runtime: Some(runtime), handle })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `call` off-context and post its result to `inbox`.
    ///
    /// A panicking call is reported as `Err` with the panic text.
    pub(crate) fn submit<T, F, M>(&self, inbox: &Sender<ControlMessage>, call: F, into_message: M)
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        M: FnOnce(Result<T, String>) -> ControlMessage + Send + 'static,
    {
        let inbox = inbox.clone();
        self.handle.spawn(async move {
            let result = tokio::task::spawn_blocking(call)
                .await
                .map_err(|error| format!("join remote call: {error}"));
            // The session may already be gone; nobody is left to tell
            let _ = inbox.send(into_message(result));
        });
    }

    /// Run `call` off-context and block the caller until it finishes
    pub(crate) fn call<T, F>(&self, call: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.handle.spawn(async move {
            let result = tokio::task::spawn_blocking(call)
                .await
                .map_err(|error| format!("join remote call: {error}"));
            let _ = tx.send(result);
        });
        rx.recv().map_err(|_| "worker pool shut down".to_string())?
    }

    /// Post [`ControlMessage::Tick`] every `period` until aborted or the
    /// inbox closes
    pub(crate) fn every(&self, period: std::time::Duration, inbox: &Sender<ControlMessage>) -> JoinHandle<()> {
        let inbox = inbox.clone();
        self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if inbox.send(ControlMessage::Tick).is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Does not wait for in-flight jobs and is safe inside another runtime
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_call_returns_result() {
        let pool = WorkerPool::new(1).unwrap();
        assert_eq!(pool.call(|| 40 + 2), Ok(42));
    }

    #[test]
    fn test_call_reports_panic() {
        let pool = WorkerPool::new(1).unwrap();
        let err = pool.call(|| -> u32 { panic!("remote exploded") }).unwrap_err();
        assert!(err.contains("panic"), "{err}");
    }

    #[test]
    fn test_submit_posts_to_inbox() {
        let pool = WorkerPool::new(2).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        pool.submit(&tx, || 7u32, |result| {
            assert_eq!(result, Ok(7));
            ControlMessage::Tick
        });
        assert!(matches!(rx.recv_timeout(Duration::from_secs(5)), Ok(ControlMessage::Tick)));
    }

    #[test]
    fn test_every_ticks_until_aborted() {
        let pool = WorkerPool::new(1).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let ticker = pool.every(Duration::from_millis(5), &tx);
        assert!(matches!(rx.recv_timeout(Duration::from_secs(5)), Ok(ControlMessage::Tick)));
        ticker.abort();
    }
}
