//! # cpuscope - CPU Capture Lifecycle and Trace Parsing
//!
//! cpuscope drives a CPU-profiling session against a monitored target: it
//! starts and stops a trace recording through a remote profiler, parses the
//! trace it gets back off the control thread, and keeps the resulting capture
//! selected for analysis.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Monitored Target (device)                     │
//! │           start / stop / query recording, stored traces         │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ RemoteProfilingClient (blocking calls)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    cpuscope (This Crate)                        │
//! │                                                                 │
//! │  ┌──────────────┐  inbox  ┌──────────────┐   ┌──────────────┐   │
//! │  │ Worker Pool  │────────▶│   Capture    │──▶│   Capture    │   │
//! │  │(remote calls)│         │   Session    │   │  Selection   │   │
//! │  └──────────────┘         └──────┬───────┘   └──────────────┘   │
//! │         ▲                        │ parse(id, payload)           │
//! │         │                        ▼                              │
//! │         │                 ┌──────────────┐   ┌──────────────┐   │
//! │         └─────────────────│  TraceCache  │──▶│ TraceParser  │   │
//! │            outcome        │ (dedup/cancel)│  │ (JSON → tree)│   │
//! │                           └──────────────┘   └──────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core Pipeline Modules
//!
//! - [`session`]: The capture state machine and its control context
//!   - `CaptureSession`: start/stop/parse lifecycle, reconciliation, events
//!   - `ConfigModel`: available, selected and active profiling configurations
//!
//! - [`parsing`]: Trace payload → [`capture::Capture`]
//!   - `TraceCache`: at most one parse per trace ID, cancellable handles
//!   - `TraceParser`: sampled and instrumented trace-event JSON
//!
//! - [`remote`]: The boundary to the monitored target
//!   - `RemoteProfilingClient` and `DeviceClock` traits
//!   - `ReplayClient`: serves a trace file from disk
//!
//! ### Data and Presentation Modules
//!
//! - [`capture`]: Parsed call trees and time ranges
//! - [`selection`]: Displayed capture, thread, clock, details view and filter
//! - [`analysis`]: Hotspot aggregation over a capture
//! - [`report`]: Text output for the CLI
//! - [`config`]: Session configuration file
//! - [`cli`]: Command-line argument parsing
//! - [`domain`]: Core domain types (ThreadId, Timestamp, Duration) and errors
//!
//! ## Threading
//!
//! The session is owned by one thread, the control context, and is never
//! shared. Remote calls and parses run on a small tokio runtime owned by the
//! session; results are posted back to the session's inbox and applied in
//! arrival order when the owner calls `process_pending`, `process_next` or
//! `run_until`.
//!
//! ## Typical Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cpuscope::remote::{MonotonicClock, ReplayClient};
//! use cpuscope::session::{CaptureSession, CaptureState};
//! use cpuscope_common::TargetRef;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = Arc::new(MonotonicClock::new());
//! let client = Arc::new(ReplayClient::new("trace.json", clock.clone()));
//! let target = TargetRef { pid: 1234, name: "app".into(), feature_level: 30 };
//!
//! let mut session = CaptureSession::builder(target, client).clock(clock).connect()?;
//! session.start_capturing()?;
//! session.run_until(Duration::from_secs(5), |s| s.state() == CaptureState::Capturing);
//! session.stop_capturing()?;
//! session.run_until(Duration::from_secs(30), |s| s.state() == CaptureState::Idle);
//!
//! if let Some(capture) = session.capture() {
//!     println!("{} threads", capture.threads().len());
//! }
//! # Ok(())
//! # }
//! ```

// Expose modules for testing
pub mod analysis;
pub mod capture;
pub mod cli;
pub mod config;
pub mod domain;
pub mod parsing;
pub mod remote;
pub mod report;
pub mod selection;
pub mod session;
