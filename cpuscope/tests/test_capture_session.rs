//! End-to-end tests of the capture state machine against a scripted profiler

mod common;

use std::sync::Arc;

use common::{
    connect, connect_with, drain, fixture_payload, manual_clock, single_thread_trace_1k, states,
    GatedParser, ScriptedClient, WAIT,
};
use cpuscope::capture::Range;
use cpuscope::config::{LargeTracePolicy, SessionConfig};
use cpuscope::domain::{Duration, SessionError, Timestamp};
use cpuscope::parsing::TraceParser;
use cpuscope::selection::DetailsType;
use cpuscope::session::{CaptureSession, CaptureState, SessionEvent};
use cpuscope_common::{
    ProfilingConfiguration, ProfilingMode, ProfilingStateResponse, StartResponse, StopResponse,
    TraceId, TraceInfo, TracePayload, TRACE_FORMAT_SAMPLED,
};

fn start(session: &mut CaptureSession) {
    session.start_capturing().unwrap();
    assert!(session.run_until(WAIT, |s| s.state() != CaptureState::Starting));
}

fn stop_and_settle(session: &mut CaptureSession) {
    session.stop_capturing().unwrap();
    assert!(session.run_until(WAIT, |s| s.state() == CaptureState::Idle));
}

fn banners(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Banner(banner) => Some(format!("{}: {}", banner.title, banner.body)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_successful_capture_and_parse() {
    let client = ScriptedClient::new();
    let clock = manual_clock(10);
    let mut session = connect(&client, &clock);
    let events = session.subscribe();
    assert_eq!(session.state(), CaptureState::Idle);

    start(&mut session);
    assert_eq!(session.state(), CaptureState::Capturing);
    assert_eq!(session.capture_start(), Some(Timestamp(10_000_000_000)));
    assert_eq!(session.in_progress_since(), session.capture_start());
    assert_eq!(session.active_configuration(), Some(session.profiling_configuration()));

    clock.advance(Duration(1_500_000_000));
    assert_eq!(session.capture_elapsed_time(), Some(Duration(1_500_000_000)));
    clock.advance(Duration(500_000_000));
    assert_eq!(session.capture_elapsed_time(), Some(Duration(2_000_000_000)));

    client.push_stop_trace(1, single_thread_trace_1k());
    stop_and_settle(&mut session);

    let events = drain(&events);
    assert_eq!(
        states(&events),
        vec![
            CaptureState::Starting,
            CaptureState::Capturing,
            CaptureState::Stopping,
            CaptureState::Parsing,
            CaptureState::Idle,
        ]
    );
    assert!(banners(&events).is_empty());

    let capture = session.capture().expect("capture is displayed");
    assert_eq!(capture.trace_id(), TraceId(1));
    assert_eq!(capture.threads().len(), 1);
    assert_eq!(capture.threads()[0].name, "main");
    assert_eq!(session.selection().details(), Some(DetailsType::CallChart));
    assert_eq!(session.capture_start(), None);
    assert_eq!(session.in_progress_since(), None);
    assert_eq!(session.capture_elapsed_time(), None);

    // Capture is published before the details view switches
    let capture_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::CaptureChanged(Some(_))))
        .unwrap();
    let details_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::DetailsChanged(Some(DetailsType::CallChart))))
        .unwrap();
    assert!(capture_at < details_at);

    // Metadata is saved off the control context
    assert!(session.run_until(WAIT, |_| !client.saved().is_empty()));
    let saved = client.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].trace_id, TraceId(1));
    assert_eq!((saved[0].from_timestamp_ns, saved[0].to_timestamp_ns), (1_000_000, 6_000_000));
    assert_eq!(saved[0].threads.len(), 1);
}

#[test]
fn test_start_time_follows_device_confirmation() {
    let client = ScriptedClient::new();
    let clock = manual_clock(10);
    let mut session = connect(&client, &clock);
    let events = session.subscribe();

    // Connected idle; the device answers the post-start query with 2s elapsed
    client.set_state(ProfilingStateResponse::Capturing {
        start_timestamp_ns: 40_000_000_000,
        check_timestamp_ns: 42_000_000_000,
        config: session.profiling_configuration().clone(),
    });
    start(&mut session);
    assert_eq!(session.capture_start(), Some(Timestamp(10_000_000_000)));

    assert!(session.run_until(WAIT, |s| s.capture_start() == Some(Timestamp(8_000_000_000))));
    assert_eq!(session.in_progress_since(), Some(Timestamp(8_000_000_000)));
    assert_eq!(session.capture_elapsed_time(), Some(Duration(2_000_000_000)));
    // Re-anchoring is not a state change
    assert_eq!(states(&drain(&events)), vec![CaptureState::Starting, CaptureState::Capturing]);
}

#[test]
fn test_start_failure_reports_banner_then_idle() {
    let client = ScriptedClient::new();
    client.push_start(StartResponse::Failure { message: "profiler busy".to_string() });
    let mut session = connect(&client, &manual_clock(1));
    let events = session.subscribe();

    start(&mut session);

    let events = drain(&events);
    assert_eq!(
        states(&events),
        vec![CaptureState::Starting, CaptureState::StartFailure, CaptureState::Idle]
    );
    let banners = banners(&events);
    assert_eq!(banners.len(), 1);
    assert!(banners[0].starts_with("Recording failed to start"));
    assert!(banners[0].contains("profiler busy"));

    // The banner sits between the failure state and the reset to idle
    let banner_at = events.iter().position(|e| matches!(e, SessionEvent::Banner(_))).unwrap();
    assert!(matches!(
        events[banner_at - 1],
        SessionEvent::StateChanged(CaptureState::StartFailure)
    ));
    assert!(matches!(events[banner_at + 1], SessionEvent::StateChanged(CaptureState::Idle)));

    assert!(session.capture().is_none());
    assert_eq!(session.capture_start(), None);
    assert_eq!(session.active_configuration(), None);
}

#[test]
fn test_panicking_client_is_a_start_failure() {
    let client = ScriptedClient::new();
    client.panic_on_next_start();
    let mut session = connect(&client, &manual_clock(1));
    let events = session.subscribe();

    start(&mut session);

    assert_eq!(session.state(), CaptureState::Idle);
    let events = drain(&events);
    assert!(states(&events).contains(&CaptureState::StartFailure));

    // The session is still usable
    start(&mut session);
    assert_eq!(session.state(), CaptureState::Capturing);
}

#[test]
fn test_stop_failure_reports_banner_then_idle() {
    let client = ScriptedClient::new();
    client.push_stop(StopResponse::Failure { message: "device disconnected".to_string() });
    let mut session = connect(&client, &manual_clock(1));
    start(&mut session);
    let events = session.subscribe();

    stop_and_settle(&mut session);

    let events = drain(&events);
    assert_eq!(
        states(&events),
        vec![CaptureState::Stopping, CaptureState::StopFailure, CaptureState::Idle]
    );
    let banners = banners(&events);
    assert_eq!(banners.len(), 1);
    assert!(banners[0].starts_with("Recording failed to stop"));
    assert!(session.capture().is_none());
}

#[test]
fn test_unrecognized_format_is_a_parsing_failure() {
    let client = ScriptedClient::new();
    client.push_stop_trace(1, single_thread_trace_1k());
    client.push_stop_trace(2, TracePayload::new(b"{}".to_vec(), 99));
    let mut session = connect(&client, &manual_clock(1));

    start(&mut session);
    stop_and_settle(&mut session);
    assert!(session.capture().is_some());

    let events = session.subscribe();
    start(&mut session);
    stop_and_settle(&mut session);

    let events = drain(&events);
    assert_eq!(
        states(&events),
        vec![
            CaptureState::Starting,
            CaptureState::Capturing,
            CaptureState::Stopping,
            CaptureState::Parsing,
            CaptureState::ParsingFailure,
            CaptureState::Idle,
        ]
    );
    let banners = banners(&events);
    assert_eq!(banners.len(), 1);
    assert!(banners[0].starts_with("Trace data was not recorded"));
    assert!(banners[0].contains("99"), "{}", banners[0]);

    // The previously displayed capture is cleared
    assert!(session.capture().is_none());
    assert!(events.iter().any(|e| matches!(e, SessionEvent::CaptureChanged(None))));
}

#[test]
fn test_truncated_trace_is_a_parsing_failure() {
    let client = ScriptedClient::new();
    client.push_stop_trace(3, fixture_payload("truncated.json", TRACE_FORMAT_SAMPLED));
    let mut session = connect(&client, &manual_clock(1));
    let events = session.subscribe();

    start(&mut session);
    stop_and_settle(&mut session);

    let events = drain(&events);
    assert!(states(&events).contains(&CaptureState::ParsingFailure));
    assert!(banners(&events)[0].contains("truncated"));
    assert!(session.capture().is_none());
}

#[test]
fn test_reconcile_with_recording_in_progress() {
    let client = ScriptedClient::new();
    let config = ProfilingConfiguration::new("Remote config", ProfilingMode::Instrumented);
    client.set_state(ProfilingStateResponse::Capturing {
        start_timestamp_ns: 5_000_000_000,
        check_timestamp_ns: 8_000_000_000,
        config: config.clone(),
    });
    let clock = manual_clock(100);

    let session = connect(&client, &clock);

    assert_eq!(session.state(), CaptureState::Capturing);
    assert_eq!(session.capture_start(), Some(Timestamp(97_000_000_000)));
    assert_eq!(session.in_progress_since(), Some(Timestamp(97_000_000_000)));
    assert_eq!(session.capture_elapsed_time(), Some(Duration(3_000_000_000)));
    clock.advance(Duration(2_000_000_000));
    assert_eq!(session.capture_elapsed_time(), Some(Duration(5_000_000_000)));

    // Only the active configuration follows the device
    assert_eq!(session.active_configuration(), Some(&config));
    assert_ne!(session.profiling_configuration(), &config);
}

#[test]
fn test_reconciled_recording_stops_with_its_own_configuration() {
    let client = ScriptedClient::new();
    let config = ProfilingConfiguration::new("Remote config", ProfilingMode::Instrumented);
    client.set_state(ProfilingStateResponse::Capturing {
        start_timestamp_ns: 0,
        check_timestamp_ns: 1_000,
        config,
    });
    client.push_stop_trace(4, single_thread_trace_1k());
    let mut session = connect(&client, &manual_clock(1));

    stop_and_settle(&mut session);
    assert_eq!(session.capture().map(|c| c.trace_id()), Some(TraceId(4)));
}

#[test]
fn test_reconcile_failure_starts_idle() {
    let client = ScriptedClient::new();
    client.set_state(ProfilingStateResponse::Failure { message: "timeout".to_string() });

    let session = connect(&client, &manual_clock(1));

    assert_eq!(session.state(), CaptureState::Idle);
    assert_eq!(session.capture_start(), None);
}

#[test]
fn test_operations_from_wrong_state_are_rejected() {
    let client = ScriptedClient::new();
    let mut session = connect(&client, &manual_clock(1));

    let err = session.stop_capturing().unwrap_err();
    assert!(matches!(err, SessionError::InvalidTransition { state: CaptureState::Idle, .. }));
    assert_eq!(err.to_string(), "Cannot stop capturing while capture state is IDLE");
    assert!(session.cancel_parsing().is_err());

    session.start_capturing().unwrap();
    // Messages are only applied when the owner drains the inbox
    assert_eq!(session.state(), CaptureState::Starting);
    assert!(session.start_capturing().is_err());
    assert!(session.stop_capturing().is_err());

    assert!(session.run_until(WAIT, |s| s.state() == CaptureState::Capturing));
    assert!(session.start_capturing().is_err());

    client.push_stop_trace(1, single_thread_trace_1k());
    session.stop_capturing().unwrap();
    // Stopping cannot be cancelled
    assert_eq!(session.state(), CaptureState::Stopping);
    assert!(session.cancel_parsing().is_err());
    assert!(session.run_until(WAIT, |s| s.state() == CaptureState::Idle));
}

#[test]
fn test_cancel_parsing() {
    let client = ScriptedClient::new();
    client.push_stop_trace(6, single_thread_trace_1k());
    client.push_stop_trace(7, single_thread_trace_1k());
    let (parser, gate) = GatedParser::new();
    let mut session = connect_with(&client, &manual_clock(1), SessionConfig::default(), parser);

    // First recording parses normally and stays on display
    gate.send(()).unwrap();
    start(&mut session);
    stop_and_settle(&mut session);
    let shown = Arc::clone(session.capture().expect("first capture is displayed"));
    let events = session.subscribe();

    start(&mut session);
    session.stop_capturing().unwrap();
    assert!(session.run_until(WAIT, |s| s.state() == CaptureState::Parsing));
    assert!(session.trace_cache().get(TraceId(7)).is_some());

    assert!(session.cancel_parsing().unwrap());
    assert!(session.run_until(WAIT, |s| s.state() == CaptureState::Idle));
    drop(gate);

    let events = drain(&events);
    assert_eq!(
        states(&events),
        vec![
            CaptureState::Starting,
            CaptureState::Capturing,
            CaptureState::Stopping,
            CaptureState::Parsing,
            CaptureState::Idle,
        ]
    );
    assert!(banners(&events).is_empty());
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::CaptureChanged(_))));
    assert!(Arc::ptr_eq(&shown, session.capture().unwrap()));
    assert!(session.trace_cache().get(TraceId(7)).is_none());
    assert!(session.trace_cache().get(TraceId(6)).is_some_and(|h| h.is_done()));
}

#[test]
fn test_large_trace_is_skipped() {
    let client = ScriptedClient::new();
    client.push_stop_trace(1, single_thread_trace_1k());
    let config = SessionConfig {
        large_trace_threshold_bytes: 512,
        large_trace_policy: LargeTracePolicy::Skip,
        ..SessionConfig::default()
    };
    let mut session = connect_with(&client, &manual_clock(1), config, Arc::new(TraceParser));
    let events = session.subscribe();

    start(&mut session);
    stop_and_settle(&mut session);

    let events = drain(&events);
    assert_eq!(
        states(&events),
        vec![
            CaptureState::Starting,
            CaptureState::Capturing,
            CaptureState::Stopping,
            CaptureState::Idle,
        ]
    );
    assert!(session.capture().is_none());
    assert!(session.trace_cache().is_empty());
}

#[test]
fn test_reused_trace_id_hits_cache() {
    let client = ScriptedClient::new();
    client.push_stop_trace(1, single_thread_trace_1k());
    client.push_stop_trace(1, fixture_payload("sampled_two_threads.json", TRACE_FORMAT_SAMPLED));
    let mut session = connect(&client, &manual_clock(1));

    start(&mut session);
    stop_and_settle(&mut session);
    let first = Arc::clone(session.capture().unwrap());

    start(&mut session);
    stop_and_settle(&mut session);
    let second = session.capture().unwrap();

    // The second payload is never parsed
    assert!(Arc::ptr_eq(&first, second));
    assert_eq!(second.threads().len(), 1);
    assert_eq!(session.trace_cache().len(), 1);
}

#[test]
fn test_select_cached_trace() {
    let client = ScriptedClient::new();
    client.push_stop_trace(1, single_thread_trace_1k());
    let mut session = connect(&client, &manual_clock(1));
    start(&mut session);
    stop_and_settle(&mut session);
    let parsed = Arc::clone(session.capture().unwrap());

    session.exit();
    assert!(session.capture().is_none());

    session.select_trace(TraceId(1));
    assert!(session.run_until(WAIT, |s| s.capture().is_some()));
    assert!(Arc::ptr_eq(&parsed, session.capture().unwrap()));
}

#[test]
fn test_select_trace_fetches_and_parses() {
    let client = ScriptedClient::new();
    client.add_trace(9, fixture_payload("sampled_two_threads.json", TRACE_FORMAT_SAMPLED));
    let mut session = connect(&client, &manual_clock(1));
    let events = session.subscribe();

    session.select_trace(TraceId(9));
    assert!(session.run_until(WAIT, |s| s.capture().is_some()));

    let capture = session.capture().unwrap();
    assert_eq!(capture.trace_id(), TraceId(9));
    assert_eq!(capture.threads().len(), 2);
    assert!(session.trace_cache().get(TraceId(9)).is_some_and(|h| h.is_done()));
    // Selection never touches the capture state
    assert!(states(&drain(&events)).is_empty());
}

#[test]
fn test_select_unknown_trace_clears_capture() {
    let client = ScriptedClient::new();
    client.push_stop_trace(1, single_thread_trace_1k());
    let mut session = connect(&client, &manual_clock(1));
    start(&mut session);
    stop_and_settle(&mut session);
    let events = session.subscribe();

    session.select_trace(TraceId(5));
    assert!(session.run_until(WAIT, |s| s.capture().is_none()));

    let events = drain(&events);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::CaptureChanged(None))));
    assert!(banners(&events).is_empty());
    assert!(session.trace_cache().get(TraceId(5)).is_none());
}

#[test]
fn test_later_selection_supersedes_earlier_fetch() {
    let client = ScriptedClient::new();
    client.push_stop_trace(1, single_thread_trace_1k());
    client.add_trace(9, fixture_payload("sampled_two_threads.json", TRACE_FORMAT_SAMPLED));
    let mut session = connect(&client, &manual_clock(1));
    start(&mut session);
    stop_and_settle(&mut session);

    session.select_trace(TraceId(9));
    session.select_trace(TraceId(1));
    // Let the fetch of 9 arrive and be ignored
    session.run_until(std::time::Duration::from_millis(500), |_| false);

    assert_eq!(session.capture().map(|c| c.trace_id()), Some(TraceId(1)));
    assert!(session.trace_cache().get(TraceId(9)).is_none());
}

#[test]
fn test_select_range_picks_overlapping_trace() {
    let client = ScriptedClient::new();
    client.push_stop_trace(1, single_thread_trace_1k());
    client.add_trace(9, fixture_payload("sampled_two_threads.json", TRACE_FORMAT_SAMPLED));
    client.add_trace_info(TraceInfo {
        trace_id: TraceId(9),
        from_timestamp_ns: 20_000_000,
        to_timestamp_ns: 30_000_000,
        mode: ProfilingMode::Sampled,
        threads: Vec::new(),
    });
    let mut session = connect(&client, &manual_clock(1));
    start(&mut session);
    stop_and_settle(&mut session);
    assert!(session.run_until(WAIT, |_| client.saved().len() == 2));
    let first = Arc::clone(session.capture().unwrap());

    // Trace 9 spans 20ms..30ms
    session.select_range(Range::new(25_000.0, 40_000.0));
    assert!(session.run_until(WAIT, |s| s.capture().is_some_and(|c| c.trace_id() == TraceId(9))));

    // Trace 1 spans 1ms..6ms and is served from the cache
    session.select_range(Range::new(0.0, 1_000.0));
    assert!(session.run_until(WAIT, |s| s.capture().is_some_and(|c| c.trace_id() == TraceId(1))));
    assert!(Arc::ptr_eq(&first, session.capture().unwrap()));
}

#[test]
fn test_select_range_without_trace_clears_capture() {
    let client = ScriptedClient::new();
    client.push_stop_trace(1, single_thread_trace_1k());
    let mut session = connect(&client, &manual_clock(1));
    start(&mut session);
    stop_and_settle(&mut session);
    assert!(session.run_until(WAIT, |_| !client.saved().is_empty()));
    let events = session.subscribe();

    // Between the end of trace 1 (6ms) and anything else
    session.select_range(Range::new(7_000.0, 9_000.0));
    assert!(session.run_until(WAIT, |s| s.capture().is_none()));

    let events = drain(&events);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::CaptureChanged(None))));
    assert!(states(&events).is_empty());
    // The parse stays cached for a later selection
    assert!(session.trace_cache().get(TraceId(1)).is_some());
}

#[test]
fn test_elapsed_time_ticks_while_capturing() {
    let client = ScriptedClient::new();
    let config = SessionConfig { elapsed_tick_ms: 10, ..SessionConfig::default() };
    let clock = manual_clock(1);
    let mut session = connect_with(&client, &clock, config, Arc::new(TraceParser));
    let events = session.subscribe();
    session.enter();

    // Nothing is reported while idle
    session.run_until(std::time::Duration::from_millis(100), |_| false);
    assert!(!drain(&events).iter().any(|e| matches!(e, SessionEvent::ElapsedTime(_))));

    start(&mut session);
    clock.advance(Duration(250_000_000));
    let mut elapsed = None;
    session.run_until(WAIT, |_| {
        elapsed = events.try_iter().find_map(|e| match e {
            SessionEvent::ElapsedTime(d) => Some(d),
            _ => None,
        });
        elapsed.is_some()
    });
    assert_eq!(elapsed, Some(Duration(250_000_000)));

    session.exit();
}

#[test]
fn test_configuration_selection_is_used_for_next_start() {
    let client = ScriptedClient::new();
    let mut session = connect(&client, &manual_clock(1));
    let events = session.subscribe();

    let instrumented = session
        .profiling_configurations()
        .into_iter()
        .find(|c| c.mode == ProfilingMode::Instrumented)
        .unwrap();
    session.set_profiling_configuration(instrumented.clone());
    // Reselecting the same configuration is not a change
    session.set_profiling_configuration(instrumented.clone());

    let changes = drain(&events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::ProfilingConfigurationChanged(_)))
        .count();
    assert_eq!(changes, 1);

    start(&mut session);
    assert_eq!(client.started_with(), vec![instrumented.clone()]);
    assert_eq!(session.active_configuration(), Some(&instrumented));
}
