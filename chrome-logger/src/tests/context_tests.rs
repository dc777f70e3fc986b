//! Request scenario tests - hooks, memory ceiling, deferral and finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use proptest::prelude::*;
use serde_json::json;

use crate::config::LoggerConfig;
use crate::constants::{CALL_MAP_KEY, HEADER_NAME, MEMORY_SENTINEL_KEY};
use crate::context::RequestContext;
use crate::frame::{CallType, RawFrame};
use crate::hooks::{ErrorEvent, ErrorHandlerFn, ExceptionEvent, ExceptionHandlerFn, LastFault};
use crate::severity::{Severity, level};
use crate::transport::{BufferedResponse, HeaderPayload};
use crate::value::{ObjectHandle, Value};

fn html() -> BufferedResponse {
    BufferedResponse::new().with_content_type("text/html")
}

fn context(config: LoggerConfig) -> RequestContext<BufferedResponse> {
    RequestContext::new(Arc::new(config), html())
}

fn header_rows(response: &BufferedResponse) -> Vec<serde_json::Value> {
    response
        .header(HEADER_NAME)
        .map(|value| HeaderPayload::decode(value).unwrap().rows)
        .unwrap_or_default()
}

fn counting_error_handler(calls: Arc<AtomicUsize>, answer: bool) -> ErrorHandlerFn {
    Arc::new(move |_event: &ErrorEvent| {
        calls.fetch_add(1, Ordering::SeqCst);
        answer
    })
}

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn test_three_messages_split_across_header_and_script() {
    let mut ctx = context(LoggerConfig::new());
    ctx.console("one");
    ctx.console_log("two", "warn", &[]);
    ctx.sink_mut().commit();
    ctx.console_log("three", "error", &[]);

    assert!(ctx.transport().is_deferring());
    assert!(ctx.passback_errors());

    let finished = ctx.finish();
    assert_eq!(
        header_rows(&finished.sink),
        vec![
            json!([["Console:", "one"], null, "info"]),
            json!([["Warn:", "two"], null, "warn"]),
        ]
    );

    let script = finished.script.expect("script for deferred entry");
    assert!(script.contains(r#"console.error("Error:", "#));
    assert!(script.contains(r#".cleanObjectProperties("three")"#));
    assert!(!script.contains(r#"cleanObjectProperties("one")"#));
    assert_eq!(finished.entries.len(), 3);
}

#[test]
fn test_no_script_for_non_html() {
    let mut ctx = RequestContext::new(
        Arc::new(LoggerConfig::new()),
        BufferedResponse::new().with_content_type("application/json"),
    );
    ctx.sink_mut().commit();
    ctx.console("late");

    let finished = ctx.finish();
    assert!(finished.script.is_none());
    assert!(finished.entries[0].deferred);
}

#[test]
fn test_no_script_when_head_not_sent() {
    let mut ctx = context(LoggerConfig::new().with_max_header_size(1));
    ctx.console("too big for the header");

    let finished = ctx.finish();
    assert!(finished.entries[0].deferred);
    assert!(finished.script.is_none());
}

#[test]
fn test_repeats_are_counted_once_per_site() {
    let frames = vec![RawFrame::call("handler").at("/srv/app/routes.rs", 10)];
    let mut ctx = context(LoggerConfig::new().with_document_root("/srv/app"));
    for _ in 0..3 {
        ctx.console_log("tick", "log", &frames);
    }

    assert_eq!(ctx.store().len(), 1);
    let entry = ctx.store().iter().next().unwrap();
    assert_eq!(entry.repeat_count, 3);
    assert_eq!(entry.trace[0].location.as_deref(), Some("routes.rs:10"));
}

#[test]
fn test_deeply_linked_message_still_decodes() {
    let nodes: Vec<ObjectHandle> = (0..100_000).map(|id| ObjectHandle::new(id, "Node")).collect();
    for pair in nodes.windows(2) {
        pair[0].set("next", pair[1].clone());
    }

    let mut ctx = context(LoggerConfig::new().with_max_header_size(1 << 20));
    ctx.console(nodes[0].clone());
    let finished = ctx.finish();

    let rows = header_rows(&finished.sink);
    assert_eq!(rows.len(), 1);
    assert!(rows[0][0][1].get("Node#0").is_some());

    for node in &nodes {
        node.clear();
    }
}

// =============================================================================
// Error hook
// =============================================================================

#[test]
fn test_on_error_strips_tags_and_splices_fault_site() {
    let mut ctx = context(LoggerConfig::new().with_document_root("/srv/app"));
    let event = ErrorEvent::new(level::WARNING, "Undefined <b>index</b>: id")
        .at("/srv/app/src/view.rs", 7)
        .with_frames(vec![
            RawFrame::call("render")
                .in_class("app::View", CallType::Instance)
                .at("/srv/app/src/main.rs", 30)
                .with_args(vec![Value::Int(1), "page".into()]),
        ]);

    assert!(ctx.on_error(&event));

    let entry = ctx.store().iter().next().unwrap();
    assert_eq!(entry.message, json!("Undefined index: id"));
    assert_eq!(entry.label, "Warning");
    assert_eq!(entry.severity, Severity::Warn);
    assert_eq!(entry.trace.len(), 2);
    assert_eq!(entry.trace[0].location.as_deref(), Some("src/view.rs:7"));
    assert_eq!(entry.trace[1].summary, r#"View->render(integer[1], "page")"#);
}

#[test]
fn test_on_error_does_not_duplicate_fault_site() {
    let mut ctx = context(LoggerConfig::new());
    let event = ErrorEvent::new(level::ERROR, "boom")
        .at("main.rs", 3)
        .with_frames(vec![RawFrame::call("run").at("main.rs", 3)]);
    ctx.on_error(&event);

    let entry = ctx.store().iter().next().unwrap();
    assert_eq!(entry.trace.len(), 1);
    assert_eq!(entry.trace[0].summary, "run()");
}

#[test]
fn test_suppressed_error_is_ignored() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = context(LoggerConfig::new())
        .with_previous_error_handler(counting_error_handler(calls.clone(), true));

    assert!(!ctx.on_error(&ErrorEvent::new(level::NOTICE, "quiet").suppressed()));
    assert!(ctx.store().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_masked_level_is_left_to_host() {
    let mut ctx = context(LoggerConfig::new().with_error_level_mask(level::ERROR));
    assert!(ctx.on_error(&ErrorEvent::new(level::NOTICE, "ignored")));
    assert!(ctx.store().is_empty());
}

#[test]
fn test_previous_handler_answer_is_returned() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = context(LoggerConfig::new())
        .with_previous_error_handler(counting_error_handler(calls.clone(), false));

    assert!(!ctx.on_error(&ErrorEvent::new(level::ERROR, "boom")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_passback_off_until_deferral() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = context(LoggerConfig::new().with_passback_errors(false))
        .with_previous_error_handler(counting_error_handler(calls.clone(), false));

    assert!(ctx.on_error(&ErrorEvent::new(level::ERROR, "first")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    ctx.sink_mut().commit();
    assert!(!ctx.on_error(&ErrorEvent::new(level::ERROR, "second")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(ctx.passback_errors());
}

// =============================================================================
// Exception hook
// =============================================================================

#[test]
fn test_on_exception_records_error() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let handler: ExceptionHandlerFn = Arc::new(move |_event: &ExceptionEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut ctx = context(LoggerConfig::new()).with_previous_exception_handler(handler);
    ctx.on_exception(&ExceptionEvent::new("app::NotFound", "no such user").at("users.rs", 12));

    let entry = ctx.store().iter().next().unwrap();
    assert_eq!(entry.severity, Severity::Error);
    assert_eq!(entry.message, json!("no such user"));
    assert_eq!(entry.trace[0].location.as_deref(), Some("users.rs:12"));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Memory ceiling
// =============================================================================

#[test]
fn test_memory_ceiling_stops_logging() {
    let usage = Arc::new(AtomicU64::new(10));
    let probe_usage = usage.clone();
    let mut ctx = context(
        LoggerConfig::new()
            .with_passback_errors(false)
            .with_max_memory_usage(1_000),
    )
    .with_memory_probe(move || Some(probe_usage.load(Ordering::SeqCst)));

    ctx.console("before");
    assert!(!ctx.passback_errors());

    usage.store(2_000, Ordering::SeqCst);
    ctx.console("over");
    assert!(ctx.is_logging_stopped());
    assert!(ctx.passback_errors());

    usage.store(10, Ordering::SeqCst);
    ctx.console("after");

    let keys: Vec<&str> = ctx.store().iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[1], MEMORY_SENTINEL_KEY);
    assert!(ctx.store().get(MEMORY_SENTINEL_KEY).unwrap().deferred);
}

#[test]
fn test_memory_check_disabled_with_zero_ceiling() {
    let mut ctx = context(LoggerConfig::new().with_max_memory_usage(0))
        .with_memory_probe(|| Some(u64::MAX));
    ctx.console("fine");
    assert!(!ctx.is_logging_stopped());
    assert_eq!(ctx.store().len(), 1);
}

// =============================================================================
// Call map and last fault
// =============================================================================

#[test]
fn test_call_map_requires_opt_in() {
    let frames = vec![RawFrame::call("main").at("main.rs", 1)];

    let mut ctx = context(LoggerConfig::new());
    ctx.sample_call_stack(&frames);
    assert!(!ctx.store().contains(CALL_MAP_KEY));

    let mut ctx = context(LoggerConfig::new().with_call_stack(true));
    ctx.sample_call_stack(&frames);
    ctx.sample_call_stack(&frames);
    assert_eq!(ctx.store().len(), 1);
    assert!(ctx.store().get(CALL_MAP_KEY).unwrap().deferred);

    ctx.sink_mut().commit();
    let script = ctx.finish().script.expect("call map is always deferred");
    assert!(script.contains("console.callstack = "));
    assert!(script.contains(r#"console.callstack("Call Stack:", "#));
}

#[test]
fn test_last_fault_recorded_at_finish() {
    let mut ctx = context(LoggerConfig::new().with_document_root("/srv/app"));
    ctx.console("normal");
    ctx.set_last_fault(LastFault {
        code: level::ERROR,
        message: "<b>Fatal</b> out of time".into(),
        file: "/srv/app/slow.rs".into(),
        line: 99,
    });

    let finished = ctx.finish();
    let fault = finished.entries.last().unwrap();
    assert_eq!(fault.message, json!("Fatal out of time"));
    assert_eq!(fault.trace.len(), 1);
    assert_eq!(fault.trace[0].location.as_deref(), Some("slow.rs:99"));

    let rows = header_rows(&finished.sink);
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1], json!([["Error:", "Fatal out of time"], null, "error"]));
}

// =============================================================================
// Property-Based Tests
// =============================================================================

proptest! {
    /// Property: every recorded message lands in exactly one transport,
    /// header or script, and the split point is the first deferral.
    #[test]
    fn prop_entries_partition_at_latch(
        before in 0usize..8,
        after in 1usize..8,
    ) {
        let mut ctx = context(LoggerConfig::new().with_max_header_size(0));
        for i in 0..before {
            ctx.console(format!("before {}", i));
        }
        ctx.sink_mut().commit();
        for i in 0..after {
            ctx.console(format!("after {}", i));
        }

        let finished = ctx.finish();
        prop_assert_eq!(header_rows(&finished.sink).len(), before);

        let deferred: Vec<bool> = finished.entries.iter().map(|e| e.deferred).collect();
        let expected: Vec<bool> = (0..before + after).map(|i| i >= before).collect();
        prop_assert_eq!(deferred, expected);

        let script = finished.script.unwrap();
        prop_assert_eq!(script.matches("console.info(").count(), after);
    }
}
