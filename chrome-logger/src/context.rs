//! The request-scoped logging context.
//!
//! A [`RequestContext`] is created when a request starts, receives every
//! hook call and manual log line for that request, and is consumed by
//! [`RequestContext::finish`] when the request ends. Nothing is shared
//! between contexts except the read-only configuration.

use crate::callstack::CallStackAggregator;
use crate::config::LoggerConfig;
use crate::error::ChromeLoggerError;
use crate::frame::{RawFrame, StackFrameFormatter, TraceFrame};
use crate::hooks::{
    ErrorEvent, ErrorHandlerFn, ExceptionEvent, ExceptionHandlerFn, LastFault, MemoryProbe,
    NoMemoryProbe, strip_tags,
};
use crate::render::{is_html, namespace_token, render_deferred};
use crate::severity::RawSeverity;
use crate::store::{LogEntry, LogStore, RecordOutcome};
use crate::transport::{HeaderSink, TransportDecider};
use crate::value::{Value, serialize_value};
use std::sync::Arc;

/// What is left of a request context once the request ends.
#[derive(Debug)]
pub struct Finished<S> {
    /// The response sink, header included when one was written
    pub sink: S,
    /// Replay script for deferred entries, when the response is HTML
    pub script: Option<String>,
    /// Every entry recorded during the request, in insertion order
    pub entries: Vec<LogEntry>,
}

/// Per-request logging state.
///
/// # Example
///
/// ```rust
/// use chrome_logger::{BufferedResponse, LoggerConfig, RequestContext};
/// use std::sync::Arc;
///
/// let config = Arc::new(LoggerConfig::new());
/// let mut ctx = RequestContext::new(config, BufferedResponse::new());
/// ctx.console("hello");
///
/// let finished = ctx.finish();
/// assert!(finished.sink.header("x-chromelogger-data").is_some());
/// ```
pub struct RequestContext<S: HeaderSink> {
    config: Arc<LoggerConfig>,
    sink: S,
    store: LogStore,
    transport: TransportDecider,
    call_stack: CallStackAggregator,
    memory: Arc<dyn MemoryProbe>,
    previous_error_handler: Option<ErrorHandlerFn>,
    previous_exception_handler: Option<ExceptionHandlerFn>,
    passback_errors: bool,
    logging_stopped: bool,
    last_fault: Option<LastFault>,
}

impl<S: HeaderSink> RequestContext<S> {
    /// Creates a context writing its header into `sink`.
    pub fn new(config: Arc<LoggerConfig>, sink: S) -> Self {
        Self {
            transport: TransportDecider::new(config.max_header_size),
            passback_errors: config.passback_errors,
            config,
            sink,
            store: LogStore::new(),
            call_stack: CallStackAggregator::new(),
            memory: Arc::new(NoMemoryProbe),
            previous_error_handler: None,
            previous_exception_handler: None,
            logging_stopped: false,
            last_fault: None,
        }
    }

    /// Sets the memory usage source.
    pub fn with_memory_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.memory = Arc::new(probe);
        self
    }

    /// Sets the error handler that was registered before this one.
    pub fn with_previous_error_handler(mut self, handler: ErrorHandlerFn) -> Self {
        self.previous_error_handler = Some(handler);
        self
    }

    /// Sets the exception handler that was registered before this one.
    pub fn with_previous_exception_handler(mut self, handler: ExceptionHandlerFn) -> Self {
        self.previous_exception_handler = Some(handler);
        self
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// Records a message with an already formatted trace.
    pub fn record(
        &mut self,
        message: impl Into<Value>,
        trace: Vec<TraceFrame>,
        severity: impl Into<RawSeverity>,
    ) {
        if self.check_memory() {
            return;
        }

        let message = serialize_value(&message.into(), &self.config);
        let transport = &mut self.transport;
        let sink = &mut self.sink;
        let outcome = self
            .store
            .record(message, trace, &severity.into(), |entry| {
                transport.decide(entry, sink)
            });

        if let RecordOutcome::Inserted { deferred: true, .. } = outcome {
            self.passback_errors = true;
        }
    }

    /// Logs a message from application code.
    ///
    /// `frames` is the caller's stack, innermost first; pass an empty slice
    /// to log without a trace.
    pub fn console_log(
        &mut self,
        message: impl Into<Value>,
        severity: impl Into<RawSeverity>,
        frames: &[RawFrame],
    ) {
        let trace = StackFrameFormatter::new(&self.config).backtrace(frames, None);
        self.record(message, trace, severity);
    }

    /// Logs a message with the `console` severity and no trace.
    pub fn console(&mut self, message: impl Into<Value>) {
        self.console_log(message, "console", &[]);
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    /// Error hook. Returns whether the host should continue its own handling.
    ///
    /// Suppressed errors are ignored and return `false`. Levels outside the
    /// configured mask are left to the host. When passback is on and a
    /// previous handler exists, its answer is returned.
    pub fn on_error(&mut self, event: &ErrorEvent) -> bool {
        if event.suppressed {
            return false;
        }
        if !self.config.reports_level(event.code) {
            return true;
        }

        let fault = event.file.as_deref().zip(event.line);
        let trace = StackFrameFormatter::new(&self.config).backtrace(&event.frames, fault);
        self.record(strip_tags(&event.message), trace, event.code);

        match (&self.previous_error_handler, self.passback_errors) {
            (Some(handler), true) => handler(event),
            _ => true,
        }
    }

    /// Exception hook.
    pub fn on_exception(&mut self, event: &ExceptionEvent) {
        let fault = event.file.as_deref().zip(event.line);
        let trace = StackFrameFormatter::new(&self.config).backtrace(&event.frames, fault);
        self.record(event.message.as_str(), trace, "error");

        if let (Some(handler), true) = (&self.previous_exception_handler, self.passback_errors) {
            handler(event);
        }
    }

    /// Merges a stack sample into the call map entry. No-op unless enabled.
    pub fn sample_call_stack(&mut self, frames: &[RawFrame]) {
        if !self.config.enable_call_stack || self.logging_stopped {
            return;
        }
        self.call_stack.sample(frames, &self.config);
        self.store.upsert_call_map(self.call_stack.to_json());
    }

    /// Remembers the fatal error that ended the request.
    pub fn set_last_fault(&mut self, fault: LastFault) {
        self.last_fault = Some(fault);
    }

    // =========================================================================
    // End of request
    // =========================================================================

    /// Ends the request.
    ///
    /// Records the last fault, if any, then renders the replay script when
    /// the response head is already out, the response is HTML and at least
    /// one entry is deferred.
    pub fn finish(mut self) -> Finished<S> {
        if let Some(fault) = self.last_fault.take() {
            let location = StackFrameFormatter::new(&self.config)
                .location(Some(&fault.file), Some(fault.line));
            let trace = location.map(TraceFrame::at).into_iter().collect();
            self.record(strip_tags(&fault.message), trace, fault.code);
        }

        let script = if self.sink.headers_sent() && is_html(self.sink.content_type()) {
            render_deferred(self.store.iter(), &namespace_token())
        } else {
            None
        };

        tracing::debug!(
            entries = self.store.len(),
            deferred = self.store.deferred().count(),
            rendered = script.is_some(),
            "request log finished"
        );

        Finished {
            sink: self.sink,
            script,
            entries: self.store.drain(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The configuration this context was created with.
    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Entries recorded so far.
    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Transport state.
    pub fn transport(&self) -> &TransportDecider {
        &self.transport
    }

    /// The response sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the response sink, e.g. to commit it.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Whether faults are currently forwarded to previous handlers.
    pub fn passback_errors(&self) -> bool {
        self.passback_errors
    }

    /// True once the memory ceiling stopped logging for this request.
    pub fn is_logging_stopped(&self) -> bool {
        self.logging_stopped
    }

    /// Trips the memory latch when usage is above the ceiling.
    /// Returns true when the caller must not record.
    fn check_memory(&mut self) -> bool {
        if self.logging_stopped {
            return true;
        }

        let limit = self.config.max_memory_usage;
        let usage = match self.memory.current_usage() {
            Some(usage) if limit > 0 && usage > limit => usage,
            _ => return false,
        };

        let reason = ChromeLoggerError::MemoryLimitExceeded { usage, limit };
        tracing::warn!(reason = %reason, "logging stopped for this request");
        self.logging_stopped = true;
        self.passback_errors = true;
        self.store.insert_memory_sentinel();
        true
    }
}
