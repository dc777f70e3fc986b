#![warn(missing_docs)]
//! # ChromeLogger
//!
//! Request-scoped relay of server-side errors, exceptions and debug messages
//! to a browser console through the ChromeLogger protocol.
//!
//! ## Overview
//!
//! Every request gets its own [`RequestContext`]. Messages flow through one
//! pipeline:
//! - **Serialization** of arbitrary runtime values, cyclic object graphs included
//! - **Stack formatting** into short `Owner->method(args)` summaries
//! - **De-duplication** of identical messages from the same call site
//! - **Transport** through a single response header while it still fits
//! - **Deferral** into an inline replay script once the header window closes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌──────────┐   ┌──────────────────┐
//! │ on_error     │   │ ValueSerializer│   │ LogStore │   │ TransportDecider │
//! │ on_exception │──▶│ FrameFormatter │──▶│ (dedup)  │──▶│ header | defer   │
//! │ console_log  │   └────────────────┘   └──────────┘   └────────┬─────────┘
//! └──────────────┘                                               │
//!                                                                 ▼
//!                               X-ChromeLogger-Data header  or  <script> at finish
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use chrome_logger::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Arc::new(
//!     LoggerConfig::new()
//!         .with_document_root("/srv/app")
//!         .with_stack_limit(8),
//! );
//!
//! let mut ctx = RequestContext::new(config, BufferedResponse::new());
//!
//! ctx.console("request started");
//! let keep_going = ctx.on_error(
//!     &ErrorEvent::new(level::WARNING, "Division by zero").at("/srv/app/src/math.rs", 12),
//! );
//! assert!(keep_going);
//!
//! let finished = ctx.finish();
//! let header = finished.sink.header(HEADER_NAME).expect("header written");
//! let payload = HeaderPayload::decode(header).expect("valid payload");
//! assert_eq!(payload.version, "2.0");
//! ```
//!
//! ## Deferred Delivery
//!
//! Once the response head is flushed, or the payload would outgrow
//! `max_header_size`, new entries are deferred. For HTML responses
//! [`RequestContext::finish`] returns a script replaying them:
//!
//! ```rust
//! use chrome_logger::prelude::*;
//! use std::sync::Arc;
//!
//! let response = BufferedResponse::new().with_content_type("text/html; charset=utf-8");
//! let mut ctx = RequestContext::new(Arc::new(LoggerConfig::new()), response);
//!
//! ctx.sink_mut().commit();
//! ctx.console("after flush");
//!
//! let script = ctx.finish().script.expect("replay script");
//! assert!(script.contains("console.info(\"Console:\""));
//! ```

pub mod callstack;
pub mod config;
pub mod constants;
mod context;
mod error;
pub mod frame;
pub mod hooks;
pub mod render;
pub mod severity;
pub mod store;
pub mod transport;
pub mod value;

#[cfg(test)]
mod tests;

pub use callstack::{CallNode, CallStackAggregator};
pub use config::{ConfigValidationError, LoggerConfig};
pub use constants::HEADER_NAME;
pub use context::{Finished, RequestContext};
pub use error::{ChromeLoggerError, ChromeLoggerResult};
pub use frame::{CallType, RawFrame, StackFrameFormatter, TraceFrame};
pub use hooks::{
    ErrorEvent, ErrorHandlerFn, ExceptionEvent, ExceptionHandlerFn, LastFault, MemoryProbe,
    NoMemoryProbe,
};
pub use render::render_deferred;
pub use severity::{RawSeverity, Severity, level};
pub use store::{EntryKind, LogEntry, LogStore, RecordOutcome};
pub use transport::{
    BufferedResponse, HeaderPayload, HeaderSink, TransportDecider, TransportState,
};
pub use value::{Callable, ObjectHandle, ObjectId, Value, ValueSerializer};

/// Commonly used types.
///
/// ```rust
/// use chrome_logger::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Host boundary
        BufferedResponse,
        CallType,
        Callable,
        // Errors
        ChromeLoggerError,
        ChromeLoggerResult,
        // Configuration
        ConfigValidationError,
        ErrorEvent,
        ExceptionEvent,
        Finished,
        HEADER_NAME,
        HeaderPayload,
        HeaderSink,
        LastFault,
        // Pipeline
        LogEntry,
        LoggerConfig,
        MemoryProbe,
        ObjectHandle,
        RawFrame,
        RawSeverity,
        RequestContext,
        Severity,
        TraceFrame,
        Value,
        level,
    };
}
