//! Types exchanged with the host's error and exception hooks.

use crate::frame::RawFrame;
use regex::Regex;
use std::sync::{Arc, LazyLock};

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Removes markup from a fault message.
pub fn strip_tags(message: &str) -> String {
    HTML_TAG.replace_all(message, "").into_owned()
}

/// A runtime error reported by the host.
#[derive(Debug, Clone, Default)]
pub struct ErrorEvent {
    /// Error level, one of [`crate::level`]
    pub code: u32,
    /// Error message, possibly with markup
    pub message: String,
    /// File the error was raised in
    pub file: Option<String>,
    /// Line the error was raised on
    pub line: Option<u32>,
    /// Call stack at the raise, innermost first
    pub frames: Vec<RawFrame>,
    /// True when the host silenced this error at the raise site
    pub suppressed: bool,
}

impl ErrorEvent {
    /// Creates an event for `code` with `message`.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the raise site.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Sets the captured call stack.
    pub fn with_frames(mut self, frames: Vec<RawFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Marks the event as suppressed.
    pub fn suppressed(mut self) -> Self {
        self.suppressed = true;
        self
    }
}

/// An uncaught exception reported by the host.
#[derive(Debug, Clone, Default)]
pub struct ExceptionEvent {
    /// Exception type name
    pub class: String,
    /// Exception message
    pub message: String,
    /// File the exception was thrown from
    pub file: Option<String>,
    /// Line the exception was thrown from
    pub line: Option<u32>,
    /// Call stack at the throw, innermost first
    pub frames: Vec<RawFrame>,
}

impl ExceptionEvent {
    /// Creates an event for an exception of type `class`.
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Sets the throw site.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Sets the captured call stack.
    pub fn with_frames(mut self, frames: Vec<RawFrame>) -> Self {
        self.frames = frames;
        self
    }
}

/// The last fatal error observed when the request ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastFault {
    /// Error level
    pub code: u32,
    /// Error message, possibly with markup
    pub message: String,
    /// File of the fault
    pub file: String,
    /// Line of the fault
    pub line: u32,
}

/// Previously registered error handler; its return value is passed through.
pub type ErrorHandlerFn = Arc<dyn Fn(&ErrorEvent) -> bool + Send + Sync>;

/// Previously registered exception handler.
pub type ExceptionHandlerFn = Arc<dyn Fn(&ExceptionEvent) + Send + Sync>;

/// Source of the current memory usage reading.
pub trait MemoryProbe: Send + Sync {
    /// Current usage in bytes, or `None` when unknown.
    fn current_usage(&self) -> Option<u64>;
}

impl<F> MemoryProbe for F
where
    F: Fn() -> Option<u64> + Send + Sync,
{
    fn current_usage(&self) -> Option<u64> {
        self()
    }
}

/// Probe that never reports usage, disabling the memory check.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemoryProbe;

impl MemoryProbe for NoMemoryProbe {
    fn current_usage(&self) -> Option<u64> {
        None
    }
}
