//! Stack frame formatting.
//!
//! Hosts capture call stacks as [`RawFrame`]s, innermost (closest to the
//! fault) first. [`StackFrameFormatter`] turns them into display-ready
//! [`TraceFrame`]s: `Owner->method(integer[1], "text")` summaries and
//! `short/path.rs:42` locations.

use crate::config::LoggerConfig;
use crate::constants::INCLUSION_FUNCTIONS;
use crate::value::{Value, flatten_argument};
use serde::{Deserialize, Serialize};

/// How a method was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Called on an instance, rendered `->`.
    #[default]
    Instance,
    /// Called on the type, rendered `::`.
    Static,
}

impl CallType {
    /// Returns the call operator glyph.
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Instance => "->",
            Self::Static => "::",
        }
    }
}

/// One frame of a captured call stack, as supplied by the host.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    /// Called function, or an inclusion keyword such as `require`
    pub function: Option<String>,
    /// Owning type of the called function
    pub class: Option<String>,
    /// Dispatch kind, meaningful only with `class`
    pub call_type: CallType,
    /// File the call was made from
    pub file: Option<String>,
    /// Line the call was made from
    pub line: Option<u32>,
    /// Call arguments
    pub args: Vec<Value>,
}

impl RawFrame {
    /// Creates a frame for a call to `function`.
    pub fn call(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            ..Self::default()
        }
    }

    /// Creates a location-only frame.
    pub fn location(file: impl Into<String>, line: u32) -> Self {
        Self::default().at(file, line)
    }

    /// Creates a frame for the inclusion of `path`.
    pub fn include(path: impl Into<String>) -> Self {
        Self::call("include").with_args(vec![Value::Str(path.into())])
    }

    /// Sets the owning type and dispatch kind.
    pub fn in_class(mut self, class: impl Into<String>, call_type: CallType) -> Self {
        self.class = Some(class.into());
        self.call_type = call_type;
        self
    }

    /// Sets the call site.
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Sets the call arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Returns true if this frame is a file inclusion rather than a call.
    pub fn is_inclusion(&self) -> bool {
        self.function
            .as_deref()
            .is_some_and(|f| INCLUSION_FUNCTIONS.contains(&f))
    }
}

/// A display-ready trace frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Rendered call description or included file path
    pub summary: String,
    /// `path:line`, when known
    pub location: Option<String>,
}

impl TraceFrame {
    /// Creates a frame with only a location.
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            summary: String::new(),
            location: Some(location.into()),
        }
    }
}

/// Formats raw frames according to the naming and path options.
pub struct StackFrameFormatter<'a> {
    config: &'a LoggerConfig,
}

impl<'a> StackFrameFormatter<'a> {
    /// Creates a formatter bound to `config`.
    pub fn new(config: &'a LoggerConfig) -> Self {
        Self { config }
    }

    /// Formats a single frame.
    pub fn format(&self, frame: &RawFrame) -> TraceFrame {
        let summary = if frame.is_inclusion() {
            let included = match frame.args.first() {
                Some(Value::Str(path)) => Some(path.as_str()),
                _ => frame.file.as_deref(),
            };
            included
                .map(|path| self.config.shorten_path(path))
                .unwrap_or_default()
        } else {
            self.call_summary(frame)
        };

        TraceFrame {
            summary,
            location: self.location(frame.file.as_deref(), frame.line),
        }
    }

    /// Builds a trace for a fault raised at `fault` (file and line).
    ///
    /// `frames` are innermost-first. A location-only frame for the fault
    /// site is spliced in front unless the innermost frame already sits on
    /// that exact file and line. The stack limit keeps the frames closest to
    /// the fault. The result is most-recent-first.
    pub fn backtrace(&self, frames: &[RawFrame], fault: Option<(&str, u32)>) -> Vec<TraceFrame> {
        let splice = fault.filter(|(file, line)| {
            frames.first().is_none_or(|innermost| {
                innermost.file.as_deref() != Some(*file) || innermost.line != Some(*line)
            })
        });

        let spliced = splice.map(|(file, line)| RawFrame::location(file, line));
        let limit = match self.config.stack_limit {
            0 => usize::MAX,
            n => n,
        };

        spliced
            .iter()
            .chain(frames.iter())
            .take(limit)
            .map(|frame| self.format(frame))
            .collect()
    }

    /// Formats a `path:line` location, or `None` without a file.
    pub fn location(&self, file: Option<&str>, line: Option<u32>) -> Option<String> {
        file.map(|file| {
            format!(
                "{}:{}",
                self.config.shorten_path(file),
                line.unwrap_or_default()
            )
        })
    }

    fn call_summary(&self, frame: &RawFrame) -> String {
        let mut summary = String::new();

        if let Some(class) = &frame.class {
            summary.push_str(self.config.unnamespace(class));
            summary.push_str(frame.call_type.glyph());
        }

        if let Some(function) = &frame.function {
            let args: Vec<String> = frame
                .args
                .iter()
                .map(|arg| flatten_argument(arg, self.config))
                .collect();
            summary.push_str(self.config.unnamespace(function));
            summary.push('(');
            summary.push_str(&args.join(", "));
            summary.push(')');
        }

        summary
    }
}
