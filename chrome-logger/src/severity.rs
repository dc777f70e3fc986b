//! Severity normalization.
//!
//! Hosts report faults with numeric error codes (a bitmask family, see
//! [`level`]) while application code logs with short names such as `"warn"`
//! or `"db"`. Both collapse into one of four console [`Severity`] classes plus
//! a human display label.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw error level codes understood by the normalization table.
///
/// Each code is a single bit so that [`crate::LoggerConfig::error_level_mask`]
/// can select which of them are reported.
pub mod level {
    /// Fatal run-time error.
    pub const ERROR: u32 = 1;
    /// Run-time warning.
    pub const WARNING: u32 = 1 << 1;
    /// Parse error.
    pub const PARSE: u32 = 1 << 2;
    /// Run-time notice.
    pub const NOTICE: u32 = 1 << 3;
    /// Fatal error raised during startup.
    pub const CORE_ERROR: u32 = 1 << 4;
    /// Warning raised during startup.
    pub const CORE_WARNING: u32 = 1 << 5;
    /// Fatal compile-time error.
    pub const COMPILE_ERROR: u32 = 1 << 6;
    /// Compile-time warning.
    pub const COMPILE_WARNING: u32 = 1 << 7;
    /// Error raised by application code.
    pub const USER_ERROR: u32 = 1 << 8;
    /// Warning raised by application code.
    pub const USER_WARNING: u32 = 1 << 9;
    /// Notice raised by application code.
    pub const USER_NOTICE: u32 = 1 << 10;
    /// Strictness suggestion.
    pub const STRICT: u32 = 1 << 11;
    /// Catchable fatal error.
    pub const RECOVERABLE_ERROR: u32 = 1 << 12;
    /// Deprecation notice.
    pub const DEPRECATED: u32 = 1 << 13;
    /// Deprecation notice raised by application code.
    pub const USER_DEPRECATED: u32 = 1 << 14;
    /// Every level above.
    pub const ALL: u32 = (1 << 15) - 1;
}

/// Console method a log entry is replayed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// `console.info`
    Info,
    /// `console.log`, the protocol default
    Log,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
}

impl Severity {
    /// Returns the console method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Log => "log",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Label used when the raw severity has no explicit one ("Info", "Warn", ...).
    pub fn default_label(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Log => "Log",
            Self::Warn => "Warn",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity as supplied by a hook or by application code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSeverity {
    /// Numeric error level, usually one of the [`level`] constants.
    Code(u32),
    /// Short name such as `"info"`, `"w"` or `"console"`.
    Name(String),
}

impl Default for RawSeverity {
    fn default() -> Self {
        Self::Name("info".to_string())
    }
}

impl From<u32> for RawSeverity {
    fn from(code: u32) -> Self {
        Self::Code(code)
    }
}

impl From<&str> for RawSeverity {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for RawSeverity {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Severity> for RawSeverity {
    fn from(severity: Severity) -> Self {
        Self::Name(severity.as_str().to_string())
    }
}

impl RawSeverity {
    /// Normalizes into a console class and a display label.
    ///
    /// Anything unrecognized is an error; the label falls back to the class
    /// name when the table has no explicit entry.
    pub fn normalize(&self) -> (Severity, String) {
        let severity = self.severity();
        let label = self
            .explicit_label()
            .unwrap_or_else(|| severity.default_label());
        (severity, label.to_string())
    }

    fn severity(&self) -> Severity {
        match self {
            Self::Name(name) => match name.as_str() {
                "i" | "info" | "console" => Severity::Info,
                "l" | "log" | "notice" => Severity::Log,
                "w" | "warn" | "warning" => Severity::Warn,
                _ => Severity::Error,
            },
            Self::Code(code) => match *code {
                level::USER_NOTICE => Severity::Info,
                level::NOTICE => Severity::Log,
                level::DEPRECATED
                | level::USER_DEPRECATED
                | level::USER_WARNING
                | level::WARNING
                | level::STRICT => Severity::Warn,
                _ => Severity::Error,
            },
        }
    }

    fn explicit_label(&self) -> Option<&'static str> {
        match self {
            Self::Name(name) => match name.as_str() {
                "console" => Some("Console"),
                "db" => Some("Database"),
                _ => None,
            },
            Self::Code(code) => match *code {
                level::USER_NOTICE | level::NOTICE => Some("Notice"),
                level::DEPRECATED | level::USER_DEPRECATED => Some("Deprecated"),
                level::USER_WARNING | level::WARNING => Some("Warning"),
                level::STRICT => Some("Strict"),
                _ => None,
            },
        }
    }
}
