//! Configuration for the logger.
//!
//! [`LoggerConfig`] is read once at start-up and shared read-only by every
//! request context. It can be built in code with the `with_*` builder methods
//! or deserialized from JSON; missing fields take their defaults.
//!
//! # Example
//! ```rust
//! use chrome_logger::LoggerConfig;
//!
//! let config = LoggerConfig::new()
//!     .with_document_root("/var/www")
//!     .with_max_header_size(4096)
//!     .with_stack_limit(12);
//! assert!(config.validate().is_ok());
//! ```

use crate::constants::{DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_MEMORY_USAGE};
use crate::severity::level;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigValidationError {
    /// shorten_file_paths requires a document_root
    MissingDocumentRoot,
    /// error_level_mask must select at least one level
    EmptyErrorLevelMask,
    /// The configuration document could not be parsed
    Parse(String),
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDocumentRoot => {
                write!(f, "shorten_file_paths requires a document_root")
            }
            Self::EmptyErrorLevelMask => {
                write!(f, "error_level_mask must select at least one level")
            }
            Self::Parse(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Logger configuration.
///
/// # Fields
///
/// * `passback_errors` - Forward faults to the previously registered handlers.
///   Forced on for the rest of a request once messages start deferring.
///
/// * `max_header_size` - Budget in bytes for the encoded header. Zero or
///   negative disables the check. Default: 8128.
///
/// * `max_memory_usage` - Memory ceiling in bytes; above it logging stops for
///   the request. Zero disables the check. Default: 64 MiB.
///
/// * `stack_limit` - Maximum frames kept per trace, closest to the fault
///   first. Zero keeps all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Forward faults to previously registered handlers (default: true)
    pub passback_errors: bool,
    /// Header budget in bytes, <= 0 means unlimited (default: 8128)
    pub max_header_size: i64,
    /// Memory ceiling in bytes, 0 means unchecked (default: 64 MiB)
    pub max_memory_usage: u64,
    /// Frames kept per trace, 0 means unlimited (default: 0)
    pub stack_limit: usize,
    /// Strip module prefixes from type and function names (default: true)
    pub remove_namespaces: bool,
    /// Strip `document_root` from file paths (default: false)
    pub shorten_file_paths: bool,
    /// Prefix removed by path shortening
    pub document_root: Option<String>,
    /// Maintain the sampled call map entry (default: false)
    pub enable_call_stack: bool,
    /// Error levels reported by the error hook (default: all)
    pub error_level_mask: u32,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            passback_errors: true,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_memory_usage: DEFAULT_MAX_MEMORY_USAGE,
            stack_limit: 0,
            remove_namespaces: true,
            shorten_file_paths: false,
            document_root: None,
            enable_call_stack: false,
            error_level_mask: level::ALL,
        }
    }
}

impl LoggerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration document and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigValidationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigValidationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.shorten_file_paths && self.document_root.is_none() {
            return Err(ConfigValidationError::MissingDocumentRoot);
        }
        if self.error_level_mask == 0 {
            return Err(ConfigValidationError::EmptyErrorLevelMask);
        }
        Ok(())
    }

    /// Sets whether faults are forwarded to previously registered handlers.
    pub fn with_passback_errors(mut self, enabled: bool) -> Self {
        self.passback_errors = enabled;
        self
    }

    /// Sets the header budget in bytes (<= 0 for unlimited).
    pub fn with_max_header_size(mut self, bytes: i64) -> Self {
        self.max_header_size = bytes;
        self
    }

    /// Sets the memory ceiling in bytes (0 to disable).
    pub fn with_max_memory_usage(mut self, bytes: u64) -> Self {
        self.max_memory_usage = bytes;
        self
    }

    /// Sets the maximum number of frames kept per trace.
    pub fn with_stack_limit(mut self, limit: usize) -> Self {
        self.stack_limit = limit;
        self
    }

    /// Sets whether module prefixes are stripped from names.
    pub fn with_remove_namespaces(mut self, enabled: bool) -> Self {
        self.remove_namespaces = enabled;
        self
    }

    /// Sets the document root and turns path shortening on.
    pub fn with_document_root(mut self, root: impl Into<String>) -> Self {
        self.document_root = Some(root.into());
        self.shorten_file_paths = true;
        self
    }

    /// Sets whether file paths are shortened.
    pub fn with_shorten_file_paths(mut self, enabled: bool) -> Self {
        self.shorten_file_paths = enabled;
        self
    }

    /// Sets whether the call map entry is maintained.
    pub fn with_call_stack(mut self, enabled: bool) -> Self {
        self.enable_call_stack = enabled;
        self
    }

    /// Sets the error levels reported by the error hook.
    pub fn with_error_level_mask(mut self, mask: u32) -> Self {
        self.error_level_mask = mask;
        self
    }

    /// Returns true if the error hook should report `code`.
    pub fn reports_level(&self, code: u32) -> bool {
        self.error_level_mask & code != 0
    }

    /// Normalizes separators and strips the document root when configured.
    pub fn shorten_path(&self, path: &str) -> String {
        let path = path.replace('\\', "/");
        match (&self.document_root, self.shorten_file_paths) {
            (Some(root), true) => {
                let root = root.replace('\\', "/");
                let root = root.trim_end_matches('/');
                let shortened = path
                    .strip_prefix(root)
                    .filter(|rest| rest.is_empty() || rest.starts_with('/'))
                    .map(|rest| rest.trim_start_matches('/').to_string());
                shortened.unwrap_or(path)
            }
            _ => path,
        }
    }

    /// Reduces a qualified type or function name to its last segment when
    /// namespace removal is on. `::`, `\` and `/` all count as separators.
    pub fn unnamespace<'a>(&self, name: &'a str) -> &'a str {
        if !self.remove_namespaces {
            return name;
        }
        name.rsplit(|c: char| matches!(c, '\\' | '/' | ':'))
            .find(|segment| !segment.is_empty())
            .unwrap_or(name)
    }
}
