//! Constants and default values for the logger.
//!
//! Protocol strings live here so the header encoder, the deferred renderer
//! and the tests agree on a single source.

/// Version string carried in the `version` field of every header payload.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Name of the response header that carries the encoded log.
pub const HEADER_NAME: &str = "x-chromelogger-data";

/// Fixed column layout of every header payload.
pub const COLUMNS: [&str; 3] = ["log", "backtrace", "type"];

/// Default header budget in bytes.
///
/// Servers cap header size differently (Apache 8k, nginx 4k-8k, IIS 8k-16k),
/// so the default stays just under the common 8k ceiling.
pub const DEFAULT_MAX_HEADER_SIZE: i64 = 8128;

/// Default memory ceiling in bytes before logging stops (64 MiB).
pub const DEFAULT_MAX_MEMORY_USAGE: u64 = 64 * 1024 * 1024;

/// Number of characters kept when a string argument is flattened for display.
pub const STRING_PREVIEW_LEN: usize = 10;

/// Container nesting at which message serialization stops expanding.
///
/// Each object adds two JSON levels, so the encoded payload stays well
/// under the 128-level limit common JSON parsers enforce.
pub const MAX_SERIALIZE_DEPTH: usize = 32;

/// Marker appended to truncated string previews.
pub const ELLIPSIS: &str = "…";

/// Store key of the sentinel entry written when the memory ceiling trips.
pub const MEMORY_SENTINEL_KEY: &str = "maxed_out";

/// Message of the memory sentinel entry.
pub const MEMORY_SENTINEL_MESSAGE: &str =
    "Chrome Logger has exceeded the memory usage limit and has ceased logging additional messages.";

/// Store key of the synthetic call map entry.
pub const CALL_MAP_KEY: &str = "callmap";

/// Label of the synthetic call map entry.
pub const CALL_MAP_LABEL: &str = "Call Stack";

/// Function names that denote a file inclusion rather than a call.
pub const INCLUSION_FUNCTIONS: &[&str] = &["require", "require_once", "include", "include_once"];

/// Label of the first row of a trace group.
pub const TRACE_LABEL: &str = "Trace:";

/// Label of every subsequent row inside a trace group.
pub const TRACE_CONTINUATION: &str = "«";
