//! Header transport and the deferral latch.
//!
//! While accumulating, every new entry is appended to the header payload and
//! the whole payload is re-encoded and written to the response, replacing the
//! previous value. The first time that cannot happen (headers already sent,
//! budget exceeded, encoding failure) the decider latches into
//! [`TransportState::Deferring`] for the rest of the request.
//!
//! # Wire format
//!
//! ```text
//! X-ChromeLogger-Data: base64({"version": "2.0",
//!                              "columns": ["log", "backtrace", "type"],
//!                              "rows": [[[label, message], backtrace, type], ...]})
//! ```

use crate::constants::{COLUMNS, HEADER_NAME, PROTOCOL_VERSION, TRACE_CONTINUATION, TRACE_LABEL};
use crate::error::{ChromeLoggerError, ChromeLoggerResult};
use crate::severity::Severity;
use crate::store::LogEntry;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

// =============================================================================
// Response Boundary
// =============================================================================

/// The part of an outgoing response the logger needs.
pub trait HeaderSink {
    /// Returns true once the response head has gone out.
    fn headers_sent(&self) -> bool;

    /// Sets `name`, replacing any previous value.
    fn replace_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Returns the response content type, if set.
    fn content_type(&self) -> Option<&str>;
}

impl HeaderSink for HeaderMap {
    fn headers_sent(&self) -> bool {
        false
    }

    fn replace_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.insert(name, value);
    }

    fn content_type(&self) -> Option<&str> {
        self.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

impl<T: HeaderSink + ?Sized> HeaderSink for &mut T {
    fn headers_sent(&self) -> bool {
        (**self).headers_sent()
    }

    fn replace_header(&mut self, name: HeaderName, value: HeaderValue) {
        (**self).replace_header(name, value);
    }

    fn content_type(&self) -> Option<&str> {
        (**self).content_type()
    }
}

/// A response head that can be committed.
///
/// Models the boundary hosts care about: headers are writable until the
/// first body byte is flushed ([`BufferedResponse::commit`]).
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    headers: HeaderMap,
    committed: bool,
}

impl BufferedResponse {
    /// Creates an uncommitted response with no headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self
    }

    /// Marks the head as sent. Irreversible.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Returns true once committed.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Returns the header map.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the header map, consuming the response.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}

impl HeaderSink for BufferedResponse {
    fn headers_sent(&self) -> bool {
        self.committed
    }

    fn replace_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.committed {
            self.headers.insert(name, value);
        }
    }

    fn content_type(&self) -> Option<&str> {
        self.headers.content_type()
    }
}

// =============================================================================
// Payload
// =============================================================================

/// The JSON document carried by the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderPayload {
    /// Protocol version
    pub version: String,
    /// Column layout, always `["log", "backtrace", "type"]`
    pub columns: Vec<String>,
    /// Row arrays
    pub rows: Vec<JsonValue>,
}

impl Default for HeaderPayload {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

impl HeaderPayload {
    /// Appends the rows describing `entry`.
    ///
    /// The message row carries the type only when it is not `log`. A
    /// non-empty trace becomes a collapsed group: the most recent frame
    /// opens it, the rest follow as nested rows, and a `groupEnd` row closes it.
    pub fn push_entry(&mut self, entry: &LogEntry) {
        let mut row = vec![json!([entry.display_label(), entry.message])];
        if entry.severity != Severity::Log {
            row.push(JsonValue::Null);
            row.push(JsonValue::String(entry.severity.to_string()));
        }
        self.rows.push(JsonValue::Array(row));

        let mut frames = entry.trace.iter();
        let Some(first) = frames.next() else {
            return;
        };

        self.rows.push(json!([
            [TRACE_LABEL, first.summary],
            first.location.as_ref().map(|loc| format!("@ {}", loc)),
            "groupCollapsed"
        ]));

        for frame in frames {
            let mut row = vec![json!([TRACE_CONTINUATION, frame.summary])];
            if let Some(location) = &frame.location {
                row.push(JsonValue::String(format!("@ {}", location)));
            }
            self.rows.push(JsonValue::Array(row));
        }

        self.rows.push(json!([[], null, "groupEnd"]));
    }

    /// Encodes the payload as base64 JSON.
    pub fn encode(&self) -> ChromeLoggerResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decodes a header value produced by [`HeaderPayload::encode`].
    pub fn decode(encoded: &str) -> ChromeLoggerResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ChromeLoggerError::Encoding(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// =============================================================================
// Decider
// =============================================================================

/// Transport state of one request. `Deferring` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// New entries still go into the header.
    #[default]
    Accumulating,
    /// New entries wait for the deferred script.
    Deferring,
}

/// Decides per entry between header delivery and deferral.
#[derive(Debug)]
pub struct TransportDecider {
    state: TransportState,
    header_sent: bool,
    cumulative_header_size: usize,
    max_header_size: i64,
    payload: HeaderPayload,
}

impl TransportDecider {
    /// Creates an accumulating decider with the given budget (<= 0 for none).
    pub fn new(max_header_size: i64) -> Self {
        Self {
            state: TransportState::Accumulating,
            header_sent: false,
            cumulative_header_size: 0,
            max_header_size,
            payload: HeaderPayload::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Returns true once latched.
    pub fn is_deferring(&self) -> bool {
        self.state == TransportState::Deferring
    }

    /// Returns true once a header write was attempted against a sent
    /// response or a header value went out.
    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    /// Encoded size of the last header written.
    pub fn cumulative_header_size(&self) -> usize {
        self.cumulative_header_size
    }

    /// Payload accumulated so far.
    pub fn payload(&self) -> &HeaderPayload {
        &self.payload
    }

    /// Handles a new entry and returns its `deferred` flag.
    pub fn decide<S: HeaderSink + ?Sized>(&mut self, entry: &LogEntry, sink: &mut S) -> bool {
        if self.is_deferring() {
            return true;
        }

        match self.emit(entry, sink) {
            Ok(size) => {
                self.header_sent = true;
                self.cumulative_header_size = size;
                tracing::trace!(key = %entry.key, size, "header updated");
                false
            }
            Err(reason) => {
                self.latch(&reason);
                true
            }
        }
    }

    /// Latches into `Deferring`.
    pub fn latch(&mut self, reason: &ChromeLoggerError) {
        if matches!(reason, ChromeLoggerError::HeadersAlreadySent) {
            self.header_sent = true;
        }
        if !self.is_deferring() {
            tracing::debug!(reason = %reason, "deferring remaining log messages");
            self.state = TransportState::Deferring;
        }
    }

    fn emit<S: HeaderSink + ?Sized>(
        &mut self,
        entry: &LogEntry,
        sink: &mut S,
    ) -> ChromeLoggerResult<usize> {
        if sink.headers_sent() {
            return Err(ChromeLoggerError::HeadersAlreadySent);
        }

        // rows of a rejected entry must not linger in the payload
        let committed_rows = self.payload.rows.len();
        self.payload.push_entry(entry);

        match self.encode_within_budget() {
            Ok((value, size)) => {
                sink.replace_header(HeaderName::from_static(HEADER_NAME), value);
                Ok(size)
            }
            Err(e) => {
                self.payload.rows.truncate(committed_rows);
                Err(e)
            }
        }
    }

    fn encode_within_budget(&self) -> ChromeLoggerResult<(HeaderValue, usize)> {
        let encoded = self.payload.encode()?;

        let size = encoded.len();
        if self.max_header_size > 0 && size as i64 > self.max_header_size {
            return Err(ChromeLoggerError::HeaderTooLarge {
                size,
                limit: self.max_header_size,
            });
        }

        Ok((HeaderValue::from_str(&encoded)?, size))
    }
}
