//! Request-scoped log store with de-duplication.
//!
//! Entries are keyed by a digest of the serialized message plus the
//! innermost trace location, so the same message raised from the same place
//! aggregates into one entry with a repeat count. The first write wins: a
//! repeat only bumps the counter.

use crate::constants::{CALL_MAP_KEY, CALL_MAP_LABEL, MEMORY_SENTINEL_KEY, MEMORY_SENTINEL_MESSAGE};
use crate::frame::TraceFrame;
use crate::severity::{RawSeverity, Severity};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// What an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A recorded message
    Message,
    /// The synthetic call map maintained by the call stack aggregator
    CallMap,
}

/// An aggregated log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// De-duplication key
    pub key: String,
    /// Serialized message payload
    pub message: JsonValue,
    /// Trace, most recent frame first
    pub trace: Vec<TraceFrame>,
    /// Console class
    pub severity: Severity,
    /// Display label without decoration
    pub label: String,
    /// Number of times the message was recorded
    pub repeat_count: u32,
    /// True once the entry missed the header window
    pub deferred: bool,
    /// Entry kind
    pub kind: EntryKind,
}

impl LogEntry {
    /// Label as shown in the console: `Label:` or `Label[n]:` when repeated.
    pub fn display_label(&self) -> String {
        if self.repeat_count > 1 {
            format!("{}[{}]:", self.label, self.repeat_count)
        } else {
            format!("{}:", self.label)
        }
    }

    /// Console method the entry is replayed through.
    pub fn console_method(&self) -> &'static str {
        match self.kind {
            EntryKind::CallMap => "callstack",
            EntryKind::Message => self.severity.as_str(),
        }
    }
}

/// Result of [`LogStore::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new entry was stored under the key.
    Inserted {
        /// Key of the new entry
        key: String,
        /// Whether the entry was deferred
        deferred: bool,
    },
    /// An existing entry was bumped.
    Repeated {
        /// Key of the existing entry
        key: String,
        /// Repeat count after the bump
        count: u32,
    },
}

/// Ordered map from de-duplication key to entry.
#[derive(Debug, Default)]
pub struct LogStore {
    entries: IndexMap<String, LogEntry>,
    sequence: u64,
}

impl LogStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the key for `message` raised with `trace`.
    ///
    /// Without a trace the key embeds a per-store sequence number, so
    /// trace-less messages never collapse into each other.
    pub fn dedup_key(&mut self, message: &JsonValue, trace: &[TraceFrame]) -> String {
        let mut raw = message.to_string();
        match trace.first() {
            Some(innermost) => {
                raw.push('@');
                raw.push_str(innermost.location.as_deref().unwrap_or_default());
            }
            None => {
                raw.push('#');
                raw.push_str(&self.sequence.to_string());
                self.sequence += 1;
            }
        }
        format!("{:x}", md5::compute(raw.as_bytes()))
    }

    /// Records a message.
    ///
    /// A repeat of an existing key only increments its counter. A new entry
    /// is handed to `decide_deferred`, whose answer becomes its `deferred`
    /// flag, and is then stored.
    pub fn record<F>(
        &mut self,
        message: JsonValue,
        trace: Vec<TraceFrame>,
        severity: &RawSeverity,
        decide_deferred: F,
    ) -> RecordOutcome
    where
        F: FnOnce(&LogEntry) -> bool,
    {
        let key = self.dedup_key(&message, &trace);

        if let Some(existing) = self.entries.get_mut(&key) {
            existing.repeat_count += 1;
            tracing::trace!(key = %key, count = existing.repeat_count, "repeated log message");
            return RecordOutcome::Repeated {
                key,
                count: existing.repeat_count,
            };
        }

        let (severity, label) = severity.normalize();
        let mut entry = LogEntry {
            key: key.clone(),
            message,
            trace,
            severity,
            label,
            repeat_count: 1,
            deferred: false,
            kind: EntryKind::Message,
        };
        entry.deferred = decide_deferred(&entry);
        let deferred = entry.deferred;
        self.entries.insert(key.clone(), entry);

        RecordOutcome::Inserted { key, deferred }
    }

    /// Writes the memory sentinel once. Returns true if it was newly written.
    pub fn insert_memory_sentinel(&mut self) -> bool {
        if self.entries.contains_key(MEMORY_SENTINEL_KEY) {
            return false;
        }
        self.entries.insert(
            MEMORY_SENTINEL_KEY.to_string(),
            LogEntry {
                key: MEMORY_SENTINEL_KEY.to_string(),
                message: JsonValue::String(MEMORY_SENTINEL_MESSAGE.to_string()),
                trace: Vec::new(),
                severity: Severity::Warn,
                label: "Warning".to_string(),
                repeat_count: 1,
                deferred: true,
                kind: EntryKind::Message,
            },
        );
        true
    }

    /// Replaces the call map message, creating the entry on first use.
    pub fn upsert_call_map(&mut self, tree: JsonValue) {
        match self.entries.get_mut(CALL_MAP_KEY) {
            Some(entry) => entry.message = tree,
            None => {
                self.entries.insert(
                    CALL_MAP_KEY.to_string(),
                    LogEntry {
                        key: CALL_MAP_KEY.to_string(),
                        message: tree,
                        trace: Vec::new(),
                        severity: Severity::Log,
                        label: CALL_MAP_LABEL.to_string(),
                        repeat_count: 1,
                        deferred: true,
                        kind: EntryKind::CallMap,
                    },
                );
            }
        }
    }

    /// Returns the entry stored under `key`.
    pub fn get(&self, key: &str) -> Option<&LogEntry> {
        self.entries.get(key)
    }

    /// Returns true if an entry is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values()
    }

    /// Iterates deferred entries in insertion order.
    pub fn deferred(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values().filter(|entry| entry.deferred)
    }

    /// Returns true if any entry is deferred.
    pub fn has_deferred(&self) -> bool {
        self.entries.values().any(|entry| entry.deferred)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes and returns every entry in insertion order.
    pub fn drain(&mut self) -> Vec<LogEntry> {
        self.entries.drain(..).map(|(_, entry)| entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trace_at(location: &str) -> Vec<TraceFrame> {
        vec![TraceFrame::at(location)]
    }

    #[test]
    fn test_display_label() {
        let mut store = LogStore::new();
        store.record(json!("x"), trace_at("a.rs:1"), &"warn".into(), |_| false);
        store.record(json!("x"), trace_at("a.rs:1"), &"warn".into(), |_| false);

        let entry = store.iter().next().expect("entry");
        assert_eq!(entry.display_label(), "Warn[2]:");
    }

    #[test]
    fn test_same_message_different_location() {
        let mut store = LogStore::new();
        store.record(json!("x"), trace_at("a.rs:1"), &"log".into(), |_| false);
        store.record(json!("x"), trace_at("a.rs:2"), &"log".into(), |_| false);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_traceless_messages_never_collapse() {
        let mut store = LogStore::new();
        store.record(json!("x"), vec![], &"log".into(), |_| false);
        store.record(json!("x"), vec![], &"log".into(), |_| false);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_decider_not_called_for_repeats() {
        let mut store = LogStore::new();
        let mut calls = 0;
        for _ in 0..3 {
            store.record(json!("x"), trace_at("a.rs:1"), &"log".into(), |_| {
                calls += 1;
                false
            });
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_memory_sentinel_written_once() {
        let mut store = LogStore::new();
        assert!(store.insert_memory_sentinel());
        assert!(!store.insert_memory_sentinel());
        let entry = store.get(MEMORY_SENTINEL_KEY).expect("sentinel");
        assert!(entry.deferred);
        assert_eq!(entry.severity, Severity::Warn);
    }

    #[test]
    fn test_call_map_updates_in_place() {
        let mut store = LogStore::new();
        store.upsert_call_map(json!({"a": {}}));
        store.upsert_call_map(json!({"b": {}}));
        assert_eq!(store.len(), 1);
        let entry = store.get(CALL_MAP_KEY).expect("call map");
        assert_eq!(entry.message, json!({"b": {}}));
        assert_eq!(entry.console_method(), "callstack");
        assert!(entry.deferred);
    }
}
