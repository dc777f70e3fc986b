//! Deferred delivery script.
//!
//! Entries that missed the header window are replayed by an inline script
//! the host appends to an HTML body. The script installs a small helper
//! object under a random global name, then issues one console call per
//! entry followed by a collapsed group holding its trace.
//!
//! Rendering is pure: the host decides where, and whether, to inject it.

use crate::constants::{TRACE_CONTINUATION, TRACE_LABEL};
use crate::store::{EntryKind, LogEntry};
use regex::Regex;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::LazyLock;

const CONSOLE_SHIM: &str = include_str!("../assets/console-shim.js");
const CALLSTACK_SHIM: &str = include_str!("../assets/callstack.js");

static HTML_CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*text/html\s*(?:;|$)").expect("valid content type pattern")
});

/// Returns true for `text/html` content types, parameters ignored.
pub fn is_html(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| HTML_CONTENT_TYPE.is_match(ct))
}

/// Generates a fresh global name for the helper object.
pub fn namespace_token() -> String {
    format!("_{}", uuid::Uuid::new_v4().simple())
}

/// Renders the replay script for the deferred entries among `entries`.
///
/// Returns `None` when nothing is deferred.
pub fn render_deferred<'a, I>(entries: I, namespace: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let deferred: Vec<&LogEntry> = entries.into_iter().filter(|e| e.deferred).collect();
    if deferred.is_empty() {
        return None;
    }

    let mut script = String::from("<script type=\"text/javascript\">/* <![CDATA[ */ ");
    let _ = write!(
        script,
        "(function( ns ){{ window[ ns ] = {} }})({}); ",
        CONSOLE_SHIM,
        script_json(&namespace)
    );

    if deferred.iter().any(|e| e.kind == EntryKind::CallMap) {
        script.push_str(CALLSTACK_SHIM);
        script.push(' ');
    }

    for entry in deferred {
        render_entry(&mut script, entry, namespace);
    }

    script.push_str("/* ]]> */</script>");
    Some(script)
}

fn render_entry(script: &mut String, entry: &LogEntry, namespace: &str) {
    let _ = write!(
        script,
        "console.{}({}, {}.cleanObjectProperties({})); ",
        entry.console_method(),
        script_json(&entry.display_label()),
        namespace,
        script_json(&entry.message)
    );

    let mut frames = entry.trace.iter();
    let Some(first) = frames.next() else {
        return;
    };

    let mut args = vec![script_json(&TRACE_LABEL), script_json(&first.summary)];
    if let Some(location) = &first.location {
        args.push(script_json(location));
    }
    let _ = write!(script, "console.groupCollapsed({}); ", args.join(", "));

    for frame in frames {
        let mut args = vec![script_json(&TRACE_CONTINUATION), script_json(&frame.summary)];
        if let Some(location) = &frame.location {
            args.push(script_json(&"@"));
            args.push(script_json(location));
        }
        let _ = write!(script, "console.log({}); ", args.join(", "));
    }

    script.push_str("console.groupEnd(); ");
}

/// JSON literal safe to embed in a script element.
///
/// Angle brackets only occur inside JSON strings, where `\u003c` and
/// `\u003e` decode to the same text but cannot open or close a tag or an
/// HTML comment.
fn script_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
