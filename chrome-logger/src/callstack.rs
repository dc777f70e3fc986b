//! Sampled call map.
//!
//! The host calls [`crate::RequestContext::sample_call_stack`] on a fixed
//! cadence with the current stack. Each sample is merged into one tree,
//! outermost call at the root, keyed per depth by the called function (or
//! the call site when there is no function). Distinct argument lists are
//! kept per node. The tree is published as a single always-deferred entry,
//! since it grows far beyond any header budget.

use crate::config::LoggerConfig;
use crate::frame::{RawFrame, StackFrameFormatter};
use crate::value::flatten_argument;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// One call site in the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallNode {
    /// Call site of the first sample that reached this node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Distinct flattened argument lists, in first-seen order
    #[serde(rename = "arg", skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Calls made from here
    pub calls: IndexMap<String, CallNode>,
}

/// Builds the call map from periodic stack samples.
#[derive(Debug, Default)]
pub struct CallStackAggregator {
    roots: IndexMap<String, CallNode>,
    samples: u64,
}

impl CallStackAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one stack sample. `frames` are innermost-first.
    pub fn sample(&mut self, frames: &[RawFrame], config: &LoggerConfig) {
        let formatter = StackFrameFormatter::new(config);
        let mut level = &mut self.roots;

        for frame in frames.iter().rev() {
            let location = formatter.location(frame.file.as_deref(), frame.line);
            let key = match &frame.function {
                Some(function) => match &frame.class {
                    Some(class) => format!(
                        "{}{}{}",
                        config.unnamespace(class),
                        frame.call_type.glyph(),
                        function
                    ),
                    None => config.unnamespace(function).to_string(),
                },
                None => location.clone().unwrap_or_default(),
            };

            let node = level.entry(key).or_insert_with(|| CallNode {
                file: location,
                ..CallNode::default()
            });

            if !frame.args.is_empty() {
                let args = frame
                    .args
                    .iter()
                    .map(|arg| flatten_argument(arg, config))
                    .collect::<Vec<_>>()
                    .join(", ");
                if !node.args.contains(&args) {
                    node.args.push(args);
                }
            }

            level = &mut node.calls;
        }

        self.samples += 1;
    }

    /// Root nodes keyed by outermost call.
    pub fn roots(&self) -> &IndexMap<String, CallNode> {
        &self.roots
    }

    /// Number of samples merged so far.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Returns true before the first sample.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// JSON form of the tree.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(&self.roots).unwrap_or(JsonValue::Null)
    }
}
