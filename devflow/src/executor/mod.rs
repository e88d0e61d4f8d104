//! Node executors and the response envelope they emit.
//!
//! [`NodeExecutor`] holds what every executor shares: the node being run, the
//! borrowed [`ProcessState`], and envelope construction. [`MasterExecutor`]
//! evaluates the transition table; [`SubExecutor`] performs stage work.

mod master;
mod sub;

pub use master::MasterExecutor;
pub use sub::SubExecutor;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::state::ProcessState;
use crate::graph::Node;
use crate::io::backend::GenerationBackend;

/// Record emitted by every executor invocation.
///
/// Used for logging and run artifacts only; control decisions read
/// [`ProcessState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub node_id: String,
    pub node_name: String,
    pub content: String,
    /// RFC 3339, UTC, second precision.
    pub timestamp: String,
    pub output_format: String,
}

impl Envelope {
    /// First line of `content`, for one-line status output.
    pub fn headline(&self) -> &str {
        self.content.lines().next().unwrap_or_default()
    }
}

/// Current wall-clock time as stamped on envelopes, e.g. `2026-02-05T10:00:00Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Shared executor state: one node and exclusive access to the process state.
pub struct NodeExecutor<'a> {
    node: &'a Node,
    state: &'a mut ProcessState,
}

impl<'a> NodeExecutor<'a> {
    pub fn new(node: &'a Node, state: &'a mut ProcessState) -> Self {
        Self { node, state }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn state(&self) -> &ProcessState {
        &*self.state
    }

    pub fn state_mut(&mut self) -> &mut ProcessState {
        &mut *self.state
    }

    /// Wrap `content` for this node, stamped now, in the state's output format.
    pub fn envelope(&self, content: impl Into<String>) -> Envelope {
        Envelope {
            node_id: self.node.node_id.clone(),
            node_name: self.node.display_name().to_string(),
            content: content.into(),
            timestamp: timestamp_now(),
            output_format: self.state.output_format().to_string(),
        }
    }

    /// Ask `backend` for this node's reply to `prompt`.
    ///
    /// Backend errors never reach the caller: they come back as a diagnostic
    /// line in place of the generated text.
    pub fn generate(&self, backend: &dyn GenerationBackend, prompt: &str) -> String {
        match backend.generate(prompt, &self.node.instruction_text, &self.node.node_id) {
            Ok(text) => text,
            Err(err) => {
                warn!(node_id = %self.node.node_id, err = %err, "generation backend failed");
                format!("[generation unavailable: {err}]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::backend::StubBackend;
    use crate::test_support::{FailingBackend, node};

    #[test]
    fn envelope_carries_node_and_format() {
        let mut named = node("code-review");
        named.name = "Code Review".to_string();
        let mut state = ProcessState::default();
        state.rpc.output_format = "json".to_string();

        let executor = NodeExecutor::new(&named, &mut state);
        let envelope = executor.envelope("done\nmore");

        assert_eq!(envelope.node_id, "code-review");
        assert_eq!(envelope.node_name, "Code Review");
        assert_eq!(envelope.output_format, "json");
        assert_eq!(envelope.headline(), "done");
        assert!(envelope.timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&envelope.timestamp).is_ok());
    }

    #[test]
    fn generate_returns_backend_text() {
        let stage = node("unit-test");
        let mut state = ProcessState::default();
        let executor = NodeExecutor::new(&stage, &mut state);
        assert_eq!(executor.generate(&StubBackend::fixed("ok"), "prompt"), "ok");
    }

    #[test]
    fn backend_failure_degrades_to_diagnostic() {
        let stage = node("unit-test");
        let mut state = ProcessState::default();
        let before = state.clone();
        let executor = NodeExecutor::new(&stage, &mut state);

        let text = executor.generate(&FailingBackend::new("connection refused"), "prompt");
        assert!(text.starts_with("[generation unavailable:"));
        assert!(text.contains("connection refused"));
        assert_eq!(state, before);
    }

    #[test]
    fn headline_of_empty_content_is_empty() {
        let envelope = Envelope {
            node_id: "a".to_string(),
            node_name: "a".to_string(),
            content: String::new(),
            timestamp: timestamp_now(),
            output_format: "markdown".to_string(),
        };
        assert_eq!(envelope.headline(), "");
    }
}
