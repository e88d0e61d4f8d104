//! Sub-node prompt rendering.

use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::state::ProcessState;
use crate::graph::Node;

const STAGE_TEMPLATE_NAME: &str = "stage.md";
const STAGE_TEMPLATE: &str = include_str!("prompts/stage.md");

/// Node fields exposed to the template.
#[derive(Debug, Clone, Serialize)]
struct NodeContext<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl<'a> NodeContext<'a> {
    fn from_node(node: &'a Node) -> Self {
        Self {
            id: &node.node_id,
            name: node.display_name(),
            description: node.description.trim(),
            inputs: node.inputs.iter().map(binding_label).collect(),
            outputs: node.outputs.iter().map(binding_label).collect(),
        }
    }
}

/// Bindings are opaque; strings render bare, anything else as compact JSON.
fn binding_label(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Renders the user prompt handed to the backend for a sub node.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        Self { env }
    }

    pub fn render(&self, node: &Node, state: &ProcessState) -> Result<String, minijinja::Error> {
        let rendered = self.env.render_named_str(
            STAGE_TEMPLATE_NAME,
            STAGE_TEMPLATE,
            context! {
                node => NodeContext::from_node(node),
                state => state,
                output_format => state.output_format(),
            },
        )?;
        debug!(node_id = %node.node_id, bytes = rendered.len(), "rendered stage prompt");
        Ok(rendered)
    }
}

/// Minimal prompt used when the template cannot be rendered.
pub fn fallback_prompt(node: &Node) -> String {
    format!(
        "Execute stage {} ({}).\n{}",
        node.display_name(),
        node.node_id,
        node.description.trim()
    )
}
