//! Workflow graph: node descriptors and the id index built at load time.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::state::ProcessState;
use crate::error::WorkflowError;

/// How a node is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    #[serde(alias = "auto", alias = "自动节点")]
    Automatic,
    #[serde(alias = "人工节点")]
    Manual,
}

/// A conditional edge. The expression is descriptive only; routing decisions
/// come from the transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(alias = "condition")]
    pub when: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub next_node: Vec<String>,
}

/// Declared successor edges of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connections {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(
        default,
        rename = "next_node",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub successors: Vec<String>,
}

/// Immutable descriptor of one graph vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub category: Category,
    /// Input bindings, opaque to the engine.
    #[serde(default, rename = "input")]
    pub inputs: Vec<serde_json::Value>,
    /// Output bindings, opaque to the engine.
    #[serde(default, rename = "output")]
    pub outputs: Vec<serde_json::Value>,
    #[serde(default)]
    pub connections: Connections,
    /// Role prompt handed to the generation backend as the system prompt.
    #[serde(default, rename = "system_prompt")]
    pub instruction_text: String,
}

impl Node {
    pub fn is_manual(&self) -> bool {
        self.category == Category::Manual
    }

    pub fn successors(&self) -> &[String] {
        &self.connections.successors
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.connections.conditions
    }

    /// `name` when set, otherwise the id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.node_id
        } else {
            &self.name
        }
    }
}

/// `meta` block of the workflow document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub workflow_name: String,
    pub master_node_id: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Parsed workflow document: meta, the seeded process state and the nodes in
/// document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDefinition {
    pub meta: Meta,
    pub initial_state: ProcessState,
    pub nodes: Vec<Node>,
}

/// Nodes plus an id index for constant-time lookup.
#[derive(Debug, Clone)]
pub struct Graph {
    meta: Meta,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl Graph {
    /// Build the index. Duplicate node ids are rejected.
    pub fn new(meta: Meta, nodes: Vec<Node>) -> Result<Self, WorkflowError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (pos, node) in nodes.iter().enumerate() {
            if index.insert(node.node_id.clone(), pos).is_some() {
                return Err(WorkflowError::ConfigMalformed {
                    origin: meta.workflow_name.clone(),
                    message: format!("duplicate node id '{}'", node.node_id),
                });
            }
        }
        Ok(Self { meta, nodes, index })
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn master_id(&self) -> &str {
        &self.meta.master_node_id
    }

    pub fn master(&self) -> Option<&Node> {
        self.get(&self.meta.master_node_id)
    }

    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.index.get(node_id).map(|&pos| &self.nodes[pos])
    }

    /// Nodes in document order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Accept either `next_node: id` or `next_node: [id, ...]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => vec![id],
        OneOrMany::Many(ids) => ids,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}
