//! Workflow document loading with schema validation, and node-list output.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jsonschema::validator_for;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::state::{ProcessState, RpcConfig};
use crate::error::WorkflowError;
use crate::graph::{Meta, Node, WorkflowDefinition};

const WORKFLOW_SCHEMA: &str = include_str!("../../schemas/workflow.schema.json");

#[derive(Deserialize)]
struct WorkflowDocument {
    meta: Meta,
    #[serde(default)]
    global: Option<GlobalSection>,
    nodes: Vec<Node>,
}

#[derive(Deserialize, Default)]
struct GlobalSection {
    #[serde(default)]
    process_control: Option<ProcessState>,
    #[serde(default)]
    rpc_config: Option<RpcConfig>,
}

/// Load and validate a workflow document from disk.
///
/// Any readable file is parsed as YAML, so JSON documents load as well.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_workflow(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    if !path.exists() {
        return Err(WorkflowError::ConfigNotFound(path.to_path_buf()));
    }
    let origin = path.display().to_string();
    let contents = fs::read_to_string(path).map_err(|err| WorkflowError::ConfigMalformed {
        origin: origin.clone(),
        message: format!("read failed: {err}"),
    })?;
    let definition = parse_workflow(&contents, &origin)?;
    debug!(
        workflow = %definition.meta.workflow_name,
        nodes = definition.nodes.len(),
        "workflow loaded"
    );
    Ok(definition)
}

/// Parse a workflow document held in memory. `origin` labels errors.
pub fn parse_workflow(contents: &str, origin: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let malformed = |message: String| WorkflowError::ConfigMalformed {
        origin: origin.to_string(),
        message,
    };

    let value: Value =
        serde_yaml::from_str(contents).map_err(|err| malformed(format!("parse: {err}")))?;
    validate_schema(&value).map_err(malformed)?;
    let document: WorkflowDocument =
        serde_json::from_value(value).map_err(|err| malformed(format!("deserialize: {err}")))?;

    let global = document.global.unwrap_or_default();
    let rpc = global.rpc_config.unwrap_or_default();
    let initial_state = global.process_control.unwrap_or_default().with_rpc(rpc);

    Ok(WorkflowDefinition {
        meta: document.meta,
        initial_state,
        nodes: document.nodes,
    })
}

/// Serialize nodes as a YAML list, preserving order and declared edges.
pub fn render_nodes_yaml(nodes: &[Node]) -> Result<String> {
    serde_yaml::to_string(nodes).context("serialize nodes yaml")
}

fn validate_schema(document: &Value) -> Result<(), String> {
    let schema: Value =
        serde_json::from_str(WORKFLOW_SCHEMA).map_err(|err| format!("invalid schema: {err}"))?;
    let validator = validator_for(&schema).map_err(|err| format!("invalid schema: {err}"))?;
    let messages: Vec<String> = validator
        .iter_errors(document)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(format!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}
