//! Generation backends.
//!
//! The [`GenerationBackend`] trait decouples node execution from whatever
//! produces text for a node (a canned stub, or an external command wrapping a
//! model client). Tests use scripted backends from `test_support`.

use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::stages::Stage;
use crate::error::WorkflowError;
use crate::core::state::RpcConfig;
use crate::io::config::{BackendConfig, BackendKind};
use crate::io::process::run_command_with_timeout;

/// Environment variable carrying the node id to a command backend.
pub const NODE_ID_ENV: &str = "DEVFLOW_NODE_ID";
/// Environment variable carrying the node's system prompt to a command backend.
pub const SYSTEM_PROMPT_ENV: &str = "DEVFLOW_SYSTEM_PROMPT";

/// `rpc_config` key naming the generation provider for a document.
pub const LLM_PROVIDER_KEY: &str = "llm_provider";
/// `rpc_config` key holding provider settings.
pub const LLM_CONFIG_KEY: &str = "llm_config";

/// Produces text for a node.
pub trait GenerationBackend {
    /// Generate a reply to `text` in the role described by `system_prompt`.
    ///
    /// `context_id` is the id of the node being executed.
    fn generate(
        &self,
        text: &str,
        system_prompt: &str,
        context_id: &str,
    ) -> Result<String, WorkflowError>;
}

impl<T: GenerationBackend + ?Sized> GenerationBackend for Box<T> {
    fn generate(
        &self,
        text: &str,
        system_prompt: &str,
        context_id: &str,
    ) -> Result<String, WorkflowError> {
        (**self).generate(text, system_prompt, context_id)
    }
}

impl<T: GenerationBackend + ?Sized> GenerationBackend for &T {
    fn generate(
        &self,
        text: &str,
        system_prompt: &str,
        context_id: &str,
    ) -> Result<String, WorkflowError> {
        (**self).generate(text, system_prompt, context_id)
    }
}

/// Deterministic backend returning canned text.
#[derive(Debug, Clone, Default)]
pub struct StubBackend {
    fixed: Option<String>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that answers every call with `text`.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            fixed: Some(text.into()),
        }
    }
}

impl GenerationBackend for StubBackend {
    fn generate(
        &self,
        _text: &str,
        _system_prompt: &str,
        context_id: &str,
    ) -> Result<String, WorkflowError> {
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }
        let reply = match Stage::from_node_id(context_id) {
            Some(Stage::RequirementsAnalysis) => {
                "## PRD\n- user stories captured\n- acceptance criteria listed"
            }
            Some(Stage::ProductDesign) => "## Product design\n- page flows\n- interaction notes",
            Some(Stage::ArchitectureDesign) => {
                "## Architecture\n- module boundaries\n- data model\n- deployment view"
            }
            Some(Stage::TaskBreakdown) => "## Tasks\n1. scaffold\n2. implement\n3. test",
            Some(Stage::CodeImplementation) => "## Implementation\n- modules written",
            Some(Stage::CodeReview) => "## Review\n- findings recorded",
            Some(Stage::UnitTest) => "## Unit tests\n- suite executed",
            Some(Stage::IntegrationTest) => "## Integration tests\n- interfaces exercised",
            Some(Stage::SystemTest) => "## System tests\n- end-to-end scenarios executed",
            Some(Stage::BugFix) => "## Bug fix\n- defects patched",
            Some(Stage::ManualMerge) => "## Merge\n- branch merged",
            None => "## Notes\n- node executed",
        };
        Ok(reply.to_string())
    }
}

/// Backend that spawns an external command per call.
///
/// The prompt is written to stdin; the node id and system prompt are passed in
/// [`NODE_ID_ENV`] and [`SYSTEM_PROMPT_ENV`]. Trimmed stdout is the reply.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandBackend {
    pub fn new(
        argv: &[String],
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<Self, WorkflowError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| WorkflowError::BackendFailure("empty backend command".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
            output_limit_bytes,
        })
    }
}

impl GenerationBackend for CommandBackend {
    #[instrument(skip_all, fields(program = %self.program, node_id = context_id))]
    fn generate(
        &self,
        text: &str,
        system_prompt: &str,
        context_id: &str,
    ) -> Result<String, WorkflowError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(NODE_ID_ENV, context_id)
            .env(SYSTEM_PROMPT_ENV, system_prompt);

        let output = run_command_with_timeout(
            cmd,
            Some(text.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| WorkflowError::BackendFailure(format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout = ?self.timeout, "backend timed out");
            return Err(WorkflowError::BackendFailure(format!(
                "{} timed out after {:?}",
                self.program, self.timeout
            )));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "backend failed");
            let stderr = output.stderr_text();
            return Err(WorkflowError::BackendFailure(format!(
                "{} exited with status {:?}{}",
                self.program,
                output.status.code(),
                if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {stderr}")
                }
            )));
        }

        debug!(bytes = output.stdout.len(), "backend replied");
        Ok(output.stdout_text())
    }
}

/// Apply a document's `rpc_config.llm_provider` / `llm_config` on top of `config`.
///
/// `mock` (or `stub`) selects the stub backend. `command` selects the command
/// backend, with `llm_config.command` and `llm_config.timeout_secs` replacing the
/// configured values when present. Without `llm_provider` the config is used as is.
pub fn resolve_backend_config(config: &BackendConfig, rpc: &RpcConfig) -> BackendConfig {
    let mut resolved = config.clone();
    let Some(provider) = rpc.extra.get(LLM_PROVIDER_KEY) else {
        return resolved;
    };
    match provider.as_str() {
        Some("mock" | "stub") => resolved.kind = BackendKind::Stub,
        Some("command") => {
            resolved.kind = BackendKind::Command;
            let llm_config = rpc.extra.get(LLM_CONFIG_KEY);
            if let Some(command) = llm_config
                .and_then(|c| c.get("command"))
                .and_then(|c| c.as_array())
            {
                resolved.command = command
                    .iter()
                    .filter_map(|arg| arg.as_str().map(str::to_string))
                    .collect();
            }
            if let Some(secs) = llm_config
                .and_then(|c| c.get("timeout_secs"))
                .and_then(|t| t.as_u64())
            {
                resolved.timeout_secs = secs;
            }
        }
        _ => warn!(%provider, "unknown llm_provider in rpc_config, keeping engine config"),
    }
    debug!(kind = ?resolved.kind, "backend resolved from document");
    resolved
}

/// Build the backend selected by `config`.
pub fn backend_from_config(
    config: &BackendConfig,
) -> Result<Box<dyn GenerationBackend>, WorkflowError> {
    match config.kind {
        BackendKind::Stub => {
            info!("using stub generation backend");
            Ok(Box::new(StubBackend::new()))
        }
        BackendKind::Command => {
            info!(command = ?config.command, "using command generation backend");
            Ok(Box::new(CommandBackend::new(
                &config.command,
                Duration::from_secs(config.timeout_secs),
                config.output_limit_bytes,
            )?))
        }
    }
}
