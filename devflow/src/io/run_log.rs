//! Per-run artifacts written under `--run-dir`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::state::ProcessState;
use crate::core::types::WorkflowStatus;
use crate::executor::Envelope;

pub const ENVELOPES_FILE: &str = "envelopes.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub workflow_name: &'a str,
    pub status: WorkflowStatus,
    pub master_decisions: u32,
    pub sub_executions: u32,
    pub state: &'a ProcessState,
}

/// Appends envelopes as JSON lines and writes the final summary.
pub struct RunLog {
    dir: PathBuf,
    envelopes: BufWriter<File>,
}

impl RunLog {
    /// Create `dir` if needed and start a fresh `envelopes.jsonl`.
    ///
    /// Envelopes from an earlier run in the same directory are discarded.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create run dir {}", dir.display()))?;
        let path = dir.join(ENVELOPES_FILE);
        let file = File::create(&path)
            .with_context(|| format!("open {}", path.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            envelopes: BufWriter::new(file),
        })
    }

    /// One line per envelope, flushed so a killed run keeps what it produced.
    pub fn append(&mut self, envelope: &Envelope) -> Result<()> {
        let line = serde_json::to_string(envelope).context("serialize envelope")?;
        self.envelopes
            .write_all(line.as_bytes())
            .and_then(|()| self.envelopes.write_all(b"\n"))
            .and_then(|()| self.envelopes.flush())
            .with_context(|| format!("append {}", self.dir.join(ENVELOPES_FILE).display()))
    }

    /// Atomically write `summary.json` (temp file + rename).
    pub fn write_summary(&self, summary: &RunSummary<'_>) -> Result<PathBuf> {
        let path = self.dir.join(SUMMARY_FILE);
        let mut buf = serde_json::to_string_pretty(summary).context("serialize run summary")?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path).with_context(|| format!("replace {}", path.display()))?;
        Ok(path)
    }
}
