//! Execution engine for generated analysis artifacts.
//!
//! Runs the artifact as an isolated child process rooted in the request
//! workspace, repairing and re-running once on failure, then verifies
//! that outputs landed. Verification is deliberately weak: it checks
//! that the chart and statistics areas are non-empty, not that the
//! specific declared files exist.

pub mod preprocess;

use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::repair::RepairLoop;
use crate::workspace::{purge_by_suffix, Workspace};

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Chart file names present in the graphs area after the run.
    pub chart_files: Vec<String>,
}

pub struct Executor<'a> {
    python_bin: String,
    /// None = unbounded, matching the source system.
    timeout: Option<Duration>,
    repair: RepairLoop<'a>,
    /// Grace period for filesystem flush before verification.
    settle: Duration,
}

impl<'a> Executor<'a> {
    pub fn new(python_bin: String, timeout_secs: u64, repair: RepairLoop<'a>) -> Self {
        let timeout =
            if timeout_secs == 0 { None } else { Some(Duration::from_secs(timeout_secs)) };
        Self { python_bin, timeout, repair, settle: Duration::from_secs(1) }
    }

    /// Override the post-run settle delay, used to speed tests up.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Execute the request's artifact and return the charts it produced.
    pub async fn execute(&self, ws: &Workspace, data_path: &Path) -> Result<ExecutionResult> {
        let artifact = ws.artifact_path();
        if !artifact.exists() {
            return Err(PipelineError::NotFound(artifact));
        }

        self.cleanup_previous_outputs(ws)?;
        self.preprocess_artifact(&artifact)?;

        let mut output = self.run_child(ws, &artifact, data_path).await?;

        if !output.success {
            warn!(workspace = %ws.id(), "initial execution failed, attempting repair");
            let outcome = self.repair.repair(ws, &output.stderr).await?;
            // Closed loop: the source system trusted the rewrite blindly;
            // here the patched artifact gets exactly one more run.
            info!(attempt = outcome.attempt, "re-executing repaired artifact");
            self.preprocess_artifact(&artifact)?;
            output = self.run_child(ws, &artifact, data_path).await?;
            if !output.success {
                error!(workspace = %ws.id(), stderr = %output.stderr, "repaired artifact still fails");
                return Err(PipelineError::Execution(format!(
                    "repaired artifact failed: {}",
                    truncate(&output.stderr, 2000)
                )));
            }
        }

        // Some platforms flush chart files asynchronously.
        tokio::time::sleep(self.settle).await;

        let chart_files = self.verify_outputs(ws)?;
        info!(workspace = %ws.id(), charts = chart_files.len(), "execution completed");
        Ok(ExecutionResult { stdout: output.stdout, stderr: output.stderr, chart_files })
    }

    /// Purge leftovers of a previous run. A deletion failure aborts; a
    /// partial purge must not silently proceed.
    fn cleanup_previous_outputs(&self, ws: &Workspace) -> Result<()> {
        purge_by_suffix(&ws.graphs_dir(), ".png")?;
        purge_by_suffix(&ws.stats_dir(), "_stats.json")?;
        purge_by_suffix(&ws.description_dir(), ".json")?;
        Ok(())
    }

    fn preprocess_artifact(&self, artifact: &Path) -> Result<()> {
        let source = fs::read_to_string(artifact)
            .map_err(|e| PipelineError::Preprocess(format!("read artifact: {e}")))?;
        let rewritten = preprocess::rewrite(&source)?;
        fs::write(artifact, rewritten)
            .map_err(|e| PipelineError::Preprocess(format!("write artifact: {e}")))?;
        Ok(())
    }

    async fn run_child(
        &self,
        ws: &Workspace,
        artifact: &Path,
        data_path: &Path,
    ) -> Result<ChildOutput> {
        let mut cmd = Command::new(&self.python_bin);
        cmd.arg(artifact)
            .current_dir(ws.root())
            .env("DATA_FILE_PATH", data_path)
            .env("ANALYSIS_WORKSPACE", ws.root())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let fut = cmd.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| PipelineError::Execution(format!("timed out after {:?}", limit)))?,
            None => fut.await,
        }
        .map_err(|e| PipelineError::Execution(format!("failed to launch {}: {e}", self.python_bin)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stdout.is_empty() {
            info!(output = %truncate(&stdout, 2000), "artifact stdout");
        }
        if !stderr.is_empty() {
            warn!(errors = %truncate(&stderr, 2000), "artifact stderr");
        }
        Ok(ChildOutput { success: output.status.success(), stdout, stderr })
    }

    /// Weak verification: at least one chart and one statistics file
    /// anywhere in the respective areas.
    fn verify_outputs(&self, ws: &Workspace) -> Result<Vec<String>> {
        let charts = files_with_suffix(&ws.graphs_dir(), ".png")?;
        let stats = files_with_suffix(&ws.stats_dir(), "_stats.json")?;
        if charts.is_empty() || stats.is_empty() {
            error!(
                graphs = charts.len(),
                stats = stats.len(),
                "verification failed, output areas incomplete"
            );
            return Err(PipelineError::Execution("no output files were generated".into()));
        }
        Ok(charts)
    }
}

struct ChildOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Sorted file names in `dir` ending with `suffix`.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| PipelineError::storage_io(format!("read {}", dir.display()), e))?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.ends_with(suffix))
        .collect();
    names.sort();
    Ok(names)
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}
