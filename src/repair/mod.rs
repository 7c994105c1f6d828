//! Self-healing loop for failing artifacts.
//!
//! Asks the external code-fixing service for a corrected artifact, with
//! bounded attempts and exponential backoff. Success means a cleaned
//! replacement was written; whether the replacement actually runs is the
//! executor's business.

use std::fs;
use std::time::Duration;

use tracing::{info, warn};

use crate::artifact::{expected_outputs, strip_code_fences};
use crate::error::{PipelineError, Result};
use crate::llm::{ChatMessage, ChatService, Role};
use crate::retry::RetryPolicy;
use crate::workspace::{purge_by_suffix, Workspace};

#[derive(Debug, Clone, Copy)]
pub struct RepairOutcome {
    /// 1-based index of the attempt that produced the rewrite.
    pub attempt: u32,
}

pub struct RepairLoop<'a> {
    service: &'a dyn ChatService,
    policy: RetryPolicy,
}

impl<'a> RepairLoop<'a> {
    pub fn new(service: &'a dyn ChatService, max_attempts: u32) -> Self {
        Self { service, policy: RetryPolicy::new(max_attempts, Duration::from_secs(2)) }
    }

    /// Constructor taking a full policy, used to shrink backoff in tests.
    pub fn with_policy(service: &'a dyn ChatService, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }

    /// Rewrite the failing artifact in place. Attempts after the first
    /// purge partially generated chart/statistics files so the next run
    /// starts clean.
    pub async fn repair(&self, ws: &Workspace, error_text: &str) -> Result<RepairOutcome> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.attempt_fix(ws, error_text, attempt).await {
                Ok(()) => {
                    info!(attempt, "applied artifact fix");
                    return Ok(RepairOutcome { attempt });
                }
                Err(e) => {
                    if !self.policy.attempts_left(attempt) {
                        return Err(PipelineError::RepairExhausted {
                            attempts: attempt,
                            detail: e.to_string(),
                        });
                    }
                    let delay = self.policy.delay_after(attempt);
                    warn!(attempt, error = %e, delay_secs = delay.as_secs(), "fix attempt failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt_fix(&self, ws: &Workspace, error_text: &str, attempt: u32) -> Result<()> {
        let artifact_path = ws.artifact_path();
        let code = fs::read_to_string(&artifact_path)
            .map_err(|e| PipelineError::storage_io("read artifact", e))?;
        let expected = expected_outputs(&code)?;

        if attempt > 1 {
            purge_by_suffix(&ws.graphs_dir(), ".png")?;
            purge_by_suffix(&ws.stats_dir(), "_stats.json")?;
        }

        let expected_list = expected
            .iter()
            .map(|o| format!("- graphs/{} and stats/{}", o.graph_file(), o.stats_file()))
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are a Python code correction expert. Fix the code based on the error message.\n\
             Save charts under {} and statistics JSON under {}.\n\
             Return ONLY the corrected code, without ``` markers. Preserve the original\n\
             imports, structure and `# Output:` comments, and keep using os.path.join\n\
             for every file path.",
            ws.graphs_dir().display(),
            ws.stats_dir().display(),
        );
        let human = format!(
            "Original code:\n{}\n\nError message:\n{}\n\nExpected output files:\n{}\n\n\
             Please provide the corrected code.",
            code, error_text, expected_list,
        );

        let response = self
            .service
            .complete(vec![
                ChatMessage::new(Role::System, system),
                ChatMessage::new(Role::User, human),
            ])
            .await
            .map_err(|e| PipelineError::Execution(format!("fix service: {e}")))?;

        let fixed = strip_code_fences(&response);
        if fixed.trim().is_empty() {
            return Err(PipelineError::Execution("fix service returned empty code".into()));
        }
        fs::write(&artifact_path, fixed)
            .map_err(|e| PipelineError::storage_io("write repaired artifact", e))?;
        Ok(())
    }
}
