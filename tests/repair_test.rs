mod common;

use std::fs;
use std::time::Duration;

use anyhow::Result;

use autoreport::error::PipelineError;
use autoreport::repair::RepairLoop;
use autoreport::retry::RetryPolicy;
use autoreport::workspace::Workspace;

use common::{CannedChat, FailingChat};

const BROKEN_ARTIFACT: &str = "\
# Question 1: average score\n\
# Output: score_analysis.png\n\
import sys\n\
sys.exit(1)\n";

#[tokio::test]
async fn exhausts_attempts_when_fix_service_keeps_failing() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.artifact_path(), BROKEN_ARTIFACT)?;

    let service = FailingChat::new();
    let repair =
        RepairLoop::with_policy(&service, RetryPolicy::new(3, Duration::from_millis(10)));

    let err = repair.repair(&ws, "Traceback: ValueError").await.unwrap_err();
    match err {
        PipelineError::RepairExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RepairExhausted, got {other}"),
    }
    assert_eq!(service.calls(), 3);

    // The failing service never produced a rewrite.
    assert_eq!(fs::read_to_string(ws.artifact_path())?, BROKEN_ARTIFACT);
    Ok(())
}

#[tokio::test]
async fn successful_fix_overwrites_artifact_without_fences() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.artifact_path(), BROKEN_ARTIFACT)?;

    let service = CannedChat::new("```python\n# Output: score_analysis.png\nprint('ok')\n```");
    let repair =
        RepairLoop::with_policy(&service, RetryPolicy::new(3, Duration::from_millis(10)));

    let outcome = repair.repair(&ws, "Traceback: ValueError").await?;
    assert_eq!(outcome.attempt, 1);

    let artifact = fs::read_to_string(ws.artifact_path())?;
    assert!(artifact.contains("print('ok')"));
    assert!(!artifact.contains("```"));
    Ok(())
}

#[tokio::test]
async fn later_attempts_purge_partial_outputs() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.artifact_path(), BROKEN_ARTIFACT)?;
    fs::write(ws.graphs_dir().join("score_analysis.png"), b"partial")?;
    fs::write(ws.stats_dir().join("score_analysis_stats.json"), b"{}")?;

    let service = FailingChat::new();
    let repair =
        RepairLoop::with_policy(&service, RetryPolicy::new(2, Duration::from_millis(10)));
    let _ = repair.repair(&ws, "boom").await.unwrap_err();

    // Attempt 2 started by clearing the first run's leftovers.
    assert!(!ws.graphs_dir().join("score_analysis.png").exists());
    assert!(!ws.stats_dir().join("score_analysis_stats.json").exists());
    Ok(())
}
