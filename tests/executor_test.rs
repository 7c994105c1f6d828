mod common;

use std::fs;
use std::time::Duration;

use anyhow::Result;

use autoreport::error::PipelineError;
use autoreport::executor::Executor;
use autoreport::repair::RepairLoop;
use autoreport::retry::RetryPolicy;
use autoreport::workspace::Workspace;

use common::{python_with_numpy_available, CannedChat, FailingChat};

const WORKING_ARTIFACT: &str = r#"# Question 1: average score
# Output: score_analysis.png
import os
base_name = "score_analysis"
ws = os.environ['ANALYSIS_WORKSPACE']
with open(os.path.join(ws, 'graphs', base_name + '.png'), 'wb') as f:
    f.write(b'fake chart bytes')
stats = {"question": "average score", "mean": 72.5}
with open(os.path.join(ws, 'stats', base_name + '_stats.json'), 'w') as f:
    json.dump(stats, f)
"#;

const CRASHING_ARTIFACT: &str = "\
# Question 1: average score\n\
# Output: score_analysis.png\n\
import sys\n\
sys.exit(1)\n";

#[tokio::test]
async fn runs_artifact_and_collects_charts() -> Result<()> {
    if !python_with_numpy_available() {
        println!("Skipping test - python3 with numpy/pandas not available");
        return Ok(());
    }

    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.artifact_path(), WORKING_ARTIFACT)?;
    let data = ws.data_dir().join("patients.csv");
    fs::write(&data, "age,score\n34,72\n")?;

    let fixer = FailingChat::new();
    let repair = RepairLoop::with_policy(&fixer, RetryPolicy::new(1, Duration::from_millis(10)));
    let executor =
        Executor::new("python3".into(), 0, repair).with_settle(Duration::from_millis(10));

    let result = executor.execute(&ws, &data).await?;
    assert_eq!(result.chart_files, vec!["score_analysis.png".to_string()]);
    assert_eq!(fixer.calls(), 0, "a working artifact must not trigger repair");

    // The statistics file went through the injected encoder path.
    let stats = fs::read_to_string(ws.stats_dir().join("score_analysis_stats.json"))?;
    let v: serde_json::Value = serde_json::from_str(&stats)?;
    assert_eq!(v["question"], "average score");
    Ok(())
}

#[tokio::test]
async fn crashing_artifact_is_repaired_and_rerun() -> Result<()> {
    if !python_with_numpy_available() {
        println!("Skipping test - python3 with numpy/pandas not available");
        return Ok(());
    }

    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.artifact_path(), CRASHING_ARTIFACT)?;
    let data = ws.data_dir().join("patients.csv");
    fs::write(&data, "age,score\n34,72\n")?;

    let fixer = CannedChat::new(format!("```python\n{}\n```", WORKING_ARTIFACT));
    let repair = RepairLoop::with_policy(&fixer, RetryPolicy::new(2, Duration::from_millis(10)));
    let executor =
        Executor::new("python3".into(), 0, repair).with_settle(Duration::from_millis(10));

    let result = executor.execute(&ws, &data).await?;
    assert_eq!(result.chart_files, vec!["score_analysis.png".to_string()]);
    assert_eq!(fixer.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn missing_artifact_is_not_found() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    let data = ws.data_dir().join("patients.csv");
    fs::write(&data, "age,score\n34,72\n")?;

    let fixer = FailingChat::new();
    let repair = RepairLoop::with_policy(&fixer, RetryPolicy::new(1, Duration::from_millis(10)));
    let executor = Executor::new("python3".into(), 0, repair);

    let err = executor.execute(&ws, &data).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn artifact_with_no_outputs_fails_verification() -> Result<()> {
    if !python_with_numpy_available() {
        println!("Skipping test - python3 with numpy/pandas not available");
        return Ok(());
    }

    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.artifact_path(), "# Output: score_analysis.png\nprint('no files')\n")?;
    let data = ws.data_dir().join("patients.csv");
    fs::write(&data, "age,score\n34,72\n")?;

    let fixer = FailingChat::new();
    let repair = RepairLoop::with_policy(&fixer, RetryPolicy::new(1, Duration::from_millis(10)));
    let executor =
        Executor::new("python3".into(), 0, repair).with_settle(Duration::from_millis(10));

    let err = executor.execute(&ws, &data).await.unwrap_err();
    assert!(matches!(err, PipelineError::Execution(_)));
    Ok(())
}
