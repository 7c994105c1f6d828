mod common;

use std::fs;
use std::time::Duration;

use anyhow::Result;

use autoreport::annotate::AnnotationEngine;
use autoreport::workspace::Workspace;

use common::{sections_reply, CannedChat, FailingChat};

#[tokio::test]
async fn chart_is_paired_with_its_stats_file() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.graphs_dir().join("glucose_analysis.png"), b"not a real png")?;
    fs::write(
        ws.stats_dir().join("glucose_analysis_stats.json"),
        r#"{"question": "trend of glucose", "mean": 105.2}"#,
    )?;

    let service = CannedChat::new(sections_reply());
    let mut engine = AnnotationEngine::new(&service, 1, Duration::ZERO);
    let descriptions = engine.annotate(&ws, &["glucose_analysis.png".to_string()]).await?;

    assert_eq!(descriptions.len(), 1);
    assert_eq!(descriptions[0].graph_name, "glucose_analysis.png");
    assert_eq!(descriptions[0].question, "trend of glucose");
    assert_eq!(descriptions[0].stats_file, "glucose_analysis_stats.json");
    assert_eq!(descriptions[0].sections.len(), 3);

    // The record was also persisted for the report assembler.
    let persisted = fs::read_to_string(ws.description_dir().join("glucose_analysis.json"))?;
    assert!(persisted.contains("Analysis Overview"));
    Ok(())
}

#[tokio::test]
async fn chart_without_stats_file_is_skipped() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.graphs_dir().join("age_distribution.png"), b"png")?;

    let service = CannedChat::new(sections_reply());
    let mut engine = AnnotationEngine::new(&service, 1, Duration::ZERO);
    let descriptions = engine.annotate(&ws, &["age_distribution.png".to_string()]).await?;

    assert!(descriptions.is_empty());
    assert_eq!(service.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn failing_service_skips_the_chart_instead_of_failing_the_pass() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.graphs_dir().join("bmi_analysis.png"), b"png")?;
    fs::write(ws.stats_dir().join("bmi_analysis_stats.json"), r#"{"question": "bmi"}"#)?;

    let service = FailingChat::new();
    let mut engine = AnnotationEngine::new(&service, 1, Duration::ZERO)
        .with_retry(autoreport::retry::RetryPolicy::new(3, Duration::from_millis(10)));
    let descriptions = engine.annotate(&ws, &["bmi_analysis.png".to_string()]).await?;

    assert!(descriptions.is_empty());
    // The per-call retry budget was spent before giving up on the chart.
    assert_eq!(service.calls(), 3);
    assert!(!ws.description_dir().join("bmi_analysis.json").exists());
    Ok(())
}

#[tokio::test]
async fn newest_stats_file_wins_when_several_match() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;
    fs::write(ws.graphs_dir().join("glucose_analysis.png"), b"png")?;
    fs::write(ws.stats_dir().join("glucose_trend_stats.json"), r#"{"question": "old"}"#)?;
    std::thread::sleep(Duration::from_millis(20));
    fs::write(ws.stats_dir().join("glucose_analysis_stats.json"), r#"{"question": "new"}"#)?;

    let service = CannedChat::new(sections_reply());
    let mut engine = AnnotationEngine::new(&service, 1, Duration::ZERO);
    let descriptions = engine.annotate(&ws, &["glucose_analysis.png".to_string()]).await?;

    assert_eq!(descriptions.len(), 1);
    assert_eq!(descriptions[0].question, "new");
    Ok(())
}
