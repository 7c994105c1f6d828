//! Annotation engine: pairs each chart with its statistics file and asks
//! the external multimodal service for a structured interpretation.
//!
//! External calls are rate limited and batched; a single chart failing to
//! annotate is logged and skipped, never fatal for the request.

pub mod image_opt;
pub mod json_repair;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::llm::{ChatMessage, ChatService, ContentPart, Role};
use crate::retry::RetryPolicy;
use crate::workspace::Workspace;

const ANALYSIS_TEMPLATE: &str = r#"Analyze this visualization and statistical data to provide a comprehensive professional analysis. Use the statistical data provided to support your analysis and answer the analysis question.

Format your response in the following JSON structure:

{
    "sections": [
        {
            "title": "Clear and Professional Title based on Analysis",
            "heading": "Analysis Overview",
            "content": "Comprehensive answer incorporating statistical findings",
            "data_points": [
                {"metric": "Statistical measure name", "value": "Result", "significance": "Why it matters"}
            ]
        },
        {
            "heading": "Statistical Evidence",
            "content": "Detailed statistical interpretation",
            "calculations": [
                {"name": "Statistical measure", "value": "Calculated result", "interpretation": "Meaning"}
            ]
        },
        {
            "heading": "Conclusions and Recommendations",
            "content": "Overall conclusions from analysis",
            "key_conclusions": [
                {"finding": "Key insight", "impact": "Analytical impact", "recommendation": "Actionable suggestion"}
            ],
            "limitations": ["Analysis limitations or caveats"],
            "next_steps": ["Recommended actions"]
        }
    ]
}"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric: String,
    pub value: Value,
    #[serde(default)]
    pub significance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calculation {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub interpretation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conclusion {
    pub finding: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub recommendation: String,
}

/// One structured block of an annotation. The heading discriminates the
/// shape; absent fields simply stay empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_points: Vec<DataPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calculations: Vec<Calculation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_conclusions: Vec<Conclusion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub limitations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
}

/// Immutable per-chart annotation record, persisted to the descriptions
/// area and consumed by the report assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Description {
    pub graph_name: String,
    pub question: String,
    pub stats_file: String,
    pub sections: Vec<Section>,
}

pub struct AnnotationEngine<'a> {
    service: &'a dyn ChatService,
    batch_size: usize,
    min_delay: Duration,
    last_call: Option<Instant>,
    retry: RetryPolicy,
}

impl<'a> AnnotationEngine<'a> {
    pub fn new(service: &'a dyn ChatService, batch_size: usize, min_delay: Duration) -> Self {
        Self {
            service,
            batch_size: batch_size.max(1),
            min_delay,
            last_call: None,
            retry: RetryPolicy::new(3, Duration::from_secs(2))
                .with_bounds(Duration::from_secs(4), Duration::from_secs(30)),
        }
    }

    /// Override the per-call retry policy, used to shrink backoff in tests.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Annotate the given charts, returning only the successful subset.
    pub async fn annotate(
        &mut self,
        ws: &Workspace,
        chart_files: &[String],
    ) -> Result<Vec<Description>> {
        let mut descriptions = Vec::new();
        let mut failures = 0usize;
        let batches: Vec<&[String]> = chart_files.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (bi, batch) in batches.into_iter().enumerate() {
            for chart in batch {
                let Some(stats_path) = self.pair_stats_file(ws, chart)? else {
                    warn!(chart, "no matching stats file, skipping chart");
                    continue;
                };
                match self.process_single_chart(ws, chart, &stats_path).await {
                    Ok(desc) => descriptions.push(desc),
                    Err(e) => {
                        failures += 1;
                        error!(chart, error = %e, "annotation failed for chart");
                    }
                }
                tokio::time::sleep(self.min_delay).await;
            }
            if bi + 1 < batch_count {
                // Larger gap between batches on top of the per-call limit.
                tokio::time::sleep(self.min_delay * 2).await;
            }
        }

        info!(
            annotated = descriptions.len(),
            failed = failures,
            total = chart_files.len(),
            "annotation pass complete"
        );
        Ok(descriptions)
    }

    /// Pairing rule: drop the last underscore-delimited token of the chart
    /// base name, then pick the newest stats file starting with that
    /// prefix and ending with the stats suffix.
    fn pair_stats_file(&self, ws: &Workspace, chart: &str) -> Result<Option<PathBuf>> {
        let base = chart.strip_suffix(".png").unwrap_or(chart);
        let prefix = match base.rsplit_once('_') {
            Some((head, _)) => head,
            None => base,
        };

        let entries = fs::read_dir(ws.stats_dir())
            .map_err(|e| PipelineError::storage_io("read stats area", e))?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(prefix) && n.ends_with("_stats.json"))
                    .unwrap_or(false)
            })
            .collect();

        // Most recently created wins when several match.
        candidates.sort_by_key(|p| {
            fs::metadata(p).and_then(|m| m.created().or_else(|_| m.modified())).ok()
        });
        Ok(candidates.pop())
    }

    async fn process_single_chart(
        &mut self,
        ws: &Workspace,
        chart: &str,
        stats_path: &Path,
    ) -> Result<Description> {
        let image_bytes = fs::read(ws.graphs_dir().join(chart))
            .map_err(|e| PipelineError::storage_io(format!("read chart {chart}"), e))?;
        let optimized = image_opt::optimize(&image_bytes);

        let stats = load_stats(stats_path)?;
        let question = stats
            .get("question")
            .and_then(|q| q.as_str())
            .unwrap_or("Analyze the visualization")
            .to_string();

        let prompt = format!(
            "Statistical Data:\n{}\n\n{}",
            serde_json::to_string_pretty(&stats).unwrap_or_default(),
            ANALYSIS_TEMPLATE
        );
        let message = ChatMessage::multimodal(
            Role::User,
            vec![ContentPart::text(prompt), ContentPart::jpeg(&optimized)],
        );

        let response = self.call_with_retry(vec![message]).await?;
        let parsed = json_repair::parse_embedded_object(&response).ok_or_else(|| {
            PipelineError::DataFormat("annotation response contained no parsable JSON".into())
        })?;
        let sections: Vec<Section> =
            serde_json::from_value(parsed.get("sections").cloned().unwrap_or(Value::Null))
                .map_err(|e| PipelineError::DataFormat(format!("bad sections shape: {e}")))?;

        let description = Description {
            graph_name: chart.to_string(),
            question,
            stats_file: stats_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            sections,
        };

        let base = chart.strip_suffix(".png").unwrap_or(chart);
        let out_path = ws.description_dir().join(format!("{base}.json"));
        let json = serde_json::to_string_pretty(&description)
            .map_err(|e| PipelineError::DataFormat(e.to_string()))?;
        fs::write(&out_path, json)
            .map_err(|e| PipelineError::storage_io("write description", e))?;
        info!(chart, description = %out_path.display(), "generated description");

        Ok(description)
    }

    async fn call_with_retry(&mut self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.rate_limit().await;
            match self.service.complete(messages.clone()).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    let msg = e.to_string();
                    if msg.to_lowercase().contains("deadline")
                        || msg.to_lowercase().contains("timeout")
                    {
                        // Adaptive backpressure: the service is telling us
                        // we call too often; slow every later call down.
                        self.min_delay += Duration::from_secs(1);
                        warn!(min_delay_secs = self.min_delay.as_secs(), "raised inter-call delay");
                    }
                    if !self.retry.attempts_left(attempt) {
                        return Err(PipelineError::DataFormat(format!(
                            "annotation service failed after {attempt} attempts: {msg}"
                        )));
                    }
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                }
            }
        }
    }

    /// Enforce a minimum gap between consecutive external calls.
    async fn rate_limit(&mut self) {
        if let Some(last) = self.last_call {
            let since = last.elapsed();
            if since < self.min_delay {
                tokio::time::sleep(self.min_delay - since).await;
            }
        }
        self.last_call = Some(Instant::now());
    }
}

/// Load a statistics file; it must deserialize to a JSON mapping.
fn load_stats(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .map_err(|e| PipelineError::storage_io(format!("read {}", path.display()), e))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| PipelineError::DataFormat(format!("stats {}: {e}", path.display())))?;
    if !value.is_object() {
        return Err(PipelineError::DataFormat(format!(
            "stats {} is not a mapping",
            path.display()
        )));
    }
    Ok(value)
}
