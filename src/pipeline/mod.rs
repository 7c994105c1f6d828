//! Per-request pipeline orchestration.
//!
//! The context object replaces the original system's global singletons:
//! every stage receives the current workspace and dataset through it, so
//! two requests can never share state by accident. Stages run strictly in
//! order: generate, execute (with repair), annotate, assemble.

use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::annotate::AnnotationEngine;
use crate::config::Config;
use crate::dataset::{read_csv, DatasetProfile};
use crate::error::{PipelineError, Result};
use crate::executor::Executor;
use crate::generate::CodeGenerator;
use crate::llm::ChatService;
use crate::repair::RepairLoop;
use crate::report::pdf::DocumentRenderer;
use crate::report::ReportAssembler;
use crate::workspace::Workspace;

/// Mutable per-request state threaded through the pipeline.
pub struct PipelineContext {
    pub config: Config,
    workspace: Option<Workspace>,
    dataset: Option<DatasetProfile>,
}

impl PipelineContext {
    pub fn new(config: Config) -> Self {
        Self { config, workspace: None, dataset: None }
    }

    /// Ingest the uploaded dataset: fresh workspace, file copied into its
    /// data area, profile captured for the generation prompt.
    pub fn prepare(&mut self, uploaded: &Path) -> Result<()> {
        let ws = Workspace::create(&self.config.response_dir())?;

        let file_name = uploaded
            .file_name()
            .ok_or_else(|| PipelineError::NotFound(uploaded.to_path_buf()))?;
        let staged = ws.data_dir().join(file_name);
        fs::copy(uploaded, &staged).map_err(|e| {
            PipelineError::storage_io(format!("stage dataset {}", uploaded.display()), e)
        })?;

        // Malformed or empty data fails the request before any
        // generation happens.
        let profile = read_csv(&staged)?;
        info!(
            workspace = %ws.id(),
            rows = profile.row_count,
            columns = profile.columns.len(),
            "dataset staged"
        );

        self.workspace = Some(ws);
        self.dataset = Some(profile);
        Ok(())
    }

    pub fn current_workspace(&self) -> Result<&Workspace> {
        self.workspace
            .as_ref()
            .ok_or_else(|| PipelineError::State("no active request workspace".into()))
    }

    fn dataset(&self) -> Result<&DatasetProfile> {
        self.dataset
            .as_ref()
            .ok_or_else(|| PipelineError::State("no dataset uploaded".into()))
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub request_id: String,
    pub visualizations: Vec<String>,
    pub descriptions: usize,
    pub report_file: String,
}

/// The orchestrator, generic over its external collaborators so tests can
/// substitute doubles for every service.
pub struct Pipeline<'a> {
    pub generator: &'a dyn ChatService,
    pub fixer: &'a dyn ChatService,
    pub annotator: &'a dyn ChatService,
    pub renderer: &'a dyn DocumentRenderer,
}

impl<'a> Pipeline<'a> {
    pub async fn run(
        &self,
        ctx: &mut PipelineContext,
        questions: &[String],
        report_title: &str,
    ) -> Result<AnalysisOutcome> {
        let ws = ctx.current_workspace()?.clone();
        let request_id = ws.id();
        info!(workspace = %request_id, questions = questions.len(), "starting analysis");

        match self.run_stages(ctx, &ws, questions, report_title).await {
            Ok(outcome) => {
                info!(workspace = %request_id, "analysis completed");
                Ok(outcome)
            }
            Err(e) => {
                // Terminal errors always carry workspace and stage context.
                error!(workspace = %request_id, stage = e.stage(), error = %e, "analysis failed");
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        ctx: &PipelineContext,
        ws: &Workspace,
        questions: &[String],
        report_title: &str,
    ) -> Result<AnalysisOutcome> {
        let profile = ctx.dataset()?;
        let cfg = &ctx.config;

        CodeGenerator::new(self.generator).generate(ws, profile, questions).await?;

        let repair =
            RepairLoop::new(self.fixer, cfg.get_u64("REPAIR_MAX_ATTEMPTS").unwrap_or(3) as u32);
        let executor =
            Executor::new(cfg.python_bin(), cfg.get_u64("EXECUTION_TIMEOUT").unwrap_or(0), repair);
        let execution = executor.execute(ws, &profile.path).await?;

        let min_delay = std::time::Duration::from_secs_f64(
            cfg.get_f64("ANNOTATION_MIN_DELAY").unwrap_or(3.0),
        );
        let batch_size = cfg.get_usize("ANNOTATION_BATCH_SIZE").unwrap_or(1);
        let mut engine = AnnotationEngine::new(self.annotator, batch_size, min_delay);
        let descriptions = engine.annotate(ws, &execution.chart_files).await?;
        if descriptions.is_empty() {
            return Err(PipelineError::DataFormat(
                "no chart could be annotated".into(),
            ));
        }

        let report_path =
            ReportAssembler::new(self.renderer, report_title).assemble(ws, &descriptions)?;

        Ok(AnalysisOutcome {
            request_id: ws.id(),
            visualizations: execution.chart_files,
            descriptions: descriptions.len(),
            report_file: report_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }
}
