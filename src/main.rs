mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use autoreport::config::Config;
use autoreport::llm::LlmClient;
use autoreport::pipeline::{Pipeline, PipelineContext};
use autoreport::report::pdf::PdfRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args = cli::Cli::parse();

    let mut cfg = Config::load();
    if let Some(model) = &args.model {
        cfg.set("DEFAULT_MODEL", model.clone());
    }
    if let Some(model) = &args.vision_model {
        cfg.set("VISION_MODEL", model.clone());
    }
    if let Some(dir) = &args.output_dir {
        cfg.set("RESPONSE_DIR", dir.clone());
    }

    let text_client =
        LlmClient::from_config(&cfg, "DEFAULT_MODEL").context("build text model client")?;
    let vision_client =
        LlmClient::from_config(&cfg, "VISION_MODEL").context("build vision model client")?;
    let renderer = PdfRenderer::default();

    let mut ctx = PipelineContext::new(cfg);
    ctx.prepare(Path::new(&args.data_file))
        .with_context(|| format!("prepare dataset {}", args.data_file))?;

    let pipeline = Pipeline {
        generator: &text_client,
        fixer: &text_client,
        annotator: &vision_client,
        renderer: &renderer,
    };
    let outcome = pipeline.run(&mut ctx, &args.questions, &args.title).await?;

    println!("Request:        {}", outcome.request_id);
    println!("Visualizations: {}", outcome.visualizations.join(", "));
    println!("Descriptions:   {}", outcome.descriptions);
    println!("Report:         {}", outcome.report_file);
    Ok(())
}
