use std::fs;

use anyhow::Result;

use autoreport::annotate::{Conclusion, DataPoint, Description, Section};
use autoreport::report::pdf::PdfRenderer;
use autoreport::report::ReportAssembler;
use autoreport::workspace::Workspace;

fn sample_description(graph_name: &str, question: &str) -> Description {
    Description {
        graph_name: graph_name.to_string(),
        question: question.to_string(),
        stats_file: format!("{}_stats.json", graph_name.trim_end_matches(".png")),
        sections: vec![
            Section {
                title: Some("Score Trend".into()),
                heading: "Analysis Overview".into(),
                content: "Scores trend upward over the sample.".into(),
                data_points: vec![DataPoint {
                    metric: "mean".into(),
                    value: serde_json::json!(72.5),
                    significance: "baseline level".into(),
                }],
                calculations: vec![],
                key_conclusions: vec![],
                limitations: vec![],
                next_steps: vec![],
            },
            Section {
                title: None,
                heading: "Conclusions and Recommendations".into(),
                content: "The trend is consistent.".into(),
                data_points: vec![],
                calculations: vec![],
                key_conclusions: vec![Conclusion {
                    finding: "upward trend".into(),
                    impact: "positive".into(),
                    recommendation: "keep monitoring".into(),
                }],
                limitations: vec!["small sample".into()],
                next_steps: vec!["collect more data".into()],
            },
        ],
    }
}

#[test]
fn assembles_a_pdf_into_the_output_area() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;

    let renderer = PdfRenderer::default();
    let assembler = ReportAssembler::new(&renderer, "Health Metrics Report");
    let descriptions = vec![
        sample_description("score_analysis.png", "average score"),
        sample_description("age_distribution.png", "age distribution"),
    ];

    let path = assembler.assemble(&ws, &descriptions)?;
    assert!(path.exists());
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("analysis_report_"));
    assert!(path.extension().unwrap() == "pdf");

    let bytes = fs::read(&path)?;
    assert!(bytes.starts_with(b"%PDF"), "output is not a PDF document");

    // Atomic write: the output area holds exactly the finished document.
    let entries: Vec<_> = fs::read_dir(ws.output_dir())?.collect();
    assert_eq!(entries.len(), 1);
    Ok(())
}

#[test]
fn missing_chart_file_does_not_fail_assembly() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;

    // Description references a chart that was never written to disk.
    let renderer = PdfRenderer::default();
    let assembler = ReportAssembler::new(&renderer, "Report");
    let path = assembler.assemble(&ws, &[sample_description("gone.png", "q")])?;
    assert!(fs::read(&path)?.starts_with(b"%PDF"));
    Ok(())
}

#[test]
fn report_embeds_existing_charts() -> Result<()> {
    let base = tempfile::tempdir()?;
    let ws = Workspace::create(base.path())?;

    // A tiny real PNG so the renderer can transcode it.
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 60, 60]));
    img.save(ws.graphs_dir().join("score_analysis.png"))?;

    let renderer = PdfRenderer::default();
    let assembler = ReportAssembler::new(&renderer, "Report");
    let path = assembler.assemble(&ws, &[sample_description("score_analysis.png", "q")])?;

    let bytes = fs::read(&path)?;
    // DCT-encoded image object present in the document.
    assert!(bytes.windows(9).any(|w| w == b"DCTDecode"));
    Ok(())
}
