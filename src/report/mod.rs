//! Report assembly.
//!
//! Two-pass by construction: every section except the table of contents
//! is composed first, accumulating TOC entries against a running page
//! counter; the TOC is rendered from the finished entry list and spliced
//! in after the cover. Output is written atomically (temp file, then
//! rename into the output area).

pub mod pdf;
pub mod toc;

use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use crate::annotate::Description;
use crate::error::{PipelineError, Result};
use crate::workspace::Workspace;

use pdf::{Block, DocumentRenderer, PageDecoration};
use toc::Toc;

pub struct ReportAssembler<'a> {
    renderer: &'a dyn DocumentRenderer,
    toc: Toc,
    title: String,
    figure_count: usize,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(renderer: &'a dyn DocumentRenderer, title: impl Into<String>) -> Self {
        Self { renderer, toc: Toc::new(), title: title.into(), figure_count: 0 }
    }

    /// Compose and render the final document; returns its path.
    pub fn assemble(mut self, ws: &Workspace, descriptions: &[Description]) -> Result<PathBuf> {
        let cover = self.cover_blocks();
        let summary = self.summary_blocks(descriptions);
        let chapters = self.chapter_blocks(ws, descriptions);
        let closing = self.closing_blocks(descriptions);
        // Entry list is complete only now.
        let contents = self.toc_blocks();

        let mut blocks = cover;
        blocks.extend(contents);
        blocks.extend(summary);
        blocks.extend(chapters);
        blocks.extend(closing);

        let title = self.title.clone();
        let decorate = move |page: u32| PageDecoration {
            header: title.clone(),
            footer: format!("Page {}", page),
        };
        let bytes = self.renderer.render(&blocks, &decorate)?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let target = ws.output_dir().join(format!("analysis_report_{}.pdf", timestamp));

        // Write-then-rename: a failed render or write never leaves a
        // partial document in the output area.
        let mut tmp = tempfile::NamedTempFile::new_in(ws.output_dir())
            .map_err(|e| PipelineError::Report(format!("create temp output: {e}")))?;
        tmp.write_all(&bytes)
            .map_err(|e| PipelineError::Report(format!("write report: {e}")))?;
        tmp.persist(&target)
            .map_err(|e| PipelineError::Report(format!("finalize report: {e}")))?;

        info!(report = %target.display(), pages = self.toc.current_page(), "report assembled");
        Ok(target)
    }

    fn cover_blocks(&mut self) -> Vec<Block> {
        self.toc.add_entry("Cover", 1);
        let blocks = vec![
            Block::Spacer(160.0),
            Block::Heading { text: self.title.clone(), level: 1 },
            Block::Spacer(60.0),
            Block::Paragraph(chrono::Local::now().format("%B %d, %Y").to_string()),
            Block::PageBreak,
        ];
        self.toc.increment_page();
        blocks
    }

    fn summary_blocks(&mut self, descriptions: &[Description]) -> Vec<Block> {
        let mut blocks = Vec::new();

        self.toc.add_entry("Executive Summary", 1);
        blocks.push(Block::Heading { text: "Executive Summary".into(), level: 1 });

        self.toc.add_entry("Overview", 2);
        blocks.push(Block::Heading { text: "Overview".into(), level: 2 });
        blocks.push(Block::Paragraph(
            "This report presents a comprehensive analysis of the provided data, \
             highlighting key patterns, trends, and actionable insights derived from \
             the analysis."
                .into(),
        ));

        self.toc.add_entry("Key Findings", 2);
        blocks.push(Block::Heading { text: "Key Findings".into(), level: 2 });
        for desc in descriptions {
            for section in &desc.sections {
                if section.heading == "Analysis Overview" && !section.content.is_empty() {
                    blocks.push(Block::Paragraph(format!("- {}", section.content)));
                }
            }
        }

        self.toc.add_entry("Key Conclusions", 2);
        blocks.push(Block::Heading { text: "Key Conclusions".into(), level: 2 });
        for desc in descriptions {
            for section in &desc.sections {
                if section.heading == "Conclusions and Recommendations" {
                    for c in &section.key_conclusions {
                        blocks.push(Block::Paragraph(format!("- Finding: {}", c.finding)));
                        if !c.impact.is_empty() {
                            blocks.push(Block::Paragraph(format!("  Impact: {}", c.impact)));
                        }
                        if !c.recommendation.is_empty() {
                            blocks.push(Block::Paragraph(format!(
                                "  Recommendation: {}",
                                c.recommendation
                            )));
                        }
                    }
                }
            }
        }

        blocks.push(Block::PageBreak);
        self.toc.increment_page();
        blocks
    }

    fn chapter_blocks(&mut self, ws: &Workspace, descriptions: &[Description]) -> Vec<Block> {
        let mut blocks = Vec::new();

        for (i, desc) in descriptions.iter().enumerate() {
            let n = i + 1;
            let title = chapter_title(desc, n);
            let chapter_title = format!("{}. {}", n, title);
            self.toc.add_entry(chapter_title.clone(), 1);
            blocks.push(Block::Heading { text: chapter_title, level: 1 });

            // Chapter still renders when the chart vanished from disk,
            // just without the embedded image.
            let chart_path = ws.graphs_dir().join(&desc.graph_name);
            if chart_path.exists() {
                self.figure_count += 1;
                blocks.push(Block::Image(chart_path));
                blocks.push(Block::Caption(format!("Figure {}: {}", self.figure_count, title)));
            }

            for section in &desc.sections {
                if !section.heading.is_empty() {
                    self.toc.add_entry(section.heading.clone(), 2);
                    blocks.push(Block::Heading { text: section.heading.clone(), level: 2 });
                }
                blocks.extend(section_blocks(section));
            }

            blocks.push(Block::PageBreak);
            self.toc.increment_page();
        }
        blocks
    }

    fn closing_blocks(&mut self, descriptions: &[Description]) -> Vec<Block> {
        let mut limitations: Vec<String> = Vec::new();
        let mut next_steps: Vec<String> = Vec::new();
        for desc in descriptions {
            for section in &desc.sections {
                if section.heading == "Conclusions and Recommendations" {
                    for l in &section.limitations {
                        if !limitations.contains(l) {
                            limitations.push(l.clone());
                        }
                    }
                    for s in &section.next_steps {
                        if !next_steps.contains(s) {
                            next_steps.push(s.clone());
                        }
                    }
                }
            }
        }

        let mut blocks = Vec::new();
        self.toc.add_entry("Limitations & Next Steps", 1);
        blocks.push(Block::Heading { text: "Limitations & Next Steps".into(), level: 1 });

        if !limitations.is_empty() {
            self.toc.add_entry("Limitations", 2);
            blocks.push(Block::Heading { text: "Limitations".into(), level: 2 });
            for l in limitations {
                blocks.push(Block::Paragraph(format!("- {}", l)));
            }
            blocks.push(Block::Spacer(8.0));
        }
        if !next_steps.is_empty() {
            self.toc.add_entry("Next Steps", 2);
            blocks.push(Block::Heading { text: "Next Steps".into(), level: 2 });
            for s in next_steps {
                blocks.push(Block::Paragraph(format!("- {}", s)));
            }
        }

        blocks.push(Block::PageBreak);
        blocks
    }

    fn toc_blocks(&mut self) -> Vec<Block> {
        let mut blocks = vec![
            Block::Heading { text: "Table of Contents".into(), level: 1 },
            Block::Spacer(12.0),
        ];
        for entry in self.toc.entries() {
            blocks.push(Block::TocLine { text: Toc::format_line(entry), level: entry.level });
        }
        blocks.push(Block::PageBreak);
        self.toc.increment_page();
        blocks
    }
}

/// Chapter title: first structured title, else the question, else a
/// generic fallback, normalized for display.
fn chapter_title(desc: &Description, n: usize) -> String {
    let raw = desc
        .sections
        .iter()
        .find_map(|s| s.title.clone())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            if desc.question.is_empty() { None } else { Some(desc.question.clone()) }
        })
        .unwrap_or_else(|| format!("Analysis {}", n));
    format_title(&raw)
}

fn format_title(text: &str) -> String {
    if text.is_empty() {
        return "Untitled Analysis".into();
    }
    text.replace('_', " ")
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn section_blocks(section: &crate::annotate::Section) -> Vec<Block> {
    let mut blocks = Vec::new();
    if !section.content.is_empty() {
        blocks.push(Block::Paragraph(section.content.clone()));
    }
    for p in &section.data_points {
        blocks.push(Block::Paragraph(format!(
            "- {}: {} ({})",
            p.metric,
            display_value(&p.value),
            p.significance
        )));
    }
    if !section.calculations.is_empty() {
        blocks.push(Block::Spacer(6.0));
        for c in &section.calculations {
            blocks.push(Block::Paragraph(format!("- {}: {}", c.name, display_value(&c.value))));
            if !c.interpretation.is_empty() {
                blocks.push(Block::Paragraph(format!("  {}", c.interpretation)));
            }
        }
    }
    for c in &section.key_conclusions {
        blocks.push(Block::Paragraph(format!("- Finding: {}", c.finding)));
        if !c.impact.is_empty() {
            blocks.push(Block::Paragraph(format!("  Impact: {}", c.impact)));
        }
        if !c.recommendation.is_empty() {
            blocks.push(Block::Paragraph(format!("  Recommendation: {}", c.recommendation)));
        }
    }
    blocks.push(Block::Spacer(10.0));
    blocks
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
