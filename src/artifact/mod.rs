//! Generated-artifact support: the structured-comment grammar for
//! expected-output declarations, plus cleanup of service responses.
//!
//! A declaration is a comment line of the form `# Output: <name>.png`.
//! Each declared base name implies one chart (`graphs/<base>.png`) and one
//! statistics file (`stats/<base>_stats.json`).

use crate::error::{PipelineError, Result};

/// One expected chart/statistics pair declared by the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOutput {
    pub base: String,
}

impl ExpectedOutput {
    pub fn graph_file(&self) -> String {
        format!("{}.png", self.base)
    }

    pub fn stats_file(&self) -> String {
        format!("{}_stats.json", self.base)
    }
}

/// Parse all `# Output:` declarations from artifact source text.
///
/// Base names must be unique within one artifact; a duplicate is a
/// generation defect surfaced as an error.
pub fn expected_outputs(source: &str) -> Result<Vec<ExpectedOutput>> {
    let mut outputs: Vec<ExpectedOutput> = Vec::new();
    for line in source.lines() {
        let Some(decl) = parse_declaration(line) else { continue };
        if outputs.iter().any(|o| o.base == decl.base) {
            return Err(PipelineError::Generation(format!(
                "duplicate expected-output base name: {}",
                decl.base
            )));
        }
        outputs.push(decl);
    }
    Ok(outputs)
}

fn parse_declaration(line: &str) -> Option<ExpectedOutput> {
    let rest = line.trim_start().strip_prefix("# Output:")?;
    let name = rest.trim();
    if name.is_empty() {
        return None;
    }
    let base = name.strip_suffix(".png").unwrap_or(name);
    Some(ExpectedOutput { base: base.to_string() })
}

/// Find the distinguished `base_name = "..."` assignment in generated code.
pub fn extract_base_name(source: &str) -> Option<String> {
    for line in source.lines() {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix("base_name") else { continue };
        let rest = rest.trim_start();
        let Some(rest) = rest.strip_prefix('=') else { continue };
        let rest = rest.trim();
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let inner = &rest[1..];
        if let Some(end) = inner.find(quote) {
            let name = &inner[..end];
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Strip markdown code fences and `exec("""...""")` wrappers from a
/// service response, leaving bare source text.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }

    // Some services wrap the whole program in exec("""...""").
    let cleaned = out.trim();
    if let Some(rest) = cleaned.strip_prefix("exec(\"\"\"") {
        if let Some(body) = rest.strip_suffix("\"\"\")") {
            return body.trim().to_string();
        }
    }
    out.trim_end().to_string() + "\n"
}
