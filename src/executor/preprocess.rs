//! Encoding-compatibility rewrite applied to every artifact before it
//! runs.
//!
//! Generated code routinely emits NumPy scalars and arrays into the
//! statistics JSON; those are not portable. The rewrite prepends an
//! encoder that maps them to built-in scalar/sequence types and redirects
//! every `json.dump(...)` call site through it.

use crate::error::{PipelineError, Result};

const ENCODER_PREAMBLE: &str = r#"import json
import numpy as np
import pandas as pd

class NumpyJSONEncoder(json.JSONEncoder):
    """JSON encoder that degrades NumPy/pandas values to portable types."""
    def default(self, obj):
        if isinstance(obj, np.integer):
            return int(obj)
        if isinstance(obj, np.floating):
            return float(obj)
        if isinstance(obj, np.ndarray):
            return obj.tolist()
        if isinstance(obj, (pd.Series, pd.DataFrame)):
            return obj.to_dict()
        return super().default(obj)

"#;

const DUPLICATE_IMPORTS: [&str; 3] = ["import json", "import numpy as np", "import pandas as pd"];

/// Rewrite artifact source: inject the encoder preamble (removing the
/// imports it supersedes) and force `json.dump` calls through it.
pub fn rewrite(source: &str) -> Result<String> {
    let mut body = String::with_capacity(source.len());
    for line in source.lines() {
        if DUPLICATE_IMPORTS.iter().any(|imp| line.contains(imp)) {
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }

    let mut out = String::with_capacity(ENCODER_PREAMBLE.len() + body.len());
    out.push_str(ENCODER_PREAMBLE);
    out.push_str(&rewrite_dump_calls(&body)?);
    Ok(out)
}

/// Replace each `json.dump(obj, fh, ...)` with a call routed through
/// `NumpyJSONEncoder`, preserving any explicit indent.
fn rewrite_dump_calls(source: &str) -> Result<String> {
    const NEEDLE: &str = "json.dump(";
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(pos) = rest.find(NEEDLE) {
        out.push_str(&rest[..pos]);
        let args_start = pos + NEEDLE.len();
        let args_end = find_balanced_close(&rest[args_start..]).ok_or_else(|| {
            PipelineError::Preprocess("unbalanced parentheses in json.dump call".into())
        })?;
        let args = &rest[args_start..args_start + args_end];
        out.push_str(&rebuild_dump(args));
        rest = &rest[args_start + args_end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Offset of the `)` closing the argument list, honoring nesting and
/// string literals.
fn find_balanced_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    for (i, ch) in s.char_indices() {
        if let Some(q) = quote {
            if ch == q && prev != '\\' {
                quote = None;
            }
        } else {
            match ch {
                '\'' | '"' => quote = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    if ch == ')' && depth == 0 {
                        return Some(i);
                    }
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            }
        }
        prev = ch;
    }
    None
}

fn rebuild_dump(args: &str) -> String {
    let parts = split_top_level(args);
    let mut positional: Vec<&str> = Vec::new();
    let mut indent: Option<String> = None;

    for part in &parts {
        let p = part.trim();
        if let Some(v) = kwarg_value(p, "indent") {
            indent = Some(v.to_string());
        } else if kwarg_value(p, "default").is_some() || kwarg_value(p, "cls").is_some() {
            // Superseded by the injected encoder.
        } else {
            positional.push(p);
        }
    }

    let obj = positional.first().copied().unwrap_or("{}");
    let file_obj = positional.get(1).copied().unwrap_or("f");
    format!(
        "json.dump({}, {}, cls=NumpyJSONEncoder, indent={})",
        obj,
        file_obj,
        indent.as_deref().unwrap_or("4")
    )
}

fn kwarg_value<'a>(part: &'a str, name: &str) -> Option<&'a str> {
    let rest = part.strip_prefix(name)?.trim_start();
    rest.strip_prefix('=').map(str::trim)
}

fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    let mut start = 0usize;
    for (i, ch) in args.char_indices() {
        if let Some(q) = quote {
            if ch == q && prev != '\\' {
                quote = None;
            }
        } else {
            match ch {
                '\'' | '"' => quote = Some(ch),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(&args[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        prev = ch;
    }
    parts.push(&args[start..]);
    parts
}
