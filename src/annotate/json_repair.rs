//! Tolerant extraction and repair of JSON embedded in service responses.
//!
//! Annotation responses are expected to contain one JSON object, usually
//! surrounded by prose or fences and occasionally malformed. The repair
//! handles the defects actually seen in the wild: stray newlines,
//! trailing commas and unquoted identifier keys.

use serde_json::Value;

/// First balanced brace-delimited object in `text`, if any.
pub fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair common formatting defects, returning text that should parse.
pub fn repair(raw: &str) -> String {
    let flattened: String =
        raw.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }).collect();

    let mut out = String::with_capacity(flattened.len());
    let mut chars = flattened.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    let mut prev_significant = '\0';

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                prev_significant = '"';
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                // Trailing comma: drop it if the next significant char closes.
                let mut lookahead = chars.clone();
                let next = loop {
                    match lookahead.next() {
                        Some(n) if n.is_whitespace() => continue,
                        other => break other,
                    }
                };
                if matches!(next, Some('}') | Some(']')) {
                    continue;
                }
                out.push(c);
                prev_significant = c;
            }
            c if c.is_alphabetic() || c == '_' => {
                // Bare identifier in key position gets quoted.
                let mut ident = String::new();
                ident.push(c);
                while let Some(&n) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let mut lookahead = chars.clone();
                let next = loop {
                    match lookahead.next() {
                        Some(n) if n.is_whitespace() => continue,
                        other => break other,
                    }
                };
                let key_position = matches!(prev_significant, '{' | ',' | '\0');
                if key_position && next == Some(':') && !is_json_literal(&ident) {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                prev_significant = c;
            }
            c => {
                out.push(c);
                if !c.is_whitespace() {
                    prev_significant = c;
                }
            }
        }
    }
    out
}

fn is_json_literal(ident: &str) -> bool {
    matches!(ident, "true" | "false" | "null")
}

/// Extract, repair and parse the first JSON object in a raw response.
pub fn parse_embedded_object(raw: &str) -> Option<Value> {
    let candidate = extract_object(raw)?;
    if let Ok(v) = serde_json::from_str::<Value>(candidate) {
        return Some(v);
    }
    serde_json::from_str(&repair(candidate)).ok()
}
