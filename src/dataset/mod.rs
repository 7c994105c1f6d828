//! Tabular data ingestion.
//!
//! Parses an uploaded CSV into typed columns and a small head sample. The
//! profile feeds the code-generation prompt; an empty or malformed file
//! fails the request before any generation happens.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

const HEAD_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Int => "int64",
            ColumnType::Float => "float64",
            ColumnType::Bool => "bool",
            ColumnType::Text => "object",
        };
        f.write_str(s)
    }
}

/// Typed view of an ingested dataset, enough to describe it to the code
/// generator without ever re-reading the file.
#[derive(Debug, Clone)]
pub struct DatasetProfile {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub dtypes: Vec<ColumnType>,
    pub head: Vec<Vec<String>>,
    pub row_count: usize,
}

impl DatasetProfile {
    /// `column: dtype` lines for prompt embedding.
    pub fn dtype_map(&self) -> String {
        self.columns
            .iter()
            .zip(&self.dtypes)
            .map(|(c, t)| format!("{}: {}", c, t))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Head sample rendered as CSV text (header plus up to five rows).
    pub fn head_sample(&self) -> String {
        let mut out = self.columns.join(",");
        for row in &self.head {
            out.push('\n');
            out.push_str(&row.join(","));
        }
        out
    }
}

/// Read and profile a CSV file.
pub fn read_csv(path: &Path) -> Result<DatasetProfile> {
    if !path.exists() {
        return Err(PipelineError::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)
        .map_err(|e| PipelineError::storage_io(format!("read {}", path.display()), e))?;

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| PipelineError::DataFormat("empty dataset".into()))?;
    let columns = split_row(header);
    if columns.iter().any(|c| c.is_empty()) {
        return Err(PipelineError::DataFormat("blank column name in header".into()));
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (i, line) in lines.enumerate() {
        let row = split_row(line);
        if row.len() != columns.len() {
            return Err(PipelineError::DataFormat(format!(
                "row {} has {} fields, expected {}",
                i + 2,
                row.len(),
                columns.len()
            )));
        }
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(PipelineError::DataFormat("dataset has a header but no rows".into()));
    }

    let dtypes = (0..columns.len())
        .map(|c| infer_type(rows.iter().map(|r| r[c].as_str())))
        .collect();
    let head = rows.iter().take(HEAD_ROWS).cloned().collect();
    let row_count = rows.len();

    Ok(DatasetProfile { path: path.to_path_buf(), columns, dtypes, head, row_count })
}

/// Split one CSV line, honoring double-quoted fields with `""` escapes.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(field.trim().to_string());
                field = String::new();
            }
            _ => field.push(ch),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn infer_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut ty = ColumnType::Int;
    let mut seen = false;
    for v in values {
        if v.is_empty() {
            continue;
        }
        seen = true;
        let candidate = classify(v);
        ty = match (ty, candidate) {
            (t, c) if t == c => t,
            (ColumnType::Int, ColumnType::Float) | (ColumnType::Float, ColumnType::Int) => {
                ColumnType::Float
            }
            _ => return ColumnType::Text,
        };
    }
    if seen {
        ty
    } else {
        ColumnType::Text
    }
}

fn classify(value: &str) -> ColumnType {
    if value.parse::<i64>().is_ok() {
        ColumnType::Int
    } else if value.parse::<f64>().is_ok() {
        ColumnType::Float
    } else if matches!(value.to_ascii_lowercase().as_str(), "true" | "false") {
        ColumnType::Bool
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn profiles_typed_columns() {
        let f = write_csv("A,B,C\n1,2.5,x\n2,3.5,y\n3,4.0,z\n");
        let p = read_csv(f.path()).unwrap();
        assert_eq!(p.columns, vec!["A", "B", "C"]);
        assert_eq!(p.dtypes, vec![ColumnType::Int, ColumnType::Float, ColumnType::Text]);
        assert_eq!(p.row_count, 3);
        assert!(p.dtype_map().contains("A: int64"));
    }

    #[test]
    fn empty_file_is_a_data_format_error() {
        let f = write_csv("");
        let err = read_csv(f.path()).unwrap_err();
        assert!(matches!(err, PipelineError::DataFormat(_)));
    }

    #[test]
    fn header_only_is_rejected() {
        let f = write_csv("A,B\n");
        assert!(matches!(read_csv(f.path()).unwrap_err(), PipelineError::DataFormat(_)));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let f = write_csv("A,B\n1,2\n3\n");
        assert!(matches!(read_csv(f.path()).unwrap_err(), PipelineError::DataFormat(_)));
    }

    #[test]
    fn quoted_commas_stay_in_one_field() {
        let f = write_csv("A,B\n\"x, y\",2\n");
        let p = read_csv(f.path()).unwrap();
        assert_eq!(p.head[0][0], "x, y");
    }
}
