use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::IngestError;

/// Records parsed from a JSONL source, in file order.
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<Value>,
    /// Trimmed source line of each record, parallel to `records`.
    pub lines: Vec<String>,
    /// Non-blank lines that did not parse as JSON.
    pub malformed: usize,
}

impl LoadedRecords {
    /// Payload text of every record: its source line as written, so stored
    /// texts compare equal to the lines the consistency checker reads.
    pub fn texts(&self) -> Vec<String> {
        self.lines.clone()
    }
}

/// First `max` characters of `s`, with an ellipsis when cut.
pub fn preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Parses one JSON value per line. Blank lines are ignored and malformed
/// lines are counted and skipped.
pub fn parse_records<R: BufRead>(reader: R) -> std::io::Result<LoadedRecords> {
    let mut loaded = LoadedRecords::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => {
                loaded.records.push(value);
                loaded.lines.push(trimmed.to_string());
            }
            Err(e) => {
                tracing::warn!(
                    line = idx + 1,
                    error = %e,
                    preview = %preview(trimmed, 100),
                    "Skipping malformed JSON line"
                );
                loaded.malformed += 1;
            }
        }
    }
    Ok(loaded)
}

pub fn load_records(path: &Path) -> Result<LoadedRecords, IngestError> {
    if !path.exists() {
        return Err(IngestError::SourceNotFound(path.to_path_buf()));
    }
    let io_err = |source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let loaded = parse_records(BufReader::new(file)).map_err(io_err)?;
    tracing::info!(
        path = %path.display(),
        records = loaded.records.len(),
        malformed = loaded.malformed,
        "Loaded JSONL records"
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_malformed_and_blank_lines_are_skipped() {
        let input = "{\"q\": 1}\n\n   \n{not json\n[1, 2]\n\"plain\"\n";
        let loaded = parse_records(Cursor::new(input)).unwrap();
        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.malformed, 1);
    }

    #[test]
    fn test_texts_keep_source_spacing_and_key_order() {
        let loaded =
            parse_records(Cursor::new("  {\"zeta\": 1, \"alpha\": \"b\"}  \n{\"q\":2}\n")).unwrap();
        assert_eq!(
            loaded.texts(),
            vec![r#"{"zeta": 1, "alpha": "b"}"#.to_string(), r#"{"q":2}"#.to_string()]
        );
    }

    #[test]
    fn test_missing_file() {
        let err = load_records(Path::new("/nonexistent/query_dataset.jsonl")).unwrap_err();
        assert!(matches!(err, IngestError::SourceNotFound(_)));
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        assert_eq!(preview("héllo", 2), "hé...");
        assert_eq!(preview("short", 100), "short");
    }
}
