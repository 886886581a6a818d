//! JSONL (JSON Lines) export/import support.
//!
//! `gng data export` writes one tagged record per line; import replays
//! them into an empty Store. The record set covers every entity plus
//! execution history and Store metadata (ID counters, since-token), so an
//! export/import round trip reconstructs an equivalent Store.

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::defect::Defect;
use crate::dependency::EpicDependency;
use crate::entity::Capability;
use crate::epic::Epic;
use crate::story::UserStory;
use crate::test::{ExecutionRecord, Test};

/// Error type for JSONL operations.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error at line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
}

/// Result alias for JSONL operations.
pub type Result<T> = std::result::Result<T, JsonlError>;

/// One line of an export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportRecord {
    Capability(Capability),
    Epic(Epic),
    UserStory(UserStory),
    Defect(Defect),
    Test(Test),
    EpicDependency(EpicDependency),
    Execution(ExecutionRecord),
    /// Store metadata rows (ID counters, since-token).
    Meta { key: String, value: String },
}

/// Writes records as JSONL to the given writer.
pub fn write_jsonl<W: Write>(writer: &mut W, records: &[ExportRecord]) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut *writer, record)
            .map_err(|e| JsonlError::Json { line: 0, source: e })?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Returns an iterator that reads records from a JSONL reader.
///
/// Empty lines are skipped; malformed lines yield an error carrying the
/// line number, and iteration continues afterwards.
pub fn read_jsonl<R: BufRead>(reader: R) -> JsonlIter<R> {
    JsonlIter {
        reader,
        line_number: 0,
    }
}

/// Iterator over JSONL-encoded export records.
pub struct JsonlIter<R> {
    reader: R,
    line_number: usize,
}

impl<R: BufRead> Iterator for JsonlIter<R> {
    type Item = Result<ExportRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    self.line_number += 1;
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ExportRecord>(trimmed) {
                        Ok(record) => return Some(Ok(record)),
                        Err(e) => {
                            return Some(Err(JsonlError::Json {
                                line: self.line_number,
                                source: e,
                            }));
                        }
                    }
                }
                Err(e) => return Some(Err(JsonlError::Io(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epic::EpicBuilder;
    use std::io::BufReader;

    #[test]
    fn write_and_read_roundtrip() {
        let records = vec![
            ExportRecord::Epic(EpicBuilder::new("EP-00001", "First").build()),
            ExportRecord::UserStory(UserStory::new("US-00001", "Story", "US-00001")),
            ExportRecord::Meta {
                key: "next_id:epic".into(),
                value: "2".into(),
            },
        ];

        let mut buf = Vec::new();
        write_jsonl(&mut buf, &records).unwrap();

        let reader = BufReader::new(buf.as_slice());
        let back: Vec<ExportRecord> = read_jsonl(reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(back.len(), 3);
        assert_eq!(back, records);
    }

    #[test]
    fn records_are_tagged_by_kind() {
        let mut buf = Vec::new();
        write_jsonl(
            &mut buf,
            &[ExportRecord::Epic(EpicBuilder::new("EP-00001", "E").build())],
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains(r#""kind":"epic""#));
    }

    #[test]
    fn read_skips_empty_lines() {
        let data = b"{\"kind\":\"meta\",\"key\":\"a\",\"value\":\"1\"}\n\n{\"kind\":\"meta\",\"key\":\"b\",\"value\":\"2\"}\n";
        let reader = BufReader::new(data.as_slice());
        let results: Vec<ExportRecord> = read_jsonl(reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn read_reports_line_number_on_error() {
        let data = b"{\"kind\":\"meta\",\"key\":\"a\",\"value\":\"1\"}\nnot-json\n";
        let reader = BufReader::new(data.as_slice());
        let results: Vec<_> = read_jsonl(reader).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(JsonlError::Json { line, .. }) => assert_eq!(*line, 2),
            other => panic!("expected JSON error, got {:?}", other),
        }
    }
}
