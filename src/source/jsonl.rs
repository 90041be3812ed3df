//! JSON Lines record source: one JSON object per line.

use indexmap::IndexMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use super::{check_files_exist, open_lines, RecordSource, RecordStream, SourceOptions};
use crate::error::{IngestError, RecordError};
use crate::record::Record;

#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    paths: Vec<PathBuf>,
    options: SourceOptions,
}

impl JsonLinesSource {
    pub fn new(paths: Vec<PathBuf>, options: SourceOptions) -> Self {
        Self { paths, options }
    }
}

impl RecordSource for JsonLinesSource {
    fn check(&self, tag: &str) -> Result<(), IngestError> {
        check_files_exist(tag, &self.paths)
    }

    fn open(&self) -> Result<RecordStream, IngestError> {
        let rows = self.paths.clone().into_iter().flat_map(|path| -> RecordStream {
            match read_lines(&path) {
                Ok(rows) => rows,
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        });
        Ok(self.options.apply(Box::new(rows)))
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.paths.iter().map(|p| p.display().to_string()).collect();
        format!("jsonl[{}]", names.join(", "))
    }
}

fn read_lines(path: &Path) -> Result<RecordStream, IngestError> {
    let file = path.display().to_string();
    let lines = open_lines(path)?.lines();

    let rows = lines
        .enumerate()
        .filter_map(move |(index, line)| {
            let line_no = index + 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(IngestError::io(format!("Failed to read {}", file), e)))
                }
            };
            if line.trim().is_empty() {
                return None;
            }
            let parsed: Result<Record, IngestError> =
                serde_json::from_str::<IndexMap<String, serde_json::Value>>(&line)
                .map(|object| Record::from_json_object(object).with_origin(file.as_str(), line_no))
                .map_err(|e| {
                    RecordError::Malformed {
                        file: file.clone(),
                        line: line_no,
                        reason: e.to_string(),
                    }
                    .into()
                });
            Some(parsed)
        })
        // A read error means the rest of the file is unreadable.
        .scan(false, |failed, item| {
            if *failed {
                return None;
            }
            if matches!(item, Err(IngestError::Io { .. })) {
                *failed = true;
            }
            Some(item)
        });

    Ok(Box::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldValue, RecordSchema};
    use tempfile::TempDir;

    #[test]
    fn test_reads_objects_and_reports_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.jsonl");
        std::fs::write(
            &path,
            "{\"id\":\"HGNC:1\",\"category\":[\"biolink:Gene\"]}\n\nnot json\n{\"id\":\"HGNC:2\"}\n",
        )
        .unwrap();

        let source = JsonLinesSource::new(vec![path], SourceOptions::default());
        source.check("nodes").unwrap();
        let items: Vec<_> = source.open().unwrap().collect();

        assert_eq!(items.len(), 3);
        let first = items[0].as_ref().unwrap();
        assert_eq!(
            first.get("category"),
            Some(&FieldValue::List(vec![FieldValue::from("biolink:Gene")]))
        );
        assert!(matches!(
            &items[1],
            Err(IngestError::Record(RecordError::Malformed { line: 3, .. }))
        ));
        assert_eq!(items[2].as_ref().unwrap().get_str("id"), Some("HGNC:2"));
        assert_eq!(items[2].as_ref().unwrap().origin().unwrap().line, 4);
    }

    #[test]
    fn test_required_fields_checked_per_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("edges.jsonl");
        std::fs::write(&path, "{\"subject\":\"A:1\",\"object\":\"B:1\"}\n").unwrap();

        let options = SourceOptions {
            schema: RecordSchema::new(["subject", "predicate"]),
            ..SourceOptions::default()
        };
        let source = JsonLinesSource::new(vec![path], options);
        let items: Vec<_> = source.open().unwrap().collect();

        assert!(matches!(
            &items[0],
            Err(IngestError::Record(RecordError::MissingField { field })) if field == "predicate"
        ));
    }
}
