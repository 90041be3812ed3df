//! TSV/CSV record source.
//!
//! Reads one or more files in order, optionally gzip-compressed. Each file
//! carries its own header unless explicit columns are configured.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{check_files_exist, open_lines, RecordSource, RecordStream, SourceOptions};
use crate::error::{IngestError, RecordError};
use crate::record::{FieldValue, Record};

/// Line layout of a delimited file.
#[derive(Debug, Clone, PartialEq)]
pub struct DelimitedOptions {
    pub delimiter: char,
    /// Quote character for CSV-style quoted fields. `None` splits on every delimiter.
    pub quote: Option<char>,
    /// Lines to discard before looking for the header.
    pub skip_lines: usize,
    /// Whether the first line after `skip_lines` is a header.
    pub header: bool,
    /// Prefix stripped from the header line, e.g. `"# "`.
    pub header_prefix: Option<String>,
    /// Column names when the file has no header.
    pub columns: Vec<String>,
    /// Lines starting with this marker are skipped.
    pub comment_char: Option<String>,
}

impl DelimitedOptions {
    pub fn tsv() -> Self {
        Self {
            delimiter: '\t',
            quote: None,
            skip_lines: 0,
            header: true,
            header_prefix: None,
            columns: Vec::new(),
            comment_char: None,
        }
    }

    pub fn csv() -> Self {
        Self {
            delimiter: ',',
            quote: Some('"'),
            ..Self::tsv()
        }
    }
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self::tsv()
    }
}

/// Record source over delimited text files.
#[derive(Debug, Clone)]
pub struct DelimitedSource {
    paths: Vec<PathBuf>,
    format: Arc<DelimitedOptions>,
    options: SourceOptions,
}

impl DelimitedSource {
    pub fn new(paths: Vec<PathBuf>, format: DelimitedOptions, options: SourceOptions) -> Self {
        Self {
            paths,
            format: Arc::new(format),
            options,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl RecordSource for DelimitedSource {
    fn check(&self, tag: &str) -> Result<(), IngestError> {
        check_files_exist(tag, &self.paths)?;

        if !self.format.header && self.format.columns.is_empty() {
            return Err(IngestError::config(format!(
                "Tag '{}' has no header and no columns declared",
                tag
            )));
        }

        for path in &self.paths {
            let rows = DelimitedRows::open(path, Arc::clone(&self.format))?;
            let missing = self.options.schema.missing_columns(&rows.header);
            if !missing.is_empty() {
                return Err(IngestError::config(format!(
                    "{} is missing required columns: {}",
                    path.display(),
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn open(&self) -> Result<RecordStream, IngestError> {
        let format = Arc::clone(&self.format);
        let rows = self.paths.clone().into_iter().flat_map(move |path| -> RecordStream {
            match DelimitedRows::open(&path, Arc::clone(&format)) {
                Ok(rows) => {
                    tracing::debug!("Reading {} ({} columns)", path.display(), rows.header.len());
                    Box::new(rows)
                }
                Err(e) => Box::new(std::iter::once(Err(e))),
            }
        });
        Ok(self.options.apply(Box::new(rows)))
    }

    fn describe(&self) -> String {
        let names: Vec<String> = self.paths.iter().map(|p| p.display().to_string()).collect();
        format!("delimited[{}]", names.join(", "))
    }
}

/// Row iterator over a single file.
struct DelimitedRows {
    file: String,
    lines: std::io::Lines<Box<dyn BufRead>>,
    line_no: usize,
    header: Vec<String>,
    format: Arc<DelimitedOptions>,
    done: bool,
}

impl DelimitedRows {
    fn open(path: &Path, format: Arc<DelimitedOptions>) -> Result<Self, IngestError> {
        let file = path.display().to_string();
        let mut lines = open_lines(path)?.lines();
        let mut line_no = 0;

        for _ in 0..format.skip_lines {
            match lines.next() {
                Some(line) => {
                    line.map_err(|e| IngestError::io(format!("Failed to read {}", file), e))?;
                    line_no += 1;
                }
                None => break,
            }
        }

        let header = if format.header {
            let mut header: Option<Vec<String>> = None;
            for line in lines.by_ref() {
                let line = line.map_err(|e| IngestError::io(format!("Failed to read {}", file), e))?;
                line_no += 1;
                let line = line.trim_end_matches(&['\r', '\n'][..]);
                if line.trim().is_empty() {
                    continue;
                }
                let line = match &format.header_prefix {
                    Some(prefix) => line.strip_prefix(prefix.as_str()).unwrap_or(line),
                    None => line,
                };
                header = Some(
                    split_fields(line, format.delimiter, format.quote)
                        .into_iter()
                        .map(|h| h.trim().to_string())
                        .collect(),
                );
                break;
            }
            header.unwrap_or_default()
        } else {
            format.columns.clone()
        };

        Ok(Self {
            file,
            lines,
            line_no,
            header,
            format,
            done: false,
        })
    }

    fn is_comment(&self, line: &str) -> bool {
        match &self.format.comment_char {
            Some(marker) if !marker.is_empty() => line.starts_with(marker.as_str()),
            _ => false,
        }
    }
}

impl Iterator for DelimitedRows {
    type Item = Result<Record, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Err(IngestError::io(format!("Failed to read {}", self.file), e)));
                }
            };
            self.line_no += 1;

            let line = line.trim_end_matches(&['\r', '\n'][..]);
            if line.trim().is_empty() || self.is_comment(line) {
                continue;
            }

            let fields = split_fields(line, self.format.delimiter, self.format.quote);
            if fields.len() != self.header.len() {
                return Some(Err(RecordError::FieldCount {
                    file: self.file.clone(),
                    line: self.line_no,
                    expected: self.header.len(),
                    found: fields.len(),
                }
                .into()));
            }

            let record = Record::from_pairs(
                self.header
                    .iter()
                    .cloned()
                    .zip(fields.into_iter().map(FieldValue::String)),
            )
            .with_origin(self.file.as_str(), self.line_no);
            return Some(Ok(record));
        }
    }
}

/// Split a line on `delimiter`, honouring `quote` if given.
///
/// Inside quotes, a doubled quote is a literal quote character.
pub fn split_fields(line: &str, delimiter: char, quote: Option<char>) -> Vec<String> {
    let quote = match quote {
        Some(q) => q,
        None => return line.split(delimiter).map(str::to_string).collect(),
    };

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == quote {
                if chars.peek() == Some(&quote) {
                    current.push(quote);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == quote && current.is_empty() {
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordSchema;
    use crate::source::{ColumnFilter, FilterOp};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_split_fields_plain_and_quoted() {
        assert_eq!(split_fields("a\tb\t", '\t', None), vec!["a", "b", ""]);
        assert_eq!(
            split_fields(r#"1,"Smith, John","say ""hi""""#, ',', Some('"')),
            vec!["1", "Smith, John", r#"say "hi""#]
        );
    }

    #[test]
    fn test_reads_tsv_with_header_prefix_and_comments() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "ctd.tsv",
            "# CTD export\n# ChemicalName\tChemicalID\n#\naspirin\tD000068\n\nibuprofen\tD007052\n",
        );

        let format = DelimitedOptions {
            skip_lines: 1,
            header_prefix: Some("# ".to_string()),
            comment_char: Some("#".to_string()),
            ..DelimitedOptions::tsv()
        };
        let source = DelimitedSource::new(vec![path], format, SourceOptions::default());
        source.check("default").unwrap();

        let records: Vec<Record> = source.open().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_str("ChemicalName"), Some("aspirin"));
        assert_eq!(records[1].get_str("ChemicalID"), Some("D007052"));
        // Comment and blank lines still count towards the line number.
        assert_eq!(records[0].origin().unwrap().line, 4);
        assert_eq!(records[1].origin().unwrap().line, 6);
    }

    #[test]
    fn test_field_count_mismatch_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bad.tsv", "a\tb\n1\t2\n3\n");

        let source = DelimitedSource::new(vec![path], DelimitedOptions::tsv(), SourceOptions::default());
        let items: Vec<_> = source.open().unwrap().collect();

        assert!(items[0].is_ok());
        match &items[1] {
            Err(IngestError::Record(RecordError::FieldCount { line, expected, found, .. })) => {
                assert_eq!((*line, *expected, *found), (3, 2, 1));
            }
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn test_reads_gzip_without_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.txt.gz");
        let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"9606.ENSP1 9606.ENSP2 800\n").unwrap();
        encoder.finish().unwrap();

        let format = DelimitedOptions {
            delimiter: ' ',
            header: false,
            columns: vec!["protein1".into(), "protein2".into(), "combined_score".into()],
            ..DelimitedOptions::tsv()
        };
        let source = DelimitedSource::new(vec![path], format, SourceOptions::default());
        source.check("links").unwrap();

        let records: Vec<Record> = source.open().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get_f64("combined_score"), Some(800.0));
    }

    #[test]
    fn test_multiple_files_filters_and_limit() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.csv", "id,keep\n1,y\n2,n\n");
        let b = write_file(&dir, "b.csv", "id,keep\n3,y\n4,y\n");

        let options = SourceOptions {
            filters: vec![ColumnFilter {
                column: "keep".into(),
                op: FilterOp::Eq,
                value: serde_json::json!("y"),
            }],
            row_limit: Some(2),
            ..SourceOptions::default()
        };
        let source = DelimitedSource::new(vec![a, b], DelimitedOptions::csv(), options);

        let ids: Vec<String> = source
            .open()
            .unwrap()
            .map(|r| r.unwrap().get_str("id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_check_reports_missing_file_and_columns() {
        let dir = TempDir::new().unwrap();
        let present = write_file(&dir, "a.tsv", "x\ty\n1\t2\n");
        let missing = dir.path().join("nope.tsv");

        let source = DelimitedSource::new(vec![missing], DelimitedOptions::tsv(), SourceOptions::default());
        assert!(matches!(source.check("t"), Err(IngestError::MissingInput { .. })));

        let options = SourceOptions {
            schema: RecordSchema::new(["x", "z"]),
            ..SourceOptions::default()
        };
        let source = DelimitedSource::new(vec![present], DelimitedOptions::tsv(), options);
        let err = source.check("t").unwrap_err();
        assert!(err.to_string().contains("z"));
    }
}
