//! Record sources: lazy record streams over a source's input files.
//!
//! Streams are single-pass. Opening a source again starts a fresh pass, but
//! nothing in the runner relies on that.

pub mod delimited;
pub mod filter;
pub mod jsonl;
pub mod memory;

pub use delimited::{DelimitedOptions, DelimitedSource};
pub use filter::{ColumnFilter, FilterOp};
pub use jsonl::JsonLinesSource;
pub use memory::MemorySource;

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::record::{Record, RecordSchema};

/// Lazy, finite, single-pass sequence of records.
pub type RecordStream = Box<dyn Iterator<Item = Result<Record, IngestError>>>;

/// Produces the record stream for one tag.
pub trait RecordSource {
    /// Verify inputs before any hook runs (files exist, headers carry required columns).
    fn check(&self, tag: &str) -> Result<(), IngestError>;

    /// Open a new pass over the records.
    fn open(&self) -> Result<RecordStream, IngestError>;

    /// Short description for log messages.
    fn describe(&self) -> String;
}

/// Options every source applies to its records, in order: schema check, filters, row limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceOptions {
    pub schema: RecordSchema,
    pub filters: Vec<ColumnFilter>,
    /// Maximum number of records to emit, counted after filtering.
    pub row_limit: Option<usize>,
}

impl SourceOptions {
    /// Wrap a raw stream with the schema check, filters and row limit.
    pub fn apply(&self, stream: RecordStream) -> RecordStream {
        let schema = self.schema.clone();
        let filters = self.filters.clone();

        let mut stream: RecordStream = Box::new(stream.filter_map(move |item| match item {
            Ok(record) => {
                if let Err(e) = schema.validate(&record) {
                    return Some(Err(e.into()));
                }
                if filters.iter().all(|f| f.matches(&record)) {
                    Some(Ok(record))
                } else {
                    None
                }
            }
            Err(e) => Some(Err(e)),
        }));

        if let Some(limit) = self.row_limit {
            let mut remaining = limit;
            stream = Box::new(stream.take_while(move |item| {
                if remaining == 0 {
                    return false;
                }
                if item.is_ok() {
                    remaining -= 1;
                }
                true
            }));
        }

        stream
    }
}

/// Open a file for line reading, decompressing `.gz` files.
pub(crate) fn open_lines(path: &Path) -> Result<Box<dyn BufRead>, IngestError> {
    let file = File::open(path)
        .map_err(|e| IngestError::io(format!("Failed to open {}", path.display()), e))?;

    let is_gzip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub(crate) fn check_files_exist(tag: &str, paths: &[PathBuf]) -> Result<(), IngestError> {
    if paths.is_empty() {
        return Err(IngestError::config(format!("No input files declared for tag '{}'", tag)));
    }
    for path in paths {
        if !path.is_file() {
            return Err(IngestError::MissingInput {
                tag: tag.to_string(),
                path: path.clone(),
            });
        }
    }
    Ok(())
}
