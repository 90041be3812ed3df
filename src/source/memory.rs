//! In-memory record source.

use super::{RecordSource, RecordStream, SourceOptions};
use crate::error::IngestError;
use crate::record::Record;

/// Serves a fixed list of records. Every `open` starts a fresh pass.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
    options: SourceOptions,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            options: SourceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SourceOptions) -> Self {
        self.options = options;
        self
    }
}

impl RecordSource for MemorySource {
    fn check(&self, _tag: &str) -> Result<(), IngestError> {
        Ok(())
    }

    fn open(&self) -> Result<RecordStream, IngestError> {
        let records = self.records.clone();
        Ok(self.options.apply(Box::new(records.into_iter().map(Ok))))
    }

    fn describe(&self) -> String {
        format!("memory[{} records]", self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_open_is_a_fresh_pass() {
        let source = MemorySource::new(vec![
            Record::from_pairs([("id", "1")]),
            Record::from_pairs([("id", "2")]),
        ]);

        assert_eq!(source.open().unwrap().count(), 2);
        assert_eq!(source.open().unwrap().count(), 2);
    }
}
