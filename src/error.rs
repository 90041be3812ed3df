//! Error types shared by record sources, hooks, the runner and writers.
//!
//! Every error that escapes a run names the source and, where it is known,
//! the tag, stage and record that caused it.

use std::fmt;
use std::path::PathBuf;

use crate::catalog::CatalogError;
use crate::hooks::Stage;
use crate::record::RecordOrigin;

/// Errors raised while reading or validating a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    MissingField {
        field: String,
    },
    FieldCount {
        file: String,
        line: usize,
        expected: usize,
        found: usize,
    },
    Malformed {
        file: String,
        line: usize,
        reason: String,
    },
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::MissingField { field } => {
                write!(f, "Required field '{}' is missing or empty", field)
            }
            RecordError::FieldCount { file, line, expected, found } => write!(
                f,
                "{}:{}: expected {} fields, found {}",
                file, line, expected, found
            ),
            RecordError::Malformed { file, line, reason } => {
                write!(f, "{}:{}: malformed record: {}", file, line, reason)
            }
            RecordError::InvalidValue { field, value, reason } => write!(
                f,
                "Invalid value '{}' in field '{}': {}",
                value, field, reason
            ),
        }
    }
}

impl std::error::Error for RecordError {}

/// Errors raised by node/edge writers.
#[derive(Debug)]
pub enum WriterError {
    AlreadyFinalized,
    Finalized,
    OutputExists(PathBuf),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterError::AlreadyFinalized => write!(f, "Writer finalized twice"),
            WriterError::Finalized => write!(f, "Write attempted after finalize"),
            WriterError::OutputExists(path) => write!(
                f,
                "Output file {} already exists (use overwrite to replace it)",
                path.display()
            ),
            WriterError::Io(e) => write!(f, "IO error: {}", e),
            WriterError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriterError::Io(e) => Some(e),
            WriterError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for WriterError {
    fn from(err: std::io::Error) -> Self {
        WriterError::Io(err)
    }
}

impl From<serde_json::Error> for WriterError {
    fn from(err: serde_json::Error) -> Self {
        WriterError::Json(err)
    }
}

/// Top-level error for configuring and running ingests.
#[derive(Debug)]
pub enum IngestError {
    /// Invalid configuration or hook registration. Raised before any record is read.
    Config(String),
    MissingInput {
        tag: String,
        path: PathBuf,
    },
    Record(RecordError),
    Io {
        context: String,
        error: std::io::Error,
    },
    Json(serde_json::Error),
    Yaml(serde_yaml::Error),
    Writer(WriterError),
    Catalog(CatalogError),
    /// Failure reported by an ingest hook with its own message.
    Hook(String),
    /// Lifecycle misuse, such as running the same runner twice.
    Lifecycle(String),
    MinimumCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A failure inside a hook, annotated with where it happened.
    Stage {
        source: String,
        tag: String,
        stage: Stage,
        /// 1-based position in the stream handed to the transform
        record: Option<usize>,
        /// Input file and line of that record, when the source knows it
        origin: Option<RecordOrigin>,
        cause: Box<IngestError>,
    },
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        IngestError::Config(msg.into())
    }

    pub fn hook(msg: impl Into<String>) -> Self {
        IngestError::Hook(msg.into())
    }

    pub fn io(context: impl Into<String>, error: std::io::Error) -> Self {
        IngestError::Io {
            context: context.into(),
            error,
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        IngestError::Record(RecordError::MissingField {
            field: field.into(),
        })
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        IngestError::Record(RecordError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        })
    }

    /// Whether the error concerns a single record, as opposed to the run as a whole.
    pub fn is_record_level(&self) -> bool {
        match self {
            IngestError::Record(_) | IngestError::Hook(_) => true,
            IngestError::Stage { cause, .. } => cause.is_record_level(),
            _ => false,
        }
    }

    /// Attach source, tag and stage context unless the error already carries it.
    pub(crate) fn at_stage(
        self,
        source: &str,
        tag: &str,
        stage: Stage,
        record: Option<usize>,
    ) -> Self {
        match self {
            IngestError::Stage { .. } => self,
            cause => IngestError::Stage {
                source: source.to_string(),
                tag: tag.to_string(),
                stage,
                record,
                origin: None,
                cause: Box::new(cause),
            },
        }
    }

    /// Attach the input location of the failing record to a stage error.
    pub(crate) fn with_origin(mut self, location: Option<&RecordOrigin>) -> Self {
        if let IngestError::Stage { origin, .. } = &mut self {
            if origin.is_none() {
                *origin = location.cloned();
            }
        }
        self
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Config(msg) => write!(f, "Configuration error: {}", msg),
            IngestError::MissingInput { tag, path } => write!(
                f,
                "Input file {} for tag '{}' does not exist",
                path.display(),
                tag
            ),
            IngestError::Record(e) => write!(f, "Record error: {}", e),
            IngestError::Io { context, error } => write!(f, "{}: {}", context, error),
            IngestError::Json(e) => write!(f, "JSON error: {}", e),
            IngestError::Yaml(e) => write!(f, "YAML error: {}", e),
            IngestError::Writer(e) => write!(f, "Writer error: {}", e),
            IngestError::Catalog(e) => write!(f, "Catalog error: {}", e),
            IngestError::Hook(msg) => write!(f, "{}", msg),
            IngestError::Lifecycle(msg) => write!(f, "Lifecycle error: {}", msg),
            IngestError::MinimumCount { kind, expected, actual } => write!(
                f,
                "Expected at least {} {}, but only {} were written",
                expected, kind, actual
            ),
            IngestError::Stage { source, tag, stage, record, origin, cause } => {
                write!(f, "[{}/{}] {} failed", source, tag, stage)?;
                if let Some(index) = record {
                    write!(f, " at record {}", index)?;
                }
                if let Some(origin) = origin {
                    write!(f, " ({})", origin)?;
                }
                write!(f, ": {}", cause)
            }
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Record(e) => Some(e),
            IngestError::Io { error, .. } => Some(error),
            IngestError::Json(e) => Some(e),
            IngestError::Yaml(e) => Some(e),
            IngestError::Writer(e) => Some(e),
            IngestError::Catalog(e) => Some(e),
            IngestError::Stage { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<RecordError> for IngestError {
    fn from(err: RecordError) -> Self {
        IngestError::Record(err)
    }
}

impl From<WriterError> for IngestError {
    fn from(err: WriterError) -> Self {
        IngestError::Writer(err)
    }
}

impl From<CatalogError> for IngestError {
    fn from(err: CatalogError) -> Self {
        IngestError::Catalog(err)
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Json(err)
    }
}

impl From<serde_yaml::Error> for IngestError {
    fn from(err: serde_yaml::Error) -> Self {
        IngestError::Yaml(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_names_source_tag_and_record() {
        let err = IngestError::missing_field("DiseaseID").at_stage(
            "ctd",
            "default",
            Stage::TransformRecord,
            Some(12),
        );

        let msg = err.to_string();
        assert!(msg.contains("[ctd/default]"));
        assert!(msg.contains("transform_record"));
        assert!(msg.contains("record 12"));
        assert!(msg.contains("DiseaseID"));
        assert!(err.is_record_level());
    }

    #[test]
    fn test_stage_error_names_input_line() {
        let record = crate::record::Record::new().with_origin("data/phenotype.hpoa", 9);
        let err = IngestError::invalid_value("frequency", "sometimes", "not a frequency")
            .at_stage("hpoa", "default", Stage::TransformRecord, Some(3))
            .with_origin(record.origin());

        let msg = err.to_string();
        assert!(msg.contains("record 3 (data/phenotype.hpoa:9)"), "{}", msg);
    }

    #[test]
    fn test_stage_context_not_nested_twice() {
        let err = IngestError::hook("boom")
            .at_stage("a", "t1", Stage::Begin, None)
            .at_stage("b", "t2", Stage::End, None);

        match err {
            IngestError::Stage { source, stage, .. } => {
                assert_eq!(source, "a");
                assert_eq!(stage, Stage::Begin);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_config_error_is_not_record_level() {
        assert!(!IngestError::config("bad").is_record_level());
        assert!(!IngestError::Writer(WriterError::AlreadyFinalized).is_record_level());
    }
}
