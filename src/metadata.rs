//! Per-source metadata file written next to the node and edge outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::runner::{RunSummary, TagSummary};

/// Contents of `<source>-metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformMetadata {
    pub source: String,

    /// Version of the upstream data release, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,

    /// Version of the node/edge schema the output conforms to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,

    /// Version of this crate
    pub transform_version: String,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    pub node_count: usize,
    pub edge_count: usize,

    pub tags: Vec<TagSummary>,
}

impl TransformMetadata {
    /// Build the metadata for a finished run.
    pub fn from_summary(
        summary: &RunSummary,
        source_version: Option<String>,
        schema_version: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source: summary.source.clone(),
            source_version,
            schema_version,
            transform_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            finished_at: Utc::now(),
            node_count: summary.node_count,
            edge_count: summary.edge_count,
            tags: summary.tags.clone(),
        }
    }

    /// Write as pretty JSON to `<output_dir>/<source>-metadata.json`.
    ///
    /// # Returns
    /// The path written
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf, IngestError> {
        let path = metadata_path(output_dir, &self.source);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .map_err(|e| IngestError::io(format!("Failed to write {}", path.display()), e))?;
        tracing::info!("Wrote metadata to {}", path.display());
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IngestError::io(format!("Failed to read {}", path.display()), e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

pub fn metadata_path(output_dir: &Path, source: &str) -> PathBuf {
    output_dir.join(format!("{}-metadata.json", source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_written_and_read_back() {
        let mut transform_metadata = IndexMap::new();
        transform_metadata.insert("discarded".to_string(), serde_json::json!(3));
        let summary = RunSummary {
            source: "ctd".to_string(),
            tags: vec![TagSummary {
                tag: "default".to_string(),
                records_read: 10,
                records_failed: 0,
                graphs: 7,
                nodes: 14,
                edges: 7,
                transform_metadata,
            }],
            node_count: 12,
            edge_count: 7,
        };

        let dir = TempDir::new().unwrap();
        let metadata =
            TransformMetadata::from_summary(&summary, Some("2024-05".to_string()), None, Utc::now());
        let path = metadata.write(dir.path()).unwrap();
        assert!(path.ends_with("ctd-metadata.json"));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["source_version"], "2024-05");
        assert!(raw.get("schema_version").is_none());
        assert_eq!(raw["tags"][0]["transform_metadata"]["discarded"], 3);
        assert!(raw["started_at"].as_str().unwrap().contains('T'));

        let read = TransformMetadata::read(&path).unwrap();
        assert_eq!(read, metadata);
        assert!(read.finished_at >= read.started_at);
    }
}
