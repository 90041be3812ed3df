//! Node and edge writers.
//!
//! A writer accepts any number of writes, then exactly one `finalize`.
//! Writing after `finalize`, or finalizing twice, is an error.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::WriterError;
use crate::model::{Edge, KnowledgeGraph, Node};
use crate::serialization::NdjsonWriter;

/// Sink for emitted nodes and edges.
pub trait Writer {
    fn write_nodes(&mut self, nodes: &[Node]) -> Result<(), WriterError>;

    fn write_edges(&mut self, edges: &[Edge]) -> Result<(), WriterError>;

    /// Write the nodes, then the edges, of one transform result.
    fn write(&mut self, graph: &KnowledgeGraph) -> Result<(), WriterError> {
        if !graph.nodes.is_empty() {
            self.write_nodes(&graph.nodes)?;
        }
        if !graph.edges.is_empty() {
            self.write_edges(&graph.edges)?;
        }
        Ok(())
    }

    /// Flush and close. Must be called exactly once, after the last write.
    fn finalize(&mut self) -> Result<(), WriterError>;

    /// Nodes accepted so far.
    fn node_count(&self) -> usize;

    /// Edges accepted so far.
    fn edge_count(&self) -> usize;
}

/// Collects everything in memory. Used by tests and by callers that post-process output.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    calls: usize,
    finalized: bool,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write_nodes`/`write_edges` calls received.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn ensure_open(&self) -> Result<(), WriterError> {
        if self.finalized {
            Err(WriterError::Finalized)
        } else {
            Ok(())
        }
    }
}

impl Writer for MemoryWriter {
    fn write_nodes(&mut self, nodes: &[Node]) -> Result<(), WriterError> {
        self.ensure_open()?;
        self.calls += 1;
        self.nodes.extend_from_slice(nodes);
        Ok(())
    }

    fn write_edges(&mut self, edges: &[Edge]) -> Result<(), WriterError> {
        self.ensure_open()?;
        self.calls += 1;
        self.edges.extend_from_slice(edges);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), WriterError> {
        if self.finalized {
            return Err(WriterError::AlreadyFinalized);
        }
        self.finalized = true;
        Ok(())
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Paths of the node and edge files for a source.
pub fn output_paths(output_dir: &Path, source: &str) -> (PathBuf, PathBuf) {
    (
        output_dir.join(format!("{}-nodes.jsonl", source)),
        output_dir.join(format!("{}-edges.jsonl", source)),
    )
}

/// Writes nodes and edges as two NDJSON streams.
///
/// Nodes are de-duplicated by id unless disabled; the first occurrence wins.
pub struct JsonlWriter<W: Write> {
    nodes: NdjsonWriter<W>,
    edges: NdjsonWriter<W>,
    dedupe_nodes: bool,
    seen_nodes: HashSet<String>,
    duplicate_nodes: usize,
    finalized: bool,
}

impl JsonlWriter<BufWriter<File>> {
    /// Create `<source>-nodes.jsonl` and `<source>-edges.jsonl` in `output_dir`.
    ///
    /// # Errors
    /// Fails with [`WriterError::OutputExists`] if either file exists and
    /// `overwrite` is false.
    pub fn create(output_dir: &Path, source: &str, overwrite: bool) -> Result<Self, WriterError> {
        std::fs::create_dir_all(output_dir)?;
        let (nodes_path, edges_path) = output_paths(output_dir, source);

        if !overwrite {
            for path in [&nodes_path, &edges_path] {
                if path.exists() {
                    return Err(WriterError::OutputExists(path.clone()));
                }
            }
        }

        tracing::info!(
            "Writing {} and {}",
            nodes_path.display(),
            edges_path.display()
        );
        Ok(Self::new(
            BufWriter::new(File::create(&nodes_path)?),
            BufWriter::new(File::create(&edges_path)?),
        ))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(nodes: W, edges: W) -> Self {
        Self {
            nodes: NdjsonWriter::new(nodes),
            edges: NdjsonWriter::new(edges),
            dedupe_nodes: true,
            seen_nodes: HashSet::new(),
            duplicate_nodes: 0,
            finalized: false,
        }
    }

    pub fn with_node_dedup(mut self, enabled: bool) -> Self {
        self.dedupe_nodes = enabled;
        self
    }

    /// Nodes dropped because their id was already written.
    pub fn duplicate_nodes(&self) -> usize {
        self.duplicate_nodes
    }

    fn ensure_open(&self) -> Result<(), WriterError> {
        if self.finalized {
            Err(WriterError::Finalized)
        } else {
            Ok(())
        }
    }
}

impl<W: Write> Writer for JsonlWriter<W> {
    fn write_nodes(&mut self, nodes: &[Node]) -> Result<(), WriterError> {
        self.ensure_open()?;
        for node in nodes {
            if self.dedupe_nodes && !self.seen_nodes.insert(node.id.clone()) {
                self.duplicate_nodes += 1;
                continue;
            }
            self.nodes.write(node)?;
        }
        Ok(())
    }

    fn write_edges(&mut self, edges: &[Edge]) -> Result<(), WriterError> {
        self.ensure_open()?;
        self.edges.write_all(edges)
    }

    fn finalize(&mut self) -> Result<(), WriterError> {
        if self.finalized {
            return Err(WriterError::AlreadyFinalized);
        }
        self.finalized = true;
        self.nodes.flush()?;
        self.edges.flush()?;
        tracing::debug!(
            "Finalized writer: {} nodes ({} duplicates dropped), {} edges",
            self.nodes.lines(),
            self.duplicate_nodes,
            self.edges.lines()
        );
        Ok(())
    }

    fn node_count(&self) -> usize {
        self.nodes.lines()
    }

    fn edge_count(&self) -> usize {
        self.edges.lines()
    }
}

impl<W: Write> Drop for JsonlWriter<W> {
    fn drop(&mut self) {
        if !self.finalized {
            tracing::warn!("JSONL writer dropped without finalize; flushing partial output");
            let _ = self.nodes.flush();
            let _ = self.edges.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{predicates, Category};
    use crate::serialization::read_ndjson;
    use tempfile::TempDir;

    fn sample_graph() -> KnowledgeGraph {
        KnowledgeGraph::new()
            .with_node(Node::new("MESH:D000068", Category::ChemicalEntity).with_name("aspirin"))
            .with_node(Node::new("MESH:D003967", Category::Disease))
            .with_edge(
                Edge::new("MESH:D000068", predicates::RELATED_TO, "MESH:D003967")
                    .with_publications(vec!["PMID:111".to_string()]),
            )
    }

    #[test]
    fn test_memory_writer_finalize_twice_fails() {
        let mut writer = MemoryWriter::new();
        writer.write(&sample_graph()).unwrap();

        writer.finalize().unwrap();
        assert!(matches!(writer.finalize(), Err(WriterError::AlreadyFinalized)));
        assert!(matches!(writer.write(&sample_graph()), Err(WriterError::Finalized)));
        assert_eq!(writer.node_count(), 2);
    }

    #[test]
    fn test_empty_graph_is_not_a_call() {
        let mut writer = MemoryWriter::new();
        writer.write(&KnowledgeGraph::new()).unwrap();
        assert_eq!(writer.calls(), 0);
    }

    #[test]
    fn test_jsonl_writer_dedupes_nodes() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        {
            let mut writer = JsonlWriter::new(&mut nodes, &mut edges);
            writer.write(&sample_graph()).unwrap();
            writer.write(&sample_graph()).unwrap();
            assert_eq!(writer.duplicate_nodes(), 2);
            assert_eq!(writer.node_count(), 2);
            assert_eq!(writer.edge_count(), 2);
            writer.finalize().unwrap();
            assert!(matches!(writer.finalize(), Err(WriterError::AlreadyFinalized)));
        }

        let parsed: Vec<Node> = read_ndjson(nodes.as_slice()).unwrap();
        assert_eq!(parsed, sample_graph().nodes);
        assert_eq!(String::from_utf8(edges).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_jsonl_writer_dedup_can_be_disabled() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        {
            let mut writer = JsonlWriter::new(&mut nodes, &mut edges).with_node_dedup(false);
            writer.write(&sample_graph()).unwrap();
            writer.write(&sample_graph()).unwrap();
            writer.finalize().unwrap();
        }
        assert_eq!(String::from_utf8(nodes).unwrap().lines().count(), 4);
    }

    #[test]
    fn test_create_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = JsonlWriter::create(dir.path(), "ctd", false).unwrap();
            writer.write(&sample_graph()).unwrap();
            writer.finalize().unwrap();
        }

        let (nodes_path, edges_path) = output_paths(dir.path(), "ctd");
        assert!(nodes_path.exists());
        assert!(edges_path.exists());

        assert!(matches!(
            JsonlWriter::create(dir.path(), "ctd", false),
            Err(WriterError::OutputExists(_))
        ));
        assert!(JsonlWriter::create(dir.path(), "ctd", true).is_ok());
    }
}
