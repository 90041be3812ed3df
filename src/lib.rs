//! # kg-ingest: Record-to-Knowledge-Graph Transform Runner
//!
//! kg-ingest reads records from biomedical source files and turns them into
//! Biolink-style knowledge graph nodes and edges written as KGX JSON Lines.
//!
//! ## Features
//!
//! - **Record sources**: TSV/CSV (optionally gzip-compressed) and JSON Lines, with column filters and row limits
//! - **Hook registry**: per-ingest `on_begin`, `prepare_data`, `transform_record`/`transform` and `on_end` hooks, scoped by tag
//! - **Runner**: drives each tag through its lifecycle with an abort or skip error policy
//! - **Writers**: in-memory and KGX JSON Lines writers that finalize exactly once
//! - **YAML configuration**: inputs, parameters and mapping tables per ingest
//!
//! ## Example: a per-record ingest
//!
//! ```
//! use kg_ingest::{
//!     HookRegistry, KnowledgeGraph, MemorySource, MemoryWriter, Node, Category, Record,
//!     Runner, TagInput, TransformState, IngestError,
//! };
//! use indexmap::IndexMap;
//!
//! fn to_gene(record: &Record, _state: &mut TransformState) -> Result<Option<KnowledgeGraph>, IngestError> {
//!     let id = kg_ingest::curie::with_prefix("NCBIGene", record.require_str("gene")?);
//!     Ok(Some(KnowledgeGraph::new().with_node(Node::new(id, Category::Gene))))
//! }
//!
//! let mut hooks = HookRegistry::new();
//! hooks.transform_record(None, to_gene).unwrap();
//!
//! let mut inputs = IndexMap::new();
//! inputs.insert(
//!     "default".to_string(),
//!     TagInput::new(MemorySource::new(vec![Record::from_pairs([("gene", "7157")])])),
//! );
//!
//! let mut runner = Runner::new("genes", &hooks, inputs).unwrap();
//! let mut writer = MemoryWriter::new();
//! let summary = runner.run(&mut writer).unwrap();
//!
//! assert_eq!(summary.node_count, 1);
//! assert_eq!(writer.nodes[0].id, "NCBIGene:7157");
//! ```

pub mod error;
pub mod record;
pub mod model;
pub mod curie;

// Reading input files into record streams
pub mod source;

// Transform lifecycle
pub mod state;
pub mod hooks;
pub mod runner;

// Output
pub mod serialization;
pub mod writer;
pub mod metadata;

// Configuration and plugin lookup
pub mod config;
pub mod catalog;
pub mod pipeline;

// Built-in ingests
pub mod ingests;

// Re-export key types
pub use error::{IngestError, RecordError, WriterError};
pub use record::{FieldValue, Record, RecordOrigin, RecordSchema};
pub use model::{AssociationKind, Category, Edge, GraphObject, KnowledgeGraph, Node};
pub use source::{
    ColumnFilter, DelimitedOptions, DelimitedSource, FilterOp, JsonLinesSource, MemorySource,
    RecordSource, RecordStream, SourceOptions,
};
pub use state::{MappingTable, TransformState};
pub use hooks::{GraphStream, Hook, HookPlan, HookRegistry, HookSet, Stage};
pub use runner::{ErrorPolicy, Phase, RunSummary, Runner, TagInput, TagSummary};
pub use writer::{JsonlWriter, MemoryWriter, Writer};
pub use metadata::TransformMetadata;
pub use config::{DuplicateKeys, IngestConfig, InputFormat, MappingSpec, TagConfig};
pub use catalog::{CatalogError, IngestCatalog};
pub use pipeline::{run_ingest, validate_ingest, IngestOutcome, PipelineOptions};
