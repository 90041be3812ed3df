//! STRING protein links as gene to gene interactions.
//!
//! A batch transform: links under the score threshold are dropped, both
//! STRING protein ids are mapped to NCBI Gene ids through the
//! `entrez_2_string` mapping table, and edges are emitted in batches of
//! `batch_size`. Each gene node is emitted once per run.

use std::collections::HashSet;
use std::iter::Peekable;
use std::sync::Arc;

use crate::curie::with_prefix;
use crate::error::IngestError;
use crate::hooks::{GraphStream, HookRegistry};
use crate::model::{predicates, provenance, AssociationKind, Category, Edge, KnowledgeGraph, Node};
use crate::record::Record;
use crate::source::RecordStream;
use crate::state::{MappingTable, TransformState};

pub const NAME: &str = "string_protein_links";
pub const DESCRIPTION: &str = "STRING protein links mapped to NCBI genes (batch)";

pub const MAPPING: &str = "entrez_2_string";

const PRIMARY_SOURCE: &str = "infores:string";
const DEFAULT_THRESHOLD: f64 = 700.0;
const DEFAULT_BATCH_SIZE: usize = 1000;

const UNMAPPED: &str = "unmapped";
const BELOW_THRESHOLD: &str = "below_threshold";
const EMITTED_GENES: &str = "emitted_genes";

pub fn register(hooks: &mut HookRegistry) -> Result<(), IngestError> {
    hooks
        .on_begin(None, on_begin)?
        .transform(None, transform)?
        .on_end(None, on_end)?;
    Ok(())
}

/// Fail early when the id mapping is not configured or empty.
fn on_begin(state: &mut TransformState) -> Result<(), IngestError> {
    let table = state.require_mapping(MAPPING)?;
    if table.is_empty() {
        return Err(IngestError::hook(format!("Mapping table '{}' is empty", MAPPING)));
    }
    state.set_metadata("mapping_entries", serde_json::json!(table.len()));
    Ok(())
}

fn on_end(state: &mut TransformState) -> Result<(), IngestError> {
    state.persist_counter(UNMAPPED);
    state.persist_counter(BELOW_THRESHOLD);
    let genes = state
        .get::<HashSet<String>>(EMITTED_GENES)
        .map(HashSet::len)
        .unwrap_or(0);
    state.set_metadata("genes", serde_json::json!(genes));
    Ok(())
}

pub fn transform<'s>(
    records: RecordStream,
    state: &'s mut TransformState,
) -> Result<GraphStream<'s>, IngestError> {
    let threshold: f64 = state.parameter_or("combined_score_threshold", DEFAULT_THRESHOLD)?;
    let batch_size: usize = state.parameter_or("batch_size", DEFAULT_BATCH_SIZE)?;
    if batch_size == 0 {
        return Err(IngestError::config("batch_size must be at least 1"));
    }
    let table = state.require_mapping(MAPPING)?;

    Ok(Box::new(LinkBatches {
        records: records.peekable(),
        state,
        table,
        threshold,
        batch_size,
        pending: None,
    }))
}

/// Lazily groups mapped links into graphs. A graph is closed once it holds
/// `batch_size` edges; the links of one record always share a graph.
struct LinkBatches<'s> {
    records: Peekable<RecordStream>,
    state: &'s mut TransformState,
    table: Arc<MappingTable>,
    threshold: f64,
    batch_size: usize,
    /// Error held back until the partial batch before it has been returned.
    pending: Option<IngestError>,
}

impl LinkBatches<'_> {
    fn add_link(&mut self, record: &Record, graph: &mut KnowledgeGraph) -> Result<(), IngestError> {
        let protein1 = record.require_str("protein1")?;
        let protein2 = record.require_str("protein2")?;
        let raw_score = record.require_str("combined_score")?;
        let score: f64 = raw_score
            .parse()
            .map_err(|_| IngestError::invalid_value("combined_score", raw_score, "not a number"))?;

        if score < self.threshold {
            self.state.increment(BELOW_THRESHOLD);
            return Ok(());
        }

        let (genes1, genes2) = match (self.genes_for(protein1), self.genes_for(protein2)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                self.state.increment(UNMAPPED);
                return Ok(());
            }
        };

        for gene1 in &genes1 {
            for gene2 in &genes2 {
                self.emit_gene(gene1, protein1, graph)?;
                self.emit_gene(gene2, protein2, graph)?;
                graph.edges.push(
                    Edge::new(gene1.clone(), predicates::INTERACTS_WITH, gene2.clone())
                        .with_category(AssociationKind::PairwiseGeneToGeneInteraction)
                        .with_primary_source(PRIMARY_SOURCE)
                        .with_provenance(provenance::PREDICTION, provenance::COMPUTATIONAL_MODEL)
                        .with_attribute("combined_score", serde_json::json!(score)),
                );
            }
        }
        Ok(())
    }

    /// NCBI Gene ids for a STRING protein id. One protein may map to several genes.
    fn genes_for(&self, protein: &str) -> Option<Vec<String>> {
        let genes: Vec<String> = self
            .table
            .get(protein)?
            .split('|')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(|g| with_prefix("NCBIGene", g))
            .collect();
        if genes.is_empty() {
            None
        } else {
            Some(genes)
        }
    }

    fn emit_gene(
        &mut self,
        gene: &str,
        protein: &str,
        graph: &mut KnowledgeGraph,
    ) -> Result<(), IngestError> {
        let emitted = self
            .state
            .get_or_insert_with::<HashSet<String>, _>(EMITTED_GENES, HashSet::new)?;
        if !emitted.insert(gene.to_string()) {
            return Ok(());
        }

        let mut node = Node::new(gene, Category::Gene).with_provided_by(PRIMARY_SOURCE);
        // STRING ids carry the taxon: "9606.ENSP00000269305"
        if let Some((taxon, _)) = protein.split_once('.') {
            if taxon.chars().all(|c| c.is_ascii_digit()) {
                node = node.with_taxon(format!("NCBITaxon:{}", taxon));
            }
        }
        graph.nodes.push(node);
        Ok(())
    }
}

impl Iterator for LinkBatches<'_> {
    type Item = Result<KnowledgeGraph, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        self.records.peek()?;

        let mut graph = KnowledgeGraph::new();
        while graph.edges.len() < self.batch_size {
            let record = match self.records.next() {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    self.pending = Some(e);
                    break;
                }
                None => break,
            };
            if let Err(e) = self.add_link(&record, &mut graph) {
                self.pending = Some(e);
                break;
            }
        }

        if graph.is_empty() {
            // Nothing mapped in this stretch: surface the held error or keep going.
            return match self.pending.take() {
                Some(e) => Some(Err(e)),
                None => self.next(),
            };
        }
        Some(Ok(graph))
    }
}
