//! CTD curated chemical to disease associations.
//!
//! One edge per row. Rows without supporting publications are discarded and
//! counted in the `discarded` counter, which is persisted on end.

use crate::curie::{split_publications, with_prefix};
use crate::error::IngestError;
use crate::hooks::HookRegistry;
use crate::model::{predicates, provenance, AssociationKind, Category, Edge, KnowledgeGraph, Node};
use crate::record::Record;
use crate::state::TransformState;

pub const NAME: &str = "ctd_chemical_disease";
pub const DESCRIPTION: &str = "CTD chemical to disease associations (per-record)";

const PRIMARY_SOURCE: &str = "infores:ctd";
const DISCARDED: &str = "discarded";

pub fn register(hooks: &mut HookRegistry) -> Result<(), IngestError> {
    hooks
        .transform_record(None, transform_record)?
        .on_end(None, on_end)?;
    Ok(())
}

/// Map one CTD row to a chemical node, a disease node and the edge between them.
pub fn transform_record(
    record: &Record,
    state: &mut TransformState,
) -> Result<Option<KnowledgeGraph>, IngestError> {
    let chemical_id = with_prefix("MESH", record.require_str("ChemicalID")?);
    let disease_id = with_prefix("MESH", record.require_str("DiseaseID")?);

    let publications = record
        .get_str("PubMedIDs")
        .map(|raw| split_publications(raw, '|', "PMID"))
        .unwrap_or_default();
    if publications.is_empty() {
        state.increment(DISCARDED);
        return Ok(None);
    }

    let mut chemical = Node::new(chemical_id.clone(), Category::ChemicalEntity);
    if let Some(name) = record.get_str("ChemicalName") {
        chemical = chemical.with_name(name);
    }
    let mut disease = Node::new(disease_id.clone(), Category::Disease);
    if let Some(name) = record.get_str("DiseaseName") {
        disease = disease.with_name(name);
    }

    let edge = Edge::new(
        chemical_id,
        predicate_for(record.get_str("DirectEvidence")),
        disease_id,
    )
    .with_category(AssociationKind::ChemicalToDiseaseOrPhenotypicFeature)
    .with_primary_source(PRIMARY_SOURCE)
    .with_provenance(provenance::KNOWLEDGE_ASSERTION, provenance::MANUAL_AGENT)
    .with_publications(publications);

    Ok(Some(
        KnowledgeGraph::new()
            .with_node(chemical)
            .with_node(disease)
            .with_edge(edge),
    ))
}

fn predicate_for(direct_evidence: Option<&str>) -> &'static str {
    match direct_evidence.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
        Some("therapeutic") => predicates::TREATS_OR_APPLIED_OR_STUDIED_TO_TREAT,
        Some("marker/mechanism") => predicates::MARKER_OR_CAUSAL_FOR,
        _ => predicates::RELATED_TO,
    }
}

fn on_end(state: &mut TransformState) -> Result<(), IngestError> {
    state.persist_counter(DISCARDED);
    if state.counter(DISCARDED) > 0 {
        tracing::info!(
            "[{}/{}] discarded {} rows without publications",
            state.source(),
            state.tag(),
            state.counter(DISCARDED)
        );
    }
    Ok(())
}
