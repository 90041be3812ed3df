//! Passthrough for KGX JSON Lines files.
//!
//! Records with `subject`, `predicate` and `object` become edges; records
//! with an `id` become nodes, their category resolved through the category
//! table with `NamedThing` as fallback.

use crate::curie::normalize;
use crate::error::IngestError;
use crate::hooks::HookRegistry;
use crate::model::{AssociationKind, Category, Edge, KnowledgeGraph, Node};
use crate::record::{FieldValue, Record};
use crate::state::TransformState;

pub const NAME: &str = "kgx_passthrough";
pub const DESCRIPTION: &str = "KGX JSON Lines nodes and edges (per-record)";

const UNKNOWN_CATEGORY: &str = "unknown_category";

/// Fields mapped onto dedicated node or edge fields; everything else on an
/// edge is carried as an attribute.
const EDGE_FIELDS: &[&str] = &[
    "id",
    "category",
    "subject",
    "predicate",
    "object",
    "negated",
    "publications",
    "has_evidence",
    "primary_knowledge_source",
    "aggregator_knowledge_source",
    "knowledge_level",
    "agent_type",
    "frequency_qualifier",
    "onset_qualifier",
    "sex_qualifier",
    "has_count",
    "has_total",
    "has_percentage",
];

pub fn register(hooks: &mut HookRegistry) -> Result<(), IngestError> {
    hooks
        .transform_record(None, transform_record)?
        .on_end(None, |state: &mut TransformState| -> Result<(), IngestError> {
            state.persist_counter(UNKNOWN_CATEGORY);
            Ok(())
        })?;
    Ok(())
}

pub fn transform_record(
    record: &Record,
    state: &mut TransformState,
) -> Result<Option<KnowledgeGraph>, IngestError> {
    if record.contains("subject") || record.contains("object") {
        return edge_from(record).map(|edge| Some(KnowledgeGraph::new().with_edge(edge)));
    }
    if record.contains("id") {
        return node_from(record, state).map(|node| Some(KnowledgeGraph::new().with_node(node)));
    }
    Err(IngestError::invalid_value(
        "id",
        "",
        "record is neither a node (id) nor an edge (subject/predicate/object)",
    ))
}

fn node_from(record: &Record, state: &mut TransformState) -> Result<Node, IngestError> {
    let id = normalize(record.require_str("id")?);
    let categories = record.get_list("category", '|');

    let mut node = match categories.first() {
        Some(tag) => {
            if Category::lookup(tag).is_none() {
                state.increment(UNKNOWN_CATEGORY);
            }
            Node::from_category_tag(id, tag)
        }
        None => {
            state.increment(UNKNOWN_CATEGORY);
            Node::new(id, Category::NamedThing)
        }
    };
    for tag in categories.iter().skip(1) {
        if let Some(category) = Category::lookup(tag) {
            if !node.category.contains(&category) {
                node.category.push(category);
            }
        }
    }

    if let Some(name) = record.get_str("name") {
        node = node.with_name(name);
    }
    if let Some(description) = record.get_str("description") {
        node = node.with_description(description);
    }
    if let Some(taxon) = record.get_str("in_taxon") {
        node = node.with_taxon(taxon);
    }
    node.xref = record.get_list("xref", '|');
    node.synonym = record.get_list("synonym", '|');
    node.provided_by = record.get_list("provided_by", '|');
    Ok(node)
}

fn edge_from(record: &Record) -> Result<Edge, IngestError> {
    let subject = normalize(record.require_str("subject")?);
    let predicate = record.require_str("predicate")?;
    let object = normalize(record.require_str("object")?);

    let mut edge = Edge::new(subject, predicate, object);
    if let Some(source) = record.get_str("primary_knowledge_source") {
        edge = edge.with_primary_source(source);
    }
    if let Some(id) = record.get_str("id") {
        edge.id = id.to_string();
    }
    if let Some(category) = record.get_list("category", '|').first() {
        edge.category = AssociationKind::from_tag(category);
    }

    edge.negated = match record.get("negated") {
        Some(FieldValue::Bool(b)) => *b,
        Some(FieldValue::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    edge.publications = record.get_list("publications", '|');
    edge.has_evidence = record.get_list("has_evidence", '|');
    edge.aggregator_knowledge_source = record.get_list("aggregator_knowledge_source", '|');
    edge.knowledge_level = record.get_str("knowledge_level").map(str::to_string);
    edge.agent_type = record.get_str("agent_type").map(str::to_string);
    edge.frequency_qualifier = record.get_str("frequency_qualifier").map(str::to_string);
    edge.onset_qualifier = record.get_str("onset_qualifier").map(str::to_string);
    edge.sex_qualifier = record.get_str("sex_qualifier").map(str::to_string);
    edge.has_count = count_field(record, "has_count")?;
    edge.has_total = count_field(record, "has_total")?;
    edge.has_percentage = match record.get("has_percentage") {
        Some(value) if !value.is_empty() => Some(value.as_f64().ok_or_else(|| {
            IngestError::invalid_value("has_percentage", value.to_string(), "not a number")
        })?),
        _ => None,
    };

    for (field, value) in record.iter() {
        if !EDGE_FIELDS.contains(&field.as_str()) && !value.is_empty() {
            edge.attributes
                .insert(field.clone(), serde_json::to_value(value)?);
        }
    }
    Ok(edge)
}

fn count_field(record: &Record, field: &str) -> Result<Option<u64>, IngestError> {
    match record.get(field) {
        None => Ok(None),
        Some(value) if value.is_empty() => Ok(None),
        Some(FieldValue::Int(n)) if *n >= 0 => Ok(Some(*n as u64)),
        Some(FieldValue::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IngestError::invalid_value(field, s.as_str(), "not a count")),
        Some(other) => Err(IngestError::invalid_value(
            field,
            serde_json::to_string(other)?,
            "not a count",
        )),
    }
}
