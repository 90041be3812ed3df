//! Knowledge-graph node and edge types.
//!
//! Nodes and edges serialize to the flat KGX-style JSON objects written to
//! `<source>-nodes.jsonl` and `<source>-edges.jsonl`. Unset optional fields are
//! omitted.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Biolink predicates used by the bundled ingests.
pub mod predicates {
    pub const RELATED_TO: &str = "biolink:related_to";
    pub const TREATS_OR_APPLIED_OR_STUDIED_TO_TREAT: &str =
        "biolink:treats_or_applied_or_studied_to_treat";
    pub const MARKER_OR_CAUSAL_FOR: &str = "biolink:marker_or_causal_for";
    pub const HAS_PHENOTYPE: &str = "biolink:has_phenotype";
    pub const INTERACTS_WITH: &str = "biolink:interacts_with";
}

/// Knowledge level and agent type values.
pub mod provenance {
    pub const KNOWLEDGE_ASSERTION: &str = "knowledge_assertion";
    pub const PREDICTION: &str = "prediction";
    pub const MANUAL_AGENT: &str = "manual_agent";
    pub const COMPUTATIONAL_MODEL: &str = "computational_model";
}

/// Closed set of node categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "biolink:NamedThing")]
    NamedThing,
    #[serde(rename = "biolink:Gene")]
    Gene,
    #[serde(rename = "biolink:Protein")]
    Protein,
    #[serde(rename = "biolink:ChemicalEntity")]
    ChemicalEntity,
    #[serde(rename = "biolink:Disease")]
    Disease,
    #[serde(rename = "biolink:PhenotypicFeature")]
    PhenotypicFeature,
    #[serde(rename = "biolink:AnatomicalEntity")]
    AnatomicalEntity,
    #[serde(rename = "biolink:BiologicalProcess")]
    BiologicalProcess,
    #[serde(rename = "biolink:Pathway")]
    Pathway,
    #[serde(rename = "biolink:OrganismTaxon")]
    OrganismTaxon,
}

const CATEGORY_TABLE: &[(&str, Category)] = &[
    ("NamedThing", Category::NamedThing),
    ("Gene", Category::Gene),
    ("Protein", Category::Protein),
    ("ChemicalEntity", Category::ChemicalEntity),
    ("ChemicalSubstance", Category::ChemicalEntity),
    ("SmallMolecule", Category::ChemicalEntity),
    ("Drug", Category::ChemicalEntity),
    ("Disease", Category::Disease),
    ("PhenotypicFeature", Category::PhenotypicFeature),
    ("AnatomicalEntity", Category::AnatomicalEntity),
    ("BiologicalProcess", Category::BiologicalProcess),
    ("Pathway", Category::Pathway),
    ("OrganismTaxon", Category::OrganismTaxon),
];

impl Category {
    /// Look up a category by tag, with or without the `biolink:` prefix.
    ///
    /// Returns `None` for tags outside the closed set.
    pub fn lookup(tag: &str) -> Option<Category> {
        let name = tag.trim().trim_start_matches("biolink:");
        CATEGORY_TABLE
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, category)| *category)
    }

    /// Like [`Category::lookup`], falling back to `NamedThing`.
    pub fn from_tag(tag: &str) -> Category {
        Self::lookup(tag).unwrap_or_else(|| {
            tracing::debug!("Unknown category '{}', using biolink:NamedThing", tag);
            Category::NamedThing
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::NamedThing => "biolink:NamedThing",
            Category::Gene => "biolink:Gene",
            Category::Protein => "biolink:Protein",
            Category::ChemicalEntity => "biolink:ChemicalEntity",
            Category::Disease => "biolink:Disease",
            Category::PhenotypicFeature => "biolink:PhenotypicFeature",
            Category::AnatomicalEntity => "biolink:AnatomicalEntity",
            Category::BiologicalProcess => "biolink:BiologicalProcess",
            Category::Pathway => "biolink:Pathway",
            Category::OrganismTaxon => "biolink:OrganismTaxon",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::lookup(s).ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// Closed set of association (edge) categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssociationKind {
    #[serde(rename = "biolink:Association")]
    Association,
    #[serde(rename = "biolink:ChemicalToDiseaseOrPhenotypicFeatureAssociation")]
    ChemicalToDiseaseOrPhenotypicFeature,
    #[serde(rename = "biolink:DiseaseToPhenotypicFeatureAssociation")]
    DiseaseToPhenotypicFeature,
    #[serde(rename = "biolink:PairwiseGeneToGeneInteraction")]
    PairwiseGeneToGeneInteraction,
}

impl AssociationKind {
    pub fn from_tag(tag: &str) -> AssociationKind {
        match tag.trim().trim_start_matches("biolink:") {
            "ChemicalToDiseaseOrPhenotypicFeatureAssociation" => {
                AssociationKind::ChemicalToDiseaseOrPhenotypicFeature
            }
            "DiseaseToPhenotypicFeatureAssociation" => AssociationKind::DiseaseToPhenotypicFeature,
            "PairwiseGeneToGeneInteraction" => AssociationKind::PairwiseGeneToGeneInteraction,
            _ => AssociationKind::Association,
        }
    }
}

impl Default for AssociationKind {
    fn default() -> Self {
        AssociationKind::Association
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A typed graph entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub category: Vec<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_taxon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub xref: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonym: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provided_by: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category: vec![category],
            name: None,
            description: None,
            in_taxon: None,
            xref: Vec::new(),
            synonym: Vec::new(),
            provided_by: Vec::new(),
        }
    }

    /// Construct a node from a category tag, falling back to `NamedThing`.
    pub fn from_category_tag(id: impl Into<String>, tag: &str) -> Self {
        Self::new(id, Category::from_tag(tag))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_taxon(mut self, taxon: impl Into<String>) -> Self {
        self.in_taxon = Some(taxon.into());
        self
    }

    pub fn with_provided_by(mut self, source: impl Into<String>) -> Self {
        self.provided_by.push(source.into());
        self
    }
}

/// A typed, directed, attributed relation between two node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    #[serde(default)]
    pub category: AssociationKind,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub negated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has_evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_knowledge_source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregator_knowledge_source: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset_qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex_qualifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_percentage: Option<f64>,
    /// Source-specific attributes without a dedicated field.
    #[serde(flatten)]
    pub attributes: IndexMap<String, serde_json::Value>,
}

impl Edge {
    /// Create an edge with a deterministic id derived from its endpoints.
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        let subject = subject.into();
        let predicate = predicate.into();
        let object = object.into();
        Self {
            id: edge_id(&subject, &predicate, &object, None),
            category: AssociationKind::Association,
            subject,
            predicate,
            object,
            negated: false,
            publications: Vec::new(),
            has_evidence: Vec::new(),
            primary_knowledge_source: None,
            aggregator_knowledge_source: Vec::new(),
            knowledge_level: None,
            agent_type: None,
            frequency_qualifier: None,
            onset_qualifier: None,
            sex_qualifier: None,
            has_count: None,
            has_total: None,
            has_percentage: None,
            attributes: IndexMap::new(),
        }
    }

    pub fn with_category(mut self, category: AssociationKind) -> Self {
        self.category = category;
        self
    }

    /// Set the primary knowledge source and re-derive the id, so the same
    /// triple asserted by two sources yields two edges.
    pub fn with_primary_source(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.id = edge_id(&self.subject, &self.predicate, &self.object, Some(&source));
        self.primary_knowledge_source = Some(source);
        self
    }

    pub fn with_aggregator(mut self, source: impl Into<String>) -> Self {
        self.aggregator_knowledge_source.push(source.into());
        self
    }

    pub fn with_publications(mut self, publications: Vec<String>) -> Self {
        self.publications = publications;
        self
    }

    pub fn with_provenance(mut self, knowledge_level: &str, agent_type: &str) -> Self {
        self.knowledge_level = Some(knowledge_level.to_string());
        self.agent_type = Some(agent_type.to_string());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

fn edge_id(subject: &str, predicate: &str, object: &str, source: Option<&str>) -> String {
    let key = format!("{}|{}|{}|{}", subject, predicate, object, source.unwrap_or(""));
    format!("uuid:{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()))
}

/// A node or an edge, for producers that emit a mixed sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphObject {
    Node(Node),
    Edge(Edge),
}

impl From<Node> for GraphObject {
    fn from(node: Node) -> Self {
        GraphObject::Node(node)
    }
}

impl From<Edge> for GraphObject {
    fn from(edge: Edge) -> Self {
        GraphObject::Edge(edge)
    }
}

/// Nodes and edges produced by a single transform invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Split a mixed sequence into nodes and edges, keeping relative order.
    pub fn from_objects<I>(objects: I) -> Self
    where
        I: IntoIterator<Item = GraphObject>,
    {
        let mut graph = Self::new();
        for object in objects {
            match object {
                GraphObject::Node(node) => graph.nodes.push(node),
                GraphObject::Edge(edge) => graph.edges.push(edge),
            }
        }
        graph
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn extend(&mut self, other: KnowledgeGraph) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_lookup_with_fallback() {
        assert_eq!(Category::from_tag("biolink:Gene"), Category::Gene);
        assert_eq!(Category::from_tag("Disease"), Category::Disease);
        assert_eq!(Category::from_tag("biolink:SmallMolecule"), Category::ChemicalEntity);
        assert_eq!(Category::from_tag("biolink:Spaceship"), Category::NamedThing);
        assert!("biolink:Spaceship".parse::<Category>().is_err());
    }

    #[test]
    fn test_node_omits_unset_fields() {
        let node = Node::new("MESH:D000068", Category::ChemicalEntity).with_name("aspirin");
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "MESH:D000068",
                "category": ["biolink:ChemicalEntity"],
                "name": "aspirin"
            })
        );
    }

    #[test]
    fn test_edge_id_is_deterministic() {
        let a = Edge::new("A:1", predicates::RELATED_TO, "B:2").with_primary_source("infores:x");
        let b = Edge::new("A:1", predicates::RELATED_TO, "B:2").with_primary_source("infores:x");
        let c = Edge::new("A:1", predicates::RELATED_TO, "B:2").with_primary_source("infores:y");

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(a.id.starts_with("uuid:"));
    }

    #[test]
    fn test_edge_attributes_flatten_and_parse_back() {
        let edge = Edge::new("A:1", predicates::INTERACTS_WITH, "B:2")
            .with_category(AssociationKind::PairwiseGeneToGeneInteraction)
            .with_attribute("combined_score", json!(812));

        let line = serde_json::to_string(&edge).unwrap();
        assert!(line.contains("\"combined_score\":812"));
        assert!(!line.contains("negated"));

        let parsed: Edge = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, edge);
    }

    #[test]
    fn test_graph_from_mixed_objects() {
        let objects = vec![
            GraphObject::from(Node::new("A:1", Category::Gene)),
            GraphObject::from(Edge::new("A:1", predicates::RELATED_TO, "B:2")),
            GraphObject::from(Node::new("B:2", Category::Gene)),
        ];

        let graph = KnowledgeGraph::from_objects(objects);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.nodes[1].id, "B:2");
    }
}
