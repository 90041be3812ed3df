//! HPO annotations: disease to phenotype associations from `phenotype.hpoa`.
//!
//! The prepare stage keeps phenotypic abnormality rows (aspect `P`) for
//! OMIM, Orphanet and DECIPHER diseases. Each remaining row becomes one
//! `has_phenotype` edge with frequency, onset and sex qualifiers.

use regex::Regex;
use std::sync::OnceLock;

use crate::curie::{is_curie, normalize, split_curie};
use crate::error::IngestError;
use crate::hooks::HookRegistry;
use crate::model::{predicates, provenance, AssociationKind, Category, Edge, KnowledgeGraph, Node};
use crate::record::Record;
use crate::source::RecordStream;
use crate::state::TransformState;

pub const NAME: &str = "hpoa_disease_phenotype";
pub const DESCRIPTION: &str = "HPO disease to phenotype annotations (prepare + per-record)";

const PRIMARY_SOURCE: &str = "infores:hpo-annotations";
const DISEASE_PREFIXES: &[&str] = &["OMIM", "ORPHA", "DECIPHER"];

/// HPO frequency terms for observed percentages, as half-open `[low, high)`
/// ranges. Exactly 0% and exactly 100% have terms of their own.
const FREQUENCY_TERMS: &[(&str, f64, f64)] = &[
    ("HP:0040284", 0.0, 5.0),    // Very rare
    ("HP:0040283", 5.0, 30.0),   // Occasional
    ("HP:0040282", 30.0, 80.0),  // Frequent
    ("HP:0040281", 80.0, 100.0), // Very frequent
];
const EXCLUDED: &str = "HP:0040285";
const OBLIGATE: &str = "HP:0040280";

pub fn register(hooks: &mut HookRegistry) -> Result<(), IngestError> {
    hooks
        .prepare_data(None, prepare)?
        .transform_record(None, transform_record)?;
    Ok(())
}

/// Keep aspect `P` rows whose subject is an OMIM, Orphanet or DECIPHER disease.
pub fn prepare(
    records: RecordStream,
    _state: &mut TransformState,
) -> Result<Option<RecordStream>, IngestError> {
    Ok(Some(Box::new(records.filter(|item| match item {
        Ok(record) => is_disease_phenotype(record),
        Err(_) => true,
    }))))
}

fn is_disease_phenotype(record: &Record) -> bool {
    let aspect_ok = record.get_str("aspect") == Some("P");
    let prefix_ok = record
        .get_str("database_id")
        .and_then(split_curie)
        .map(|(prefix, _)| DISEASE_PREFIXES.contains(&prefix))
        .unwrap_or(false);
    aspect_ok && prefix_ok
}

pub fn transform_record(
    record: &Record,
    _state: &mut TransformState,
) -> Result<Option<KnowledgeGraph>, IngestError> {
    let disease_id = normalize(record.require_str("database_id")?);
    let phenotype_id = record.require_str("hpo_id")?.to_string();

    let mut edge = Edge::new(disease_id.clone(), predicates::HAS_PHENOTYPE, phenotype_id.clone())
        .with_category(AssociationKind::DiseaseToPhenotypicFeature)
        .with_primary_source(PRIMARY_SOURCE)
        .with_provenance(provenance::KNOWLEDGE_ASSERTION, provenance::MANUAL_AGENT)
        .with_publications(publications(record));

    edge.negated = record
        .get_str("qualifier")
        .map(|q| q.eq_ignore_ascii_case("NOT"))
        .unwrap_or(false);

    if let Some(code) = record.get_str("evidence") {
        edge.has_evidence = vec![evidence_term(code)?.to_string()];
    }

    if let Some(raw) = record.get_str("frequency") {
        let frequency = parse_frequency(raw)?;
        edge.frequency_qualifier = frequency.term;
        edge.has_count = frequency.count;
        edge.has_total = frequency.total;
        edge.has_percentage = frequency.percentage;
    }

    if let Some(onset) = record.get_str("onset") {
        if !is_curie(onset) {
            return Err(IngestError::invalid_value("onset", onset, "expected an HPO term"));
        }
        edge.onset_qualifier = Some(onset.to_string());
    }

    if let Some(sex) = record.get_str("sex") {
        edge.sex_qualifier = Some(sex_term(sex)?.to_string());
    }

    let mut disease = Node::new(disease_id, Category::Disease);
    if let Some(name) = record.get_str("disease_name") {
        disease = disease.with_name(name);
    }

    Ok(Some(
        KnowledgeGraph::new()
            .with_node(disease)
            .with_node(Node::new(phenotype_id, Category::PhenotypicFeature))
            .with_edge(edge),
    ))
}

/// PubMed references from the `reference` column; other reference types are dropped.
fn publications(record: &Record) -> Vec<String> {
    record
        .get_list("reference", ';')
        .into_iter()
        .filter(|r| r.starts_with("PMID:"))
        .collect()
}

fn evidence_term(code: &str) -> Result<&'static str, IngestError> {
    match code {
        "IEA" => Ok("ECO:0000501"),
        "PCS" => Ok("ECO:0006017"),
        "TAS" => Ok("ECO:0000304"),
        other => Err(IngestError::invalid_value(
            "evidence",
            other,
            "expected IEA, PCS or TAS",
        )),
    }
}

fn sex_term(sex: &str) -> Result<&'static str, IngestError> {
    match sex.to_ascii_uppercase().as_str() {
        "MALE" => Ok("PATO:0000384"),
        "FEMALE" => Ok("PATO:0000383"),
        _ => Err(IngestError::invalid_value("sex", sex, "expected MALE or FEMALE")),
    }
}

/// Qualifiers derived from the `frequency` column.
#[derive(Debug, Default, PartialEq)]
pub struct Frequency {
    pub term: Option<String>,
    pub count: Option<u64>,
    pub total: Option<u64>,
    pub percentage: Option<f64>,
}

fn fraction_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)/(\d+)$").expect("valid fraction pattern"))
}

fn percentage_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?)\s*%$").expect("valid percentage pattern")
    })
}

/// Parse an HPO term (`HP:0040283`), a fraction (`3/10`) or a percentage (`25%`).
///
/// Fractions and percentages also get the matching HPO frequency term.
pub fn parse_frequency(raw: &str) -> Result<Frequency, IngestError> {
    let raw = raw.trim();
    let invalid = |reason: &str| IngestError::invalid_value("frequency", raw, reason);

    if raw.starts_with("HP:") {
        return Ok(Frequency {
            term: Some(raw.to_string()),
            ..Frequency::default()
        });
    }

    if let Some(caps) = fraction_pattern().captures(raw) {
        let count: u64 = caps[1].parse().map_err(|_| invalid("count out of range"))?;
        let total: u64 = caps[2].parse().map_err(|_| invalid("total out of range"))?;
        if total == 0 || count > total {
            return Err(invalid("count must be between 0 and a non-zero total"));
        }
        let percentage = count as f64 * 100.0 / total as f64;
        return Ok(Frequency {
            term: frequency_term(percentage).map(str::to_string),
            count: Some(count),
            total: Some(total),
            percentage: Some(percentage),
        });
    }

    if let Some(caps) = percentage_pattern().captures(raw) {
        let percentage: f64 = caps[1].parse().map_err(|_| invalid("not a number"))?;
        if percentage > 100.0 {
            return Err(invalid("percentage above 100"));
        }
        return Ok(Frequency {
            term: frequency_term(percentage).map(str::to_string),
            percentage: Some(percentage),
            ..Frequency::default()
        });
    }

    Err(invalid("expected an HPO term, n/m or a percentage"))
}

fn frequency_term(percentage: f64) -> Option<&'static str> {
    if percentage == 0.0 {
        return Some(EXCLUDED);
    }
    if percentage == 100.0 {
        return Some(OBLIGATE);
    }
    FREQUENCY_TERMS
        .iter()
        .find(|(_, low, high)| percentage >= *low && percentage < *high)
        .map(|(term, _, _)| *term)
}
