//! Compact URI (CURIE) helpers for identifier mapping.

use regex::Regex;
use std::sync::OnceLock;

/// Known spellings of identifier prefixes and their canonical form.
const PREFIX_ALIASES: &[(&str, &str)] = &[
    ("MESH", "MESH"),
    ("MSH", "MESH"),
    ("OMIM", "OMIM"),
    ("MIM", "OMIM"),
    ("ORPHA", "Orphanet"),
    ("ORPHANET", "Orphanet"),
    ("DECIPHER", "DECIPHER"),
    ("HP", "HP"),
    ("MONDO", "MONDO"),
    ("NCBIGENE", "NCBIGene"),
    ("ENTREZ", "NCBIGene"),
    ("ENSEMBL", "ENSEMBL"),
    ("PMID", "PMID"),
    ("PUBMED", "PMID"),
    ("ECO", "ECO"),
    ("PATO", "PATO"),
    ("NCBITAXON", "NCBITaxon"),
];

fn curie_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_.\-]*):(\S+)$").expect("valid CURIE pattern")
    })
}

/// Split a CURIE into `(prefix, local_id)`.
pub fn split_curie(value: &str) -> Option<(&str, &str)> {
    let caps = curie_pattern().captures(value.trim())?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

pub fn is_curie(value: &str) -> bool {
    split_curie(value).is_some()
}

/// Canonical spelling of a prefix; unknown prefixes are returned unchanged.
pub fn canonical_prefix(prefix: &str) -> String {
    let upper = prefix.to_ascii_uppercase();
    PREFIX_ALIASES
        .iter()
        .find(|(alias, _)| *alias == upper)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| prefix.to_string())
}

/// Rewrite a CURIE with its canonical prefix.
///
/// Values that are not CURIEs are returned trimmed but otherwise unchanged.
pub fn normalize(value: &str) -> String {
    match split_curie(value) {
        Some((prefix, local)) => format!("{}:{}", canonical_prefix(prefix), local),
        None => value.trim().to_string(),
    }
}

/// Prefix a bare local id; ids that are already CURIEs are normalized instead.
///
/// # Example
///
/// ```
/// use kg_ingest::curie::with_prefix;
///
/// assert_eq!(with_prefix("MESH", "D000068"), "MESH:D000068");
/// assert_eq!(with_prefix("MESH", "MESH:D003967"), "MESH:D003967");
/// ```
pub fn with_prefix(prefix: &str, value: &str) -> String {
    let value = value.trim();
    if is_curie(value) {
        normalize(value)
    } else {
        format!("{}:{}", canonical_prefix(prefix), value)
    }
}

/// Split a delimited list of publication ids into CURIEs.
///
/// Bare ids get `prefix`, empty parts are dropped and duplicates removed.
pub fn split_publications(raw: &str, separator: char, prefix: &str) -> Vec<String> {
    let mut publications: Vec<String> = Vec::new();
    for part in raw.split(separator).map(str::trim).filter(|p| !p.is_empty()) {
        let curie = with_prefix(prefix, part);
        if !publications.contains(&curie) {
            publications.push(curie);
        }
    }
    publications
}
