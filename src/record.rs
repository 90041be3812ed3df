//! Source records: ordered field maps handed to transforms.
//!
//! A [`Record`] is one row of source data. Record sources build them; the
//! runner hands them to transforms by shared reference, so a transform never
//! sees a record another hook has modified.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use crate::error::{IngestError, RecordError};

/// Represents different types of field values in a record
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FieldValue>),
    Null,
}

impl FieldValue {
    /// Convert a JSON value. Nested objects are kept as their JSON text.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => FieldValue::String(s),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    FieldValue::Float(f)
                } else {
                    FieldValue::Null
                }
            }
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Array(arr) => {
                FieldValue::List(arr.into_iter().map(FieldValue::from_json).collect())
            }
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Object(_) => FieldValue::String(value.to_string()),
        }
    }

    /// Empty strings, empty lists and nulls count as missing.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::String(s) => s.trim().is_empty(),
            FieldValue::List(l) => l.is_empty(),
            FieldValue::Null => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view, parsing strings when needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::List(l) => {
                let parts: Vec<String> = l.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join("|"))
            }
            FieldValue::Null => write!(f, ""),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// File and line a record was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOrigin {
    pub file: String,
    pub line: usize,
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One row of source data, keyed by field name in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, FieldValue>,
    #[serde(skip)]
    origin: Option<RecordOrigin>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(field, value)` pairs.
    ///
    /// # Example
    ///
    /// ```
    /// use kg_ingest::Record;
    ///
    /// let record = Record::from_pairs([("ChemicalID", "D000068"), ("ChemicalName", "aspirin")]);
    /// assert_eq!(record.get_str("ChemicalName"), Some("aspirin"));
    /// ```
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            origin: None,
        }
    }

    /// Build a record from a JSON object.
    pub fn from_json_object(object: IndexMap<String, serde_json::Value>) -> Self {
        Self {
            fields: object
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from_json(v)))
                .collect(),
            origin: None,
        }
    }

    /// Tag the record with the file and line it was read from.
    pub fn with_origin(mut self, file: impl Into<String>, line: usize) -> Self {
        self.origin = Some(RecordOrigin {
            file: file.into(),
            line,
        });
        self
    }

    pub fn origin(&self) -> Option<&RecordOrigin> {
        self.origin.as_ref()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Get a non-empty, trimmed string value.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(FieldValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Get a non-empty string value or fail with an error naming the field.
    pub fn require_str(&self, field: &str) -> Result<&str, IngestError> {
        self.get_str(field)
            .ok_or_else(|| IngestError::missing_field(field))
    }

    /// Get a numeric value, parsing strings when needed.
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_f64)
    }

    /// Split a delimited string field into its non-empty parts.
    ///
    /// List values are returned element by element.
    pub fn get_list(&self, field: &str, separator: char) -> Vec<String> {
        match self.get(field) {
            Some(FieldValue::List(values)) => values
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
                .collect(),
            Some(FieldValue::String(s)) => s
                .split(separator)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            Some(value) if !value.is_empty() => vec![value.to_string()],
            _ => Vec::new(),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Structural check applied to records at the source boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSchema {
    required: Vec<String>,
}

impl RecordSchema {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    /// Fail on the first required field the record does not carry at all.
    ///
    /// Present-but-empty values pass; whether they are acceptable is up to
    /// the transform.
    pub fn validate(&self, record: &Record) -> Result<(), RecordError> {
        match self.required.iter().find(|field| !record.contains(field)) {
            Some(field) => Err(RecordError::MissingField {
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Check a header row, returning the required columns it lacks.
    pub fn missing_columns(&self, header: &[String]) -> Vec<String> {
        self.required
            .iter()
            .filter(|field| !header.contains(field))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_str_treats_blank_as_missing() {
        let record = Record::from_pairs([("a", "  x "), ("b", ""), ("c", "   ")]);

        assert_eq!(record.get_str("a"), Some("x"));
        assert_eq!(record.get_str("b"), None);
        assert_eq!(record.get_str("c"), None);
        assert_eq!(record.get_str("missing"), None);
    }

    #[test]
    fn test_require_str_names_field() {
        let record = Record::new().with("PubMedIDs", "");
        let err = record.require_str("PubMedIDs").unwrap_err();

        assert!(err.to_string().contains("PubMedIDs"));
    }

    #[test]
    fn test_get_list_from_string_and_list() {
        let record = Record::new()
            .with("pmids", "111|222||")
            .with(
                "xrefs",
                FieldValue::List(vec![FieldValue::from("a"), FieldValue::Null, FieldValue::from("b")]),
            );

        assert_eq!(record.get_list("pmids", '|'), vec!["111", "222"]);
        assert_eq!(record.get_list("xrefs", '|'), vec!["a", "b"]);
        assert!(record.get_list("none", '|').is_empty());
    }

    #[test]
    fn test_from_json_object_keeps_order_and_types() {
        let object: IndexMap<String, serde_json::Value> = serde_json::from_value(json!({
            "id": "HGNC:1",
            "score": 0.5,
            "count": 3,
            "tags": ["x", "y"],
            "nested": {"k": 1}
        }))
        .unwrap();

        let record = Record::from_json_object(object);
        let names: Vec<&String> = record.field_names().collect();

        assert_eq!(names, vec!["id", "score", "count", "tags", "nested"]);
        assert_eq!(record.get("score"), Some(&FieldValue::Float(0.5)));
        assert_eq!(record.get("count"), Some(&FieldValue::Int(3)));
        assert_eq!(record.get_str("nested"), Some("{\"k\":1}"));
    }

    #[test]
    fn test_schema_validation() {
        let schema = RecordSchema::new(["ChemicalID", "DiseaseID"]);
        let ok = Record::from_pairs([("ChemicalID", "D1"), ("DiseaseID", "")]);
        let bad = Record::from_pairs([("ChemicalID", "D1")]);

        assert!(schema.validate(&ok).is_ok());
        assert_eq!(
            schema.validate(&bad),
            Err(RecordError::MissingField {
                field: "DiseaseID".to_string()
            })
        );
        assert_eq!(
            schema.missing_columns(&["ChemicalID".to_string()]),
            vec!["DiseaseID".to_string()]
        );
    }

    #[test]
    fn test_numeric_view() {
        let record = Record::new().with("score", "712").with("flag", true);

        assert_eq!(record.get_f64("score"), Some(712.0));
        assert_eq!(record.get_f64("flag"), None);
    }
}
