//! Column filters declared in ingest configuration.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::record::{FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    In,
    NotIn,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
}

/// Keep a record only if `column op value` holds.
///
/// Comparisons are numeric when both sides parse as numbers and textual
/// otherwise. A missing column matches only `ne` and `not_in`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl ColumnFilter {
    /// Check that the value has the shape the operator needs.
    pub fn validate(&self) -> Result<(), IngestError> {
        let ok = match self.op {
            FilterOp::In | FilterOp::NotIn => self.value.is_array(),
            FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le => {
                json_number(&self.value).is_some()
            }
            FilterOp::Eq | FilterOp::Ne | FilterOp::Contains => {
                !self.value.is_null() && !self.value.is_array() && !self.value.is_object()
            }
        };

        if ok {
            Ok(())
        } else {
            Err(IngestError::config(format!(
                "Filter on '{}': value {} is not valid for operator {:?}",
                self.column, self.value, self.op
            )))
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let field = match record.get(&self.column) {
            Some(value) if !value.is_empty() => value,
            _ => return matches!(self.op, FilterOp::Ne | FilterOp::NotIn),
        };

        match self.op {
            FilterOp::Eq => values_equal(field, &self.value),
            FilterOp::Ne => !values_equal(field, &self.value),
            FilterOp::In => self.candidates().any(|v| values_equal(field, v)),
            FilterOp::NotIn => !self.candidates().any(|v| values_equal(field, v)),
            FilterOp::Gt => compare(field, &self.value, |a, b| a > b),
            FilterOp::Ge => compare(field, &self.value, |a, b| a >= b),
            FilterOp::Lt => compare(field, &self.value, |a, b| a < b),
            FilterOp::Le => compare(field, &self.value, |a, b| a <= b),
            FilterOp::Contains => match field {
                FieldValue::List(items) => items.iter().any(|item| values_equal(item, &self.value)),
                other => other.to_string().contains(&json_text(&self.value)),
            },
        }
    }

    fn candidates(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.value.as_array().into_iter().flatten()
    }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn values_equal(field: &FieldValue, value: &serde_json::Value) -> bool {
    if let (Some(a), Some(b)) = (field.as_f64(), json_number(value)) {
        return a == b;
    }
    field.to_string().trim() == json_text(value)
}

fn compare(field: &FieldValue, value: &serde_json::Value, op: fn(f64, f64) -> bool) -> bool {
    match (field.as_f64(), json_number(value)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(column: &str, op: FilterOp, value: serde_json::Value) -> ColumnFilter {
        ColumnFilter {
            column: column.to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_eq_and_in() {
        let record = Record::from_pairs([("DirectEvidence", "therapeutic")]);

        assert!(filter("DirectEvidence", FilterOp::Eq, json!("therapeutic")).matches(&record));
        assert!(!filter("DirectEvidence", FilterOp::Ne, json!("therapeutic")).matches(&record));
        assert!(filter("DirectEvidence", FilterOp::In, json!(["marker/mechanism", "therapeutic"]))
            .matches(&record));
        assert!(!filter("DirectEvidence", FilterOp::NotIn, json!(["therapeutic"])).matches(&record));
    }

    #[test]
    fn test_numeric_comparisons() {
        let record = Record::from_pairs([("combined_score", "700")]);

        assert!(filter("combined_score", FilterOp::Ge, json!(700)).matches(&record));
        assert!(!filter("combined_score", FilterOp::Gt, json!(700)).matches(&record));
        assert!(filter("combined_score", FilterOp::Lt, json!("701")).matches(&record));
        assert!(filter("combined_score", FilterOp::Eq, json!(700.0)).matches(&record));
    }

    #[test]
    fn test_missing_column() {
        let record = Record::from_pairs([("other", "x")]);

        assert!(!filter("aspect", FilterOp::Eq, json!("P")).matches(&record));
        assert!(filter("aspect", FilterOp::Ne, json!("P")).matches(&record));
        assert!(filter("aspect", FilterOp::NotIn, json!(["P"])).matches(&record));
        assert!(!filter("aspect", FilterOp::Gt, json!(1)).matches(&record));
    }

    #[test]
    fn test_contains() {
        let record = Record::from_pairs([("name", "type 2 diabetes")]);
        assert!(filter("name", FilterOp::Contains, json!("diabetes")).matches(&record));
    }

    #[test]
    fn test_validate() {
        assert!(filter("a", FilterOp::In, json!(["x"])).validate().is_ok());
        assert!(filter("a", FilterOp::In, json!("x")).validate().is_err());
        assert!(filter("a", FilterOp::Gt, json!("abc")).validate().is_err());
        assert!(filter("a", FilterOp::Eq, json!(null)).validate().is_err());
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let parsed: ColumnFilter =
            serde_yaml::from_str("column: aspect\nop: not_in\nvalue: [C, I]\n").unwrap();
        assert_eq!(parsed.op, FilterOp::NotIn);
        assert_eq!(parsed.value, json!(["C", "I"]));
    }
}
