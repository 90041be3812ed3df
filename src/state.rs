//! Per-run transform state.
//!
//! A [`TransformState`] is created fresh for every (source, tag) run and
//! dropped when the run ends. Hooks use it for counters, lookup tables built
//! once in a begin hook, and de-duplication sets. Only the
//! `transform_metadata` map outlives the run: it is copied into the run
//! summary and the metadata file.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::IngestError;

/// Two-column lookup table loaded from configuration.
pub type MappingTable = HashMap<String, String>;

/// Mutable scratch space for one (source, tag) run.
#[derive(Default)]
pub struct TransformState {
    source: String,
    tag: String,

    /// Typed values keyed by name.
    slots: HashMap<String, Box<dyn Any>>,

    counters: IndexMap<String, u64>,

    /// Read-only parameters from the ingest configuration
    parameters: IndexMap<String, serde_json::Value>,

    /// Read-only mapping tables from the ingest configuration
    mappings: HashMap<String, Arc<MappingTable>>,

    transform_metadata: IndexMap<String, serde_json::Value>,
}

impl TransformState {
    /// Create an empty state for a (source, tag) run.
    ///
    /// # Example
    /// ```
    /// use kg_ingest::TransformState;
    ///
    /// let mut state = TransformState::new("ctd", "default");
    /// state.increment("discarded");
    /// assert_eq!(state.counter("discarded"), 1);
    /// ```
    pub fn new(source: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_parameters(mut self, parameters: IndexMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_mapping(mut self, name: impl Into<String>, table: Arc<MappingTable>) -> Self {
        self.mappings.insert(name.into(), table);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Store a value, replacing any previous value under the same key.
    pub fn insert<T: Any>(&mut self, key: impl Into<String>, value: T) {
        self.slots.insert(key.into(), Box::new(value));
    }

    /// Get a value by key. Returns `None` if absent or of a different type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.slots.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.slots.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Get a value, inserting the result of `init` if the key is absent.
    ///
    /// # Errors
    /// Fails if the key holds a value of another type.
    pub fn get_or_insert_with<T: Any, F: FnOnce() -> T>(
        &mut self,
        key: &str,
        init: F,
    ) -> Result<&mut T, IngestError> {
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Box::new(init()))
            .downcast_mut::<T>()
            .ok_or_else(|| {
                IngestError::hook(format!(
                    "State value '{}' has a different type than requested",
                    key
                ))
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn increment(&mut self, counter: &str) -> u64 {
        self.increment_by(counter, 1)
    }

    pub fn increment_by(&mut self, counter: &str, amount: u64) -> u64 {
        let value = self.counters.entry(counter.to_string()).or_insert(0);
        *value += amount;
        *value
    }

    /// Current value of a counter; zero if never incremented.
    pub fn counter(&self, counter: &str) -> u64 {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn counters(&self) -> &IndexMap<String, u64> {
        &self.counters
    }

    pub fn parameter(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.get(name)
    }

    /// Deserialize a parameter, using `default` when it is not configured.
    pub fn parameter_or<T: DeserializeOwned>(&self, name: &str, default: T) -> Result<T, IngestError> {
        match self.parameters.get(name) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                IngestError::config(format!("Invalid parameter '{}': {}", name, e))
            }),
            None => Ok(default),
        }
    }

    pub fn mapping(&self, name: &str) -> Option<&MappingTable> {
        self.mappings.get(name).map(|table| table.as_ref())
    }

    /// Like [`TransformState::mapping`], failing with a configuration error.
    pub fn require_mapping(&self, name: &str) -> Result<Arc<MappingTable>, IngestError> {
        self.mappings.get(name).cloned().ok_or_else(|| {
            IngestError::config(format!(
                "Mapping table '{}' is not configured for {}/{}",
                name, self.source, self.tag
            ))
        })
    }

    /// Record a value in the persisted transform metadata.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.transform_metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.transform_metadata.get(key)
    }

    /// Copy a counter into the persisted transform metadata.
    pub fn persist_counter(&mut self, counter: &str) {
        let value = self.counter(counter);
        self.set_metadata(counter, serde_json::Value::from(value));
    }

    pub fn into_transform_metadata(self) -> IndexMap<String, serde_json::Value> {
        self.transform_metadata
    }
}

impl std::fmt::Debug for TransformState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformState")
            .field("source", &self.source)
            .field("tag", &self.tag)
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .field("counters", &self.counters)
            .field("parameters", &self.parameters)
            .field("mappings", &self.mappings.keys().collect::<Vec<_>>())
            .field("transform_metadata", &self.transform_metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_typed_slots() {
        let mut state = TransformState::new("src", "tag");
        state.insert("lookup", HashMap::from([("a".to_string(), 1u32)]));

        let lookup = state.get::<HashMap<String, u32>>("lookup").unwrap();
        assert_eq!(lookup.get("a"), Some(&1));

        assert!(state.get::<String>("lookup").is_none());
        assert!(state.get::<String>("missing").is_none());
    }

    #[test]
    fn test_read_after_write() {
        let mut state = TransformState::new("src", "tag");

        state.get_or_insert_with("seen", HashSet::<String>::new)
            .unwrap()
            .insert("A:1".to_string());
        let seen = state.get_or_insert_with("seen", HashSet::<String>::new).unwrap();

        assert!(seen.contains("A:1"));
    }

    #[test]
    fn test_get_or_insert_with_type_mismatch() {
        let mut state = TransformState::new("src", "tag");
        state.insert("seen", 5u32);

        assert!(state.get_or_insert_with("seen", String::new).is_err());
    }

    #[test]
    fn test_counters() {
        let mut state = TransformState::new("src", "tag");

        assert_eq!(state.counter("discarded"), 0);
        state.increment("discarded");
        state.increment_by("discarded", 2);
        assert_eq!(state.counter("discarded"), 3);
    }

    #[test]
    fn test_parameters() {
        let mut params = IndexMap::new();
        params.insert("threshold".to_string(), json!(700));
        let state = TransformState::new("src", "tag").with_parameters(params);

        assert_eq!(state.parameter_or("threshold", 0u32).unwrap(), 700);
        assert_eq!(state.parameter_or("batch_size", 10usize).unwrap(), 10);
        assert!(state.parameter_or::<String>("threshold", String::new()).is_err());
    }

    #[test]
    fn test_only_metadata_is_persisted() {
        let mut state = TransformState::new("src", "tag");
        state.increment("discarded");
        state.increment("ignored");
        state.persist_counter("discarded");
        state.set_metadata("note", json!("ok"));

        let metadata = state.into_transform_metadata();
        assert_eq!(metadata.get("discarded"), Some(&json!(1)));
        assert_eq!(metadata.get("note"), Some(&json!("ok")));
        assert!(metadata.get("ignored").is_none());
    }

    #[test]
    fn test_require_mapping() {
        let table = Arc::new(MappingTable::from([("k".to_string(), "v".to_string())]));
        let state = TransformState::new("src", "tag").with_mapping("m", table);

        assert_eq!(state.mapping("m").and_then(|m| m.get("k")), Some(&"v".to_string()));
        assert!(state.require_mapping("other").is_err());
    }
}
