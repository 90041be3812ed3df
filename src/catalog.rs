//! Catalog of ingest plugins.
//!
//! Each ingest is a named function that registers its hooks on a fresh
//! [`HookRegistry`]. Configuration files refer to ingests by name.

use indexmap::IndexMap;
use std::fmt;

use crate::error::IngestError;
use crate::hooks::HookRegistry;

/// Error type for catalog lookups
#[derive(Debug)]
pub enum CatalogError {
    NotFound(String),
    /// The ingest's registration function rejected its own hooks
    Registration {
        ingest: String,
        cause: Box<IngestError>,
    },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::NotFound(name) => write!(f, "Ingest not found: {}", name),
            CatalogError::Registration { ingest, cause } => {
                write!(f, "Ingest '{}' failed to register its hooks: {}", ingest, cause)
            }
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Registration { cause, .. } => Some(cause.as_ref()),
            CatalogError::NotFound(_) => None,
        }
    }
}

/// Trait for ingest registration functions
pub trait RegisterFn {
    /// Register the ingest's hooks
    fn register(&self, hooks: &mut HookRegistry) -> Result<(), IngestError>;
}

/// Simple function-based implementation of RegisterFn
impl<F> RegisterFn for F
where
    F: Fn(&mut HookRegistry) -> Result<(), IngestError>,
{
    fn register(&self, hooks: &mut HookRegistry) -> Result<(), IngestError> {
        self(hooks)
    }
}

struct CatalogEntry {
    description: String,
    register: Box<dyn RegisterFn>,
}

/// Registry of ingests by name
#[derive(Default)]
pub struct IngestCatalog {
    ingests: IndexMap<String, CatalogEntry>,
}

impl IngestCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ingest
    ///
    /// # Example
    ///
    /// ```
    /// use kg_ingest::catalog::IngestCatalog;
    /// use kg_ingest::{HookRegistry, IngestError, KnowledgeGraph, Record, TransformState};
    ///
    /// fn skip_all(_r: &Record, _s: &mut TransformState) -> Result<Option<KnowledgeGraph>, IngestError> {
    ///     Ok(None)
    /// }
    ///
    /// let mut catalog = IngestCatalog::new();
    /// catalog.register("noop", "Emits nothing", |hooks: &mut HookRegistry| -> Result<(), IngestError> {
    ///     hooks.transform_record(None, skip_all)?;
    ///     Ok(())
    /// });
    /// assert!(catalog.has_ingest("noop"));
    /// ```
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        register: impl RegisterFn + 'static,
    ) {
        let name = name.into();
        if self.ingests.contains_key(&name) {
            tracing::warn!("Replacing ingest '{}' in catalog", name);
        }
        self.ingests.insert(
            name,
            CatalogEntry {
                description: description.into(),
                register: Box::new(register),
            },
        );
    }

    /// Build the hook registrations of a named ingest
    ///
    /// # Returns
    ///
    /// * `Ok(HookRegistry)` - Hooks registered by the ingest
    /// * `Err(CatalogError)` - Unknown ingest, or its registration failed
    pub fn hooks(&self, name: &str) -> Result<HookRegistry, CatalogError> {
        let entry = self
            .ingests
            .get(name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;

        let mut hooks = HookRegistry::new();
        entry
            .register
            .register(&mut hooks)
            .map_err(|e| CatalogError::Registration {
                ingest: name.to_string(),
                cause: Box::new(e),
            })?;
        Ok(hooks)
    }

    /// Check if an ingest is registered
    pub fn has_ingest(&self, name: &str) -> bool {
        self.ingests.contains_key(name)
    }

    /// `(name, description)` of every registered ingest, in registration order
    pub fn list_ingests(&self) -> Vec<(String, String)> {
        self.ingests
            .iter()
            .map(|(name, entry)| (name.clone(), entry.description.clone()))
            .collect()
    }
}

impl fmt::Debug for IngestCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestCatalog")
            .field("ingests", &self.ingests.keys().collect::<Vec<_>>())
            .finish()
    }
}
