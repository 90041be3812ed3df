//! Reference ingests shipped with the crate.

pub mod ctd;
pub mod hpoa;
pub mod kgx;
pub mod string_ppi;

use crate::catalog::IngestCatalog;

/// Catalog holding every built-in ingest.
pub fn catalog() -> IngestCatalog {
    let mut catalog = IngestCatalog::new();
    catalog.register(ctd::NAME, ctd::DESCRIPTION, ctd::register);
    catalog.register(hpoa::NAME, hpoa::DESCRIPTION, hpoa::register);
    catalog.register(string_ppi::NAME, string_ppi::DESCRIPTION, string_ppi::register);
    catalog.register(kgx::NAME, kgx::DESCRIPTION, kgx::register);
    catalog
}
