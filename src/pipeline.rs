//! Config-driven ingest runs: configuration, catalog, runner, writer and
//! metadata wired together.

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::catalog::IngestCatalog;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::hooks::HookRegistry;
use crate::metadata::TransformMetadata;
use crate::runner::{ErrorPolicy, RunSummary, Runner};
use crate::writer::{output_paths, JsonlWriter};

/// Options for a config-driven run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    /// Replace existing output files
    pub overwrite: bool,
    /// Overrides every tag's row limit
    pub row_limit: Option<usize>,
    /// Overrides the configured error policy of the source and its tags
    pub error_policy: Option<ErrorPolicy>,
    pub write_metadata: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            overwrite: false,
            row_limit: None,
            error_policy: None,
            write_metadata: true,
        }
    }
}

/// Files written by a run, with its summary.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub summary: RunSummary,
    pub nodes_path: PathBuf,
    pub edges_path: PathBuf,
    pub metadata_path: Option<PathBuf>,
}

/// Load a configuration file and run its ingest.
pub fn run_ingest(
    config_path: &Path,
    catalog: &IngestCatalog,
    options: &PipelineOptions,
) -> Result<IngestOutcome, IngestError> {
    let config = IngestConfig::from_file(config_path)?;
    run_config(config, catalog, options)
}

/// Run an already loaded configuration.
///
/// Hook registrations, mapping tables and inputs are all checked before the
/// output files are created.
pub fn run_config(
    mut config: IngestConfig,
    catalog: &IngestCatalog,
    options: &PipelineOptions,
) -> Result<IngestOutcome, IngestError> {
    config.apply_overrides(options.row_limit, options.error_policy);

    let hooks = catalog.hooks(config.ingest_name())?;
    let mut runner = build_runner(&config, &hooks)?;
    runner.check_inputs()?;

    let started_at = Utc::now();
    let mut writer = JsonlWriter::create(&options.output_dir, &config.name, options.overwrite)?;
    let summary = runner.run(&mut writer)?;

    let metadata_path = if options.write_metadata {
        let metadata = TransformMetadata::from_summary(
            &summary,
            config.source_version.clone(),
            config.schema_version.clone(),
            started_at,
        );
        Some(metadata.write(&options.output_dir)?)
    } else {
        None
    };

    let (nodes_path, edges_path) = output_paths(&options.output_dir, &config.name);
    Ok(IngestOutcome {
        summary,
        nodes_path,
        edges_path,
        metadata_path,
    })
}

/// Check a configuration without transforming anything: the ingest exists,
/// its hooks fit the declared tags, mapping tables load and inputs are present.
pub fn validate_ingest(
    config_path: &Path,
    catalog: &IngestCatalog,
) -> Result<IngestConfig, IngestError> {
    let config = IngestConfig::from_file(config_path)?;
    let hooks = catalog.hooks(config.ingest_name())?;
    build_runner(&config, &hooks)?.check_inputs()?;
    Ok(config)
}

fn build_runner(config: &IngestConfig, hooks: &HookRegistry) -> Result<Runner, IngestError> {
    let mut runner = Runner::new(config.name.as_str(), hooks, config.build_inputs())?
        .with_error_policy(config.error_policy)
        .with_parameters(config.parameters.clone())
        .with_min_counts(config.min_node_count, config.min_edge_count);

    for (name, table) in config.load_mappings()? {
        runner = runner.with_mapping(name, table);
    }
    Ok(runner)
}
