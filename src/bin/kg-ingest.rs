//! kg-ingest CLI - run biomedical ingests from YAML configurations
//!
//! Each configuration names a built-in ingest and the input files for its
//! tags; nodes and edges are written as KGX JSON Lines.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use kg_ingest::ingests;
use kg_ingest::{ErrorPolicy, IngestError, PipelineOptions};

#[derive(Parser)]
#[command(name = "kg-ingest")]
#[command(version, about = "Transform biomedical source files into knowledge graph nodes and edges", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an ingest and write its nodes and edges
    Transform {
        /// Path to the ingest configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for node, edge and metadata files
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Replace existing output files
        #[arg(long)]
        overwrite: bool,

        /// Read at most this many records per tag
        #[arg(short, long)]
        row_limit: Option<usize>,

        /// Error policy for every tag (abort, skip) - overrides config file
        #[arg(short, long)]
        error_policy: Option<ErrorPolicy>,

        /// Do not write the metadata file
        #[arg(long)]
        no_metadata: bool,
    },

    /// Validate a configuration and its inputs without transforming
    Validate {
        /// Path to the ingest configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List the built-in ingests
    List,
}

fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Transform { config, output_dir, overwrite, row_limit, error_policy, no_metadata } => {
            let options = PipelineOptions {
                output_dir,
                overwrite,
                row_limit,
                error_policy,
                write_metadata: !no_metadata,
            };
            transform(config, options)
        }
        Commands::Validate { config } => validate(config),
        Commands::List => {
            list_ingests();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Run the configured ingest and report what was written
fn transform(config: PathBuf, options: PipelineOptions) -> Result<(), IngestError> {
    println!("🔧 Transforming {}...", config.display());

    let outcome = kg_ingest::run_ingest(&config, &ingests::catalog(), &options)?;
    let summary = &outcome.summary;

    for tag in &summary.tags {
        println!(
            "  ✓ {}: {} records read, {} failed, {} nodes, {} edges",
            tag.tag, tag.records_read, tag.records_failed, tag.nodes, tag.edges
        );
    }
    println!("  ✓ Wrote {}", outcome.nodes_path.display());
    println!("  ✓ Wrote {}", outcome.edges_path.display());
    if let Some(path) = &outcome.metadata_path {
        println!("  ✓ Wrote {}", path.display());
    }

    println!(
        "✨ {} complete: {} nodes, {} edges",
        summary.source, summary.node_count, summary.edge_count
    );
    Ok(())
}

/// Check the configuration, its hooks and its inputs
fn validate(config: PathBuf) -> Result<(), IngestError> {
    println!("🔍 Validating {}...", config.display());

    let loaded = kg_ingest::validate_ingest(&config, &ingests::catalog())?;
    println!("  ✓ Ingest '{}' found", loaded.ingest_name());
    for tag in loaded.tag_names() {
        println!("  ✓ Tag '{}' inputs present", tag);
    }
    if !loaded.mappings.is_empty() {
        println!("  ✓ Loaded {} mapping tables", loaded.mappings.len());
    }

    println!("✨ Configuration is valid!");
    Ok(())
}

fn list_ingests() {
    let catalog = ingests::catalog();
    println!("Available ingests:");
    for (name, description) in catalog.list_ingests() {
        println!("  {:<28} {}", name, description);
    }
}
