//! Sentinel CLI - Command-line interface
//!
//! Usage:
//!   sentinel extract --input <model_output.json> --output <triples.json>
//!   sentinel map --triples <file> --ontology-files <files...> --output <file>
//!   sentinel ingest --triples <triples.json>
//!   sentinel export --triples <triples.json> --format rdf|json-ld
//!   sentinel validate-annotations --input <annotations.json>
//!   sentinel query <text>

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sentinel_core::{LoggingConfig, MappedTriples, OntologyRegistry, PipelineConfig};
use sentinel_export::{JsonLdExporter, RdfExporter, TextTriple};
use sentinel_extractor::{
    mapping::{parse_entity_labels, parse_raw_triples},
    AnnotatedDocument, AnnotationValidator, ExtractionPipeline, RecordedDocument,
    RecordedInference, TripleMapper,
};
use sentinel_graph::IngestionEngine;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Ontology-constrained CTI triple pipeline")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables take precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract validated triples from recorded model output
    Extract {
        /// Recorded tokens, tags and relation predictions per document
        #[arg(long)]
        input: PathBuf,
        /// Where to write the extracted triples
        #[arg(long)]
        output: PathBuf,
    },
    /// Attach ontology types to plain text triples
    Map {
        /// Raw triples (array, or object with an `@graph` array)
        #[arg(long)]
        triples: PathBuf,
        /// Entity text to type lookup
        #[arg(long)]
        entity_labels: Option<PathBuf>,
        /// Ontology definition documents (defaults to the configured ones)
        #[arg(long, num_args = 1..)]
        ontology_files: Vec<PathBuf>,
        /// Where to write the mapped triples
        #[arg(long)]
        output: PathBuf,
    },
    /// Merge triples into the configured graph store
    Ingest {
        #[arg(long)]
        triples: PathBuf,
    },
    /// Serialize triples as linked data
    Export {
        #[arg(long)]
        triples: PathBuf,
        #[arg(long, value_enum)]
        format: ExportFormat,
        /// Output path (defaults to the configured output directory)
        #[arg(long)]
        output: Option<PathBuf>,
        /// JSON-LD context document replacing the default context
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Check annotated documents against the ontology
    ValidateAnnotations {
        #[arg(long)]
        input: PathBuf,
    },
    /// Query the configured graph store
    Query {
        /// Backend query text
        text: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Rdf,
    JsonLd,
}

impl ExportFormat {
    fn default_file_name(self) -> &'static str {
        match self {
            Self::Rdf => "output.rdf",
            Self::JsonLd => "output.jsonld",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?.with_env_override()?,
        None => PipelineConfig::from_env()?,
    };
    init_tracing(&config.logging);

    match cli.command {
        Commands::Extract { input, output } => extract(&config, &input, &output).await,
        Commands::Map {
            triples,
            entity_labels,
            ontology_files,
            output,
        } => map(&config, &triples, entity_labels.as_deref(), &ontology_files, &output),
        Commands::Ingest { triples } => ingest(&config, &triples).await,
        Commands::Export {
            triples,
            format,
            output,
            context,
        } => export(&config, &triples, format, output, context.as_deref()),
        Commands::ValidateAnnotations { input } => validate_annotations(&config, &input),
        Commands::Query { text } => query(&config, &text).await,
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_registry(config: &PipelineConfig) -> anyhow::Result<Arc<OntologyRegistry>> {
    let registry = OntologyRegistry::from_config(&config.ontology)
        .context("Failed to load ontology definitions")?;
    Ok(Arc::new(registry))
}

fn ontology_sources(registry: &OntologyRegistry) -> Vec<String> {
    registry
        .sources()
        .iter()
        .map(|p| p.display().to_string())
        .collect()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

async fn extract(config: &PipelineConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    let registry = load_registry(config)?;
    let recorded: Vec<RecordedDocument> = read_json(input)?;
    let inference = Arc::new(RecordedInference::new(recorded, registry.no_relation_label()));
    let documents = inference.documents().to_vec();

    let pipeline = ExtractionPipeline::new(
        registry.clone(),
        inference.clone(),
        inference,
        &config.inference,
    );
    let outcomes = pipeline.process_batch(&documents).await;

    let mut triples = Vec::new();
    let mut rejected = 0;
    let mut failed = 0;
    for (id, outcome) in outcomes {
        match outcome {
            Ok(extraction) => {
                rejected += extraction.report.rejected_count();
                for error in &extraction.report.errors {
                    println!("  {id} {error}");
                }
                triples.extend(extraction.report.triples);
            }
            Err(e) => {
                failed += 1;
                println!("  {id} failed: {e}");
            }
        }
    }

    let valid = triples.len();
    write_json(output, &MappedTriples::new(triples, ontology_sources(&registry)))?;

    println!("Documents: {} ({failed} failed)", documents.len());
    println!("Valid triples: {valid}");
    println!("Rejected predictions: {rejected}");
    println!("Saved to {}", output.display());
    Ok(())
}

fn map(
    config: &PipelineConfig,
    triples: &Path,
    entity_labels: Option<&Path>,
    ontology_files: &[PathBuf],
    output: &Path,
) -> anyhow::Result<()> {
    let registry = if ontology_files.is_empty() {
        load_registry(config)?
    } else {
        Arc::new(
            OntologyRegistry::load_files(ontology_files)
                .context("Failed to load ontology definitions")?,
        )
    };

    let content = fs::read_to_string(triples)
        .with_context(|| format!("Failed to read {}", triples.display()))?;
    let raw = parse_raw_triples(&content)
        .with_context(|| format!("Failed to parse {}", triples.display()))?;

    let labels = match entity_labels {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            parse_entity_labels(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => Default::default(),
    };

    let report = TripleMapper::new(registry.clone(), labels).map(&raw);
    let mapped = MappedTriples::new(report.triples, ontology_sources(&registry));
    write_json(output, &mapped)?;

    println!("Mapped triples: {}", mapped.metadata.num_triples);
    if !report.unknown_entity_types.is_empty() {
        println!("Entity types not in ontology: {:?}", report.unknown_entity_types);
    }
    if !report.unknown_relations.is_empty() {
        println!("Relations not in ontology: {:?}", report.unknown_relations);
    }
    println!("Saved to {}", output.display());
    Ok(())
}

async fn ingest(config: &PipelineConfig, triples: &Path) -> anyhow::Result<()> {
    let mapped: MappedTriples = read_json(triples)?;
    let store = sentinel_graph::connect(&config.graph).await?;
    let engine = IngestionEngine::new(store, &config.graph);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling ingestion");
            trigger.cancel();
        }
    });

    let report = engine.ingest_with_cancel(&mapped.triples, &cancel).await;

    for outcome in report.outcomes.iter().filter(|o| !o.is_ok()) {
        if let Some(error) = outcome.error() {
            println!("  [{}] {} : {error}", outcome.index, outcome.triple);
        }
    }
    println!("Succeeded: {}", report.succeeded());
    println!("Failed: {}", report.failed());
    if report.cancelled() > 0 {
        println!("Cancelled: {}", report.cancelled());
    }
    Ok(())
}

fn export(
    config: &PipelineConfig,
    triples: &Path,
    format: ExportFormat,
    output: Option<PathBuf>,
    context: Option<&Path>,
) -> anyhow::Result<()> {
    let mapped: MappedTriples = read_json(triples)?;
    let text_triples: Vec<TextTriple> = mapped.triples.iter().map(|t| t.to_text_triple()).collect();
    let path = output.unwrap_or_else(|| config.export.output_dir.join(format.default_file_name()));

    let written = match format {
        ExportFormat::Rdf => RdfExporter::from_config(&config.export).export(&text_triples, &path)?,
        ExportFormat::JsonLd => {
            let exporter = match context {
                Some(context) => JsonLdExporter::with_context(read_json(context)?),
                None => JsonLdExporter::from_config(&config.export),
            };
            exporter.export(&text_triples, &path)?
        }
    };

    info!(triples = text_triples.len(), "Export finished");
    println!("Saved to {}", written.display());
    Ok(())
}

fn validate_annotations(config: &PipelineConfig, input: &Path) -> anyhow::Result<()> {
    let registry = load_registry(config)?;
    let documents: Vec<AnnotatedDocument> = read_json(input)?;

    let issues = AnnotationValidator::new(registry).validate(&documents);
    if issues.is_empty() {
        println!("All {} annotated documents are valid", documents.len());
        return Ok(());
    }

    for issue in &issues {
        println!("  {issue}");
    }
    bail!("{} annotation issues found", issues.len())
}

async fn query(config: &PipelineConfig, text: &str) -> anyhow::Result<()> {
    let store = sentinel_graph::connect(&config.graph).await?;
    let rows = store.query(text).await?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
