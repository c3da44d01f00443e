//! vlsi-cli: operations on the document collection
//!
//! # Subcommands
//! - `inspect [--url] [--collection] [--samples N] [--query Q] [--embedding-model M]`
//!   shows collection status, sample points and an optional test search
//! - `ingest [--source FILE] [--collection NAME]` embeds a JSONL file into the collection
//! - `verify [--source FILE] [--documents-dir DIR] [--collection NAME]` reconciles
//!   the JSONL file against the stored payload texts

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use vlsi_core::{
    EmbeddingBackend, OpenAiEmbeddingClient, OpenAiEmbeddingConfig, QdrantVectorStore,
    VectorStore, VlsiConfig,
};
use vlsi_ingest::{load_records, IngestOptions, Ingestor, Verifier, VerifyOptions};

const DEFAULT_SAMPLES: u32 = 10;
const TEST_QUERY_LIMIT: u64 = 3;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "vlsi-cli", version, about = "VLSI RAG collection tooling")]
struct Cli {
    /// Config file (TOML); missing file means defaults
    #[arg(short, long, env = "VLSI_CONFIG", default_value = "vlsi-rag.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show collection status, sample points and an optional test search
    Inspect {
        /// Qdrant server URL
        #[arg(long)]
        url: Option<String>,

        /// Collection to inspect
        #[arg(long)]
        collection: Option<String>,

        /// Number of sample points to print
        #[arg(long, default_value_t = DEFAULT_SAMPLES)]
        samples: u32,

        /// Optional test query to run against the collection
        #[arg(long)]
        query: Option<String>,

        /// Embedding model for the test query
        #[arg(long)]
        embedding_model: Option<String>,
    },

    /// Embed a JSONL file into the collection
    Ingest {
        #[arg(long)]
        source: Option<PathBuf>,

        #[arg(long)]
        collection: Option<String>,
    },

    /// Compare a JSONL file with the collection's stored texts
    Verify {
        #[arg(long)]
        source: Option<PathBuf>,

        /// Directory of original documents to count
        #[arg(long)]
        documents_dir: Option<PathBuf>,

        #[arg(long)]
        collection: Option<String>,
    },
}

// ============================================================================
// inspect
// ============================================================================

/// Writes the inspection report for `collection` to `out`. The test query
/// is skipped when no embedder is available.
async fn inspect(
    store: &dyn VectorStore,
    embedder: Option<&dyn EmbeddingBackend>,
    collection: &str,
    samples: u32,
    query: Option<&str>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let Some(info) = store.collection_info(collection).await? else {
        writeln!(out, "Collection '{}' not found.", collection)?;
        return Ok(());
    };

    writeln!(out, "Collection '{}' found.", collection)?;
    writeln!(out, "  Status: {}", info.status)?;
    writeln!(out, "  Points count: {}", info.points_count)?;
    writeln!(out, "  Indexed vectors count: {}", info.indexed_vectors_count)?;
    writeln!(out, "  Segments count: {}", info.segments_count)?;
    if let Some(dim) = info.vector_dimension {
        writeln!(out, "  Vector size: {}", dim)?;
    }

    if info.points_count == 0 {
        writeln!(out, "The collection is empty. No documents have been ingested into it.")?;
        return Ok(());
    }

    writeln!(out, "\n--- Sample Points (first {}) ---", samples)?;
    let page = store.scroll(collection, samples, None).await?;
    for (i, point) in page.points.iter().enumerate() {
        writeln!(out, "\nPoint {}:", i + 1)?;
        writeln!(out, "  ID: {}", point.id)?;
        writeln!(out, "  Payload: {}", serde_json::Value::Object(point.payload.clone()))?;
    }

    if let Some(query) = query {
        writeln!(out, "\n--- Test Query ---")?;
        writeln!(out, "Query: '{}'", query)?;
        let Some(embedder) = embedder else {
            writeln!(out, "Cannot run the test query without an OpenAI API key.")?;
            return Ok(());
        };
        let vector = embedder.embed_query(query).await?;
        let hits = store.search(collection, vector, TEST_QUERY_LIMIT, None).await?;
        if hits.is_empty() {
            writeln!(out, "No results found for the test query.")?;
        }
        for (i, hit) in hits.iter().enumerate() {
            writeln!(out, "\nResult {}:", i + 1)?;
            writeln!(out, "  ID: {}", hit.id)?;
            writeln!(out, "  Score: {:.4}", hit.score)?;
            writeln!(out, "  Payload: {}", serde_json::Value::Object(hit.payload.clone()))?;
        }
    }
    Ok(())
}

async fn do_inspect(
    mut config: VlsiConfig,
    url: Option<String>,
    collection: Option<String>,
    samples: u32,
    query: Option<String>,
    embedding_model: Option<String>,
) -> anyhow::Result<()> {
    if let Some(url) = url {
        config.vector_store.url = url;
    }
    if let Some(collection) = collection {
        config.vector_store.collection = collection;
    }

    println!("--- Inspecting Collection ---");
    println!("URL: {}", config.vector_store.url);
    println!("Collection: {}\n", config.vector_store.collection);

    let store = QdrantVectorStore::from_config(&config)?;
    let embedder = match OpenAiEmbeddingClient::new(OpenAiEmbeddingConfig::from_config(
        &config,
        embedding_model.as_deref(),
    )) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::debug!(error = %e, "Embedding client unavailable");
            None
        }
    };

    let mut stdout = std::io::stdout().lock();
    inspect(
        &store,
        embedder.as_ref().map(|e| e as &dyn EmbeddingBackend),
        &config.vector_store.collection,
        samples,
        query.as_deref(),
        &mut stdout,
    )
    .await?;
    writeln!(stdout, "\n--- Inspection Complete ---")?;
    Ok(())
}

// ============================================================================
// ingest / verify
// ============================================================================

async fn do_ingest(
    mut config: VlsiConfig,
    source: Option<PathBuf>,
    collection: Option<String>,
) -> anyhow::Result<()> {
    if let Some(collection) = collection {
        config.vector_store.collection = collection;
    }
    let source = source.unwrap_or_else(|| config.ingest.source_path());

    // Credentials first, so a missing key stops before the store is touched.
    let embedder = OpenAiEmbeddingClient::new(OpenAiEmbeddingConfig::from_config(&config, None))?;
    let store = QdrantVectorStore::from_config(&config)?;

    let loaded = load_records(&source)?;
    if loaded.records.is_empty() {
        println!("No items loaded from {}. Aborting.", source.display());
        return Ok(());
    }

    let options = IngestOptions::from_config(&config);
    let report = Ingestor::new(&embedder, &store, options)
        .run(loaded.texts())
        .await?;

    println!(
        "Ingestion complete. Successfully processed {} / {} items.",
        report.upserted, report.parsed
    );
    if loaded.malformed > 0 {
        println!("Skipped {} malformed lines.", loaded.malformed);
    }
    if report.skipped_zero > 0 {
        println!("Skipped {} items whose embedding failed.", report.skipped_zero);
    }
    if report.failed_upserts > 0 {
        println!("{} items were in rejected upsert batches.", report.failed_upserts);
    }
    if let Some(count) = report.final_point_count {
        println!(
            "Collection '{}' now has {} points",
            config.vector_store.collection, count
        );
    }
    Ok(())
}

async fn do_verify(
    mut config: VlsiConfig,
    source: Option<PathBuf>,
    documents_dir: Option<PathBuf>,
    collection: Option<String>,
) -> anyhow::Result<()> {
    if let Some(collection) = collection {
        config.vector_store.collection = collection;
    }
    let source = source.unwrap_or_else(|| config.ingest.source_path());
    let documents_dir = documents_dir.or_else(|| config.ingest.documents_dir());

    let store = QdrantVectorStore::from_config(&config)?;
    let report = Verifier::new(&store, VerifyOptions::from_config(&config))
        .run(&source, documents_dir.as_deref())
        .await?;

    println!("--- Starting Data Verification ---\n");
    print!("{}", report);
    println!("\n--- Verification Complete ---");
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match VlsiConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("vlsi-cli: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Inspect {
            url,
            collection,
            samples,
            query,
            embedding_model,
        } => do_inspect(config, url, collection, samples, query, embedding_model).await,
        Commands::Ingest { source, collection } => do_ingest(config, source, collection).await,
        Commands::Verify {
            source,
            documents_dir,
            collection,
        } => do_verify(config, source, documents_dir, collection).await,
    };

    if let Err(e) = result {
        eprintln!("vlsi-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
