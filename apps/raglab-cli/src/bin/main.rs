use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use raglab_core::chunking::ChunkingEngine;
use raglab_core::config::{Config, RetrievalConfig, Settings};
use raglab_core::error::Error;
use raglab_core::loader::DocumentLoader;
use raglab_core::traits::{CollectionStore, ExperimentLog};
use raglab_core::types::{ChunkParams, ChunkingMethod, RetrievalMethod};
use raglab_embed::EmbeddingHandle;
use raglab_hybrid::{IngestPipeline, RetrievalOrchestrator, SearchRequest};
use raglab_vector::LanceStore;

#[derive(Parser)]
#[command(name = "raglab", version, about = "Chunk, embed and compare retrieval methods over local documents")]
struct Cli {
    /// Directory holding config.toml / config.<env>.toml
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    /// Store location, overriding store.uri
    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk and embed files into one collection per file and method
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(short, long = "method")]
        methods: Vec<ChunkingMethod>,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Preview how a file would be chunked, without embedding or storing
    Chunk {
        path: PathBuf,
        #[arg(short, long, default_value = "recursive")]
        method: ChunkingMethod,
        #[command(flatten)]
        params: ParamArgs,
        /// Chunks to print
        #[arg(long, default_value_t = 5)]
        show: usize,
    },
    /// Query stored collections
    Search {
        query: String,
        /// Collection ids; all collections when omitted
        #[arg(short, long = "collection")]
        collections: Vec<String>,
        #[arg(short, long = "method")]
        methods: Vec<RetrievalMethod>,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// List stored collections
    Collections,
    /// Delete one collection
    Delete { id: String },
    /// Delete every collection
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Show the ingestion log
    Experiments,
}

#[derive(Args, Clone, Copy)]
struct ParamArgs {
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long)]
    overlap: Option<usize>,
    #[arg(long)]
    token_count: Option<usize>,
    #[arg(long)]
    sentence_count: Option<usize>,
}

impl ParamArgs {
    /// Command-line values win over configured ones.
    fn over(self, base: ChunkParams) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size.or(base.chunk_size),
            overlap: self.overlap.or(base.overlap),
            token_count: self.token_count.or(base.token_count),
            sentence_count: self.sentence_count.or(base.sentence_count),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        match e.downcast_ref::<Error>() {
            Some(err) => {
                eprintln!("error: {}", err.user_message());
                if let Some(detail) = err.detail() {
                    eprintln!("  detail: {detail}");
                }
            }
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let env_name = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = Config::load_from(&cli.config_dir, &env_name)?;
    let settings = config.settings()?;
    let store = open_store(&settings, &cli.config_dir, cli.store.as_deref());
    debug!(env = config.env_name(), store = store.uri(), "configuration loaded");

    match cli.command {
        Command::Ingest { paths, methods, params } => {
            let docs = DocumentLoader::new().load_paths(&paths)?;
            let methods = if methods.is_empty() { settings.chunking.methods.clone() } else { methods };
            let engine = ChunkingEngine::new(params.over(settings.chunking.params));
            let handle = EmbeddingHandle::from_settings(settings.embedding.clone());
            let report = IngestPipeline::new(engine, &handle).with_progress(true).run(&docs, &methods, &store, &store).await?;
            for c in &report.collections {
                println!("{}  {}  ({} chunks, avg {:.0} chars)", c.id, c.name, c.stats.count, c.stats.avg_size);
            }
            println!(
                "Ingested {} file(s) into {} collection(s) in {} ms",
                report.experiment.files_processed.len(),
                report.collections.len(),
                report.experiment.processing_time_ms
            );
        }
        Command::Chunk { path, method, params, show } => {
            let doc = DocumentLoader::new().load_file(&path)?;
            let out = ChunkingEngine::new(params.over(settings.chunking.params)).chunk(&doc.text, method);
            println!(
                "{} · {}: {} chunks, avg {:.1} chars, ~{:.1} tokens",
                doc.file_name,
                method.label(),
                out.stats.count,
                out.stats.avg_size,
                out.stats.avg_tokens
            );
            for (i, text) in out.chunks.iter().take(show).enumerate() {
                println!("--- chunk {i} ({} chars)\n{text}", text.chars().count());
            }
        }
        Command::Search { query, collections, methods, top_k } => {
            let config = RetrievalConfig::new(
                if methods.is_empty() { settings.retrieval.methods.clone() } else { methods },
                top_k.unwrap_or(settings.retrieval.top_k),
            );
            let collection_ids = if collections.is_empty() {
                store.get_all().await?.into_iter().map(|c| c.id).collect()
            } else {
                collections
            };
            let orch = RetrievalOrchestrator::new(EmbeddingHandle::from_settings(settings.embedding.clone()));
            let resp = orch.search(&store, SearchRequest { query, collection_ids, config }).await?;
            if resp.results.is_empty() {
                println!("No results.");
            }
            for (rank, r) in resp.results.iter().enumerate() {
                println!(
                    "{:>2}. [{:<6}] {:.4}  {} #{}\n    {}",
                    rank + 1,
                    r.retrieval_method,
                    r.score,
                    r.collection_name,
                    r.chunk.index,
                    preview(&r.chunk.text, 160)
                );
            }
        }
        Command::Collections => {
            let all = store.get_all().await?;
            if all.is_empty() {
                println!("No collections.");
            }
            for c in &all {
                println!(
                    "{}  {}  {} chunks  dim {}  ~{:.1} KB  {}",
                    c.id,
                    c.name,
                    c.chunk_count,
                    c.dim().unwrap_or(0),
                    c.estimated_size_bytes() / 1024.0,
                    c.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Delete { id } => {
            store.delete(&id).await?;
            println!("Deleted {id}");
        }
        Command::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to delete every collection without --yes");
            }
            store.clear().await?;
            println!("All collections deleted");
        }
        Command::Experiments => {
            for e in store.list().await? {
                let counts: Vec<String> = e.chunk_counts.iter().map(|(m, n)| format!("{m}={n}")).collect();
                println!(
                    "{}  {}  files: {}  chunks: {}  {} ms",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.id,
                    e.files_processed.iter().cloned().collect::<Vec<_>>().join(", "),
                    counts.join(" "),
                    e.processing_time_ms
                );
            }
        }
    }
    Ok(())
}

fn open_store(settings: &Settings, base: &Path, override_uri: Option<&str>) -> LanceStore {
    let path = match override_uri {
        Some(uri) => raglab_core::config::resolve_with_base(base, uri),
        None => settings.store.resolved_path(base),
    };
    LanceStore::new(path.to_string_lossy().to_string())
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{cut}…")
}
