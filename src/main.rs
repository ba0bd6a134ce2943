//! # KB Search CLI (`kbs`)
//!
//! The `kbs` binary is the thin request-handling surface over the engine:
//! every subcommand authenticates nothing (the `--user` flag stands in for
//! the session user an HTTP layer would supply), constructs the SQLite
//! store and the configured embedding provider, and invokes exactly one
//! core operation.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbs init` | Create the SQLite database and run schema migrations |
//! | `kbs kb create <name>` | Create a knowledge base |
//! | `kbs kb list` | List the caller's knowledge bases with counts |
//! | `kbs kb delete <id>` | Delete a knowledge base and everything in it |
//! | `kbs ingest <file>` | Parse, chunk, embed, and store a document |
//! | `kbs search "<query>"` | Rank a knowledge base's chunks against a query |
//! | `kbs docs list` | List documents with processing status |
//! | `kbs docs delete <id>` | Delete one document and its chunks |
//! | `kbs stats` | Aggregate counters for a knowledge base |
//! | `kbs history` | Recent searches, newest first |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use kb_search::config::{load_config, Config};
use kb_search::db;
use kb_search::embedding::{create_provider, EmbeddingProvider};
use kb_search::engine::SemanticSearchEngine;
use kb_search::ingest::IngestionOrchestrator;
use kb_search::migrate;
use kb_search::store::sqlite::SqliteStore;
use kb_search::store::KnowledgeBaseStore;

/// KB Search — knowledge-base ingestion and semantic search for
/// conversational agents.
#[derive(Parser)]
#[command(
    name = "kbs",
    about = "KB Search — knowledge-base ingestion and semantic search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbs.toml")]
    config: PathBuf,

    /// Acting user id. Stands in for the authenticated session user.
    #[arg(long, global = true, default_value = "local")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Manage knowledge bases.
    Kb {
        #[command(subcommand)]
        command: KbCommands,
    },

    /// Ingest a document into a knowledge base.
    Ingest {
        /// Target knowledge base id.
        #[arg(long)]
        kb: String,

        /// File to ingest.
        file: PathBuf,

        /// Declared file type (pdf, docx, doc, txt, md, ...). Defaults to
        /// the file extension; unrecognized types are treated as text.
        #[arg(long)]
        file_type: Option<String>,
    },

    /// Semantic search within one knowledge base.
    Search {
        /// Target knowledge base id.
        #[arg(long)]
        kb: String,

        /// Natural-language query.
        query: String,

        /// Maximum results to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Manage documents inside a knowledge base.
    Docs {
        #[command(subcommand)]
        command: DocCommands,
    },

    /// Aggregate counters for a knowledge base.
    Stats {
        #[arg(long)]
        kb: String,
    },

    /// Recent searches, newest first.
    History {
        #[arg(long)]
        kb: String,

        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum KbCommands {
    /// Create a knowledge base.
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List the caller's knowledge bases.
    List,
    /// Delete a knowledge base and all of its documents, chunks, and history.
    Delete { id: String },
}

#[derive(Subcommand)]
enum DocCommands {
    /// List documents with processing status and chunk counts.
    List {
        #[arg(long)]
        kb: String,
    },
    /// Delete one document and its chunks.
    Delete {
        #[arg(long)]
        kb: String,
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Kb { command } => match command {
            KbCommands::Create { name, description } => {
                run_kb_create(&config, &cli.user, &name, description.as_deref()).await
            }
            KbCommands::List => run_kb_list(&config, &cli.user).await,
            KbCommands::Delete { id } => run_kb_delete(&config, &cli.user, &id).await,
        },
        Commands::Ingest {
            kb,
            file,
            file_type,
        } => run_ingest(&config, &cli.user, &kb, &file, file_type.as_deref()).await,
        Commands::Search { kb, query, top_k } => {
            run_search(&config, &cli.user, &kb, &query, top_k).await
        }
        Commands::Docs { command } => match command {
            DocCommands::List { kb } => run_docs_list(&config, &cli.user, &kb).await,
            DocCommands::Delete { kb, id } => run_doc_delete(&config, &cli.user, &kb, &id).await,
        },
        Commands::Stats { kb } => run_stats(&config, &cli.user, &kb).await,
        Commands::History { kb, limit } => run_history(&config, &cli.user, &kb, limit).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = db::connect(&config.db).await?;
    Ok(Arc::new(SqliteStore::new(pool)))
}

fn provider_for(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::from(create_provider(&config.embedding)?))
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn run_kb_create(
    config: &Config,
    user: &str,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    let store = open_store(config).await?;
    let kb = store.create_knowledge_base(user, name, description).await?;
    println!("created knowledge base");
    println!("  id:   {}", kb.id);
    println!("  name: {}", kb.name);
    Ok(())
}

async fn run_kb_list(config: &Config, user: &str) -> Result<()> {
    let store = open_store(config).await?;
    let kbs = store.list_knowledge_bases(user).await?;

    if kbs.is_empty() {
        println!("No knowledge bases.");
        return Ok(());
    }

    println!(
        "{:<38} {:>6} {:>8}   {}",
        "ID", "DOCS", "CHUNKS", "NAME"
    );
    println!("{}", "-".repeat(76));
    for kb in kbs {
        println!(
            "{:<38} {:>6} {:>8}   {}",
            kb.id, kb.document_count, kb.chunk_count, kb.name
        );
    }
    Ok(())
}

async fn run_kb_delete(config: &Config, user: &str, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    store.delete_knowledge_base(id, user).await?;
    println!("deleted knowledge base {}", id);
    Ok(())
}

async fn run_ingest(
    config: &Config,
    user: &str,
    kb_id: &str,
    file: &PathBuf,
    file_type: Option<&str>,
) -> Result<()> {
    let bytes = tokio::fs::read(file).await?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let declared_type = file_type
        .map(|t| t.to_string())
        .or_else(|| {
            file.extension()
                .map(|ext| ext.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "txt".to_string());

    let store = open_store(config).await?;
    let provider = provider_for(config)?;
    let orchestrator = IngestionOrchestrator::new(
        store,
        provider,
        config.chunking.clone(),
        config.embedding.batch_size,
    );

    let summary = orchestrator
        .ingest(kb_id, user, &bytes, &filename, &declared_type)
        .await?;

    println!("ingest {}", summary.filename);
    println!("  document: {}", summary.document_id);
    println!("  chunks:   {}", summary.chunk_count);
    println!("  tokens:   {}", summary.token_count);
    println!("ok");
    Ok(())
}

async fn run_search(
    config: &Config,
    user: &str,
    kb_id: &str,
    query: &str,
    top_k: Option<usize>,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let store = open_store(config).await?;
    let provider = provider_for(config)?;
    let engine = SemanticSearchEngine::new(store, provider);

    let top_k = top_k.unwrap_or(config.search.top_k);
    let hits = engine.search(kb_id, user, query, top_k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.3}] {}", i + 1, hit.similarity, hit.filename);
        println!("    excerpt: \"{}\"", excerpt(&hit.text, 240));
        println!("    chunk: {}", hit.chunk_id);
        println!();
    }
    Ok(())
}

async fn run_docs_list(config: &Config, user: &str, kb_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let docs = store.list_documents(kb_id, user).await?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!(
        "{:<38} {:>8} {:>8} {:>10}   {}",
        "ID", "CHUNKS", "SIZE", "STATUS", "FILENAME"
    );
    println!("{}", "-".repeat(86));
    for doc in docs {
        let status = if doc.processed { "ok" } else { "failed" };
        println!(
            "{:<38} {:>8} {:>8} {:>10}   {}",
            doc.id,
            doc.chunk_count,
            format_bytes(doc.file_size as u64),
            status,
            doc.filename
        );
        if let Some(reason) = doc.processing_error {
            println!("    error: {}", reason);
        }
    }
    Ok(())
}

async fn run_doc_delete(config: &Config, user: &str, kb_id: &str, doc_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    store.delete_document(doc_id, kb_id, user).await?;
    println!("deleted document {}", doc_id);
    Ok(())
}

async fn run_stats(config: &Config, user: &str, kb_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats(kb_id, user).await?;

    println!("Knowledge Base Stats");
    println!("====================");
    println!();
    println!("  Documents:  {}", stats.document_count);
    println!("  Chunks:     {}", stats.chunk_count);
    println!("  Size:       {}", format_bytes(stats.total_bytes as u64));
    println!("  Searches:   {}", stats.search_count);
    println!("  Searchers:  {}", stats.distinct_searchers);
    Ok(())
}

async fn run_history(config: &Config, user: &str, kb_id: &str, limit: Option<usize>) -> Result<()> {
    let store = open_store(config).await?;
    let limit = limit.unwrap_or(config.search.history_limit);
    let entries = store.search_history(kb_id, user, limit).await?;

    if entries.is_empty() {
        println!("No searches yet.");
        return Ok(());
    }

    for entry in entries {
        let date = chrono::DateTime::from_timestamp(entry.searched_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{}  ({} results)  \"{}\"",
            date, entry.result_count, entry.query
        );
    }
    Ok(())
}

/// Shorten chunk text for terminal display.
fn excerpt(text: &str, max_chars: usize) -> String {
    let shortened: String = text.chars().take(max_chars).collect();
    if shortened.len() < text.len() {
        format!("{}...", shortened)
    } else {
        shortened
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
