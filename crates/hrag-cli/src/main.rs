//! hrag CLI
//!
//! Operator commands for indexing reports and querying them from a terminal.
//! Daily limits are reported but not enforced here.
//!
//! Author: hephaex@gmail.com

mod context;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use hrag_core::{Namespace, RetrievedChunk};
use hrag_rag::pdf_filename;
use hrag_vector::VectorStore;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use context::CliContext;

#[derive(Parser, Debug)]
#[command(name = "hrag")]
#[command(about = "Per-user PDF report indexing and question answering", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML); environment variables still override it
    #[arg(short, long, global = true, env = "HRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a PDF report into a user's namespace
    Ingest {
        #[arg(short, long)]
        user: String,

        /// PDF file to index
        file: PathBuf,
    },

    /// Ask a question against a user's reports
    Query {
        #[arg(short, long)]
        user: String,

        question: String,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// List a user's indexed reports
    Documents {
        #[arg(short, long)]
        user: String,
    },

    /// Print a user's chunks in document order
    Chunks {
        #[arg(short, long)]
        user: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete every chunk a user owns
    Clear {
        #[arg(short, long)]
        user: String,
    },

    /// Drop and recreate the whole index
    ClearAll {
        /// Confirm deletion of all users' data
        #[arg(long)]
        yes: bool,
    },

    /// Create the index if it does not exist
    EnsureIndex,

    /// Show today's usage for a user
    Usage {
        #[arg(short, long)]
        user: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hrag=debug,hrag_rag=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = CliContext::load(cli.config.as_deref())?;
    run(&ctx, cli.command, cli.json).await
}

async fn run(ctx: &CliContext, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Ingest { user, file } => ingest(ctx, &user, &file, json).await,
        Commands::Query {
            user,
            question,
            stream,
        } => query(ctx, &user, &question, stream, json).await,
        Commands::Documents { user } => {
            let namespace = Namespace::parse(&user)?;
            let documents = ctx.store.list_documents(&namespace).await?;
            if json {
                return print_json(&documents);
            }
            if documents.is_empty() {
                println!("No documents for {namespace}");
            }
            for doc in documents {
                let when = doc
                    .ingested_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<40} {:>6} chunks  {when}", doc.source, doc.chunk_count);
            }
            Ok(())
        }
        Commands::Chunks { user, limit } => {
            let namespace = Namespace::parse(&user)?;
            let limit = limit.min(ctx.config.vector.max_namespace_chunks);
            let chunks = user_chunks(ctx.store.as_ref(), &namespace, limit).await?;
            if json {
                return print_json(&chunks);
            }
            for chunk in chunks {
                println!("--- {} #{} @{}", chunk.source, chunk.chunk_index, chunk.start_index);
                println!("{}", chunk.text);
            }
            Ok(())
        }
        Commands::Clear { user } => {
            let namespace = Namespace::parse(&user)?;
            let deleted = ctx.store.delete_namespace(&namespace).await?;
            tracing::info!(user = %namespace, deleted, "User index deleted");
            println!("Deleted {deleted} chunks for {namespace}");
            Ok(())
        }
        Commands::ClearAll { yes } => {
            if !yes {
                bail!("clear-all deletes every user's documents; pass --yes to confirm");
            }
            ctx.store.clear_index().await?;
            println!("All data deleted");
            Ok(())
        }
        Commands::EnsureIndex => {
            ctx.store.ensure_index().await?;
            println!("Index is ready");
            Ok(())
        }
        Commands::Usage { user } => {
            let namespace = Namespace::parse(&user)?;
            let usage = ctx.quota().await?.usage(&namespace).await?;
            if json {
                return print_json(&usage);
            }
            println!("uploads: {}/{}", usage.uploads_used, usage.uploads_limit);
            println!("queries: {}/{}", usage.queries_used, usage.queries_limit);
            Ok(())
        }
    }
}

async fn ingest(ctx: &CliContext, user: &str, file: &Path, json: bool) -> anyhow::Result<()> {
    let namespace = Namespace::parse(user)?;
    let filename = pdf_filename(file.file_name().and_then(|n| n.to_str()))?;
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }

    let pipeline = ctx.pipeline()?;
    let report = pipeline
        .ingest(&namespace, file, &filename)
        .await
        .with_context(|| format!("Failed to index {}", file.display()))?;

    if json {
        return print_json(&report);
    }
    println!(
        "Indexed {} for {namespace}: {} pages, {} chunks{} ({} ms)",
        report.filename,
        report.pages,
        report.chunk_count,
        if report.ocr_applied { ", OCR" } else { "" },
        report.processing_time_ms
    );
    Ok(())
}

async fn query(
    ctx: &CliContext,
    user: &str,
    question: &str,
    stream: bool,
    json: bool,
) -> anyhow::Result<()> {
    let namespace = Namespace::parse(user)?;
    let agent = ctx.agent()?;

    if stream && !json {
        let mut answer = agent.answer_stream(&namespace, question).await?;
        let mut stdout = std::io::stdout();
        while let Some(fragment) = answer.stream.next().await {
            write!(stdout, "{}", fragment?)?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
        println!("\nSources: {}", answer.sources.join(", "));
        return Ok(());
    }

    let answer = agent.answer(&namespace, question).await?;
    if json {
        return print_json(&answer);
    }
    println!("{}", answer.answer);
    println!("\nSources: {}", answer.sources.join(", "));
    Ok(())
}

/// First `limit` chunks of a user's documents, in document order.
///
/// Reads the index only, so no embedder or LLM has to be configured.
async fn user_chunks(
    store: &dyn VectorStore,
    namespace: &Namespace,
    limit: usize,
) -> anyhow::Result<Vec<RetrievedChunk>> {
    store
        .namespace_chunks(namespace, limit)
        .await
        .with_context(|| format!("Failed to read chunks for {namespace}"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
