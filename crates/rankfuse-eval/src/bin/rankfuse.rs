//! rankfuse: hybrid retrieval evaluation from the command line.
//!
//! Usage:
//!   rankfuse run --models nomic-embed-text:v1.5 --modes text,hybrid --rrf-weights 1:1 2:1
//!   rankfuse metrics --rankings evaluations/out/2025-01-10T09-30-00/rankings.jsonl --per-query
//!   rankfuse search hybrid "猫の飼い方" --model nomic-embed-text:v1.5
//!   rankfuse embed --model nomic-embed-text:v1.5 --batch-size 16
//!   rankfuse add-document --title "猫" --body "猫の飼い方について"

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rankfuse_core::defaults;
use rankfuse_db::{Database, NewDocument, PendingFilter, PoolConfig};
use rankfuse_eval::{
    compute, read_rankings, write_report, EmbeddingBackend, EmbeddingModel, FusionWeights,
    JudgmentSet, ModelRegistry, RetrievalMode, Runner, Signal, SweepConfig,
};
use rankfuse_inference::{OllamaBackend, OllamaConfig};
use rankfuse_search::fuse_text_vector;

#[derive(Parser)]
#[command(name = "rankfuse")]
#[command(author, version, about = "Hybrid retrieval fusion and evaluation")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evaluation sweep and write rankings.jsonl + run_config.json
    Run(RunArgs),

    /// Compute recall@k, MRR and nDCG@k from a rankings.jsonl
    Metrics(MetricsArgs),

    /// Search once and print the ranked documents
    Search(SearchArgs),

    /// Embed documents that lack an embedding for a model
    Embed(EmbedArgs),

    /// Insert one document and store its embedding
    AddDocument(AddDocumentArgs),
}

#[derive(Args)]
struct DatabaseArgs {
    /// PostgreSQL DSN
    #[arg(long = "dsn", env = "DATABASE_URL", default_value = defaults::DATABASE_URL)]
    database_url: String,
}

#[derive(Args)]
struct OllamaArgs {
    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = defaults::OLLAMA_URL)]
    ollama_url: String,
}

impl OllamaArgs {
    fn backend(&self) -> anyhow::Result<OllamaBackend> {
        let timeout = OllamaConfig::from_env().timeout;
        Ok(OllamaBackend::new(
            OllamaConfig::new(&self.ollama_url).timeout(timeout),
        )?)
    }
}

#[derive(Args)]
struct RunArgs {
    /// Query + judgment file
    #[arg(long, default_value = defaults::DATA_PATH)]
    data: PathBuf,

    /// Only run these query slugs
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Embedding models (default: the standard evaluation set)
    #[arg(long, value_delimiter = ',')]
    models: Vec<String>,

    /// Retrieval modes, comma separated
    #[arg(long, default_value = "text,vector,hybrid")]
    modes: String,

    /// Hybrid weight sets as text:vector, e.g. 1:1 2:1
    #[arg(long, num_args = 1..)]
    rrf_weights: Vec<String>,

    /// Docset (documents.source) to search
    #[arg(long, default_value = defaults::DOCSET)]
    docset: String,

    /// RRF constant k
    #[arg(long, default_value_t = defaults::RRF_K)]
    rrf_k: u32,

    /// Results kept per record
    #[arg(long, default_value_t = defaults::RESULT_LIMIT)]
    limit: usize,

    /// Candidates requested from PGroonga
    #[arg(long, alias = "text-limit", default_value_t = defaults::TEXT_LIMIT)]
    text_k: usize,

    /// Candidates requested from pgvector
    #[arg(long, alias = "vector-limit", default_value_t = defaults::VECTOR_LIMIT)]
    vec_k: usize,

    /// Quote queries so PGroonga query syntax is not applied
    #[arg(long)]
    literal_text: bool,

    /// Maximum in-flight search/embedding requests
    #[arg(long, default_value_t = defaults::SWEEP_CONCURRENCY)]
    concurrency: usize,

    /// Metric cutoffs recorded for the metrics step
    #[arg(long = "k", num_args = 1.., default_values_t = defaults::METRIC_KS.to_vec())]
    ks: Vec<usize>,

    /// Root directory for run directories
    #[arg(long, default_value = defaults::OUTPUT_ROOT)]
    outdir: PathBuf,

    #[command(flatten)]
    db: DatabaseArgs,

    #[command(flatten)]
    ollama: OllamaArgs,
}

#[derive(Args)]
struct MetricsArgs {
    /// Query + judgment file
    #[arg(long, default_value = defaults::DATA_PATH)]
    data: PathBuf,

    /// rankings.jsonl produced by `rankfuse run`
    #[arg(long)]
    rankings: PathBuf,

    /// Cutoffs for recall@k and nDCG@k
    #[arg(long = "k", num_args = 1.., default_values_t = defaults::METRIC_KS.to_vec())]
    ks: Vec<usize>,

    /// Include per-query metrics in metrics.json
    #[arg(long)]
    per_query: bool,

    /// Output directory (default: next to the rankings file)
    #[arg(long)]
    outdir: Option<PathBuf>,
}

#[derive(Args)]
struct SearchArgs {
    /// text, vector or hybrid
    mode: RetrievalMode,

    /// Query text
    query: String,

    /// Rows to print
    #[arg(long, default_value_t = defaults::SEARCH_LIMIT)]
    limit: usize,

    /// Restrict to one docset (default: all documents)
    #[arg(long)]
    docset: Option<String>,

    /// Embedding model for vector and hybrid search
    #[arg(long, default_value = defaults::EMBED_MODEL)]
    model: String,

    /// Treat the query as a literal string for PGroonga
    #[arg(long)]
    literal: bool,

    /// Candidates from PGroonga (hybrid)
    #[arg(long, default_value_t = defaults::TEXT_LIMIT)]
    text_k: usize,

    /// Candidates from pgvector (hybrid)
    #[arg(long, default_value_t = defaults::VECTOR_LIMIT)]
    vec_k: usize,

    /// RRF constant k (hybrid)
    #[arg(long, default_value_t = defaults::RRF_K)]
    rrf_k: u32,

    /// Fusion weights as text:vector (hybrid)
    #[arg(long, default_value = "1:1")]
    weights: String,

    #[command(flatten)]
    db: DatabaseArgs,

    #[command(flatten)]
    ollama: OllamaArgs,
}

#[derive(Args)]
struct EmbedArgs {
    /// Ollama embedding model name
    #[arg(long, default_value = defaults::EMBED_MODEL)]
    model: String,

    /// Documents per /api/embed request
    #[arg(long, default_value_t = defaults::EMBED_BATCH_SIZE)]
    batch_size: usize,

    /// Embed at most this many documents (0 = all)
    #[arg(long)]
    limit: Option<usize>,

    /// Only documents in this docset
    #[arg(long)]
    docset: Option<String>,

    /// Re-embed even if an embedding already exists for the model
    #[arg(long)]
    force: bool,

    #[command(flatten)]
    db: DatabaseArgs,

    #[command(flatten)]
    ollama: OllamaArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedField {
    /// Title and body joined by a newline
    Content,
    /// Body only
    Body,
}

#[derive(Args)]
struct AddDocumentArgs {
    #[arg(long)]
    title: String,

    #[arg(long)]
    body: String,

    /// Docset (documents.source)
    #[arg(long, default_value = defaults::DOCUMENT_SOURCE)]
    source: String,

    /// Embedding model
    #[arg(long, default_value = defaults::EMBED_MODEL)]
    model: String,

    /// What to embed
    #[arg(long, value_enum, default_value_t = EmbedField::Content)]
    embed_field: EmbedField,

    #[command(flatten)]
    db: DatabaseArgs,

    #[command(flatten)]
    ollama: OllamaArgs,
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   RUST_LOG    - standard env filter
///
/// Logs go to stderr so stdout carries only command output.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "rankfuse=info,rankfuse_eval=info,rankfuse_db=info,rankfuse_inference=info,rankfuse_search=warn"
            .into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("rankfuse.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        None
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Metrics(args) => cmd_metrics(args).await,
        Commands::Search(args) => cmd_search(args).await,
        Commands::Embed(args) => cmd_embed(args).await,
        Commands::AddDocument(args) => cmd_add_document(args).await,
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let judgments = JudgmentSet::load(&args.data)?;
    let queries = judgments.select(args.only.as_slice())?;
    let modes = RetrievalMode::parse_list(&args.modes)?;
    let weight_sets = FusionWeights::parse_list(args.rrf_weights.as_slice())?;

    let mut config = SweepConfig::new(queries)
        .modes(modes)
        .weight_sets(weight_sets)
        .docset(&args.docset)
        .rrf_k(args.rrf_k)
        .limit(args.limit)
        .text_limit(args.text_k)
        .vector_limit(args.vec_k)
        .literal_text(args.literal_text)
        .concurrency(args.concurrency)
        .ks(args.ks)
        .data_version(judgments.version())
        .output_root(&args.outdir);
    if !args.models.is_empty() {
        config = config.models(args.models);
    }
    config.validate()?;

    let db = Database::connect_with_config(
        &args.db.database_url,
        PoolConfig::for_concurrency(config.concurrency),
    )
    .await
    .context("connecting to PostgreSQL")?;
    let backend = args.ollama.backend()?;

    let runner = Runner::new(&db.text, &db.vector, &db.models, &backend);
    let outcome = runner.run(&config).await?;

    println!("Saved rankings to {}", outcome.rankings_path.display());
    println!("Saved run config to {}", outcome.manifest_path.display());
    println!(
        "Succeeded: {}, skipped: {}",
        outcome.succeeded(),
        outcome.skipped.len()
    );
    for skipped in &outcome.skipped {
        println!(
            "  skipped {} {} {}: {}",
            skipped.query_slug,
            skipped.mode,
            skipped.model.as_deref().unwrap_or("-"),
            skipped.reason
        );
    }
    Ok(())
}

async fn cmd_metrics(args: MetricsArgs) -> anyhow::Result<()> {
    let judgments = JudgmentSet::load(&args.data)?;
    let records = read_rankings(&args.rankings)
        .await
        .with_context(|| format!("reading {}", args.rankings.display()))?;
    let report = compute(&records, &judgments, &args.ks)?;

    let outdir = match args.outdir {
        Some(dir) => dir,
        None => args
            .rankings
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let paths = write_report(&report, &outdir, args.per_query).await?;

    println!("Saved metrics to {}", paths.json.display());
    println!("Saved table to {}", paths.markdown.display());
    Ok(())
}

async fn cmd_search(args: SearchArgs) -> anyhow::Result<()> {
    let db = Database::connect(&args.db.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    let docset = args.docset.as_deref();

    let query_vector = if args.mode.needs_vector() {
        let model = db.models.embedding_model(&args.model).await?;
        Some(args.ollama.backend()?.embed(&args.query, &model).await?)
    } else {
        None
    };

    match (args.mode, query_vector) {
        (RetrievalMode::Text, _) => {
            let list = db
                .text
                .search(&args.query, docset, args.limit, args.literal)
                .await?;
            let snippets = db
                .documents
                .snippets(&list.document_ids(), defaults::SNIPPET_LENGTH)
                .await?;
            println!("rank | id | title | score | snippet");
            println!("{}", "-".repeat(120));
            for c in &list {
                println!(
                    "{} | {} | {} | {:.6} | {}",
                    c.rank,
                    c.document_id,
                    c.title.as_deref().unwrap_or(""),
                    c.score,
                    snippets.get(&c.document_id).map_or("", String::as_str)
                );
            }
        }
        (RetrievalMode::Vector, Some(vector)) => {
            let list = db
                .vector
                .search(&vector, &args.model, docset, args.limit)
                .await?;
            let snippets = db
                .documents
                .snippets(&list.document_ids(), defaults::SNIPPET_LENGTH)
                .await?;
            println!("rank | id | title | cos_sim | snippet");
            println!("{}", "-".repeat(120));
            for c in &list {
                println!(
                    "{} | {} | {} | {:.6} | {}",
                    c.rank,
                    c.document_id,
                    c.title.as_deref().unwrap_or(""),
                    c.score,
                    snippets.get(&c.document_id).map_or("", String::as_str)
                );
            }
        }
        (RetrievalMode::Hybrid, Some(vector)) => {
            let weights = FusionWeights::parse(&args.weights)?;
            let text = db
                .text
                .search(&args.query, docset, args.text_k, args.literal)
                .await?;
            let vector = db
                .vector
                .search(&vector, &args.model, docset, args.vec_k)
                .await?;
            let mut fused = fuse_text_vector(&text, &vector, &weights, args.rrf_k)?;
            fused.truncate(args.limit);
            let snippets = db
                .documents
                .snippets(&fused.document_ids(), defaults::SNIPPET_LENGTH)
                .await?;

            let show = |rank: Option<u32>| rank.map_or_else(|| "-".to_string(), |r| r.to_string());
            println!("rank | id | title | rrf | r_text | r_vec | snippet");
            println!("{}", "-".repeat(140));
            for hit in fused.iter() {
                println!(
                    "{} | {} | {} | {:.6} | {} | {} | {}",
                    hit.rank,
                    hit.document_id,
                    hit.title.as_deref().unwrap_or(""),
                    hit.fused_score,
                    show(hit.signal_rank(Signal::Text)),
                    show(hit.signal_rank(Signal::Vector)),
                    snippets.get(&hit.document_id).map_or("", String::as_str)
                );
            }
        }
        (mode, None) => bail!("{} search needs a query embedding", mode),
    }
    Ok(())
}

async fn cmd_embed(args: EmbedArgs) -> anyhow::Result<()> {
    if args.batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }
    let db = Database::connect(&args.db.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    let backend = args.ollama.backend()?;
    let model = db.models.embedding_model(&args.model).await?;

    let pending = db
        .embeddings
        .pending(
            &model.name,
            model.dims,
            PendingFilter {
                docset: args.docset.as_deref(),
                force: args.force,
                limit: args.limit,
            },
        )
        .await?;

    if pending.is_empty() {
        println!("No documents to embed. (Already embedded?)");
        return Ok(());
    }
    println!(
        "Embedding {} documents with model={} dims={}",
        pending.len(),
        model.name,
        model.dims
    );

    let mut done = 0;
    for chunk in pending.chunks(args.batch_size) {
        let texts: Vec<String> = chunk.iter().map(|d| d.content.clone()).collect();
        let vectors = backend.embed_batch(&texts, &model).await?;
        let items: Vec<_> = chunk.iter().map(|d| d.id).zip(vectors).collect();
        db.embeddings.upsert_batch(&model.name, &items).await?;

        done += chunk.len();
        info!(
            subsystem = "eval",
            component = "embed",
            model = %model.name,
            record_count = done,
            "Embedding batch stored"
        );
        println!("  updated {}/{} (dim={})", done, pending.len(), model.dims);
    }

    println!("Done.");
    Ok(())
}

async fn cmd_add_document(args: AddDocumentArgs) -> anyhow::Result<()> {
    let db = Database::connect(&args.db.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    let backend = args.ollama.backend()?;
    let model: EmbeddingModel = db.models.embedding_model(&args.model).await?;

    let doc = NewDocument {
        source: args.source,
        title: Some(args.title),
        body: args.body,
    };
    let text = match args.embed_field {
        EmbedField::Content => doc.embedding_text(),
        EmbedField::Body => doc.body.clone(),
    };

    let embedding = backend.embed(&text, &model).await?;
    let id = db
        .documents
        .insert_with_embedding(&doc, &model.name, &embedding)
        .await?;

    println!(
        "Inserted document id={} with embedding model={} dims={}",
        id, model.name, model.dims
    );
    Ok(())
}
