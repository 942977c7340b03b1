//! # Parlance CLI (`parlance`)
//!
//! The `parlance` binary runs every process in the system: the ingestion and
//! rooms HTTP API, the per-room agent workers, and one-shot ingestion and
//! query commands for local work.
//!
//! ## Usage
//!
//! ```bash
//! parlance --config ./config/parlance.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parlance init` | Create the SQLite store and run schema migrations |
//! | `parlance serve api` | Start the ingestion + rooms HTTP API |
//! | `parlance agent run <voice\|retrieval>` | Run one agent worker for a room |
//! | `parlance ingest` | Ingest documents from the command line |
//! | `parlance query "<text>"` | Query a user's collection from the command line |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the store
//! parlance init --config ./config/parlance.toml
//!
//! # Start the API server
//! parlance serve api
//!
//! # Run a retrieval agent for a room
//! parlance agent run retrieval --room demo-room --user alice
//!
//! # One-shot ingestion
//! parlance ingest --user alice --project-id p1 --project-name demo \
//!     --dir ./docs report.pdf notes.txt
//!
//! # One-shot retrieval query
//! parlance query "what does the report conclude?" --user alice
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use parlance::agent::AgentKind;
use parlance::config;
use parlance::ingest::{IngestContext, IngestService, IngestStatus};
use parlance::store::{MetadataFilter, VectorStore};
use parlance::{embedding, inference, migrate, server, store, worker};

/// Parlance — a voice-agent and retrieval backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/parlance.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "parlance",
    about = "Parlance — voice agents with per-user document retrieval",
    version,
    long_about = "Parlance ingests a user's documents into a per-user vector collection \
    (chunking, LLM enrichment, embeddings), issues signed room-join tokens with agent \
    dispatch, and runs voice agent workers that answer with the user's own documents in scope."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/parlance.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema.
    ///
    /// Creates the SQLite file and all required tables (collections, nodes,
    /// node_vectors). Idempotent.
    Init,

    /// Start a long-running service.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Run agent workers.
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Ingest documents into a user's collection.
    ///
    /// Runs the same pipeline as the HTTP ingestion endpoint (chunk, enrich,
    /// embed, store) synchronously and reports the outcome.
    Ingest {
        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Project id recorded on every node.
        #[arg(long)]
        project_id: String,

        /// Project name recorded on every node.
        #[arg(long)]
        project_name: String,

        /// Directory the named documents are read from.
        #[arg(long)]
        dir: PathBuf,

        /// Document file names within the directory.
        #[arg(required = true)]
        names: Vec<String>,

        /// Replace the user's collection instead of appending.
        #[arg(long)]
        overwrite: bool,
    },

    /// Query a user's collection.
    Query {
        /// The query text.
        text: String,

        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Restrict results to one project id.
        #[arg(long)]
        project_id: Option<String>,

        /// Restrict results to one project name.
        #[arg(long)]
        project_name: Option<String>,

        /// Maximum number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// Start the ingestion + rooms HTTP API.
    ///
    /// Binds to the address configured in `[server].bind` and spins up the
    /// ingestion worker pool.
    Api,
}

#[derive(Subcommand)]
enum AgentAction {
    /// Run one agent worker for a room.
    ///
    /// The worker mints a join token, waits for a participant, then drives
    /// the STT -> chat -> TTS session loop until the session ends.
    Run {
        /// Agent kind: `voice` or `retrieval`.
        kind: AgentKind,

        /// Room name to serve.
        #[arg(long)]
        room: String,

        /// User whose agent and collection this worker serves.
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = store::connect(&cfg.store).await?;
            migrate::run_migrations(&pool).await?;
            println!("Store initialized successfully.");
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                server::run_server(&cfg).await?;
            }
        },
        Commands::Agent { action } => match action {
            AgentAction::Run { kind, room, user } => {
                worker::run_agent(&cfg, kind, &room, &user).await?;
            }
        },
        Commands::Ingest {
            user,
            project_id,
            project_name,
            dir,
            names,
            overwrite,
        } => {
            run_ingest(&cfg, &user, &project_id, &project_name, dir, names, overwrite).await?;
        }
        Commands::Query {
            text,
            user,
            project_id,
            project_name,
            limit,
        } => {
            run_query(&cfg, &text, &user, project_id, project_name, limit).await?;
        }
    }

    Ok(())
}

async fn run_ingest(
    cfg: &config::Config,
    user: &str,
    project_id: &str,
    project_name: &str,
    dir: PathBuf,
    names: Vec<String>,
    overwrite: bool,
) -> anyhow::Result<()> {
    let pool = store::connect(&cfg.store).await?;
    migrate::run_migrations(&pool).await?;

    let chat = if cfg.ingest.enrichers {
        Some(Arc::new(inference::ChatClient::new(&cfg.inference)?))
    } else {
        None
    };
    let context = Arc::new(IngestContext {
        config: cfg.clone(),
        store: VectorStore::new(pool),
        embedder: embedding::create_provider(&cfg.embedding)?,
        chat,
    });
    let service = IngestService::start(Arc::clone(&context));

    let submission_id = service.submit(user, project_id, project_name, dir, names, overwrite)?;
    println!("Submitted ingestion job {}", submission_id);

    loop {
        match service.status(&submission_id) {
            Some(IngestStatus::Completed) => {
                println!("Ingestion completed.");
                return Ok(());
            }
            Some(IngestStatus::Failed) => {
                anyhow::bail!("Ingestion failed; see log output for the cause");
            }
            Some(_) => tokio::time::sleep(std::time::Duration::from_millis(200)).await,
            None => anyhow::bail!("Ingestion job disappeared from the status map"),
        }
    }
}

async fn run_query(
    cfg: &config::Config,
    text: &str,
    user: &str,
    project_id: Option<String>,
    project_name: Option<String>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let pool = store::connect(&cfg.store).await?;
    migrate::run_migrations(&pool).await?;
    let store = VectorStore::new(pool);
    let embedder = embedding::create_provider(&cfg.embedding)?;

    let query_vec = embedding::embed_query(embedder.as_ref(), text)
        .await
        .context("Failed to embed query")?;
    let filter = MetadataFilter {
        project_id,
        project_name,
    };
    let results = store
        .query(user, &query_vec, &filter, limit.unwrap_or(cfg.retrieval.top_k))
        .await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for node in results {
        println!(
            "[{:.3}] {} #{} ({} / {})",
            node.score, node.doc_name, node.chunk_index, node.project_id, node.project_name
        );
        for line in node.text.lines().take(3) {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}
