//! # Project Indexer CLI (`pidx`)
//!
//! ## Usage
//!
//! ```bash
//! pidx --config ./config/pidx.toml --root ~/src/myapp <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pidx init` | Create the SQLite database and run schema migrations |
//! | `pidx analyze` | Run or resume project-context analysis |
//! | `pidx iterations` | Show the analysis log |
//! | `pidx index` | Index every file in the project |
//! | `pidx update <paths>` | Re-index specific files or directories |
//! | `pidx remove <paths>` | Drop files or directories from the index |
//! | `pidx delete` | Remove everything stored for the project |
//! | `pidx search "<query>"` | Semantic search within the project (`--files`, `--functions`) |
//! | `pidx status` | Context, confidence and indexed volume |
//!
//! Logs go to stderr and honour `RUST_LOG`; results go to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use project_indexer::config::{self, Config};
use project_indexer::index_manager::IndexManager;
use project_indexer::progress::ProgressMode;
use project_indexer::scanner::FsScanner;
use project_indexer::sqlite_store::SqliteStore;
use project_indexer::search::SearchScope;
use project_indexer::{db, inference, migrate, search, stats};
use project_indexer_core::models::{FileKind, SearchFilters};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Project Indexer: context-aware semantic indexing of source trees.
#[derive(Parser)]
#[command(name = "pidx", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pidx.toml")]
    config: PathBuf,

    /// Project root directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Run project-context analysis, resuming an interrupted one.
    Analyze {
        /// Discard the saved context and the iteration log first.
        #[arg(long)]
        force: bool,
    },

    /// Print the analysis iteration log.
    Iterations,

    /// Index every file in the project.
    ///
    /// Unchanged files are skipped. Files that disappeared since the last
    /// run are removed from the index. Ctrl-C stops the run; files already
    /// committed stay indexed.
    Index {
        /// Re-run analysis and re-index unchanged files.
        #[arg(long)]
        force: bool,

        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Re-index specific files or directories.
    Update {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Remove files or directories from the index.
    Remove {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Delete every record stored for the project.
    Delete,

    /// Semantic search within the project.
    Search {
        query: String,

        /// Only `code`, `test`, `documentation` or `configuration`.
        #[arg(long)]
        kind: Option<String>,

        #[arg(long)]
        language: Option<String>,

        /// Only files under this path.
        #[arg(long)]
        path_prefix: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        /// List unique files ranked by their best chunk.
        #[arg(long, conflicts_with = "functions")]
        files: bool,

        /// List key functions from matching chunks.
        #[arg(long)]
        functions: bool,

        /// With --functions, only names containing this text.
        #[arg(long, requires = "functions")]
        name: Option<String>,
    },

    /// Show context, confidence and indexed volume.
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(p: ProgressArg) -> Self {
        match p {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

async fn open_manager(cfg: &Config, cancel: CancellationToken, progress: ProgressMode) -> Result<IndexManager> {
    let pool = db::connect(cfg).await?;
    migrate::apply(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let completion = inference::create_completion_backend(&cfg.llm)?;
    let embedding = inference::create_embedding_backend(&cfg.embedding)?;
    Ok(
        IndexManager::new(cfg, store, Arc::new(FsScanner::new()), completion, embedding)
            .with_cancellation(cancel)
            .with_progress(progress.reporter()),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "project_indexer=info,project_indexer_core=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after in-flight calls");
                cancel.cancel();
            }
        });
    }

    let progress = match &cli.command {
        Commands::Index {
            progress: Some(p), ..
        } => ProgressMode::from(*p),
        Commands::Index { .. } | Commands::Update { .. } => ProgressMode::default_for_tty(),
        _ => ProgressMode::Off,
    };

    let manager = open_manager(&cfg, cancel, progress).await?;
    let project_id = manager.register_project(&cli.root).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Analyze { force } => {
            let summary = manager.start_or_resume_analysis(&project_id, force).await?;
            println!("Project {}", summary.project_id);
            stats::print_context(&summary);
        }
        Commands::Iterations => {
            stats::run_iterations(&manager, &project_id).await?;
        }
        Commands::Index { force, .. } => {
            let report = manager.index_project(&project_id, force).await?;
            stats::print_report(&report);
        }
        Commands::Update { paths } => {
            let report = manager.update_files(&project_id, &paths).await?;
            stats::print_report(&report);
        }
        Commands::Remove { paths } => {
            let report = manager.remove_files(&project_id, &paths).await?;
            stats::print_removal(&report);
        }
        Commands::Delete => {
            let removed = manager.delete_project(&project_id).await?;
            println!("Deleted project {} ({} documents).", project_id, removed);
        }
        Commands::Search {
            query,
            kind,
            language,
            path_prefix,
            limit,
            files,
            functions,
            name,
        } => {
            let filters = SearchFilters {
                kind: kind.map(|k| k.parse::<FileKind>()).transpose()?,
                language,
                path_prefix,
            };
            let scope = if files {
                SearchScope::Files
            } else if functions {
                SearchScope::Functions { name }
            } else {
                SearchScope::Chunks
            };
            search::run_search(&manager, &project_id, &query, &filters, limit, scope).await?;
        }
        Commands::Status => {
            stats::run_status(&manager, &project_id).await?;
        }
    }

    Ok(())
}
