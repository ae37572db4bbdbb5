//! # uxaudit CLI
//!
//! ## Usage
//!
//! ```bash
//! uxaudit --config ./config/uxaudit.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `uxaudit init` | Create the SQLite database and run schema migrations |
//! | `uxaudit audit <video>` | Run one audit in process |
//! | `uxaudit status [<id>]` | Progress of one audit, or recent audits |
//! | `uxaudit report <id>` | Print the report of a completed audit |
//! | `uxaudit knowledge seed` | Insert the default knowledge categories |
//! | `uxaudit knowledge categories` | List knowledge categories |
//! | `uxaudit knowledge index <dir>` | Chunk and embed `.md` / `.txt` files |
//! | `uxaudit user create <email>` | Create a user with default preferences |
//! | `uxaudit prefs set <user> <slug>` | Enable or disable a category for a user |
//! | `uxaudit prefs list <user>` | Show a user's categories |
//! | `uxaudit serve` | Start the HTTP server and worker pool |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use uxaudit::progress::ProgressMode;
use uxaudit::{audit_cmd, config, knowledge, migrate, server};
use uxaudit_core::models::NewAudit;

/// uxaudit: usability audits of screen recordings with a multimodal LLM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/uxaudit.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "uxaudit", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/uxaudit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Run one audit end to end and print the outcome.
    ///
    /// Requires `OPENAI_API_KEY` and ffmpeg on the PATH.
    Audit {
        /// Path to the screen recording.
        video: PathBuf,
        /// User whose knowledge preferences apply.
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Progress output on stderr: `off`, `human`, or `json`.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Show progress of an audit, or list recent audits.
    Status { id: Option<String> },

    /// Print the report JSON of a completed audit.
    Report { id: String },

    /// Manage the knowledge base.
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },

    /// Manage users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage per-user knowledge category preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Start the HTTP server and the audit worker pool.
    Serve,
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Insert the default categories (existing slugs are kept).
    Seed,
    /// List categories.
    Categories,
    /// Chunk, embed, and store `.md` / `.txt` files from a directory.
    Index {
        dir: PathBuf,
        /// Category slug for the indexed chunks.
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user and print its id.
    Create { email: String },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Enable or disable a category for a user.
    Set {
        user: String,
        slug: String,
        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        enabled: bool,
    },
    /// List a user's categories.
    List { user: String },
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    match s {
        "off" => Ok(ProgressMode::Off),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        other => Err(format!(
            "invalid progress mode '{}': expected off, human, or json",
            other
        )),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Audit {
            video,
            user,
            title,
            description,
            progress,
        } => {
            let reporter = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();
            let new = NewAudit {
                user_id: user,
                title,
                description,
                video_path: video.clone(),
            };
            audit_cmd::run_audit(&cfg, &video, new, reporter).await?;
        }
        Commands::Status { id } => {
            audit_cmd::run_status(&cfg, id.as_deref()).await?;
        }
        Commands::Report { id } => {
            audit_cmd::run_report(&cfg, &id).await?;
        }
        Commands::Knowledge { action } => match action {
            KnowledgeAction::Seed => knowledge::run_seed(&cfg).await?,
            KnowledgeAction::Categories => knowledge::run_categories(&cfg).await?,
            KnowledgeAction::Index {
                dir,
                category,
                progress,
            } => {
                let reporter = progress
                    .unwrap_or_else(ProgressMode::default_for_tty)
                    .reporter();
                knowledge::run_index(&cfg, &dir, category.as_deref(), reporter.as_ref()).await?;
            }
        },
        Commands::User { action } => match action {
            UserAction::Create { email } => knowledge::run_user_create(&cfg, &email).await?,
        },
        Commands::Prefs { action } => match action {
            PrefsAction::Set {
                user,
                slug,
                enabled,
            } => knowledge::run_prefs_set(&cfg, &user, &slug, enabled).await?,
            PrefsAction::List { user } => knowledge::run_prefs_list(&cfg, &user).await?,
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
