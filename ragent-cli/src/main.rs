//! Ragent CLI: terminal interface for the Ragent retrieval agent.
//!
//! Provides interactive chat, single questions, ingestion, and graph output.

mod commands;
mod repl;

use anyhow::Context;
use clap::Parser;
use ragent_core::config::ConfigOverrides;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Ragent: a conversational agent over your private documents
#[derive(Parser, Debug)]
#[command(name = "ragent", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds .ragent/config.toml)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// LLM provider: openai or gemini (overrides LLM_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Chat model for the selected provider
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// SQLite database holding the vector collection (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Skip the answer evaluation step
    #[arg(long, global = true)]
    no_eval: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand (defaults to chat)
    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            provider: self.provider.clone(),
            model: self.model.clone(),
            database_url: self.database_url.clone(),
            no_eval: self.no_eval,
            ..Default::default()
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Interactive conversation (default)
    Chat,
    /// Answer a single question and exit
    Ask {
        /// The question to ask
        question: String,
    },
    /// Load documents into the vector collection
    Ingest {
        /// Documents directory (defaults to ingest.docs_dir)
        #[arg(long)]
        docs_dir: Option<PathBuf>,
        /// Re-embed chunks that are already indexed
        #[arg(long)]
        force: bool,
    },
    /// Print the turn graph as a Mermaid flowchart
    Graph {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the effective configuration
    Show,
}

/// Canonical workspace directory; a missing or non-directory path is an error.
fn resolve_workspace(path: &Path) -> anyhow::Result<PathBuf> {
    let workspace = path
        .canonicalize()
        .with_context(|| format!("Workspace {} not found", path.display()))?;
    if !workspace.is_dir() {
        anyhow::bail!("Workspace {} is not a directory", path.display());
    }
    Ok(workspace)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "ragent", "ragent")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from(".ragent").join("logs"));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ragent.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = resolve_workspace(&cli.workspace)?;
    // Relative docs and database paths resolve against the workspace.
    std::env::set_current_dir(&workspace)?;
    let overrides = cli.overrides();

    commands::handle_command(cli.command.unwrap_or(Commands::Chat), &workspace, &overrides).await
}
