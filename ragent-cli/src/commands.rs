//! Subcommand handlers.

use crate::repl;
use crate::{Commands, ConfigAction};
use ragent_core::config::{ConfigOverrides, RagentConfig, load_config};
use ragent_core::embeddings::create_embedder;
use ragent_core::graph::Graph;
use ragent_core::store::SqliteVectorStore;
use ragent_ingest::IngestionSummary;
use std::path::Path;

/// Load configuration for `workspace` and apply command-line overrides.
pub(crate) fn effective_config(
    workspace: &Path,
    overrides: &ConfigOverrides,
) -> anyhow::Result<RagentConfig> {
    let mut config = load_config(Some(workspace))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.apply_overrides(overrides);
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    overrides: &ConfigOverrides,
) -> anyhow::Result<()> {
    match command {
        Commands::Chat => repl::run_interactive(effective_config(workspace, overrides)?).await,
        Commands::Ask { question } => {
            repl::run_single_task(&question, effective_config(workspace, overrides)?).await
        }
        Commands::Ingest { docs_dir, force } => {
            let mut config = effective_config(workspace, overrides)?;
            if let Some(dir) = docs_dir {
                config.ingest.docs_dir = dir;
            }
            handle_ingest(&config, force).await
        }
        Commands::Graph { output } => {
            let config = effective_config(workspace, overrides)?;
            let mermaid = graph_for(&config).to_mermaid();
            match output {
                Some(path) => {
                    std::fs::write(&path, &mermaid)?;
                    println!("Saved graph to {}", path.display());
                }
                None => print!("{}", mermaid),
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace, overrides),
    }
}

/// The graph shape a chat session with `config` would run.
pub(crate) fn graph_for(config: &RagentConfig) -> Graph {
    Graph::from_config(&config.graph)
}

async fn handle_ingest(config: &RagentConfig, force: bool) -> anyhow::Result<()> {
    println!("Starting ingestion process...");
    let embedder = create_embedder(config)?;
    println!(
        "Using embeddings: {} ({})",
        embedder.provider_name(),
        embedder.model_name()
    );
    let store = SqliteVectorStore::open(
        &config.database_path(),
        config.collection_name.clone(),
        embedder,
    )?;

    let summary = ragent_ingest::run_ingestion(&config.ingest, &store, force).await?;
    println!("{}", ingest_report(config, &summary));
    Ok(())
}

fn ingest_report(config: &RagentConfig, summary: &IngestionSummary) -> String {
    if summary.documents == 0 {
        return format!(
            "No documents found in {}.\nIngestion complete! {}",
            config.ingest.docs_dir.display(),
            summary.result
        );
    }
    format!(
        "Loaded {} documents into {} chunks.\nIngestion complete! {}",
        summary.documents, summary.chunks, summary.result
    )
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    overrides: &ConfigOverrides,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".ragent");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&RagentConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = effective_config(workspace, overrides)?;
            println!("{}", toml::to_string_pretty(&config)?);
            match config.provider_kind() {
                Ok(kind) => println!("# provider resolves to: {}", kind),
                Err(e) => println!("# provider problem: {}", e),
            }
            Ok(())
        }
    }
}
