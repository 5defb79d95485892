//! Configuration system for Ragent.
//!
//! Uses `figment` for layered configuration: defaults -> config files ->
//! prefixed environment -> deployment environment (`LLM_PROVIDER`,
//! `DATABASE_URL`). CLI overrides are applied to the extracted value.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    value::Uncased,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the vector collection holding the document chunks.
pub const DEFAULT_COLLECTION_NAME: &str = "internal_docs";

/// Top-level configuration for Ragent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagentConfig {
    /// Provider selector: "openai" or "gemini". Validated when capabilities
    /// are constructed, not at load time.
    pub provider: String,
    /// SQLite database holding the vector collections (optionally `sqlite://`-prefixed).
    pub database_url: String,
    /// Collection searched by the retrieval step and written by ingestion.
    pub collection_name: String,
    pub openai: ProviderSettings,
    pub gemini: ProviderSettings,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
    pub graph: GraphConfig,
}

impl Default for RagentConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            database_url: ".ragent/vectors.db".to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            openai: ProviderSettings::openai(),
            gemini: ProviderSettings::gemini(),
            retrieval: RetrievalConfig::default(),
            ingest: IngestConfig::default(),
            graph: GraphConfig::default(),
        }
    }
}

/// The two supported capability providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            "" => Err(ConfigError::MissingField {
                field: "provider (LLM_PROVIDER)".to_string(),
            }),
            _ => Err(ConfigError::UnsupportedProvider {
                value: s.to_string(),
            }),
        }
    }
}

/// Model identifiers and credentials for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Chat model used for classification, answering, and evaluation.
    pub chat_model: String,
    /// Embedding model used for documents and queries.
    pub embedding_model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sampling temperature for every completion call.
    pub temperature: f32,
    /// Explicit API key, taking precedence over `api_key_env`. Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

impl ProviderSettings {
    pub fn openai() -> Self {
        Self {
            chat_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.0,
            api_key: None,
        }
    }

    pub fn gemini() -> Self {
        Self {
            chat_model: "gemini-2.0-flash".to_string(),
            embedding_model: "models/gemini-embedding-001".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.0,
            api_key: None,
        }
    }

    /// Resolve the API key: explicit value first, then the environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

/// Retrieval step settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of passages fetched per search.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Ingestion batch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory scanned (non-recursively) for documents.
    pub docs_dir: PathBuf,
    /// File extensions accepted, without the dot.
    pub extensions: Vec<String>,
    /// Maximum chunk length in tokens.
    pub chunk_size: usize,
    /// Tokens shared between neighbouring chunks.
    pub chunk_overlap: usize,
    /// Chunks embedded per provider call.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            extensions: vec!["md".to_string()],
            chunk_size: 1000,
            chunk_overlap: 200,
            batch_size: 64,
        }
    }
}

/// Turn graph settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Run the evaluation and finalization nodes after answering.
    pub evaluate: bool,
    /// How many times a `BAD` verdict may trigger a fresh answer. Zero keeps
    /// the verdict advisory.
    pub max_regenerations: usize,
    /// Hard cap on node executions within one turn.
    pub max_steps: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            evaluate: true,
            max_regenerations: 0,
            max_steps: crate::graph::executor::DEFAULT_MAX_STEPS,
        }
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub database_url: Option<String>,
    pub collection_name: Option<String>,
    pub top_k: Option<usize>,
    pub no_eval: bool,
}

impl RagentConfig {
    /// Parse the provider selector.
    pub fn provider_kind(&self) -> Result<ProviderKind, ConfigError> {
        self.provider.parse()
    }

    /// Settings of the selected provider.
    pub fn active_provider(&self) -> Result<(ProviderKind, &ProviderSettings), ConfigError> {
        let kind = self.provider_kind()?;
        let settings = match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        };
        Ok((kind, settings))
    }

    /// Filesystem path of the SQLite database named by `database_url`.
    pub fn database_path(&self) -> PathBuf {
        let url = self.database_url.trim();
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        PathBuf::from(path)
    }

    /// Apply command-line values on top of the loaded configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(provider) = &overrides.provider {
            self.provider = provider.clone();
        }
        if let Some(url) = &overrides.database_url {
            self.database_url = url.clone();
        }
        if let Some(name) = &overrides.collection_name {
            self.collection_name = name.clone();
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        if overrides.no_eval {
            self.graph.evaluate = false;
        }
        if let Some(model) = &overrides.model {
            match self.provider_kind() {
                Ok(ProviderKind::OpenAi) => self.openai.chat_model = model.clone(),
                Ok(ProviderKind::Gemini) => self.gemini.chat_model = model.clone(),
                Err(_) => {
                    tracing::warn!(model = %model, "Ignoring model override: no valid provider selected")
                }
            }
        }
    }

    /// Validate this config and return human-readable warnings.
    ///
    /// Provider validity is not checked here; that is reported when
    /// capabilities are built.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.retrieval.top_k == 0 {
            warnings.push("retrieval.top_k is 0; retrieval will never return context".to_string());
        }
        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            warnings.push(format!(
                "ingest.chunk_overlap ({}) >= ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            ));
        }
        // Each regeneration re-runs generate_answer and evaluate_answer.
        let needed = 6 + 2 * self.graph.max_regenerations;
        if self.graph.max_steps < needed {
            warnings.push(format!(
                "graph.max_steps ({}) is below the {} steps a turn may need",
                self.graph.max_steps, needed
            ));
        }
        if self.collection_name.trim().is_empty() {
            warnings.push("collection_name is empty".to_string());
        }
        warnings
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. `LLM_PROVIDER` and `DATABASE_URL` from the process environment
/// 2. Environment variables prefixed with `RAGENT_` (`__` separates sections)
/// 3. Workspace-local config (`.ragent/config.toml`)
/// 4. User config (`~/.config/ragent/config.toml`)
/// 5. Built-in defaults
pub fn load_config(workspace: Option<&Path>) -> Result<RagentConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(RagentConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "ragent", "ragent") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".ragent").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // RAGENT_RETRIEVAL__TOP_K, RAGENT_GRAPH__EVALUATE, ...
    figment = figment.merge(Env::prefixed("RAGENT_").split("__"));

    figment = figment.merge(
        Env::raw()
            .only(&["LLM_PROVIDER", "DATABASE_URL"])
            .map(|key| {
                if key.as_str().eq_ignore_ascii_case("LLM_PROVIDER") {
                    Uncased::from("provider")
                } else {
                    Uncased::from("database_url")
                }
            }),
    );

    figment.extract().map_err(Box::new)
}
