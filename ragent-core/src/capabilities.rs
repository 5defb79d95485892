//! Startup wiring of the completion, embedding, and search capabilities.

use crate::brain::LlmProvider;
use crate::config::{ProviderKind, RagentConfig};
use crate::embeddings::{Embedder, create_embedder};
use crate::error::Result;
use crate::graph::GraphExecutor;
use crate::providers::create_provider;
use crate::store::{SqliteVectorStore, VectorStore};
use std::sync::Arc;
use tracing::info;

/// The capability set for one provider selection.
pub struct Capabilities {
    pub provider: ProviderKind,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<SqliteVectorStore>,
}

impl Capabilities {
    /// Build all capabilities from configuration.
    ///
    /// An unknown provider or a missing API key fails here, before any turn runs.
    pub fn from_config(config: &RagentConfig) -> Result<Self> {
        let provider = config.provider_kind()?;
        let llm = create_provider(config)?;
        let embedder = create_embedder(config)?;
        let path = config.database_path();
        let store = Arc::new(SqliteVectorStore::open(
            &path,
            config.collection_name.clone(),
            embedder.clone(),
        )?);

        info!(
            provider = provider.as_str(),
            model = llm.model_name(),
            embedding_model = embedder.model_name(),
            database = %path.display(),
            collection = %config.collection_name,
            "Capabilities ready"
        );

        Ok(Self {
            provider,
            llm,
            embedder,
            store,
        })
    }

    /// The vector collection as a search capability.
    pub fn search(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    /// A graph executor using these capabilities and the configured graph settings.
    pub fn executor(&self, config: &RagentConfig) -> GraphExecutor {
        let temperature = config
            .active_provider()
            .map(|(_, settings)| settings.temperature)
            .unwrap_or(0.0);
        GraphExecutor::from_config(
            &config.graph,
            config.retrieval.top_k,
            temperature,
            self.llm.clone(),
            self.search(),
        )
    }
}
