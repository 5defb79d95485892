//! Embedding providers for the vector collection.
//!
//! Document and query embeddings go through the async `Embedder` trait.
//! Remote implementations call the OpenAI `/embeddings` endpoint or the Gemini
//! `batchEmbedContents` endpoint; `LocalEmbedder` is a hashed bag-of-words
//! model that needs no network.

use crate::config::{ProviderKind, ProviderSettings, RagentConfig};
use crate::error::{LlmError, Result};
use crate::providers::{gemini, openai_compat};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Dimensionality of `LocalEmbedder` vectors.
pub const LOCAL_EMBEDDING_DIMENSIONS: usize = 256;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts, one vector per input in input order.
    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError>;

    /// Return the embedding model name.
    fn model_name(&self) -> &str;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Local hashed bag-of-words embedder (no external dependencies).
///
/// Terms are lowercase alphanumeric runs; runs of non-ASCII letters (kana,
/// kanji) additionally contribute their character bigrams so that unspaced
/// text still overlaps at the term level.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one text synchronously.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<String, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word.to_string()).or_insert(0) += 1;
            if !word.is_ascii() {
                let chars: Vec<char> = word.chars().collect();
                for pair in chars.windows(2) {
                    *tf.entry(pair.iter().collect()).or_insert(0) += 1;
                }
            }
        }

        if tf.is_empty() {
            return vector;
        }

        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        // L2 normalize
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError> {
        Ok(self.embed(text))
    }

    fn model_name(&self) -> &str {
        "local"
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// OpenAI embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(settings: &ProviderSettings) -> std::result::Result<Self, LlmError> {
        let api_key = settings
            .resolve_api_key()
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!("OpenAI: env var '{}' not set", settings.api_key_env),
            })?;
        Ok(Self::new_with_key(settings, api_key))
    }

    pub fn new_with_key(settings: &ProviderSettings, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: settings.embedding_model.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| openai_compat::DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Pull vectors out of an `/embeddings` response, ordered by `index`.
    fn parse_embeddings(body: &Value, expected: usize) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        let data = body["data"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'data' array in embeddings response".to_string(),
            })?;

        let mut indexed: Vec<(usize, Vec<f32>)> = data
            .iter()
            .enumerate()
            .map(|(pos, item)| {
                let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
                let vector = item["embedding"]
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect()
                    })
                    .unwrap_or_default();
                (index, vector)
            })
            .collect();
        indexed.sort_by_key(|(index, _)| *index);

        let vectors: Vec<Vec<f32>> = indexed.into_iter().map(|(_, v)| v).collect();
        if vectors.len() != expected || vectors.iter().any(|v| v.is_empty()) {
            return Err(LlmError::ResponseParse {
                message: format!(
                    "Expected {} embeddings, got {} usable",
                    expected,
                    vectors.iter().filter(|v| !v.is_empty()).count()
                ),
            });
        }
        Ok(vectors)
    }

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        debug!(model = %self.model, inputs = texts.len(), "Requesting OpenAI embeddings");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("Embedding request failed: {}", e),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;
        if !status.is_success() {
            return Err(openai_compat::OpenAiCompatibleProvider::map_http_error(
                status, &text,
            ));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON: {}", e),
        })?;
        Self::parse_embeddings(&json, texts.len())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        self.embed_batch(texts).await
    }

    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| LlmError::ResponseParse {
            message: "Empty embeddings response".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Gemini task type for document versus query embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

impl TaskType {
    fn as_str(&self) -> &'static str {
        match self {
            TaskType::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            TaskType::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Gemini `batchEmbedContents` client.
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(settings: &ProviderSettings) -> std::result::Result<Self, LlmError> {
        let api_key = settings
            .resolve_api_key()
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!("Gemini (env var '{}' not set)", settings.api_key_env),
            })?;
        Ok(Self::new_with_key(settings, api_key))
    }

    pub fn new_with_key(settings: &ProviderSettings, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: settings.embedding_model.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Fully-qualified model resource name (`models/...`).
    fn model_resource(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn request_body(&self, texts: &[String], task: TaskType) -> Value {
        let model = self.model_resource();
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": task.as_str(),
                })
            })
            .collect();
        json!({ "requests": requests })
    }

    fn parse_embeddings(body: &Value, expected: usize) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        let embeddings = body["embeddings"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'embeddings' array in response".to_string(),
            })?;
        let vectors: Vec<Vec<f32>> = embeddings
            .iter()
            .map(|e| {
                e["values"]
                    .as_array()
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();
        if vectors.len() != expected || vectors.iter().any(|v: &Vec<f32>| v.is_empty()) {
            return Err(LlmError::ResponseParse {
                message: format!("Expected {} embeddings, got {}", expected, vectors.len()),
            });
        }
        Ok(vectors)
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        task: TaskType,
    ) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url =
            gemini::GeminiProvider::endpoint_url(&self.base_url, &self.model, "batchEmbedContents");

        debug!(model = %self.model, inputs = texts.len(), task = task.as_str(), "Requesting Gemini embeddings");

        let response = self
            .client
            .post(&url)
            .header(gemini::API_KEY_HEADER, &self.api_key)
            .header("content-type", "application/json")
            .json(&self.request_body(texts, task))
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                message: format!("Embedding request to Gemini API failed: {}", e.without_url()),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;
        if !status.is_success() {
            return Err(gemini::GeminiProvider::map_http_error(status, &text));
        }

        let json: Value = serde_json::from_str(&text).map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON in response: {}", e),
        })?;
        Self::parse_embeddings(&json, texts.len())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, LlmError> {
        self.embed_batch(texts, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, LlmError> {
        let mut vectors = self
            .embed_batch(&[text.to_string()], TaskType::RetrievalQuery)
            .await?;
        vectors.pop().ok_or_else(|| LlmError::ResponseParse {
            message: "Empty embeddings response".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

/// Create the embedder for the selected provider.
///
/// An `embedding_model` of `"local"` selects `LocalEmbedder` and needs no key.
pub fn create_embedder(config: &RagentConfig) -> Result<Arc<dyn Embedder>> {
    let (kind, settings) = config.active_provider()?;
    if settings.embedding_model == "local" {
        return Ok(Arc::new(LocalEmbedder::new(LOCAL_EMBEDDING_DIMENSIONS)));
    }
    let embedder: Arc<dyn Embedder> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiEmbedder::new(settings)?),
        ProviderKind::Gemini => Arc::new(GeminiEmbedder::new(settings)?),
    };
    Ok(embedder)
}
