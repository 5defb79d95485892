//! Google Gemini API provider implementation.
//!
//! Key differences from OpenAI-compatible APIs:
//! - Auth via the `x-goog-api-key` header, never the URL, so transport
//!   errors cannot echo the key
//! - System instruction is a top-level `system_instruction` field
//! - Roles are `"user"` / `"model"` (not `"assistant"`)

use crate::brain::LlmProvider;
use crate::config::ProviderSettings;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

/// The default Google Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Header carrying the API key.
pub(crate) const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider from configuration.
    ///
    /// Returns `LlmError::AuthFailed` if no API key can be resolved.
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        let api_key = settings
            .resolve_api_key()
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!("Gemini (env var '{}' not set)", settings.api_key_env),
            })?;
        Self::new_with_key(settings, api_key)
    }

    /// Create a new Gemini provider with an explicitly provided API key.
    pub fn new_with_key(settings: &ProviderSettings, api_key: String) -> Result<Self, LlmError> {
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: settings.chat_model.clone(),
        })
    }

    /// Build the JSON request body for `generateContent`.
    ///
    /// System messages become the top-level `system_instruction`; the rest
    /// become `contents`, with consecutive same-role turns merged.
    fn build_request_body(request: &CompletionRequest) -> Value {
        let system_text = request.system_text();

        let mut contents: Vec<Value> = Vec::new();
        for msg in request.messages.iter().filter(|m| m.role != Role::System) {
            let role = Self::gemini_role(msg.role);
            let part = json!({ "text": msg.content });
            match contents.last_mut() {
                Some(last) if last["role"] == role => {
                    if let Some(parts) = last["parts"].as_array_mut() {
                        parts.push(part);
                    }
                }
                _ => contents.push(json!({ "role": role, "parts": [part] })),
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": request.temperature,
            },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["generationConfig"]["maxOutputTokens"] = json!(max_tokens);
        }

        if !system_text.is_empty() {
            body["system_instruction"] = json!({
                "parts": [{ "text": system_text }]
            });
        }

        body
    }

    fn gemini_role(role: Role) -> &'static str {
        match role {
            Role::Assistant => "model",
            Role::User | Role::System => "user",
        }
    }

    /// Parse a Gemini API response JSON into a `CompletionResponse`.
    ///
    /// Text parts are concatenated; other part kinds are ignored.
    fn parse_response(body: &Value, fallback_model: &str) -> Result<CompletionResponse, LlmError> {
        let candidates = body["candidates"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'candidates' array in response".to_string(),
            })?;

        let candidate = candidates.first().ok_or_else(|| LlmError::ResponseParse {
            message: "Empty 'candidates' array in response".to_string(),
        })?;

        let parts = candidate["content"]["parts"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'parts' array in candidate content".to_string(),
            })?;

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();

        let finish_reason = candidate["finishReason"].as_str().map(|s| s.to_string());

        let usage_metadata = &body["usageMetadata"];
        let usage = TokenUsage {
            input_tokens: usage_metadata["promptTokenCount"].as_u64().unwrap_or(0) as usize,
            output_tokens: usage_metadata["candidatesTokenCount"].as_u64().unwrap_or(0) as usize,
        };

        let model = body["modelVersion"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string();

        Ok(CompletionResponse {
            message: Message::new(Role::Assistant, text),
            usage,
            model,
            finish_reason,
        })
    }

    /// Map an HTTP status code to the appropriate `LlmError`.
    pub(crate) fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: 30,
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Gemini API: {}", status, body_text),
            },
        }
    }

    /// Build the endpoint URL for a Gemini API call on `model`.
    ///
    /// Accepts model ids with or without the `models/` prefix.
    pub(crate) fn endpoint_url(base_url: &str, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:{}", base_url, model, method)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = Self::build_request_body(&request);
        let url = Self::endpoint_url(&self.base_url, model, "generateContent");

        debug!(model = model, "Sending Gemini completion request");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout { timeout_secs: 120 }
                } else {
                    LlmError::Connection {
                        message: format!("Request to Gemini API failed: {}", e.without_url()),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json, model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}
