//! Language-model backends.
//!
//! Everything the pipeline needs from a model is `prompt in, text out`. The
//! concrete backend is chosen per request and handed to the parser, there is
//! no global "current model".

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{Config, ProviderConfig};
use crate::error::BackendError;

const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";
const PERPLEXITY_MODEL: &str = "llama-3.1-sonar-small-128k-online";
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MODEL: &str = "gemini-pro";
const SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn id(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Perplexity,
    Gemini,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Perplexity => f.write_str("perplexity"),
            BackendKind::Gemini => f.write_str("gemini"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "perplexity" => Ok(BackendKind::Perplexity),
            "gemini" => Ok(BackendKind::Gemini),
            other => Err(format!("unknown backend `{other}` (expected perplexity or gemini)")),
        }
    }
}

/// OpenAI-style `/chat/completions` endpoint. Perplexity by default.
pub struct ChatCompletionsBackend {
    id: String,
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl ChatCompletionsBackend {
    pub fn perplexity(api_key: impl Into<String>) -> Self {
        Self::with_url("perplexity", api_key, PERPLEXITY_API_URL, PERPLEXITY_MODEL)
    }

    pub fn with_url(
        id: impl Into<String>,
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        tracing::debug!(backend = %self.id, model = %self.model, "sending chat completion");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": prompt},
                ],
                "temperature": 0.2,
            }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let body = read_json(response).await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                BackendError::InvalidResponse("missing choices[0].message.content".into())
            })?;

        non_empty(content)
    }
}

/// Google Generative Language `generateContent`.
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_url(api_key, GEMINI_API_URL, GEMINI_MODEL)
    }

    pub fn with_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl LanguageModel for GeminiBackend {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        tracing::debug!(model = %self.model, "sending generateContent");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({
                "contents": [{"parts": [{"text": prompt}]}],
            }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let body = read_json(response).await?;
        let parts = body["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| {
                BackendError::InvalidResponse("missing candidates[0].content.parts".into())
            })?;

        let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
        non_empty(&text)
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, BackendError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(String::from))
            .unwrap_or(text);
        tracing::warn!(status = status.as_u16(), %message, "backend returned an error");
        return Err(BackendError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&text).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

fn non_empty(text: &str) -> Result<String, BackendError> {
    if text.trim().is_empty() {
        Err(BackendError::EmptyResponse)
    } else {
        Ok(text.to_string())
    }
}

/// The backends that have credentials, keyed by [`BackendKind`].
#[derive(Clone, Default)]
pub struct Backends {
    perplexity: Option<Arc<dyn LanguageModel>>,
    gemini: Option<Arc<dyn LanguageModel>>,
}

impl Backends {
    pub fn from_config(config: &Config) -> Self {
        Self {
            perplexity: chat_backend(&config.perplexity),
            gemini: gemini_backend(&config.gemini),
        }
    }

    pub fn with(mut self, kind: BackendKind, backend: Arc<dyn LanguageModel>) -> Self {
        match kind {
            BackendKind::Perplexity => self.perplexity = Some(backend),
            BackendKind::Gemini => self.gemini = Some(backend),
        }
        self
    }

    pub fn get(&self, kind: BackendKind) -> Result<Arc<dyn LanguageModel>, BackendError> {
        let slot = match kind {
            BackendKind::Perplexity => &self.perplexity,
            BackendKind::Gemini => &self.gemini,
        };
        slot.clone()
            .ok_or_else(|| BackendError::NotConfigured(kind.to_string()))
    }
}

fn chat_backend(provider: &ProviderConfig) -> Option<Arc<dyn LanguageModel>> {
    let key = provider.api_key.clone()?;
    let backend = ChatCompletionsBackend::with_url(
        "perplexity",
        key,
        provider.api_url.as_deref().unwrap_or(PERPLEXITY_API_URL),
        provider.model.as_deref().unwrap_or(PERPLEXITY_MODEL),
    );
    Some(Arc::new(backend))
}

fn gemini_backend(provider: &ProviderConfig) -> Option<Arc<dyn LanguageModel>> {
    let key = provider.api_key.clone()?;
    let backend = GeminiBackend::with_url(
        key,
        provider.api_url.as_deref().unwrap_or(GEMINI_API_URL),
        provider.model.as_deref().unwrap_or(GEMINI_MODEL),
    );
    Some(Arc::new(backend))
}
