//! HTTP client for the local generation backend (Ollama wire protocol).
//!
//! All failure handling is bounded and typed: per-request timeouts, a linear
//! retry policy for the catalog and chat calls, and the
//! `Validation`/`Connection`/`Model` taxonomy from `shared::error`. The
//! client carries its configuration by value; there is no process-wide
//! instance.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use shared::chat::ChatMessage;
use shared::error::BackendError;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Client configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Must start with `http://` or `https://`; a trailing slash is stripped.
    pub base_url: String,
    /// Per-attempt timeout for catalog, chat, and generate calls.
    pub request_timeout: Duration,
    /// Timeout for the fast availability probe.
    pub probe_timeout: Duration,
    /// Timeout for model pulls, which stream for minutes.
    pub pull_timeout: Duration,
    /// How many times a retryable call is attempted in total.
    pub retry_attempts: u32,
    /// Base delay between attempts; attempt n waits `retry_backoff * n`.
    pub retry_backoff: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(2),
            pull_timeout: Duration::from_secs(600),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// One entry from the backend's model catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: u64,
}

/// Sampling knobs forwarded to the chat endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

// The tags endpoint also reports `model`, `modified_at`, and `digest`;
// only the fields the core consumes are captured here.
#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a GenerationOptions>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: WireMessage,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
}

/// Seam between the orchestrator and whatever produces completions, so
/// tests can substitute a scripted backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError>;
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, BackendError>;
    async fn is_available(&self) -> bool;
    async fn model_exists(&self, model: &str) -> bool;
}

#[derive(Debug)]
pub struct BackendClient {
    http: Client,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(BackendError::Validation(format!(
                "base URL must start with http:// or https://, got \"{}\"",
                config.base_url
            )));
        }
        let mut config = config;
        while config.base_url.ends_with('/') {
            config.base_url.pop();
        }
        let http = Client::builder()
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| BackendError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn with_defaults() -> Result<Self, BackendError> {
        Self::new(BackendConfig::default())
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Fetch the model catalog, retrying transient failures.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let mut last = None;
        for attempt in 1..=self.config.retry_attempts.max(1) {
            match self.list_models_once().await {
                Ok(models) => return Ok(models),
                Err(err) => {
                    warn!(
                        "list models attempt {}/{} failed: {}",
                        attempt, self.config.retry_attempts, err
                    );
                    last = Some(err);
                    if attempt < self.config.retry_attempts {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                }
            }
        }
        Err(self.exhausted("list models", last))
    }

    async fn list_models_once(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let resp = self
            .http
            .get(self.endpoint("/api/tags"))
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(BackendError::Connection(format!(
                "backend returned {}",
                resp.status()
            )));
        }
        let body: TagsResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Connection(format!("invalid tags response: {e}")))?;
        Ok(body
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name,
                size_bytes: m.size,
            })
            .collect())
    }

    /// One chat completion, retrying transient failures. A 404 for the
    /// model is definitive and fails immediately without touching the
    /// retry budget.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String, BackendError> {
        self.chat_with_options(model, messages, None).await
    }

    pub async fn chat_with_options(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: Option<GenerationOptions>,
    ) -> Result<String, BackendError> {
        if model.trim().is_empty() {
            return Err(BackendError::Model("no model specified".to_string()));
        }
        if messages.is_empty() {
            return Err(BackendError::Validation("message list is empty".to_string()));
        }
        if let Some(pos) = messages.iter().position(|m| m.content.trim().is_empty()) {
            return Err(BackendError::Validation(format!(
                "message {} has empty content",
                pos + 1
            )));
        }

        let wire: Vec<WireMessage> = messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        let mut last = None;
        for attempt in 1..=self.config.retry_attempts.max(1) {
            match self.chat_once(model, &wire, options.as_ref()).await {
                Ok(text) => return Ok(text),
                Err(err @ BackendError::Model(_)) | Err(err @ BackendError::Validation(_)) => {
                    return Err(err)
                }
                Err(err) => {
                    warn!(
                        "chat attempt {}/{} failed: {}",
                        attempt, self.config.retry_attempts, err
                    );
                    last = Some(err);
                    if attempt < self.config.retry_attempts {
                        tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    }
                }
            }
        }
        Err(self.exhausted("chat", last))
    }

    async fn chat_once(
        &self,
        model: &str,
        messages: &[WireMessage],
        options: Option<&GenerationOptions>,
    ) -> Result<String, BackendError> {
        let req = ChatRequest {
            model,
            messages,
            stream: false,
            options,
        };
        let resp = self
            .http
            .post(self.endpoint("/api/chat"))
            .json(&req)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::Model(format!(
                "model \"{}\" not found on the backend",
                model
            )));
        }
        if !resp.status().is_success() {
            return Err(BackendError::Connection(format!(
                "backend returned {}",
                resp.status()
            )));
        }
        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Connection(format!("invalid chat response: {e}")))?;
        if body.message.content.trim().is_empty() {
            return Err(BackendError::Validation(
                "empty response from the backend".to_string(),
            ));
        }
        Ok(body.message.content)
    }

    /// Single-shot completion via `/api/generate`. Not covered by the
    /// retry policy.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, BackendError> {
        if model.trim().is_empty() {
            return Err(BackendError::Model("no model specified".to_string()));
        }
        if prompt.trim().is_empty() {
            return Err(BackendError::Validation("prompt is empty".to_string()));
        }
        let req = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
        };
        let resp = self
            .http
            .post(self.endpoint("/api/generate"))
            .json(&req)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::Model(format!(
                "model \"{}\" not found on the backend",
                model
            )));
        }
        if !resp.status().is_success() {
            return Err(BackendError::Connection(format!(
                "backend returned {}",
                resp.status()
            )));
        }
        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Connection(format!("invalid generate response: {e}")))?;
        if body.response.trim().is_empty() {
            return Err(BackendError::Validation(
                "empty response from the backend".to_string(),
            ));
        }
        Ok(body.response)
    }

    /// Fast connectivity probe for UI indicators. Bounded by
    /// `probe_timeout`, never retried, failures swallowed to `false`.
    pub async fn is_available(&self) -> bool {
        match self
            .http
            .get(self.endpoint("/api/tags"))
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                debug!("availability probe failed: {}", err);
                false
            }
        }
    }

    /// Whether the catalog currently lists `model`. Any failure maps to
    /// `false`.
    pub async fn model_exists(&self, model: &str) -> bool {
        match self.list_models().await {
            Ok(models) => models.iter().any(|m| m.name == model),
            Err(err) => {
                debug!("model existence check failed: {}", err);
                false
            }
        }
    }

    /// Pull a model onto the backend. Pulls stream for minutes and are
    /// resumable server-side, so retrying is left to the caller.
    pub async fn pull_model(&self, name: &str) -> Result<(), BackendError> {
        self.pull_model_with_progress(name, |_| {}).await
    }

    /// Like [`pull_model`](Self::pull_model), invoking `on_progress` with
    /// 0-100 as bytes arrive, computed against the Content-Length header.
    pub async fn pull_model_with_progress<F>(
        &self,
        name: &str,
        mut on_progress: F,
    ) -> Result<(), BackendError>
    where
        F: FnMut(u8),
    {
        if name.trim().is_empty() {
            return Err(BackendError::Model("no model specified".to_string()));
        }
        let req = PullRequest { name };
        let resp = self
            .http
            .post(self.endpoint("/api/pull"))
            .json(&req)
            .timeout(self.config.pull_timeout)
            .send()
            .await
            .map_err(transport_error)?;
        if !resp.status().is_success() {
            return Err(BackendError::Connection(format!(
                "backend returned {} while pulling \"{}\"",
                resp.status(),
                name
            )));
        }

        let total = resp.content_length().filter(|t| *t > 0);
        let mut received: u64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(transport_error)?;
            received += bytes.len() as u64;
            if let Some(total) = total {
                on_progress((received.saturating_mul(100) / total).min(100) as u8);
            }
        }
        on_progress(100);
        Ok(())
    }

    fn exhausted(&self, what: &str, last: Option<BackendError>) -> BackendError {
        let detail = last
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        BackendError::Connection(format!(
            "{} failed after {} attempts: {}",
            what, self.config.retry_attempts, detail
        ))
    }
}

#[async_trait]
impl GenerationBackend for BackendClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        BackendClient::list_models(self).await
    }

    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, BackendError> {
        BackendClient::chat(self, model, messages).await
    }

    async fn is_available(&self) -> bool {
        BackendClient::is_available(self).await
    }

    async fn model_exists(&self, model: &str) -> bool {
        BackendClient::model_exists(self, model).await
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Connection(format!("timeout: {err}"))
    } else {
        BackendError::Connection(err.to_string())
    }
}
