//! Alternate single-shot generation backend (Gemini wire protocol).
//!
//! Unlike the local backend, this one authenticates with an API key kept in
//! an injected key-value store, and produces one completion per call with
//! no retry policy. It serves the UI shell's "bring your own key" path and
//! is not used by the primary orchestrator.

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::error::BackendError;
use shared::storage::KeyValueStore;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Store key under which the API key lives.
pub const API_KEY_STORE_KEY: &str = "gemini_api_key";

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\n(.*?)\n```").expect("static regex"));

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

pub struct GeminiClient {
    http: Client,
    model: String,
    api_base: String,
    store: Arc<dyn KeyValueStore>,
}

impl GeminiClient {
    pub fn new(
        model: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(|e| BackendError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            model: model.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            store,
        })
    }

    /// Point the client at a different API host (proxies, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn set_api_key(&self, key: &str) -> Result<(), BackendError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(BackendError::Validation("API key cannot be empty".to_string()));
        }
        self.store.set(API_KEY_STORE_KEY, key);
        Ok(())
    }

    pub fn clear_api_key(&self) {
        self.store.remove(API_KEY_STORE_KEY);
    }

    pub fn has_api_key(&self) -> bool {
        self.store.get(API_KEY_STORE_KEY).is_some()
    }

    fn api_key(&self) -> Result<String, BackendError> {
        self.store.get(API_KEY_STORE_KEY).ok_or_else(|| {
            BackendError::Validation(
                "API key not set. Configure your API key first.".to_string(),
            )
        })
    }

    /// One completion for `prompt`, with an optional context block
    /// prepended the way the source UI framed it.
    pub async fn generate_content(
        &self,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<String, BackendError> {
        let key = self.api_key()?;
        let full_prompt = match context {
            Some(ctx) => format!("Context: {}\n\nUser Request: {}", ctx, prompt),
            None => prompt.to_string(),
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.api_base, self.model, key
        );
        let req = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: full_prompt }],
            }],
        };

        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if body.contains("API key") {
                return Err(BackendError::Validation(
                    "Invalid API key. Please check your API key.".to_string(),
                ));
            }
            if body.contains("quota") {
                return Err(BackendError::Connection(
                    "API quota exceeded. Please check your usage.".to_string(),
                ));
            }
            if body.contains("blocked") {
                return Err(BackendError::Connection(
                    "Content was blocked by safety filters. Try rephrasing your request."
                        .to_string(),
                ));
            }
            return Err(BackendError::Connection(format!("API error: {}", status)));
        }

        let body: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Connection(format!("invalid response: {e}")))?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(BackendError::Validation("empty response".to_string()));
        }
        Ok(text)
    }

    /// Generate source code for a description, optionally modifying
    /// existing code, and strip the surrounding markdown fence if the
    /// model added one.
    pub async fn generate_code(
        &self,
        description: &str,
        file_type: &str,
        existing_code: Option<&str>,
    ) -> Result<String, BackendError> {
        let existing = match existing_code {
            Some(code) => format!(
                "Existing code to modify:\n```{}\n{}\n```\n",
                file_type, code
            ),
            None => String::new(),
        };
        let prompt = format!(
            "Generate {file_type} code for: {description}\n\n\
             {existing}\
             Requirements:\n\
             - Write clean, modern {file_type} code\n\
             - Include proper imports\n\
             - Add comments for complex logic\n\
             - Make it responsive and accessible\n\n\
             Return only the code without explanations:"
        );

        let response = self.generate_content(&prompt, None).await?;
        Ok(extract_code(&response).to_string())
    }

    /// Probe with a trivial generation. Costs one request; only the shell's
    /// connectivity indicator should call this.
    pub async fn is_available(&self) -> bool {
        if !self.has_api_key() {
            return false;
        }
        self.generate_content("Test", None).await.is_ok()
    }
}

/// First fenced code block of `response`, or the whole response when no
/// fence is present.
pub fn extract_code(response: &str) -> &str {
    CODE_FENCE
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::storage::MemoryStore;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_with_key(server: Option<&MockServer>) -> GeminiClient {
        let store = Arc::new(MemoryStore::new());
        let client = GeminiClient::new("gemini-2.0-flash-exp", store).unwrap();
        client.set_api_key("test-key").unwrap();
        match server {
            Some(s) => client.with_api_base(s.uri()),
            None => client,
        }
    }

    #[test]
    fn test_api_key_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let client = GeminiClient::new("gemini-2.0-flash-exp", store.clone()).unwrap();

        assert!(!client.has_api_key());
        assert!(client.set_api_key("  ").is_err());
        client.set_api_key("  abc123  ").unwrap();
        assert!(client.has_api_key());
        assert_eq!(store.get(API_KEY_STORE_KEY), Some("abc123".to_string()));
        client.clear_api_key();
        assert!(!client.has_api_key());
    }

    #[tokio::test]
    async fn test_generate_content_without_key_is_validation() {
        let store = Arc::new(MemoryStore::new());
        let client = GeminiClient::new("gemini-2.0-flash-exp", store).unwrap();
        let err = client.generate_content("hi", None).await.unwrap_err();
        assert!(matches!(err, BackendError::Validation(_)));
    }

    #[tokio::test]
    async fn test_generate_content_parses_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v1beta/models/.*:generateContent$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [
                    { "content": { "parts": [ { "text": "generated" } ] } }
                ]
            })))
            .mount(&server)
            .await;

        let client = client_with_key(Some(&server));
        let out = client.generate_content("hi", Some("ctx")).await.unwrap();
        assert_eq!(out, "generated");
    }

    #[tokio::test]
    async fn test_invalid_key_maps_to_validation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r":generateContent$"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("API key not valid. Please pass a valid API key."),
            )
            .mount(&server)
            .await;

        let client = client_with_key(Some(&server));
        let err = client.generate_content("hi", None).await.unwrap_err();
        assert!(matches!(err, BackendError::Validation(_)));
    }

    #[test]
    fn test_extract_code_strips_fence() {
        let reply = "Here you go:\n```html\n<html></html>\n```\nEnjoy!";
        assert_eq!(extract_code(reply), "<html></html>");
        assert_eq!(extract_code("no fence here"), "no fence here");
    }
}
