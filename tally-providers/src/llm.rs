//! LLM completion client.
//!
//! Speaks the `models/{model}:generateContent` protocol: one user turn, an
//! optional system instruction, JSON mode with a response schema when the
//! request carries one, and the web-search tool when internet context is
//! requested.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use tally_core::constants::{DEFAULT_LLM_API_URL, DEFAULT_LLM_MODEL, DEFAULT_LLM_TIMEOUT_SECS};
use tally_core::error::{Result, TallyError};
use tally_core::traits::CompletionSource;
use tally_core::types::{Completion, CompletionRequest};

use crate::http::{build_client, check_status, read_body, transport_error};

const PROVIDER: &str = "llm";

/// LLM client configuration.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LlmConfig {
    /// API base URL
    pub base_url: String,
    /// API key sent as `x-goog-api-key`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout_seconds: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl LlmConfig {
    /// Creates config for the given base URL with default model and timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Client for LLM completions.
pub struct CompletionClient {
    config: LlmConfig,
    http_client: reqwest::Client,
}

impl CompletionClient {
    /// Creates a new client with the given config.
    pub fn with_config(config: LlmConfig) -> Self {
        let http_client = build_client(config.timeout_seconds);
        Self {
            config,
            http_client,
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl CompletionSource for CompletionClient {
    #[instrument(skip(self, request), fields(model = %self.config.model, structured = request.schema.is_some()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        request.validate()?;
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| TallyError::ConfigError("LLM API key not configured".into()))?;
        let timeout = self.config.timeout_seconds;

        info!("Requesting completion");
        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let response = check_status(PROVIDER, response, timeout).await?;
        let body = read_body(response, timeout).await?;
        let payload: GenerateResponse = serde_json::from_str(&body)?;
        let text = payload.into_text()?;

        debug!(chars = text.len(), "Completion received");
        Completion::from_raw(request, text)
    }
}

/// Builds the `generateContent` body for `request`.
fn request_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
    });

    if let Some(instruction) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }
    if let Some(schema) = &request.schema {
        body["generationConfig"] = json!({
            "responseMimeType": "application/json",
            "responseSchema": schema,
        });
    }
    if request.add_internet_context {
        body["tools"] = json!([{ "googleSearch": {} }]);
    }
    body
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Result<String> {
        let blocked = self.prompt_feedback.and_then(|feedback| feedback.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(TallyError::MalformedResponse(match blocked {
                Some(reason) => format!("prompt blocked: {reason}"),
                None => "no candidates in response".into(),
            }));
        };

        let text: String = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        if text.is_empty() {
            return Err(TallyError::MalformedResponse(
                "candidate has no text parts".into(),
            ));
        }
        Ok(text)
    }
}
