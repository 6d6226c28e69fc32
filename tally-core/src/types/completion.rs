//! LLM completion types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TallyError};

/// A single prompt sent to the completion provider.
///
/// Every field participates in the cache key: two requests differing only in
/// `add_internet_context` are different requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    /// User prompt
    pub prompt: String,
    /// JSON schema the answer must follow; `None` asks for free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// System instruction prepended by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    /// Let the provider ground the answer with a web search
    #[serde(default)]
    pub add_internet_context: bool,
}

impl CompletionRequest {
    /// Creates a free-text request.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Requests a structured answer matching `schema`.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Sets the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Enables web-search grounding.
    pub fn with_internet_context(mut self) -> Self {
        self.add_internet_context = true;
        self
    }

    /// Rejects requests that cannot be sent upstream.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(TallyError::ValidationError("prompt cannot be empty".into()));
        }
        if let Some(schema) = &self.schema {
            if !schema.is_object() {
                return Err(TallyError::ValidationError(
                    "schema must be a JSON object".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Answer from the completion provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Completion {
    /// Free-text answer (no schema requested)
    Text(String),
    /// Parsed JSON answer (schema requested)
    Structured(Value),
}

impl Completion {
    /// Builds the completion for `request` from the provider's raw text.
    ///
    /// With a schema the text must parse as JSON; markdown code fences some
    /// models wrap around JSON are stripped first.
    pub fn from_raw(request: &CompletionRequest, raw: String) -> Result<Self> {
        if request.schema.is_none() {
            return Ok(Completion::Text(raw));
        }
        let body = strip_code_fence(&raw);
        serde_json::from_str(body)
            .map(Completion::Structured)
            .map_err(|e| {
                TallyError::MalformedResponse(format!("structured answer is not valid JSON: {e}"))
            })
    }

    /// Returns the answer as a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Completion::Text(text) => Value::String(text.clone()),
            Completion::Structured(value) => value.clone(),
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
