//! Completion service contract and an OpenAI-compatible chat-completions client

use crate::config::Config;
use crate::error::{ChatBiError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// JSON schema the response should follow; `None` asks for free text
    pub output_schema: Option<Value>,
    /// Overrides the client's default model
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            output_schema: None,
            model: None,
        }
    }

    pub fn structured(system: impl Into<String>, user: impl Into<String>, schema: Value) -> Self {
        Self {
            output_schema: Some(schema),
            ..Self::text(system, user)
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResponse {
    /// Content that decoded into a JSON object
    Structured(Value),
    Text(String),
}

impl CompletionResponse {
    /// Classify raw completion content.
    pub fn from_content(content: &str) -> Self {
        match serde_json::from_str::<Value>(content.trim()) {
            Ok(value @ Value::Object(_)) => CompletionResponse::Structured(value),
            _ => CompletionResponse::Text(content.to_string()),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            CompletionResponse::Structured(value) => value.to_string(),
            CompletionResponse::Text(text) => text.clone(),
        }
    }
}

/// Opaque natural-language completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ChatBiError::Config("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key, config.llm_base_url.clone(), config.sql_model.clone()))
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let system = match &request.output_schema {
            Some(schema) => format!(
                "{}\n\nRespond with a single JSON object matching this JSON schema, no other text:\n{}",
                request.system, schema
            ),
            None => request.system.clone(),
        };

        let mut body = json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": request.user}
            ],
            "temperature": 0.1,
        });
        if request.output_schema.is_some() {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.request_body(&request);
        debug!("Calling completion endpoint with model {}", body["model"]);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatBiError::Completion(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChatBiError::Completion(format!("LLM API returned {}: {}", status, detail)));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| ChatBiError::Completion(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ChatBiError::Completion("No content in LLM response".to_string()))?;

        Ok(match request.output_schema {
            Some(_) => CompletionResponse::from_content(content),
            None => CompletionResponse::Text(content.to_string()),
        })
    }
}
