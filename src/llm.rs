use crate::config::{LlmProvider, LlmSettings};
use crate::error::ProviderError;
use crate::providers::{LanguageModel, ResponseShape};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const GEMINI_API: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_API: &str = "https://api.openai.com";

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

async fn check_status(provider: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        provider,
        status,
        body,
    }
    .into())
}

/// Builds the client for one model name using the configured backend.
pub fn build_language_model(
    settings: &LlmSettings,
    api_key: &str,
    model: &str,
) -> Result<Arc<dyn LanguageModel>> {
    let model: Arc<dyn LanguageModel> = match settings.provider {
        LlmProvider::Gemini => Arc::new(GeminiClient::new(
            settings.base_url.as_deref().unwrap_or(GEMINI_API),
            api_key,
            model,
        )?),
        LlmProvider::OpenAi => Arc::new(OpenAiClient::new(
            settings.base_url.as_deref().unwrap_or(OPENAI_API),
            api_key,
            model,
        )?),
    };
    Ok(model)
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, prompt: &str, shape: ResponseShape) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        );

        let mut body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        if shape == ResponseShape::Json {
            body["generationConfig"] = serde_json::json!({
                "responseMimeType": "application/json",
            });
        }

        debug!("Calling Gemini model {}", self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;
        let response = check_status("Gemini", response).await?;

        let parsed: GeminiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::Empty { provider: "Gemini" }.into());
        }
        Ok(text)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Any `/v1/chat/completions` endpoint: OpenAI itself, Ollama, vLLM, ...
pub struct OpenAiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, prompt: &str, shape: ResponseShape) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.api_base);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });
        if shape == ResponseShape::Json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        debug!("Calling chat completions model {}", self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Chat completion request failed")?;
        let response = check_status("OpenAI", response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::Empty { provider: "OpenAI" }.into());
        }
        Ok(text)
    }
}
