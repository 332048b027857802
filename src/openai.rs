use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::AiConfig;
use crate::constants::{CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON};

const COPYWRITER_SYSTEM_PROMPT: &str = "You are an expert performance-marketing copywriter \
     for Facebook and Instagram ads. Reply with a JSON object of the form \
     {\"variations\": [{\"headline\": string, \"primaryText\": string, \
     \"description\": string, \"callToAction\": string}]} and nothing else.";

#[derive(Error, Debug)]
pub enum OpenAiError {
    #[error("API request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("{0}")]
    Api(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedCopy {
    pub headline: String,
    #[serde(alias = "primaryText")]
    pub primary_text: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "callToAction")]
    pub call_to_action: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub url: String,
    pub revised_prompt: Option<String>,
}

/// Copy and image generation providers, as seen by the AI service.
#[async_trait]
pub trait AdGenerator: Send + Sync {
    fn copy_model(&self) -> &str;
    fn image_model(&self) -> &str;

    async fn generate_copy(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> Result<Vec<GeneratedCopy>, OpenAiError>;

    async fn generate_image(&self, prompt: &str, size: &str)
        -> Result<GeneratedImage, OpenAiError>;
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    copy_model: String,
    image_model: String,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig, timeout: Duration) -> Result<Self, OpenAiError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            copy_model: config.copy_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value, OpenAiError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {status}: {text}"));
            return Err(OpenAiError::Api(message));
        }

        serde_json::from_str(&text).map_err(|e| OpenAiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AdGenerator for OpenAiClient {
    fn copy_model(&self) -> &str {
        &self.copy_model
    }

    fn image_model(&self) -> &str {
        &self.image_model
    }

    async fn generate_copy(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> Result<Vec<GeneratedCopy>, OpenAiError> {
        let body = json!({
            "model": self.copy_model,
            "temperature": temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": COPYWRITER_SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ]
        });

        let response = self.post("/chat/completions", body).await?;
        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| OpenAiError::InvalidResponse("missing message content".to_string()))?;
        debug!(chars = content.len(), "received copy completion");

        parse_copy_variations(content)
    }

    async fn generate_image(
        &self,
        prompt: &str,
        size: &str,
    ) -> Result<GeneratedImage, OpenAiError> {
        let body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": size
        });

        let response = self.post("/images/generations", body).await?;
        let image = &response["data"][0];
        let url = match (image["url"].as_str(), image["b64_json"].as_str()) {
            (Some(url), _) => url.to_string(),
            (None, Some(b64)) => format!("data:image/png;base64,{b64}"),
            (None, None) => {
                return Err(OpenAiError::InvalidResponse("missing image data".to_string()));
            }
        };

        Ok(GeneratedImage {
            url,
            revised_prompt: image["revised_prompt"].as_str().map(str::to_string),
        })
    }
}

/// Accepts either `{"variations": [...]}` or a bare array of variations.
pub fn parse_copy_variations(content: &str) -> Result<Vec<GeneratedCopy>, OpenAiError> {
    let value: serde_json::Value = serde_json::from_str(content.trim())
        .map_err(|e| OpenAiError::InvalidResponse(format!("copy is not JSON: {e}")))?;

    let list = match value {
        serde_json::Value::Array(items) => serde_json::Value::Array(items),
        serde_json::Value::Object(mut map) => map
            .remove("variations")
            .ok_or_else(|| OpenAiError::InvalidResponse("missing variations".to_string()))?,
        _ => return Err(OpenAiError::InvalidResponse("unexpected copy shape".to_string())),
    };

    let copies: Vec<GeneratedCopy> =
        serde_json::from_value(list).map_err(|e| OpenAiError::InvalidResponse(e.to_string()))?;
    if copies.is_empty() {
        return Err(OpenAiError::InvalidResponse("no variations returned".to_string()));
    }
    Ok(copies)
}
