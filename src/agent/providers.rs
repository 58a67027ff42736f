use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::CompletionRequest;
use crate::config::CompletionConfig;
use crate::error::CompletionError;

/// A hosted text-completion endpoint.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Candidate texts in the order the service returned them. An empty
    /// list is a valid answer, distinct from an error.
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>, CompletionError>;
}

/// OpenAI-style `/v1/completions` endpoint with bearer auth.
pub struct HttpCompletionProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpCompletionProvider {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>, CompletionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        let body = response.text().await?;
        let parsed: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| CompletionError::Malformed(e.to_string()))?;
        let texts = parse_choices(&parsed)?;
        debug!(model = %request.model, choices = texts.len(), "completion returned");
        Ok(texts)
    }
}

/// Pull `choices[].text` out of a completion response. Missing `choices`
/// counts as no candidates.
pub fn parse_choices(body: &serde_json::Value) -> Result<Vec<String>, CompletionError> {
    let Some(choices) = body.get("choices") else {
        return Ok(Vec::new());
    };
    let choices = choices
        .as_array()
        .ok_or_else(|| CompletionError::Malformed("`choices` is not an array".into()))?;

    choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            choice
                .get("text")
                .and_then(|t| t.as_str())
                .map(String::from)
                .ok_or_else(|| CompletionError::Malformed(format!("choices[{i}] has no text")))
        })
        .collect()
}

/// Create a provider from config.
pub fn from_config(config: &CompletionConfig) -> anyhow::Result<Box<dyn CompletionProvider>> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "no API key for the completion endpoint. Set TATTVA_API_KEY env var or run `tattva onboard`."
        )
    })?;
    Ok(Box::new(HttpCompletionProvider::new(
        config.endpoint.clone(),
        api_key,
    )))
}
