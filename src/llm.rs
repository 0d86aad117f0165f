use std::sync::Arc;

use async_trait::async_trait;
use ollama_rs::error::OllamaError;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::{LlmConfig, Provider};
use crate::error::GenerationError;

/// A text-in, text-out completion endpoint.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

/// Model served by a local Ollama daemon.
pub struct OllamaModel {
    client: Ollama,
    model: String,
}

impl OllamaModel {
    pub fn new(base_url: &str, model: String) -> Result<Self, GenerationError> {
        let url = Url::parse(base_url)
            .map_err(|e| GenerationError::Provider(format!("invalid Ollama url {}: {}", base_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| GenerationError::Provider(format!("Ollama url {} has no host", base_url)))?;
        let port = url.port_or_known_default().unwrap_or(11434);

        Ok(Self {
            client: Ollama::new(format!("{}://{}", url.scheme(), host), port),
            model,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string());

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| match e {
                OllamaError::ReqwestError(e) => transport_error(e),
                other => GenerationError::Provider(format!("Ollama error: {}", other)),
            })?;

        Ok(response.response)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Model behind an OpenAI style `/chat/completions` endpoint, such as Groq.
pub struct OpenAiCompatibleModel {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleModel {
    pub fn new(base_url: &str, api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
        }
    }
}

fn transport_error(e: reqwest::Error) -> GenerationError {
    if e.is_connect() || e.is_request() || e.is_body() || e.is_timeout() {
        GenerationError::ConnectionLost(e.to_string())
    } else {
        GenerationError::Provider(e.to_string())
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {"role": "user", "content": prompt}
                ],
                "temperature": 0
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(GenerationError::Provider(format!(
                "{} returned {}: {}",
                self.endpoint, status, body
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Provider(format!("Failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Provider("No choices in response".to_string()))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// The SQL model and the answer model for a session.
pub fn from_config(
    config: &LlmConfig,
) -> Result<(Arc<dyn LanguageModel>, Arc<dyn LanguageModel>), GenerationError> {
    config.validate()?;
    debug!(provider = ?config.provider, sql_model = %config.sql_model, answer_model = %config.answer_model, "building language models");

    match config.provider {
        Provider::Ollama => Ok((
            Arc::new(OllamaModel::new(&config.base_url, config.sql_model.clone())?),
            Arc::new(OllamaModel::new(&config.base_url, config.answer_model.clone())?),
        )),
        Provider::Groq => {
            let api_key = config.api_key.clone().ok_or(GenerationError::MissingApiKey)?;
            Ok((
                Arc::new(OpenAiCompatibleModel::new(
                    &config.base_url,
                    api_key.clone(),
                    config.sql_model.clone(),
                )),
                Arc::new(OpenAiCompatibleModel::new(
                    &config.base_url,
                    api_key,
                    config.answer_model.clone(),
                )),
            ))
        }
    }
}
