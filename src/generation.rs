//! Chat-completion client boundary.
//!
//! Sends the composed message set to an OpenAI-style
//! `POST {api_base}/chat/completions` endpoint and returns the reply
//! text. The backend is an external capability: this module does not
//! retry, stream, or interpret the reply.

use serde::Serialize;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Chat-completion message roles.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the prompt payload sent to the backend.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Client for the external text-generation capability.
///
/// The API key is read from `OPENAI_API_KEY` at call time, so the server
/// can start (and serve /health, /tts) without one.
pub struct GenerationClient {
    client: reqwest::Client,
    config: GenerationConfig,
    api_base: String,
}

impl GenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Ok(Self {
            client,
            config: config.clone(),
            api_base,
        })
    }

    /// Run one chat completion and return the reply text.
    ///
    /// An empty reply is returned as an empty string; the caller decides
    /// what to show in its place.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| GenerationError::MissingApiKey)?;

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let reply = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        Ok(reply.to_string())
    }
}
