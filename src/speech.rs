//! Text-to-speech client boundary.
//!
//! Hands already-composed, markdown-stripped reply text to an
//! ElevenLabs-style endpoint and returns the raw audio bytes. Voice
//! parameters travel with the request; the default voice comes from
//! configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::SpeechConfig;
use crate::error::SpeechError;

const DEFAULT_API_BASE: &str = "https://api.elevenlabs.io/v1";

/// Voice rendering parameters, forwarded verbatim to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.5,
            use_speaker_boost: true,
        }
    }
}

/// Client for the external speech capability.
///
/// The API key is read from `ELEVENLABS_API_KEY` at call time.
pub struct SpeechClient {
    client: reqwest::Client,
    config: SpeechConfig,
    api_base: String,
}

impl SpeechClient {
    pub fn new(config: &SpeechConfig) -> Result<Self, SpeechError> {
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

    /// Render `text` with the given voice and return the audio stream
    /// bytes (`mp3` in the configured format).
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, SpeechError> {
        let api_key =
            std::env::var("ELEVENLABS_API_KEY").map_err(|_| SpeechError::MissingApiKey)?;

        let url = format!(
            "{}/text-to-speech/{}?output_format={}",
            self.api_base, voice_id, self.config.output_format
        );
        let body = serde_json::json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": settings,
        });

        let response = self
            .client
            .post(url)
            .header("xi-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SpeechError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let audio = response.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(audio)
    }
}
