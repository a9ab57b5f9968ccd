use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::SpeechSynthesizer;
use crate::config::VoiceSettings;
use crate::logw;

const TTS_BASE: &str = "https://api.elevenlabs.io/v1/text-to-speech";

pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: TTS_BASE.to_string(),
        }
    }

    /// Points the client at another text-to-speech endpoint root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

pub(crate) fn tts_body(text: &str, voice: &VoiceSettings) -> serde_json::Value {
    serde_json::json!({
        "text": text,
        "model_id": voice.model_id,
        "voice_settings": {
            "stability": voice.stability,
            "similarity_boost": voice.similarity_boost,
        },
    })
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize_speech(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url, voice.default_voice);

        let resp = self
            .client
            .post(url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&tts_body(text, voice))
            .timeout(Duration::from_secs(voice.timeout_secs))
            .send()
            .await
            .context("ElevenLabs request failed")?;

        // Only 200 carries audio; other 2xx replies are job or status bodies.
        let status = resp.status();
        if status != StatusCode::OK {
            let raw = resp.text().await.unwrap_or_default();
            let snippet = raw.chars().take(400).collect::<String>();
            logw(format!("ElevenLabs TTS failed HTTP {}", status.as_u16()));
            anyhow::bail!("ElevenLabs HTTP {}: {}", status.as_u16(), snippet);
        }

        let bytes = resp
            .bytes()
            .await
            .context("ElevenLabs response read failed")?;
        Ok(bytes.to_vec())
    }
}
