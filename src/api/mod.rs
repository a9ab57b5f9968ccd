//! Network backends behind narrow capability traits.
//!
//! The stages only see these traits, so tests drive the pipeline with
//! deterministic fakes and retry policy can be layered on per backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::VoiceSettings;

pub mod elevenlabs;
pub mod openai;
pub mod pexels;

pub use elevenlabs::ElevenLabsClient;
pub use openai::OpenAiClient;
pub use pexels::PexelsClient;

const USER_AGENT: &str = concat!("ai-tiktok-shorts/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client; backends clone it and set per-request timeouts.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends one user prompt and returns the model's reply text.
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns raw audio bytes; a non-success status is an error.
    async fn synthesize_speech(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait FootageSource: Send + Sync {
    async fn search(&self, query: &str, orientation: &str, per_page: u32)
    -> Result<Vec<FootageVideo>>;

    /// Streams `url` into `dest`.
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// One stock-footage search hit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FootageVideo {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub video_files: Vec<Rendition>,
}

/// One encoded variant of a footage hit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rendition {
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    pub link: String,
}
