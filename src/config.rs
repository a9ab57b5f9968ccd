use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::logi;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "openai_api_key")]
    pub openai_key: String,
    #[serde(rename = "elevenlabs_api_key")]
    pub elevenlabs_key: String,
    #[serde(rename = "pexels_api_key")]
    pub pexels_key: String,
    pub openai: OpenAiSettings,
    pub voice_settings: VoiceSettings,
    pub footage: FootageSettings,
    pub video_settings: VideoSettings,
    pub paths: PathSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub default_voice: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub timeout_secs: u64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            default_voice: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            stability: 0.75,
            similarity_boost: 0.75,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FootageSettings {
    pub orientation: String,
    pub per_page: u32,
    pub clips_per_video: usize,
    pub min_width: u32,
    pub timeout_secs: u64,
}

impl Default for FootageSettings {
    fn default() -> Self {
        Self {
            orientation: "portrait".to_string(),
            per_page: 1,
            clips_per_video: 3,
            min_width: 720,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub fps: u32,
    pub bitrate: String,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub font_file: Option<PathBuf>,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate: "8000k".to_string(),
            width: 1080,
            height: 1920,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            font_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub audio_dir: PathBuf,
    pub video_dir: PathBuf,
    pub output_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            audio_dir: PathBuf::from("assets/audio"),
            video_dir: PathBuf::from("assets/video"),
            output_dir: PathBuf::from("assets/output"),
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Remote service whose credentials a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    OpenAi,
    ElevenLabs,
    Pexels,
}

impl Config {
    /// Reads `path` if it exists, then lets environment variables override the API keys.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if fs::metadata(path).await.is_ok() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            logi(format!("No config at {}; using defaults", path.display()));
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        let overrides = [
            ("OPENAI_API_KEY", &mut self.openai_key),
            ("ELEVENLABS_API_KEY", &mut self.elevenlabs_key),
            ("PEXELS_API_KEY", &mut self.pexels_key),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    *slot = value;
                }
            }
        }
    }

    pub fn require_keys(&self, backends: &[Backend]) -> Result<()> {
        for backend in backends {
            let (key, field) = match backend {
                Backend::OpenAi => (&self.openai_key, "openai_api_key / OPENAI_API_KEY"),
                Backend::ElevenLabs => (
                    &self.elevenlabs_key,
                    "elevenlabs_api_key / ELEVENLABS_API_KEY",
                ),
                Backend::Pexels => (&self.pexels_key, "pexels_api_key / PEXELS_API_KEY"),
            };
            if key.trim().is_empty() {
                anyhow::bail!("config: {} missing", field);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"pexels_api_key":"px","video_settings":{"fps":24},"voice_settings":{"stability":0.5}}"#,
        )
        .unwrap();

        let cfg = Config::load(&path).await.unwrap();
        assert_eq!(cfg.video_settings.fps, 24);
        assert_eq!(cfg.video_settings.bitrate, "8000k");
        assert_eq!(cfg.voice_settings.stability, 0.5);
        assert_eq!(cfg.voice_settings.similarity_boost, 0.75);
        assert_eq!(cfg.batch.workers, 4);
        assert_eq!(cfg.footage.orientation, "portrait");
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path().join("absent.json")).await.unwrap();
        assert_eq!(cfg.openai.model, "gpt-4");
        assert_eq!(cfg.paths.output_dir, PathBuf::from("assets/output"));
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load(&path).await.is_err());
    }

    #[test]
    fn require_keys_names_missing_field() {
        let cfg = Config {
            openai_key: "sk".to_string(),
            ..Config::default()
        };
        assert!(cfg.require_keys(&[Backend::OpenAi]).is_ok());
        let err = cfg.require_keys(&[Backend::OpenAi, Backend::Pexels]).unwrap_err();
        assert!(err.to_string().contains("pexels_api_key"));
    }
}
