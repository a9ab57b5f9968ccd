use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::api::SpeechSynthesizer;
use crate::config::VoiceSettings;
use crate::error::PipelineError;
use crate::idea::Script;
use crate::util::{ensure_dir, file_stamp};
use crate::{loge, logi, logok};

/// Narration stage: script text in, local audio file out.
pub struct Narrator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceSettings,
    output_dir: PathBuf,
}

impl Narrator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voice: VoiceSettings,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            synthesizer,
            voice,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Synthesizes the joined script and writes `voiceover_<stamp>.mp3`. No retry.
    pub async fn synthesize(&self, script: &Script) -> Result<PathBuf, PipelineError> {
        script.validate().map_err(PipelineError::synthesis)?;

        let text = script.full_text();
        logi(format!(
            "Generating voiceover with voice ID: {} ({} chars)",
            self.voice.default_voice,
            text.len()
        ));

        let audio = self
            .synthesizer
            .synthesize_speech(&text, &self.voice)
            .await
            .map_err(|err| {
                loge(format!("Error generating voiceover: {:#}", err));
                PipelineError::synthesis(err)
            })?;
        if audio.is_empty() {
            return Err(PipelineError::Synthesis(
                "speech backend returned no audio".to_string(),
            ));
        }

        ensure_dir(&self.output_dir)
            .await
            .map_err(PipelineError::synthesis)?;
        let path = self
            .output_dir
            .join(format!("voiceover_{}.mp3", file_stamp()));
        fs::write(&path, &audio)
            .await
            .map_err(|err| PipelineError::Synthesis(format!("write {}: {}", path.display(), err)))?;

        logok(format!("Voiceover saved to {}", path.display()));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingVoice {
        fail: bool,
        seen: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for RecordingVoice {
        async fn synthesize_speech(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>> {
            self.seen
                .lock()
                .unwrap()
                .push((text.to_string(), voice.default_voice.clone()));
            if self.fail {
                anyhow::bail!("ElevenLabs HTTP 401: unauthorized");
            }
            Ok(b"ID3fake-mp3".to_vec())
        }
    }

    fn script() -> Script {
        Script {
            hook: "Hook line.".into(),
            body: "Body text here.".into(),
            cta: "Follow now!".into(),
        }
    }

    #[tokio::test]
    async fn writes_audio_under_output_dir() {
        let dir = TempDir::new().unwrap();
        let voice = Arc::new(RecordingVoice::default());
        let narrator = Narrator::new(voice.clone(), VoiceSettings::default(), dir.path());

        let path = narrator.synthesize(&script()).await.unwrap();

        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3fake-mp3");
        let seen = voice.seen.lock().unwrap();
        assert_eq!(seen[0].0, "Hook line. Body text here. Follow now!");
        assert_eq!(seen[0].1, VoiceSettings::default().default_voice);
    }

    #[tokio::test]
    async fn backend_failure_is_synthesis_failure() {
        let dir = TempDir::new().unwrap();
        let voice = Arc::new(RecordingVoice {
            fail: true,
            ..Default::default()
        });
        let narrator = Narrator::new(voice, VoiceSettings::default(), dir.path());

        let err = narrator.synthesize(&script()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Synthesis(_)));
        assert!(err.reason().contains("401"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn blank_segment_never_reaches_backend() {
        let dir = TempDir::new().unwrap();
        let voice = Arc::new(RecordingVoice::default());
        let narrator = Narrator::new(voice.clone(), VoiceSettings::default(), dir.path());
        let mut bad = script();
        bad.cta.clear();

        assert!(narrator.synthesize(&bad).await.is_err());
        assert!(voice.seen.lock().unwrap().is_empty());
    }
}
