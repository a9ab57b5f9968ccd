use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{ElevenLabsClient, OpenAiClient, PexelsClient};
use crate::assembly::Assembler;
use crate::config::Config;
use crate::error::PipelineError;
use crate::ffmpeg::FfmpegBackend;
use crate::footage::FootageSelector;
use crate::idea::{ContentPools, IdeaGenerator, VideoIdea};
use crate::narration::Narrator;
use crate::util::{file_stamp, save_json};
use crate::{loge, logi, logok, logw};

/// Narration -> Footage -> Assembly for one idea.
pub struct Producer {
    narrator: Narrator,
    footage: FootageSelector,
    assembler: Assembler,
}

impl Producer {
    pub fn new(narrator: Narrator, footage: FootageSelector, assembler: Assembler) -> Self {
        Self {
            narrator,
            footage,
            assembler,
        }
    }

    /// Wires the HTTP backends and ffmpeg from configuration.
    pub fn from_config(cfg: &Config, client: reqwest::Client) -> Self {
        let narrator = Narrator::new(
            Arc::new(ElevenLabsClient::new(client.clone(), cfg.elevenlabs_key.clone())),
            cfg.voice_settings.clone(),
            cfg.paths.audio_dir.clone(),
        );
        let footage = FootageSelector::new(
            Arc::new(PexelsClient::new(
                client,
                cfg.pexels_key.clone(),
                cfg.footage.timeout_secs,
            )),
            cfg.footage.clone(),
            cfg.paths.video_dir.clone(),
        );
        let assembler = Assembler::new(
            Arc::new(FfmpegBackend::new(cfg.video_settings.clone())),
            cfg.paths.output_dir.clone(),
        );
        Self::new(narrator, footage, assembler)
    }

    /// Produces the video for `idea`.
    ///
    /// Narration and footage selection run concurrently; both must succeed
    /// before assembly starts. The first failing stage is returned.
    pub async fn produce(
        &self,
        idea: &VideoIdea,
        output_name: Option<&str>,
    ) -> Result<PathBuf, PipelineError> {
        let label = idea
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        logi(format!("Processing idea {}: {}", label, idea.title));

        let script = &idea.script;
        let (audio, clips) = tokio::join!(
            self.narrator.synthesize(script),
            self.footage
                .select_clips(script, self.footage.default_clip_count())
        );
        let audio = audio?;
        let clips = clips?;

        let out = self
            .assembler
            .assemble(script, &clips, &audio, output_name)
            .await?;
        logok(format!("Video for idea {} created: {}", label, out.display()));
        Ok(out)
    }
}

/// Builds the idea generator from configuration and the on-disk pools.
pub async fn idea_generator_from_config(cfg: &Config, client: reqwest::Client) -> IdeaGenerator {
    let pools = ContentPools::load(&cfg.paths.data_dir).await;
    IdeaGenerator::new(
        Arc::new(OpenAiClient::new(
            client,
            cfg.openai_key.clone(),
            cfg.openai.clone(),
        )),
        pools,
    )
}

/// Idea selection parameters for a single run; `None` draws from the pools.
#[derive(Debug, Clone, Default)]
pub struct IdeaRequest {
    pub category: Option<String>,
    pub audience: Option<String>,
    pub trend: Option<String>,
}

/// One idea through the whole pipeline, saving the idea next to `snapshot_dir`.
pub async fn produce_single(
    ideas: &IdeaGenerator,
    producer: &Producer,
    request: &IdeaRequest,
    snapshot_dir: &Path,
    output_name: Option<&str>,
) -> Result<PathBuf, PipelineError> {
    logi("Starting single video generation process");
    let idea = ideas
        .generate_idea(
            request.category.as_deref(),
            request.audience.as_deref(),
            request.trend.as_deref(),
        )
        .await?;

    let idea_path = snapshot_dir.join(format!("video_idea_{}.json", file_stamp()));
    if let Err(err) = save_json(&idea, &idea_path).await {
        logw(format!("Could not save idea: {:#}", err));
    } else {
        logi(format!("Saved idea to {}", idea_path.display()));
    }

    producer.produce(&idea, output_name).await.map_err(|err| {
        loge(format!("Single video failed at {} stage: {}", err.stage(), err.reason()));
        err
    })
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::idea::Script;
    use tempfile::TempDir;

    fn idea(body: &str) -> VideoIdea {
        VideoIdea {
            title: "How to garden".into(),
            category: "Gardening".into(),
            target_audience: "Beginners".into(),
            trend_type: "tutorial".into(),
            script: Script {
                hook: "Grow herbs".into(),
                body: body.into(),
                cta: "Follow".into(),
            },
            visual_elements: String::new(),
            audio_suggestions: String::new(),
            hashtags: Vec::new(),
            id: Some(1),
        }
    }

    #[tokio::test]
    async fn produces_video_covering_narration() {
        let dir = TempDir::new().unwrap();
        std_dirs(dir.path());
        let producer = producer(dir.path());

        let out = producer
            .produce(&idea("basil loves sunlight"), Some("garden.mp4"))
            .await
            .unwrap();

        assert_eq!(out, dir.path().join("output/garden.mp4"));
        assert_eq!(std::fs::read_to_string(out).unwrap(), "9.000");
    }

    #[tokio::test]
    async fn narration_failure_stops_item() {
        let dir = TempDir::new().unwrap();
        std_dirs(dir.path());
        let producer = producer(dir.path());

        let err = producer.produce(&idea("mute basil"), None).await.unwrap_err();
        assert_eq!(err.stage(), crate::Stage::Narration);
        assert_eq!(std::fs::read_dir(dir.path().join("output")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn footage_failure_stops_item() {
        let dir = TempDir::new().unwrap();
        std_dirs(dir.path());
        let producer = producer(dir.path());
        let mut item = idea("void");
        item.script.hook = "void".into();
        item.script.cta = "void".into();

        let err = producer.produce(&item, None).await.unwrap_err();
        assert_eq!(err.stage(), crate::Stage::Footage);
    }

    #[tokio::test]
    async fn single_run_saves_idea_and_video() {
        let dir = TempDir::new().unwrap();
        std_dirs(dir.path());
        let producer = producer(dir.path());
        let ideas = IdeaGenerator::with_seed(Arc::new(FakeModel), ContentPools::default(), 5);
        let request = IdeaRequest {
            category: Some("Gardening".into()),
            ..Default::default()
        };

        let out = produce_single(&ideas, &producer, &request, dir.path(), None)
            .await
            .unwrap();

        assert!(out.exists());
        let saved: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("video_idea_"))
            .collect();
        assert_eq!(saved.len(), 1);
    }
}
