use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{FootageSource, FootageVideo, Rendition};
use crate::config::FootageSettings;
use crate::error::PipelineError;
use crate::idea::Script;
use crate::keywords::extract_keywords;
use crate::util::{file_stamp, sanitize_file_component};
use crate::{loge, logi, logok, logw};

/// A downloaded clip and the keyword that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipReference {
    pub keyword: String,
    pub path: PathBuf,
}

/// First `hd` rendition at least `min_width` wide, else the first rendition.
pub fn choose_rendition(video: &FootageVideo, min_width: u32) -> Option<&Rendition> {
    video
        .video_files
        .iter()
        .find(|file| {
            file.quality.as_deref() == Some("hd") && file.width.unwrap_or(0) >= min_width
        })
        .or_else(|| video.video_files.first())
}

/// Footage stage: keywords from the script, one downloaded clip per keyword.
pub struct FootageSelector {
    source: Arc<dyn FootageSource>,
    settings: FootageSettings,
    output_dir: PathBuf,
}

impl FootageSelector {
    pub fn new(
        source: Arc<dyn FootageSource>,
        settings: FootageSettings,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            settings,
            output_dir: output_dir.into(),
        }
    }

    pub fn default_clip_count(&self) -> usize {
        self.settings.clips_per_video
    }

    async fn fetch_for_keyword(&self, keyword: &str) -> anyhow::Result<Option<ClipReference>> {
        let videos = self
            .source
            .search(keyword, &self.settings.orientation, self.settings.per_page)
            .await?;

        let Some(video) = videos.first() else {
            return Ok(None);
        };
        let Some(rendition) = choose_rendition(video, self.settings.min_width) else {
            logw(format!("Footage hit {} for '{}' has no renditions", video.id, keyword));
            return Ok(None);
        };

        let dest = self.output_dir.join(format!(
            "{}_{}.mp4",
            sanitize_file_component(keyword),
            file_stamp()
        ));
        self.source.download(&rendition.link, &dest).await?;
        logok(format!("Video saved to {}", dest.display()));

        Ok(Some(ClipReference {
            keyword: keyword.to_string(),
            path: dest,
        }))
    }

    /// Clips for `script`, at most `target_count`, in keyword order.
    ///
    /// Keywords that find nothing or fail to download are skipped. An empty
    /// result is a selection failure.
    pub async fn select_clips(
        &self,
        script: &Script,
        target_count: usize,
    ) -> Result<Vec<ClipReference>, PipelineError> {
        let keywords = extract_keywords(&script.full_text(), target_count)
            .map_err(|err| PipelineError::Selection(format!("{:#}", err)))?;
        logi(format!("Extracted keywords: {:?}", keywords));

        let mut clips = Vec::with_capacity(keywords.len());
        for keyword in &keywords {
            match self.fetch_for_keyword(keyword).await {
                Ok(Some(clip)) => clips.push(clip),
                Ok(None) => logw(format!("No usable footage for keyword: {}", keyword)),
                Err(err) => loge(format!("Footage for '{}' failed: {:#}", keyword, err)),
            }
        }

        logi(format!("Selected {} videos for script", clips.len()));
        if clips.is_empty() {
            return Err(PipelineError::Selection(format!(
                "no clips for any of {} keywords",
                keywords.len()
            )));
        }
        Ok(clips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn rendition(quality: Option<&str>, width: Option<u32>, link: &str) -> Rendition {
        Rendition {
            quality: quality.map(str::to_string),
            width,
            height: None,
            link: link.to_string(),
        }
    }

    fn video(files: Vec<Rendition>) -> FootageVideo {
        FootageVideo {
            id: 1,
            duration: Some(8.0),
            video_files: files,
        }
    }

    /// Keyword -> result; `None` means the search errors.
    struct FakeStock {
        hits: HashMap<&'static str, Option<Vec<FootageVideo>>>,
        broken_links: Vec<&'static str>,
    }

    #[async_trait]
    impl FootageSource for FakeStock {
        async fn search(&self, query: &str, orientation: &str, per_page: u32) -> Result<Vec<FootageVideo>> {
            assert_eq!(orientation, "portrait");
            assert_eq!(per_page, 1);
            match self.hits.get(query) {
                Some(Some(videos)) => Ok(videos.clone()),
                Some(None) => anyhow::bail!("HTTP 500"),
                None => Ok(Vec::new()),
            }
        }

        async fn download(&self, url: &str, dest: &Path) -> Result<()> {
            if self.broken_links.iter().any(|link| *link == url) {
                anyhow::bail!("HTTP 404");
            }
            std::fs::write(dest, url.as_bytes())?;
            Ok(())
        }
    }

    fn script() -> Script {
        Script {
            hook: "ocean waves".into(),
            body: "mountain".into(),
            cta: "forest".into(),
        }
    }

    #[test]
    fn prefers_wide_hd_then_first() {
        let v = video(vec![
            rendition(Some("sd"), Some(640), "sd"),
            rendition(Some("hd"), Some(640), "narrow-hd"),
            rendition(Some("hd"), Some(1080), "wide-hd"),
        ]);
        assert_eq!(choose_rendition(&v, 720).unwrap().link, "wide-hd");

        let v = video(vec![
            rendition(Some("sd"), Some(640), "sd"),
            rendition(Some("hd"), None, "unknown-hd"),
        ]);
        assert_eq!(choose_rendition(&v, 720).unwrap().link, "sd");
        assert!(choose_rendition(&video(vec![]), 720).is_none());
    }

    #[tokio::test]
    async fn skips_failed_keywords() {
        let dir = TempDir::new().unwrap();
        let mut hits = HashMap::new();
        hits.insert("ocean", Some(vec![video(vec![rendition(Some("hd"), Some(1080), "ocean.mp4")])]));
        hits.insert("waves", None);
        hits.insert("mountain", Some(vec![video(vec![rendition(Some("sd"), Some(540), "mountain.mp4")])]));
        hits.insert("forest", Some(vec![video(vec![rendition(Some("hd"), Some(1080), "forest.mp4")])]));
        let stock = FakeStock {
            hits,
            broken_links: vec!["forest.mp4"],
        };
        let selector = FootageSelector::new(Arc::new(stock), FootageSettings::default(), dir.path());

        let clips = selector.select_clips(&script(), 10).await.unwrap();

        let mut keywords: Vec<&str> = clips.iter().map(|c| c.keyword.as_str()).collect();
        keywords.sort();
        assert_eq!(keywords, vec!["mountain", "ocean"]);
        for clip in &clips {
            assert!(clip.path.starts_with(dir.path()));
            assert!(clip.path.exists());
        }
    }

    #[tokio::test]
    async fn all_keywords_failing_is_selection_failure() {
        let dir = TempDir::new().unwrap();
        let stock = FakeStock {
            hits: HashMap::new(),
            broken_links: Vec::new(),
        };
        let selector = FootageSelector::new(Arc::new(stock), FootageSettings::default(), dir.path());

        let err = selector.select_clips(&script(), 3).await.unwrap_err();
        assert!(matches!(err, PipelineError::Selection(_)));
    }

    #[tokio::test]
    async fn never_exceeds_target_count() {
        let dir = TempDir::new().unwrap();
        let mut hits = HashMap::new();
        for word in ["ocean", "waves", "mountain", "forest"] {
            hits.insert(word, Some(vec![video(vec![rendition(Some("hd"), Some(1080), word)])]));
        }
        let stock = FakeStock {
            hits,
            broken_links: Vec::new(),
        };
        let selector = FootageSelector::new(Arc::new(stock), FootageSettings::default(), dir.path());

        let clips = selector.select_clips(&script(), 2).await.unwrap();
        assert_eq!(clips.len(), 2);
    }
}
