use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::error::PipelineError;
use crate::ffmpeg::VideoBackend;
use crate::footage::ClipReference;
use crate::idea::Script;
use crate::util::{ensure_dir, file_stamp};
use crate::{logi, logok, logw};

const HOOK_SECONDS: f64 = 3.0;
const CTA_SECONDS: f64 = 10.0;
const BODY_CAPTION_CHARS: usize = 100;
const DURATION_EPSILON: f64 = 1e-3;

/// How a source clip is fitted to the portrait canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Landscape: scale to canvas height, center-crop to canvas width.
    CropLandscape,
    /// Portrait or square: scale to canvas width, height follows aspect.
    FitWidth,
}

impl Framing {
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        if width > height {
            Framing::CropLandscape
        } else {
            Framing::FitWidth
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbedClip {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

/// Leading `duration` seconds of `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub source: PathBuf,
    pub duration: f64,
    pub framing: Framing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionStyle {
    Hook,
    Body,
    Cta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub style: CaptionStyle,
}

/// Everything an encoder needs to render one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub segments: Vec<Segment>,
    pub audio: PathBuf,
    pub duration: f64,
    pub captions: Vec<Caption>,
}

impl Composition {
    pub fn without_captions(&self) -> Self {
        Self {
            captions: Vec::new(),
            ..self.clone()
        }
    }
}

/// Accumulates segments until the narration length is covered.
#[derive(Debug)]
pub struct SegmentPlanner {
    remaining: f64,
    segments: Vec<Segment>,
}

impl SegmentPlanner {
    pub fn new(total: f64) -> Self {
        Self {
            remaining: total,
            segments: Vec::new(),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.remaining <= DURATION_EPSILON
    }

    /// Takes `min(clip, remaining)` seconds of `clip`. Clips without a positive
    /// duration are ignored.
    pub fn push(&mut self, clip: &ProbedClip) {
        if self.is_filled() || clip.duration <= DURATION_EPSILON {
            return;
        }
        let take = clip.duration.min(self.remaining);
        self.segments.push(Segment {
            source: clip.path.clone(),
            duration: take,
            framing: Framing::for_dimensions(clip.width, clip.height),
        });
        self.remaining -= take;
    }

    /// Repeats the last segment until the total is covered.
    pub fn finish(mut self) -> Vec<Segment> {
        let Some(last) = self.segments.last().cloned() else {
            return self.segments;
        };
        if !self.is_filled() {
            let repeats = (self.remaining / last.duration).ceil() as usize;
            logi(format!(
                "Looping last clip {} time(s) to cover {:.2}s",
                repeats, self.remaining
            ));
            for _ in 0..repeats {
                if self.is_filled() {
                    break;
                }
                let take = last.duration.min(self.remaining);
                self.segments.push(Segment {
                    duration: take,
                    ..last.clone()
                });
                self.remaining -= take;
            }
        }
        self.segments
    }
}

/// Covers `total` seconds with `clips` in order, looping the last one if short.
pub fn plan_segments(clips: &[ProbedClip], total: f64) -> Vec<Segment> {
    let mut planner = SegmentPlanner::new(total);
    for clip in clips {
        if planner.is_filled() {
            break;
        }
        planner.push(clip);
    }
    planner.finish()
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() > BODY_CAPTION_CHARS {
        let head: String = body.chars().take(BODY_CAPTION_CHARS).collect();
        format!("{}...", head)
    } else {
        body.to_string()
    }
}

/// Hook for the first 3s, body from 3s to 10s before the end, call-to-action
/// for the last 10s. Windows that would be empty are left out.
///
/// Hook and call-to-action share the centre of the frame, so the
/// call-to-action never starts before the hook ends.
pub fn caption_track(script: &Script, total: f64) -> Vec<Caption> {
    let hook_end = HOOK_SECONDS.min(total);
    let windows = [
        (script.hook.clone(), 0.0, hook_end, CaptionStyle::Hook),
        (
            truncate_body(&script.body),
            HOOK_SECONDS,
            total - CTA_SECONDS,
            CaptionStyle::Body,
        ),
        (
            script.cta.clone(),
            (total - CTA_SECONDS).max(hook_end),
            total,
            CaptionStyle::Cta,
        ),
    ];

    windows
        .into_iter()
        .filter(|(text, start, end, _)| end - start > DURATION_EPSILON && !text.trim().is_empty())
        .map(|(text, start, end, style)| Caption {
            text,
            start,
            end,
            style,
        })
        .collect()
}

/// Assembly stage: clips + narration + captions into one encoded file.
pub struct Assembler {
    backend: Arc<dyn VideoBackend>,
    output_dir: PathBuf,
}

impl Assembler {
    pub fn new(backend: Arc<dyn VideoBackend>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn default_output_name() -> String {
        format!("tiktok_{}.mp4", file_stamp())
    }

    async fn probe_clip(&self, path: &Path) -> anyhow::Result<ProbedClip> {
        let (width, height) = self.backend.probe_dimensions(path).await?;
        let duration = self.backend.probe_duration(path).await?;
        Ok(ProbedClip {
            path: path.to_path_buf(),
            width,
            height,
            duration,
        })
    }

    pub async fn assemble(
        &self,
        script: &Script,
        clips: &[ClipReference],
        audio: &Path,
        output_name: Option<&str>,
    ) -> Result<PathBuf, PipelineError> {
        let total = self
            .backend
            .probe_duration(audio)
            .await
            .map_err(|err| PipelineError::Assembly(format!("audio decode failed: {:#}", err)))?;
        logi(format!(
            "Creating video with {} clips and audio duration {:.2}s",
            clips.len(),
            total
        ));

        let mut planner = SegmentPlanner::new(total);
        for clip in clips {
            if planner.is_filled() {
                break;
            }
            match self.probe_clip(&clip.path).await {
                Ok(probed) => planner.push(&probed),
                Err(err) => logw(format!("Skipping unreadable clip {}: {:#}", clip.path.display(), err)),
            }
        }
        let segments = planner.finish();
        if segments.is_empty() {
            return Err(PipelineError::Assembly(
                "no video clips available to create video".to_string(),
            ));
        }

        let composition = Composition {
            segments,
            audio: audio.to_path_buf(),
            duration: total,
            captions: caption_track(script, total),
        };

        ensure_dir(&self.output_dir)
            .await
            .map_err(PipelineError::assembly)?;
        let name = output_name
            .map(str::to_string)
            .unwrap_or_else(Self::default_output_name);
        let out = self.output_dir.join(name);

        logi(format!("Writing video to {}", out.display()));
        if let Err(err) = self.backend.encode(&composition, &out).await {
            if composition.captions.is_empty() {
                return Err(PipelineError::assembly(err));
            }
            logw(format!("Captioned encode failed, retrying without captions: {:#}", err));
            let _ = fs::remove_file(&out).await;
            if let Err(retry_err) = self
                .backend
                .encode(&composition.without_captions(), &out)
                .await
            {
                return Err(PipelineError::Assembly(format!(
                    "{:#} (captioned encode failed first: {:#})",
                    retry_err, err
                )));
            }
        }

        logok(format!("Video created successfully: {}", out.display()));
        Ok(out)
    }
}
