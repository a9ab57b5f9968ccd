use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::assembly::{Caption, CaptionStyle, Composition, Framing};
use crate::config::VideoSettings;
use crate::logi;

const CAPTION_MARGIN: u32 = 40;
const BODY_BOTTOM_MARGIN: u32 = 120;
const AUDIO_BITRATE: &str = "192k";

/// Decode/encode primitives the assembly stage depends on.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// `(width, height)` of the first video stream.
    async fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32)>;

    /// Renders `composition` to `out`, replacing any existing file.
    async fn encode(&self, composition: &Composition, out: &Path) -> Result<()>;
}

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd.output().await.context("Command execution failed")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(6)..].join(" | ");
        return Err(anyhow::anyhow!("{} failed: {}", args[0], tail));
    }

    Ok(())
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed on {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts
        .next()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let h = parts
        .next()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);

    if w == 0 || h == 0 {
        return Err(anyhow::anyhow!("Invalid dimensions for {}", path.display()));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed on {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration for {}", path.display()));
    }
    Ok(duration)
}

/// Greedy word wrap; words longer than `width` get a line of their own.
pub(crate) fn wrap_text(text: &str, width: usize) -> String {
    let width = width.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}

fn escape_filter_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

struct CaptionLook {
    font_size: u32,
    color: &'static str,
    boxed: bool,
    side_margin: u32,
}

fn caption_look(style: CaptionStyle) -> CaptionLook {
    match style {
        CaptionStyle::Hook => CaptionLook {
            font_size: 70,
            color: "white",
            boxed: true,
            side_margin: CAPTION_MARGIN,
        },
        CaptionStyle::Body => CaptionLook {
            font_size: 50,
            color: "white",
            boxed: false,
            side_margin: CAPTION_MARGIN * 2,
        },
        CaptionStyle::Cta => CaptionLook {
            font_size: 60,
            color: "yellow",
            boxed: false,
            side_margin: CAPTION_MARGIN,
        },
    }
}

/// Characters per caption line for a given canvas width and font size.
fn chars_per_line(canvas_width: u32, look: &CaptionLook) -> usize {
    let usable = canvas_width.saturating_sub(look.side_margin) as f64;
    (usable / (look.font_size as f64 * 0.55)).floor().max(8.0) as usize
}

/// Renders through the `ffmpeg`/`ffprobe` binaries on PATH.
pub struct FfmpegBackend {
    settings: VideoSettings,
}

impl FfmpegBackend {
    pub fn new(settings: VideoSettings) -> Self {
        Self { settings }
    }

    fn framing_filter(&self, framing: Framing) -> String {
        let (w, h) = (self.settings.width, self.settings.height);
        match framing {
            Framing::CropLandscape => format!("scale=-2:{h},crop={w}:{h}"),
            Framing::FitWidth => format!(
                "scale={w}:-2,pad=w={w}:h='max(ih,{h})':x=(ow-iw)/2:y=(oh-ih)/2:color=black,crop={w}:{h}"
            ),
        }
    }

    fn drawtext_filter(&self, caption: &Caption, text_file: &Path) -> String {
        let look = caption_look(caption.style);
        let y = match caption.style {
            CaptionStyle::Body => format!("h-text_h-{}", BODY_BOTTOM_MARGIN),
            CaptionStyle::Hook | CaptionStyle::Cta => "(h-text_h)/2".to_string(),
        };

        let mut filter = format!(
            "drawtext=textfile='{}':fontsize={}:fontcolor={}:line_spacing=10:x=(w-text_w)/2:y={}",
            escape_filter_path(text_file),
            look.font_size,
            look.color,
            y
        );
        if let Some(font) = &self.settings.font_file {
            filter.push_str(&format!(":fontfile='{}'", escape_filter_path(font)));
        }
        if look.boxed {
            filter.push_str(":box=1:boxcolor=black@0.7:boxborderw=20");
        }
        filter.push_str(&format!(
            ":enable='between(t,{:.3},{:.3})'",
            caption.start, caption.end
        ));
        filter
    }

    /// Builds the full ffmpeg argument list. `caption_files[i]` holds the
    /// wrapped text of `composition.captions[i]`.
    pub(crate) fn build_args(
        &self,
        composition: &Composition,
        caption_files: &[PathBuf],
        out: &Path,
    ) -> Vec<String> {
        let fps = self.settings.fps.max(1);
        let mut args: Vec<String> = ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for segment in &composition.segments {
            args.push("-t".to_string());
            args.push(format!("{:.3}", segment.duration));
            args.push("-i".to_string());
            args.push(segment.source.display().to_string());
        }
        let audio_index = composition.segments.len();
        args.push("-i".to_string());
        args.push(composition.audio.display().to_string());

        let mut graph: Vec<String> = composition
            .segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                format!(
                    "[{i}:v]{},setsar=1,fps={fps},format=yuv420p[v{i}]",
                    self.framing_filter(segment.framing)
                )
            })
            .collect();

        let inputs: String = (0..composition.segments.len())
            .map(|i| format!("[v{i}]"))
            .collect();
        graph.push(format!(
            "{inputs}concat=n={}:v=1:a=0[vcat]",
            composition.segments.len()
        ));

        let video_label = if composition.captions.is_empty() || caption_files.is_empty() {
            "[vcat]".to_string()
        } else {
            let chain = composition
                .captions
                .iter()
                .zip(caption_files)
                .map(|(caption, file)| self.drawtext_filter(caption, file))
                .collect::<Vec<_>>()
                .join(",");
            graph.push(format!("[vcat]{chain}[vout]"));
            "[vout]".to_string()
        };

        args.extend([
            "-filter_complex".to_string(),
            graph.join(";"),
            "-map".to_string(),
            video_label,
            "-map".to_string(),
            format!("{audio_index}:a"),
            "-t".to_string(),
            format!("{:.3}", composition.duration),
            "-r".to_string(),
            fps.to_string(),
            "-c:v".to_string(),
            self.settings.video_codec.clone(),
            "-b:v".to_string(),
            self.settings.bitrate.clone(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            self.settings.audio_codec.clone(),
            "-b:a".to_string(),
            AUDIO_BITRATE.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            out.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl VideoBackend for FfmpegBackend {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        ffprobe_duration_seconds(path).await
    }

    async fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        ffprobe_video_dimensions(path).await
    }

    async fn encode(&self, composition: &Composition, out: &Path) -> Result<()> {
        if composition.segments.is_empty() {
            anyhow::bail!("nothing to encode");
        }

        // Caption text goes through files so drawtext never sees raw quotes or colons.
        let scratch = tempfile::tempdir().context("failed to create caption scratch dir")?;
        let mut caption_files = Vec::with_capacity(composition.captions.len());
        for (i, caption) in composition.captions.iter().enumerate() {
            let look = caption_look(caption.style);
            let wrapped = wrap_text(&caption.text, chars_per_line(self.settings.width, &look));
            let path = scratch.path().join(format!("caption_{i}.txt"));
            tokio::fs::write(&path, wrapped)
                .await
                .with_context(|| format!("write caption file {}", path.display()))?;
            caption_files.push(path);
        }

        logi(format!(
            "Encoding {} segment(s), {} caption(s), {:.2}s -> {}",
            composition.segments.len(),
            composition.captions.len(),
            composition.duration,
            out.display()
        ));
        let args = self.build_args(composition, &caption_files, out);
        run_cmd(&args).await?;

        if !out.exists() {
            anyhow::bail!("encoder produced no file at {}", out.display());
        }
        Ok(())
    }
}
