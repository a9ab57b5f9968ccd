use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;
use crate::util::ensure_dir;
use crate::{logi, logw};

fn required_dirs(cfg: &Config) -> Vec<PathBuf> {
    let paths = &cfg.paths;
    vec![
        paths.audio_dir.clone(),
        paths.video_dir.clone(),
        paths.output_dir.clone(),
        paths.data_dir.join("categories"),
        paths.log_dir.clone(),
    ]
}

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in required_dirs(cfg) {
        if !dir.exists() {
            ensure_dir(&dir).await?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

async fn tool_available(name: &str) -> bool {
    match tokio::process::Command::new(name)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Warns for each missing media tool; returns whether both are on PATH.
pub async fn check_ffmpeg() -> bool {
    let mut ok = true;
    for tool in ["ffmpeg", "ffprobe"] {
        if !tool_available(tool).await {
            logw(format!("{} not found in PATH. Please install FFmpeg.", tool));
            ok = false;
        }
    }
    ok
}
