use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

static STAMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// UTC millisecond timestamp plus a process-wide sequence number.
///
/// Two calls never return the same value within one process, so files named
/// from it are never overwritten by concurrent workers.
pub fn file_stamp() -> String {
    let seq = STAMP_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{:04}", chrono::Utc::now().format("%Y%m%d%H%M%S%3f"), seq)
}

pub async fn ensure_dir(path: &Path) -> Result<()> {
    if fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Ok(());
    }
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create dir {}", path.display()))
}

pub async fn file_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

pub async fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent).await?;
        }
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Keeps characters that are safe in a file name; everything else becomes `_`.
pub fn sanitize_file_component(input: &str) -> String {
    let out: String = input
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() { "clip".to_string() } else { out }
}

pub(crate) fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}
