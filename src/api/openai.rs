use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::TextGenerator;
use crate::config::OpenAiSettings;
use crate::logw;
use crate::util::trim_copy_utf8_safe;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_PROMPT_CHARS: usize = 16_000;

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: impl Into<String>, settings: OpenAiSettings) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            settings,
        }
    }
}

fn log_api_error(err: &serde_json::Value) {
    if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
        logw(format!("OpenAI error message: {}", msg));
    }
    if let Some(typ) = err.get("type").and_then(|v| v.as_str()) {
        logw(format!("OpenAI error type: {}", typ));
    }
    if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
        logw(format!("OpenAI error code: {}", code));
    }
}

/// Pulls `choices[0].message.content` out of a chat-completion body.
pub(crate) fn extract_message_content(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        log_api_error(err);
        return None;
    }

    root.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let prompt = trim_copy_utf8_safe(prompt, MAX_PROMPT_CHARS);
        let body = json!({
            "model": self.settings.model,
            "messages": [
                {"role": "user", "content": prompt},
            ],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
        });

        let resp = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            if let Ok(root) = serde_json::from_str::<serde_json::Value>(&raw) {
                if let Some(err) = root.get("error") {
                    log_api_error(err);
                }
            }
            let snippet = raw.chars().take(800).collect::<String>();
            anyhow::bail!("OpenAI HTTP {}: {}", status.as_u16(), snippet);
        }

        extract_message_content(&raw).ok_or_else(|| {
            let snippet = raw.chars().take(800).collect::<String>();
            anyhow::anyhow!("OpenAI response parse failed: {}", snippet)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"hook\":\"h\"}"}}]}"#;
        assert_eq!(
            extract_message_content(body).as_deref(),
            Some("{\"hook\":\"h\"}")
        );
    }

    #[test]
    fn error_body_yields_none() {
        let body = r#"{"error":{"message":"bad key","type":"auth","code":"invalid_api_key"}}"#;
        assert!(extract_message_content(body).is_none());
        assert!(extract_message_content("not json").is_none());
        assert!(extract_message_content(r#"{"choices":[]}"#).is_none());
    }
}
