//! OpenAI-compatible `/audio/speech` endpoint.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::backend::{AudioFormat, BackendDescriptor, SpeechBackend};
use crate::error::BackendError;
use crate::request::Rate;
use crate::script::Script;

pub const IDENTIFIER: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "tts-1";

const DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    identifier: IDENTIFIER,
    supports_online: true,
    native_scripts: &[Script::Latin, Script::Arabic],
    output_format: AudioFormat::Mp3,
};

#[derive(Debug, Clone)]
pub struct OpenAiSpeechBackend {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiSpeechBackend {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl SpeechBackend for OpenAiSpeechBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &DESCRIPTOR
    }

    async fn generate(
        &self,
        text: &str,
        voice: &str,
        rate: Rate,
        out_path: &Path,
    ) -> Result<PathBuf, BackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BackendError::transient(IDENTIFIER, "missing API key"))?;

        let payload = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice,
            "response_format": "mp3",
            "speed": rate.speed_multiplier(),
        });
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::transient(IDENTIFIER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body).unwrap_or(body);
            return Err(BackendError::transient(
                IDENTIFIER,
                format!("HTTP {status}: {message}"),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.starts_with("application/json") {
            return Err(BackendError::transient(
                IDENTIFIER,
                "expected audio payload, got JSON response",
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::transient(IDENTIFIER, e))?;
        tokio::fs::write(out_path, &bytes).await?;
        Ok(out_path.to_path_buf())
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(|message| message.as_str())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_error_message() {
        let body = r#"{"error":{"message":"Invalid voice","type":"invalid_request_error"}}"#;
        assert_eq!(extract_error_message(body).as_deref(), Some("Invalid voice"));
        assert_eq!(extract_error_message("plain text"), None);
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let backend = OpenAiSpeechBackend::new(None, "http://127.0.0.1:9");
        let dir = tempfile::tempdir().unwrap();
        let err = backend
            .generate("hi", "alloy", Rate::default(), &dir.path().join("a.mp3"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing API key"));
    }
}
