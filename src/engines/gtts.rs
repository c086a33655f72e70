//! Google Translate speech endpoint (the service behind gTTS).
//!
//! The endpoint rejects long inputs, so text is packed into chunks of at most
//! [`MAX_CHUNK_CHARS`] characters on word boundaries and the returned MP3
//! payloads are concatenated in order. MP3 frames are self-delimiting, so the
//! concatenation plays as one file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};

use crate::backend::{AudioFormat, BackendDescriptor, SpeechBackend};
use crate::error::BackendError;
use crate::request::Rate;
use crate::script::Script;

pub const IDENTIFIER: &str = "gtts";
pub const DEFAULT_BASE_URL: &str = "https://translate.google.com";
pub const MAX_CHUNK_CHARS: usize = 100;

const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

const DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    identifier: IDENTIFIER,
    supports_online: true,
    native_scripts: &[Script::Latin, Script::Arabic],
    output_format: AudioFormat::Mp3,
};

#[derive(Debug, Clone)]
pub struct GttsBackend {
    client: reqwest::Client,
    base_url: String,
}

impl GttsBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        lang: &str,
        idx: usize,
        total: usize,
        slow: bool,
    ) -> Result<Vec<u8>, BackendError> {
        let url = format!("{}/translate_tts", self.base_url.trim_end_matches('/'));
        let char_len = chunk.chars().count().to_string();
        let idx = idx.to_string();
        let total = total.to_string();
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_AGENT)
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", lang),
                ("total", total.as_str()),
                ("idx", idx.as_str()),
                ("textlen", char_len.as_str()),
                ("client", "tw-ob"),
                ("ttsspeed", if slow { "0.3" } else { "1" }),
            ])
            .send()
            .await
            .map_err(|e| BackendError::transient(IDENTIFIER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::transient(
                IDENTIFIER,
                format!("HTTP {status}: {}", body.chars().take(200).collect::<String>()),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if content_type.starts_with("text/") || content_type.starts_with("application/json") {
            return Err(BackendError::transient(
                IDENTIFIER,
                format!("expected audio payload, got '{content_type}'"),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::transient(IDENTIFIER, e))?;
        if bytes.is_empty() {
            return Err(BackendError::transient(
                IDENTIFIER,
                format!("empty audio payload for chunk {idx}"),
            ));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechBackend for GttsBackend {
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
        let chunks = split_chunks(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(BackendError::transient(IDENTIFIER, "nothing to speak"));
        }
        let slow = rate.speed_multiplier() <= 0.75;

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let bytes = self
                .fetch_chunk(chunk, voice, idx, chunks.len(), slow)
                .await?;
            audio.extend_from_slice(&bytes);
        }

        log::debug!(
            "gtts returned {} bytes in {} chunk(s) for language {voice}",
            audio.len(),
            chunks.len()
        );
        tokio::fs::write(out_path, &audio).await?;
        Ok(out_path.to_path_buf())
    }
}

/// Pack whitespace-separated words into chunks of at most `max_chars`
/// characters. Words longer than the limit are split mid-word.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
