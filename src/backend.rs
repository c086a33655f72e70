//! Capability contract shared by every synthesis backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::request::Rate;
use crate::script::{is_renderable, Script};

/// Audio container a backend writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            _ => None,
        }
    }
}

/// Static facts about a backend implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub identifier: &'static str,
    /// Needs network access; gates the connectivity probe.
    pub supports_online: bool,
    /// Scripts the backend can pronounce without transliteration.
    pub native_scripts: &'static [Script],
    /// Container written by [`SpeechBackend::generate`].
    pub output_format: AudioFormat,
}

impl BackendDescriptor {
    /// Whether `text` can be spoken without transliteration.
    pub fn renders(&self, text: &str) -> bool {
        is_renderable(text, self.native_scripts)
    }
}

/// A concrete text-to-speech implementation.
///
/// `generate` writes audio to `out_path` (whose extension already matches
/// [`BackendDescriptor::output_format`]) and returns the path it actually
/// wrote. Implementations need not check for empty output; the orchestrator
/// does that uniformly.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    async fn generate(
        &self,
        text: &str,
        voice: &str,
        rate: Rate,
        out_path: &Path,
    ) -> Result<PathBuf, BackendError>;
}

/// Fail with [`BackendError::EmptyOutput`] unless `path` is a non-empty file.
pub async fn verify_output(path: &Path) -> Result<(), BackendError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(BackendError::EmptyOutput {
            path: path.to_path_buf(),
        }),
    }
}

/// Remove `path` if it exists; missing files are not an error.
pub async fn remove_stale(path: &Path) -> Result<(), BackendError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            log::debug!("Removed stale output {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackendError::Io(e)),
    }
}
