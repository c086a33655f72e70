use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SynthesisError;

/// Speaking rate used when a request does not say otherwise (words per minute).
pub const DEFAULT_WPM: u32 = 170;

/// Language hint supplied by the caller (usually from a language detector).
///
/// Advisory only: the orchestrator sniffs the script from the text itself and
/// lets that win over a mislabeled hint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    #[default]
    Auto,
    English,
    Urdu,
    Other(String),
}

impl Language {
    /// Two-letter code, `None` for [`Language::Auto`].
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Auto => None,
            Self::English => Some("en"),
            Self::Urdu => Some("ur"),
            Self::Other(code) => Some(code.as_str()),
        }
    }
}

impl From<&str> for Language {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Self::Auto,
            "en" | "eng" | "english" => Self::English,
            "ur" | "urd" | "urdu" => Self::Urdu,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Language {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.code().unwrap_or("auto").to_string()
    }
}

/// Speaking rate, interpreted by each backend in its own units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rate {
    /// Signed percentage relative to the backend's normal rate (`-50` is half speed).
    Percent(i32),
    WordsPerMinute(u32),
}

impl Default for Rate {
    fn default() -> Self {
        Self::Percent(0)
    }
}

impl Rate {
    /// Rate in words per minute, relative to `base` for percentages.
    pub fn words_per_minute(self, base: u32) -> u32 {
        let wpm = match self {
            Self::Percent(p) => (i64::from(base) * (100 + i64::from(p)) / 100).max(0) as u32,
            Self::WordsPerMinute(w) => w,
        };
        wpm.clamp(80, 450)
    }

    /// Rate as a speed multiplier where `1.0` is normal speed.
    pub fn speed_multiplier(self) -> f32 {
        let speed = match self {
            Self::Percent(p) => 1.0 + p as f32 / 100.0,
            Self::WordsPerMinute(w) => w as f32 / DEFAULT_WPM as f32,
        };
        speed.clamp(0.5, 2.0)
    }
}

/// Fallback level that produced an audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Online,
    NeuralOffline,
    DeterministicOffline,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::NeuralOffline => "neural-offline",
            Self::DeterministicOffline => "deterministic-offline",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single text-to-speech job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub rate: Rate,
    /// Logical output filename. The extension may be rewritten to match what
    /// the producing backend actually wrote; read [`SynthesisResult::audio_path`].
    #[serde(default)]
    pub output_name: Option<String>,
    /// Online backend identifier; the configured default when `None`.
    #[serde(default)]
    pub backend: Option<String>,
    /// Whole-request deadline; the configured default when `None`.
    #[serde(default, skip_serializing)]
    pub deadline: Option<Duration>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<Language>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_rate(mut self, rate: Rate) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_backend(mut self, identifier: impl Into<String>) -> Self {
        self.backend = Some(identifier.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Reject requests that no tier could ever satisfy.
    pub fn validate(&self) -> Result<(), SynthesisError> {
        if self.text.trim().is_empty() {
            return Err(SynthesisError::InvalidRequest(
                "text is empty or whitespace".to_string(),
            ));
        }
        if let Some(name) = &self.output_name {
            if output_file_name(name).is_none() {
                return Err(SynthesisError::InvalidRequest(format!(
                    "output name {name:?} has no file name component"
                )));
            }
        }
        Ok(())
    }
}

/// Final path component of a caller-supplied output name.
pub(crate) fn output_file_name(name: &str) -> Option<&str> {
    std::path::Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}

/// A written, non-empty audio file and the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub audio_path: PathBuf,
    pub language: String,
    pub tier: Tier,
}
