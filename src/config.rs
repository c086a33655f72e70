//! Orchestrator configuration: defaults < JSON file < environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::engines::espeak::EspeakConfig;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the orchestrator needs that is not part of a single request.
///
/// ```
/// use tts_cascade::OrchestratorConfigBuilder;
///
/// let config = OrchestratorConfigBuilder::default()
///     .output_dir("/tmp/tts-out")
///     .online_backend("openai")
///     .build()
///     .unwrap();
/// assert_eq!(config.online_backend, "openai");
/// ```
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory all audio files are written to; created on first use.
    pub output_dir: PathBuf,

    /// `(host, port)` pairs tried in order by the connectivity probe.
    pub probe_candidates: Vec<(String, u16)>,
    #[serde(rename = "probe_timeout_ms", with = "millis")]
    pub probe_timeout: Duration,

    #[serde(rename = "online_timeout_ms", with = "millis")]
    pub online_timeout: Duration,
    /// Includes lazy model construction on first use of a script.
    #[serde(rename = "neural_timeout_ms", with = "millis")]
    pub neural_timeout: Duration,
    #[serde(rename = "offline_timeout_ms", with = "millis")]
    pub offline_timeout: Duration,
    /// Whole-request budget when the request does not carry its own.
    #[serde(rename = "request_deadline_ms", with = "opt_millis")]
    pub request_deadline: Option<Duration>,

    /// Identifier of the online backend used when a request names none or an
    /// unknown one.
    pub online_backend: String,
    pub gtts_base_url: String,
    pub openai_base_url: String,
    pub openai_model: String,
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,

    pub kokoro_model_dir: PathBuf,
    /// Load the 8-bit quantized weights when both variants are present.
    pub neural_quantized: bool,
    pub neural_threads: Option<usize>,
    /// Where to persist the optimized ONNX graph so later loads skip
    /// optimization. Must be writable.
    pub kokoro_graph_cache: Option<PathBuf>,
    /// Wait this long after a failed neural construction before retrying,
    /// doubling per consecutive failure. Zero retries on the very next request.
    #[serde(rename = "construction_cooldown_ms", with = "millis")]
    pub construction_cooldown: Duration,

    pub espeak: EspeakConfig,

    /// Voice overrides: backend identifier → language code → voice.
    pub voices: HashMap<String, HashMap<String, String>>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("assets"),
            probe_candidates: vec![
                ("translate.google.com".to_string(), 443),
                ("8.8.8.8".to_string(), 53),
                ("1.1.1.1".to_string(), 53),
            ],
            probe_timeout: Duration::from_millis(1500),
            online_timeout: Duration::from_secs(20),
            neural_timeout: Duration::from_secs(120),
            offline_timeout: Duration::from_secs(30),
            request_deadline: None,
            online_backend: crate::engines::gtts::IDENTIFIER.to_string(),
            gtts_base_url: crate::engines::gtts::DEFAULT_BASE_URL.to_string(),
            openai_base_url: crate::engines::openai::DEFAULT_BASE_URL.to_string(),
            openai_model: crate::engines::openai::DEFAULT_MODEL.to_string(),
            openai_api_key: None,
            kokoro_model_dir: PathBuf::from("models/kokoro"),
            neural_quantized: true,
            neural_threads: None,
            kokoro_graph_cache: None,
            construction_cooldown: Duration::ZERO,
            espeak: EspeakConfig::default(),
            voices: HashMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Read a JSON config file; absent keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = var("TTS_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(backend) = var("TTS_ONLINE_BACKEND") {
            self.online_backend = backend;
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.openai_base_url = url;
        }
        if let Some(dir) = var("TTS_KOKORO_MODEL_DIR") {
            self.kokoro_model_dir = PathBuf::from(dir);
        }
        if let Some(bin) = var("ESPEAK_BIN") {
            self.espeak.bin_path = Some(PathBuf::from(bin));
        }
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
