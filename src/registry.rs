//! Online backend selection and the language → voice table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::SpeechBackend;
use crate::config::OrchestratorConfig;
use crate::engines::{espeak, gtts, openai};
use crate::request::Language;
use crate::script::Script;

/// Online backends by identifier. Populated once at startup and read-only
/// afterwards; neural backends live in the [`ModelCache`](crate::ModelCache).
pub struct BackendRegistry {
    backends: HashMap<&'static str, Arc<dyn SpeechBackend>>,
    default_id: String,
}

impl BackendRegistry {
    pub fn new(default_id: impl Into<String>) -> Self {
        Self {
            backends: HashMap::new(),
            default_id: default_id.into(),
        }
    }

    /// The `gtts` and `openai` backends wired from `config`.
    pub fn with_defaults(config: &OrchestratorConfig) -> Self {
        let openai = openai::OpenAiSpeechBackend::new(
            config.openai_api_key.clone(),
            config.openai_base_url.as_str(),
        )
        .with_model(config.openai_model.as_str());

        let mut registry = Self::new(config.online_backend.as_str());
        registry.register(Arc::new(gtts::GttsBackend::new(config.gtts_base_url.as_str())));
        registry.register(Arc::new(openai));
        registry
    }

    /// Add or replace a backend under its descriptor's identifier.
    pub fn register(&mut self, backend: Arc<dyn SpeechBackend>) {
        self.backends.insert(backend.descriptor().identifier, backend);
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn identifiers(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.backends.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Backend for `identifier`, or the default one when it is absent or
    /// unknown. `None` only if the default itself is not registered.
    pub fn resolve(&self, identifier: Option<&str>) -> Option<Arc<dyn SpeechBackend>> {
        if let Some(id) = identifier {
            if let Some(backend) = self.backends.get(id) {
                return Some(Arc::clone(backend));
            }
            log::warn!(
                "Unknown backend '{id}', using default '{}'",
                self.default_id
            );
        }
        self.backends.get(self.default_id.as_str()).cloned()
    }
}

/// Voice to use per backend and language code.
///
/// Built-in entries cover English and Urdu for every shipped backend;
/// configuration overrides win over them.
#[derive(Debug, Clone, Default)]
pub struct VoiceTable {
    overrides: HashMap<String, HashMap<String, String>>,
}

impl VoiceTable {
    pub fn new(overrides: HashMap<String, HashMap<String, String>>) -> Self {
        Self { overrides }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.voices.clone())
    }

    pub fn voice_for(&self, backend: &str, language: &str) -> String {
        if let Some(voice) = self.overrides.get(backend).and_then(|v| v.get(language)) {
            return voice.clone();
        }
        builtin_voice(backend, language)
    }
}

fn builtin_voice(backend: &str, language: &str) -> String {
    match (backend, language) {
        // Kokoro has no Urdu voice; the Hindi one reads romanized Urdu well.
        ("kokoro", "ur") => "hf_alpha",
        ("kokoro", _) => "af_heart",
        (openai::IDENTIFIER, _) => "alloy",
        // espeak-ng reads Arabic-script languages only after romanization.
        (espeak::IDENTIFIER, language)
            if Script::from_language(&Language::from(language)) == Some(Script::Arabic) =>
        {
            "en"
        }
        // gtts takes the language code as its voice; so does espeak-ng.
        (_, language) => language,
    }
    .to_string()
}
