//! Kokoro-82M: the neural offline tier.
//!
//! Uses the Kokoro-82M ONNX model with espeak-ng for phonemization. Models
//! are constructed by [`KokoroFactory`] through the
//! [`ModelCache`](crate::ModelCache), one per script.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/kokoro/
//! ├── kokoro-quant-convinteger.onnx   # 8-bit quantized model (88MB, CPU-optimized)
//! ├── kokoro-v1.0.onnx                # full-precision model (optional)
//! ├── voices-v1.0.bin                 # voice data archive (.npz format)
//! └── config.json                     # vocabulary (optional, builtin fallback)
//! ```
//!
//! Download links:
//! - Model: <https://github.com/taylorchu/kokoro-onnx/releases/tag/v0.2.0>
//! - Voices: <https://github.com/thewh1teagle/kokoro-onnx/releases/tag/model-files-v1.0>
//!
//! Voices follow `{language_prefix}_{name}`: `af_heart` is American English,
//! `hf_alpha` Hindi. There is no Urdu voice, so Urdu arrives romanized and is
//! read by a Hindi voice.

pub mod engine;
pub mod model;
pub mod phonemizer;
pub mod vocab;
pub mod voices;

use std::path::PathBuf;
use std::sync::Arc;

pub use engine::{KokoroEngine, KokoroInferenceParams, KokoroModelParams};
pub use model::KokoroError;

use crate::backend::{AudioFormat, BackendDescriptor, SpeechBackend};
use crate::cache::NeuralFactory;
use crate::config::OrchestratorConfig;
use crate::engines::espeak::EspeakConfig;
use crate::engines::neural::EngineBackend;
use crate::error::BackendError;
use crate::registry::VoiceTable;
use crate::script::Script;
use crate::SynthesisEngine;

pub const IDENTIFIER: &str = "kokoro";

const DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    identifier: IDENTIFIER,
    supports_online: false,
    native_scripts: &[Script::Latin],
    output_format: AudioFormat::Wav,
};

/// Loads a [`KokoroEngine`] for a script and wraps it as a backend.
pub struct KokoroFactory {
    model_dir: PathBuf,
    params: KokoroModelParams,
    espeak: EspeakConfig,
    voices: VoiceTable,
}

impl KokoroFactory {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            model_dir: config.kokoro_model_dir.clone(),
            params: KokoroModelParams {
                num_threads: config.neural_threads,
                prefer_quantized: config.neural_quantized,
                optimized_cache_path: config.kokoro_graph_cache.clone(),
            },
            espeak: config.espeak.clone(),
            voices: VoiceTable::from_config(config),
        }
    }
}

impl NeuralFactory for KokoroFactory {
    fn family(&self) -> &'static str {
        IDENTIFIER
    }

    fn construct(&self, script: Script) -> Result<Arc<dyn SpeechBackend>, BackendError> {
        let mut engine = KokoroEngine::with_espeak(self.espeak.clone());
        engine
            .load_model_with_params(&self.model_dir, self.params.clone())
            .map_err(|e| BackendError::construction(IDENTIFIER, e))?;

        let voice = self.voices.voice_for(IDENTIFIER, script.default_language());
        if !engine.has_voice(&voice) {
            return Err(BackendError::construction(
                IDENTIFIER,
                format!("voice '{voice}' for {script} script is not in the voice archive"),
            ));
        }
        log::info!(
            "Kokoro ready for {script} script ({} voices, model {})",
            engine.list_voices().len(),
            self.model_dir.display()
        );
        Ok(Arc::new(EngineBackend::new(DESCRIPTOR, engine)))
    }
}
