use std::path::{Path, PathBuf};

use crate::engines::espeak::EspeakConfig;
use crate::request::Rate;
use crate::{AudioBuffer, EngineError, SynthesisEngine};

use super::model::{KokoroError, KokoroModel, SessionOptions, SAMPLE_RATE};

/// Parameters for configuring Kokoro model loading.
pub type KokoroModelParams = SessionOptions;

/// Parameters for configuring a Kokoro synthesis request.
#[derive(Debug, Clone)]
pub struct KokoroInferenceParams {
    /// Voice name (e.g. `"af_heart"`, `"hf_alpha"`).
    pub voice: String,
    /// Speech speed multiplier. Range: 0.5–2.0, default 1.0.
    pub speed: f32,
    /// Override the style vector index. `None` uses the phoneme token count.
    pub style_index: Option<usize>,
}

impl Default for KokoroInferenceParams {
    fn default() -> Self {
        Self {
            voice: "af_heart".to_string(),
            speed: 1.0,
            style_index: None,
        }
    }
}

/// Kokoro-82M text-to-speech engine.
///
/// ```rust,no_run
/// use tts_cascade::{SynthesisEngine, engines::kokoro::KokoroEngine};
/// use std::path::PathBuf;
///
/// let mut engine = KokoroEngine::new();
/// engine.load_model(&PathBuf::from("models/kokoro"))?;
/// let audio = engine.synthesize("Hello, world!", None)?;
/// # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
/// ```
pub struct KokoroEngine {
    model: Option<KokoroModel>,
    model_path: Option<PathBuf>,
    espeak: EspeakConfig,
}

impl Default for KokoroEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KokoroEngine {
    /// Create an engine that phonemizes with `espeak-ng` from PATH.
    pub fn new() -> Self {
        Self::with_espeak(EspeakConfig::default())
    }

    /// Create an engine that phonemizes with a specific espeak-ng install.
    pub fn with_espeak(espeak: EspeakConfig) -> Self {
        Self {
            model: None,
            model_path: None,
            espeak,
        }
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn has_voice(&self, voice: &str) -> bool {
        self.model.as_ref().is_some_and(|m| m.has_voice(voice))
    }

    /// Available voice names; empty until a model is loaded.
    pub fn list_voices(&self) -> Vec<&str> {
        self.model
            .as_ref()
            .map(|m| m.list_voices())
            .unwrap_or_default()
    }
}

impl SynthesisEngine for KokoroEngine {
    type SynthesisParams = KokoroInferenceParams;
    type ModelParams = KokoroModelParams;

    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), EngineError> {
        self.model = Some(KokoroModel::load(model_path, &params)?);
        self.model_path = Some(model_path.to_path_buf());
        Ok(())
    }

    fn unload_model(&mut self) {
        self.model = None;
        self.model_path = None;
    }

    fn voice_params(voice: &str, rate: Rate) -> KokoroInferenceParams {
        KokoroInferenceParams {
            voice: voice.to_string(),
            speed: rate.speed_multiplier(),
            style_index: None,
        }
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<AudioBuffer, EngineError> {
        let model = self.model.as_mut().ok_or(KokoroError::ModelNotLoaded)?;
        let p = params.unwrap_or_default();
        let samples = model.synthesize_text(text, &p.voice, p.speed, p.style_index, &self.espeak)?;
        Ok(AudioBuffer {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}
