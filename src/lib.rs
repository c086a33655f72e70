//! # tts-cascade
//!
//! Text-to-speech that degrades gracefully. A request is tried against three
//! tiers in order and the first one that writes a non-empty audio file wins:
//!
//! 1. **online**: a remote service (Google Translate speech by default),
//!    attempted only when a quick TCP probe finds the network,
//! 2. **neural-offline**: a locally cached neural model (Kokoro, behind the
//!    `kokoro` feature), constructed once per script and shared,
//! 3. **deterministic-offline**: espeak-ng, always available; Urdu text is
//!    romanized first since its voices only read Latin script.
//!
//! The result names the tier that produced the audio so callers can warn
//! about reduced quality.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tts_cascade::{OrchestratorConfig, SpeechOrchestrator, SynthesisRequest};
//!
//! # async fn run() -> Result<(), tts_cascade::SynthesisError> {
//! let orchestrator = SpeechOrchestrator::new(OrchestratorConfig::default().with_env());
//! let result = orchestrator
//!     .synthesize(SynthesisRequest::new("Hello, world!").with_output_name("hello.mp3"))
//!     .await?;
//! println!("{} via {}", result.audio_path.display(), result.tier);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod engines;
pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod probe;
pub mod registry;
pub mod request;
pub mod script;
pub mod transliterate;

use std::path::Path;

pub use backend::{AudioFormat, BackendDescriptor, SpeechBackend};
pub use cache::{DisabledFactory, ModelCache, NeuralFactory};
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use error::{BackendError, SynthesisError};
pub use orchestrator::SpeechOrchestrator;
pub use playback::{play, PlaybackReport};
pub use probe::{ConnectivityProbe, StaticProbe, TcpProbe};
pub use registry::{BackendRegistry, VoiceTable};
pub use request::{Language, Rate, SynthesisRequest, SynthesisResult, Tier};
pub use script::Script;
pub use transliterate::transliterate;

/// Boxed error returned by in-process synthesis engines.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Raw waveform produced by an in-process engine.
#[derive(Debug)]
pub struct AudioBuffer {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Write the audio to a 32-bit float mono WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Common interface for heavy, in-process synthesis engines.
///
/// Engines are synchronous and usually need exclusive access while running
/// inference; [`engines::neural::EngineBackend`] adapts one to the async
/// [`SpeechBackend`] contract.
pub trait SynthesisEngine: Send + 'static {
    /// Parameters for configuring inference behavior (voice, speed, etc.)
    type SynthesisParams: Send + 'static;
    /// Parameters for configuring model loading (threads, weights variant, etc.)
    type ModelParams: Default;

    /// Load a model from the specified path using default parameters.
    fn load_model(&mut self, model_path: &Path) -> Result<(), EngineError> {
        self.load_model_with_params(model_path, Self::ModelParams::default())
    }

    /// Load a model from the specified path with custom parameters.
    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), EngineError>;

    /// Unload the currently loaded model and free associated resources.
    fn unload_model(&mut self);

    /// Inference parameters for a voice name and speaking rate.
    fn voice_params(voice: &str, rate: Rate) -> Self::SynthesisParams;

    /// Synthesize speech from the given text.
    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<AudioBuffer, EngineError>;
}
