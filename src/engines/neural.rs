//! Adapter from a blocking [`SynthesisEngine`] to the async backend contract.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{BackendDescriptor, SpeechBackend};
use crate::error::BackendError;
use crate::request::Rate;
use crate::SynthesisEngine;

/// Runs an in-process engine on the blocking pool and writes its samples as WAV.
///
/// Inference is serialized through a mutex: engines need `&mut self` to run
/// (the ONNX session does), so concurrent requests for the same cached model
/// queue here rather than racing.
pub struct EngineBackend<E: SynthesisEngine> {
    descriptor: BackendDescriptor,
    engine: Arc<Mutex<E>>,
}

impl<E: SynthesisEngine> EngineBackend<E> {
    pub fn new(descriptor: BackendDescriptor, engine: E) -> Self {
        Self {
            descriptor,
            engine: Arc::new(Mutex::new(engine)),
        }
    }
}

#[async_trait]
impl<E: SynthesisEngine> SpeechBackend for EngineBackend<E> {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn generate(
        &self,
        text: &str,
        voice: &str,
        rate: Rate,
        out_path: &Path,
    ) -> Result<PathBuf, BackendError> {
        let engine = Arc::clone(&self.engine);
        let name = self.descriptor.identifier;
        let text = text.to_string();
        let params = E::voice_params(voice, rate);
        let path = out_path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| BackendError::transient(name, "engine lock poisoned"))?;
            let audio = engine
                .synthesize(&text, Some(params))
                .map_err(|e| BackendError::transient(name, e))?;
            if audio.samples.is_empty() {
                return Err(BackendError::EmptyOutput { path });
            }
            log::debug!(
                "{name} synthesized {:.2}s of audio",
                audio.duration_secs()
            );
            audio
                .write_wav(&path)
                .map_err(|e| BackendError::transient(name, e))?;
            Ok(path)
        })
        .await
        .map_err(|e| BackendError::transient(name, e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AudioFormat;
    use crate::script::Script;
    use crate::{AudioBuffer, EngineError};

    struct ToneEngine {
        loaded: bool,
    }

    impl SynthesisEngine for ToneEngine {
        type SynthesisParams = f32;
        type ModelParams = ();

        fn load_model_with_params(&mut self, _path: &Path, _params: ()) -> Result<(), EngineError> {
            self.loaded = true;
            Ok(())
        }

        fn unload_model(&mut self) {
            self.loaded = false;
        }

        fn voice_params(_voice: &str, rate: Rate) -> f32 {
            rate.speed_multiplier()
        }

        fn synthesize(&mut self, text: &str, speed: Option<f32>) -> Result<AudioBuffer, EngineError> {
            if !self.loaded {
                return Err("model not loaded".into());
            }
            let n = (text.len() as f32 * 100.0 / speed.unwrap_or(1.0)) as usize;
            Ok(AudioBuffer {
                samples: vec![0.1; n],
                sample_rate: 16000,
            })
        }
    }

    const DESCRIPTOR: BackendDescriptor = BackendDescriptor {
        identifier: "tone",
        supports_online: false,
        native_scripts: &[Script::Latin],
        output_format: AudioFormat::Wav,
    };

    #[tokio::test]
    async fn writes_engine_samples_as_wav() {
        let mut engine = ToneEngine { loaded: false };
        engine.load_model(Path::new("unused")).unwrap();
        let backend = EngineBackend::new(DESCRIPTOR, engine);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tone.wav");
        let written = backend
            .generate("hello", "any", Rate::default(), &out)
            .await
            .unwrap();

        assert_eq!(written, out);
        let reader = hound::WavReader::open(&out).unwrap();
        assert_eq!(reader.len(), 500);
    }

    #[tokio::test]
    async fn engine_error_becomes_transient_failure() {
        let backend = EngineBackend::new(DESCRIPTOR, ToneEngine { loaded: false });
        let dir = tempfile::tempdir().unwrap();
        let err = backend
            .generate("hello", "any", Rate::default(), &dir.path().join("x.wav"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not loaded"), "{err}");
    }

    #[tokio::test]
    async fn no_samples_is_empty_output() {
        let mut engine = ToneEngine { loaded: false };
        engine.load_model(Path::new("unused")).unwrap();
        let backend = EngineBackend::new(DESCRIPTOR, engine);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("silent.wav");
        let err = backend
            .generate("", "any", Rate::default(), &out)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmptyOutput { .. }));
        assert!(!out.exists());
    }
}
