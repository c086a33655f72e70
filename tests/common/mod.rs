//! Shared fakes for orchestrator tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tts_cascade::{
    AudioFormat, BackendDescriptor, BackendError, BackendRegistry, ConnectivityProbe, ModelCache,
    NeuralFactory, OrchestratorConfig, Rate, Script, SpeechBackend, SpeechOrchestrator,
};

pub const ONLINE: BackendDescriptor = BackendDescriptor {
    identifier: "fake-online",
    supports_online: true,
    native_scripts: &[Script::Latin, Script::Arabic],
    output_format: AudioFormat::Mp3,
};

pub const OTHER_ONLINE: BackendDescriptor = BackendDescriptor {
    identifier: "fake-online-2",
    supports_online: true,
    native_scripts: &[Script::Latin, Script::Arabic],
    output_format: AudioFormat::Mp3,
};

/// A tier-1 backend that runs locally and needs no connectivity check.
pub const LOCAL: BackendDescriptor = BackendDescriptor {
    identifier: "fake-local",
    supports_online: false,
    native_scripts: &[Script::Latin, Script::Arabic],
    output_format: AudioFormat::Wav,
};

pub const NEURAL: BackendDescriptor = BackendDescriptor {
    identifier: "fake-neural",
    supports_online: false,
    native_scripts: &[Script::Latin],
    output_format: AudioFormat::Wav,
};

pub const OFFLINE: BackendDescriptor = BackendDescriptor {
    identifier: "fake-espeak",
    supports_online: false,
    native_scripts: &[Script::Latin],
    output_format: AudioFormat::Wav,
};

/// What a [`FakeBackend`] does when asked to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Write,
    /// Create the file but leave it empty.
    WriteEmpty,
    /// Write a partial file, then fail.
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub text: String,
    pub voice: String,
    pub path: PathBuf,
}

pub struct FakeBackend {
    descriptor: BackendDescriptor,
    behavior: Behavior,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    pub fn new(descriptor: BackendDescriptor, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            behavior,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechBackend for FakeBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn generate(
        &self,
        text: &str,
        voice: &str,
        _rate: Rate,
        out_path: &Path,
    ) -> Result<PathBuf, BackendError> {
        self.calls.lock().unwrap().push(Call {
            text: text.to_string(),
            voice: voice.to_string(),
            path: out_path.to_path_buf(),
        });
        match self.behavior {
            Behavior::Write => {
                tokio::fs::write(out_path, format!("{}:{text}", self.descriptor.identifier)).await?;
                Ok(out_path.to_path_buf())
            }
            Behavior::WriteEmpty => {
                tokio::fs::write(out_path, b"").await?;
                Ok(out_path.to_path_buf())
            }
            Behavior::Fail => {
                tokio::fs::write(out_path, b"partial").await?;
                Err(BackendError::transient(self.descriptor.identifier, "simulated failure"))
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(out_path.to_path_buf())
            }
        }
    }
}

/// Hands out one shared [`FakeBackend`] or fails, counting constructions.
pub struct FakeFactory {
    backend: Option<Arc<FakeBackend>>,
    constructions: AtomicUsize,
}

impl FakeFactory {
    pub fn working(backend: Arc<FakeBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend: Some(backend),
            constructions: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            backend: None,
            constructions: AtomicUsize::new(0),
        })
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }
}

impl NeuralFactory for FakeFactory {
    fn family(&self) -> &'static str {
        "fake-neural"
    }

    fn construct(&self, _script: Script) -> Result<Arc<dyn SpeechBackend>, BackendError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        match &self.backend {
            Some(backend) => Ok(backend.clone()),
            None => Err(BackendError::construction(self.family(), "weights missing")),
        }
    }
}

/// Probe that counts calls and returns a fixed answer.
pub struct CountingProbe {
    answer: bool,
    calls: AtomicUsize,
}

impl CountingProbe {
    pub fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for CountingProbe {
    async fn is_reachable(&self, _candidates: &[(String, u16)], _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

pub fn test_config(output_dir: &Path) -> OrchestratorConfig {
    OrchestratorConfig {
        output_dir: output_dir.to_path_buf(),
        online_backend: ONLINE.identifier.to_string(),
        online_timeout: Duration::from_secs(5),
        neural_timeout: Duration::from_secs(5),
        offline_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

/// An orchestrator whose every tier is a fake.
pub fn orchestrator(
    config: OrchestratorConfig,
    online: &[Arc<FakeBackend>],
    factory: Arc<FakeFactory>,
    offline: Arc<FakeBackend>,
    probe: Arc<CountingProbe>,
) -> SpeechOrchestrator {
    let mut registry = BackendRegistry::new(config.online_backend.clone());
    for backend in online {
        registry.register(backend.clone());
    }
    let cache = ModelCache::new(factory);
    SpeechOrchestrator::with_components(config, registry, cache, offline, probe)
}
