//! The tiered fallback pipeline.
//!
//! A request walks `Start → Online → NeuralOffline → DeterministicOffline`
//! and stops at the first tier that leaves a non-empty file behind. Tier
//! failures are logged and swallowed; only the last tier's cause, an invalid
//! request, or an expired deadline reach the caller.

use std::borrow::Cow;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::backend::{remove_stale, verify_output, AudioFormat, BackendDescriptor, SpeechBackend};
use crate::cache::ModelCache;
use crate::config::OrchestratorConfig;
use crate::engines::{self, espeak::EspeakBackend};
use crate::error::{BackendError, SynthesisError};
use crate::probe::{ConnectivityProbe, TcpProbe};
use crate::registry::{BackendRegistry, VoiceTable};
use crate::request::{output_file_name, Rate, SynthesisRequest, SynthesisResult, Tier};
use crate::script::{self, is_arabic, Script};
use crate::transliterate::transliterate;

/// Runs synthesis requests through the tier cascade.
///
/// Cheap to share: wrap it in an `Arc` and call [`synthesize`](Self::synthesize)
/// from as many tasks as needed. The neural model cache is the only state
/// shared between requests.
pub struct SpeechOrchestrator {
    config: OrchestratorConfig,
    registry: BackendRegistry,
    voices: VoiceTable,
    cache: ModelCache,
    offline: Arc<dyn SpeechBackend>,
    probe: Arc<dyn ConnectivityProbe>,
}

enum State {
    Start,
    Online(Job),
    NeuralOffline(Job),
    DeterministicOffline(Job),
    Success(Job, Tier, PathBuf),
    Failed(SynthesisError),
}

/// A validated request with everything the tiers need resolved.
struct Job {
    text: String,
    script: Script,
    language: String,
    rate: Rate,
    dir: PathBuf,
    stem: String,
}

impl Job {
    fn target(&self, format: AudioFormat) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, format.extension()))
    }
}

struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    fn exceeded(&self, tier: Tier) -> SynthesisError {
        SynthesisError::DeadlineExceeded {
            tier,
            millis: self.budget.unwrap_or_default().as_millis() as u64,
        }
    }
}

impl SpeechOrchestrator {
    /// Production wiring: registered online backends, the Kokoro factory when
    /// compiled in, espeak-ng, and a TCP probe.
    pub fn new(config: OrchestratorConfig) -> Self {
        let registry = BackendRegistry::with_defaults(&config);
        let cache = ModelCache::new(engines::default_neural_factory(&config))
            .with_cooldown(config.construction_cooldown);
        let offline = Arc::new(EspeakBackend::new(config.espeak.clone()));
        Self::with_components(config, registry, cache, offline, Arc::new(TcpProbe))
    }

    pub fn with_components(
        config: OrchestratorConfig,
        registry: BackendRegistry,
        cache: ModelCache,
        offline: Arc<dyn SpeechBackend>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            voices: VoiceTable::from_config(&config),
            config,
            registry,
            cache,
            offline,
            probe,
        }
    }

    /// Replace the connectivity probe, e.g. with `StaticProbe(false)` to force offline.
    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Produce an audio file for `request`.
    ///
    /// The returned path may differ from the requested name in its extension:
    /// each tier writes its own container (`.mp3` online, `.wav` offline).
    pub async fn synthesize(
        &self,
        request: SynthesisRequest,
    ) -> Result<SynthesisResult, SynthesisError> {
        let deadline = Deadline {
            started: Instant::now(),
            budget: request.deadline.or(self.config.request_deadline),
        };
        let mut online: Option<Arc<dyn SpeechBackend>> = None;
        let mut state = State::Start;

        loop {
            state = match state {
                State::Start => match self.prepare(&request).await {
                    Err(e) => State::Failed(e),
                    Ok(job) => {
                        online = self.registry.resolve(request.backend.as_deref());
                        match self.online_reachable(online.as_deref(), &deadline).await {
                            Err(e) => State::Failed(e),
                            Ok(Ok(())) => State::Online(job),
                            Ok(Err(skipped)) => {
                                log::info!("Skipping {} tier: {skipped}", Tier::Online);
                                State::NeuralOffline(job)
                            }
                        }
                    }
                },

                State::Online(job) => {
                    let label = online
                        .as_ref()
                        .map_or(self.registry.default_id(), |b| b.descriptor().identifier)
                        .to_string();
                    let attempt = self.online(&job, online.clone());
                    let outcome = self
                        .within(Tier::Online, &label, self.config.online_timeout, &deadline, attempt)
                        .await;
                    match outcome {
                        Ok(Ok(path)) => State::Success(job, Tier::Online, path),
                        Ok(Err(e)) => {
                            self.abandon(Tier::Online, &job, &e).await;
                            State::NeuralOffline(job)
                        }
                        Err(expired) => {
                            self.discard(&job).await;
                            State::Failed(expired)
                        }
                    }
                }

                State::NeuralOffline(job) => {
                    let attempt = self.neural(&job);
                    let outcome = self
                        .within(
                            Tier::NeuralOffline,
                            self.cache.family(),
                            self.config.neural_timeout,
                            &deadline,
                            attempt,
                        )
                        .await;
                    match outcome {
                        Ok(Ok(path)) => State::Success(job, Tier::NeuralOffline, path),
                        Ok(Err(e)) => {
                            self.abandon(Tier::NeuralOffline, &job, &e).await;
                            State::DeterministicOffline(job)
                        }
                        Err(expired) => {
                            self.discard(&job).await;
                            State::Failed(expired)
                        }
                    }
                }

                State::DeterministicOffline(job) => {
                    let attempt = self.deterministic(&job);
                    let outcome = self
                        .within(
                            Tier::DeterministicOffline,
                            self.offline.descriptor().identifier,
                            self.config.offline_timeout,
                            &deadline,
                            attempt,
                        )
                        .await;
                    match outcome {
                        Ok(Ok(path)) => State::Success(job, Tier::DeterministicOffline, path),
                        Ok(Err(e)) => {
                            self.abandon(Tier::DeterministicOffline, &job, &e).await;
                            State::Failed(SynthesisError::AllTiersExhausted {
                                tier: Tier::DeterministicOffline,
                                source: e,
                            })
                        }
                        Err(expired) => {
                            self.discard(&job).await;
                            State::Failed(expired)
                        }
                    }
                }

                State::Success(job, tier, audio_path) => {
                    log::info!("Synthesized {} via {tier} tier", audio_path.display());
                    return Ok(SynthesisResult {
                        audio_path,
                        language: job.language,
                        tier,
                    });
                }

                State::Failed(err) => {
                    log::error!("Synthesis failed: {err}");
                    return Err(err);
                }
            };
        }
    }

    /// Validate the request and resolve script, language, and output location.
    async fn prepare(&self, request: &SynthesisRequest) -> Result<Job, SynthesisError> {
        request.validate()?;

        let script = script::resolve(&request.text, &request.language);
        let language = match request.language.code() {
            Some(code) if Script::from_language(&request.language) == Some(script) => {
                code.to_string()
            }
            _ => script.default_language().to_string(),
        };

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let dir = tokio::fs::canonicalize(&self.config.output_dir).await?;

        let stem = request
            .output_name
            .as_deref()
            .and_then(output_file_name)
            .map(|name| {
                std::path::Path::new(name)
                    .file_stem()
                    .map_or_else(|| name.to_string(), |s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| {
                let id = uuid::Uuid::new_v4().simple().to_string();
                format!("audio_{language}_{}", &id[..8])
            });

        log::debug!(
            "Request: {} chars, {script} script, language {language}, output {}/{stem}.*",
            request.text.chars().count(),
            dir.display()
        );
        Ok(Job {
            text: request.text.clone(),
            script,
            language,
            rate: request.rate,
            dir,
            stem,
        })
    }

    /// Whether tier 1 should run; the inner error says why it is skipped.
    /// Backends that need no network skip the probe.
    async fn online_reachable(
        &self,
        backend: Option<&dyn SpeechBackend>,
        deadline: &Deadline,
    ) -> Result<Result<(), BackendError>, SynthesisError> {
        if backend.is_some_and(|b| !b.descriptor().supports_online) {
            return Ok(Ok(()));
        }
        let probe = self
            .probe
            .is_reachable(&self.config.probe_candidates, self.config.probe_timeout);
        let reachable = match deadline.remaining() {
            None => probe.await,
            Some(remaining) => tokio::time::timeout(remaining, probe)
                .await
                .map_err(|_| deadline.exceeded(Tier::Online))?,
        };
        Ok(if reachable {
            Ok(())
        } else {
            Err(BackendError::ConnectivityUnavailable)
        })
    }

    async fn online(
        &self,
        job: &Job,
        backend: Option<Arc<dyn SpeechBackend>>,
    ) -> Result<PathBuf, BackendError> {
        let backend = backend.ok_or_else(|| {
            BackendError::transient(
                self.registry.default_id(),
                "no online backend registered under this identifier",
            )
        })?;
        self.speak(backend.as_ref(), job).await
    }

    async fn neural(&self, job: &Job) -> Result<PathBuf, BackendError> {
        let backend = self.cache.get_or_create(job.script).await?;
        self.speak(backend.as_ref(), job).await
    }

    async fn deterministic(&self, job: &Job) -> Result<PathBuf, BackendError> {
        let target = job.target(self.offline.descriptor().output_format);
        remove_stale(&target).await?;
        self.speak(self.offline.as_ref(), job).await
    }

    async fn speak(&self, backend: &dyn SpeechBackend, job: &Job) -> Result<PathBuf, BackendError> {
        let descriptor = backend.descriptor();
        let text = renderable_text(&job.text, job.script, descriptor);
        let voice = self.voices.voice_for(descriptor.identifier, &job.language);
        let target = job.target(descriptor.output_format);

        let written = backend.generate(&text, &voice, job.rate, &target).await?;
        verify_output(&written).await?;
        Ok(written)
    }

    /// Run one tier attempt under its own timeout and the request deadline.
    ///
    /// The outer error is terminal (deadline); the inner one means fall through.
    async fn within<T>(
        &self,
        tier: Tier,
        label: &str,
        limit: Duration,
        deadline: &Deadline,
        attempt: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<Result<T, BackendError>, SynthesisError> {
        let (bound, deadline_binds) = match deadline.remaining() {
            Some(remaining) if remaining <= limit => (remaining, true),
            _ => (limit, false),
        };
        if deadline_binds && bound.is_zero() {
            return Err(deadline.exceeded(tier));
        }

        match tokio::time::timeout(bound, attempt).await {
            Ok(result) => Ok(result),
            Err(_) if deadline_binds => Err(deadline.exceeded(tier)),
            Err(_) => Ok(Err(BackendError::Timeout {
                backend: label.to_string(),
                millis: limit.as_millis() as u64,
            })),
        }
    }

    async fn abandon(&self, tier: Tier, job: &Job, cause: &BackendError) {
        log::warn!("{tier} tier failed: {cause}");
        self.discard(job).await;
    }

    /// Remove whatever a failed tier may have left at the target name.
    async fn discard(&self, job: &Job) {
        for format in [AudioFormat::Mp3, AudioFormat::Wav] {
            if let Err(e) = remove_stale(&job.target(format)).await {
                log::debug!("Could not remove partial output: {e}");
            }
        }
    }
}

/// `text` as `descriptor`'s backend can pronounce it: unchanged when every
/// code point is in a native script, romanized otherwise.
fn renderable_text<'a>(text: &'a str, script: Script, descriptor: &BackendDescriptor) -> Cow<'a, str> {
    if descriptor.renders(text) {
        return Cow::Borrowed(text);
    }
    let source = if text.chars().any(is_arabic) {
        Script::Arabic
    } else {
        script
    };
    log::debug!(
        "{} cannot render {source} script, transliterating",
        descriptor.identifier
    );
    Cow::Owned(transliterate(text, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LATIN_ONLY: BackendDescriptor = BackendDescriptor {
        identifier: "latin",
        supports_online: false,
        native_scripts: &[Script::Latin],
        output_format: AudioFormat::Wav,
    };

    #[test]
    fn native_text_is_borrowed() {
        assert!(matches!(
            renderable_text("Hello there", Script::Latin, &LATIN_ONLY),
            Cow::Borrowed("Hello there")
        ));
    }

    #[test]
    fn foreign_text_is_romanized() {
        let text = renderable_text("سلام دنیا", Script::Arabic, &LATIN_ONLY);
        assert_eq!(text, "slam dnia");
        assert!(!text.chars().any(is_arabic));
    }

    #[test]
    fn stray_arabic_in_latin_text_is_romanized() {
        let text = renderable_text("Hello سلام", Script::Latin, &LATIN_ONLY);
        assert!(text.is_ascii(), "{text}");
        assert!(text.starts_with("Hello "));
    }

    #[tokio::test]
    async fn failed_probe_skips_online_as_unavailable() {
        let tts = SpeechOrchestrator::with_components(
            OrchestratorConfig::default(),
            BackendRegistry::new("none"),
            ModelCache::new(Arc::new(crate::cache::DisabledFactory)),
            Arc::new(EspeakBackend::default()),
            Arc::new(crate::probe::StaticProbe(false)),
        );
        let deadline = Deadline {
            started: Instant::now(),
            budget: None,
        };
        let outcome = tts.online_reachable(None, &deadline).await.unwrap();
        assert!(matches!(outcome, Err(BackendError::ConnectivityUnavailable)));
    }

    #[test]
    fn deadline_reports_its_budget() {
        let deadline = Deadline {
            started: Instant::now(),
            budget: Some(Duration::from_millis(250)),
        };
        assert!(deadline.remaining().unwrap() <= Duration::from_millis(250));
        let err = deadline.exceeded(Tier::NeuralOffline);
        assert!(matches!(
            err,
            SynthesisError::DeadlineExceeded { tier: Tier::NeuralOffline, millis: 250 }
        ));
    }
}
