//! Process-lifetime cache of constructed neural backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OnceCell, RwLock};

use crate::backend::SpeechBackend;
use crate::error::BackendError;
use crate::script::Script;

/// Longest wait imposed between construction retries.
const MAX_COOLDOWN: Duration = Duration::from_secs(600);

/// Builds heavy neural backends. Construction may block for seconds (model
/// load, graph optimization) and always runs on the blocking pool.
pub trait NeuralFactory: Send + Sync + 'static {
    /// Backend family, the first half of the cache key.
    fn family(&self) -> &'static str;

    fn construct(&self, script: Script) -> Result<Arc<dyn SpeechBackend>, BackendError>;
}

/// Factory used when no neural engine is compiled in; every construction fails
/// so the tier falls through.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledFactory;

impl NeuralFactory for DisabledFactory {
    fn family(&self) -> &'static str {
        "disabled"
    }

    fn construct(&self, _script: Script) -> Result<Arc<dyn SpeechBackend>, BackendError> {
        Err(BackendError::construction(
            self.family(),
            "no neural engine compiled in (enable the `kokoro` feature)",
        ))
    }
}

type Key = (&'static str, Script);
type Cell = Arc<OnceCell<Arc<dyn SpeechBackend>>>;

#[derive(Debug, Clone, Copy)]
struct FailureRecord {
    consecutive: u32,
    retry_at: Instant,
}

/// Consecutive construction failures per key and when the next try is allowed.
#[derive(Debug, Default)]
struct Backoff {
    base: Duration,
    failures: Mutex<HashMap<Key, FailureRecord>>,
}

impl Backoff {
    fn with_base(base: Duration) -> Self {
        Self {
            base,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn check(&self, key: Key) -> Result<(), BackendError> {
        let failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        match failures.get(&key) {
            Some(record) if record.retry_at > Instant::now() => Err(BackendError::construction(
                key.0,
                format!(
                    "{} consecutive failures, next attempt in {}ms",
                    record.consecutive,
                    record.retry_at.saturating_duration_since(Instant::now()).as_millis()
                ),
            )),
            _ => Ok(()),
        }
    }

    fn record(&self, key: Key, ok: bool) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        if ok {
            failures.remove(&key);
            return;
        }
        let consecutive = failures.get(&key).map_or(1, |r| r.consecutive + 1);
        let factor = 2u32.saturating_pow(consecutive - 1);
        let wait = self.base.saturating_mul(factor).min(MAX_COOLDOWN);
        failures.insert(
            key,
            FailureRecord {
                consecutive,
                retry_at: Instant::now() + wait,
            },
        );
    }
}

/// Single-flight, never-evicting cache keyed by (family, script).
///
/// Concurrent first use of a key runs exactly one construction; everyone else
/// waits for it and receives the same instance. Initialization runs in its
/// own task, so a caller that gives up (deadline) does not abort it and
/// later callers still find the finished instance. Failed constructions are
/// not stored: the next call retries, after `cooldown` (doubling per
/// consecutive failure) when one is configured. Callers queued behind a
/// failed construction are held to the same cooldown.
pub struct ModelCache {
    factory: Arc<dyn NeuralFactory>,
    cells: RwLock<HashMap<Key, Cell>>,
    backoff: Arc<Backoff>,
}

impl ModelCache {
    pub fn new(factory: Arc<dyn NeuralFactory>) -> Self {
        Self {
            factory,
            cells: RwLock::new(HashMap::new()),
            backoff: Arc::new(Backoff::default()),
        }
    }

    /// Set the base retry cooldown. Resets any recorded failures.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.backoff = Arc::new(Backoff::with_base(cooldown));
        self
    }

    pub fn family(&self) -> &'static str {
        self.factory.family()
    }

    /// The backend for `script`, constructing it on first use.
    pub async fn get_or_create(&self, script: Script) -> Result<Arc<dyn SpeechBackend>, BackendError> {
        let key = (self.factory.family(), script);

        if let Some(backend) = self.cached(script).await {
            return Ok(backend);
        }
        self.backoff.check(key)?;

        let cell = {
            let mut cells = self.cells.write().await;
            Arc::clone(cells.entry(key).or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let factory = Arc::clone(&self.factory);
        let backoff = Arc::clone(&self.backoff);
        let init = tokio::spawn(async move {
            cell.get_or_try_init(|| async move {
                // A waiter that inherits the cell after a failure lands here.
                backoff.check(key)?;
                log::info!("Constructing {} backend for {script} script", key.0);
                let result = tokio::task::spawn_blocking(move || factory.construct(script))
                    .await
                    .map_err(|e| BackendError::construction(key.0, e))
                    .and_then(|r| r);
                backoff.record(key, result.is_ok());
                result
            })
            .await
            .cloned()
        });

        init.await
            .map_err(|e| BackendError::construction(key.0, e))
            .and_then(|r| r)
    }

    /// The backend for `script` if it has already been constructed.
    pub async fn cached(&self, script: Script) -> Option<Arc<dyn SpeechBackend>> {
        let key = (self.factory.family(), script);
        let cells = self.cells.read().await;
        cells.get(&key).and_then(|cell| cell.get().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AudioFormat, BackendDescriptor};
    use crate::request::Rate;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DESCRIPTOR: BackendDescriptor = BackendDescriptor {
        identifier: "null",
        supports_online: false,
        native_scripts: &[Script::Latin],
        output_format: AudioFormat::Wav,
    };

    struct NullBackend;

    #[async_trait]
    impl SpeechBackend for NullBackend {
        fn descriptor(&self) -> &BackendDescriptor {
            &DESCRIPTOR
        }

        async fn generate(&self, _: &str, _: &str, _: Rate, out: &Path) -> Result<PathBuf, BackendError> {
            Ok(out.to_path_buf())
        }
    }

    /// Fails the first `fail_first` constructions, then succeeds slowly.
    struct CountingFactory {
        constructions: AtomicUsize,
        fail_first: usize,
    }

    impl CountingFactory {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                constructions: AtomicUsize::new(0),
                fail_first,
            })
        }

        fn count(&self) -> usize {
            self.constructions.load(Ordering::SeqCst)
        }
    }

    impl NeuralFactory for CountingFactory {
        fn family(&self) -> &'static str {
            "counting"
        }

        fn construct(&self, _script: Script) -> Result<Arc<dyn SpeechBackend>, BackendError> {
            let n = self.constructions.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            if n < self.fail_first {
                return Err(BackendError::construction("counting", "weights missing"));
            }
            Ok(Arc::new(NullBackend))
        }
    }

    fn same(a: &Arc<dyn SpeechBackend>, b: &Arc<dyn SpeechBackend>) -> bool {
        Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_constructs_once() {
        let factory = CountingFactory::new(0);
        let cache = Arc::new(ModelCache::new(factory.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_create(Script::Latin).await })
            })
            .collect();

        let mut backends = Vec::new();
        for handle in handles {
            backends.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(factory.count(), 1);
        assert!(backends.iter().all(|b| same(b, &backends[0])));
    }

    #[tokio::test]
    async fn scripts_get_separate_instances() {
        let factory = CountingFactory::new(0);
        let cache = ModelCache::new(factory.clone());
        let latin = cache.get_or_create(Script::Latin).await.unwrap();
        let arabic = cache.get_or_create(Script::Arabic).await.unwrap();
        assert!(!same(&latin, &arabic));
        assert_eq!(factory.count(), 2);
        assert!(same(&cache.get_or_create(Script::Latin).await.unwrap(), &latin));
        assert_eq!(factory.count(), 2);
    }

    #[tokio::test]
    async fn failed_construction_is_retried() {
        let factory = CountingFactory::new(1);
        let cache = ModelCache::new(factory.clone());

        let err = cache.get_or_create(Script::Latin).await.err().unwrap();
        assert!(matches!(err, BackendError::Construction { .. }));
        assert!(cache.cached(Script::Latin).await.is_none());

        cache.get_or_create(Script::Latin).await.unwrap();
        assert_eq!(factory.count(), 2);
        assert!(cache.cached(Script::Latin).await.is_some());
    }

    #[tokio::test]
    async fn cooldown_defers_retry_without_constructing() {
        let factory = CountingFactory::new(5);
        let cache = ModelCache::new(factory.clone()).with_cooldown(Duration::from_secs(3600));

        assert!(cache.get_or_create(Script::Arabic).await.is_err());
        let err = cache.get_or_create(Script::Arabic).await.err().unwrap();
        assert!(err.to_string().contains("next attempt"), "{err}");
        assert_eq!(factory.count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queued_callers_respect_cooldown_after_failure() {
        let factory = CountingFactory::new(usize::MAX);
        let cache = Arc::new(ModelCache::new(factory.clone()).with_cooldown(Duration::from_secs(3600)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_create(Script::Latin).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }

        assert_eq!(factory.count(), 1);
    }

    #[test]
    fn backoff_doubles_and_resets() {
        let backoff = Backoff::with_base(Duration::from_secs(1));
        let key = ("counting", Script::Latin);
        backoff.record(key, false);
        backoff.record(key, false);
        let record = backoff.failures.lock().unwrap()[&key];
        assert_eq!(record.consecutive, 2);
        assert!(record.retry_at > Instant::now() + Duration::from_millis(1500));
        assert!(backoff.check(key).is_err());

        backoff.record(key, true);
        assert!(backoff.check(key).is_ok());
    }

    #[tokio::test]
    async fn disabled_factory_always_fails() {
        let cache = ModelCache::new(Arc::new(DisabledFactory));
        let err = cache.get_or_create(Script::Latin).await.err().unwrap();
        assert!(err.to_string().contains("kokoro"), "{err}");
    }
}
