//! Lookup-or-create of the named recognizer resource on the cloud backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;
use tokio::sync::Mutex;

/// Upper bound on waiting for the recognizer-creation operation.
pub const CREATE_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("recognizer lookup failed: {0}")]
    Lookup(String),

    #[error("recognizer creation failed: {0}")]
    Create(String),

    #[error("recognizer creation timed out after {0:?}")]
    CreateTimeout(Duration),
}

/// Fixed recognizer configuration, set once when the resource is created.
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub language_codes: Vec<String>,
    pub model: String,
    pub auto_punctuation: bool,
}

impl RecognizerConfig {
    pub fn for_language(language: &str) -> Self {
        RecognizerConfig {
            language_codes: vec![language.to_owned()],
            model: "latest_long".to_owned(),
            auto_punctuation: true,
        }
    }
}

/// Backend calls the registry needs. The live implementation talks to the
/// Speech v2 REST surface; tests substitute a fake.
#[async_trait]
pub trait RecognizerBackend: Send + Sync {
    /// `Ok(Some(name))` when the resource exists, `Ok(None)` only on a precise
    /// not-found signal. Every other failure is an error so outages are never
    /// mistaken for "create new".
    async fn fetch(&self, name: &str) -> Result<Option<String>, RegistryError>;

    /// Create the resource and block until the creation operation finishes
    /// (bounded by [`CREATE_WAIT`]); returns the resource name. A concurrent
    /// creation by another process is tolerated as "already exists".
    async fn create(
        &self,
        parent: &str,
        recognizer_id: &str,
        config: &RecognizerConfig,
    ) -> Result<String, RegistryError>;
}

/// Caches resolved recognizer names per logical identifier for the lifetime
/// of the process. The map lock serializes resolution, so a given identifier
/// is created at most once in-process.
pub struct RecognizerRegistry {
    backend: Box<dyn RecognizerBackend>,
    project: String,
    region: String,
    resolved: Mutex<HashMap<String, String>>,
}

impl RecognizerRegistry {
    pub fn new(backend: Box<dyn RecognizerBackend>, project: String, region: String) -> Self {
        RecognizerRegistry {
            backend,
            project,
            region,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.region)
    }

    pub fn recognizer_path(&self, recognizer_id: &str) -> String {
        format!("{}/recognizers/{}", self.parent(), recognizer_id)
    }

    pub async fn resolve(
        &self,
        logical_id: &str,
        config: &RecognizerConfig,
    ) -> Result<String, RegistryError> {
        let mut resolved = self.resolved.lock().await;
        if let Some(name) = resolved.get(logical_id) {
            debug!("Recognizer cache HIT for {}", logical_id);
            return Ok(name.clone());
        }

        let path = self.recognizer_path(logical_id);
        let name = match self.backend.fetch(&path).await? {
            Some(existing) => existing,
            None => {
                info!("Recognizer {} not found, creating", path);
                self.backend
                    .create(&self.parent(), logical_id, config)
                    .await?
            }
        };

        resolved.insert(logical_id.to_owned(), name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use std::sync::Arc;

    struct FakeBackend {
        exists: bool,
        lookup_fails: bool,
        fetches: Arc<AtomicUsize>,
        creates: Arc<AtomicUsize>,
    }

    struct Counters {
        fetches: Arc<AtomicUsize>,
        creates: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        fn new(exists: bool, lookup_fails: bool) -> (Self, Counters) {
            let fetches = Arc::new(AtomicUsize::new(0));
            let creates = Arc::new(AtomicUsize::new(0));
            let backend = FakeBackend {
                exists,
                lookup_fails,
                fetches: fetches.clone(),
                creates: creates.clone(),
            };
            (backend, Counters { fetches, creates })
        }
    }

    #[async_trait]
    impl RecognizerBackend for FakeBackend {
        async fn fetch(&self, name: &str) -> Result<Option<String>, RegistryError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.lookup_fails {
                return Err(RegistryError::Lookup("quota exceeded".into()));
            }
            Ok(self.exists.then(|| name.to_owned()))
        }

        async fn create(
            &self,
            parent: &str,
            recognizer_id: &str,
            _config: &RecognizerConfig,
        ) -> Result<String, RegistryError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{parent}/recognizers/{recognizer_id}"))
        }
    }

    fn registry(exists: bool, lookup_fails: bool) -> (RecognizerRegistry, Counters) {
        let (backend, counters) = FakeBackend::new(exists, lookup_fails);
        (
            RecognizerRegistry::new(Box::new(backend), "proj".into(), "eu".into()),
            counters,
        )
    }

    #[test]
    fn path_format() {
        let (reg, _) = registry(false, false);
        assert_eq!(
            reg.recognizer_path("rec-en-us"),
            "projects/proj/locations/eu/recognizers/rec-en-us"
        );
    }

    #[tokio::test]
    async fn creates_once_then_reuses_cached_name() {
        let (reg, counters) = registry(false, false);
        let cfg = RecognizerConfig::for_language("en-US");

        let first = reg.resolve("rec-en-us", &cfg).await.unwrap();
        let second = reg.resolve("rec-en-us", &cfg).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, "projects/proj/locations/eu/recognizers/rec-en-us");
        assert_eq!(counters.creates.load(Ordering::SeqCst), 1);
        assert_eq!(counters.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_recognizer_is_not_recreated() {
        let (reg, counters) = registry(true, false);
        let cfg = RecognizerConfig::for_language("en-US");

        reg.resolve("rec-en-us", &cfg).await.unwrap();

        assert_eq!(counters.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lookup_failure_does_not_trigger_creation() {
        let (reg, counters) = registry(false, true);
        let cfg = RecognizerConfig::for_language("en-US");

        let result = reg.resolve("rec-en-us", &cfg).await;

        assert!(matches!(result, Err(RegistryError::Lookup(_))));
        assert_eq!(counters.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn distinct_identifiers_resolve_separately() {
        let (reg, counters) = registry(false, false);

        reg.resolve("rec-en-us", &RecognizerConfig::for_language("en-US"))
            .await
            .unwrap();
        reg.resolve("rec-de-de", &RecognizerConfig::for_language("de-DE"))
            .await
            .unwrap();

        assert_eq!(counters.creates.load(Ordering::SeqCst), 2);
    }
}
