//! Policy store.
//!
//! Produces the in-memory [`PolicyDocument`] from the primary source or
//! the local cache file, according to the cache policy:
//!
//! ```text
//!                      ┌──────────── cacheUseAsPrimary && cache fresh ──► cache
//!  load() ─────────────┤
//!                      └─► primary ──ok──► validate ──► (refresh cache) ──► primary
//!                             │
//!                           unreachable
//!                             ▼
//!                      cache fresh ─────────────────────────────────────► cache
//!                      cache stale && cacheUseStaleCache ───────────────► stale cache
//!                      otherwise ──────────────────────────────────────► PolicyError
//! ```
//!
//! A primary document that fails validation is fatal; it never falls
//! back to the cache, so a broken publish is noticed instead of masked.
//!
//! Readers get an `Arc` snapshot. A reload builds the new document off
//! to the side and swaps the pointer only on success, so concurrent
//! authorization checks see either the old or the new document, never a
//! partial one. Loads are serialized; a caller that waited on another
//! caller's load reuses its result instead of fetching again.

use crate::error::PolicyError;
use crate::feed;
use crate::model::{PolicyDocument, DEFAULT_SCHEMA};
use crate::schema::{self, PolicyFormat};
use crate::source::{self, PolicySource, RawPolicy};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Policy store settings (`[policy]` in the service config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyStoreConfig {
    /// Path, `file://` or `http(s)://` URI of the authoritative policy.
    pub primary_source_uri: String,
    /// Keep a local copy of the last good document.
    pub cache_enabled: bool,
    /// Serve from the cache while it is fresh, without touching the
    /// primary source.
    pub cache_use_as_primary: bool,
    /// Accept a stale cache when the primary source is unreachable.
    pub cache_use_stale_cache: bool,
    /// Age (seconds) after which the cache is stale.
    pub cache_update_frequency: u64,
    /// Location of the cache file (always written as JSON).
    pub cache_file_path: PathBuf,
    /// Schema identifier every document must declare.
    pub schema_uri: String,
    /// Timeout (seconds) for remote fetches.
    pub fetch_timeout: u64,
}

impl Default for PolicyStoreConfig {
    fn default() -> Self {
        Self {
            primary_source_uri: "/etc/elevate/policy.json".into(),
            cache_enabled: true,
            cache_use_as_primary: false,
            cache_use_stale_cache: true,
            cache_update_frequency: 86_400,
            cache_file_path: PathBuf::from("/var/cache/elevate/policy.json"),
            schema_uri: DEFAULT_SCHEMA.into(),
            fetch_timeout: 30,
        }
    }
}

impl PolicyStoreConfig {
    #[must_use]
    pub fn update_frequency(&self) -> Duration {
        Duration::from_secs(self.cache_update_frequency)
    }
}

/// Freshness of the cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Missing,
    Fresh,
    Stale,
}

/// Where the active document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Primary,
    Cache,
    StaleCache,
}

impl std::fmt::Display for LoadOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Cache => "cache",
            Self::StaleCache => "stale-cache",
        })
    }
}

#[derive(Debug, Clone)]
struct Published {
    doc: Arc<PolicyDocument>,
    origin: LoadOrigin,
    /// Bumped on every publish.
    generation: u64,
}

/// Loads, caches and publishes the policy document.
pub struct PolicyStore {
    config: PolicyStoreConfig,
    machine: String,
    source: Box<dyn PolicySource>,
    current: RwLock<Option<Published>>,
    reload: Mutex<()>,
}

impl PolicyStore {
    /// Creates a store reading from `config.primary_source_uri`.
    ///
    /// `machine` is the local machine name, used to filter CSV feeds.
    ///
    /// # Errors
    ///
    /// [`PolicyError::UnsupportedSource`] for an unknown URI scheme.
    pub fn new(config: PolicyStoreConfig, machine: impl Into<String>) -> Result<Self, PolicyError> {
        let source = source::open(
            &config.primary_source_uri,
            Duration::from_secs(config.fetch_timeout),
        )?;
        Ok(Self::with_source(config, machine, source))
    }

    /// Creates a store with an explicit source.
    pub fn with_source(
        config: PolicyStoreConfig,
        machine: impl Into<String>,
        source: Box<dyn PolicySource>,
    ) -> Self {
        Self {
            config,
            machine: machine.into(),
            source,
            current: RwLock::new(None),
            reload: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PolicyStoreConfig {
        &self.config
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Loads the document per the cache policy and publishes it.
    ///
    /// # Errors
    ///
    /// Returns the load error; any previously published document stays
    /// in place.
    pub fn open(&self) -> Result<Arc<PolicyDocument>, PolicyError> {
        let _guard = self.reload.lock();
        let (doc, origin) = self.load()?;
        Ok(self.publish(doc, origin))
    }

    /// Current document, loading it first if nothing is published.
    ///
    /// Concurrent first calls share one load.
    ///
    /// Fails closed: an error here must deny the request.
    pub fn snapshot(&self) -> Result<Arc<PolicyDocument>, PolicyError> {
        if let Some(published) = self.current.read().as_ref() {
            return Ok(Arc::clone(&published.doc));
        }
        let _guard = self.reload.lock();
        if let Some(published) = self.current.read().as_ref() {
            return Ok(Arc::clone(&published.doc));
        }
        let (doc, origin) = self.load()?;
        Ok(self.publish(doc, origin))
    }

    /// Refreshes the document.
    ///
    /// With `force`, goes to the primary source regardless of cache
    /// freshness; otherwise re-runs the normal load policy. A normal
    /// refresh that waited on another caller's reload returns that
    /// reload's origin without loading again.
    pub fn try_update(&self, force: bool) -> Result<LoadOrigin, PolicyError> {
        let seen = self.generation();
        let _guard = self.reload.lock();
        if !force {
            if let Some(published) = self.current.read().as_ref() {
                if published.generation != seen {
                    tracing::debug!(origin = %published.origin, "policy reloaded while waiting");
                    return Ok(published.origin);
                }
            }
        }
        let (doc, origin) = if force {
            let doc = self.load_primary()?;
            if self.config.cache_enabled {
                self.write_cache(&doc);
            }
            (doc, LoadOrigin::Primary)
        } else {
            self.load()?
        };
        self.publish(doc, origin);
        Ok(origin)
    }

    /// Like [`try_update`](Self::try_update), reporting only whether a
    /// reload happened.
    pub fn update(&self, force: bool) -> bool {
        match self.try_update(force) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, force, "policy update failed, keeping current document");
                false
            }
        }
    }

    /// Freshness of the cache file.
    #[must_use]
    pub fn cache_state(&self) -> CacheState {
        let path = &self.config.cache_file_path;
        let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => return CacheState::Missing,
        };
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.config.update_frequency() {
            CacheState::Stale
        } else {
            CacheState::Fresh
        }
    }

    fn generation(&self) -> u64 {
        self.current.read().as_ref().map_or(0, |p| p.generation)
    }

    fn publish(&self, doc: PolicyDocument, origin: LoadOrigin) -> Arc<PolicyDocument> {
        let doc = Arc::new(doc);
        {
            let mut current = self.current.write();
            let generation = current.as_ref().map_or(0, |p| p.generation) + 1;
            *current = Some(Published {
                doc: Arc::clone(&doc),
                origin,
                generation,
            });
        }
        tracing::info!(
            origin = %origin,
            source = %self.source.describe(),
            users = doc.users.len(),
            user_groups = doc.user_groups.len(),
            "policy published"
        );
        doc
    }

    fn load(&self) -> Result<(PolicyDocument, LoadOrigin), PolicyError> {
        let cfg = &self.config;
        let cache = if cfg.cache_enabled {
            self.cache_state()
        } else {
            CacheState::Missing
        };

        let mut refresh_cache = cache != CacheState::Fresh;
        if cfg.cache_enabled && cfg.cache_use_as_primary && cache == CacheState::Fresh {
            match self.read_cache() {
                Ok(doc) => return Ok((doc, LoadOrigin::Cache)),
                Err(e) => {
                    tracing::warn!(error = %e, "fresh cache unreadable, trying primary source");
                    refresh_cache = true;
                }
            }
        }

        match self.load_primary() {
            Ok(doc) => {
                if cfg.cache_enabled && refresh_cache {
                    self.write_cache(&doc);
                }
                Ok((doc, LoadOrigin::Primary))
            }
            Err(e) if e.is_invalid_document() => Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    source = %self.source.describe(),
                    "primary policy source unavailable"
                );
                self.fall_back_to_cache(cache, e)
            }
        }
    }

    fn fall_back_to_cache(
        &self,
        cache: CacheState,
        primary_error: PolicyError,
    ) -> Result<(PolicyDocument, LoadOrigin), PolicyError> {
        if !self.config.cache_enabled {
            return Err(PolicyError::Unavailable(format!(
                "primary source failed and caching is disabled: {primary_error}"
            )));
        }
        match cache {
            CacheState::Fresh => Ok((self.read_cache()?, LoadOrigin::Cache)),
            CacheState::Stale if self.config.cache_use_stale_cache => {
                tracing::warn!(
                    path = %self.config.cache_file_path.display(),
                    "using stale policy cache"
                );
                Ok((self.read_cache()?, LoadOrigin::StaleCache))
            }
            CacheState::Stale => Err(PolicyError::Unavailable(format!(
                "primary source failed and the cache is stale: {primary_error}"
            ))),
            CacheState::Missing => Err(PolicyError::Unavailable(format!(
                "primary source failed and no cache exists: {primary_error}"
            ))),
        }
    }

    fn load_primary(&self) -> Result<PolicyDocument, PolicyError> {
        let raw = self.source.fetch()?;
        self.parse(raw, &self.source.describe())
    }

    fn parse(&self, raw: RawPolicy, origin: &str) -> Result<PolicyDocument, PolicyError> {
        match raw.format {
            PolicyFormat::Csv => {
                feed::import_csv(&raw.body, &self.machine, &self.config.schema_uri, origin)
            }
            format => schema::parse_document(&raw.body, format, &self.config.schema_uri, origin),
        }
    }

    fn read_cache(&self) -> Result<PolicyDocument, PolicyError> {
        let path = &self.config.cache_file_path;
        let body = std::fs::read_to_string(path).map_err(|e| PolicyError::read_file(path, e))?;
        let origin = path.display().to_string();
        schema::parse_document(&body, PolicyFormat::Json, &self.config.schema_uri, &origin)
    }

    fn write_cache(&self, doc: &PolicyDocument) {
        if let Err(e) = write_cache_file(&self.config.cache_file_path, doc) {
            tracing::warn!(error = %e, "failed to refresh policy cache");
        } else {
            tracing::debug!(path = %self.config.cache_file_path.display(), "policy cache refreshed");
        }
    }
}

/// Writes `doc` as pretty JSON via a temp file and rename.
fn write_cache_file(path: &Path, doc: &PolicyDocument) -> Result<(), PolicyError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PolicyError::write_cache(parent, e))?;
    }
    let body = serde_json::to_string_pretty(doc)
        .map_err(|e| PolicyError::write_cache(path, std::io::Error::other(e)))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body).map_err(|e| PolicyError::write_cache(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| PolicyError::write_cache(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const GOOD: &str = r#"{ "schema": "urn:elevate:policy:v1", "users": [ { "name": "HOST\\bob" } ] }"#;
    const CACHED: &str = r#"{ "schema": "urn:elevate:policy:v1", "users": [ { "name": "HOST\\cached" } ] }"#;

    /// Source returning a fixed body, or unreachable when `body` is `None`.
    struct StubSource {
        body: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl PolicySource for StubSource {
        fn describe(&self) -> String {
            "stub://primary".into()
        }

        fn fetch(&self) -> Result<RawPolicy, PolicyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.body {
                Some(body) => Ok(RawPolicy {
                    body: body.to_string(),
                    format: PolicyFormat::Json,
                }),
                None => Err(PolicyError::fetch("stub://primary", "connection refused")),
            }
        }
    }

    struct Fixture {
        dir: TempDir,
        calls: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn cache_path(&self) -> PathBuf {
            self.dir.path().join("cache").join("policy.json")
        }

        fn write_cache(&self, body: &str) {
            std::fs::create_dir_all(self.cache_path().parent().unwrap()).unwrap();
            std::fs::write(self.cache_path(), body).unwrap();
        }

        fn config(&self, use_as_primary: bool, stale_ok: bool, fresh: bool) -> PolicyStoreConfig {
            PolicyStoreConfig {
                primary_source_uri: "stub://primary".into(),
                cache_enabled: true,
                cache_use_as_primary: use_as_primary,
                cache_use_stale_cache: stale_ok,
                cache_update_frequency: if fresh { 3600 } else { 0 },
                cache_file_path: self.cache_path(),
                ..PolicyStoreConfig::default()
            }
        }

        fn store(&self, config: PolicyStoreConfig, body: Option<&'static str>) -> PolicyStore {
            let source = StubSource {
                body,
                calls: Arc::clone(&self.calls),
            };
            PolicyStore::with_source(config, "HOST", Box::new(source))
        }

        fn fetches(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn first_user(doc: &PolicyDocument) -> String {
        doc.users[0].name.name().to_string()
    }

    #[test]
    fn primary_load_writes_missing_cache() {
        let fx = Fixture::new();
        let store = fx.store(fx.config(false, false, true), Some(GOOD));
        let doc = store.open().unwrap();
        assert_eq!(first_user(&doc), "bob");
        assert!(fx.cache_path().exists());
        assert_eq!(store.cache_state(), CacheState::Fresh);
    }

    #[test]
    fn fresh_cache_as_primary_skips_source() {
        let fx = Fixture::new();
        fx.write_cache(CACHED);
        let store = fx.store(fx.config(true, false, true), Some(GOOD));
        assert_eq!(first_user(&store.open().unwrap()), "cached");
        assert_eq!(fx.fetches(), 0);
    }

    #[test]
    fn stale_cache_as_primary_refreshes_from_source() {
        let fx = Fixture::new();
        fx.write_cache(CACHED);
        let store = fx.store(fx.config(true, false, false), Some(GOOD));
        assert_eq!(first_user(&store.open().unwrap()), "bob");
        let cached = std::fs::read_to_string(fx.cache_path()).unwrap();
        assert!(cached.contains("HOST\\\\bob"), "cache not refreshed: {cached}");
    }

    #[test]
    fn stale_cache_unreachable_primary_without_stale_permission_fails_closed() {
        let fx = Fixture::new();
        fx.write_cache(CACHED);
        let store = fx.store(fx.config(true, false, false), None);
        let err = store.open().unwrap_err();
        assert!(matches!(err, PolicyError::Unavailable(_)), "got: {err}");
        assert!(!store.is_loaded());
        assert!(store.snapshot().is_err());
    }

    #[test]
    fn stale_cache_used_when_permitted() {
        let fx = Fixture::new();
        fx.write_cache(CACHED);
        let store = fx.store(fx.config(true, true, false), None);
        assert_eq!(first_user(&store.open().unwrap()), "cached");
        assert_eq!(store.try_update(false).unwrap(), LoadOrigin::StaleCache);
    }

    #[test]
    fn primary_failure_falls_back_to_fresh_cache() {
        let fx = Fixture::new();
        fx.write_cache(CACHED);
        let store = fx.store(fx.config(false, false, true), None);
        assert_eq!(first_user(&store.open().unwrap()), "cached");
    }

    #[test]
    fn no_source_and_no_cache_is_unavailable() {
        let fx = Fixture::new();
        let store = fx.store(fx.config(false, true, true), None);
        assert!(matches!(store.open(), Err(PolicyError::Unavailable(_))));
    }

    #[test]
    fn invalid_primary_document_does_not_fall_back() {
        let fx = Fixture::new();
        fx.write_cache(CACHED);
        let store = fx.store(fx.config(false, true, true), Some(r#"{ "schema": "urn:wrong" }"#));
        let err = store.open().unwrap_err();
        assert!(matches!(err, PolicyError::Schema { .. }), "got: {err}");
    }

    #[test]
    fn failed_update_keeps_previous_document() {
        let fx = Fixture::new();
        let good = fx.store(fx.config(false, false, true), Some(GOOD));
        good.open().unwrap();

        let broken = fx.store(fx.config(false, false, true), Some("{"));
        *broken.current.write() = good.current.read().clone();
        assert!(!broken.update(true));
        assert_eq!(first_user(&broken.snapshot().unwrap()), "bob");
    }

    #[test]
    fn forced_update_ignores_fresh_cache() {
        let fx = Fixture::new();
        fx.write_cache(CACHED);
        let store = fx.store(fx.config(true, false, true), Some(GOOD));
        assert_eq!(first_user(&store.open().unwrap()), "cached");
        assert!(store.update(true));
        assert_eq!(first_user(&store.snapshot().unwrap()), "bob");
        assert_eq!(fx.fetches(), 1);
    }

    #[test]
    fn snapshot_loads_lazily_and_is_shared() {
        let fx = Fixture::new();
        let store = fx.store(fx.config(false, false, true), Some(GOOD));
        let a = store.snapshot().unwrap();
        let b = store.snapshot().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fx.fetches(), 1);
    }

    /// Stub whose fetch takes a while, so concurrent loads overlap.
    struct SlowSource(Arc<AtomicUsize>);

    impl PolicySource for SlowSource {
        fn describe(&self) -> String {
            "stub://slow".into()
        }

        fn fetch(&self) -> Result<RawPolicy, PolicyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(RawPolicy {
                body: GOOD.to_string(),
                format: PolicyFormat::Json,
            })
        }
    }

    #[test]
    fn concurrent_first_snapshots_share_one_fetch() {
        let fx = Fixture::new();
        let mut config = fx.config(false, false, true);
        config.cache_enabled = false;
        let store = PolicyStore::with_source(config, "HOST", Box::new(SlowSource(Arc::clone(&fx.calls))));

        let docs: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4).map(|_| scope.spawn(|| store.snapshot().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(fx.fetches(), 1);
        assert!(docs.iter().all(|d| Arc::ptr_eq(d, &docs[0])));
    }

    #[test]
    fn concurrent_updates_coalesce() {
        let fx = Fixture::new();
        let mut config = fx.config(false, false, true);
        config.cache_enabled = false;
        let store = PolicyStore::with_source(config, "HOST", Box::new(SlowSource(Arc::clone(&fx.calls))));
        store.open().unwrap();

        let start = std::sync::Barrier::new(3);
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..3)
                .map(|_| {
                    scope.spawn(|| {
                        start.wait();
                        store.update(false)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|&ok| ok));
        assert!(fx.fetches() < 4, "fetched {} times", fx.fetches());
        assert!(store.update(true));
        assert!(fx.fetches() >= 3);
    }

    #[test]
    fn csv_primary_is_imported_for_machine() {
        struct CsvSource;
        impl PolicySource for CsvSource {
            fn describe(&self) -> String {
                "feed.csv".into()
            }
            fn fetch(&self) -> Result<RawPolicy, PolicyError> {
                Ok(RawPolicy {
                    body: "system,username,path,checksum,arguments\nhost,CORP\\amy,*,,\n".into(),
                    format: PolicyFormat::Csv,
                })
            }
        }
        let fx = Fixture::new();
        let store = PolicyStore::with_source(fx.config(false, false, true), "HOST", Box::new(CsvSource));
        let doc = store.open().unwrap();
        assert_eq!(doc.user_groups[0].users[0].name.name(), "amy");
    }
}
