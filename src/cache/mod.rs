//! Persistent probe cache
//!
//! Probe results and stat snapshots are keyed by absolute path and survive across
//! runs. A cached success is authoritative; a cached failure fails fast unless a
//! retry is requested.

pub mod writer;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::model::{CacheEntry, FileStats, MediaProbe};
use crate::error::{ConsolidatorError, ConsolidatorResult};
use crate::ports::{FsPort, ProbePort, StorePort};

pub use writer::DebouncedWriter;

type Entries = Arc<RwLock<BTreeMap<String, CacheEntry>>>;

/// Options for a single probe lookup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Re-probe files whose cached entry is an error
    pub retry: bool,
}

/// Probe results cached in memory and flushed through a [`DebouncedWriter`]
pub struct ProbeCache {
    entries: Entries,
    prober: Arc<dyn ProbePort>,
    writer: DebouncedWriter,
}

fn lock_error(what: &str) -> ConsolidatorError {
    ConsolidatorError::Task {
        message: format!("probe cache lock poisoned during {}", what),
    }
}

impl ProbeCache {
    /// Load the mapping at `path`. A missing or unreadable mapping starts an empty cache.
    pub async fn load(
        store: Arc<dyn StorePort>,
        path: impl Into<PathBuf>,
        prober: Arc<dyn ProbePort>,
        throttle: Duration,
    ) -> ConsolidatorResult<Self> {
        let path = path.into();

        let map = match store.load(&path).await {
            Ok(Some(value)) => match serde_json::from_value::<BTreeMap<String, CacheEntry>>(value) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Ignoring unreadable cache {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("Ignoring unreadable cache {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        info!("Loaded {} cache entries from {}", map.len(), path.display());

        let entries: Entries = Arc::new(RwLock::new(map));
        let snapshot_entries = Arc::clone(&entries);
        let writer = DebouncedWriter::spawn(
            store,
            path,
            throttle,
            Box::new(move || -> ConsolidatorResult<serde_json::Value> {
                let map = snapshot_entries
                    .read()
                    .map_err(|_| lock_error("snapshot"))?;
                Ok(serde_json::to_value(&*map)?)
            }),
        );

        Ok(Self {
            entries,
            prober,
            writer,
        })
    }

    pub fn key(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    /// Cached entry for `path`, if any
    pub fn get(&self, path: &Path) -> Option<CacheEntry> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(&Self::key(path)).cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cache_path(&self) -> &Path {
        self.writer.path()
    }

    fn update<F>(&self, path: &Path, f: F) -> ConsolidatorResult<()>
    where
        F: FnOnce(&mut CacheEntry),
    {
        {
            let mut map = self.entries.write().map_err(|_| lock_error("update"))?;
            f(map.entry(Self::key(path)).or_default());
        }
        self.writer.mark_dirty();
        Ok(())
    }

    /// Probe `path`, consulting the cache first.
    ///
    /// A cached success is returned without I/O. A cached failure is returned as
    /// [`ConsolidatorError::ProbeError`] without I/O unless `options.retry` is set.
    pub async fn probe(&self, path: &Path, options: ProbeOptions) -> ConsolidatorResult<MediaProbe> {
        let cached = self.get(path).unwrap_or_default();
        if let Some(probe) = cached.probe {
            return Ok(probe);
        }
        if let Some(message) = cached.probe_error {
            if !options.retry {
                debug!("Cached probe failure for {}", path.display());
                return Err(ConsolidatorError::ProbeError {
                    path: path.display().to_string(),
                    message,
                });
            }
        }

        match self.prober.probe(path).await {
            Ok(mut probe) => {
                if probe.size == 0 {
                    if let Some(stats) = &cached.stats {
                        probe.size = stats.size;
                    }
                }
                let stored = probe.clone();
                self.update(path, move |entry| {
                    entry.probe = Some(stored);
                    entry.probe_error = None;
                })?;
                Ok(probe)
            }
            Err(e) => {
                let message = match e {
                    ConsolidatorError::ProbeError { message, .. } => message,
                    other if other.is_fatal() => return Err(other),
                    other => other.to_string(),
                };
                let stored = message.clone();
                self.update(path, move |entry| entry.probe_error = Some(stored))?;
                Err(ConsolidatorError::ProbeError {
                    path: path.display().to_string(),
                    message,
                })
            }
        }
    }

    /// Stat `path`, caching the snapshot
    pub async fn stat(&self, path: &Path, fs: &dyn FsPort) -> ConsolidatorResult<FileStats> {
        if let Some(stats) = self.get(path).and_then(|entry| entry.stats) {
            return Ok(stats);
        }
        let stats = fs.stat(path).await?;
        let stored = stats.clone();
        self.update(path, move |entry| entry.stats = Some(stored))?;
        Ok(stats)
    }

    /// Drop entries whose files no longer exist; returns how many were removed
    pub async fn prune_missing(&self, fs: &dyn FsPort) -> ConsolidatorResult<usize> {
        let keys: Vec<String> = {
            let map = self.entries.read().map_err(|_| lock_error("prune"))?;
            map.keys().cloned().collect()
        };

        let mut missing = Vec::new();
        for key in keys {
            if !fs.exists(Path::new(&key)).await? {
                missing.push(key);
            }
        }

        if !missing.is_empty() {
            {
                let mut map = self.entries.write().map_err(|_| lock_error("prune"))?;
                for key in &missing {
                    debug!("Pruning cache entry {}", key);
                    map.remove(key);
                }
            }
            self.writer.mark_dirty();
        }
        Ok(missing.len())
    }

    /// Persist now, bypassing the throttle
    pub async fn flush(&self) -> ConsolidatorResult<()> {
        self.writer.flush().await
    }

    /// Final flush; later mutations are kept in memory only
    pub async fn close(&self) -> ConsolidatorResult<()> {
        self.writer.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        value: Mutex<Option<Value>>,
    }

    #[async_trait]
    impl StorePort for MemoryStore {
        async fn load(&self, _path: &Path) -> ConsolidatorResult<Option<Value>> {
            Ok(self.value.lock().unwrap().clone())
        }

        async fn save(&self, _path: &Path, value: &Value) -> ConsolidatorResult<()> {
            *self.value.lock().unwrap() = Some(value.clone());
            Ok(())
        }
    }

    /// Fails the first `failures` calls, then succeeds
    struct FlakyProbe {
        calls: AtomicUsize,
        failures: usize,
    }

    impl FlakyProbe {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failures,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProbePort for FlakyProbe {
        async fn probe(&self, path: &Path) -> ConsolidatorResult<MediaProbe> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ConsolidatorError::ProbeError {
                    path: path.display().to_string(),
                    message: "moov atom not found".to_string(),
                })
            } else {
                Ok(MediaProbe::new(60.0, 2048))
            }
        }
    }

    struct ListedFs {
        present: HashSet<String>,
    }

    #[async_trait]
    impl FsPort for ListedFs {
        async fn list_dir(&self, _dir: &Path) -> ConsolidatorResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn stat(&self, _path: &Path) -> ConsolidatorResult<FileStats> {
            Ok(FileStats {
                size: 4096,
                is_file: true,
                is_dir: false,
                modified_ms: Some(1),
                accessed_ms: None,
                created_ms: None,
            })
        }
        async fn exists(&self, path: &Path) -> ConsolidatorResult<bool> {
            Ok(self.present.contains(&ProbeCache::key(path)))
        }
        async fn create_dir_all(&self, _dir: &Path) -> ConsolidatorResult<()> {
            Ok(())
        }
        async fn move_file(&self, _from: &Path, _to: &Path) -> ConsolidatorResult<()> {
            Ok(())
        }
        async fn remove_file(&self, _path: &Path) -> ConsolidatorResult<()> {
            Ok(())
        }
    }

    async fn cache(store: Arc<MemoryStore>, prober: Arc<FlakyProbe>) -> ProbeCache {
        ProbeCache::load(store, "/cfg/cache.json", prober, Duration::from_secs(3600))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_probe_is_cached() {
        let prober = FlakyProbe::new(0);
        let cache = cache(Arc::new(MemoryStore::default()), Arc::clone(&prober)).await;
        let path = Path::new("/v/1001_2021-01-01_00-00-00.mp4");

        let first = cache.probe(path, ProbeOptions::default()).await.unwrap();
        let second = cache.probe(path, ProbeOptions::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(prober.calls(), 1);

        // Even a retry does not re-probe a cached success
        cache.probe(path, ProbeOptions { retry: true }).await.unwrap();
        assert_eq!(prober.calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_failure_fails_fast_unless_retry() {
        let prober = FlakyProbe::new(1);
        let cache = cache(Arc::new(MemoryStore::default()), Arc::clone(&prober)).await;
        let path = Path::new("/v/bad.mp4");

        assert!(cache.probe(path, ProbeOptions::default()).await.is_err());
        let err = cache.probe(path, ProbeOptions::default()).await.unwrap_err();
        assert_eq!(prober.calls(), 1);
        assert_eq!(
            err.to_string(),
            "Failed to probe /v/bad.mp4: moov atom not found"
        );

        let probe = cache.probe(path, ProbeOptions { retry: true }).await.unwrap();
        assert_eq!(prober.calls(), 2);
        assert_eq!(probe.duration, 60.0);
        let entry = cache.get(path).unwrap();
        assert!(entry.probe_error.is_none());
    }

    #[tokio::test]
    async fn test_entries_survive_reload() {
        let store = Arc::new(MemoryStore::default());
        let path = Path::new("/v/1001_2021-01-01_00-00-00.mp4");
        {
            let cache = cache(Arc::clone(&store), FlakyProbe::new(0)).await;
            cache.probe(path, ProbeOptions::default()).await.unwrap();
            cache.close().await.unwrap();
        }

        let prober = FlakyProbe::new(0);
        let reloaded = cache(Arc::clone(&store), Arc::clone(&prober)).await;
        assert_eq!(reloaded.len(), 1);
        reloaded.probe(path, ProbeOptions::default()).await.unwrap();
        assert_eq!(prober.calls(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_mapping_starts_empty() {
        let store = Arc::new(MemoryStore {
            value: Mutex::new(Some(json!(["not", "a", "map"]))),
        });
        let cache = cache(store, FlakyProbe::new(0)).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_stat_and_prune() {
        let cache = cache(Arc::new(MemoryStore::default()), FlakyProbe::new(0)).await;
        let kept = Path::new("/v/kept.mp4");
        let gone = Path::new("/v/gone.mp4");
        let fs = ListedFs {
            present: [ProbeCache::key(kept)].into_iter().collect(),
        };

        assert_eq!(cache.stat(kept, &fs).await.unwrap().size, 4096);
        cache.stat(gone, &fs).await.unwrap();
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.prune_missing(&fs).await.unwrap(), 1);
        assert!(cache.get(gone).is_none());
        assert!(cache.get(kept).unwrap().stats.is_some());
    }
}
