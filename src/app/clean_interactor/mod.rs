// Clean interactor - Drops cache entries for files that no longer exist

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::ProbeCache;
use crate::error::ConsolidatorResult;
use crate::ports::{FsPort, ProbePort, StorePort};

/// Interactor for the cache clean use case
pub struct CleanInteractor {
    fs_port: Arc<dyn FsPort>,
    store: Arc<dyn StorePort>,
    prober: Arc<dyn ProbePort>,
}

impl CleanInteractor {
    pub fn new(
        fs_port: Arc<dyn FsPort>,
        store: Arc<dyn StorePort>,
        prober: Arc<dyn ProbePort>,
    ) -> Self {
        Self {
            fs_port,
            store,
            prober,
        }
    }

    /// Prune the cache at `cache_file`; returns how many entries were removed
    pub async fn execute(&self, cache_file: PathBuf) -> ConsolidatorResult<usize> {
        let cache = ProbeCache::load(
            Arc::clone(&self.store),
            cache_file,
            Arc::clone(&self.prober),
            Duration::ZERO,
        )
        .await?;
        let before = cache.len();
        let removed = cache.prune_missing(self.fs_port.as_ref()).await?;
        cache.close().await?;

        info!(
            "Removed {} of {} cache entries from {}",
            removed,
            before,
            cache.cache_path().display()
        );
        Ok(removed)
    }
}
