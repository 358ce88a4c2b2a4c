//! Debounced persistence of an in-memory mapping

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ConsolidatorError, ConsolidatorResult};
use crate::ports::StorePort;

/// Produces the current state to persist
pub type Snapshot = Box<dyn Fn() -> ConsolidatorResult<Value> + Send + Sync>;

struct Target {
    store: Arc<dyn StorePort>,
    path: PathBuf,
    snapshot: Snapshot,
}

impl Target {
    async fn save(&self) -> ConsolidatorResult<()> {
        let value = (self.snapshot)()?;
        self.store.save(&self.path, &value).await
    }

    async fn save_logged(&self) {
        match self.save().await {
            Ok(()) => debug!("Flushed {}", self.path.display()),
            Err(e) => warn!("Failed to flush {}: {}", self.path.display(), e),
        }
    }
}

/// Coalesces change notifications into throttled saves.
///
/// Each [`DebouncedWriter::mark_dirty`] bumps a generation counter. A background
/// task wakes on the first change, waits out the throttle window while absorbing
/// further changes, then saves one snapshot. Closing (or dropping) the writer
/// ends the task after a final save of anything still pending.
pub struct DebouncedWriter {
    dirty: Mutex<Option<watch::Sender<u64>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    target: Arc<Target>,
}

impl DebouncedWriter {
    /// Start the background task. Must be called inside a tokio runtime.
    pub fn spawn(
        store: Arc<dyn StorePort>,
        path: impl Into<PathBuf>,
        throttle: Duration,
        snapshot: Snapshot,
    ) -> Self {
        let target = Arc::new(Target {
            store,
            path: path.into(),
            snapshot,
        });
        let (tx, rx) = watch::channel(0u64);
        let task = tokio::spawn(Self::run(rx, Arc::clone(&target), throttle));

        Self {
            dirty: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
            target,
        }
    }

    async fn run(mut rx: watch::Receiver<u64>, target: Arc<Target>, throttle: Duration) {
        // Err means every sender is gone and nothing is left unseen.
        while rx.changed().await.is_ok() {
            let deadline = tokio::time::sleep(throttle);
            tokio::pin!(deadline);

            let mut closed = false;
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            closed = true;
                            break;
                        }
                    }
                }
            }

            target.save_logged().await;
            if closed {
                return;
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.target.path
    }

    /// Schedule a save
    pub fn mark_dirty(&self) {
        if let Ok(guard) = self.dirty.lock() {
            if let Some(tx) = guard.as_ref() {
                tx.send_modify(|generation| *generation += 1);
            }
        }
    }

    /// Save now, bypassing the throttle
    pub async fn flush(&self) -> ConsolidatorResult<()> {
        self.target.save().await
    }

    /// Stop the background task after its final save, then save once more
    pub async fn close(&self) -> ConsolidatorResult<()> {
        let sender = self.dirty.lock().ok().and_then(|mut guard| guard.take());
        drop(sender);

        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            task.await.map_err(ConsolidatorError::from)?;
        }
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        saves: AtomicUsize,
        last: Mutex<Option<Value>>,
    }

    #[async_trait]
    impl StorePort for CountingStore {
        async fn load(&self, _path: &Path) -> ConsolidatorResult<Option<Value>> {
            Ok(self.last.lock().unwrap().clone())
        }

        async fn save(&self, _path: &Path, value: &Value) -> ConsolidatorResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(value.clone());
            Ok(())
        }
    }

    fn writer(store: Arc<CountingStore>, counter: Arc<AtomicU64>, throttle: Duration) -> DebouncedWriter {
        DebouncedWriter::spawn(
            store,
            "/cache.json",
            throttle,
            Box::new(move || -> ConsolidatorResult<Value> {
                Ok(json!({ "n": counter.load(Ordering::SeqCst) }))
            }),
        )
    }

    #[tokio::test]
    async fn test_changes_within_window_are_coalesced() {
        let store = Arc::new(CountingStore::default());
        let counter = Arc::new(AtomicU64::new(0));
        let writer = writer(Arc::clone(&store), Arc::clone(&counter), Duration::from_millis(50));

        for _ in 0..20 {
            counter.fetch_add(1, Ordering::SeqCst);
            writer.mark_dirty();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert_eq!(*store.last.lock().unwrap(), Some(json!({ "n": 20 })));
    }

    #[tokio::test]
    async fn test_close_flushes_pending_changes() {
        let store = Arc::new(CountingStore::default());
        let counter = Arc::new(AtomicU64::new(0));
        let writer = writer(Arc::clone(&store), Arc::clone(&counter), Duration::from_secs(3600));

        counter.store(7, Ordering::SeqCst);
        writer.mark_dirty();
        writer.close().await.unwrap();

        assert!(store.saves.load(Ordering::SeqCst) >= 1);
        assert_eq!(*store.last.lock().unwrap(), Some(json!({ "n": 7 })));

        // Closed writers ignore further marks
        writer.mark_dirty();
    }

    #[tokio::test]
    async fn test_no_save_without_changes() {
        let store = Arc::new(CountingStore::default());
        let counter = Arc::new(AtomicU64::new(0));
        let writer = writer(Arc::clone(&store), counter, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
        drop(writer);
    }
}
