//! Bounded-concurrency batch runner with per-item error isolation

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::engine::progress::{EtaEstimator, ProgressEvent, ProgressSink, Throttle};
use crate::error::{ConsolidatorError, ConsolidatorResult};

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Batch runner configuration
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum operations in flight
    pub concurrency: usize,
    /// Fail the whole batch on the first item error
    pub halt_on_error: bool,
    /// Name shown in progress lines
    pub label: String,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            halt_on_error: false,
            label: "Processing".to_string(),
        }
    }
}

/// A failed item, keyed by its position in the input
#[derive(Debug)]
pub struct ItemError<T> {
    pub index: usize,
    pub item: T,
    pub error: ConsolidatorError,
}

/// Result of a batch that was not halted
#[derive(Debug)]
pub struct BatchOutcome<T, R> {
    /// One slot per input item; `None` where the item failed
    pub results: Vec<Option<R>>,
    /// Failures in completion order
    pub errors: Vec<ItemError<T>>,
}

impl<T, R> BatchOutcome<T, R> {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Shared completion counter for a running batch.
///
/// Passed explicitly into [`BatchRunner::run_all`]; emits a [`ProgressEvent::Batch`]
/// at most once per interval, and always for the final item.
#[derive(Debug)]
pub struct BatchProgress {
    total: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    eta: Mutex<EtaEstimator>,
    throttle: Throttle,
    sink: ProgressSink,
}

impl BatchProgress {
    pub fn new(sink: ProgressSink, interval: Duration) -> Self {
        Self {
            total: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            eta: Mutex::new(EtaEstimator::start()),
            throttle: Throttle::new(interval),
            sink,
        }
    }

    /// Progress that is counted but never published
    pub fn silent() -> Self {
        Self::new(ProgressSink::disabled(), Duration::from_secs(1))
    }

    /// Reset counters for a batch of `total` items
    pub fn begin(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        if let Ok(mut eta) = self.eta.lock() {
            *eta = EtaEstimator::start();
        }
    }

    /// Count one finished item
    pub fn record(&self, label: &str, failed: bool) -> usize {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if failed {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        let total = self.total.load(Ordering::SeqCst);

        if completed >= total || self.throttle.ready() {
            let ratio = if total == 0 {
                1.0
            } else {
                completed as f64 / total as f64
            };
            if let Ok(mut eta) = self.eta.lock() {
                let eta = eta.update(ratio);
                self.sink.publish(ProgressEvent::Batch {
                    label: label.to_string(),
                    completed,
                    failed: self.failed(),
                    total,
                    eta,
                });
            }
        }
        completed
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Runs one async operation per item with bounded concurrency
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run `op` over every item.
    ///
    /// At most `concurrency` operations are in flight. Item failures are collected
    /// unless `halt_on_error` is set, in which case the first failure is returned and
    /// the operations still running are detached rather than awaited.
    pub async fn run_all<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        op: F,
        progress: &BatchProgress,
    ) -> ConsolidatorResult<BatchOutcome<T, R>>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ConsolidatorResult<R>> + Send + 'static,
    {
        let total = items.len();
        let limit = self.options.concurrency.max(1);
        let label = self.options.label.as_str();
        progress.begin(total);

        let op = Arc::new(op);
        let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
        let mut errors = Vec::new();
        let mut pending = items.into_iter().enumerate();
        let mut in_flight = JoinSet::new();

        loop {
            while in_flight.len() < limit {
                let Some((index, item)) = pending.next() else {
                    break;
                };
                let op = Arc::clone(&op);
                in_flight.spawn(async move {
                    // A panicking operation fails its own item only
                    let outcome = match tokio::spawn(op(item.clone())).await {
                        Ok(outcome) => outcome,
                        Err(join_error) => Err(ConsolidatorError::from(join_error)),
                    };
                    (index, item, outcome)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let (index, item, outcome) = joined?;

            match outcome {
                Ok(value) => {
                    results[index] = Some(value);
                    progress.record(label, false);
                }
                Err(error) => {
                    progress.record(label, true);
                    if self.options.halt_on_error {
                        warn!(
                            index,
                            in_flight = in_flight.len(),
                            "{} halted on error: {}",
                            label,
                            error
                        );
                        in_flight.detach_all();
                        return Err(error);
                    }
                    debug!(index, error = %error, "{} item failed", label);
                    errors.push(ItemError { index, item, error });
                }
            }
        }

        Ok(BatchOutcome { results, errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(concurrency: usize, halt_on_error: bool) -> BatchRunner {
        BatchRunner::new(BatchOptions {
            concurrency,
            halt_on_error,
            label: "Testing".to_string(),
        })
    }

    #[tokio::test]
    async fn test_errors_are_isolated_by_index() {
        let progress = BatchProgress::silent();
        let outcome = runner(4, false)
            .run_all(
                (0..10usize).collect(),
                |n| async move {
                    if n == 3 || n == 7 {
                        Err(ConsolidatorError::ProbeError {
                            path: format!("clip{}", n),
                            message: "corrupt".to_string(),
                        })
                    } else {
                        Ok(n * 10)
                    }
                },
                &progress,
            )
            .await
            .unwrap();

        let mut failed: Vec<usize> = outcome.errors.iter().map(|e| e.index).collect();
        failed.sort_unstable();
        assert_eq!(failed, vec![3, 7]);
        assert!(outcome.errors.iter().all(|e| e.item == e.index));
        assert_eq!(outcome.succeeded(), 8);
        assert_eq!(outcome.results[5], Some(50));
        assert_eq!(outcome.results[3], None);
        assert_eq!(progress.completed(), 10);
        assert_eq!(progress.failed(), 2);
    }

    #[tokio::test]
    async fn test_panicking_item_is_recorded() {
        let progress = BatchProgress::silent();
        let outcome = runner(2, false)
            .run_all(
                (0..5usize).collect(),
                |n| async move {
                    if n == 2 {
                        panic!("decoder crashed on item {}", n);
                    }
                    Ok(n)
                },
                &progress,
            )
            .await
            .unwrap();

        assert_eq!(outcome.succeeded(), 4);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 2);
        assert_eq!(outcome.errors[0].item, 2);
        assert!(matches!(outcome.errors[0].error, ConsolidatorError::Task { .. }));
        assert_eq!(outcome.results[4], Some(4));
        assert_eq!(progress.failed(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (c, p) = (Arc::clone(&current), Arc::clone(&peak));

        let outcome = runner(3, false)
            .run_all(
                (0..20usize).collect(),
                move |n| {
                    let current = Arc::clone(&c);
                    let peak = Arc::clone(&p);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(n)
                    }
                },
                &BatchProgress::silent(),
            )
            .await
            .unwrap();

        assert!(outcome.is_clean());
        assert_eq!(outcome.succeeded(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_halt_on_error_stops_scheduling() {
        let progress = BatchProgress::silent();
        let result = runner(1, true)
            .run_all(
                (0..10usize).collect(),
                |n| async move {
                    if n == 2 {
                        Err(ConsolidatorError::invalid("boom"))
                    } else {
                        Ok(n)
                    }
                },
                &progress,
            )
            .await;

        assert!(matches!(result, Err(ConsolidatorError::InvalidArgument { .. })));
        assert_eq!(progress.completed(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcome = runner(2, false)
            .run_all(
                Vec::<usize>::new(),
                |n| async move { Ok(n) },
                &BatchProgress::silent(),
            )
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn test_progress_events_published() {
        let (sink, mut rx) = ProgressSink::channel(64);
        let progress = BatchProgress::new(sink, Duration::from_secs(3600));
        runner(2, false)
            .run_all((0..5usize).collect(), |n| async move { Ok(n) }, &progress)
            .await
            .unwrap();
        drop(progress);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        // First completion passes the throttle; the final one is always published.
        assert_eq!(events.len(), 2);
        match events.last() {
            Some(ProgressEvent::Batch {
                completed, total, ..
            }) => {
                assert_eq!((*completed, *total), (5, 5));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
