//! Progress accounting, ETA estimation and the progress event channel

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::utils::time::format_clock;

/// Default minimum spacing between displayed progress lines
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the progress event channel
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// One ETA projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eta {
    /// Completion ratio in `[0, 1]`
    pub ratio: f64,
    pub elapsed: Duration,
    /// `None` until some progress has been made
    pub remaining: Option<Duration>,
}

/// Projects remaining time from elapsed wall-clock time and a completion ratio.
///
/// `remaining = elapsed / ratio - elapsed`. The ratio is clamped to `[0, 1]` and
/// never moves backwards within one estimator.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    started: Instant,
    ratio: f64,
}

impl EtaEstimator {
    /// Start the clock now
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            started,
            ratio: 0.0,
        }
    }

    pub fn update(&mut self, ratio: f64) -> Eta {
        self.update_at(ratio, Instant::now())
    }

    /// Feed a ratio observed at `now`
    pub fn update_at(&mut self, ratio: f64, now: Instant) -> Eta {
        if ratio.is_finite() {
            self.ratio = self.ratio.max(ratio.clamp(0.0, 1.0));
        }

        let elapsed = now.saturating_duration_since(self.started);
        let remaining = if self.ratio > 0.0 {
            let secs = elapsed.as_secs_f64();
            Duration::try_from_secs_f64((secs / self.ratio - secs).max(0.0)).ok()
        } else {
            None
        };

        Eta {
            ratio: self.ratio,
            elapsed,
            remaining,
        }
    }

    /// Highest ratio seen so far
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Lets an action through at most once per interval
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// True when the interval has passed since the last accepted call
    pub fn ready(&self) -> bool {
        self.ready_at(Instant::now())
    }

    pub fn ready_at(&self, now: Instant) -> bool {
        if let Ok(mut last) = self.last.lock() {
            let due = match *last {
                Some(previous) => now.saturating_duration_since(previous) >= self.interval,
                None => true,
            };
            if due {
                *last = Some(now);
            }
            return due;
        }
        false
    }
}

/// Events published by the batch and job runners
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Concurrent batch progress (probing)
    Batch {
        label: String,
        completed: usize,
        failed: usize,
        total: usize,
        eta: Eta,
    },
    /// A render job is about to start
    JobStarted {
        index: usize,
        total: usize,
        label: String,
        clips: usize,
    },
    /// Render progress, with the run-wide ratio in `eta`
    Render {
        index: usize,
        total: usize,
        label: String,
        job_fraction: f64,
        eta: Eta,
    },
    /// A render job ended
    JobFinished {
        index: usize,
        total: usize,
        label: String,
        success: bool,
    },
}

impl ProgressEvent {
    /// Whether a reporter may drop this event when throttling
    pub fn is_transient(&self) -> bool {
        match self {
            ProgressEvent::Batch {
                completed, total, ..
            } => completed < total,
            ProgressEvent::Render { .. } => true,
            ProgressEvent::JobStarted { .. } | ProgressEvent::JobFinished { .. } => false,
        }
    }

    /// Human-readable progress line
    pub fn describe(&self) -> String {
        match self {
            ProgressEvent::Batch {
                label,
                completed,
                failed,
                total,
                eta,
            } => {
                let mut line = format!(
                    "{} {}/{} ({:.1}%)",
                    label,
                    completed,
                    total,
                    eta.ratio * 100.0
                );
                if *failed > 0 {
                    line.push_str(&format!(", {} failed", failed));
                }
                push_eta(&mut line, eta);
                line
            }
            ProgressEvent::JobStarted {
                index,
                total,
                label,
                clips,
            } => format!("Job {}/{} {} ({} clips)", index + 1, total, label, clips),
            ProgressEvent::Render {
                index,
                total,
                label,
                job_fraction,
                eta,
            } => {
                let mut line = format!(
                    "Rendering {}/{} {} {:.1}% (overall {:.1}%)",
                    index + 1,
                    total,
                    label,
                    job_fraction * 100.0,
                    eta.ratio * 100.0
                );
                push_eta(&mut line, eta);
                line
            }
            ProgressEvent::JobFinished {
                index,
                total,
                label,
                success,
            } => format!(
                "Job {}/{} {} {}",
                index + 1,
                total,
                label,
                if *success { "done" } else { "failed" }
            ),
        }
    }
}

fn push_eta(line: &mut String, eta: &Eta) {
    line.push_str(&format!(", elapsed {}", format_clock(eta.elapsed)));
    if let Some(remaining) = eta.remaining {
        line.push_str(&format!(", ETA {}", format_clock(remaining)));
    }
}

/// Publishing half of the progress channel.
///
/// Publishing never blocks; when the observer lags, events are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// Bounded channel; the receiver goes to an observer such as [`ConsoleProgressReporter`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn publish(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Drains progress events and logs them, rate-limited
pub struct ConsoleProgressReporter {
    interval: Duration,
}

impl ConsoleProgressReporter {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run the reporter in the background until every sink is dropped
    pub fn spawn(self, rx: mpsc::Receiver<ProgressEvent>) -> JoinHandle<usize> {
        tokio::spawn(self.drain(rx))
    }

    /// Log events until the channel closes; returns how many lines were written
    pub async fn drain(self, mut rx: mpsc::Receiver<ProgressEvent>) -> usize {
        let throttle = Throttle::new(self.interval);
        let mut written = 0;
        while let Some(event) = rx.recv().await {
            if event.is_transient() && !throttle.ready() {
                continue;
            }
            info!("{}", event.describe());
            written += 1;
        }
        written
    }
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_INTERVAL)
    }
}
