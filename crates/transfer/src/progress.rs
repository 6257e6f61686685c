use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Default progress notification interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Elapsed time is never taken below this when computing throughput.
const MIN_ELAPSED: Duration = Duration::from_millis(100);

/// Shortest interval the tracker accepts (tokio rejects a zero period).
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Callback invoked with every progress sample.
pub type ProgressCallback = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Byte counter shared between the transferring task(s) and the reporter.
///
/// Writers only ever add; the reporter only reads. No ordering beyond
/// atomicity is needed because samples are approximate.
#[derive(Debug, Clone, Default)]
pub struct ProgressCounter(Arc<AtomicU64>);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// One progress sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub transferred: u64,
    pub total: u64,
    pub elapsed: Duration,
    pub bytes_per_sec: f64,
    /// Percentage complete, in `0.0..=100.0`.
    pub percent: f64,
    /// `true` for the final sample emitted when the tracker stops.
    pub finished: bool,
}

impl ProgressSnapshot {
    /// Computes a sample from raw values.
    ///
    /// `elapsed` is floored to 100 ms; a zero `total` counts as complete.
    pub fn compute(transferred: u64, total: u64, elapsed: Duration, finished: bool) -> Self {
        let secs = elapsed.max(MIN_ELAPSED).as_secs_f64();
        let percent = if total == 0 {
            100.0
        } else {
            (transferred as f64 * 100.0 / total as f64).min(100.0)
        };
        Self {
            transferred,
            total,
            elapsed,
            bytes_per_sec: transferred as f64 / secs,
            percent,
            finished,
        }
    }
}

/// Periodic reporter for a single transfer.
///
/// Runs as its own tokio task from [`start`](Self::start) until
/// [`finish`](Self::finish), emitting a sample every interval and one
/// final sample on completion.
pub struct ProgressTracker {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<ProgressSnapshot>,
    counter: ProgressCounter,
    total: u64,
    started: Instant,
}

impl ProgressTracker {
    /// Spawns the reporting task.
    ///
    /// With no callback the task still runs and the final sample is
    /// returned from [`finish`](Self::finish).
    pub fn start(
        total: u64,
        counter: ProgressCounter,
        started: Instant,
        interval: Duration,
        callback: Option<ProgressCallback>,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let interval = interval.max(MIN_INTERVAL);
        let task_counter = counter.clone();

        let task = tokio::spawn(async move {
            let emit = |finished: bool| {
                let snapshot = ProgressSnapshot::compute(
                    task_counter.get(),
                    total,
                    started.elapsed(),
                    finished,
                );
                if let Some(cb) = &callback {
                    cb(&snapshot);
                }
                snapshot
            };

            // First tick completes immediately and reports the starting point.
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        emit(false);
                    }
                }
            }
            emit(true)
        });

        Self {
            stop: Some(stop),
            task,
            counter,
            total,
            started,
        }
    }

    /// Stops the reporter and waits for its final sample.
    pub async fn finish(mut self) -> ProgressSnapshot {
        // Dropping the sender signals the task to exit.
        drop(self.stop.take());
        match (&mut self.task).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "progress reporter ended abnormally");
                ProgressSnapshot::compute(
                    self.counter.get(),
                    self.total,
                    self.started.elapsed(),
                    true,
                )
            }
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        // Covers early returns that never reach `finish`.
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn counter_accumulates() {
        let counter = ProgressCounter::new();
        let shared = counter.clone();
        counter.add(10);
        shared.add(5);
        assert_eq!(counter.get(), 15);
    }

    #[test]
    fn snapshot_percent_and_rate() {
        let s = ProgressSnapshot::compute(500, 1000, Duration::from_secs(2), false);
        assert_eq!(s.percent, 50.0);
        assert_eq!(s.bytes_per_sec, 250.0);
        assert!(!s.finished);
    }

    #[test]
    fn snapshot_zero_total_is_complete() {
        let s = ProgressSnapshot::compute(0, 0, Duration::from_secs(1), false);
        assert_eq!(s.percent, 100.0);
    }

    #[test]
    fn snapshot_percent_is_capped() {
        let s = ProgressSnapshot::compute(3000, 1000, Duration::from_secs(1), true);
        assert_eq!(s.percent, 100.0);
    }

    #[test]
    fn snapshot_elapsed_is_floored() {
        let s = ProgressSnapshot::compute(100, 1000, Duration::ZERO, false);
        assert!((s.bytes_per_sec - 1000.0).abs() < 1e-6);
        assert_eq!(s.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn tracker_reports_periodically_and_on_finish() {
        let samples = Arc::new(Mutex::new(Vec::<ProgressSnapshot>::new()));
        let sink = Arc::clone(&samples);
        let callback: ProgressCallback = Arc::new(move |s: &ProgressSnapshot| sink.lock().unwrap().push(*s));

        let counter = ProgressCounter::new();
        let tracker = ProgressTracker::start(
            200,
            counter.clone(),
            Instant::now(),
            Duration::from_millis(500),
            Some(callback),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        counter.add(100);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        counter.add(100);

        let last = tracker.finish().await;
        assert!(last.finished);
        assert_eq!(last.transferred, 200);
        assert_eq!(last.percent, 100.0);

        let samples = samples.lock().unwrap();
        // Initial tick, two periodic ticks, final sample.
        assert!(samples.len() >= 3, "got {} samples", samples.len());
        assert_eq!(samples[0].transferred, 0);
        assert!(samples.last().unwrap().finished);
        assert_eq!(samples.iter().filter(|s| s.finished).count(), 1);
    }

    #[tokio::test]
    async fn tracker_without_callback_returns_final_sample() {
        let counter = ProgressCounter::new();
        counter.add(42);
        let tracker = ProgressTracker::start(
            0,
            counter,
            Instant::now(),
            DEFAULT_INTERVAL,
            None,
        );
        let last = tracker.finish().await;
        assert_eq!(last.transferred, 42);
        assert_eq!(last.percent, 100.0);
    }
}
