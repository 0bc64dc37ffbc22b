use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const EMA_ALPHA: f64 = 0.1;
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(60);

/// Live counters for the current process, reset on start.
///
/// The hot path only touches atomics and a short mutex-held deque, so workers
/// never block on readers.
pub struct StatsAggregator {
    processed_total: AtomicU64,
    failed_total: AtomicU64,
    completions: Mutex<VecDeque<Instant>>,
    ema_seconds: Mutex<Option<f64>>,
}

/// Snapshot of the live counters
#[derive(Debug, Clone)]
pub struct LiveStats {
    pub processed_total: u64,
    pub failed_total: u64,
    pub throughput_per_minute: u64,
    pub avg_processing_seconds: Option<f64>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            processed_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
            completions: Mutex::new(VecDeque::new()),
            ema_seconds: Mutex::new(None),
        }
    }

    pub fn record_completed(&self, duration_seconds: f64) {
        self.processed_total.fetch_add(1, Ordering::Relaxed);

        {
            let mut completions = self.completions.lock().unwrap();
            completions.push_back(Instant::now());
            Self::prune(&mut completions);
        }

        let mut ema = self.ema_seconds.lock().unwrap();
        *ema = Some(match *ema {
            Some(current) => current + EMA_ALPHA * (duration_seconds - current),
            None => duration_seconds,
        });
    }

    pub fn record_failed(&self) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn live(&self) -> LiveStats {
        let throughput = {
            let mut completions = self.completions.lock().unwrap();
            Self::prune(&mut completions);
            completions.len() as u64
        };

        LiveStats {
            processed_total: self.processed_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
            throughput_per_minute: throughput,
            avg_processing_seconds: *self.ema_seconds.lock().unwrap(),
        }
    }

    fn prune(completions: &mut VecDeque<Instant>) {
        let cutoff = Instant::now() - THROUGHPUT_WINDOW;
        while completions.front().is_some_and(|t| *t < cutoff) {
            completions.pop_front();
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
