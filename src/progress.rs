//! Progress surfaces: a monotonic percent reporter for apply, and the
//! atomic counter set polled during build.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Callback invoked with a percent in `[0, 100]`.
pub type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;

/// Coalescing sink: forwards a submitted percent only when it exceeds the
/// last one forwarded, so consumers never observe progress moving
/// backwards or repeating.
pub struct ProgressReporter {
    callback: Option<ProgressFn>,
    last: AtomicU8,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressFn>) -> Self {
        Self {
            callback,
            last: AtomicU8::new(0),
        }
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        if percent > self.last.load(Ordering::Acquire) {
            self.last.store(percent, Ordering::Release);
            if let Some(callback) = &self.callback {
                callback(percent);
            }
        }
    }

    pub fn last(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }
}

/// Shared counters updated by build workers and read by the progress
/// poller. Workers only ever add; the poller only ever loads.
#[derive(Debug, Default)]
pub struct BuildCounters {
    pub processed: AtomicU64,
    pub added: AtomicU64,
    pub changed: AtomicU64,
    pub unchanged: AtomicU64,
    pub removed: AtomicU64,
    pub warnings: AtomicU64,
}

impl BuildCounters {
    pub fn snapshot(&self) -> BuildStats {
        BuildStats {
            processed: self.processed.load(Ordering::Relaxed),
            added: self.added.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the build counters; also the builder's summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub processed: u64,
    pub added: u64,
    pub changed: u64,
    pub unchanged: u64,
    pub removed: u64,
    pub warnings: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_reporter() -> (ProgressReporter, Arc<Mutex<Vec<u8>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::new(Some(Box::new(move |p| {
            sink.lock().unwrap().push(p);
        })));
        (reporter, seen)
    }

    #[test]
    fn test_forwards_only_increases() {
        let (reporter, seen) = recording_reporter();
        for p in [25, 25, 50, 30, 50, 75, 80, 100] {
            reporter.report(p);
        }
        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 80, 100]);
        assert_eq!(reporter.last(), 100);
    }

    #[test]
    fn test_clamps_to_hundred() {
        let (reporter, seen) = recording_reporter();
        reporter.report(250);
        reporter.report(100);
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_without_callback() {
        let reporter = ProgressReporter::new(None);
        reporter.report(50);
        assert_eq!(reporter.last(), 50);
    }

    #[test]
    fn test_counter_snapshot() {
        let counters = BuildCounters::default();
        counters.processed.fetch_add(3, Ordering::Relaxed);
        counters.changed.fetch_add(2, Ordering::Relaxed);
        counters.added.fetch_add(1, Ordering::Relaxed);

        let stats = counters.snapshot();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.changed, 2);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.unchanged, 0);
    }
}
