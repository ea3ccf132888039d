//! Thread-safe accumulation of import statistics, rendered the way the
//! importer reports progress to the operator.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
struct Inner {
    samples: u64,
    bytes: u64,
    requests: u64,
    retries: u64,
    import_duration: Duration,
    idle_duration: Duration,
}

/// Mutex-guarded counters. The only shared mutable state in the pipeline;
/// every mutation takes the lock, none of them hold it across I/O.
pub struct Stats {
    inner: Mutex<Inner>,
    start_time: Mutex<Instant>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            start_time: Mutex::new(Instant::now()),
        }
    }

    /// Records one successful flush: only successful requests increment
    /// `requests`; a retried-then-succeeded flush still counts as one.
    pub fn record_success(&self, bytes: u64, samples: u64, duration: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.bytes += bytes;
        inner.samples += samples;
        inner.requests += 1;
        inner.import_duration += duration;
    }

    /// Records one additional attempt beyond the first for a given flush.
    pub fn record_retry(&self) {
        self.inner.lock().unwrap().retries += 1;
    }

    /// Records time a writer spent holding a non-empty, non-full batch.
    pub fn record_idle(&self, duration: Duration) {
        self.inner.lock().unwrap().idle_duration += duration;
    }

    pub fn reset(&self) {
        *self.inner.lock().unwrap() = Inner::default();
        *self.start_time.lock().unwrap() = Instant::now();
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = *self.inner.lock().unwrap();
        let elapsed = self.start_time.lock().unwrap().elapsed();
        Snapshot {
            samples: inner.samples,
            bytes: inner.bytes,
            requests: inner.requests,
            retries: inner.retries,
            import_duration: inner.import_duration,
            idle_duration: inner.idle_duration,
            elapsed,
        }
    }
}

/// A point-in-time, immutable view used for rendering.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub samples: u64,
    pub bytes: u64,
    pub requests: u64,
    pub retries: u64,
    pub import_duration: Duration,
    pub idle_duration: Duration,
    pub elapsed: Duration,
}

impl Snapshot {
    fn per_second(&self, count: u64) -> f64 {
        let secs = self.import_duration.as_secs_f64();
        if count == 0 || secs == 0.0 {
            0.0
        } else {
            count as f64 / secs
        }
    }

    pub fn samples_per_second(&self) -> f64 {
        self.per_second(self.samples)
    }

    pub fn bytes_per_second(&self) -> f64 {
        self.per_second(self.bytes)
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "imported {} samples ({}) in {:.3}s via {} requests ({} retries); {}/s, {}/s; idle {:.3}s",
            self.samples,
            byte_count_si(self.bytes),
            self.import_duration.as_secs_f64(),
            self.requests,
            self.retries,
            fmt_rate(self.samples_per_second(), "samples"),
            byte_count_si(self.bytes_per_second().round() as u64),
            self.idle_duration.as_secs_f64(),
        )
    }
}

fn fmt_rate(rate: f64, unit: &str) -> String {
    format!("{:.1} {}", rate, unit)
}

/// SI decimal byte formatting: `B, kB, MB, GB, TB, PB, EB`, base 1000, one
/// decimal place above the base unit.
pub fn byte_count_si(bytes: u64) -> String {
    const UNIT: u64 = 1000;
    if bytes < UNIT {
        return format!("{bytes}B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        n /= UNIT;
        exp += 1;
    }
    const SUFFIXES: &[&str] = &["kB", "MB", "GB", "TB", "PB", "EB"];
    format!("{:.1}{}", bytes as f64 / div as f64, SUFFIXES[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_count_si_below_unit() {
        assert_eq!(byte_count_si(512), "512B");
    }

    #[test]
    fn byte_count_si_kilobytes() {
        assert_eq!(byte_count_si(1536), "1.5kB");
    }

    #[test]
    fn byte_count_si_megabytes() {
        assert_eq!(byte_count_si(2_500_000), "2.5MB");
    }

    #[test]
    fn record_success_accumulates() {
        let stats = Stats::new();
        stats.record_success(100, 10, Duration::from_secs(1));
        stats.record_success(200, 20, Duration::from_secs(1));
        let snap = stats.snapshot();
        assert_eq!(snap.bytes, 300);
        assert_eq!(snap.samples, 30);
        assert_eq!(snap.requests, 2);
    }

    #[test]
    fn reset_clears_counters() {
        let stats = Stats::new();
        stats.record_success(100, 10, Duration::from_secs(1));
        stats.record_retry();
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.bytes, 0);
        assert_eq!(snap.retries, 0);
    }

    #[test]
    fn rate_is_zero_without_duration() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.samples_per_second(), 0.0);
    }
}
