use serde::Serialize;
use std::time::{Duration, Instant};

/// Capture statistics for one node.
pub struct CaptureStats {
    triple_count: u64,
    published_count: u64,
    dropped_count: u64,
    total_bytes: u64,
    start_time: Instant,
    last_triple_time: Option<Instant>,
    dispatch_us: u64,
}

/// Snapshot of capture stats, serialisable for logs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub fps: f64,
    pub triple_count: u64,
    pub published_count: u64,
    pub dropped_count: u64,
    pub drop_rate: f64,
    pub dispatch_ms: f64,
    pub bandwidth_bps: u64,
    pub seconds_since_last_triple: Option<f64>,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self {
            triple_count: 0,
            published_count: 0,
            dropped_count: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            last_triple_time: None,
            dispatch_us: 0,
        }
    }

    /// Record one dispatched triple and how long its fan-out took.
    pub fn record_triple(&mut self, dispatch_time: Duration) {
        self.triple_count += 1;
        self.last_triple_time = Some(Instant::now());
        self.dispatch_us = dispatch_time.as_micros() as u64;
    }

    /// Record one artifact handed to the transport.
    pub fn record_published(&mut self, bytes: usize) {
        self.published_count += 1;
        self.total_bytes += bytes as u64;
    }

    /// Record one artifact that could not be produced or delivered.
    pub fn record_drop(&mut self) {
        self.dropped_count += 1;
    }

    pub fn triple_count(&self) -> u64 {
        self.triple_count
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// Triples per second since start or last reset.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.triple_count as f64 / elapsed
    }

    /// Dropped artifacts as a percentage (0.0 - 100.0).
    pub fn drop_rate(&self) -> f64 {
        let total = self.published_count + self.dropped_count;
        if total == 0 {
            return 0.0;
        }
        (self.dropped_count as f64 / total as f64) * 100.0
    }

    /// Duration of the latest dispatch in milliseconds.
    pub fn dispatch_ms(&self) -> f64 {
        self.dispatch_us as f64 / 1000.0
    }

    /// Published bytes per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.total_bytes as f64 / elapsed) as u64
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            fps: self.fps(),
            triple_count: self.triple_count,
            published_count: self.published_count,
            dropped_count: self.dropped_count,
            drop_rate: self.drop_rate(),
            dispatch_ms: self.dispatch_ms(),
            bandwidth_bps: self.bandwidth_bps(),
            seconds_since_last_triple: self
                .last_triple_time
                .map(|t| t.elapsed().as_secs_f64()),
        }
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}
