//! A `MetricsSink` that remembers what was recorded, for assertions in
//! dispatcher tests instead of wiring up a real metrics backend.

use std::sync::Mutex;

use wharf_core::MetricsSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct Counts {
    pub claimed: u64,
    pub acked: u64,
    pub abandoned: u64,
    pub failed: u64,
    pub reaped: u64,
}

#[derive(Default)]
pub struct RecordingMetricsSink {
    counts: Mutex<Counts>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Counts {
        *self.counts.lock().unwrap()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record_claimed(&self, _queue: &str, count: u64) {
        self.counts.lock().unwrap().claimed += count;
    }

    fn record_acked(&self, _queue: &str, count: u64) {
        self.counts.lock().unwrap().acked += count;
    }

    fn record_abandoned(&self, _queue: &str, count: u64) {
        self.counts.lock().unwrap().abandoned += count;
    }

    fn record_failed(&self, _queue: &str, count: u64) {
        self.counts.lock().unwrap().failed += count;
    }

    fn record_reaped(&self, _queue: &str, count: u64) {
        self.counts.lock().unwrap().reaped += count;
    }
}
