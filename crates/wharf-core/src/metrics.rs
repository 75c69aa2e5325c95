//! A process-lifetime metrics sink passed in at construction (Design Notes
//! §9): no module-level singletons, no global meter registration.

pub trait MetricsSink: Send + Sync {
    fn record_claimed(&self, queue: &str, count: u64);
    fn record_acked(&self, queue: &str, count: u64);
    fn record_abandoned(&self, queue: &str, count: u64);
    fn record_failed(&self, queue: &str, count: u64);
    fn record_reaped(&self, queue: &str, count: u64);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_claimed(&self, _queue: &str, _count: u64) {}
    fn record_acked(&self, _queue: &str, _count: u64) {}
    fn record_abandoned(&self, _queue: &str, _count: u64) {}
    fn record_failed(&self, _queue: &str, _count: u64) {}
    fn record_reaped(&self, _queue: &str, _count: u64) {}
}
