//! A strictly non-decreasing time reading, immune to wall-clock jumps.
//!
//! The dispatcher's outer polling loop paces itself off this clock rather
//! than `chrono::Utc::now()` so an NTP step, a DST transition, or a fake time
//! provider swapped in under test never wedges the interval math.

use std::time::Instant;

pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMonotonicClock;

impl MonotonicClock for SystemMonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
