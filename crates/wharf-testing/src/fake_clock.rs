//! A controllable stand-in for [`wharf_core::MonotonicClock`] so dispatcher
//! loop-pacing tests don't depend on wall-clock sleeps.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use wharf_core::MonotonicClock;

pub struct FakeClock {
    inner: Mutex<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.inner.lock().unwrap();
        *guard += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for FakeClock {
    fn now(&self) -> Instant {
        *self.inner.lock().unwrap()
    }
}
