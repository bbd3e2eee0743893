//! Deterministic clock for backoff and deadline tests

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use connector_core::Clock;

/// Test clock: `sleep` returns immediately, records the requested pause and
/// advances virtual time by it, so backoff schedules are observable without
/// real waiting.
#[derive(Clone)]
pub struct FakeClock {
    state: Arc<FakeClockState>,
}

struct FakeClockState {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeClockState {
                origin: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Every pause requested so far, in order
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.state.sleeps.lock().clone()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.state.origin + *self.state.offset.lock()
    }

    async fn sleep(&self, duration: Duration) {
        self.state.sleeps.lock().push(duration);
        *self.state.offset.lock() += duration;
    }
}
