use chrono::{DateTime, Utc};
use std::{future::Future, time::Duration};

#[cfg(any(test, feature = "mocks"))]
use chrono::TimeDelta;
#[cfg(any(test, feature = "mocks"))]
use std::sync::{Arc, Mutex};

/// Source of wall-clock time and delays.
///
/// Injected everywhere time matters so day boundaries, cooldowns and the poll ceiling can be
/// exercised with a virtual clock.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time instantly.
#[cfg(any(test, feature = "mocks"))]
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    slept: Arc<Mutex<Duration>>,
}

#[cfg(any(test, feature = "mocks"))]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
            slept: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock().unwrap() += delta;
    }

    /// Total time spent in `sleep` so far.
    pub fn slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

#[cfg(any(test, feature = "mocks"))]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(TimeDelta::from_std(duration).unwrap_or(TimeDelta::zero()));
        *self.slept.lock().unwrap() += duration;
        tokio::task::yield_now().await;
    }
}
