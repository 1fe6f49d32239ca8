use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// A source of wall-clock time and cancelable sleeps, injectable so tests can advance time
/// deterministically instead of racing a real timer.
///
/// Mirrors the shape of the teacher's `tokio::time::sleep`-based scheduling loop, but behind a
/// trait so `FrozenClock` can stand in during tests (see `scheduler::tests`).
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  fn sleep(&self, duration: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;
}

/// The real clock: `Utc::now()` plus `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    return Utc::now();
  }

  fn sleep(&self, duration: Duration) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    return Box::pin(tokio::time::sleep(duration));
  }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
  return Arc::new(SystemClock);
}

#[cfg(test)]
pub mod testing {
  use super::*;
  use parking_lot::Mutex;
  use std::sync::Arc;

  /// A clock whose `now()` is manually advanced by the test; `sleep` resolves immediately so
  /// retry/backoff delays don't slow down test wall-clock time.
  #[derive(Clone)]
  pub struct FrozenClock {
    now: Arc<Mutex<DateTime<Utc>>>,
  }

  impl FrozenClock {
    pub fn new(start: DateTime<Utc>) -> Self {
      return Self {
        now: Arc::new(Mutex::new(start)),
      };
    }

    pub fn advance(&self, duration: chrono::Duration) {
      let mut now = self.now.lock();
      *now += duration;
    }
  }

  impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
      return *self.now.lock();
    }

    fn sleep(
      &self,
      _duration: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
      return Box::pin(tokio::task::yield_now());
    }
  }
}
