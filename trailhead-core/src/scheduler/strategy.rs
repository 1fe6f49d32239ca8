use async_trait::async_trait;

/// Governs whether a due task's next firing is allowed to actually enqueue work, independent of
/// the schedule that produced the due time. Lets callers rate-limit noisy schedules without
/// changing the schedule itself.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
  /// Called once per due task per tick, before the task's job is submitted to the worker pool.
  /// Returning `false` skips this firing entirely (it is not retried or queued for later, and
  /// does not count as a failure; the task's `next_run` still advances normally).
  async fn should_execute(&self, task_id: &str) -> bool;

  /// Called once a firing that `should_execute` approved leaves the running state (success or
  /// failure). Strategies that track concurrency override this to release their slot; the
  /// default is a no-op for strategies with no concurrency notion.
  async fn on_finished(&self, _task_id: &str) {}
}

/// Always executes. The scheduler's default strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysExecute;

#[async_trait]
impl ExecutionStrategy for AlwaysExecute {
  async fn should_execute(&self, _task_id: &str) -> bool {
    return true;
  }
}

/// Rejects a firing when `currently_running` (global, across all tasks) is already at
/// `max_concurrent`, or when the same task last started less than `min_interval` ago. Matches
/// the spec's `ThrottleStrategy(max_concurrent, min_interval_per_task)`: a rejected firing is
/// simply skipped, not queued or counted as a failure.
pub struct ThrottleStrategy {
  max_concurrent: u32,
  min_interval: std::time::Duration,
  currently_running: std::sync::atomic::AtomicU32,
  last_start: parking_lot::Mutex<std::collections::HashMap<String, chrono::DateTime<chrono::Utc>>>,
  clock: crate::scheduler::clock::SharedClock,
}

impl ThrottleStrategy {
  pub fn new(
    max_concurrent: u32,
    min_interval: std::time::Duration,
    clock: crate::scheduler::clock::SharedClock,
  ) -> Self {
    return Self {
      max_concurrent,
      min_interval,
      currently_running: std::sync::atomic::AtomicU32::new(0),
      last_start: parking_lot::Mutex::new(std::collections::HashMap::new()),
      clock,
    };
  }

  pub fn currently_running(&self) -> u32 {
    return self.currently_running.load(std::sync::atomic::Ordering::SeqCst);
  }
}

#[async_trait]
impl ExecutionStrategy for ThrottleStrategy {
  async fn should_execute(&self, task_id: &str) -> bool {
    if self.currently_running.load(std::sync::atomic::Ordering::SeqCst) >= self.max_concurrent {
      return false;
    }

    let now = self.clock.now();
    let min_interval = chrono::Duration::from_std(self.min_interval).unwrap_or(chrono::Duration::zero());
    {
      let mut guard = self.last_start.lock();
      if let Some(last) = guard.get(task_id) {
        if now - *last < min_interval {
          return false;
        }
      }
      guard.insert(task_id.to_string(), now);
    }

    self.currently_running.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    return true;
  }

  async fn on_finished(&self, _task_id: &str) {
    self.currently_running.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scheduler::clock::testing::FrozenClock;
  use chrono::Utc;

  #[tokio::test]
  async fn blocks_once_max_concurrent_is_reached() {
    let clock: crate::scheduler::clock::SharedClock =
      std::sync::Arc::new(FrozenClock::new(Utc::now()));
    let strategy = ThrottleStrategy::new(2, std::time::Duration::from_secs(0), clock);

    assert!(strategy.should_execute("a").await);
    assert!(strategy.should_execute("b").await);
    assert!(!strategy.should_execute("c").await);
    assert_eq!(strategy.currently_running(), 2);

    strategy.on_finished("a").await;
    assert_eq!(strategy.currently_running(), 1);
    assert!(strategy.should_execute("c").await);
  }

  #[tokio::test]
  async fn rejects_same_task_within_min_interval() {
    let frozen = std::sync::Arc::new(FrozenClock::new(Utc::now()));
    let clock: crate::scheduler::clock::SharedClock = frozen.clone();
    let strategy = ThrottleStrategy::new(10, std::time::Duration::from_secs(60), clock);

    assert!(strategy.should_execute("t1").await);
    strategy.on_finished("t1").await;
    assert!(!strategy.should_execute("t1").await);

    frozen.advance(chrono::Duration::seconds(61));
    assert!(strategy.should_execute("t1").await);
  }
}
