//! A process-wide default `Scheduler`, for callers happy with one scheduler per process and
//! unwilling to thread a handle through their own state. Library consumers are steered towards
//! `AppState`-style explicit dependency injection instead (see `app_state.rs`); this exists purely
//! as the ergonomic convenience wrapper the spec calls for.

use crate::scheduler::scheduler::Scheduler;
use std::sync::{Arc, OnceLock};

static SCHEDULER: OnceLock<Arc<Scheduler>> = OnceLock::new();

#[cfg(test)]
static TEST_SCHEDULER: parking_lot::Mutex<Option<Arc<Scheduler>>> = parking_lot::Mutex::new(None);

/// Installs `scheduler` as the process-wide default. Returns the scheduler back to the caller if
/// one was already installed, mirroring `OnceLock::set`'s "already initialized" signal.
pub fn init(scheduler: Arc<Scheduler>) -> std::result::Result<(), Arc<Scheduler>> {
  #[cfg(test)]
  {
    let mut guard = TEST_SCHEDULER.lock();
    if guard.is_some() {
      return Err(scheduler);
    }
    *guard = Some(scheduler);
    return Ok(());
  }
  #[cfg(not(test))]
  {
    return SCHEDULER.set(scheduler.clone()).map_err(|_| scheduler);
  }
}

/// The process-wide default scheduler, if `init` has been called.
pub fn global() -> Option<Arc<Scheduler>> {
  #[cfg(test)]
  {
    return TEST_SCHEDULER.lock().clone();
  }
  #[cfg(not(test))]
  {
    return SCHEDULER.get().cloned();
  }
}

/// Clears the test-only singleton slot so the next test can `init` its own scheduler. Tests run
/// concurrently by default, so callers using the global scheduler must serialize their own access
/// to it (e.g. via `#[serial_test::serial]` or a shared lock) — this only resets the slot itself.
#[cfg(test)]
pub fn reset_for_test() {
  *TEST_SCHEDULER.lock() = None;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scheduler::scheduler::SchedulerOptions;
  use crate::scheduler::storage::MemoryStorage;

  #[test]
  fn second_init_is_rejected_until_reset() {
    reset_for_test();
    let a = Arc::new(Scheduler::new(Arc::new(MemoryStorage::new()), SchedulerOptions::default()));
    assert!(init(a).is_ok());

    let b = Arc::new(Scheduler::new(Arc::new(MemoryStorage::new()), SchedulerOptions::default()));
    assert!(init(b).is_err());
    assert!(global().is_some());

    reset_for_test();
    assert!(global().is_none());
  }
}
