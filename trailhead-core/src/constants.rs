//! Process-wide constants for the ambient HTTP/MVC layer. The scheduler itself has no
//! compile-time constants beyond its own module defaults (see
//! `scheduler::scheduler::SchedulerOptions`).

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:4000";

/// Default number of scheduler worker tasks when `AppConfig.scheduler.workers` is unset.
pub const DEFAULT_SCHEDULER_WORKERS: usize = 4;

/// Default bounded-queue capacity when `AppConfig.scheduler.queue_capacity` is unset.
pub const DEFAULT_SCHEDULER_QUEUE_CAPACITY: usize = 256;

/// Default tick period, matching `SchedulerOptions::default()`.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 1;

pub const ADMIN_API_PATH: &str = "api/_admin";

pub const CONFIG_FILE_NAME: &str = "config.toml";
