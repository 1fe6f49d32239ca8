use crate::scheduler::clock::SharedClock;
use crate::scheduler::execution::{ExecutionStatus, TaskExecution};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Global, lifetime-of-the-process execution counters. Cheap to read from a hot path (a metrics
/// HTTP endpoint, say) since every field is a plain atomic.
#[derive(Default)]
pub struct GlobalCounters {
  pub total_runs: AtomicU64,
  pub total_successes: AtomicU64,
  pub total_failures: AtomicU64,
  pub total_timeouts: AtomicU64,
  pub total_canceled: AtomicU64,
  pub total_panics: AtomicU64,
  pub currently_running: AtomicU64,
}

impl GlobalCounters {
  fn record(&self, status: ExecutionStatus, is_panic: bool) {
    self.total_runs.fetch_add(1, Ordering::Relaxed);
    match status {
      ExecutionStatus::Succeeded => {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
      }
      ExecutionStatus::Failed => {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
      }
      ExecutionStatus::TimedOut => {
        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
      }
      ExecutionStatus::Canceled => {
        self.total_canceled.fetch_add(1, Ordering::Relaxed);
      }
      ExecutionStatus::Running => {}
    }
    if is_panic {
      self.total_panics.fetch_add(1, Ordering::Relaxed);
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountersSnapshot {
  pub total_runs: u64,
  pub total_successes: u64,
  pub total_failures: u64,
  pub total_timeouts: u64,
  pub total_canceled: u64,
  pub total_panics: u64,
  pub currently_running: u64,
}

/// Lifetime timing aggregate, kept alongside the atomics since min/max/average need a lock
/// (an `Option<Duration>` min/max can't be updated with a single atomic op).
#[derive(Default)]
struct GlobalTiming {
  total_execution_time: StdDuration,
  min_duration: Option<StdDuration>,
  max_duration: Option<StdDuration>,
  last_execution: Option<DateTime<Utc>>,
}

/// A point-in-time read of the monitor's global counters and timing, passed to alert predicates
/// and exposed to callers (e.g. a metrics admin endpoint) via `Monitor::metrics`.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
  pub now: DateTime<Utc>,
  pub counters: CountersSnapshot,
  pub min_duration: Option<StdDuration>,
  pub max_duration: Option<StdDuration>,
  pub average_duration: Option<StdDuration>,
  /// Percentage (0-100) of recorded executions that did not succeed.
  pub error_rate: f64,
  pub last_execution: Option<DateTime<Utc>>,
}

/// Per-task rolling-window metrics, covering the last hour and the last day, plus lifetime
/// aggregates (`total`/`success`/`fail`/`consecutive_fails`) that don't get pruned by time. Each
/// window is a deque of finished executions pruned lazily on read/write rather than on a
/// background timer.
#[derive(Default)]
struct TaskWindow {
  hour: VecDeque<(DateTime<Utc>, ExecutionStatus)>,
  day: VecDeque<(DateTime<Utc>, ExecutionStatus)>,
  total: u64,
  success: u64,
  fail: u64,
  total_duration: StdDuration,
  consecutive_fails: u64,
  last_execution: Option<DateTime<Utc>>,
}

fn prune(deque: &mut VecDeque<(DateTime<Utc>, ExecutionStatus)>, now: DateTime<Utc>, horizon: Duration) {
  while let Some((ts, _)) = deque.front() {
    if now - *ts > horizon {
      deque.pop_front();
    } else {
      break;
    }
  }
}

fn window_snapshot(window: &TaskWindow) -> TaskWindowSnapshot {
  let runs_last_hour = window.hour.len() as u64;
  let failures_last_hour = window
    .hour
    .iter()
    .filter(|(_, s)| *s != ExecutionStatus::Succeeded)
    .count() as u64;
  let runs_last_day = window.day.len() as u64;
  let failures_last_day = window
    .day
    .iter()
    .filter(|(_, s)| *s != ExecutionStatus::Succeeded)
    .count() as u64;

  return TaskWindowSnapshot {
    runs_last_hour,
    failures_last_hour,
    runs_last_day,
    failures_last_day,
    throughput_last_hour: runs_last_hour as f64 / 3600.0,
    throughput_last_day: runs_last_day as f64 / 86400.0,
    total: window.total,
    success: window.success,
    fail: window.fail,
    consecutive_fails: window.consecutive_fails,
    success_rate: if window.total > 0 {
      100.0 * window.success as f64 / window.total as f64
    } else {
      0.0
    },
    average_duration: if window.total > 0 {
      Some(StdDuration::from_secs_f64(
        window.total_duration.as_secs_f64() / window.total as f64,
      ))
    } else {
      None
    },
    last_execution: window.last_execution,
  };
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskWindowSnapshot {
  pub runs_last_hour: u64,
  pub failures_last_hour: u64,
  pub runs_last_day: u64,
  pub failures_last_day: u64,
  pub throughput_last_hour: f64,
  pub throughput_last_day: f64,
  pub total: u64,
  pub success: u64,
  pub fail: u64,
  pub consecutive_fails: u64,
  pub success_rate: f64,
  pub average_duration: Option<StdDuration>,
  pub last_execution: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertSeverity {
  Info,
  Warning,
  Critical,
}

/// An alerting rule evaluated against the monitor's global `MetricsSnapshot`: "if `predicate`
/// holds (and we're not still in `cooldown` since the last time this rule fired), fire."
pub struct AlertRule {
  pub name: String,
  pub message: String,
  pub severity: AlertSeverity,
  pub cooldown: StdDuration,
  pub enabled: bool,
  predicate: Box<dyn Fn(&MetricsSnapshot) -> bool + Send + Sync>,
}

impl AlertRule {
  pub fn new(
    name: impl Into<String>,
    message: impl Into<String>,
    severity: AlertSeverity,
    cooldown: StdDuration,
    predicate: impl Fn(&MetricsSnapshot) -> bool + Send + Sync + 'static,
  ) -> Self {
    return Self {
      name: name.into(),
      message: message.into(),
      severity,
      cooldown,
      enabled: true,
      predicate: Box::new(predicate),
    };
  }

  fn matches(&self, metrics: &MetricsSnapshot) -> bool {
    return self.enabled && (self.predicate)(metrics);
  }

  /// Error rate (failed + timed out + canceled, over total runs) exceeds 50%.
  pub fn high_error_rate() -> Self {
    return Self::new(
      "high-error-rate",
      "error rate exceeds 50%",
      AlertSeverity::Critical,
      StdDuration::from_secs(300),
      |m| m.counters.total_runs > 0 && m.error_rate > 50.0,
    );
  }

  /// More than 10 job panics recorded over the process lifetime.
  pub fn high_panic_count() -> Self {
    return Self::new(
      "high-panic-count",
      "more than 10 job panics recorded",
      AlertSeverity::Critical,
      StdDuration::from_secs(300),
      |m| m.counters.total_panics > 10,
    );
  }

  /// Average execution duration exceeds 10 minutes.
  pub fn long_average_duration() -> Self {
    return Self::new(
      "long-average-duration",
      "average execution duration exceeds 10 minutes",
      AlertSeverity::Warning,
      StdDuration::from_secs(300),
      |m| m.average_duration.is_some_and(|d| d > StdDuration::from_secs(600)),
    );
  }

  /// At least one execution has ever run, but none in the last hour.
  pub fn idle() -> Self {
    return Self::new(
      "idle",
      "no executions recorded in the last hour",
      AlertSeverity::Warning,
      StdDuration::from_secs(300),
      |m| {
        m.counters.total_runs > 0
          && m
            .last_execution
            .is_some_and(|last| m.now - last > Duration::hours(1))
      },
    );
  }
}

struct AlertState {
  last_fired: Option<DateTime<Utc>>,
}

/// An alert rule firing, fanned out to every `Subscriber`.
#[derive(Debug, Clone)]
pub struct Alert {
  pub rule_name: String,
  pub message: String,
  pub severity: AlertSeverity,
  pub timestamp: DateTime<Utc>,
  pub metrics: MetricsSnapshot,
}

/// Receives monitor events. Implementations might forward to logs, a metrics exporter, or an
/// on-call paging system; the monitor itself has no opinion on delivery.
#[async_trait]
pub trait Subscriber: Send + Sync {
  async fn on_metrics_update(&self, task_id: &str, snapshot: TaskWindowSnapshot);
  async fn on_alert(&self, alert: Alert);
}

/// Observes task executions, maintaining rolling-window counters and evaluating alert rules,
/// without itself driving the scheduler's tick loop or worker pool.
pub struct Monitor {
  counters: GlobalCounters,
  timing: RwLock<GlobalTiming>,
  windows: RwLock<HashMap<String, TaskWindow>>,
  alert_rules: RwLock<Vec<AlertRule>>,
  alert_state: RwLock<HashMap<String, AlertState>>,
  subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
  clock: SharedClock,
}

impl Monitor {
  /// Builds a `Monitor` with the four built-in alert rules pre-registered: high error rate,
  /// high panic count, long average duration, and idle detection.
  pub fn new(clock: SharedClock) -> Self {
    return Self {
      counters: GlobalCounters::default(),
      timing: RwLock::new(GlobalTiming::default()),
      windows: RwLock::new(HashMap::new()),
      alert_rules: RwLock::new(vec![
        AlertRule::high_error_rate(),
        AlertRule::high_panic_count(),
        AlertRule::long_average_duration(),
        AlertRule::idle(),
      ]),
      alert_state: RwLock::new(HashMap::new()),
      subscribers: RwLock::new(Vec::new()),
      clock,
    };
  }

  pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
    self.subscribers.write().push(subscriber);
  }

  pub fn add_alert_rule(&self, rule: AlertRule) {
    self.alert_rules.write().push(rule);
  }

  /// Marks one execution as having started, for `MetricsSnapshot::counters.currently_running`.
  /// Paired 1:1 with `mark_finished` by the scheduler, once per submission regardless of retries.
  pub fn mark_started(&self) {
    self.counters.currently_running.fetch_add(1, Ordering::Relaxed);
  }

  pub fn mark_finished(&self) {
    self.counters.currently_running.fetch_sub(1, Ordering::Relaxed);
  }

  pub fn counters(&self) -> CountersSnapshot {
    return CountersSnapshot {
      total_runs: self.counters.total_runs.load(Ordering::Relaxed),
      total_successes: self.counters.total_successes.load(Ordering::Relaxed),
      total_failures: self.counters.total_failures.load(Ordering::Relaxed),
      total_timeouts: self.counters.total_timeouts.load(Ordering::Relaxed),
      total_canceled: self.counters.total_canceled.load(Ordering::Relaxed),
      total_panics: self.counters.total_panics.load(Ordering::Relaxed),
      currently_running: self.counters.currently_running.load(Ordering::Relaxed),
    };
  }

  /// A point-in-time read of the global counters plus timing aggregates, used both for the
  /// built-in alert predicates and as a general-purpose metrics readout.
  pub fn metrics(&self) -> MetricsSnapshot {
    let counters = self.counters();
    let timing = self.timing.read();
    let average_duration = if counters.total_runs > 0 {
      Some(StdDuration::from_secs_f64(
        timing.total_execution_time.as_secs_f64() / counters.total_runs as f64,
      ))
    } else {
      None
    };
    let non_successes = counters.total_failures + counters.total_timeouts + counters.total_canceled;
    let error_rate = if counters.total_runs > 0 {
      100.0 * non_successes as f64 / counters.total_runs as f64
    } else {
      0.0
    };

    return MetricsSnapshot {
      now: self.clock.now(),
      counters,
      min_duration: timing.min_duration,
      max_duration: timing.max_duration,
      average_duration,
      error_rate,
      last_execution: timing.last_execution,
    };
  }

  pub fn task_window(&self, task_id: &str) -> TaskWindowSnapshot {
    let now = self.clock.now();
    let mut guard = self.windows.write();
    let window = guard.entry(task_id.to_string()).or_default();
    prune(&mut window.hour, now, Duration::hours(1));
    prune(&mut window.day, now, Duration::days(1));
    return window_snapshot(window);
  }

  /// Records a finished execution, updating global and per-task counters and evaluating alert
  /// rules, then fans the resulting snapshot out to subscribers. Call once per `TaskExecution`
  /// that leaves the `Running` state.
  pub async fn record(&self, execution: &TaskExecution) {
    if execution.status == ExecutionStatus::Running {
      return;
    }

    self.counters.record(execution.status, execution.is_panic);

    let now = self.clock.now();

    if let Some(duration) = execution.duration {
      let mut timing = self.timing.write();
      timing.total_execution_time += duration;
      timing.min_duration = Some(timing.min_duration.map_or(duration, |m| m.min(duration)));
      timing.max_duration = Some(timing.max_duration.map_or(duration, |m| m.max(duration)));
      timing.last_execution = Some(now);
    }

    let snapshot = {
      let mut guard = self.windows.write();
      let window = guard.entry(execution.task_id.clone()).or_default();
      window.hour.push_back((now, execution.status));
      window.day.push_back((now, execution.status));
      prune(&mut window.hour, now, Duration::hours(1));
      prune(&mut window.day, now, Duration::days(1));

      window.total += 1;
      if execution.status == ExecutionStatus::Succeeded {
        window.success += 1;
        window.consecutive_fails = 0;
      } else {
        window.fail += 1;
        window.consecutive_fails += 1;
      }
      if let Some(duration) = execution.duration {
        window.total_duration += duration;
      }
      window.last_execution = Some(now);

      window_snapshot(window)
    };

    for subscriber in self.subscribers.read().iter() {
      subscriber
        .on_metrics_update(&execution.task_id, snapshot)
        .await;
    }

    self.evaluate_alerts().await;
  }

  /// Evaluates every registered alert rule against the current global metrics, independent of
  /// any single execution. Meant to be called both opportunistically after `record` and on a
  /// fixed interval (the scheduler spawns a once-a-minute tick that calls this).
  pub async fn evaluate_alerts(&self) {
    let metrics = self.metrics();

    let firing: Vec<(String, String, AlertSeverity)> = {
      let rules = self.alert_rules.read();
      let mut state = self.alert_state.write();
      let mut firing = Vec::new();
      for rule in rules.iter() {
        if !rule.matches(&metrics) {
          continue;
        }
        let entry = state
          .entry(rule.name.clone())
          .or_insert(AlertState { last_fired: None });
        let cooldown = Duration::from_std(rule.cooldown).unwrap_or(Duration::zero());
        let ready = match entry.last_fired {
          Some(last) => metrics.now - last >= cooldown,
          None => true,
        };
        if ready {
          entry.last_fired = Some(metrics.now);
          firing.push((rule.name.clone(), rule.message.clone(), rule.severity));
        }
      }
      firing
    };

    for (rule_name, message, severity) in firing {
      let alert = Alert {
        rule_name,
        message,
        severity,
        timestamp: metrics.now,
        metrics,
      };
      for subscriber in self.subscribers.read().iter() {
        subscriber.on_alert(alert.clone()).await;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scheduler::clock::testing::FrozenClock;
  use std::sync::atomic::AtomicU32;

  struct CountingSubscriber {
    alerts: AtomicU32,
  }

  #[async_trait]
  impl Subscriber for CountingSubscriber {
    async fn on_metrics_update(&self, _task_id: &str, _snapshot: TaskWindowSnapshot) {}

    async fn on_alert(&self, _alert: Alert) {
      self.alerts.fetch_add(1, Ordering::Relaxed);
    }
  }

  fn start(clock: &SharedClock) -> TaskExecution {
    return TaskExecution::start("t1", "demo", "worker-0", 0, clock.now());
  }

  #[tokio::test]
  async fn counters_accumulate_across_statuses() {
    let clock: SharedClock = Arc::new(FrozenClock::new(Utc::now()));
    let monitor = Monitor::new(clock.clone());

    let mut ok = start(&clock);
    ok.succeed(clock.now());
    monitor.record(&ok).await;

    let mut bad = start(&clock);
    bad.fail(&crate::scheduler::error::JobError::Failed("x".into()), clock.now());
    monitor.record(&bad).await;

    let snapshot = monitor.counters();
    assert_eq!(snapshot.total_runs, 2);
    assert_eq!(snapshot.total_successes, 1);
    assert_eq!(snapshot.total_failures, 1);
    assert_eq!(snapshot.total_panics, 0);
  }

  #[tokio::test]
  async fn panics_are_counted_separately_from_ordinary_failures() {
    let clock: SharedClock = Arc::new(FrozenClock::new(Utc::now()));
    let monitor = Monitor::new(clock.clone());

    let mut panicked = start(&clock);
    panicked.fail(&crate::scheduler::error::JobError::Panic("boom".into()), clock.now());
    monitor.record(&panicked).await;

    let snapshot = monitor.counters();
    assert_eq!(snapshot.total_failures, 1);
    assert_eq!(snapshot.total_panics, 1);
  }

  #[tokio::test]
  async fn task_window_tracks_lifetime_and_rolling_counts() {
    let clock: SharedClock = Arc::new(FrozenClock::new(Utc::now()));
    let monitor = Monitor::new(clock.clone());

    let mut bad1 = start(&clock);
    bad1.fail(&crate::scheduler::error::JobError::Failed("x".into()), clock.now());
    monitor.record(&bad1).await;

    let mut bad2 = start(&clock);
    bad2.fail(&crate::scheduler::error::JobError::Failed("x".into()), clock.now());
    monitor.record(&bad2).await;

    let mut ok = start(&clock);
    ok.succeed(clock.now());
    monitor.record(&ok).await;

    let window = monitor.task_window("t1");
    assert_eq!(window.total, 3);
    assert_eq!(window.success, 1);
    assert_eq!(window.fail, 2);
    assert_eq!(window.consecutive_fails, 0);
    assert_eq!(window.runs_last_hour, 3);
    assert_eq!(window.failures_last_hour, 2);
  }

  #[tokio::test]
  async fn high_error_rate_alert_fires_then_respects_cooldown() {
    let frozen = Arc::new(FrozenClock::new(Utc::now()));
    let clock: SharedClock = frozen.clone();
    let monitor = Monitor::new(clock.clone());
    let subscriber = Arc::new(CountingSubscriber {
      alerts: AtomicU32::new(0),
    });
    monitor.subscribe(subscriber.clone());

    let mut bad = start(&clock);
    bad.fail(&crate::scheduler::error::JobError::Failed("x".into()), clock.now());
    monitor.record(&bad).await;
    assert_eq!(subscriber.alerts.load(Ordering::Relaxed), 1);

    let mut bad2 = start(&clock);
    bad2.fail(&crate::scheduler::error::JobError::Failed("x".into()), clock.now());
    monitor.record(&bad2).await;
    assert_eq!(subscriber.alerts.load(Ordering::Relaxed), 1);

    frozen.advance(Duration::minutes(10));
    let mut bad3 = start(&clock);
    bad3.fail(&crate::scheduler::error::JobError::Failed("x".into()), clock.now());
    monitor.record(&bad3).await;
    assert_eq!(subscriber.alerts.load(Ordering::Relaxed), 2);
  }

  #[tokio::test]
  async fn high_panic_count_alert_fires_past_threshold() {
    let clock: SharedClock = Arc::new(FrozenClock::new(Utc::now()));
    let monitor = Monitor::new(clock.clone());
    let subscriber = Arc::new(CountingSubscriber {
      alerts: AtomicU32::new(0),
    });
    monitor.subscribe(subscriber.clone());

    for _ in 0..11 {
      let mut panicked = start(&clock);
      panicked.fail(&crate::scheduler::error::JobError::Panic("boom".into()), clock.now());
      monitor.record(&panicked).await;
    }

    assert_eq!(monitor.counters().total_panics, 11);
    assert!(subscriber.alerts.load(Ordering::Relaxed) >= 1);
  }

  #[tokio::test]
  async fn currently_running_tracks_mark_started_and_finished() {
    let clock: SharedClock = Arc::new(FrozenClock::new(Utc::now()));
    let monitor = Monitor::new(clock);
    monitor.mark_started();
    monitor.mark_started();
    assert_eq!(monitor.counters().currently_running, 2);
    monitor.mark_finished();
    assert_eq!(monitor.counters().currently_running, 1);
  }
}
