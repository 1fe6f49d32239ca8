use crate::scheduler::clock::{system_clock, SharedClock};
use crate::scheduler::error::{Result, SchedulerError};
use crate::scheduler::execution::{ExecutionStatus, TaskExecution};
use crate::scheduler::monitor::Monitor;
use crate::scheduler::registry::JobRegistry;
use crate::scheduler::storage::Storage;
use crate::scheduler::strategy::{AlwaysExecute, ExecutionStrategy};
use crate::scheduler::task::{RetryPolicy, Schedule, Task, TaskStatus};
use crate::scheduler::worker_pool::{Job, WorkItem, WorkerPool};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

/// Called once per task firing, right after it's submitted to the worker pool (not once per
/// retry). See `Scheduler::set_on_task_start`.
type TaskStartCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Called once per `TaskExecution` that finished as `Succeeded`.
type TaskCompleteCallback = Arc<dyn Fn(&str, &TaskExecution) + Send + Sync>;
/// Called once per `TaskExecution` that finished any other way (`Failed`, `TimedOut`, `Canceled`).
type TaskFailCallback = Arc<dyn Fn(&str, &TaskExecution) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
  Stopped = 0,
  Starting = 1,
  Running = 2,
  Stopping = 3,
}

impl SchedulerState {
  fn from_u8(v: u8) -> Self {
    return match v {
      0 => SchedulerState::Stopped,
      1 => SchedulerState::Starting,
      2 => SchedulerState::Running,
      _ => SchedulerState::Stopping,
    };
  }
}

pub struct SchedulerOptions {
  pub tick_interval: StdDuration,
  pub num_workers: usize,
  pub queue_capacity: usize,
  pub clock: SharedClock,
}

impl Default for SchedulerOptions {
  fn default() -> Self {
    return Self {
      tick_interval: StdDuration::from_secs(1),
      num_workers: 4,
      queue_capacity: 256,
      clock: system_clock(),
    };
  }
}

/// Persistent, observable job scheduler: owns the authoritative in-memory task map, drives a
/// periodic tick loop that finds due tasks and submits them to a `WorkerPool`, and persists task
/// and execution state through a pluggable `Storage` backend.
///
/// Mirrors the teacher's `TaskRegistry` in shape (a `parking_lot`-guarded map of tasks reachable
/// from callers and from a background loop) but replaces its one-`tokio::spawn`-per-task model
/// with a single tick loop shared by all tasks, so the number of live tokio tasks doesn't grow
/// with the number of scheduled tasks.
pub struct Scheduler {
  tasks: Arc<RwLock<HashMap<String, Task>>>,
  storage: Arc<dyn Storage>,
  registry: Arc<JobRegistry>,
  monitor: Arc<Monitor>,
  strategy: Arc<dyn ExecutionStrategy>,
  pool: RwLock<Option<WorkerPool>>,
  tick_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
  result_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
  alert_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
  state: Arc<AtomicU8>,
  options: SchedulerOptions,
  on_task_start: Arc<RwLock<Option<TaskStartCallback>>>,
  on_task_complete: Arc<RwLock<Option<TaskCompleteCallback>>>,
  on_task_fail: Arc<RwLock<Option<TaskFailCallback>>>,
}

impl Scheduler {
  pub fn new(storage: Arc<dyn Storage>, options: SchedulerOptions) -> Self {
    let clock = options.clock.clone();
    return Self {
      tasks: Arc::new(RwLock::new(HashMap::new())),
      storage,
      registry: Arc::new(JobRegistry::new()),
      monitor: Arc::new(Monitor::new(clock)),
      strategy: Arc::new(AlwaysExecute),
      pool: RwLock::new(None),
      tick_handle: RwLock::new(None),
      result_handle: RwLock::new(None),
      alert_handle: RwLock::new(None),
      state: Arc::new(AtomicU8::new(SchedulerState::Stopped as u8)),
      options,
      on_task_start: Arc::new(RwLock::new(None)),
      on_task_complete: Arc::new(RwLock::new(None)),
      on_task_fail: Arc::new(RwLock::new(None)),
    };
  }

  pub fn with_strategy(mut self, strategy: Arc<dyn ExecutionStrategy>) -> Self {
    self.strategy = strategy;
    return self;
  }

  pub fn monitor(&self) -> Arc<Monitor> {
    return self.monitor.clone();
  }

  /// Registers a callback fired once per task firing, right after submission to the worker
  /// pool (not once per retry attempt).
  pub fn set_on_task_start(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
    *self.on_task_start.write() = Some(Arc::new(callback));
  }

  /// Registers a callback fired once per `TaskExecution` that finished as `Succeeded`.
  pub fn set_on_task_complete(&self, callback: impl Fn(&str, &TaskExecution) + Send + Sync + 'static) {
    *self.on_task_complete.write() = Some(Arc::new(callback));
  }

  /// Registers a callback fired once per `TaskExecution` that finished any other way (`Failed`,
  /// `TimedOut`, `Canceled`), including an attempt that will still be retried.
  pub fn set_on_task_fail(&self, callback: impl Fn(&str, &TaskExecution) + Send + Sync + 'static) {
    *self.on_task_fail.write() = Some(Arc::new(callback));
  }

  pub fn state(&self) -> SchedulerState {
    return SchedulerState::from_u8(self.state.load(Ordering::SeqCst));
  }

  /// Loads persisted tasks from storage, starts the worker pool, and spawns the tick loop and
  /// the result-collection loop. Returns `AlreadyRunning` if called while already started.
  pub async fn start(&self) -> Result<()> {
    let prev = self.state.compare_exchange(
      SchedulerState::Stopped as u8,
      SchedulerState::Starting as u8,
      Ordering::SeqCst,
      Ordering::SeqCst,
    );
    if prev.is_err() {
      return Err(SchedulerError::AlreadyRunning);
    }

    for mut task in self.storage.load_all_tasks().await? {
      if let Err(e) = task.schedule.ensure_parsed() {
        warn!("dropping task '{}' with unparseable schedule: {e}", task.id);
        continue;
      }
      self.tasks.write().insert(task.id.clone(), task);
    }

    let pool = WorkerPool::start(
      self.options.num_workers,
      self.options.queue_capacity,
      self.options.clock.clone(),
    );
    let results = pool.results();
    *self.pool.write() = Some(pool);

    let storage = self.storage.clone();
    let monitor = self.monitor.clone();
    let strategy_for_results = self.strategy.clone();
    let tasks_for_results = self.tasks.clone();
    let on_task_complete = self.on_task_complete.clone();
    let on_task_fail = self.on_task_fail.clone();
    *self.result_handle.write() = Some(tokio::spawn(async move {
      while let Ok(result) = results.recv().await {
        for execution in &result.executions {
          if let Err(e) = storage.save_execution(execution).await {
            error!("failed to persist execution for task '{}': {e}", result.task_id);
          }
          monitor.record(execution).await;

          let succeeded = execution.status == ExecutionStatus::Succeeded;
          let updated_task = {
            let mut guard = tasks_for_results.write();
            guard.get_mut(&result.task_id).map(|t| {
              t.record_execution(succeeded);
              t.clone()
            })
          };
          if let Some(task) = updated_task {
            if let Err(e) = storage.save_task(&task).await {
              error!("failed to persist run/fail counters for task '{}': {e}", result.task_id);
            }
          }

          if succeeded {
            if let Some(cb) = on_task_complete.read().as_ref() {
              cb(&result.task_id, execution);
            }
          } else if let Some(cb) = on_task_fail.read().as_ref() {
            cb(&result.task_id, execution);
          }
        }
        monitor.mark_finished();
        strategy_for_results.on_finished(&result.task_id).await;
      }
    }));

    let tasks = self.tasks.clone();
    let registry = self.registry.clone();
    let storage = self.storage.clone();
    let strategy = self.strategy.clone();
    let clock = self.options.clock.clone();
    let tick_interval = self.options.tick_interval;
    let state = self.state.clone();
    let monitor_for_tick = self.monitor.clone();
    let on_task_start_for_tick = self.on_task_start.clone();

    self.state.store(SchedulerState::Running as u8, Ordering::SeqCst);

    let pool_sender = self.pool.read().as_ref().map(|p| p.sender());
    *self.tick_handle.write() = Some(tokio::spawn(async move {
      loop {
        if SchedulerState::from_u8(state.load(Ordering::SeqCst)) != SchedulerState::Running {
          break;
        }

        let now = clock.now();
        let due_ids: Vec<String> = {
          let guard = tasks.read();
          guard
            .values()
            .filter(|t| t.is_due(now))
            .map(|t| t.id.clone())
            .collect()
        };

        for task_id in due_ids {
          if !strategy.should_execute(&task_id).await {
            let mut guard = tasks.write();
            if let Some(task) = guard.get_mut(&task_id) {
              task.advance(now);
            }
            continue;
          }

          let Some(job) = registry.get(&task_id) else {
            debug!("task '{task_id}' fired but has no registered job, skipping");
            continue;
          };

          let (retry_policy, timeout, task_name) = {
            let guard = tasks.read();
            match guard.get(&task_id) {
              Some(t) => (t.retry_policy.clone(), t.timeout, t.name.clone()),
              None => continue,
            }
          };

          let submitted = match pool_sender.as_ref() {
            Some(sender) => crate::scheduler::worker_pool::submit_via(
              sender,
              WorkItem {
                task_id: task_id.clone(),
                task_name,
                job,
                retry_policy,
                timeout,
              },
            ),
            None => Err(SchedulerError::NotRunning),
          };

          // Rearm next_run right after a successful submit, not on completion: a slow job
          // must not keep the task "due" and get resubmitted on every tick while it runs.
          // A full queue leaves next_run untouched so the same firing is retried next tick.
          if let Err(e) = submitted {
            warn!("failed to submit task '{task_id}': {e}");
            // Never reached the pool, so no `WorkResult` will arrive to balance the strategy's
            // bookkeeping via `on_finished`.
            strategy.on_finished(&task_id).await;
            continue;
          }

          monitor_for_tick.mark_started();
          if let Some(cb) = on_task_start_for_tick.read().as_ref() {
            cb(&task_id);
          }

          if let Some(task) = tasks.write().get_mut(&task_id) {
            task.advance(now);
          }

          if let Some(task) = tasks.read().get(&task_id).cloned() {
            if let Err(e) = storage.save_task(&task).await {
              error!("failed to persist task '{task_id}' after firing: {e}");
            }
          }
        }

        clock.sleep(tick_interval).await;
      }
    }));

    let monitor_for_alerts = self.monitor.clone();
    let clock_for_alerts = self.options.clock.clone();
    let state_for_alerts = self.state.clone();
    *self.alert_handle.write() = Some(tokio::spawn(async move {
      loop {
        clock_for_alerts.sleep(StdDuration::from_secs(60)).await;
        if SchedulerState::from_u8(state_for_alerts.load(Ordering::SeqCst)) != SchedulerState::Running {
          break;
        }
        monitor_for_alerts.evaluate_alerts().await;
      }
    }));

    return Ok(());
  }

  /// Stops the tick loop and shuts down the worker pool, awaiting in-flight jobs to finish.
  pub async fn stop(&self) -> Result<()> {
    let prev = self.state.swap(SchedulerState::Stopping as u8, Ordering::SeqCst);
    if prev == SchedulerState::Stopped as u8 {
      self.state.store(SchedulerState::Stopped as u8, Ordering::SeqCst);
      return Err(SchedulerError::NotRunning);
    }

    if let Some(handle) = self.tick_handle.write().take() {
      let _ = handle.await;
    }

    if let Some(pool) = self.pool.write().take() {
      pool.shutdown().await;
    }

    if let Some(handle) = self.result_handle.write().take() {
      let _ = handle.await;
    }

    if let Some(handle) = self.alert_handle.write().take() {
      handle.abort();
    }

    self.state.store(SchedulerState::Stopped as u8, Ordering::SeqCst);
    info!("scheduler stopped");
    return Ok(());
  }

  /// Adds a task from a `schedule` string using the full grammar accepted by `Schedule::parse`:
  /// `@once` / `@every_minute` / `@every_hour` / `@every_day` / `@every_<duration>`, a Go-style
  /// duration, an absolute `YYYY-MM-DD HH:MM:SS` timestamp, or a cron expression.
  pub async fn add_task(
    &self,
    name: impl Into<String>,
    schedule: &str,
    job: Arc<dyn Job>,
  ) -> Result<String> {
    let schedule = Schedule::parse(schedule, self.options.clock.now())?;
    return self.add_task_with_job(name, schedule, job).await;
  }

  pub async fn add_task_with_job(
    &self,
    name: impl Into<String>,
    schedule: Schedule,
    job: Arc<dyn Job>,
  ) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let task = Task::new(id.clone(), name, schedule, self.options.clock.now());

    if self.tasks.read().contains_key(&id) {
      return Err(SchedulerError::AlreadyExists(id));
    }

    self.storage.save_task(&task).await?;
    self.registry.register(id.clone(), job);
    self.tasks.write().insert(id.clone(), task);
    return Ok(id);
  }

  /// Registers a job for a task id without touching storage or the in-memory task map. Jobs are
  /// never persisted (see module docs on `JobRegistry`), so a task restored by `start()` from
  /// storage needs its job re-registered by the embedding process before `start()` runs, the same
  /// way it would register jobs for tasks it creates fresh with `add_task_with_job`.
  pub fn register_job(&self, task_id: impl Into<String>, job: Arc<dyn Job>) {
    self.registry.register(task_id.into(), job);
  }

  pub async fn remove_task(&self, id: &str) -> Result<()> {
    if self.tasks.write().remove(id).is_none() {
      return Err(SchedulerError::NotFound(id.to_string()));
    }
    self.registry.unregister(id);
    self.storage.delete_task(id).await?;
    self.storage.delete_executions_for_task(id).await?;
    return Ok(());
  }

  pub fn pause_task(&self, id: &str) -> Result<()> {
    let mut guard = self.tasks.write();
    let task = guard.get_mut(id).ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
    task.pause();
    return Ok(());
  }

  pub fn resume_task(&self, id: &str) -> Result<()> {
    let now = self.options.clock.now();
    let mut guard = self.tasks.write();
    let task = guard.get_mut(id).ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
    task.resume(now);
    return Ok(());
  }

  pub fn get_task(&self, id: &str) -> Option<Task> {
    return self.tasks.read().get(id).cloned();
  }

  pub fn get_tasks(&self) -> Vec<Task> {
    return self.tasks.read().values().cloned().collect();
  }

  pub async fn executions_for(&self, task_id: &str, limit: usize) -> Result<Vec<TaskExecution>> {
    return self.storage.load_executions(task_id, limit).await;
  }

  /// Runs `task_id`'s job immediately, outside its normal schedule, using the same retry/timeout
  /// policy as a scheduled firing. Does not affect `next_run`. Still subject to the scheduler's
  /// `ExecutionStrategy`, so a manual run against a throttled task can be rejected the same way
  /// a tick-driven firing would be.
  pub async fn run_now(&self, task_id: &str) -> Result<()> {
    let job = self
      .registry
      .get(task_id)
      .ok_or_else(|| SchedulerError::JobNotRegistered(task_id.to_string()))?;
    let (retry_policy, timeout, task_name) = {
      let guard = self.tasks.read();
      let task = guard
        .get(task_id)
        .ok_or_else(|| SchedulerError::NotFound(task_id.to_string()))?;
      (task.retry_policy.clone(), task.timeout, task.name.clone())
    };

    if !self.strategy.should_execute(task_id).await {
      return Err(SchedulerError::Throttled(task_id.to_string()));
    }

    let submitted = {
      let pool_guard = self.pool.read();
      match pool_guard.as_ref() {
        Some(pool) => pool.submit(WorkItem {
          task_id: task_id.to_string(),
          task_name,
          job,
          retry_policy,
          timeout,
        }),
        None => Err(SchedulerError::NotRunning),
      }
    };

    if let Err(e) = submitted {
      // Roll back the strategy's bookkeeping: nothing will ever reach `result_handle` to call
      // `on_finished` for a submission that never made it into the pool.
      self.strategy.on_finished(task_id).await;
      return Err(e);
    }

    self.monitor.mark_started();
    if let Some(cb) = self.on_task_start.read().as_ref() {
      cb(task_id);
    }
    return Ok(());
  }

  pub async fn schedule_cron(
    &self,
    name: impl Into<String>,
    expression: impl Into<String>,
    retry_policy: RetryPolicy,
    job: Arc<dyn Job>,
  ) -> Result<String> {
    let schedule = Schedule::cron(expression)?;
    let id = self.add_task_with_job(name, schedule, job).await?;
    self.set_retry_policy(&id, retry_policy)?;
    return Ok(id);
  }

  pub async fn schedule_every(
    &self,
    name: impl Into<String>,
    interval: StdDuration,
    job: Arc<dyn Job>,
  ) -> Result<String> {
    return self
      .add_task_with_job(name, Schedule::every(interval), job)
      .await;
  }

  pub async fn schedule_at(
    &self,
    name: impl Into<String>,
    at: DateTime<Utc>,
    job: Arc<dyn Job>,
  ) -> Result<String> {
    return self.add_task_with_job(name, Schedule::once(at), job).await;
  }

  pub async fn schedule_after(
    &self,
    name: impl Into<String>,
    delay: StdDuration,
    job: Arc<dyn Job>,
  ) -> Result<String> {
    let at = self.options.clock.now()
      + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
    return self.schedule_at(name, at, job).await;
  }

  fn set_retry_policy(&self, id: &str, retry_policy: RetryPolicy) -> Result<()> {
    let mut guard = self.tasks.write();
    let task = guard.get_mut(id).ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
    task.retry_policy = retry_policy;
    return Ok(());
  }

  pub fn set_timeout(&self, id: &str, timeout: Option<StdDuration>) -> Result<()> {
    let mut guard = self.tasks.write();
    let task = guard.get_mut(id).ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
    task.timeout = timeout;
    return Ok(());
  }
}
