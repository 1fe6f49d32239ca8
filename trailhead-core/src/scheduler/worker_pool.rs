use crate::scheduler::clock::SharedClock;
use crate::scheduler::error::JobError;
use crate::scheduler::execution::{ExecutionStatus, TaskExecution};
use crate::scheduler::task::RetryPolicy;
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A unit of work a task runs. Implementations are expected to be cheap to construct and to do
/// their real work inside `run`; the worker pool handles retry, timeout, and panic isolation
/// around the call so individual jobs don't need to.
#[async_trait]
pub trait Job: Send + Sync {
  async fn run(&self, task_id: &str) -> std::result::Result<(), JobError>;
}

#[async_trait]
impl<F, Fut> Job for F
where
  F: Fn(String) -> Fut + Send + Sync,
  Fut: std::future::Future<Output = std::result::Result<(), JobError>> + Send,
{
  async fn run(&self, task_id: &str) -> std::result::Result<(), JobError> {
    return (self)(task_id.to_string()).await;
  }
}

pub struct WorkItem {
  pub task_id: String,
  pub task_name: String,
  pub job: Arc<dyn Job>,
  pub retry_policy: RetryPolicy,
  pub timeout: Option<Duration>,
}

/// Outcome of running a `WorkItem` to completion (including any retries), reported back through
/// the pool's result channel for the scheduler to persist and fan out to subscribers.
pub struct WorkResult {
  pub task_id: String,
  pub executions: Vec<TaskExecution>,
}

/// A bounded pool of async worker tasks pulling from a shared queue.
///
/// Mirrors the teacher's bounded-channel-plus-N-tasks pattern: `submit` never blocks the caller
/// past the queue's capacity (it returns `QueueFull` instead of unbounded buffering), and each
/// worker isolates job panics with `catch_unwind` so one misbehaving job can't take down the
/// pool.
pub struct WorkerPool {
  sender: Sender<WorkItem>,
  result_receiver: Receiver<WorkResult>,
  cancellation: CancellationToken,
  workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
  pub fn start(num_workers: usize, queue_capacity: usize, clock: SharedClock) -> Self {
    let (sender, receiver) = async_channel::bounded::<WorkItem>(queue_capacity);
    let (result_sender, result_receiver) = async_channel::unbounded::<WorkResult>();
    let cancellation = CancellationToken::new();

    let mut workers = Vec::with_capacity(num_workers);
    for worker_id in 0..num_workers {
      let receiver = receiver.clone();
      let result_sender = result_sender.clone();
      let cancellation = cancellation.clone();
      let clock = clock.clone();
      workers.push(tokio::spawn(async move {
        run_worker(worker_id, receiver, result_sender, cancellation, clock).await;
      }));
    }

    return Self {
      sender,
      result_receiver,
      cancellation,
      workers,
    };
  }

  pub fn submit(&self, item: WorkItem) -> std::result::Result<(), crate::scheduler::error::SchedulerError> {
    return submit_via(&self.sender, item);
  }

  /// An owned, `'static` handle to the submission side of the queue. Lets a caller (the
  /// scheduler's tick loop, spawned as its own task) submit work without holding a lock guard
  /// borrowed from wherever the `WorkerPool` itself lives across an `.await` point.
  pub fn sender(&self) -> Sender<WorkItem> {
    return self.sender.clone();
  }

  pub fn results(&self) -> Receiver<WorkResult> {
    return self.result_receiver.clone();
  }

  /// Cancels in-flight jobs and awaits every worker task before returning.
  pub async fn shutdown(mut self) {
    self.cancellation.cancel();
    self.sender.close();
    for worker in self.workers.drain(..) {
      let _ = worker.await;
    }
  }
}

pub(crate) fn submit_via(
  sender: &Sender<WorkItem>,
  item: WorkItem,
) -> std::result::Result<(), crate::scheduler::error::SchedulerError> {
  return sender
    .try_send(item)
    .map_err(|_| crate::scheduler::error::SchedulerError::QueueFull);
}

async fn run_worker(
  worker_id: usize,
  receiver: Receiver<WorkItem>,
  result_sender: Sender<WorkResult>,
  cancellation: CancellationToken,
  clock: SharedClock,
) {
  let worker_id = format!("worker-{worker_id}");

  loop {
    let item = tokio::select! {
      biased;
      _ = cancellation.cancelled() => break,
      item = receiver.recv() => item,
    };

    let Ok(item) = item else {
      break;
    };

    let executions = run_with_retry(&item, &worker_id, &cancellation, clock.as_ref()).await;
    let _ = result_sender
      .send(WorkResult {
        task_id: item.task_id,
        executions,
      })
      .await;
  }
}

async fn run_with_retry(
  item: &WorkItem,
  worker_id: &str,
  cancellation: &CancellationToken,
  clock: &dyn crate::scheduler::clock::Clock,
) -> Vec<TaskExecution> {
  let mut executions = Vec::new();
  let max_attempts = item.retry_policy.max_attempts.max(1);

  for attempt in 1..=max_attempts {
    let retry_count = attempt - 1;
    if cancellation.is_cancelled() {
      let mut execution =
        TaskExecution::start(&item.task_id, &item.task_name, worker_id, retry_count, clock.now());
      execution.fail(&JobError::Canceled, clock.now());
      executions.push(execution);
      break;
    }

    let mut execution =
      TaskExecution::start(&item.task_id, &item.task_name, worker_id, retry_count, clock.now());
    let outcome = run_once(item, cancellation).await;

    match outcome {
      Ok(()) => {
        execution.succeed(clock.now());
        executions.push(execution);
        break;
      }
      Err(err) => {
        execution.fail(&err, clock.now());
        let is_last = attempt == max_attempts;
        executions.push(execution);
        if is_last {
          break;
        }
        let backoff = item.retry_policy.backoff_for_attempt(attempt);
        clock.sleep(backoff).await;
      }
    }
  }

  return executions;
}

async fn run_once(
  item: &WorkItem,
  cancellation: &CancellationToken,
) -> std::result::Result<(), JobError> {
  let job = item.job.clone();
  let task_id = item.task_id.clone();

  let run_future = async move {
    let result = AssertUnwindSafe(job.run(&task_id)).catch_unwind().await;
    match result {
      Ok(inner) => inner,
      Err(panic) => Err(JobError::Panic(panic_message(panic))),
    }
  };

  let outcome = match item.timeout {
    Some(timeout) => {
      tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(JobError::Canceled),
        res = tokio::time::timeout(timeout, run_future) => match res {
          Ok(inner) => inner,
          Err(_) => Err(JobError::Timeout(timeout)),
        },
      }
    }
    None => {
      tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(JobError::Canceled),
        res = run_future => res,
      }
    }
  };

  return outcome;
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    return s.to_string();
  }
  if let Some(s) = payload.downcast_ref::<String>() {
    return s.clone();
  }
  return "unknown panic".to_string();
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scheduler::clock::system_clock;

  struct AlwaysFails;

  #[async_trait]
  impl Job for AlwaysFails {
    async fn run(&self, _task_id: &str) -> std::result::Result<(), JobError> {
      return Err(JobError::Failed("nope".to_string()));
    }
  }

  struct AlwaysPanics;

  #[async_trait]
  impl Job for AlwaysPanics {
    async fn run(&self, _task_id: &str) -> std::result::Result<(), JobError> {
      panic!("boom");
    }
  }

  struct Succeeds;

  #[async_trait]
  impl Job for Succeeds {
    async fn run(&self, _task_id: &str) -> std::result::Result<(), JobError> {
      return Ok(());
    }
  }

  #[tokio::test]
  async fn retries_until_max_attempts_then_reports_failure() {
    let pool = WorkerPool::start(1, 8, system_clock());
    pool
      .submit(WorkItem {
        task_id: "t1".to_string(),
        task_name: "demo".to_string(),
        job: Arc::new(AlwaysFails),
        retry_policy: RetryPolicy {
          max_attempts: 3,
          initial_backoff: Duration::from_millis(1),
          max_backoff: Duration::from_millis(5),
          backoff_multiplier: 2.0,
        },
        timeout: None,
      })
      .unwrap();

    let result = pool.results().recv().await.unwrap();
    assert_eq!(result.executions.len(), 3);
    assert!(result
      .executions
      .iter()
      .all(|e| e.status == ExecutionStatus::Failed));
    pool.shutdown().await;
  }

  #[tokio::test]
  async fn panic_is_contained_and_reported_as_job_error() {
    let pool = WorkerPool::start(1, 8, system_clock());
    pool
      .submit(WorkItem {
        task_id: "t1".to_string(),
        task_name: "demo".to_string(),
        job: Arc::new(AlwaysPanics),
        retry_policy: RetryPolicy {
          max_attempts: 1,
          ..RetryPolicy::default()
        },
        timeout: None,
      })
      .unwrap();

    let result = pool.results().recv().await.unwrap();
    assert_eq!(result.executions.len(), 1);
    assert_eq!(result.executions[0].status, ExecutionStatus::Failed);
    assert!(result.executions[0]
      .last_error
      .as_deref()
      .unwrap()
      .contains("boom"));
    pool.shutdown().await;
  }

  #[tokio::test]
  async fn timeout_is_reported_when_job_runs_too_long() {
    struct Never;
    #[async_trait]
    impl Job for Never {
      async fn run(&self, _task_id: &str) -> std::result::Result<(), JobError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return Ok(());
      }
    }

    let pool = WorkerPool::start(1, 8, system_clock());
    pool
      .submit(WorkItem {
        task_id: "t1".to_string(),
        task_name: "demo".to_string(),
        job: Arc::new(Never),
        retry_policy: RetryPolicy {
          max_attempts: 1,
          ..RetryPolicy::default()
        },
        timeout: Some(Duration::from_millis(20)),
      })
      .unwrap();

    let result = pool.results().recv().await.unwrap();
    assert_eq!(result.executions[0].status, ExecutionStatus::TimedOut);
    pool.shutdown().await;
  }

  #[tokio::test]
  async fn succeeds_on_first_attempt_without_retry() {
    let pool = WorkerPool::start(1, 8, system_clock());
    pool
      .submit(WorkItem {
        task_id: "t1".to_string(),
        task_name: "demo".to_string(),
        job: Arc::new(Succeeds),
        retry_policy: RetryPolicy::default(),
        timeout: None,
      })
      .unwrap();

    let result = pool.results().recv().await.unwrap();
    assert_eq!(result.executions.len(), 1);
    assert_eq!(result.executions[0].status, ExecutionStatus::Succeeded);
    pool.shutdown().await;
  }
}
