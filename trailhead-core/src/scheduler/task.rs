use crate::scheduler::cron::CronExpression;
use crate::scheduler::error::{Result, SchedulerError};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

/// How a task's run times are determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Schedule {
  /// Standard 5/6/7-field cron expression, stored both as text (for display/persistence) and
  /// pre-parsed (so `next_fire` doesn't re-parse on every tick).
  Cron {
    expression: String,
    #[serde(skip)]
    parsed: Option<CronExpression>,
  },
  /// Fires once every `interval`, starting one interval after the task is added.
  Every { interval: StdDuration },
  /// Fires exactly once, at `at`.
  Once { at: DateTime<Utc> },
}

impl Schedule {
  pub fn cron(expression: impl Into<String>) -> Result<Self> {
    let expression = expression.into();
    let parsed = CronExpression::parse(&expression)
      .map_err(|e| SchedulerError::Parse(expression.clone(), e.to_string()))?;
    return Ok(Self::Cron {
      expression,
      parsed: Some(parsed),
    });
  }

  pub fn every(interval: StdDuration) -> Self {
    return Self::Every { interval };
  }

  pub fn once(at: DateTime<Utc>) -> Self {
    return Self::Once { at };
  }

  /// Parses the full `schedule` string grammar: `@once` / `@every_minute` / `@every_hour` /
  /// `@every_day` / `@every_<duration>`, a Go-style duration (`"30s"`, `"5m"`, `"1h30m"`), an
  /// absolute `YYYY-MM-DD HH:MM:SS` timestamp, or — failing all of those — a cron expression.
  /// `now` anchors `@once`, which fires as soon as the task is registered.
  pub fn parse(raw: &str, now: DateTime<Utc>) -> Result<Self> {
    let raw = raw.trim();

    if let Some(token) = raw.strip_prefix('@') {
      return Self::parse_at_token(token, now);
    }

    if let Some(duration) = parse_go_duration(raw) {
      return Ok(Self::every(duration));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
      return Ok(Self::once(Utc.from_utc_datetime(&naive)));
    }

    return Self::cron(raw);
  }

  fn parse_at_token(token: &str, now: DateTime<Utc>) -> Result<Self> {
    return match token {
      "once" => Ok(Self::once(now)),
      "every_minute" => Ok(Self::every(StdDuration::from_secs(60))),
      "every_hour" => Ok(Self::every(StdDuration::from_secs(3600))),
      "every_day" => Ok(Self::every(StdDuration::from_secs(86400))),
      _ => token
        .strip_prefix("every_")
        .and_then(parse_go_duration)
        .map(Self::every)
        .ok_or_else(|| SchedulerError::Parse(format!("@{token}"), "unknown @ token".to_string())),
    };
  }

  /// Ensures a `Cron` variant's `parsed` field is populated, re-parsing from `expression` if
  /// it was dropped (e.g. after deserializing from storage, since `parsed` is `#[serde(skip)]`).
  pub fn ensure_parsed(&mut self) -> Result<()> {
    if let Schedule::Cron { expression, parsed } = self {
      if parsed.is_none() {
        *parsed = Some(
          CronExpression::parse(expression)
            .map_err(|e| SchedulerError::Parse(expression.clone(), e.to_string()))?,
        );
      }
    }
    return Ok(());
  }

  /// The next fire time strictly after `after`, or `None` if this schedule will never fire
  /// again (an exhausted `Once`, or a `Cron` with no match within its search bound).
  pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    return match self {
      Schedule::Cron { parsed, .. } => parsed.as_ref().and_then(|p| p.next_fire(after)),
      Schedule::Every { interval } => {
        let interval = Duration::from_std(*interval).ok()?;
        if interval <= Duration::zero() {
          return None;
        }
        Some(after + interval)
      }
      Schedule::Once { at } => {
        if *at > after {
          Some(*at)
        } else {
          None
        }
      }
    };
  }

  /// A task's first `next_run`, computed when it's added. Differs from `next_after` only for
  /// `Once`: an `at` that has already passed (`@once`, anchored to the moment of registration,
  /// always has) is due immediately rather than treated as already exhausted.
  pub fn initial_next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    return match self {
      Schedule::Once { at } => Some((*at).max(now)),
      _ => self.next_after(now),
    };
  }
}

/// Parses a Go-style duration string: one or more `<number><unit>` pairs with no separators
/// (`"1h30m"`, `"250ms"`), where unit is one of `ns, us, ms, s, m, h`. Returns `None` if any part
/// of `s` fails to parse — the caller falls through to the next grammar alternative.
fn parse_go_duration(s: &str) -> Option<StdDuration> {
  if s.is_empty() {
    return None;
  }

  let bytes = s.as_bytes();
  let mut i = 0;
  let mut total_secs = 0f64;
  let mut matched_any = false;

  while i < bytes.len() {
    let num_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
      i += 1;
    }
    if i == num_start {
      return None;
    }
    let number: f64 = s[num_start..i].parse().ok()?;

    let unit_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
      i += 1;
    }
    if i == unit_start {
      return None;
    }
    let unit = &s[unit_start..i];

    let multiplier = match unit {
      "ns" => 1e-9,
      "us" => 1e-6,
      "ms" => 1e-3,
      "s" => 1.0,
      "m" => 60.0,
      "h" => 3600.0,
      _ => return None,
    };
    total_secs += number * multiplier;
    matched_any = true;
  }

  if !matched_any || total_secs <= 0.0 {
    return None;
  }
  return Some(StdDuration::from_secs_f64(total_secs));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
  Active,
  Paused,
  /// A `Once` task that has fired, or a `Cron`/`Every` task with no remaining fire times.
  Exhausted,
}

/// Retry policy applied when a job's `run` returns a `JobError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_backoff: StdDuration,
  pub max_backoff: StdDuration,
  pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    return Self {
      max_attempts: 1,
      initial_backoff: StdDuration::from_secs(1),
      max_backoff: StdDuration::from_secs(60),
      backoff_multiplier: 2.0,
    };
  }
}

impl RetryPolicy {
  pub fn backoff_for_attempt(&self, attempt: u32) -> StdDuration {
    if attempt == 0 {
      return StdDuration::ZERO;
    }
    let scaled =
      self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32 - 1);
    let capped = scaled.min(self.max_backoff.as_secs_f64());
    return StdDuration::from_secs_f64(capped.max(0.0));
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
  pub id: String,
  pub name: String,
  pub schedule: Schedule,
  pub status: TaskStatus,
  pub retry_policy: RetryPolicy,
  pub timeout: Option<StdDuration>,
  pub next_run: Option<DateTime<Utc>>,
  pub last_run: Option<DateTime<Utc>>,
  /// Lifetime count of executions recorded for this task (every attempt, including retries),
  /// persisted alongside the task so it survives a restart. See also `Monitor::task_metrics`
  /// for the rolling hour/day windows this complements rather than replaces.
  #[serde(default)]
  pub run_count: u64,
  /// Lifetime count of executions that did not succeed (failed, timed out, or canceled).
  #[serde(default)]
  pub fail_count: u64,
  pub created_at: DateTime<Utc>,
}

impl Task {
  pub fn new(id: impl Into<String>, name: impl Into<String>, schedule: Schedule, now: DateTime<Utc>) -> Self {
    let next_run = schedule.initial_next_run(now);
    return Self {
      id: id.into(),
      name: name.into(),
      schedule,
      status: TaskStatus::Active,
      retry_policy: RetryPolicy::default(),
      timeout: None,
      next_run,
      last_run: None,
      run_count: 0,
      fail_count: 0,
      created_at: now,
    };
  }

  pub fn is_due(&self, now: DateTime<Utc>) -> bool {
    return self.status == TaskStatus::Active
      && self.next_run.is_some_and(|next| next <= now);
  }

  /// Advances `next_run`/`last_run` after a firing at `fired_at`, marking the task `Exhausted`
  /// once its schedule has no more fire times.
  pub fn advance(&mut self, fired_at: DateTime<Utc>) {
    self.last_run = Some(fired_at);
    self.next_run = self.schedule.next_after(fired_at);
    if self.next_run.is_none() {
      self.status = TaskStatus::Exhausted;
    }
  }

  /// Records one finished execution attempt (including a retry) against this task's lifetime
  /// counters. Called once per `TaskExecution`, not once per firing.
  pub fn record_execution(&mut self, succeeded: bool) {
    self.run_count += 1;
    if !succeeded {
      self.fail_count += 1;
    }
  }

  pub fn pause(&mut self) {
    if self.status == TaskStatus::Active {
      self.status = TaskStatus::Paused;
    }
  }

  /// Resumes a paused task, recomputing `next_run` from `now` so a long pause doesn't cause
  /// a burst of catch-up firings.
  pub fn resume(&mut self, now: DateTime<Utc>) {
    if self.status == TaskStatus::Paused {
      self.status = TaskStatus::Active;
      self.next_run = self.schedule.next_after(now);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_at_tokens() {
    let now = Utc::now();
    assert!(matches!(Schedule::parse("@once", now).unwrap(), Schedule::Once { .. }));
    assert!(matches!(
      Schedule::parse("@every_minute", now).unwrap(),
      Schedule::Every { interval } if interval == StdDuration::from_secs(60)
    ));
    assert!(matches!(
      Schedule::parse("@every_hour", now).unwrap(),
      Schedule::Every { interval } if interval == StdDuration::from_secs(3600)
    ));
    assert!(matches!(
      Schedule::parse("@every_day", now).unwrap(),
      Schedule::Every { interval } if interval == StdDuration::from_secs(86400)
    ));
    assert!(matches!(
      Schedule::parse("@every_30s", now).unwrap(),
      Schedule::Every { interval } if interval == StdDuration::from_secs(30)
    ));
  }

  #[test]
  fn once_is_due_immediately_even_though_at_equals_now() {
    let now = Utc::now();
    let schedule = Schedule::parse("@once", now).unwrap();
    let task = Task::new("t1", "demo", schedule, now);
    assert_eq!(task.next_run, Some(now));
  }

  #[test]
  fn parses_go_style_durations() {
    let now = Utc::now();
    assert!(matches!(
      Schedule::parse("30s", now).unwrap(),
      Schedule::Every { interval } if interval == StdDuration::from_secs(30)
    ));
    assert!(matches!(
      Schedule::parse("5m", now).unwrap(),
      Schedule::Every { interval } if interval == StdDuration::from_secs(300)
    ));
    assert!(matches!(
      Schedule::parse("1h30m", now).unwrap(),
      Schedule::Every { interval } if interval == StdDuration::from_secs(5400)
    ));
  }

  #[test]
  fn parses_absolute_timestamp_as_once() {
    let now = Utc::now();
    let schedule = Schedule::parse("2030-01-01 00:00:00", now).unwrap();
    match schedule {
      Schedule::Once { at } => assert_eq!(at.format("%Y-%m-%d %H:%M:%S").to_string(), "2030-01-01 00:00:00"),
      other => panic!("expected Once, got {other:?}"),
    }
  }

  #[test]
  fn falls_back_to_cron_for_anything_else() {
    let now = Utc::now();
    assert!(matches!(
      Schedule::parse("0 30 4 * * *", now).unwrap(),
      Schedule::Cron { .. }
    ));
    assert!(Schedule::parse("not a schedule", now).is_err());
  }

  #[test]
  fn unknown_at_token_is_an_error() {
    assert!(Schedule::parse("@sometime", Utc::now()).is_err());
  }

  #[test]
  fn record_execution_tracks_runs_and_failures() {
    let mut task = Task::new(
      "t1",
      "demo",
      Schedule::every(StdDuration::from_secs(60)),
      Utc::now(),
    );
    task.record_execution(false);
    task.record_execution(false);
    task.record_execution(true);
    assert_eq!(task.run_count, 3);
    assert_eq!(task.fail_count, 2);
  }
}
