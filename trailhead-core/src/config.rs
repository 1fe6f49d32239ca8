//! Application configuration: a `serde` + `toml` struct validated at load time, with the same
//! env-var override shape the rest of this family of servers uses (`parse_env_var` /
//! `apply_parsed_env_var`), minus the protobuf-generated config message the teacher's config
//! layer builds from a `build.rs` step — this crate ships no code generation, so a plain
//! `toml`-backed struct stands in for it (see DESIGN.md).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

use crate::constants::{
  DEFAULT_BIND_ADDRESS, DEFAULT_SCHEDULER_QUEUE_CAPACITY, DEFAULT_SCHEDULER_WORKERS,
  DEFAULT_TICK_INTERVAL_SECS,
};
use crate::data_dir::DataDir;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("TOML parse error: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("TOML serialize error: {0}")]
  Serialize(#[from] toml::ser::Error),
  #[error("invalid config: {0}")]
  Invalid(String),
}

#[cfg(not(test))]
fn parse_env_var<T: std::str::FromStr>(
  name: &str,
) -> Result<Option<T>, <T as std::str::FromStr>::Err> {
  if let Ok(value) = std::env::var(name) {
    return Ok(Some(value.parse::<T>()?));
  }
  return Ok(None);
}

#[cfg(test)]
mod test_env {
  use parking_lot::Mutex;
  use std::collections::HashMap;
  use std::sync::LazyLock;

  static ENV: LazyLock<Mutex<HashMap<String, String>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

  pub(super) fn parse_env_var<T: std::str::FromStr>(
    name: &str,
  ) -> Result<Option<T>, <T as std::str::FromStr>::Err> {
    if let Some(value) = ENV.lock().get(name) {
      return Ok(Some(value.parse::<T>()?));
    }
    return Ok(None);
  }

  pub(super) fn set(name: &str, value: Option<&str>) {
    match value {
      None => ENV.lock().remove(name),
      Some(v) => ENV.lock().insert(name.to_string(), v.to_string()),
    };
  }
}

#[cfg(test)]
use test_env::parse_env_var;

fn apply_parsed_env_var<T: std::str::FromStr>(
  name: &str,
  mut f: impl FnMut(T),
) -> Result<(), <T as std::str::FromStr>::Err> {
  if let Some(v) = parse_env_var::<T>(name)? {
    f(v);
  }
  return Ok(());
}

/// Tuning knobs for the scheduler's `WorkerPool`/tick loop. Already-resolved by the time the
/// scheduler sees them — the scheduler itself consumes no environment variables directly (per
/// the scheduler's own External Interfaces contract).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SchedulerConfig {
  #[validate(range(min = 1))]
  pub workers: usize,
  #[validate(range(min = 1))]
  pub queue_capacity: usize,
  #[validate(range(min = 1))]
  pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    return Self {
      workers: DEFAULT_SCHEDULER_WORKERS,
      queue_capacity: DEFAULT_SCHEDULER_QUEUE_CAPACITY,
      tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
    };
  }
}

impl SchedulerConfig {
  pub fn tick_interval(&self) -> Duration {
    return Duration::from_secs(self.tick_interval_secs);
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
  #[validate(length(min = 1))]
  pub bind_address: String,
  #[validate(length(min = 1))]
  pub log_level: String,
  pub cors_allowed_origins: Vec<String>,
  /// IANA timezone name used when rendering task schedules for display. The scheduler's own
  /// `next_fire` computation stays in UTC (see `CronExpression::next_fire_in_tz` for the
  /// wall-clock-aware variant a caller can opt into); this only affects formatting.
  pub timezone: String,
  #[validate(nested)]
  pub scheduler: SchedulerConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    return Self {
      bind_address: DEFAULT_BIND_ADDRESS.to_string(),
      log_level: "info".to_string(),
      cors_allowed_origins: Vec::new(),
      timezone: "UTC".to_string(),
      scheduler: SchedulerConfig::default(),
    };
  }
}

impl AppConfig {
  /// Parses `timezone` as an IANA name, falling back to UTC if it's unrecognized.
  pub fn tz(&self) -> chrono_tz::Tz {
    return self.timezone.parse().unwrap_or(chrono_tz::UTC);
  }

  /// Overrides fields from environment variables, mirroring the rest of this codebase's
  /// `TRAILHEAD_*`-prefixed override convention. Called after loading (or defaulting) the TOML
  /// file so environment variables always win.
  pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
    apply_parsed_env_var("TRAILHEAD_BIND_ADDRESS", |v: String| self.bind_address = v)
      .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    apply_parsed_env_var("TRAILHEAD_LOG_LEVEL", |v: String| self.log_level = v)
      .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    apply_parsed_env_var("TRAILHEAD_SCHEDULER_WORKERS", |v: usize| {
      self.scheduler.workers = v
    })
    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    apply_parsed_env_var("TRAILHEAD_SCHEDULER_QUEUE_CAPACITY", |v: usize| {
      self.scheduler.queue_capacity = v
    })
    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    apply_parsed_env_var("TRAILHEAD_SCHEDULER_TICK_INTERVAL_SECS", |v: u64| {
      self.scheduler.tick_interval_secs = v
    })
    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    return Ok(());
  }
}

/// Reads `<data_dir>/config.toml`, falling back to (and persisting) `AppConfig::default()` if
/// absent. Applies environment overrides, then validates — an invalid config fails fast at
/// startup rather than limping along with partially-applied settings.
pub async fn load_or_init_config(data_dir: &DataDir) -> Result<AppConfig, ConfigError> {
  let path = data_dir.config_path();

  let mut config = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
    let text = tokio::fs::read_to_string(&path).await?;
    toml::from_str::<AppConfig>(&text)?
  } else {
    let config = AppConfig::default();
    tokio::fs::write(&path, toml::to_string_pretty(&config)?).await?;
    config
  };

  config.apply_env_overrides()?;
  config
    .validate()
    .map_err(|e| ConfigError::Invalid(e.to_string()))?;

  return Ok(config);
}
