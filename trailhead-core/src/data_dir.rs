use std::path::PathBuf;
use tokio::{fs, io::AsyncWriteExt};
use tracing::*;

/// The base data directory where the scheduler's directory storage backend, the demo ORM
/// database, and the resolved config file live.
#[derive(Debug, Clone)]
pub struct DataDir(pub PathBuf);

impl Default for DataDir {
  fn default() -> Self {
    Self(format!("./{}/", Self::DEFAULT).into())
  }
}

impl DataDir {
  pub const DEFAULT: &str = "traildepot";

  pub fn root(&self) -> &PathBuf {
    return &self.0;
  }

  /// Root of the scheduler's `DirectoryStorage` backend (`tasks/` and `executions/` live here).
  pub fn scheduler_path(&self) -> PathBuf {
    return self.0.join("scheduler/");
  }

  /// SQLite file backing the demo MVC pages controller's `trailhead-sqlite` connection.
  pub fn db_path(&self) -> PathBuf {
    return self.0.join("data/main.db");
  }

  pub fn config_path(&self) -> PathBuf {
    return self.0.join(crate::constants::CONFIG_FILE_NAME);
  }

  fn directories(&self) -> Vec<PathBuf> {
    return vec![
      self.0.join("data/"),
      self.scheduler_path(),
      self.scheduler_path().join("tasks"),
      self.scheduler_path().join("executions"),
    ];
  }

  pub(crate) async fn ensure_directory_structure(&self) -> std::io::Result<()> {
    let root = self.root();
    if !fs::try_exists(root).await.unwrap_or(false) {
      fs::create_dir_all(root).await?;

      let mut gitignore = fs::File::create_new(root.join(".gitignore")).await?;
      gitignore.write_all(GIT_IGNORE.as_bytes()).await?;

      info!("initialized fresh data dir: {root:?}");
    }

    for dir in self.directories() {
      if !fs::try_exists(&dir).await.unwrap_or(false) {
        fs::create_dir_all(dir).await?;
      }
    }

    return Ok(());
  }
}

const GIT_IGNORE: &str = r#"
data/
scheduler/
"#;

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn creates_expected_subdirectories() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = DataDir(tmp.path().join("depot"));
    data_dir.ensure_directory_structure().await.unwrap();

    assert!(fs::try_exists(data_dir.scheduler_path().join("tasks")).await.unwrap());
    assert!(fs::try_exists(data_dir.scheduler_path().join("executions")).await.unwrap());
    assert!(fs::try_exists(data_dir.root().join(".gitignore")).await.unwrap());
  }
}
