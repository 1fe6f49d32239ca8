use log::*;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::Error;
pub use crate::params::Params;
use crate::rows::columns;
pub use crate::rows::{Row, Rows};

/// The result type returned on method calls in this crate.
pub type Result<T> = std::result::Result<T, Error>;

enum Message {
  Run(Box<dyn FnOnce(&mut rusqlite::Connection) + Send + 'static>),
}

/// A handle to call functions against a SQLite connection owned by a dedicated background
/// thread. Mirrors the single-writer-thread connection actor shape, minus the optional
/// reader-thread fan-out this crate doesn't need.
#[derive(Clone)]
pub struct Connection {
  sender: flume::Sender<Message>,
}

impl Connection {
  pub fn new<E>(
    builder: impl FnOnce() -> std::result::Result<rusqlite::Connection, E> + Send + 'static,
  ) -> std::result::Result<Self, E>
  where
    E: Send + 'static,
  {
    let (sender, receiver) = flume::unbounded::<Message>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::result::Result<(), E>>();

    std::thread::Builder::new()
      .name("trailhead-sqlite".to_string())
      .spawn(move || {
        let mut conn = match builder() {
          Ok(conn) => {
            let _ = ready_tx.send(Ok(()));
            conn
          }
          Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
          }
        };

        while let Ok(Message::Run(f)) = receiver.recv() {
          f(&mut conn);
        }

        debug!("trailhead-sqlite connection closed");
      })
      .expect("spawn sqlite thread");

    ready_rx.recv().expect("sqlite startup")?;

    return Ok(Self { sender });
  }

  pub fn open_in_memory() -> Result<Self> {
    return Self::new(|| Ok(rusqlite::Connection::open_in_memory()?))
      .map_err(|err: rusqlite::Error| Error::Rusqlite(err));
  }

  /// Opens (creating if absent) a SQLite file at `path` on the connection's background thread.
  pub fn open(path: impl AsRef<std::path::Path> + Send + 'static) -> Result<Self> {
    return Self::new(move || Ok(rusqlite::Connection::open(path)?))
      .map_err(|err: rusqlite::Error| Error::Rusqlite(err));
  }

  /// Call a function in the background thread and get the result asynchronously.
  pub async fn call<F, R>(&self, function: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    let (tx, rx) = oneshot::channel::<Result<R>>();

    self
      .sender
      .send(Message::Run(Box::new(move |conn| {
        let _ = tx.send(function(conn));
      })))
      .map_err(|_| Error::ConnectionClosed)?;

    return rx.await.map_err(|_| Error::ConnectionClosed)?;
  }

  pub async fn execute(
    &self,
    sql: impl AsRef<str> + Send + 'static,
    params: impl Params + Send + 'static,
  ) -> Result<usize> {
    return self
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(sql.as_ref())?;
        params.bind(&mut stmt)?;
        return Ok(stmt.raw_execute()?);
      })
      .await;
  }

  pub async fn query_rows(
    &self,
    sql: impl AsRef<str> + Send + 'static,
    params: impl Params + Send + 'static,
  ) -> Result<Rows> {
    return self
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(sql.as_ref())?;
        params.bind(&mut stmt)?;
        let rows = stmt.raw_query();
        return Ok(Rows::from_rows(rows)?);
      })
      .await;
  }

  pub async fn query_row(
    &self,
    sql: impl AsRef<str> + Send + 'static,
    params: impl Params + Send + 'static,
  ) -> Result<Option<Row>> {
    return self
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(sql.as_ref())?;
        params.bind(&mut stmt)?;

        let mut rows = stmt.raw_query();
        let Some(row) = rows.next()? else {
          return Ok(None);
        };

        return Ok(Some(Row::from_row(row, Arc::new(columns(row.as_ref())))?));
      })
      .await;
  }
}

impl std::fmt::Debug for Connection {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    return f.debug_struct("Connection").finish_non_exhaustive();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params;

  #[tokio::test]
  async fn test_open_and_query() {
    let conn = Connection::open_in_memory().unwrap();

    conn
      .execute("CREATE TABLE t (id INTEGER, name TEXT)", ())
      .await
      .unwrap();
    conn
      .execute("INSERT INTO t (id, name) VALUES ($1, $2)", params!(1, "a"))
      .await
      .unwrap();

    let rows = conn.query_rows("SELECT id, name FROM t", ()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<i64>(0).unwrap(), 1);
    assert_eq!(rows[0].get::<String>(1).unwrap(), "a");
  }
}
