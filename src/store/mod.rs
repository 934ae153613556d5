//! SQLite-backed relational store access.
//!
//! The compiler is read-path only; everything here exists to execute what it
//! produces. A [`Pool`] holds a bounded set of connections to one database
//! file: requests past capacity wait until a connection frees up, and an
//! optional per-query timeout propagates to the in-flight SQLite call
//! through the connection's interrupt handle.
//!
//! Blocking SQLite work always runs on the blocking thread pool; the async
//! side only ever waits.

pub mod definitions;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::Value;
use tokio::sync::Semaphore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the relational store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("store worker failed: {0}")]
    Worker(String),
}

/// One result row: output alias to value, in column emission order.
pub type Row = serde_json::Map<String, Value>;

/// A bounded pool of SQLite connections to a single database file.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
    query_timeout: Option<Duration>,
}

impl Pool {
    /// Open a pool of at most `capacity` connections to `path`.
    ///
    /// The first connection is opened eagerly so a bad path fails here
    /// rather than on the first request.
    pub fn open(
        path: impl AsRef<Path>,
        capacity: usize,
        query_timeout: Option<Duration>,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let first = Connection::open(&path)?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                path,
                idle: Mutex::new(vec![first]),
                permits: Arc::new(Semaphore::new(capacity.max(1))),
                query_timeout: query_timeout.filter(|d| !d.is_zero()),
            }),
        })
    }

    /// Run `work` on a pooled connection, on the blocking thread pool.
    ///
    /// When a query timeout is configured and expires, the in-flight SQLite
    /// call is interrupted and the operation resolves to
    /// [`StoreError::Timeout`].
    pub async fn with_conn<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::PoolClosed)?;

        let conn = match lock_ignoring_poison(&self.inner.idle).pop() {
            Some(conn) => conn,
            None => Connection::open(&self.inner.path)?,
        };

        let interrupt = conn.get_interrupt_handle();
        let inner = Arc::clone(&self.inner);
        let mut task = tokio::task::spawn_blocking(move || {
            let result = work(&conn);
            lock_ignoring_poison(&inner.idle).push(conn);
            drop(permit);
            result
        });

        let joined = match self.inner.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    interrupt.interrupt();
                    // Reap the task so the connection returns to the pool.
                    let _ = (&mut task).await;
                    return Err(StoreError::Timeout(limit));
                }
            },
            None => (&mut task).await,
        };

        match joined {
            Ok(result) => Ok(result?),
            Err(join_err) => Err(StoreError::Worker(join_err.to_string())),
        }
    }

    /// Execute a SELECT and shape each row as alias-to-value.
    pub async fn query(&self, sql: String, params: Vec<Value>) -> StoreResult<Vec<Row>> {
        self.with_conn(move |conn| query_rows(conn, &sql, &params))
            .await
    }

    /// Execute a statement, returning the affected row count.
    pub async fn execute(&self, sql: String, params: Vec<Value>) -> StoreResult<usize> {
        self.with_conn(move |conn| {
            conn.execute(&sql, rusqlite::params_from_iter(params.iter().map(bind_value)))
        })
        .await
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Run a SELECT on `conn` and shape the rows.
pub fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter().map(bind_value)))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut shaped = Row::new();
        for (i, name) in names.iter().enumerate() {
            shaped.insert(name.clone(), column_to_json(row.get_ref(i)?));
        }
        out.push(shaped);
    }
    Ok(out)
}

/// Convert a JSON parameter into a SQLite binding.
fn bind_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => Sql::Text(s.clone()),
        // Structured parameters should not occur; bind their JSON text
        // rather than failing the whole statement.
        other => Sql::Text(other.to_string()),
    }
}

/// Convert a SQLite column value into JSON.
fn column_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}
