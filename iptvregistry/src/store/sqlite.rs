//! SQLite backend
//!
//! One connection guarded by a mutex; every call runs on the blocking pool.
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that SQL string comparison matches chronological order.
//!
//! Each call carries its own deadline. A write that has not reached its
//! commit by then is rolled back and reported as [`StoreError::Timeout`]; a
//! write already committing is awaited and reported as it ends.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, InterruptHandle, OptionalExtension, Row, TransactionBehavior};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::DeviceStore;
use crate::error::StoreError;
use crate::mac::MacAddress;
use crate::record::{DeviceRecord, UpsertFields};

/// Per-call budget until a registry sets its own
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Used when `now + timeout` does not fit in an [`Instant`]
const FAR_DEADLINE: Duration = Duration::from_secs(86_400 * 365);

const SELECT_COLUMNS: &str = "mac_address, m3u_url, created_at, updated_at";

/// File-backed store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    interrupt: Arc<InterruptHandle>,
    call_timeout_us: Arc<AtomicU64>,
    path: Option<PathBuf>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("call_timeout", &self.call_timeout())
            .finish_non_exhaustive()
    }
}

/// Raw column values, converted outside of rusqlite's row callbacks
type RawRecord = (String, String, String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    /// Waiting for the connection
    Queued,
    Running,
    /// Past the point of no return
    Committing,
    Finished,
    /// Given up by the caller; the task must not write
    Abandoned,
}

/// Progress of one call, shared by the caller and its blocking task
#[derive(Debug)]
struct CallGate {
    state: Mutex<CallState>,
    timeout: Duration,
}

impl CallGate {
    fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(CallState::Queued),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, from: CallState, to: CallState) -> Result<(), StoreError> {
        let mut state = self.lock();
        if *state == from {
            *state = to;
            Ok(())
        } else {
            Err(StoreError::Timeout(self.timeout))
        }
    }

    /// The task owns the connection
    fn start(&self) -> Result<(), StoreError> {
        self.advance(CallState::Queued, CallState::Running)
    }

    /// Must succeed right before `COMMIT`; on failure the transaction is dropped
    fn begin_commit(&self) -> Result<(), StoreError> {
        self.advance(CallState::Running, CallState::Committing)
    }

    fn finish(&self) {
        *self.lock() = CallState::Finished;
    }

    /// Gives the call up unless its commit has started
    ///
    /// `on_running` runs under the state lock, while the task still holds
    /// the connection, so it can only reach this call's statements.
    fn abandon(&self, on_running: impl FnOnce()) -> bool {
        let mut state = self.lock();
        match *state {
            CallState::Queued | CallState::Abandoned => {
                *state = CallState::Abandoned;
                true
            }
            CallState::Running => {
                *state = CallState::Abandoned;
                on_running();
                true
            }
            CallState::Committing | CallState::Finished => false,
        }
    }
}

impl SqliteStore {
    /// Opens (or creates) the database file and its `devices` table
    ///
    /// ```rust,no_run
    /// use iptvregistry::SqliteStore;
    /// use std::path::Path;
    ///
    /// let store = SqliteStore::open(Path::new("devices.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(DEFAULT_CALL_TIMEOUT)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mac_address TEXT NOT NULL UNIQUE,
                m3u_url TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;

        match &path {
            Some(p) => info!(path = %p.display(), "SQLite device store opened"),
            None => debug!("In-memory SQLite device store opened"),
        }

        let store = Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(Some(conn))),
            call_timeout_us: Arc::new(AtomicU64::new(0)),
            path,
        };
        store.set_call_timeout(DEFAULT_CALL_TIMEOUT);
        Ok(store)
    }

    /// Database file, `None` for an in-memory database
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Budget of each call, shared by every clone of this store
    pub fn call_timeout(&self) -> Duration {
        Duration::from_micros(self.call_timeout_us.load(Ordering::Relaxed))
    }

    /// Runs `f` with the connection on the blocking thread pool, within the
    /// call timeout
    ///
    /// Writes must pass [`CallGate::begin_commit`] before committing.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection, &CallGate) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let timeout = self.call_timeout();
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_DEADLINE);
        let gate = Arc::new(CallGate::new(timeout));

        let conn = self.conn.clone();
        let task_gate = gate.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            task_gate.start()?;
            let result = match guard.as_mut() {
                Some(conn) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    conn.busy_timeout(remaining)
                        .map_err(StoreError::from)
                        .and_then(|_| f(conn, &task_gate))
                }
                None => Err(StoreError::Closed),
            };
            task_gate.finish();
            result
        });

        tokio::select! {
            joined = &mut task => joined.map_err(|e| StoreError::Task(e.to_string()))?,
            _ = tokio::time::sleep_until(deadline) => {
                if gate.abandon(|| self.interrupt.interrupt()) {
                    warn!(?timeout, "SQLite call abandoned at its deadline");
                    Err(StoreError::Timeout(timeout))
                } else {
                    task.await.map_err(|e| StoreError::Task(e.to_string()))?
                }
            }
        }
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(key: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupted {
            key: key.to_string(),
            reason: format!("bad timestamp {value:?}: {e}"),
        })
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_record((mac, m3u_url, created_at, updated_at): RawRecord) -> Result<DeviceRecord, StoreError> {
    let mac_address = MacAddress::parse(&mac).map_err(|e| StoreError::Corrupted {
        key: mac.clone(),
        reason: e.to_string(),
    })?;
    Ok(DeviceRecord {
        created_at: parse_timestamp(&mac, &created_at)?,
        updated_at: parse_timestamp(&mac, &updated_at)?,
        mac_address,
        m3u_url,
    })
}

#[async_trait]
impl DeviceStore for SqliteStore {
    async fn find_all(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        self.with_conn(|conn, _| {
            let mut stmt =
                conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM devices ORDER BY id"))?;
            let rows = stmt
                .query_map([], read_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(into_record).collect()
        })
        .await
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn, _| {
            let raw = conn
                .query_row(
                    &format!("SELECT {SELECT_COLUMNS} FROM devices WHERE mac_address = ?1"),
                    params![key],
                    read_row,
                )
                .optional()?;
            raw.map(into_record).transpose()
        })
        .await
    }

    async fn upsert_by_key(
        &self,
        key: &MacAddress,
        fields: UpsertFields,
    ) -> Result<(DeviceRecord, bool), StoreError> {
        let key = key.to_string();
        let m3u_url = fields.m3u_url.into_string();
        let now = format_timestamp(&fields.now);

        self.with_conn(move |conn, gate| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existed: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM devices WHERE mac_address = ?1)",
                params![key],
                |row| row.get(0),
            )?;

            let raw = tx.query_row(
                &format!(
                    "INSERT INTO devices (mac_address, m3u_url, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)
                     ON CONFLICT(mac_address) DO UPDATE SET
                        m3u_url = excluded.m3u_url,
                        updated_at = MAX(excluded.updated_at, devices.created_at)
                     RETURNING {SELECT_COLUMNS}"
                ),
                params![key, m3u_url, now],
                read_row,
            )?;
            let record = into_record(raw)?;

            gate.begin_commit()?;
            tx.commit()?;
            Ok((record, !existed))
        })
        .await
    }

    async fn delete_by_key(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn, gate| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let deleted = tx.execute("DELETE FROM devices WHERE mac_address = ?1", params![key])?;

            gate.begin_commit()?;
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }

    fn set_call_timeout(&self, timeout: Duration) -> bool {
        let micros = u64::try_from(timeout.as_micros()).unwrap_or(u64::MAX);
        self.call_timeout_us.store(micros, Ordering::Relaxed);
        true
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            match guard.take() {
                Some(conn) => conn.close().map_err(|(_, e)| StoreError::Sqlite(e)),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
