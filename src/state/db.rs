//! Store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{StatusRecord, StoreSummary, SyncRunStats, UserRecord};

/// Trait for store operations driven by the sync engine.
///
/// Object-safe so the engine can hold an `Arc<dyn FeedStore>`.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Insert or overwrite statuses keyed by `sid`.
    ///
    /// Returns how many of them were not previously stored.
    async fn upsert_statuses(&self, records: &[StatusRecord]) -> Result<u64, StateError>;

    /// Insert or overwrite friend profiles keyed by user id.
    async fn upsert_users(&self, records: &[UserRecord]) -> Result<(), StateError>;

    /// The status with the highest `sid`, if any.
    async fn latest_status(&self) -> Result<Option<StatusRecord>, StateError>;

    /// The status with the lowest `sid`, if any.
    async fn oldest_status(&self) -> Result<Option<StatusRecord>, StateError>;

    async fn status_count(&self) -> Result<u64, StateError>;

    async fn user_count(&self) -> Result<u64, StateError>;

    /// All statuses, newest first.
    async fn all_statuses(&self) -> Result<Vec<StatusRecord>, StateError>;

    /// Statuses that carry a photo, newest first.
    async fn photo_statuses(&self) -> Result<Vec<StatusRecord>, StateError>;

    /// Start a new sync run and return its ID.
    async fn start_sync_run(&self) -> Result<i64, StateError>;

    /// Complete a sync run with statistics.
    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError>;

    async fn get_summary(&self) -> Result<StoreSummary, StateError>;
}

/// SQLite implementation of the store.
pub struct SqliteFeedStore {
    /// Shared with the blocking pool; every statement runs inside
    /// `spawn_blocking` so SQLite I/O never stalls a runtime worker.
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteFeedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFeedStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

const STATUS_COLUMNS: &str = "sid, data, photo_url, created_at";

const UPSERT_STATUS: &str = r#"
    INSERT INTO statuses (sid, data, photo_url, created_at, fetched_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(sid) DO UPDATE SET
        data = excluded.data,
        photo_url = excluded.photo_url,
        created_at = excluded.created_at,
        fetched_at = excluded.fetched_at
"#;

const UPSERT_USER: &str = r#"
    INSERT INTO users (id, screen_name, data, fetched_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(id) DO UPDATE SET
        screen_name = excluded.screen_name,
        data = excluded.data,
        fetched_at = excluded.fetched_at
"#;

impl SqliteFeedStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StateError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StateError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StateError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }

    async fn query_statuses(&self, sql: String) -> Result<Vec<StatusRecord>, StateError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(StateError::query)?;
            let rows = stmt
                .query_map([], row_to_status_parts)
                .map_err(StateError::query)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(StateError::query)?;
            rows.into_iter().map(status_from_parts).collect()
        })
        .await
    }

    async fn query_one_status(&self, sql: String) -> Result<Option<StatusRecord>, StateError> {
        self.with_conn(move |conn| {
            conn.query_row(&sql, [], row_to_status_parts)
                .optional()
                .map_err(StateError::query)?
                .map(status_from_parts)
                .transpose()
        })
        .await
    }

    async fn count(&self, sql: &'static str) -> Result<u64, StateError> {
        self.with_conn(move |conn| count_rows(conn, sql)).await
    }
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn upsert_statuses(&self, records: &[StatusRecord]) -> Result<u64, StateError> {
        if records.is_empty() {
            return Ok(0);
        }

        let rows: Vec<_> = records
            .iter()
            .map(|r| {
                (
                    r.sid,
                    r.raw.to_string(),
                    r.photo_url.clone(),
                    r.created_at.clone(),
                )
            })
            .collect();
        let fetched_at = Utc::now().timestamp();

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(StateError::query)?;
            let before = count_rows(&tx, "SELECT COUNT(*) FROM statuses")?;
            {
                let mut stmt = tx.prepare_cached(UPSERT_STATUS).map_err(StateError::query)?;
                for (sid, data, photo_url, created_at) in &rows {
                    stmt.execute(rusqlite::params![sid, data, photo_url, created_at, fetched_at])
                        .map_err(StateError::query)?;
                }
            }
            let after = count_rows(&tx, "SELECT COUNT(*) FROM statuses")?;
            tx.commit().map_err(StateError::query)?;
            Ok(after - before)
        })
        .await
    }

    async fn upsert_users(&self, records: &[UserRecord]) -> Result<(), StateError> {
        if records.is_empty() {
            return Ok(());
        }

        let rows: Vec<_> = records
            .iter()
            .map(|r| (r.id.clone(), r.screen_name.clone(), r.raw.to_string()))
            .collect();
        let fetched_at = Utc::now().timestamp();

        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(StateError::query)?;
            {
                let mut stmt = tx.prepare_cached(UPSERT_USER).map_err(StateError::query)?;
                for (id, screen_name, data) in &rows {
                    stmt.execute(rusqlite::params![id, screen_name, data, fetched_at])
                        .map_err(StateError::query)?;
                }
            }
            tx.commit().map_err(StateError::query)
        })
        .await
    }

    async fn latest_status(&self) -> Result<Option<StatusRecord>, StateError> {
        self.query_one_status(format!(
            "SELECT {} FROM statuses ORDER BY sid DESC LIMIT 1",
            STATUS_COLUMNS
        ))
        .await
    }

    async fn oldest_status(&self) -> Result<Option<StatusRecord>, StateError> {
        self.query_one_status(format!(
            "SELECT {} FROM statuses ORDER BY sid ASC LIMIT 1",
            STATUS_COLUMNS
        ))
        .await
    }

    async fn status_count(&self) -> Result<u64, StateError> {
        self.count("SELECT COUNT(*) FROM statuses").await
    }

    async fn user_count(&self) -> Result<u64, StateError> {
        self.count("SELECT COUNT(*) FROM users").await
    }

    async fn all_statuses(&self) -> Result<Vec<StatusRecord>, StateError> {
        self.query_statuses(format!(
            "SELECT {} FROM statuses ORDER BY sid DESC",
            STATUS_COLUMNS
        ))
        .await
    }

    async fn photo_statuses(&self) -> Result<Vec<StatusRecord>, StateError> {
        self.query_statuses(format!(
            "SELECT {} FROM statuses WHERE photo_url IS NOT NULL AND photo_url != '' ORDER BY sid DESC",
            STATUS_COLUMNS
        ))
        .await
    }

    async fn start_sync_run(&self) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sync_runs (started_at) VALUES (?1)",
                [started_at],
            )
            .map_err(StateError::query)?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();
        let stats = stats.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE sync_runs SET completed_at = ?1, statuses_fetched = ?2, photos_downloaded = ?3, users_fetched = ?4, interrupted = ?5 WHERE id = ?6",
                rusqlite::params![
                    completed_at,
                    stats.statuses_fetched as i64,
                    stats.photos_downloaded as i64,
                    stats.users_fetched as i64,
                    stats.interrupted,
                    run_id
                ],
            )
            .map_err(StateError::query)?;
            Ok(())
        })
        .await
    }

    async fn get_summary(&self) -> Result<StoreSummary, StateError> {
        self.with_conn(|conn| {
            let statuses = count_rows(conn, "SELECT COUNT(*) FROM statuses")?;
            let photo_statuses = count_rows(
                conn,
                "SELECT COUNT(*) FROM statuses WHERE photo_url IS NOT NULL AND photo_url != ''",
            )?;
            let users = count_rows(conn, "SELECT COUNT(*) FROM users")?;

            let (newest_sid, oldest_sid): (Option<i64>, Option<i64>) = conn
                .query_row("SELECT MAX(sid), MIN(sid) FROM statuses", [], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(StateError::query)?;

            let last_run: Option<(i64, Option<i64>, bool)> = conn
                .query_row(
                    "SELECT started_at, completed_at, interrupted FROM sync_runs ORDER BY id DESC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(StateError::query)?;

            let (last_sync_started, last_sync_completed, last_sync_interrupted) = match last_run {
                Some((started, completed, interrupted)) => (
                    timestamp_to_datetime(started),
                    completed.and_then(timestamp_to_datetime),
                    interrupted,
                ),
                None => (None, None, false),
            };

            Ok(StoreSummary {
                statuses,
                photo_statuses,
                users,
                newest_sid,
                oldest_sid,
                last_sync_started,
                last_sync_completed,
                last_sync_interrupted,
            })
        })
        .await
    }
}

fn count_rows(conn: &Connection, sql: &str) -> Result<u64, StateError> {
    let n: i64 = conn
        .query_row(sql, [], |row| row.get(0))
        .map_err(StateError::query)?;
    Ok(n as u64)
}

type StatusParts = (i64, String, Option<String>, Option<String>);

fn row_to_status_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusParts> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn status_from_parts(
    (sid, data, photo_url, created_at): StatusParts,
) -> Result<StatusRecord, StateError> {
    let raw = serde_json::from_str(&data).map_err(|e| StateError::Corrupt {
        key: format!("status {}", sid),
        source: e,
    })?;
    Ok(StatusRecord {
        sid,
        created_at,
        photo_url,
        raw,
    })
}

fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}
