//! SQLite-backed session history.
//!
//! Two tables mirror the recorded data model: `sessions`, one row per
//! capture run, and `resources`, one row per fetch attempt. The engine
//! only ever inserts and runs one finalizing update; the report queries
//! are read-only.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};

use crate::error::StoreError;

pub type SessionId = i64;

/// One capture run as recorded. `ended_at` and the totals stay absent
/// until the session is finalized.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub elapsed_ms: Option<i64>,
    pub total_kb: Option<f64>,
}

/// Outcome of one fetch attempt within a session. Immutable once written.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceRecord {
    pub id: i64,
    pub session_id: SessionId,
    pub url: String,
    pub elapsed_ms: i64,
    pub size_kb: f64,
}

/// A session together with its resource records.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionReport {
    pub session: SessionSummary,
    pub resources: Vec<ResourceRecord>,
}

/// Persistence collaborator: the capture engine calls the first three
/// operations, the report commands the rest.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, name: &str, started_at: i64) -> Result<SessionId, StoreError>;

    async fn finalize_session(
        &self,
        id: SessionId,
        ended_at: i64,
        elapsed_ms: i64,
        total_kb: f64,
    ) -> Result<(), StoreError>;

    async fn record_resource(
        &self,
        session_id: SessionId,
        url: &str,
        elapsed_ms: i64,
        size_kb: f64,
    ) -> Result<(), StoreError>;

    /// All sessions, most recent first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;

    async fn session_by_id(&self, id: SessionId) -> Result<Option<SessionReport>, StoreError>;

    /// Most recent session with the given name.
    async fn session_by_name(&self, name: &str) -> Result<Option<SessionReport>, StoreError>;
}

/// Percent-encode a path for a `sqlite://` URI so spaces and special
/// characters don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Current time as unix seconds, for session and record timestamps.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// SQLite [`SessionStore`]. Cloneable handle over a connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Opens (or creates) the default history database under the XDG
    /// state directory (`~/.local/state/sitesnap/history.db`).
    pub async fn open_default() -> Result<Self, StoreError> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("sitesnap")?;
        let db_path = xdg_dirs.get_state_home().join("history.db");
        Self::open_at(&db_path).await
    }

    /// Opens (or creates) the database at `path`, creating parent
    /// directories if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database. Used by tests; no disk I/O.
    pub async fn open_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                ended_at INTEGER,
                elapsed_ms INTEGER,
                total_kb REAL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                url TEXT NOT NULL,
                elapsed_ms INTEGER NOT NULL,
                size_kb REAL NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn resources_for(&self, session_id: SessionId) -> Result<Vec<ResourceRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, url, elapsed_ms, size_kb
            FROM resources
            WHERE session_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }
}

fn summary_from_row(row: &SqliteRow) -> SessionSummary {
    SessionSummary {
        id: row.get("id"),
        name: row.get("name"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        elapsed_ms: row.get("elapsed_ms"),
        total_kb: row.get("total_kb"),
    }
}

fn record_from_row(row: &SqliteRow) -> ResourceRecord {
    ResourceRecord {
        id: row.get("id"),
        session_id: row.get("session_id"),
        url: row.get("url"),
        elapsed_ms: row.get("elapsed_ms"),
        size_kb: row.get("size_kb"),
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, name: &str, started_at: i64) -> Result<SessionId, StoreError> {
        let id = sqlx::query(
            r#"
            INSERT INTO sessions (name, started_at)
            VALUES (?1, ?2)
            "#,
        )
        .bind(name)
        .bind(started_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    async fn finalize_session(
        &self,
        id: SessionId,
        ended_at: i64,
        elapsed_ms: i64,
        total_kb: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET ended_at = ?1,
                elapsed_ms = ?2,
                total_kb = ?3
            WHERE id = ?4
            "#,
        )
        .bind(ended_at)
        .bind(elapsed_ms)
        .bind(total_kb)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_resource(
        &self,
        session_id: SessionId,
        url: &str,
        elapsed_ms: i64,
        size_kb: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO resources (session_id, url, elapsed_ms, size_kb)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(session_id)
        .bind(url)
        .bind(elapsed_ms)
        .bind(size_kb)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, started_at, ended_at, elapsed_ms, total_kb
            FROM sessions
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    async fn session_by_id(&self, id: SessionId) -> Result<Option<SessionReport>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, started_at, ended_at, elapsed_ms, total_kb
            FROM sessions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let session = summary_from_row(&row);
        let resources = self.resources_for(session.id).await?;
        Ok(Some(SessionReport { session, resources }))
    }

    async fn session_by_name(&self, name: &str) -> Result<Option<SessionReport>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, started_at, ended_at, elapsed_ms, total_kb
            FROM sessions
            WHERE name = ?1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let session = summary_from_row(&row);
        let resources = self.resources_for(session.id).await?;
        Ok(Some(SessionReport { session, resources }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_finalize_roundtrip() {
        let store = SqliteStore::open_memory().await.unwrap();
        let id = store.create_session("example.com", 1_700_000_000).await.unwrap();

        let open = store.session_by_id(id).await.unwrap().unwrap();
        assert_eq!(open.session.name, "example.com");
        assert!(open.session.ended_at.is_none());

        store
            .finalize_session(id, 1_700_000_010, 9_500, 42.25)
            .await
            .unwrap();
        let done = store.session_by_id(id).await.unwrap().unwrap();
        assert_eq!(done.session.ended_at, Some(1_700_000_010));
        assert_eq!(done.session.elapsed_ms, Some(9_500));
        assert_eq!(done.session.total_kb, Some(42.25));
    }

    #[tokio::test]
    async fn records_attach_to_their_session() {
        let store = SqliteStore::open_memory().await.unwrap();
        let id = store.create_session("example.com", 1).await.unwrap();
        let other = store.create_session("other.org", 2).await.unwrap();

        store
            .record_resource(id, "https://example.com/", 120, 4.0)
            .await
            .unwrap();
        store
            .record_resource(id, "https://example.com/a.css", 30, 1.5)
            .await
            .unwrap();
        store
            .record_resource(other, "https://other.org/", 50, 2.0)
            .await
            .unwrap();

        let report = store.session_by_id(id).await.unwrap().unwrap();
        assert_eq!(report.resources.len(), 2);
        assert_eq!(report.resources[0].url, "https://example.com/");
        assert_eq!(report.resources[1].size_kb, 1.5);
    }

    #[tokio::test]
    async fn list_is_most_recent_first() {
        let store = SqliteStore::open_memory().await.unwrap();
        store.create_session("first.com", 1).await.unwrap();
        store.create_session("second.com", 2).await.unwrap();
        store.create_session("third.com", 3).await.unwrap();

        let sessions = store.list_sessions().await.unwrap();
        let names: Vec<&str> = sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["third.com", "second.com", "first.com"]);
    }

    #[tokio::test]
    async fn lookup_by_name_picks_latest() {
        let store = SqliteStore::open_memory().await.unwrap();
        let old = store.create_session("example.com", 1).await.unwrap();
        let new = store.create_session("example.com", 2).await.unwrap();
        assert_ne!(old, new);

        let report = store.session_by_name("example.com").await.unwrap().unwrap();
        assert_eq!(report.session.id, new);
    }

    #[tokio::test]
    async fn missing_sessions_are_none_not_errors() {
        let store = SqliteStore::open_memory().await.unwrap();
        assert!(store.session_by_id(999).await.unwrap().is_none());
        assert!(store.session_by_name("nowhere.test").await.unwrap().is_none());
    }
}
