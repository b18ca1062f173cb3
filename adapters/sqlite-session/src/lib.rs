//! sqlite-session: SQLite implementation of the doca `Session` for local/dev.
//!
//! Purpose
//! - Give repositories a file-based transactional backend without any server.
//! - One connection per session; a transaction is opened on first use and
//!   closed by `commit`/`rollback`.
//! - Aggregates are persisted as JSON documents in a single `documents`
//!   table keyed by `(collection, id)`.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Sessions opened on the same database file share the URL
//!   `sqlite://<canonical path>`, so a unit of work accepts them together.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use doca::{SessionError, Store};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

/// A SQLite database file sessions are opened on.
#[derive(Clone, Debug)]
pub struct SqliteDatabase {
    path: PathBuf,
    url: String,
}

impl SqliteDatabase {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| SessionError::Start(format!("{}: {e}", dir.display())))?;
        }
        let conn = Connection::open(path).map_err(map_start_err)?;
        init_schema(&conn)?;

        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let url = format!("sqlite://{}", path.display());
        info!(url = %url, "sqlite database ready");
        Ok(Self { path, url })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/budget.db`).
    pub fn from_env() -> Result<Self, SessionError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/budget.db".to_string());
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn start_session(&self) -> Result<SqliteSession, SessionError> {
        let conn = Connection::open(&self.path).map_err(map_start_err)?;
        debug!(url = %self.url, "sqlite session opened");
        Ok(SqliteSession {
            url: self.url.clone(),
            conn: Mutex::new(conn),
        })
    }
}

impl Store for SqliteDatabase {
    type Session = SqliteSession;

    fn start_session(&self) -> Result<SqliteSession, SessionError> {
        SqliteDatabase::start_session(self)
    }
}

fn init_schema(conn: &Connection) -> Result<(), SessionError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> SessionError {
    SessionError::Storage(format!("sqlite error: {e}"))
}

fn map_start_err<E: std::fmt::Display>(e: E) -> SessionError {
    SessionError::Start(format!("sqlite error: {e}"))
}

/// A connection with at most one open transaction.
pub struct SqliteSession {
    url: String,
    conn: Mutex<Connection>,
}

impl SqliteSession {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SessionError> {
        self.conn.lock().map_err(|_| SessionError::Storage("mutex poisoned".into()))
    }

    /// The connection, inside a transaction.
    fn tx(&self) -> Result<MutexGuard<'_, Connection>, SessionError> {
        let conn = self.conn()?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN").map_err(map_sqerr)?;
        }
        Ok(conn)
    }

    /// Insert or replace `collection/id`.
    pub fn put_document<T: Serialize>(&self, collection: &str, id: &str, doc: &T) -> Result<(), SessionError> {
        let body = serde_json::to_string(doc).map_err(|e| SessionError::Storage(format!("encode {collection}/{id}: {e}")))?;
        let conn = self.tx()?;
        conn.execute(
            "INSERT INTO documents(collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![collection, id, body, Utc::now().to_rfc3339()],
        )
        .map_err(map_sqerr)?;
        Ok(())
    }

    /// Reads run outside a transaction unless this session already wrote.
    pub fn get_document<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>, SessionError> {
        let conn = self.conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqerr)?;
        body.map(|b| serde_json::from_str(&b).map_err(|e| SessionError::Storage(format!("decode {collection}/{id}: {e}"))))
            .transpose()
    }

    pub fn contains(&self, collection: &str, id: &str) -> Result<bool, SessionError> {
        let conn = self.conn()?;
        let found: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .map_err(map_sqerr)?;
        Ok(found > 0)
    }

    /// Ids of `collection`, sorted.
    pub fn list_ids(&self, collection: &str) -> Result<Vec<String>, SessionError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))
            .map_err(map_sqerr)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
    }

    pub fn in_transaction(&self) -> bool {
        self.conn().map(|c| !c.is_autocommit()).unwrap_or(false)
    }
}

impl doca::Session for SqliteSession {
    fn url(&self) -> &str {
        &self.url
    }

    fn commit(&self) -> Result<(), SessionError> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")
                .map_err(|e| SessionError::Commit(format!("sqlite error: {e}")))?;
        }
        debug!(url = %self.url, "sqlite session committed");
        Ok(())
    }

    fn rollback(&self) -> Result<(), SessionError> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")
                .map_err(|e| SessionError::Rollback(format!("sqlite error: {e}")))?;
        }
        debug!(url = %self.url, "sqlite session rolled back");
        Ok(())
    }
}
