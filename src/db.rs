//! SQLite Database Handle
//! Mission: Open the admin store once at startup and share it across handlers

use anyhow::{Context, Result};
use parking_lot::Mutex; // Faster than std::sync::Mutex
use rusqlite::{Connection, OpenFlags};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS admins (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    email TEXT,
    role TEXT NOT NULL DEFAULT 'admin',
    is_active INTEGER NOT NULL DEFAULT 1,
    last_login TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS revoked_tokens (
    token_hash TEXT PRIMARY KEY,
    expires_at INTEGER NOT NULL,
    revoked_at INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_revoked_tokens_expires_at
    ON revoked_tokens(expires_at);
"#;

/// Shared connection to the admin database.
///
/// Cloning is cheap; every clone points at the same connection. The lock is
/// only ever held inside synchronous calls, never across an `.await`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and apply the schema.
    /// `":memory:"` opens an ephemeral in-memory store.
    pub fn open(path: &str) -> Result<Self> {
        if path == ":memory:" {
            return Self::in_memory();
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("Failed to open database at {}", path))?;

        let db = Self::from_connection(conn)?;
        info!("📊 Admin database initialized at: {}", path);
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();

        // In-memory databases always report "memory"
        if !matches!(journal_mode.to_lowercase().as_str(), "wal" | "memory") {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Liveness probe used by the health endpoint
    pub fn ping(&self) -> rusqlite::Result<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .map(|_| ())
    }
}
