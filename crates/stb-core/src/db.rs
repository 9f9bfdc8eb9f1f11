//! SQLite bootstrap shared by every store.

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rusqlite::Connection;

use crate::Result;

/// Connection handle shared by the stores.
///
/// rusqlite calls are synchronous; the lock is only ever held for the duration
/// of one statement or transaction and never across an `.await`.
pub type SharedConnection = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS user_topics (
      user_id INTEGER PRIMARY KEY,
      thread_id INTEGER NOT NULL UNIQUE,
      full_name TEXT NOT NULL,
      username TEXT,
      topic_title TEXT NOT NULL,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS user_chat_activity (
      user_id INTEGER PRIMARY KEY,
      last_activity_at TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS bot_settings (
      key TEXT PRIMARY KEY,
      value TEXT NOT NULL,
      updated_at TEXT NOT NULL
    );
";

/// Open (or create) the database file, enable WAL and ensure the schema.
pub fn open(path: &Path) -> Result<SharedConnection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let conn = Connection::open(path)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    bootstrap(conn)
}

/// Private in-memory database (tests, dry runs).
pub fn open_in_memory() -> Result<SharedConnection> {
    bootstrap(Connection::open_in_memory()?)
}

fn bootstrap(conn: Connection) -> Result<SharedConnection> {
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Lock the connection, recovering from a poisoned mutex.
///
/// A panic mid-statement cannot leave SQLite itself inconsistent, so the inner
/// connection is still usable.
pub(crate) fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}
