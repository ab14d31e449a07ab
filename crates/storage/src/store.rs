// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection caching, PRAGMAs, and corruption recovery (spec §4.1).

use crate::error::StoreError;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A cached, PRAGMA-configured SQLite connection.
#[derive(Clone)]
pub struct DbHandle {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl DbHandle {
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Wrap `f` in BEGIN/COMMIT; rolls back and rethrows on error (spec §4.1 `transaction`).
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        conn.execute("BEGIN IMMEDIATE", [])?;
        match f(&conn) {
            Ok(value) => {
                conn.execute("COMMIT", [])?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Returns true if a `PRAGMA quick_check` result indicates corruption.
fn is_corruption_signal(check: &str) -> bool {
    let lowered = check.to_lowercase();
    lowered.contains("malformed") || lowered.contains("corrupt")
}

fn open_with_recovery(path: &Path, now_ms: i64) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;

    let corrupt = match conn.query_row("PRAGMA quick_check(1)", [], |row| row.get::<_, String>(0)) {
        Ok(check) => is_corruption_signal(&check),
        // A query failure on a freshly opened handle (e.g. "file is not a
        // database") is itself a corruption signal.
        Err(_) => true,
    };

    if !corrupt {
        return Ok(conn);
    }

    drop(conn);
    let mut corrupt_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    corrupt_name.push(format!(".corrupt.{now_ms}"));
    let corrupt_path = path.with_file_name(corrupt_name);
    std::fs::rename(path, &corrupt_path)?;
    tracing::warn!(
        original = %path.display(),
        moved_to = %corrupt_path.display(),
        "database corruption detected on open; recreating fresh database",
    );

    let fresh = Connection::open(path)?;
    apply_pragmas(&fresh)?;
    Ok(fresh)
}

/// Opens/caches database connections by canonicalized path (spec §4.1).
#[derive(Default)]
pub struct Store {
    handles: Mutex<HashMap<PathBuf, DbHandle>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: returns the cached handle if `path` was already opened.
    pub fn open_db(&self, path: &Path, now_ms: i64) -> Result<DbHandle, StoreError> {
        let key = path.to_path_buf();
        if let Some(existing) = self.handles.lock().get(&key) {
            return Ok(existing.clone());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = open_with_recovery(path, now_ms)?;
        let handle = DbHandle { conn: Arc::new(Mutex::new(conn)), path: Some(key.clone()) };
        self.handles.lock().insert(key, handle.clone());
        Ok(handle)
    }

    /// `open_app_db` (spec §4.1): the per-process app-scoped database at a
    /// fixed path (`{data_dir}/halo.db`), cached like any other path.
    pub fn open_app_db(&self, data_dir: &Path, now_ms: i64) -> Result<DbHandle, StoreError> {
        self.open_db(&data_dir.join("halo.db"), now_ms)
    }

    /// `open_space_db` (spec §4.1): a workspace-scoped database keyed by path.
    pub fn open_space_db(&self, path: &Path, now_ms: i64) -> Result<DbHandle, StoreError> {
        self.open_db(path, now_ms)
    }

    /// An in-memory handle, for tests that don't need a real file.
    pub fn open_memory(&self) -> Result<DbHandle, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn).ok(); // WAL is a no-op on :memory:, ignore.
        Ok(DbHandle { conn: Arc::new(Mutex::new(conn)), path: None })
    }

    pub fn close_all(&self) {
        self.handles.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_app_db_is_idempotent_per_path() {
        let dir = tempdir().unwrap();
        let store = Store::new();
        let a = store.open_app_db(dir.path(), 1000).unwrap();
        let b = store.open_app_db(dir.path(), 2000).unwrap();
        a.with_connection(|c| c.execute("CREATE TABLE t (id INTEGER)", []).map(|_| ()).map_err(Into::into)).unwrap();
        // Same cached connection, so the table created via `a` is visible via `b`.
        b.with_connection(|c| c.execute("INSERT INTO t VALUES (1)", []).map(|_| ()).map_err(Into::into)).unwrap();
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let store = Store::new();
        let handle = store.open_memory().unwrap();
        handle.with_connection(|c| c.execute("CREATE TABLE t (id INTEGER UNIQUE)", []).map(|_| ()).map_err(Into::into)).unwrap();

        let result = handle.transaction(|c| -> Result<(), StoreError> {
            c.execute("INSERT INTO t VALUES (1)", [])?;
            c.execute("INSERT INTO t VALUES (1)", [])?; // unique violation
            Ok(())
        });
        assert!(result.is_err());

        let count: i64 = handle.with_connection(|c| c.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).map_err(Into::into)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn corrupt_database_is_renamed_and_recreated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("halo.db");
        // Write garbage bytes that are not a valid SQLite header.
        std::fs::write(&path, b"not a sqlite file, definitely malformed content here").unwrap();

        let conn = open_with_recovery(&path, 5000).unwrap();
        // The fresh connection should be usable.
        conn.execute("CREATE TABLE t (id INTEGER)", []).unwrap();

        let corrupt_path = dir.path().join("halo.db.corrupt.5000");
        assert!(corrupt_path.exists());
    }
}
