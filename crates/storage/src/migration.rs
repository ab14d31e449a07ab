// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespaced migrations (spec §4.1 `run_migrations`).

use crate::error::StoreError;
use rusqlite::Connection;

/// A single forward migration within a namespace.
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: fn(&Connection) -> rusqlite::Result<()>,
}

const META_TABLE: &str = "_migrations";

fn ensure_meta_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {META_TABLE} (
                namespace TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                applied_at INTEGER NOT NULL
            )"
        ),
        [],
    )?;
    Ok(())
}

fn current_version(conn: &Connection, namespace: &str) -> rusqlite::Result<u32> {
    conn.query_row(
        &format!("SELECT version FROM {META_TABLE} WHERE namespace = ?1"),
        [namespace],
        |row| row.get::<_, i64>(0),
    )
    .map(|v| v as u32)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(0),
        other => Err(other),
    })
}

/// Advance a single `(namespace, version)` row, applying unapplied
/// migrations ascending inside one transaction. Only unapplied versions
/// run. Running twice is a no-op after the first (spec §8 "Migration
/// idempotence").
pub fn run_migrations(conn: &Connection, namespace: &str, migrations: &[Migration], now_ms: i64) -> Result<(), StoreError> {
    ensure_meta_table(conn)?;
    let current = current_version(conn, namespace)?;

    let mut pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > current).collect();
    pending.sort_by_key(|m| m.version);

    if pending.is_empty() {
        return Ok(());
    }

    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| StoreError::MigrationFailed { namespace: namespace.to_string(), version: current, reason: e.to_string() })?;

    let result = (|| -> rusqlite::Result<u32> {
        let mut last_version = current;
        for migration in &pending {
            (migration.up)(conn)?;
            last_version = migration.version;
        }
        conn.execute(
            &format!(
                "INSERT INTO {META_TABLE} (namespace, version, applied_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(namespace) DO UPDATE SET version = excluded.version, applied_at = excluded.applied_at"
            ),
            rusqlite::params![namespace, last_version, now_ms],
        )?;
        Ok(last_version)
    })();

    match result {
        Ok(_) => {
            conn.execute("COMMIT", [])
                .map_err(|e| StoreError::MigrationFailed { namespace: namespace.to_string(), version: current, reason: e.to_string() })?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(StoreError::MigrationFailed { namespace: namespace.to_string(), version: current, reason: e.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrations() -> Vec<Migration> {
        vec![
            Migration {
                version: 1,
                description: "create widgets",
                up: |conn| conn.execute("CREATE TABLE widgets (id INTEGER PRIMARY KEY)", []).map(|_| ()),
            },
            Migration {
                version: 2,
                description: "add name column",
                up: |conn| conn.execute("ALTER TABLE widgets ADD COLUMN name TEXT", []).map(|_| ()),
            },
        ]
    }

    #[test]
    fn applies_unapplied_versions_ascending() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, "widgets", &migrations(), 1000).unwrap();
        conn.execute("INSERT INTO widgets (id, name) VALUES (1, 'a')", []).unwrap();
        assert_eq!(current_version(&conn, "widgets").unwrap(), 2);
    }

    #[test]
    fn running_twice_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, "widgets", &migrations(), 1000).unwrap();
        // Re-running must not re-apply version 1 (which would fail: table exists).
        run_migrations(&conn, "widgets", &migrations(), 2000).unwrap();
        assert_eq!(current_version(&conn, "widgets").unwrap(), 2);
    }

    #[test]
    fn failed_migration_rolls_back_and_leaves_previous_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, "widgets", &migrations(), 1000).unwrap();
        let bad = vec![
            Migration {
                version: 1,
                description: "noop",
                up: |_| Ok(()),
            },
            Migration {
                version: 2,
                description: "noop",
                up: |_| Ok(()),
            },
            Migration {
                version: 3,
                description: "broken",
                up: |conn| conn.execute("SELECT * FROM nonexistent_table", []).map(|_| ()),
            },
        ];
        let result = run_migrations(&conn, "widgets", &bad, 3000);
        assert!(result.is_err());
        assert_eq!(current_version(&conn, "widgets").unwrap(), 2);
    }

    #[test]
    fn independent_namespaces_track_separate_versions() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn, "widgets", &migrations(), 1000).unwrap();
        assert_eq!(current_version(&conn, "gadgets").unwrap(), 0);
    }
}
