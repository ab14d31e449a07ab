// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `scheduler` namespace migrations (spec §6 persisted schema).

use halo_storage::Migration;

pub const NAMESPACE: &str = "scheduler";

pub fn migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "create scheduler_jobs and scheduler_run_log",
        up: |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS scheduler_jobs (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    schedule_json TEXT NOT NULL,
                    enabled INTEGER NOT NULL,
                    anchor_ms INTEGER NOT NULL,
                    next_run_at_ms INTEGER NOT NULL,
                    last_run_at_ms INTEGER,
                    running_at_ms INTEGER,
                    consecutive_errors INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    metadata_json TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS scheduler_run_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id TEXT NOT NULL REFERENCES scheduler_jobs(id) ON DELETE CASCADE,
                    started_at INTEGER NOT NULL,
                    finished_at INTEGER NOT NULL,
                    duration_ms INTEGER NOT NULL,
                    outcome TEXT NOT NULL,
                    error TEXT,
                    metadata_json TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_run_log_job_started
                    ON scheduler_run_log(job_id, started_at DESC);",
            )
        },
    }]
}
