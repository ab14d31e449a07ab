// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `engine` namespace migrations (spec §6 persisted schema).

use halo_storage::Migration;

pub const NAMESPACE: &str = "engine";

pub fn migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "create installed_apps, activity_entries, runs",
        up: |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS installed_apps (
                    id TEXT PRIMARY KEY,
                    spec_id TEXT NOT NULL,
                    space_id TEXT NOT NULL,
                    spec_json TEXT NOT NULL,
                    status TEXT NOT NULL,
                    pending_escalation_id TEXT,
                    user_config_json TEXT NOT NULL,
                    user_overrides_json TEXT NOT NULL,
                    permissions_json TEXT NOT NULL,
                    installed_at INTEGER NOT NULL,
                    last_run_at INTEGER,
                    last_run_outcome TEXT,
                    error_message TEXT,
                    uninstalled_at INTEGER,
                    UNIQUE(spec_id, space_id)
                );
                CREATE TABLE IF NOT EXISTS activity_entries (
                    id TEXT PRIMARY KEY,
                    app_id TEXT NOT NULL REFERENCES installed_apps(id) ON DELETE CASCADE,
                    run_id TEXT NOT NULL,
                    type TEXT NOT NULL,
                    ts INTEGER NOT NULL,
                    session_key TEXT NOT NULL,
                    content_json TEXT NOT NULL,
                    user_response_json TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_activity_app_ts ON activity_entries(app_id, ts DESC);
                CREATE TABLE IF NOT EXISTS runs (
                    id TEXT PRIMARY KEY,
                    app_id TEXT NOT NULL REFERENCES installed_apps(id) ON DELETE CASCADE,
                    trigger_json TEXT NOT NULL,
                    started_at INTEGER NOT NULL,
                    ended_at INTEGER,
                    outcome TEXT,
                    error TEXT,
                    session_key TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_runs_app_started ON runs(app_id, started_at DESC);",
            )
        },
    }]
}
