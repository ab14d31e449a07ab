// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row <-> struct mapping against `installed_apps` / `activity_entries` /
//! `runs` (spec §6 persisted schema).

use crate::error::EngineError;
use halo_core::{
    ActivityEntry, ActivityId, ActivityType, AppId, AppStatus, InstalledApp, Run, RunId,
    RunOutcome, Trigger, UserResponse,
};
use halo_storage::DbHandle;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn app_status_str(s: AppStatus) -> &'static str {
    match s {
        AppStatus::Active => "active",
        AppStatus::Paused => "paused",
        AppStatus::Error => "error",
        AppStatus::NeedsLogin => "needs_login",
        AppStatus::WaitingUser => "waiting_user",
        AppStatus::Uninstalled => "uninstalled",
    }
}

fn parse_app_status(s: &str) -> AppStatus {
    match s {
        "paused" => AppStatus::Paused,
        "error" => AppStatus::Error,
        "needs_login" => AppStatus::NeedsLogin,
        "waiting_user" => AppStatus::WaitingUser,
        "uninstalled" => AppStatus::Uninstalled,
        _ => AppStatus::Active,
    }
}

fn row_to_app(row: &Row) -> rusqlite::Result<InstalledApp> {
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;
    let spec_json: String = row.get("spec_json")?;
    let user_config_json: String = row.get("user_config_json")?;
    let user_overrides_json: String = row.get("user_overrides_json")?;
    let permissions_json: String = row.get("permissions_json")?;
    let pending_escalation_id: Option<String> = row.get("pending_escalation_id")?;

    Ok(InstalledApp {
        id: AppId::from_string(id),
        spec_id: row.get("spec_id")?,
        space_id: row.get("space_id")?,
        spec: serde_json::from_str(&spec_json).unwrap_or(serde_json::Value::Null),
        user_config: serde_json::from_str(&user_config_json).unwrap_or_default(),
        user_overrides: serde_json::from_str(&user_overrides_json).unwrap_or(serde_json::Value::Null),
        permissions: serde_json::from_str(&permissions_json).unwrap_or_default(),
        status: parse_app_status(&status),
        pending_escalation_id: pending_escalation_id.map(ActivityId::from_string),
        installed_at: row.get("installed_at")?,
        uninstalled_at: row.get("uninstalled_at")?,
        last_run_at: row.get("last_run_at")?,
        last_run_outcome: row.get("last_run_outcome")?,
        error_message: row.get("error_message")?,
    })
}

pub fn insert_app(db: &DbHandle, app: &InstalledApp) -> Result<(), EngineError> {
    db.with_connection(|conn| insert_app_conn(conn, app).map_err(halo_storage::StoreError::from))?;
    Ok(())
}

fn insert_app_conn(conn: &Connection, app: &InstalledApp) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO installed_apps
            (id, spec_id, space_id, spec_json, status, pending_escalation_id, user_config_json,
             user_overrides_json, permissions_json, installed_at, last_run_at, last_run_outcome,
             error_message, uninstalled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            app.id.as_str(),
            app.spec_id,
            app.space_id,
            serde_json::to_string(&app.spec).unwrap_or_default(),
            app_status_str(app.status),
            app.pending_escalation_id.map(|id| id.as_str().to_string()),
            serde_json::to_string(&app.user_config).unwrap_or_default(),
            serde_json::to_string(&app.user_overrides).unwrap_or_default(),
            serde_json::to_string(&app.permissions).unwrap_or_default(),
            app.installed_at,
            app.last_run_at,
            app.last_run_outcome,
            app.error_message,
            app.uninstalled_at,
        ],
    )?;
    Ok(())
}

pub fn update_app(db: &DbHandle, app: &InstalledApp) -> Result<(), EngineError> {
    db.with_connection(|conn| {
        conn.execute(
            "UPDATE installed_apps SET
                status = ?2, pending_escalation_id = ?3, user_config_json = ?4, user_overrides_json = ?5,
                permissions_json = ?6, last_run_at = ?7, last_run_outcome = ?8, error_message = ?9,
                uninstalled_at = ?10
             WHERE id = ?1",
            params![
                app.id.as_str(),
                app_status_str(app.status),
                app.pending_escalation_id.map(|id| id.as_str().to_string()),
                serde_json::to_string(&app.user_config).unwrap_or_default(),
                serde_json::to_string(&app.user_overrides).unwrap_or_default(),
                serde_json::to_string(&app.permissions).unwrap_or_default(),
                app.last_run_at,
                app.last_run_outcome,
                app.error_message,
                app.uninstalled_at,
            ],
        )
        .map(|_| ())
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

pub fn delete_app(db: &DbHandle, id: &AppId) -> Result<(), EngineError> {
    db.with_connection(|conn| {
        conn.execute("DELETE FROM installed_apps WHERE id = ?1", params![id.as_str()])
            .map(|_| ())
            .map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

pub fn get_app(db: &DbHandle, id: &AppId) -> Result<Option<InstalledApp>, EngineError> {
    let app = db.with_connection(|conn| {
        conn.query_row("SELECT * FROM installed_apps WHERE id = ?1", params![id.as_str()], row_to_app)
            .optional()
            .map_err(halo_storage::StoreError::from)
    })?;
    Ok(app)
}

pub fn find_by_spec_and_space(db: &DbHandle, spec_id: &str, space_id: &str) -> Result<Option<InstalledApp>, EngineError> {
    let app = db.with_connection(|conn| {
        conn.query_row(
            "SELECT * FROM installed_apps WHERE spec_id = ?1 AND space_id = ?2",
            params![spec_id, space_id],
            row_to_app,
        )
        .optional()
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(app)
}

pub fn list_apps(db: &DbHandle, space_id: Option<&str>) -> Result<Vec<InstalledApp>, EngineError> {
    let apps = db.with_connection(|conn| {
        let (sql, param): (&str, Option<&str>) = match space_id {
            Some(s) => ("SELECT * FROM installed_apps WHERE space_id = ?1 ORDER BY installed_at ASC", Some(s)),
            None => ("SELECT * FROM installed_apps ORDER BY installed_at ASC", None),
        };
        let mut stmt = conn.prepare(sql).map_err(halo_storage::StoreError::from)?;
        let rows = match param {
            Some(p) => stmt
                .query_map(params![p], row_to_app)
                .map_err(halo_storage::StoreError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(halo_storage::StoreError::from)?,
            None => stmt
                .query_map([], row_to_app)
                .map_err(halo_storage::StoreError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(halo_storage::StoreError::from)?,
        };
        Ok(rows)
    })?;
    Ok(apps)
}

pub fn list_active_apps(db: &DbHandle) -> Result<Vec<InstalledApp>, EngineError> {
    Ok(list_apps(db, None)?.into_iter().filter(|a| a.status == AppStatus::Active).collect())
}

fn activity_kind_str(k: ActivityType) -> &'static str {
    match k {
        ActivityType::RunComplete => "run_complete",
        ActivityType::RunSkipped => "run_skipped",
        ActivityType::Milestone => "milestone",
        ActivityType::Escalation => "escalation",
        ActivityType::Output => "output",
    }
}

fn parse_activity_kind(s: &str) -> ActivityType {
    match s {
        "run_skipped" => ActivityType::RunSkipped,
        "milestone" => ActivityType::Milestone,
        "escalation" => ActivityType::Escalation,
        "output" => ActivityType::Output,
        _ => ActivityType::RunComplete,
    }
}

fn row_to_activity(row: &Row) -> rusqlite::Result<ActivityEntry> {
    let id: String = row.get("id")?;
    let app_id: String = row.get("app_id")?;
    let run_id: String = row.get("run_id")?;
    let kind: String = row.get("type")?;
    let content_json: String = row.get("content_json")?;
    let user_response_json: Option<String> = row.get("user_response_json")?;

    Ok(ActivityEntry {
        id: ActivityId::from_string(id),
        app_id: AppId::from_string(app_id),
        run_id: RunId::from_string(run_id),
        kind: parse_activity_kind(&kind),
        ts: row.get("ts")?,
        session_key: row.get("session_key")?,
        content: serde_json::from_str(&content_json).unwrap_or_default(),
        user_response: user_response_json.as_deref().and_then(|s| serde_json::from_str(s).ok()),
    })
}

pub fn insert_activity(db: &DbHandle, entry: &ActivityEntry) -> Result<(), EngineError> {
    db.with_connection(|conn| {
        conn.execute(
            "INSERT INTO activity_entries (id, app_id, run_id, type, ts, session_key, content_json, user_response_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id.as_str(),
                entry.app_id.as_str(),
                entry.run_id.as_str(),
                activity_kind_str(entry.kind),
                entry.ts,
                entry.session_key,
                serde_json::to_string(&entry.content).unwrap_or_default(),
                entry.user_response.as_ref().and_then(|r| serde_json::to_string(r).ok()),
            ],
        )
        .map(|_| ())
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

pub fn update_activity_response(db: &DbHandle, id: &ActivityId, response: &UserResponse) -> Result<(), EngineError> {
    db.with_connection(|conn| {
        conn.execute(
            "UPDATE activity_entries SET user_response_json = ?2 WHERE id = ?1",
            params![id.as_str(), serde_json::to_string(response).unwrap_or_default()],
        )
        .map(|_| ())
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

pub fn get_activity(db: &DbHandle, id: &ActivityId) -> Result<Option<ActivityEntry>, EngineError> {
    let entry = db.with_connection(|conn| {
        conn.query_row("SELECT * FROM activity_entries WHERE id = ?1", params![id.as_str()], row_to_activity)
            .optional()
            .map_err(halo_storage::StoreError::from)
    })?;
    Ok(entry)
}

/// `limit` default 30, `since` cursor (ts-based), newest-first (spec §4.4.2
/// "Activity entries").
pub fn list_activity(db: &DbHandle, app_id: &AppId, limit: u32, since_ms: Option<i64>) -> Result<Vec<ActivityEntry>, EngineError> {
    let entries = db.with_connection(|conn| {
        let since = since_ms.unwrap_or(0);
        let mut stmt = conn
            .prepare("SELECT * FROM activity_entries WHERE app_id = ?1 AND ts >= ?2 ORDER BY ts DESC, rowid DESC LIMIT ?3")
            .map_err(halo_storage::StoreError::from)?;
        let rows = stmt
            .query_map(params![app_id.as_str(), since, limit], row_to_activity)
            .map_err(halo_storage::StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(halo_storage::StoreError::from)?;
        Ok(rows)
    })?;
    Ok(entries)
}

fn trigger_json(t: &Trigger) -> String {
    serde_json::to_string(t).unwrap_or_default()
}

fn run_outcome_str(o: RunOutcome) -> &'static str {
    match o {
        RunOutcome::Useful => "useful",
        RunOutcome::Noop => "noop",
        RunOutcome::Error => "error",
        RunOutcome::Skipped => "skipped",
    }
}

fn parse_run_outcome(s: &str) -> RunOutcome {
    match s {
        "noop" => RunOutcome::Noop,
        "error" => RunOutcome::Error,
        "skipped" => RunOutcome::Skipped,
        _ => RunOutcome::Useful,
    }
}

fn row_to_run(row: &Row) -> rusqlite::Result<Run> {
    let id: String = row.get("id")?;
    let app_id: String = row.get("app_id")?;
    let trigger_json: String = row.get("trigger_json")?;
    let outcome: Option<String> = row.get("outcome")?;

    Ok(Run {
        id: RunId::from_string(id),
        app_id: AppId::from_string(app_id),
        trigger: serde_json::from_str(&trigger_json).unwrap_or(Trigger::Manual),
        started_at: row.get("started_at")?,
        ended_at: row.get("ended_at")?,
        outcome: outcome.as_deref().map(parse_run_outcome),
        error: row.get("error")?,
        session_key: row.get("session_key")?,
    })
}

pub fn insert_run(db: &DbHandle, run: &Run) -> Result<(), EngineError> {
    db.with_connection(|conn| {
        conn.execute(
            "INSERT INTO runs (id, app_id, trigger_json, started_at, ended_at, outcome, error, session_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id.as_str(),
                run.app_id.as_str(),
                trigger_json(&run.trigger),
                run.started_at,
                run.ended_at,
                run.outcome.map(run_outcome_str),
                run.error,
                run.session_key,
            ],
        )
        .map(|_| ())
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

pub fn complete_run(db: &DbHandle, id: &RunId, ended_at: i64, outcome: RunOutcome, error: Option<&str>) -> Result<(), EngineError> {
    db.with_connection(|conn| {
        conn.execute(
            "UPDATE runs SET ended_at = ?2, outcome = ?3, error = ?4 WHERE id = ?1",
            params![id.as_str(), ended_at, run_outcome_str(outcome), error],
        )
        .map(|_| ())
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

pub fn get_run(db: &DbHandle, id: &RunId) -> Result<Option<Run>, EngineError> {
    let run = db.with_connection(|conn| {
        conn.query_row("SELECT * FROM runs WHERE id = ?1", params![id.as_str()], row_to_run)
            .optional()
            .map_err(halo_storage::StoreError::from)
    })?;
    Ok(run)
}

/// Runs with `ended_at IS NULL`: left in-flight by a hard kill (spec
/// §4.4.2 "Restart recovery").
pub fn list_in_flight_runs(db: &DbHandle) -> Result<Vec<Run>, EngineError> {
    let runs = db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM runs WHERE ended_at IS NULL").map_err(halo_storage::StoreError::from)?;
        let rows = stmt
            .query_map([], row_to_run)
            .map_err(halo_storage::StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(halo_storage::StoreError::from)?;
        Ok(rows)
    })?;
    Ok(runs)
}

pub fn list_runs_for_app(db: &DbHandle, app_id: &AppId, limit: u32) -> Result<Vec<Run>, EngineError> {
    let runs = db.with_connection(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM runs WHERE app_id = ?1 ORDER BY started_at DESC LIMIT ?2")
            .map_err(halo_storage::StoreError::from)?;
        let rows = stmt
            .query_map(params![app_id.as_str(), limit], row_to_run)
            .map_err(halo_storage::StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(halo_storage::StoreError::from)?;
        Ok(rows)
    })?;
    Ok(runs)
}
