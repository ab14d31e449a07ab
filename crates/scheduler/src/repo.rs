// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row <-> [`SchedulerJob`] mapping against `scheduler_jobs` /
//! `scheduler_run_log` (spec §6).

use crate::error::SchedulerError;
use halo_core::schedule::{Outcome, RunLogEntry, RunStats};
use halo_core::{JobStatus, Schedule, SchedulerJob, SchedulerJobId};
use halo_storage::DbHandle;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

fn job_status_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Idle => "idle",
        JobStatus::Running => "running",
        JobStatus::Paused => "paused",
        JobStatus::Disabled => "disabled",
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "paused" => JobStatus::Paused,
        "disabled" => JobStatus::Disabled,
        _ => JobStatus::Idle,
    }
}

fn row_to_job(row: &Row) -> rusqlite::Result<SchedulerJob> {
    let schedule_json: String = row.get("schedule_json")?;
    let metadata_json: Option<String> = row.get("metadata_json")?;
    let id: String = row.get("id")?;
    let status: String = row.get("status")?;

    let schedule: Schedule = serde_json::from_str(&schedule_json).unwrap_or(Schedule::Every { interval_ms: 60_000 });
    let metadata: HashMap<String, String> = metadata_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    Ok(SchedulerJob {
        id: SchedulerJobId::from_string(id),
        name: row.get("name")?,
        metadata,
        schedule,
        enabled: row.get::<_, i64>("enabled")? != 0,
        anchor_ms: row.get("anchor_ms")?,
        next_run_at_ms: row.get("next_run_at_ms")?,
        last_run_at_ms: row.get("last_run_at_ms")?,
        running_at_ms: row.get("running_at_ms")?,
        consecutive_errors: row.get::<_, i64>("consecutive_errors")? as u32,
        status: parse_job_status(&status),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn insert_job(db: &DbHandle, job: &SchedulerJob) -> Result<(), SchedulerError> {
    db.with_connection(|conn| {
        insert_job_conn(conn, job).map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

fn insert_job_conn(conn: &Connection, job: &SchedulerJob) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO scheduler_jobs
            (id, name, schedule_json, enabled, anchor_ms, next_run_at_ms, last_run_at_ms,
             running_at_ms, consecutive_errors, status, metadata_json, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            job.id.as_str(),
            job.name,
            serde_json::to_string(&job.schedule).unwrap_or_default(),
            job.enabled as i64,
            job.anchor_ms,
            job.next_run_at_ms,
            job.last_run_at_ms,
            job.running_at_ms,
            job.consecutive_errors as i64,
            job_status_str(job.status),
            serde_json::to_string(&job.metadata).ok(),
            job.created_at,
            job.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update_job(db: &DbHandle, job: &SchedulerJob) -> Result<(), SchedulerError> {
    db.with_connection(|conn| {
        conn.execute(
            "UPDATE scheduler_jobs SET
                name = ?2, schedule_json = ?3, enabled = ?4, anchor_ms = ?5,
                next_run_at_ms = ?6, last_run_at_ms = ?7, running_at_ms = ?8,
                consecutive_errors = ?9, status = ?10, metadata_json = ?11, updated_at = ?12
             WHERE id = ?1",
            params![
                job.id.as_str(),
                job.name,
                serde_json::to_string(&job.schedule).unwrap_or_default(),
                job.enabled as i64,
                job.anchor_ms,
                job.next_run_at_ms,
                job.last_run_at_ms,
                job.running_at_ms,
                job.consecutive_errors as i64,
                job_status_str(job.status),
                serde_json::to_string(&job.metadata).ok(),
                job.updated_at,
            ],
        )
        .map(|_| ())
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

pub fn delete_job(db: &DbHandle, id: &SchedulerJobId) -> Result<(), SchedulerError> {
    db.with_connection(|conn| {
        conn.execute("DELETE FROM scheduler_jobs WHERE id = ?1", params![id.as_str()])
            .map(|_| ())
            .map_err(halo_storage::StoreError::from)
    })?;
    Ok(())
}

pub fn get_job(db: &DbHandle, id: &SchedulerJobId) -> Result<Option<SchedulerJob>, SchedulerError> {
    let job = db.with_connection(|conn| {
        conn.query_row("SELECT * FROM scheduler_jobs WHERE id = ?1", params![id.as_str()], row_to_job)
            .optional()
            .map_err(halo_storage::StoreError::from)
    })?;
    Ok(job)
}

pub fn list_jobs(db: &DbHandle) -> Result<Vec<SchedulerJob>, SchedulerError> {
    let jobs = db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scheduler_jobs ORDER BY next_run_at_ms ASC").map_err(halo_storage::StoreError::from)?;
        let rows = stmt
            .query_map([], row_to_job)
            .map_err(halo_storage::StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(halo_storage::StoreError::from)?;
        Ok(rows)
    })?;
    Ok(jobs)
}

/// Enabled, non-paused, non-disabled jobs due at or before `now_ms`,
/// ordered by `next_run_at_ms` ascending (spec §4.2 timer loop step 1).
pub fn list_due_jobs(db: &DbHandle, now_ms: i64) -> Result<Vec<SchedulerJob>, SchedulerError> {
    let jobs = db.with_connection(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT * FROM scheduler_jobs
                 WHERE enabled = 1 AND status NOT IN ('paused', 'disabled') AND next_run_at_ms <= ?1
                 ORDER BY next_run_at_ms ASC",
            )
            .map_err(halo_storage::StoreError::from)?;
        let rows = stmt
            .query_map(params![now_ms], row_to_job)
            .map_err(halo_storage::StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(halo_storage::StoreError::from)?;
        Ok(rows)
    })?;
    Ok(jobs)
}

/// Earliest `next_run_at_ms` among runnable jobs, for arming the single-shot timer.
pub fn earliest_next_run(db: &DbHandle) -> Result<Option<i64>, SchedulerError> {
    let v = db.with_connection(|conn| {
        conn.query_row(
            "SELECT MIN(next_run_at_ms) FROM scheduler_jobs WHERE enabled = 1 AND status NOT IN ('paused', 'disabled')",
            [],
            |row| row.get::<_, Option<i64>>(0),
        )
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(v)
}

/// Startup recovery: clear stale `running` markers left by a hard-killed
/// handler (spec §4.2 "Startup recovery").
pub fn clear_stale_running_markers(db: &DbHandle) -> Result<u64, SchedulerError> {
    let n = db.with_connection(|conn| {
        conn.execute(
            "UPDATE scheduler_jobs SET running_at_ms = NULL, status = 'idle' WHERE status = 'running'",
            [],
        )
        .map(|n| n as u64)
        .map_err(halo_storage::StoreError::from)
    })?;
    Ok(n)
}

pub fn append_run_log(db: &DbHandle, entry: &RunLogEntry, retention: u32) -> Result<(), SchedulerError> {
    db.with_connection(|conn| -> Result<(), halo_storage::StoreError> {
        conn.execute(
            "INSERT INTO scheduler_run_log (job_id, started_at, finished_at, duration_ms, outcome, error, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.job_id.as_str(),
                entry.started_at,
                entry.finished_at,
                entry.duration_ms,
                outcome_str(entry.outcome),
                entry.error,
                serde_json::to_string(&entry.metadata).ok(),
            ],
        )
        .map_err(halo_storage::StoreError::from)?;

        // Prune to at most `retention` entries per job (spec §3 "Pruned to <= 1000 entries per job").
        conn.execute(
            "DELETE FROM scheduler_run_log WHERE job_id = ?1 AND id NOT IN (
                SELECT id FROM scheduler_run_log WHERE job_id = ?1 ORDER BY started_at DESC LIMIT ?2
             )",
            params![entry.job_id.as_str(), retention],
        )
        .map_err(halo_storage::StoreError::from)?;
        Ok(())
    })?;
    Ok(())
}

fn outcome_str(o: Outcome) -> &'static str {
    match o {
        Outcome::Useful => "useful",
        Outcome::Noop => "noop",
        Outcome::Error => "error",
        Outcome::Skipped => "skipped",
    }
}

fn parse_outcome(s: &str) -> Outcome {
    match s {
        "useful" => Outcome::Useful,
        "noop" => Outcome::Noop,
        "skipped" => Outcome::Skipped,
        _ => Outcome::Error,
    }
}

pub fn get_run_log(db: &DbHandle, job_id: &SchedulerJobId, limit: u32) -> Result<Vec<RunLogEntry>, SchedulerError> {
    let entries = db.with_connection(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM scheduler_run_log WHERE job_id = ?1 ORDER BY started_at DESC LIMIT ?2")
            .map_err(halo_storage::StoreError::from)?;
        let rows = stmt
            .query_map(params![job_id.as_str(), limit], |row| {
                let metadata_json: Option<String> = row.get("metadata_json")?;
                let outcome: String = row.get("outcome")?;
                let job_id: String = row.get("job_id")?;
                Ok(RunLogEntry {
                    job_id: SchedulerJobId::from_string(job_id),
                    started_at: row.get("started_at")?,
                    finished_at: row.get("finished_at")?,
                    duration_ms: row.get("duration_ms")?,
                    outcome: parse_outcome(&outcome),
                    error: row.get("error")?,
                    metadata: metadata_json.as_deref().and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default(),
                })
            })
            .map_err(halo_storage::StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(halo_storage::StoreError::from)?;
        Ok(rows)
    })?;
    Ok(entries)
}

pub fn get_run_stats(db: &DbHandle, job_id: &SchedulerJobId, since_ms: Option<i64>) -> Result<RunStats, SchedulerError> {
    let entries = db.with_connection(|conn| {
        let since = since_ms.unwrap_or(0);
        let mut stmt = conn
            .prepare("SELECT outcome, duration_ms FROM scheduler_run_log WHERE job_id = ?1 AND started_at >= ?2")
            .map_err(halo_storage::StoreError::from)?;
        let rows = stmt
            .query_map(params![job_id.as_str(), since], |row| {
                let outcome: String = row.get(0)?;
                let duration_ms: i64 = row.get(1)?;
                Ok((outcome, duration_ms))
            })
            .map_err(halo_storage::StoreError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(halo_storage::StoreError::from)?;
        Ok(rows)
    })?;

    let mut stats = RunStats::default();
    let mut total_duration = 0i64;
    for (outcome, duration_ms) in &entries {
        *stats.by_outcome.entry(outcome.clone()).or_insert(0) += 1;
        total_duration += duration_ms;
    }
    stats.total = entries.len() as u32;
    stats.avg_duration_ms = if stats.total > 0 { total_duration as f64 / stats.total as f64 } else { 0.0 };
    Ok(stats)
}
