// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler data model (spec §3 "Schedule", "SchedulerJob", "RunLogEntry").

use crate::ids::SchedulerJobId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A job's firing rule. Carried inside [`SchedulerJob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Every { interval_ms: u64 },
    Cron { expr: String, tz: Option<String> },
    Once { at_ms: i64 },
}

/// Lifecycle status of a [`SchedulerJob`] (spec §3 invariants a-c).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Paused,
    Disabled,
}

crate::simple_display! {
    JobStatus {
        Idle => "idle",
        Running => "running",
        Paused => "paused",
        Disabled => "disabled",
    }
}

/// A persistent scheduler job (spec §3 "SchedulerJob").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerJob {
    pub id: SchedulerJobId,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    pub schedule: Schedule,
    pub enabled: bool,

    pub anchor_ms: i64,
    pub next_run_at_ms: i64,
    pub last_run_at_ms: Option<i64>,
    pub running_at_ms: Option<i64>,
    pub consecutive_errors: u32,
    pub status: JobStatus,

    pub created_at: i64,
    pub updated_at: i64,
}

impl SchedulerJob {
    /// Invariant (a): when `status=running`, `running_at_ms` must be non-null.
    pub fn invariants_hold(&self) -> bool {
        if self.status == JobStatus::Running && self.running_at_ms.is_none() {
            return false;
        }
        if !self.enabled && !matches!(self.status, JobStatus::Paused | JobStatus::Disabled) {
            return false;
        }
        true
    }
}

/// Outcome of a single job run (spec §3 "RunLogEntry").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Useful,
    Noop,
    Error,
    Skipped,
}

crate::simple_display! {
    Outcome {
        Useful => "useful",
        Noop => "noop",
        Error => "error",
        Skipped => "skipped",
    }
}

/// Append-only run-log record for a single job firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub job_id: SchedulerJobId,
    pub started_at: i64,
    pub finished_at: i64,
    pub duration_ms: i64,
    pub outcome: Outcome,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Aggregated statistics over a job's run log, grouped since some cutoff.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total: u32,
    pub by_outcome: HashMap<String, u32>,
    pub avg_duration_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_without_running_at_violates_invariant() {
        let job = SchedulerJob {
            id: SchedulerJobId::new(),
            name: "test".into(),
            metadata: HashMap::new(),
            schedule: Schedule::Every { interval_ms: 60_000 },
            enabled: true,
            anchor_ms: 0,
            next_run_at_ms: 1,
            last_run_at_ms: None,
            running_at_ms: None,
            consecutive_errors: 0,
            status: JobStatus::Running,
            created_at: 0,
            updated_at: 0,
        };
        assert!(!job.invariants_hold());
    }

    #[test]
    fn disabled_enabled_flag_requires_paused_or_disabled_status() {
        let mut job = SchedulerJob {
            id: SchedulerJobId::new(),
            name: "test".into(),
            metadata: HashMap::new(),
            schedule: Schedule::Once { at_ms: 10 },
            enabled: false,
            anchor_ms: 0,
            next_run_at_ms: 10,
            last_run_at_ms: None,
            running_at_ms: None,
            consecutive_errors: 0,
            status: JobStatus::Idle,
            created_at: 0,
            updated_at: 0,
        };
        assert!(!job.invariants_hold());
        job.status = JobStatus::Paused;
        assert!(job.invariants_hold());
    }
}
