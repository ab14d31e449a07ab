// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistent timer loop and public job CRUD (spec §4.2).

use crate::error::SchedulerError;
use crate::next::compute_next;
use crate::{migrations, repo};
use halo_core::schedule::{Outcome, RunLogEntry, RunStats};
use halo_core::{Clock, DomainError, JobStatus, Schedule, SchedulerJob, SchedulerJobId};
use halo_storage::{run_migrations, DbHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const MAX_CONSECUTIVE_ERRORS: u32 = 5;
const MIN_ARM_MS: u64 = 50;
const MAX_ARM_MS: u64 = 60_000;
const DEFAULT_RUN_LOG_RETENTION: u32 = 1000;

/// A snapshot of a due job, handed to the registered handler.
#[derive(Debug, Clone)]
pub struct DueJob {
    pub id: SchedulerJobId,
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub scheduled_at: i64,
}

/// Result a handler reports back for a single firing.
#[derive(Debug, Clone)]
pub struct HandlerResult {
    pub outcome: Outcome,
    pub error: Option<String>,
    pub metadata: HashMap<String, String>,
}

pub type JobHandler =
    Arc<dyn Fn(DueJob) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync>;

/// Input to [`Scheduler::add_job`].
pub struct AddJobInput {
    pub name: String,
    pub schedule: Schedule,
    pub metadata: HashMap<String, String>,
    pub enabled: bool,
}

/// Partial update applied by [`Scheduler::update_job`].
#[derive(Default)]
pub struct JobPatch {
    pub name: Option<String>,
    pub schedule: Option<Schedule>,
    pub metadata: Option<HashMap<String, String>>,
}

pub struct JobFilter {
    pub status: Option<JobStatus>,
}

struct Shared<C: Clock> {
    db: DbHandle,
    clock: C,
    handler: Mutex<Option<JobHandler>>,
    run_log_retention: u32,
    max_consecutive_errors: u32,
    running: AtomicBool,
    notify: Notify,
}

/// The persistent timer engine (spec §4.2). Single timer loop, one
/// handler slot, synchronous persistence for every job mutation.
pub struct Scheduler<C: Clock> {
    shared: Arc<Shared<C>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> Scheduler<C> {
    /// Opens (and migrates) the scheduler's namespace in `db`.
    pub fn new(db: DbHandle, clock: C) -> Result<Self, SchedulerError> {
        Self::with_run_log_retention(db, clock, DEFAULT_RUN_LOG_RETENTION)
    }

    pub fn with_run_log_retention(
        db: DbHandle,
        clock: C,
        run_log_retention: u32,
    ) -> Result<Self, SchedulerError> {
        Self::with_config(db, clock, run_log_retention, MAX_CONSECUTIVE_ERRORS)
    }

    /// Like [`Scheduler::with_run_log_retention`], but also lets the
    /// caller override how many consecutive errors a job tolerates
    /// before it's auto-disabled (spec §4.2 "consecutive-error
    /// auto-disable").
    pub fn with_config(
        db: DbHandle,
        clock: C,
        run_log_retention: u32,
        max_consecutive_errors: u32,
    ) -> Result<Self, SchedulerError> {
        db.with_connection(|conn| {
            run_migrations(conn, migrations::NAMESPACE, &migrations::migrations(), clock.epoch_ms())
        })?;

        let cleared = repo::clear_stale_running_markers(&db)?;
        if cleared > 0 {
            tracing::warn!(count = cleared, "cleared stale running markers on startup");
        }

        Ok(Self {
            shared: Arc::new(Shared {
                db,
                clock,
                handler: Mutex::new(None),
                run_log_retention,
                max_consecutive_errors,
                running: AtomicBool::new(false),
                notify: Notify::new(),
            }),
            loop_handle: Mutex::new(None),
        })
    }

    /// Single-slot handler registration (spec §4.2 `on_job_due`).
    pub fn on_job_due(&self, handler: JobHandler) {
        *self.shared.handler.lock() = Some(handler);
    }

    pub fn add_job(&self, input: AddJobInput) -> Result<SchedulerJobId, SchedulerError> {
        let now = self.shared.clock.epoch_ms();
        let next_run_at_ms = compute_next(&input.schedule, now, now)?
            .ok_or_else(|| SchedulerError::NoInitialFireTime(input.name.clone()))?;

        let job = SchedulerJob {
            id: SchedulerJobId::new(),
            name: input.name,
            metadata: input.metadata,
            schedule: input.schedule,
            enabled: input.enabled,
            anchor_ms: now,
            next_run_at_ms,
            last_run_at_ms: None,
            running_at_ms: None,
            consecutive_errors: 0,
            status: if input.enabled { JobStatus::Idle } else { JobStatus::Disabled },
            created_at: now,
            updated_at: now,
        };
        repo::insert_job(&self.shared.db, &job)?;
        self.rearm();
        Ok(job.id)
    }

    pub fn remove_job(&self, id: &SchedulerJobId) -> Result<(), SchedulerError> {
        self.get_job_or_err(id)?;
        repo::delete_job(&self.shared.db, id)?;
        self.rearm();
        Ok(())
    }

    pub fn update_job(&self, id: &SchedulerJobId, patch: JobPatch) -> Result<SchedulerJob, SchedulerError> {
        let mut job = self.get_job_or_err(id)?;
        if let Some(name) = patch.name {
            job.name = name;
        }
        if let Some(metadata) = patch.metadata {
            job.metadata = metadata;
        }
        if let Some(schedule) = patch.schedule {
            let now = self.shared.clock.epoch_ms();
            job.anchor_ms = now;
            job.next_run_at_ms = compute_next(&schedule, now, now)?
                .ok_or_else(|| SchedulerError::NoInitialFireTime(job.name.clone()))?;
            job.schedule = schedule;
        }
        job.updated_at = self.shared.clock.epoch_ms();
        repo::update_job(&self.shared.db, &job)?;
        self.rearm();
        Ok(job)
    }

    pub fn pause_job(&self, id: &SchedulerJobId) -> Result<(), SchedulerError> {
        let mut job = self.get_job_or_err(id)?;
        job.enabled = false;
        job.status = JobStatus::Paused;
        job.updated_at = self.shared.clock.epoch_ms();
        repo::update_job(&self.shared.db, &job)?;
        self.rearm();
        Ok(())
    }

    pub fn resume_job(&self, id: &SchedulerJobId) -> Result<(), SchedulerError> {
        let mut job = self.get_job_or_err(id)?;
        let now = self.shared.clock.epoch_ms();
        job.enabled = true;
        job.status = JobStatus::Idle;
        job.consecutive_errors = 0;
        job.next_run_at_ms = compute_next(&job.schedule, job.anchor_ms, now)?
            .ok_or_else(|| SchedulerError::NoInitialFireTime(job.name.clone()))?;
        job.updated_at = now;
        repo::update_job(&self.shared.db, &job)?;
        self.rearm();
        Ok(())
    }

    pub fn get_job(&self, id: &SchedulerJobId) -> Result<SchedulerJob, SchedulerError> {
        self.get_job_or_err(id)
    }

    fn get_job_or_err(&self, id: &SchedulerJobId) -> Result<SchedulerJob, SchedulerError> {
        repo::get_job(&self.shared.db, id)?.ok_or_else(|| DomainError::JobNotFound(*id).into())
    }

    pub fn list_jobs(&self, filter: Option<JobFilter>) -> Result<Vec<SchedulerJob>, SchedulerError> {
        let jobs = repo::list_jobs(&self.shared.db)?;
        Ok(match filter.and_then(|f| f.status) {
            Some(status) => jobs.into_iter().filter(|j| j.status == status).collect(),
            None => jobs,
        })
    }

    pub fn get_run_log(&self, job_id: &SchedulerJobId, limit: Option<u32>) -> Result<Vec<RunLogEntry>, SchedulerError> {
        repo::get_run_log(&self.shared.db, job_id, limit.unwrap_or(50))
    }

    pub fn get_run_stats(&self, job_id: &SchedulerJobId, since_ms: Option<i64>) -> Result<RunStats, SchedulerError> {
        repo::get_run_stats(&self.shared.db, job_id, since_ms)
    }

    /// Cancels and re-arms the timer against the earliest runnable
    /// `next_run_at_ms` (spec §4.2 step 5). Cheap: just wakes the loop,
    /// which recomputes the sleep deadline itself.
    pub fn rearm(&self) {
        self.shared.notify.notify_one();
    }

    pub fn start(self: &Arc<Self>) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move { run_loop(shared).await });
        *self.loop_handle.lock() = Some(handle);
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.notify.notify_one();
        if let Some(handle) = self.loop_handle.lock().take() {
            handle.abort();
        }
    }
}

async fn run_loop<C: Clock>(shared: Arc<Shared<C>>) {
    while shared.running.load(Ordering::SeqCst) {
        let now = shared.clock.epoch_ms();
        match repo::list_due_jobs(&shared.db, now) {
            Ok(due) => {
                for job in due {
                    dispatch_job(&shared, job, now);
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to scan due jobs"),
        }

        let sleep_ms = next_arm_delay(&shared, now);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {}
            _ = shared.notify.notified() => {}
        }
    }
}

fn next_arm_delay<C: Clock>(shared: &Shared<C>, now: i64) -> u64 {
    match repo::earliest_next_run(&shared.db) {
        Ok(Some(next)) => (next - now).clamp(MIN_ARM_MS as i64, MAX_ARM_MS as i64) as u64,
        Ok(None) => MAX_ARM_MS,
        Err(_) => MIN_ARM_MS,
    }
}

fn dispatch_job<C: Clock>(shared: &Arc<Shared<C>>, mut job: SchedulerJob, now: i64) {
    if job.status == JobStatus::Running {
        return;
    }
    let handler = match shared.handler.lock().clone() {
        Some(h) => h,
        None => return,
    };

    job.status = JobStatus::Running;
    job.running_at_ms = Some(now);
    match compute_next(&job.schedule, job.anchor_ms, now) {
        Ok(Some(next)) => job.next_run_at_ms = next,
        Ok(None) => job.next_run_at_ms = i64::MAX, // one-shot already fired; won't be selected again.
        Err(e) => {
            tracing::error!(job = %job.id, error = %e, "failed to recompute next_run_at_ms");
            return;
        }
    }
    job.updated_at = now;
    if let Err(e) = repo::update_job(&shared.db, &job) {
        tracing::error!(job = %job.id, error = %e, "failed to persist running state");
        return;
    }

    let shared = shared.clone();
    let due = DueJob {
        id: job.id,
        name: job.name.clone(),
        metadata: job.metadata.clone(),
        scheduled_at: now,
    };
    tokio::spawn(async move {
        let started_at = shared.clock.epoch_ms();
        let result = handler(due).await;
        let finished_at = shared.clock.epoch_ms();
        complete_job(&shared, job, started_at, finished_at, result);
    });
}

fn complete_job<C: Clock>(shared: &Shared<C>, mut job: SchedulerJob, started_at: i64, finished_at: i64, result: HandlerResult) {
    let entry = RunLogEntry {
        job_id: job.id,
        started_at,
        finished_at,
        duration_ms: finished_at - started_at,
        outcome: result.outcome,
        error: result.error,
        metadata: result.metadata,
    };
    if let Err(e) = repo::append_run_log(&shared.db, &entry, shared.run_log_retention) {
        tracing::error!(job = %job.id, error = %e, "failed to append run log entry");
    }

    job.last_run_at_ms = Some(finished_at);
    job.running_at_ms = None;
    job.status = JobStatus::Idle;
    job.updated_at = finished_at;

    if result.outcome == Outcome::Error {
        job.consecutive_errors += 1;
        if job.consecutive_errors >= shared.max_consecutive_errors {
            job.status = JobStatus::Disabled;
            job.enabled = false;
            tracing::warn!(job = %job.id, "job disabled after consecutive errors");
        }
    } else {
        job.consecutive_errors = 0;
    }

    if let Err(e) = repo::update_job(&shared.db, &job) {
        tracing::error!(job = %job.id, error = %e, "failed to persist completed job state");
    }
    shared.notify.notify_one();
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::FakeClock;
    use halo_storage::Store;
    use std::sync::atomic::AtomicU32;

    fn test_scheduler() -> (Arc<Scheduler<FakeClock>>, FakeClock) {
        let store = Store::new();
        let db = store.open_memory().unwrap();
        let clock = FakeClock::new();
        let scheduler = Arc::new(Scheduler::new(db, clock.clone()).unwrap());
        (scheduler, clock)
    }

    #[test]
    fn add_job_computes_initial_next_run() {
        let (scheduler, _clock) = test_scheduler();
        let id = scheduler
            .add_job(AddJobInput {
                name: "test".into(),
                schedule: Schedule::Every { interval_ms: 60_000 },
                metadata: HashMap::new(),
                enabled: true,
            })
            .unwrap();
        let job = scheduler.get_job(&id).unwrap();
        assert!(job.next_run_at_ms > job.anchor_ms);
        assert_eq!(job.status, JobStatus::Idle);
    }

    #[test]
    fn pause_then_resume_resets_consecutive_errors() {
        let (scheduler, _clock) = test_scheduler();
        let id = scheduler
            .add_job(AddJobInput {
                name: "test".into(),
                schedule: Schedule::Every { interval_ms: 60_000 },
                metadata: HashMap::new(),
                enabled: true,
            })
            .unwrap();
        scheduler.pause_job(&id).unwrap();
        assert_eq!(scheduler.get_job(&id).unwrap().status, JobStatus::Paused);
        scheduler.resume_job(&id).unwrap();
        let job = scheduler.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Idle);
        assert_eq!(job.consecutive_errors, 0);
    }

    #[test]
    fn missing_job_operations_error() {
        let (scheduler, _clock) = test_scheduler();
        let bogus = SchedulerJobId::new();
        assert!(scheduler.pause_job(&bogus).is_err());
        assert!(scheduler.resume_job(&bogus).is_err());
        assert!(scheduler.remove_job(&bogus).is_err());
    }

    #[tokio::test]
    async fn due_job_fires_handler_and_records_outcome() {
        let (scheduler, clock) = test_scheduler();
        let id = scheduler
            .add_job(AddJobInput {
                name: "test".into(),
                schedule: Schedule::Every { interval_ms: 1_000 },
                metadata: HashMap::new(),
                enabled: true,
            })
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        scheduler.on_job_due(Arc::new(move |_due| {
            let calls = calls_clone.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                HandlerResult { outcome: Outcome::Useful, error: None, metadata: HashMap::new() }
            })
        }));

        clock.advance_ms(2_000);
        let now = clock.epoch_ms();
        let due = repo::list_due_jobs(&scheduler.shared.db, now).unwrap();
        assert_eq!(due.len(), 1);
        dispatch_job(&scheduler.shared, due[0].clone(), now);

        // Let the spawned completion task run.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let job = scheduler.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Idle);
        assert_eq!(job.consecutive_errors, 0);
        assert!(job.last_run_at_ms.is_some());
    }

    #[tokio::test]
    async fn five_consecutive_errors_disables_job() {
        let (scheduler, clock) = test_scheduler();
        let id = scheduler
            .add_job(AddJobInput {
                name: "flaky".into(),
                schedule: Schedule::Every { interval_ms: 1_000 },
                metadata: HashMap::new(),
                enabled: true,
            })
            .unwrap();
        scheduler.on_job_due(Arc::new(|_due| {
            Box::pin(async move {
                HandlerResult { outcome: Outcome::Error, error: Some("boom".into()), metadata: HashMap::new() }
            })
        }));

        for _ in 0..5 {
            clock.advance_ms(1_000);
            let now = clock.epoch_ms();
            let job = scheduler.get_job(&id).unwrap();
            dispatch_job(&scheduler.shared, job, now);
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let job = scheduler.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Disabled);
        assert!(!job.enabled);
        assert_eq!(job.consecutive_errors, 5);
    }
}
