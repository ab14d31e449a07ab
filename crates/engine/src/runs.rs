// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run execution: concurrency gating, lifecycle, and agent invocation
//! (spec §4.4.2 "Run execution").

use crate::error::EngineError;
use crate::repo;
use halo_adapters::{AgentAdapter, AgentAdapterError, AgentInvocation, ReportAck, ReportCall, ReportKind, ReportSink};
use halo_core::{
    ActivityContent, ActivityEntry, ActivityId, AppId, AppStatus, Clock, DomainError, InstalledApp,
    Run, RunId, RunOutcome, Trigger,
};
use halo_storage::DbHandle;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct PendingRun {
    app: InstalledApp,
    trigger: Trigger,
    session_key: String,
    run_id: RunId,
}

/// Global concurrency semaphore (capacity `G`) plus the per-app "at most
/// one active or queued run" invariant and its FIFO overflow queue
/// (spec §4.4.2 "Concurrency model", §5 "Per-app: runs are totally
/// ordered").
pub struct RunGate<C: Clock, A: AgentAdapter> {
    db: DbHandle,
    clock: C,
    agent: Arc<A>,
    working_root: PathBuf,
    semaphore: Arc<Semaphore>,
    busy_apps: Mutex<HashSet<AppId>>,
    queue: Mutex<VecDeque<PendingRun>>,
}

impl<C: Clock, A: AgentAdapter + 'static> RunGate<C, A> {
    pub fn new(db: DbHandle, clock: C, agent: Arc<A>, working_root: PathBuf, global_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            db,
            clock,
            agent,
            working_root,
            semaphore: Arc::new(Semaphore::new(global_capacity.max(1))),
            busy_apps: Mutex::new(HashSet::new()),
            queue: Mutex::new(VecDeque::new()),
        })
    }

    /// Admission (spec §4.4.2 step 1): validate the app admits runs,
    /// enforce the per-app invariant, persist the run row, then either
    /// acquire a global slot immediately or enqueue FIFO.
    pub fn trigger(self: &Arc<Self>, app: InstalledApp, trigger: Trigger, session_key: String) -> Result<RunId, EngineError> {
        if !app.status.admits_runs() {
            return Err(DomainError::AppNotRunnable(app.id).into());
        }
        {
            let mut busy = self.busy_apps.lock();
            if busy.contains(&app.id) {
                return Err(DomainError::ConcurrencyLimit { per_app: true }.into());
            }
            busy.insert(app.id);
        }

        let run_id = RunId::new();
        let run = Run {
            id: run_id,
            app_id: app.id,
            trigger: trigger.clone(),
            started_at: self.clock.epoch_ms(),
            ended_at: None,
            outcome: None,
            error: None,
            session_key: session_key.clone(),
        };
        if let Err(e) = repo::insert_run(&self.db, &run) {
            self.busy_apps.lock().remove(&app.id);
            return Err(e);
        }

        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => self.spawn_run(app, trigger, session_key, run_id, permit),
            Err(_) => self.queue.lock().push_back(PendingRun { app, trigger, session_key, run_id }),
        }

        Ok(run_id)
    }

    fn spawn_run(self: &Arc<Self>, app: InstalledApp, trigger: Trigger, session_key: String, run_id: RunId, permit: OwnedSemaphorePermit) {
        let gate = self.clone();
        tokio::spawn(async move {
            let working_dir = crate::apps::app_dir(&gate.working_root, &app.id);
            let sink = Arc::new(EngineReportSink {
                db: gate.db.clone(),
                clock: gate.clock.clone(),
                app_id: app.id,
                run_id,
                session_key: session_key.clone(),
            });
            let invocation = AgentInvocation {
                system_prompt: app.spec.get("systemPrompt").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                initial_message: trigger_message(&trigger),
                working_dir,
                env: std::collections::HashMap::new(),
                reports: sink,
                cancel: halo_adapters::agent::tokio_util_lite::CancelToken::new(),
            };

            let result = gate.agent.invoke(invocation).await;
            gate.complete(run_id, app.id, result);
            drop(permit);
            gate.admit_next();
        });
    }

    fn complete(&self, run_id: RunId, app_id: AppId, result: Result<(), AgentAdapterError>) {
        let now = self.clock.epoch_ms();
        let (outcome, error) = match &result {
            Ok(()) => (RunOutcome::Useful, None),
            Err(AgentAdapterError::Cancelled) => (RunOutcome::Error, Some("cancelled".to_string())),
            Err(AgentAdapterError::InvocationFailed(msg)) => (RunOutcome::Error, Some(msg.clone())),
        };
        if let Err(e) = repo::complete_run(&self.db, &run_id, now, outcome, error.as_deref()) {
            tracing::error!(run = %run_id, error = %e, "failed to persist run completion");
        }
        if let Ok(Some(mut app)) = repo::get_app(&self.db, &app_id) {
            app.last_run_at = Some(now);
            app.last_run_outcome = Some(outcome.to_string());
            if let Some(msg) = &error {
                if app.status != AppStatus::WaitingUser && app.status.validate_transition(AppStatus::Error).is_ok() {
                    app.status = AppStatus::Error;
                    app.error_message = Some(msg.clone());
                }
            }
            if let Err(e) = repo::update_app(&self.db, &app) {
                tracing::error!(app = %app_id, error = %e, "failed to persist app after run completion");
            }
        }
        self.busy_apps.lock().remove(&app_id);
    }

    fn admit_next(self: &Arc<Self>) {
        let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else { return };
        let Some(pending) = self.queue.lock().pop_front() else {
            drop(permit);
            return;
        };
        self.spawn_run(pending.app, pending.trigger, pending.session_key, pending.run_id, permit);
    }

    /// Restart recovery (spec §4.4.2 step 6): runs left `ended_at IS
    /// NULL` have no meaningful resume semantics.
    pub fn recover_interrupted_runs(&self) -> Result<u64, EngineError> {
        let now = self.clock.epoch_ms();
        let in_flight = repo::list_in_flight_runs(&self.db)?;
        for run in &in_flight {
            repo::complete_run(&self.db, &run.id, now, RunOutcome::Error, Some("process-interrupted"))?;
        }
        Ok(in_flight.len() as u64)
    }
}

fn trigger_message(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Manual => "manual trigger".to_string(),
        Trigger::Schedule { subscription_id, job_id } => format!("scheduled trigger (subscription={subscription_id}, job={job_id})"),
        Trigger::Event { subscription_id, event_type } => format!("event trigger (subscription={subscription_id}, type={event_type})"),
        Trigger::EscalationResume { entry_id, .. } => format!("resumed after escalation {entry_id}"),
    }
}

/// Bridges the agent's `on_report` calls into durable [`ActivityEntry`]
/// rows (spec §4.4.2 step 4, §6 "Agent invocation contract").
struct EngineReportSink<C: Clock> {
    db: DbHandle,
    clock: C,
    app_id: AppId,
    run_id: RunId,
    session_key: String,
}

#[async_trait::async_trait]
impl<C: Clock> ReportSink for EngineReportSink<C> {
    async fn on_report(&self, call: ReportCall) -> ReportAck {
        let entry_id = ActivityId::new();
        let entry = ActivityEntry {
            id: entry_id,
            app_id: self.app_id,
            run_id: self.run_id,
            kind: map_report_kind(call.kind),
            ts: self.clock.epoch_ms(),
            session_key: self.session_key.clone(),
            content: ActivityContent { summary: call.summary, status: None, data: call.data, question: call.question, choices: call.choices },
            user_response: None,
        };
        if let Err(e) = repo::insert_activity(&self.db, &entry) {
            tracing::error!(app = %self.app_id, error = %e, "failed to persist activity entry");
        }

        let must_end_run = call.kind == ReportKind::Escalation;
        if must_end_run {
            if let Ok(Some(mut app)) = repo::get_app(&self.db, &self.app_id) {
                if app.status.validate_transition(AppStatus::WaitingUser).is_ok() {
                    app.status = AppStatus::WaitingUser;
                    app.pending_escalation_id = Some(entry_id);
                    if let Err(e) = repo::update_app(&self.db, &app) {
                        tracing::error!(app = %self.app_id, error = %e, "failed to persist waiting_user transition");
                    }
                }
            }
        }

        ReportAck { entry_id: entry_id.as_str().to_string(), must_end_run }
    }
}

fn map_report_kind(kind: ReportKind) -> halo_core::ActivityType {
    match kind {
        ReportKind::RunComplete => halo_core::ActivityType::RunComplete,
        ReportKind::RunSkipped => halo_core::ActivityType::RunSkipped,
        ReportKind::Milestone => halo_core::ActivityType::Milestone,
        ReportKind::Escalation => halo_core::ActivityType::Escalation,
        ReportKind::Output => halo_core::ActivityType::Output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_adapters::{FakeAgentAdapter, ScriptedOutcome};
    use halo_core::FakeClock;
    use halo_storage::Store;
    use tempfile::tempdir;

    fn setup() -> (DbHandle, FakeClock, tempfile::TempDir) {
        let store = Store::new();
        let db = store.open_memory().unwrap();
        db.with_connection(|conn| {
            halo_storage::run_migrations(conn, crate::migrations::NAMESPACE, &crate::migrations::migrations(), 0)
        })
        .unwrap();
        (db, FakeClock::new(), tempdir().unwrap())
    }

    fn app(id: AppId) -> InstalledApp {
        InstalledApp {
            id,
            spec_id: format!("s-{id}"),
            space_id: "sp".into(),
            spec: serde_json::json!({}),
            user_config: Default::default(),
            user_overrides: serde_json::json!({}),
            permissions: Default::default(),
            status: AppStatus::Active,
            pending_escalation_id: None,
            installed_at: 0,
            uninstalled_at: None,
            last_run_at: None,
            last_run_outcome: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn second_trigger_for_busy_app_is_rejected() {
        let (db, clock, dir) = setup();
        let agent = Arc::new(FakeAgentAdapter::new());
        let gate = RunGate::new(db.clone(), clock, agent, dir.path().to_path_buf(), 4);
        let a = app(AppId::new());
        repo::insert_app(&db, &a).unwrap();

        gate.trigger(a.clone(), Trigger::Manual, "s1".into()).unwrap();
        let err = gate.trigger(a, Trigger::Manual, "s1".into()).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::ConcurrencyLimit { per_app: true })));
    }

    #[tokio::test]
    async fn successful_run_persists_useful_outcome_and_frees_slot() {
        let (db, clock, dir) = setup();
        let agent = Arc::new(FakeAgentAdapter::new());
        let gate = RunGate::new(db.clone(), clock, agent, dir.path().to_path_buf(), 4);
        let a = app(AppId::new());
        repo::insert_app(&db, &a).unwrap();

        let run_id = gate.trigger(a.clone(), Trigger::Manual, "s1".into()).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let run = repo::get_run(&db, &run_id).unwrap().unwrap();
        assert_eq!(run.outcome, Some(RunOutcome::Useful));
        assert!(run.ended_at.is_some());

        // App is no longer busy, so a second trigger now succeeds.
        gate.trigger(a, Trigger::Manual, "s2".into()).unwrap();
    }

    #[tokio::test]
    async fn queues_beyond_global_capacity_and_drains_fifo() {
        let (db, clock, dir) = setup();
        let agent = Arc::new(FakeAgentAdapter::new());
        let gate = RunGate::new(db.clone(), clock, agent, dir.path().to_path_buf(), 1);
        let a1 = app(AppId::new());
        let a2 = app(AppId::new());
        repo::insert_app(&db, &a1).unwrap();
        repo::insert_app(&db, &a2).unwrap();

        gate.trigger(a1, Trigger::Manual, "s1".into()).unwrap();
        let run2 = gate.trigger(a2, Trigger::Manual, "s2".into()).unwrap();

        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let run = repo::get_run(&db, &run2).unwrap().unwrap();
        assert!(run.ended_at.is_some(), "queued run should eventually drain and complete");
    }

    #[tokio::test]
    async fn escalation_report_moves_app_to_waiting_user() {
        let (db, clock, dir) = setup();
        let agent = Arc::new(FakeAgentAdapter::new());
        agent.script(ScriptedOutcome::Reports(vec![ReportCall {
            kind: ReportKind::Escalation,
            summary: "need input".into(),
            data: None,
            question: Some("continue?".into()),
            choices: Some(vec!["yes".into(), "no".into()]),
        }]));
        let gate = RunGate::new(db.clone(), clock, agent, dir.path().to_path_buf(), 4);
        let a = app(AppId::new());
        repo::insert_app(&db, &a).unwrap();

        gate.trigger(a.clone(), Trigger::Manual, "s1".into()).unwrap();
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let reloaded = repo::get_app(&db, &a.id).unwrap().unwrap();
        assert_eq!(reloaded.status, AppStatus::WaitingUser);
        assert!(reloaded.pending_escalation_id.is_some());
    }

    #[tokio::test]
    async fn interrupted_runs_are_marked_error_on_recovery() {
        let (db, clock, dir) = setup();
        let a = app(AppId::new());
        repo::insert_app(&db, &a).unwrap();
        let run = Run { id: RunId::new(), app_id: a.id, trigger: Trigger::Manual, started_at: 0, ended_at: None, outcome: None, error: None, session_key: "s".into() };
        repo::insert_run(&db, &run).unwrap();

        let agent = Arc::new(FakeAgentAdapter::new());
        let gate = RunGate::new(db.clone(), clock, agent, dir.path().to_path_buf(), 4);
        let recovered = gate.recover_interrupted_runs().unwrap();
        assert_eq!(recovered, 1);

        let reloaded = repo::get_run(&db, &run.id).unwrap().unwrap();
        assert_eq!(reloaded.outcome, Some(RunOutcome::Error));
        assert_eq!(reloaded.error.as_deref(), Some("process-interrupted"));
    }
}
