// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: wires the store, scheduler, bus, run gate, and
//! resource registries together into the public run-engine API (spec
//! §4.4 "Run Engine").

use crate::apps::{self, InstallInput};
use crate::error::EngineError;
use crate::escalation::{self, EscalationResponse};
use crate::repo;
use crate::resources::{KeepAliveRegistry, SharedResourceQueue, DEFAULT_KEEP_ALIVE_TTL_MS};
use crate::runs::RunGate;
use crate::subscriptions::{self, SubscriptionRegistry};
use halo_adapters::AgentAdapter;
use halo_bus::{Bus, DedupCache};
use halo_core::event::metadata_keys;
use halo_core::schedule::Outcome as SchedulerOutcome;
use halo_core::{ActivityEntry, ActivityId, AppId, AppStatus, Clock, DomainError, HaloEvent, InstalledApp, RunId, Trigger};
use halo_scheduler::{DueJob, HandlerResult, Scheduler};
use halo_storage::DbHandle;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub struct EngineConfig {
    pub space_root: PathBuf,
    pub global_concurrency: usize,
    pub keep_alive_ttl_ms: i64,
    pub run_log_retention: u32,
    pub max_consecutive_errors: u32,
    pub dedup_capacity: usize,
    pub dedup_ttl_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            space_root: PathBuf::from("."),
            global_concurrency: 4,
            keep_alive_ttl_ms: DEFAULT_KEEP_ALIVE_TTL_MS,
            run_log_retention: 1_000,
            // Mirrors halo_scheduler::timer's own default; no public
            // constant to reference since it's meant to be overridden
            // per engine rather than shared process-wide.
            max_consecutive_errors: 5,
            dedup_capacity: halo_bus::DEFAULT_DEDUP_CAPACITY,
            dedup_ttl_ms: halo_bus::DEFAULT_DEDUP_TTL_MS,
        }
    }
}

/// Top-level composition: everything needed to run apps end to end
/// (install, activate, schedule/event triggers, escalation, keep-alive).
pub struct Engine<C: Clock, A: AgentAdapter + 'static> {
    db: DbHandle,
    clock: C,
    space_root: PathBuf,
    scheduler: Arc<Scheduler<C>>,
    bus: Arc<Bus<C>>,
    run_gate: Arc<RunGate<C, A>>,
    subscriptions: Arc<SubscriptionRegistry>,
    keep_alive: Arc<KeepAliveRegistry<C>>,
    shared_resource: Arc<SharedResourceQueue>,
}

impl<C: Clock, A: AgentAdapter + 'static> Engine<C, A> {
    /// Opens (and migrates) the engine's namespace, then wires the
    /// scheduler job handler and bus sink that turn due jobs and
    /// matching events into runs.
    pub fn new(db: DbHandle, clock: C, agent: Arc<A>, config: EngineConfig) -> Result<Arc<Self>, EngineError> {
        db.with_connection(|conn| {
            halo_storage::run_migrations(conn, crate::migrations::NAMESPACE, &crate::migrations::migrations(), clock.epoch_ms())
        })?;

        let scheduler = Arc::new(Scheduler::with_config(
            db.clone(),
            clock.clone(),
            config.run_log_retention,
            config.max_consecutive_errors,
        )?);
        let bus = Bus::with_dedup(clock.clone(), DedupCache::new(config.dedup_capacity, config.dedup_ttl_ms));
        let run_gate = RunGate::new(db.clone(), clock.clone(), agent, config.space_root.clone(), config.global_concurrency);
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let keep_alive = KeepAliveRegistry::with_ttl(clock.clone(), config.keep_alive_ttl_ms);

        let engine = Arc::new(Self {
            db,
            clock,
            space_root: config.space_root,
            scheduler,
            bus,
            run_gate,
            subscriptions,
            keep_alive,
            shared_resource: Arc::new(SharedResourceQueue::new()),
        });

        engine.wire_scheduler_handler();
        engine.wire_bus_sink();
        Ok(engine)
    }

    fn wire_scheduler_handler(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        self.scheduler.on_job_due(Arc::new(move |due: DueJob| {
            let engine = Arc::clone(&engine);
            Box::pin(async move { engine.handle_due_job(due) })
        }));
    }

    fn handle_due_job(&self, due: DueJob) -> HandlerResult {
        let subscription_id = due.metadata.get(metadata_keys::SUBSCRIPTION_ID).cloned().unwrap_or_default();
        let Some(app_id) = due.metadata.get(metadata_keys::APP_ID).map(AppId::from_string) else {
            return HandlerResult { outcome: SchedulerOutcome::Error, error: Some("missing app_id metadata".into()), metadata: HashMap::new() };
        };

        let app = match repo::get_app(&self.db, &app_id) {
            Ok(Some(app)) if app.status.admits_runs() => app,
            Ok(_) => {
                return HandlerResult { outcome: SchedulerOutcome::Skipped, error: None, metadata: HashMap::new() };
            }
            Err(e) => {
                return HandlerResult { outcome: SchedulerOutcome::Error, error: Some(e.to_string()), metadata: HashMap::new() };
            }
        };

        let trigger = Trigger::Schedule { subscription_id, job_id: due.id.to_string() };
        match self.run_gate.trigger(app, trigger, new_session_key()) {
            Ok(_) => HandlerResult { outcome: SchedulerOutcome::Useful, error: None, metadata: HashMap::new() },
            Err(EngineError::Domain(DomainError::ConcurrencyLimit { .. })) => {
                HandlerResult { outcome: SchedulerOutcome::Skipped, error: None, metadata: HashMap::new() }
            }
            Err(e) => HandlerResult { outcome: SchedulerOutcome::Error, error: Some(e.to_string()), metadata: HashMap::new() },
        }
    }

    fn wire_bus_sink(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        self.bus.set_sink(Arc::new(move |event: HaloEvent| {
            engine.handle_bus_event(&event);
            Ok(())
        }));
    }

    fn handle_bus_event(&self, event: &HaloEvent) {
        for (app_id, subscription_id) in self.subscriptions.matching(event) {
            let app = match repo::get_app(&self.db, &app_id) {
                Ok(Some(app)) if app.status.admits_runs() => app,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!(app = %app_id, error = %e, "failed to load app for event dispatch");
                    continue;
                }
            };
            let trigger = Trigger::Event { subscription_id, event_type: event.kind.clone() };
            if let Err(e) = self.run_gate.trigger(app, trigger, new_session_key()) {
                tracing::warn!(app = %app_id, error = %e, "event-triggered run not admitted");
            }
        }
    }

    /// Registers an external bus source (e.g. the daemon's webhook mount)
    /// before [`Engine::start`] arms the bus.
    pub fn register_source(self: &Arc<Self>, source: Arc<dyn halo_bus::Source>) -> Result<(), EngineError> {
        self.bus.register_source(source)?;
        Ok(())
    }

    pub fn start(&self) -> Result<u64, EngineError> {
        let recovered = self.run_gate.recover_interrupted_runs()?;
        self.scheduler.start();
        self.bus.start();
        Ok(recovered)
    }

    pub fn stop(&self) {
        self.bus.stop();
        self.scheduler.stop();
    }

    pub fn install_app(&self, input: InstallInput) -> Result<InstalledApp, EngineError> {
        let app = apps::install_app(&self.db, &self.clock, &self.space_root, input)?;
        self.activate(&app)?;
        Ok(app)
    }

    pub fn uninstall_app(&self, id: &AppId) -> Result<InstalledApp, EngineError> {
        let app = apps::uninstall_app(&self.db, &self.clock, id)?;
        self.deactivate(id)?;
        Ok(app)
    }

    pub fn reinstall_app(&self, id: &AppId) -> Result<InstalledApp, EngineError> {
        let app = apps::reinstall_app(&self.db, id)?;
        self.activate(&app)?;
        Ok(app)
    }

    pub fn delete_app(&self, id: &AppId) -> Result<(), EngineError> {
        apps::delete_app(&self.db, &self.space_root, id)
    }

    fn activate(&self, app: &InstalledApp) -> Result<(), EngineError> {
        let subs = app.spec.get("subscriptions").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        subscriptions::activate(&self.scheduler, &self.subscriptions, &app.id, &subs)?;
        Ok(())
    }

    fn deactivate(&self, app_id: &AppId) -> Result<(), EngineError> {
        subscriptions::deactivate(&self.scheduler, &self.subscriptions, app_id)?;
        Ok(())
    }

    pub fn trigger_run(&self, app_id: &AppId) -> Result<RunId, EngineError> {
        let app = repo::get_app(&self.db, app_id)?.ok_or(DomainError::AppNotFound(*app_id))?;
        self.run_gate.trigger(app, Trigger::Manual, new_session_key())
    }

    pub fn respond_to_escalation(&self, app_id: &AppId, entry_id: &ActivityId, response: EscalationResponse) -> Result<RunId, EngineError> {
        escalation::respond_to_escalation(&self.db, &self.clock, &self.run_gate, app_id, entry_id, response)
    }

    /// Reaps escalations past their timeout. `default_timeout_ms` applies
    /// to apps whose spec doesn't set its own `escalation.timeout_hours`
    /// (spec §9 Open Questions).
    pub fn reap_escalation_timeouts(&self, default_timeout_ms: i64) -> Result<u64, EngineError> {
        escalation::reap_escalation_timeouts(&self.db, &self.clock, default_timeout_ms)
    }

    /// Activity feed, newest-first (spec §4.4.2 "default limit 30").
    pub fn list_activity(&self, app_id: &AppId, limit: u32, since_ms: Option<i64>) -> Result<Vec<ActivityEntry>, EngineError> {
        repo::list_activity(&self.db, app_id, limit, since_ms)
    }

    pub fn register_keep_alive(&self, reason: impl Into<String>) -> crate::resources::DisposeFn {
        self.keep_alive.register_keep_alive(reason)
    }

    pub fn should_keep_alive(&self) -> bool {
        self.keep_alive.should_keep_alive()
    }

    pub async fn acquire_shared_resource(&self) -> crate::resources::SharedResourceGuard<'_> {
        self.shared_resource.acquire().await
    }
}

fn new_session_key() -> String {
    RunId::new().as_str().to_string()
}
