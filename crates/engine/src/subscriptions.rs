// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activation: registering/tearing down scheduler jobs and event-bus
//! subscriptions when an app's status transitions into/out of `active`
//! (spec §4.4.1 "Activation").
//!
//! The bus (`halo-bus`) exposes a single global filter and a single
//! global sink, not a per-app subscription registry (spec §4.3 "Bus
//! operations"). Activation therefore keeps its own in-memory table of
//! `(app_id, subscription_id, source spec)` and matches inbound events
//! against it from the engine's one bus sink — an interpretation of the
//! "event-bus filter subscription" language needed to reconcile it with
//! the bus's single-sink design (recorded in the grounding ledger).

use halo_core::event::metadata_keys;
use halo_core::{AppId, Clock, DomainError, HaloEvent, Schedule};
use halo_scheduler::{AddJobInput, Scheduler, SchedulerError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// One activated subscription: which app/subscription it belongs to and
/// the `source` object from its spec (`spec.subscriptions[].source`).
#[derive(Debug, Clone)]
pub struct Subscription {
    pub app_id: AppId,
    pub subscription_id: String,
    pub source: serde_json::Value,
}

impl Subscription {
    fn source_type(&self) -> &str {
        self.source.get("type").and_then(|v| v.as_str()).unwrap_or("")
    }

    /// Best-effort match of a bus event against this subscription's
    /// source descriptor. `file`/`webhook` sources can additionally
    /// narrow by `pattern`/`path`; everything else matches on event kind
    /// alone since no concrete adapter for `webpage`/`rss`/`custom`
    /// ships in this crate (spec §4.4.1 Non-goals).
    fn matches(&self, event: &HaloEvent) -> bool {
        match self.source_type() {
            "file" => {
                if !event.kind.starts_with("file.") {
                    return false;
                }
                match (self.source.get("pattern").and_then(|v| v.as_str()), event.payload.get("file_path").and_then(|v| v.as_str())) {
                    (Some(pattern), Some(path)) => path.contains(pattern),
                    _ => true,
                }
            }
            "webhook" => {
                if event.kind != "webhook.received" {
                    return false;
                }
                match (self.source.get("path").and_then(|v| v.as_str()), event.payload.get("path").and_then(|v| v.as_str())) {
                    (Some(want), Some(got)) => want == got,
                    _ => true,
                }
            }
            "webpage" | "rss" | "custom" => {
                self.source.get("event_type").and_then(|v| v.as_str()).map(|t| t == event.kind).unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// In-memory registry of activated subscriptions, keyed by `(app_id,
/// subscription_id)` for fast teardown.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<(AppId, String), Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sub: Subscription) {
        self.entries.write().insert((sub.app_id, sub.subscription_id.clone()), sub);
    }

    pub fn unregister_app(&self, app_id: &AppId) {
        self.entries.write().retain(|(id, _), _| id != app_id);
    }

    /// Apps whose non-schedule subscription matches `event`, paired with
    /// the subscription id that matched (spec §4.4.1's `{app_id,
    /// subscription_id}` metadata, carried here instead of through the
    /// bus since these events have no such metadata attached).
    pub fn matching(&self, event: &HaloEvent) -> Vec<(AppId, String)> {
        self.entries
            .read()
            .values()
            .filter(|sub| sub.matches(event))
            .map(|sub| (sub.app_id, sub.subscription_id.clone()))
            .collect()
    }
}

/// Register one scheduler job per `source.type == "schedule"` entry and
/// one bus subscription per `file|webhook|webpage|rss|custom` entry
/// (spec §4.4.1 "Activation").
pub fn activate<C: Clock>(
    scheduler: &Scheduler<C>,
    registry: &SubscriptionRegistry,
    app_id: &AppId,
    subscriptions: &[serde_json::Value],
) -> Result<(), SchedulerError> {
    for sub in subscriptions {
        let subscription_id = sub.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let source = sub.get("source").cloned().unwrap_or(serde_json::Value::Null);
        let source_type = source.get("type").and_then(|v| v.as_str()).unwrap_or("");

        if source_type == "schedule" {
            let schedule = parse_schedule(&source)?;
            let mut metadata = HashMap::new();
            metadata.insert(metadata_keys::APP_ID.to_string(), app_id.as_str().to_string());
            metadata.insert(metadata_keys::SUBSCRIPTION_ID.to_string(), subscription_id);
            scheduler.add_job(AddJobInput {
                name: format!("app:{}:{}", app_id.as_str(), sub.get("id").and_then(|v| v.as_str()).unwrap_or("schedule")),
                schedule,
                metadata,
                enabled: true,
            })?;
        } else {
            registry.register(Subscription { app_id: *app_id, subscription_id, source });
        }
    }
    Ok(())
}

/// Tear down everything `activate` registered for `app_id` (spec §4.4.1
/// "When `status` leaves `active`, these are torn down").
pub fn deactivate<C: Clock>(scheduler: &Scheduler<C>, registry: &SubscriptionRegistry, app_id: &AppId) -> Result<(), SchedulerError> {
    registry.unregister_app(app_id);
    let jobs = scheduler.list_jobs(None)?;
    for job in jobs {
        if job.metadata.get(metadata_keys::APP_ID).map(|s| s.as_str()) == Some(app_id.as_str()) {
            scheduler.remove_job(&job.id)?;
        }
    }
    Ok(())
}

fn parse_schedule(source: &serde_json::Value) -> Result<Schedule, SchedulerError> {
    if let Some(every) = source.get("every").and_then(|v| v.as_str()) {
        let ms = halo_scheduler::parse_duration(every)?;
        return Ok(Schedule::Every { interval_ms: ms });
    }
    if let Some(cron) = source.get("cron").and_then(|v| v.as_str()) {
        let tz = source.get("tz").and_then(|v| v.as_str()).map(str::to_string);
        return Ok(Schedule::Cron { expr: cron.to_string(), tz });
    }
    Err(DomainError::InvalidCron { expr: source.to_string(), reason: "missing every/cron field".into() }.into())
}
