// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Escalation / resume protocol and timeout reaping (spec §4.4.2
//! "Escalation / resume", §5 "Cancellation & timeouts").

use crate::error::EngineError;
use crate::repo;
use crate::runs::RunGate;
use halo_adapters::AgentAdapter;
use halo_core::{
    ActivityContent, ActivityEntry, ActivityId, ActivityType, AppId, AppStatus, Clock, DomainError, InstalledApp, RunOutcome, Trigger,
    UserResponse,
};
use halo_storage::DbHandle;
use std::sync::Arc;

pub const DEFAULT_ESCALATION_TIMEOUT_MS: i64 = 24 * 60 * 60 * 1_000;

pub struct EscalationResponse {
    pub choice: Option<String>,
    pub text: Option<String>,
}

/// `respond_to_escalation` (spec §4.4.2): validates the entry, fills its
/// `user_response`, moves the app back to `active`, and enqueues a
/// follow-up run sharing the original run's `session_key`.
pub fn respond_to_escalation<C: Clock, A: AgentAdapter + 'static>(
    db: &DbHandle,
    clock: &C,
    gate: &Arc<RunGate<C, A>>,
    app_id: &AppId,
    entry_id: &ActivityId,
    response: EscalationResponse,
) -> Result<halo_core::RunId, EngineError> {
    let entry = repo::get_activity(db, entry_id)?.ok_or(DomainError::EscalationNotFound(*entry_id))?;
    if entry.app_id != *app_id || !entry.is_unanswered_escalation() {
        return Err(DomainError::EscalationNotFound(*entry_id).into());
    }

    let now = clock.epoch_ms();
    let user_response = UserResponse { ts: now, choice: response.choice, text: response.text };
    repo::update_activity_response(db, entry_id, &user_response)?;

    let mut app = repo::get_app(db, app_id)?.ok_or(DomainError::AppNotFound(*app_id))?;
    app.status.validate_transition(AppStatus::Active)?;
    app.status = AppStatus::Active;
    app.pending_escalation_id = None;
    app.error_message = None;
    repo::update_app(db, &app)?;

    let original_run = repo::get_run(db, &entry.run_id)?;
    let session_key = original_run.map(|r| r.session_key).unwrap_or(entry.session_key);

    let trigger = Trigger::EscalationResume { entry_id: *entry_id, response: user_response };
    gate.trigger(app, trigger, session_key)
}

/// Scans `waiting_user` apps for an escalation older than its timeout
/// and marks the originating run `error("escalation-timeout")`,
/// restoring the app to `error` (spec §5 "Escalations have a
/// spec-configurable timeout... after which the run is marked
/// `error(escalation-timeout)` and the app leaves `waiting_user`"). Also
/// records a `run_complete`-shaped activity entry with `status=error`,
/// the same shape a normal run completion would leave behind, so the
/// timeline reads correctly even though no run handler ever reported in.
///
/// `default_timeout_ms` applies to apps whose spec doesn't set
/// `escalation.timeout_hours`; see [`escalation_timeout_ms`] for the
/// per-app override.
pub fn reap_escalation_timeouts<C: Clock>(db: &DbHandle, clock: &C, default_timeout_ms: i64) -> Result<u64, EngineError> {
    let now = clock.epoch_ms();
    let mut reaped = 0u64;
    for app in repo::list_apps(db, None)? {
        if app.status != AppStatus::WaitingUser {
            continue;
        }
        let Some(entry_id) = app.pending_escalation_id else { continue };
        let Some(entry) = repo::get_activity(db, &entry_id)? else { continue };
        let timeout_ms = escalation_timeout_ms(&app, default_timeout_ms);
        if now - entry.ts < timeout_ms {
            continue;
        }

        if let Err(e) = repo::complete_run(db, &entry.run_id, now, RunOutcome::Error, Some("escalation-timeout")) {
            tracing::error!(run = %entry.run_id, error = %e, "failed to mark timed-out escalation run");
            continue;
        }

        let timeout_entry = ActivityEntry {
            id: ActivityId::new(),
            app_id: app.id,
            run_id: entry.run_id,
            kind: ActivityType::RunComplete,
            ts: now,
            session_key: entry.session_key.clone(),
            content: ActivityContent { summary: "escalation timed out".to_string(), status: Some("error".to_string()), data: None, question: None, choices: None },
            user_response: None,
        };
        if let Err(e) = repo::insert_activity(db, &timeout_entry) {
            tracing::error!(app = %app.id, error = %e, "failed to persist escalation-timeout activity entry");
        }

        let mut app = app;
        app.status = AppStatus::Error;
        app.pending_escalation_id = None;
        app.error_message = Some("escalation-timeout".to_string());
        repo::update_app(db, &app)?;
        reaped += 1;
    }
    Ok(reaped)
}

/// Per-app escalation timeout, converted from the spec document's hours
/// to the runtime's milliseconds at this boundary (spec §9 Open
/// Questions: "Convert at the activation boundary and document"). Falls
/// back to `default_timeout_ms` when the app's spec doesn't set
/// `escalation.timeout_hours`.
fn escalation_timeout_ms(app: &InstalledApp, default_timeout_ms: i64) -> i64 {
    app.spec
        .get("escalation")
        .and_then(|escalation| escalation.get("timeout_hours"))
        .and_then(|v| v.as_f64())
        .map(|hours| (hours * 3_600_000.0) as i64)
        .unwrap_or(default_timeout_ms)
}
