// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule bridge source (spec §4.3 "Schedule bridge").

use crate::error::BusError;
use crate::source::{EmitFn, Source};
use halo_core::{Clock, HaloEvent};
use halo_scheduler::{DueJob, HandlerResult, Scheduler};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Bridges the scheduler's single handler slot onto the bus: every due
/// job becomes a `schedule.due` event. Carries no dedup key — the
/// scheduler already guarantees a single fire per occurrence.
pub struct ScheduleBridge<C: Clock> {
    scheduler: Arc<Scheduler<C>>,
    clock: C,
}

impl<C: Clock> ScheduleBridge<C> {
    pub fn new(scheduler: Arc<Scheduler<C>>, clock: C) -> Self {
        Self { scheduler, clock }
    }
}

impl<C: Clock> Source for ScheduleBridge<C> {
    fn id(&self) -> &str {
        "scheduler"
    }

    fn kind(&self) -> &str {
        "scheduler"
    }

    fn start(&self, emit: EmitFn) -> Result<(), BusError> {
        let clock = self.clock.clone();
        self.scheduler.on_job_due(Arc::new(move |due: DueJob| {
            let emit = emit.clone();
            let clock = clock.clone();
            Box::pin(async move {
                let payload = json!({
                    "job_id": due.id.as_str(),
                    "job_name": due.name,
                    "metadata": due.metadata,
                    "scheduled_at": due.scheduled_at,
                });
                let event = HaloEvent::new("schedule.due", "scheduler", payload, clock.epoch_ms());
                emit(event);
                HandlerResult { outcome: halo_core::schedule::Outcome::Useful, error: None, metadata: HashMap::new() }
            })
        }));
        Ok(())
    }

    fn stop(&self) {
        // The scheduler's handler slot is single-slot and owned by whoever
        // last registered; nothing to unregister here without clobbering a
        // handler someone else installed after us. The scheduler itself
        // stops firing via `Scheduler::stop()`.
    }
}
