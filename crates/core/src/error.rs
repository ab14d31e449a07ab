// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain error taxonomy shared by the scheduler, bus, and run engine
//! (spec §7). These are invariant-violation errors with a stable kind
//! tag; transient and fatal errors are modeled per-crate and convert
//! into a `DomainError` only when they cross a domain boundary.

use crate::ids::{ActivityId, AppId, SchedulerJobId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("scheduler job not found: {0}")]
    JobNotFound(SchedulerJobId),

    #[error("app not found: {0}")]
    AppNotFound(AppId),

    #[error("app {spec_id}/{space_id} is already installed")]
    AppAlreadyInstalled { spec_id: String, space_id: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("app {0} is not runnable in its current status")]
    AppNotRunnable(AppId),

    #[error("concurrency limit reached (per_app={per_app})")]
    ConcurrencyLimit { per_app: bool },

    #[error("escalation not found or already answered: {0}")]
    EscalationNotFound(ActivityId),

    #[error("app {0} has no subscriptions to activate")]
    NoSubscriptions(AppId),

    #[error("invalid duration string: {0:?}")]
    InvalidDuration(String),

    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("app {0} must be uninstalled before it can be deleted")]
    DeleteRequiresUninstalled(AppId),

    #[error("spec has invalid type {found:?}, expected one of automation, skill, mcp, extension")]
    InvalidSpec { found: String },
}
