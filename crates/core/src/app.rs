// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Installed-app data model and state machine (spec §3, §4.4.1).

use crate::error::DomainError;
use crate::ids::{ActivityId, AppId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of an [`InstalledApp`] (spec §4.4.1 transition matrix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    Active,
    Paused,
    Error,
    NeedsLogin,
    WaitingUser,
    Uninstalled,
}

crate::simple_display! {
    AppStatus {
        Active => "active",
        Paused => "paused",
        Error => "error",
        NeedsLogin => "needs_login",
        WaitingUser => "waiting_user",
        Uninstalled => "uninstalled",
    }
}

impl AppStatus {
    /// Validate a transition against the matrix in spec §4.4.1.
    ///
    /// Same-state "transitions" are always legal no-ops.
    pub fn validate_transition(self, to: AppStatus) -> Result<(), DomainError> {
        use AppStatus::*;
        if self == to {
            return Ok(());
        }
        let legal = match self {
            Active => matches!(to, Paused | Error | NeedsLogin | WaitingUser | Uninstalled),
            Paused => matches!(to, Active | Uninstalled),
            Error => matches!(to, Active | Paused | Uninstalled),
            NeedsLogin => matches!(to, Active | Paused | Uninstalled),
            WaitingUser => matches!(to, Active | Paused | Error | Uninstalled),
            Uninstalled => matches!(to, Active),
        };
        if legal {
            Ok(())
        } else {
            Err(DomainError::InvalidStatusTransition { from: self.to_string(), to: to.to_string() })
        }
    }

    /// Statuses from which a new run may be admitted (spec §4.4.2 step 1).
    pub fn admits_runs(self) -> bool {
        matches!(self, AppStatus::Active | AppStatus::Error)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub granted: Vec<String>,
    #[serde(default)]
    pub denied: Vec<String>,
}

/// An installed automation/skill/mcp/extension app (spec §3 "InstalledApp").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledApp {
    pub id: AppId,
    pub spec_id: String,
    pub space_id: String,
    /// Opaque spec document. Only required shape: `type`, `subscriptions[]`, `escalation`.
    pub spec: serde_json::Value,

    #[serde(default)]
    pub user_config: HashMap<String, serde_json::Value>,
    /// `frequency[subscription_id] -> duration string` lives under `frequency`.
    #[serde(default)]
    pub user_overrides: serde_json::Value,
    #[serde(default)]
    pub permissions: Permissions,

    pub status: AppStatus,
    pub pending_escalation_id: Option<ActivityId>,
    pub installed_at: i64,
    pub uninstalled_at: Option<i64>,
    pub last_run_at: Option<i64>,
    pub last_run_outcome: Option<String>,
    pub error_message: Option<String>,
}

impl InstalledApp {
    pub fn spec_type(&self) -> &str {
        self.spec.get("type").and_then(|v| v.as_str()).unwrap_or("automation")
    }

    pub fn subscriptions(&self) -> &[serde_json::Value] {
        self.spec
            .get("subscriptions")
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn frequency_override(&self, subscription_id: &str) -> Option<&str> {
        self.user_overrides.get("frequency")?.get(subscription_id)?.as_str()
    }
}
