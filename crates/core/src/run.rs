// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run records (spec §4.4.2 "Run record").

use crate::activity::UserResponse;
use crate::ids::{ActivityId, AppId, RunId};
use serde::{Deserialize, Serialize};

/// What caused a run to be admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Schedule { subscription_id: String, job_id: String },
    Event { subscription_id: String, event_type: String },
    EscalationResume { entry_id: ActivityId, response: UserResponse },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Useful,
    Noop,
    Error,
    Skipped,
}

crate::simple_display! {
    RunOutcome {
        Useful => "useful",
        Noop => "noop",
        Error => "error",
        Skipped => "skipped",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub app_id: AppId,
    pub trigger: Trigger,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub outcome: Option<RunOutcome>,
    pub error: Option<String>,
    pub session_key: String,
}

impl Run {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}
