// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity-entry data model (spec §3 "ActivityEntry").

use crate::ids::{ActivityId, AppId, RunId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    RunComplete,
    RunSkipped,
    Milestone,
    Escalation,
    Output,
}

crate::simple_display! {
    ActivityType {
        RunComplete => "run_complete",
        RunSkipped => "run_skipped",
        Milestone => "milestone",
        Escalation => "escalation",
        Output => "output",
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityContent {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: ActivityId,
    pub app_id: AppId,
    pub run_id: RunId,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub ts: i64,
    pub session_key: String,
    pub content: ActivityContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_response: Option<UserResponse>,
}

impl ActivityEntry {
    pub fn is_unanswered_escalation(&self) -> bool {
        self.kind == ActivityType::Escalation && self.user_response.is_none()
    }
}
