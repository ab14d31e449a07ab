// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates (gated behind `test-support`).

use crate::app::{AppStatus, InstalledApp, Permissions};
use crate::ids::AppId;
use serde_json::json;
use std::collections::HashMap;

/// Build an [`InstalledApp`] with sane defaults for tests.
pub struct InstalledAppBuilder {
    id: AppId,
    spec_id: String,
    space_id: String,
    spec: serde_json::Value,
    status: AppStatus,
}

impl Default for InstalledAppBuilder {
    fn default() -> Self {
        Self {
            id: AppId::new(),
            spec_id: "test-app".into(),
            space_id: "default".into(),
            spec: json!({ "type": "automation", "subscriptions": [] }),
            status: AppStatus::Active,
        }
    }
}

impl InstalledAppBuilder {
    pub fn spec_id(mut self, v: impl Into<String>) -> Self {
        self.spec_id = v.into();
        self
    }

    pub fn space_id(mut self, v: impl Into<String>) -> Self {
        self.space_id = v.into();
        self
    }

    pub fn spec(mut self, v: serde_json::Value) -> Self {
        self.spec = v;
        self
    }

    pub fn status(mut self, v: AppStatus) -> Self {
        self.status = v;
        self
    }

    pub fn build(self) -> InstalledApp {
        InstalledApp {
            id: self.id,
            spec_id: self.spec_id,
            space_id: self.space_id,
            spec: self.spec,
            user_config: HashMap::new(),
            user_overrides: json!({}),
            permissions: Permissions::default(),
            status: self.status,
            pending_escalation_id: None,
            installed_at: 1_700_000_000_000,
            uninstalled_at: None,
            last_run_at: None,
            last_run_outcome: None,
            error_message: None,
        }
    }
}

impl InstalledApp {
    pub fn builder() -> InstalledAppBuilder {
        InstalledAppBuilder::default()
    }
}
