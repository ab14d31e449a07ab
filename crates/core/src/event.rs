// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-bus payload and dedup-cache entry shapes (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single event flowing through the bus, emitted by a source adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaloEvent {
    /// Dotted type string, e.g. `schedule.due`, `file.changed`, `webhook.received`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Adapter id that produced this event.
    pub source: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub dedup_key: Option<String>,
    pub received_at: i64,
}

impl HaloEvent {
    pub fn new(kind: impl Into<String>, source: impl Into<String>, payload: serde_json::Value, received_at: i64) -> Self {
        Self { kind: kind.into(), source: source.into(), payload, dedup_key: None, received_at }
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

/// A single dedup-cache record: key to the millisecond it was last seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupEntry {
    pub last_seen_ms: i64,
}

/// Well-known metadata keys carried through scheduler jobs and bus
/// subscriptions so the run engine can resolve the target app.
pub mod metadata_keys {
    pub const APP_ID: &str = "app_id";
    pub const SUBSCRIPTION_ID: &str = "subscription_id";
}

pub type Metadata = HashMap<String, String>;
