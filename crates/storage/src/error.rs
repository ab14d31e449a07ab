// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("migration {namespace}@{version} failed: {reason}")]
    MigrationFailed { namespace: String, version: u32, reason: String },

    #[error("database at {0} is corrupt and was recreated; previous file preserved at {1}")]
    RecoveredFromCorruption(String, String),
}
