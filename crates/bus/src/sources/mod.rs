// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The three standard source adapters (spec §4.3 "Standard sources").

pub mod file_watcher;
pub mod schedule;
pub mod webhook;

pub use file_watcher::FileWatcherSource;
pub use schedule::ScheduleBridge;
pub use webhook::{NoSecrets, SecretResolver, WebhookSource};
