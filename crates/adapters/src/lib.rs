// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! halo-adapters: external-collaborator trait boundaries (spec §6).
//!
//! No concrete agent SDK, browser automation, or OAuth implementation
//! lives here — those remain out of scope. Each trait ships a test
//! double behind `#[cfg(any(test, feature = "test-support"))]`.

pub mod agent;
pub mod file_watcher;

pub use agent::{AgentAdapter, AgentAdapterError, AgentInvocation, ReportAck, ReportCall, ReportKind, ReportSink};
pub use file_watcher::{FileWatcherAdapter, FsChangeType, FsEvent, FsEventsCallback, Unsubscribe};

#[cfg(any(test, feature = "test-support"))]
pub use agent::{FakeAgentAdapter, ScriptedOutcome};
#[cfg(any(test, feature = "test-support"))]
pub use file_watcher::FakeFileWatcherAdapter;
