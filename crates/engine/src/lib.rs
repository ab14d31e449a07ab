// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! halo-engine: the run engine (spec §4.4). Installed-app lifecycle,
//! activation of schedule/event subscriptions, run admission and
//! execution against an [`halo_adapters::AgentAdapter`], the
//! escalation/resume protocol, and keep-alive/shared-resource
//! bookkeeping.

pub mod apps;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod migrations;
pub mod repo;
pub mod resources;
pub mod runs;
pub mod subscriptions;

pub use apps::InstallInput;
pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use escalation::{EscalationResponse, DEFAULT_ESCALATION_TIMEOUT_MS};
pub use resources::{
    DisposeFn, KeepAliveRegistry, SharedResourceGuard, SharedResourceQueue, DEFAULT_AUTO_RELEASE_MS,
    DEFAULT_KEEP_ALIVE_TTL_MS,
};
pub use runs::RunGate;
pub use subscriptions::{Subscription, SubscriptionRegistry};
