// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! halo-scheduler: the persistent timer engine (spec §4.2).
//!
//! Pure schedule math ([`duration::parse_duration`], [`next::compute_next`])
//! is separated from the stateful [`timer::Scheduler`] so the math can be
//! exhaustively property-tested without a database or an async runtime.

pub mod duration;
pub mod error;
pub mod migrations;
pub mod next;
pub mod repo;
pub mod timer;

pub use duration::parse_duration;
pub use error::SchedulerError;
pub use next::{compute_next, next_cron, next_every, next_once};
pub use timer::{AddJobInput, DueJob, HandlerResult, JobFilter, JobHandler, JobPatch, Scheduler};
