// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keep-alive reasons and the shared single-instance resource queue
//! (spec §4.4.3 "Keep-alive and shared resources").

mod keepalive;
mod shared;

pub use keepalive::{DisposeFn, KeepAliveRegistry, DEFAULT_KEEP_ALIVE_TTL_MS};
pub use shared::{SharedResourceGuard, SharedResourceQueue, DEFAULT_AUTO_RELEASE_MS};
