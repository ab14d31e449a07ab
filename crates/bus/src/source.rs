// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source adapter contract (spec §4.3 "Source adapter contract").

use crate::error::BusError;
use halo_core::HaloEvent;
use std::sync::Arc;

/// Callback a source invokes for every event it produces.
pub type EmitFn = Arc<dyn Fn(HaloEvent) + Send + Sync>;

/// A source adapter: something that produces events from the outside
/// world (a timer, a filesystem watcher, an inbound webhook call).
pub trait Source: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> &str;
    fn start(&self, emit: EmitFn) -> Result<(), BusError>;
    fn stop(&self);
}
