// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `register_keep_alive` / `should_keep_alive` (spec §4.4.3): reference
//! counted "keep the process running" reasons with TTL pruning so a
//! stale registration left by a crashed caller doesn't pin the process
//! alive forever.

use halo_core::{Clock, KeepAliveEntry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_KEEP_ALIVE_TTL_MS: i64 = 24 * 60 * 60 * 1_000;

/// Calling this removes the keep-alive reason it was returned for.
pub type DisposeFn = Box<dyn FnOnce() + Send>;

pub struct KeepAliveRegistry<C: Clock> {
    clock: C,
    ttl_ms: i64,
    next_id: AtomicU64,
    reasons: Mutex<HashMap<u64, KeepAliveEntry>>,
}

impl<C: Clock> KeepAliveRegistry<C> {
    pub fn new(clock: C) -> Arc<Self> {
        Self::with_ttl(clock, DEFAULT_KEEP_ALIVE_TTL_MS)
    }

    pub fn with_ttl(clock: C, ttl_ms: i64) -> Arc<Self> {
        Arc::new(Self { clock, ttl_ms, next_id: AtomicU64::new(0), reasons: Mutex::new(HashMap::new()) })
    }

    /// Records `reason` with the current timestamp; the returned
    /// `dispose_fn` removes it again.
    pub fn register_keep_alive(self: &Arc<Self>, reason: impl Into<String>) -> DisposeFn {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = KeepAliveEntry { reason: reason.into(), registered_at_ms: self.clock.epoch_ms() };
        self.reasons.lock().insert(id, entry);

        let registry = Arc::clone(self);
        Box::new(move || {
            registry.reasons.lock().remove(&id);
        })
    }

    /// Prunes reasons older than the TTL and reports whether any remain.
    pub fn should_keep_alive(&self) -> bool {
        let now = self.clock.epoch_ms();
        let mut reasons = self.reasons.lock();
        reasons.retain(|_, entry| now - entry.registered_at_ms < self.ttl_ms);
        !reasons.is_empty()
    }

    pub fn active_reasons(&self) -> Vec<String> {
        self.reasons.lock().values().map(|e| e.reason.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::FakeClock;

    #[test]
    fn disposing_removes_the_reason() {
        let registry = KeepAliveRegistry::new(FakeClock::new());
        assert!(!registry.should_keep_alive());

        let dispose = registry.register_keep_alive("download in progress");
        assert!(registry.should_keep_alive());

        dispose();
        assert!(!registry.should_keep_alive());
    }

    #[test]
    fn expired_reasons_are_pruned() {
        let clock = FakeClock::new();
        let registry = KeepAliveRegistry::with_ttl(clock.clone(), 1_000);
        let _dispose = registry.register_keep_alive("long task");
        assert!(registry.should_keep_alive());

        clock.advance_ms(1_001);
        assert!(!registry.should_keep_alive());
    }

    #[test]
    fn multiple_reasons_keep_alive_until_all_clear() {
        let registry = KeepAliveRegistry::new(FakeClock::new());
        let d1 = registry.register_keep_alive("a");
        let d2 = registry.register_keep_alive("b");
        d1();
        assert!(registry.should_keep_alive());
        d2();
        assert!(!registry.should_keep_alive());
    }
}
