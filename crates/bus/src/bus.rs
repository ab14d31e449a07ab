// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event bus: source registry, filter, dedup, and single-slot sink
//! (spec §4.3 "Bus operations", "Dispatch pipeline").

use crate::dedup::DedupCache;
use crate::error::BusError;
use crate::source::Source;
use halo_core::{Clock, HaloEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type FilterFn = Arc<dyn Fn(&HaloEvent) -> bool + Send + Sync>;
pub type SinkFn = Arc<dyn Fn(HaloEvent) -> Result<(), BusError> + Send + Sync>;

/// Source-adapter registry, dedup cache, and dispatch pipeline
/// (spec §4.3).
pub struct Bus<C: Clock> {
    clock: C,
    sources: Mutex<HashMap<String, Arc<dyn Source>>>,
    filter: Mutex<Option<FilterFn>>,
    sink: Mutex<Option<SinkFn>>,
    dedup: Mutex<DedupCache>,
    stopped: AtomicBool,
}

impl<C: Clock> Bus<C> {
    pub fn new(clock: C) -> Arc<Self> {
        Self::with_dedup(clock, DedupCache::with_defaults())
    }

    pub fn with_dedup(clock: C, dedup: DedupCache) -> Arc<Self> {
        Arc::new(Self {
            clock,
            sources: Mutex::new(HashMap::new()),
            filter: Mutex::new(None),
            sink: Mutex::new(None),
            dedup: Mutex::new(dedup),
            stopped: AtomicBool::new(true),
        })
    }

    pub fn set_filter(&self, filter: FilterFn) {
        *self.filter.lock() = Some(filter);
    }

    /// Single-slot sink registration (spec §4.3 `set_sink`).
    pub fn set_sink(&self, sink: SinkFn) {
        *self.sink.lock() = Some(sink);
    }

    pub fn register_source(self: &Arc<Self>, source: Arc<dyn Source>) -> Result<(), BusError> {
        let id = source.id().to_string();
        {
            let mut sources = self.sources.lock();
            if sources.contains_key(&id) {
                return Err(BusError::SourceAlreadyRegistered(id));
            }
            sources.insert(id.clone(), source.clone());
        }

        let bus = self.clone();
        source.start(Arc::new(move |event| bus.dispatch(event)))?;
        Ok(())
    }

    pub fn unregister_source(&self, id: &str) -> Result<(), BusError> {
        let source = self.sources.lock().remove(id).ok_or_else(|| BusError::SourceNotFound(id.to_string()))?;
        source.stop();
        Ok(())
    }

    pub fn start(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        for source in self.sources.lock().values() {
            source.stop();
        }
    }

    /// Runs a single event through the dispatch pipeline (spec §4.3
    /// "Dispatch pipeline", steps 1-4).
    pub fn dispatch(&self, event: HaloEvent) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        if let Some(filter) = self.filter.lock().clone() {
            if !filter(&event) {
                return;
            }
        }

        if let Some(key) = event.dedup_key.as_deref() {
            let now = self.clock.epoch_ms();
            let is_duplicate = self.dedup.lock().check_and_touch(key, now);
            if is_duplicate {
                return;
            }
        }

        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            if let Err(e) = sink(event) {
                tracing::warn!(error = %e, "bus sink failed (dropped)");
            }
        }
    }
}
