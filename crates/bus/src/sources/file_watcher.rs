// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File watcher source (spec §4.3 "File watcher").

use crate::error::BusError;
use crate::source::{EmitFn, Source};
use halo_core::{Clock, HaloEvent};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;

/// The four change kinds the spec's file-watcher contract recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    AddDir,
    Change,
    Unlink,
}

impl ChangeType {
    fn as_str(self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::AddDir => "addDir",
            ChangeType::Change => "change",
            ChangeType::Unlink => "unlink",
        }
    }

    fn event_kind(self) -> &'static str {
        match self {
            ChangeType::Add | ChangeType::AddDir => "file.created",
            ChangeType::Change => "file.changed",
            ChangeType::Unlink => "file.deleted",
        }
    }
}

fn classify(kind: &EventKind, path: &Path) -> Option<ChangeType> {
    match kind {
        EventKind::Create(_) if path.is_dir() => Some(ChangeType::AddDir),
        EventKind::Create(_) => Some(ChangeType::Add),
        EventKind::Modify(_) => Some(ChangeType::Change),
        EventKind::Remove(_) => Some(ChangeType::Unlink),
        _ => None,
    }
}

/// Watches `root` recursively and emits one bus event per changed path
/// (spec: "emits one event per item").
pub struct FileWatcherSource<C: Clock> {
    id: String,
    root: PathBuf,
    clock: C,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl<C: Clock> FileWatcherSource<C> {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>, clock: C) -> Self {
        Self { id: id.into(), root: root.into(), clock, watcher: Mutex::new(None) }
    }
}

impl<C: Clock> Source for FileWatcherSource<C> {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "file_watcher"
    }

    fn start(&self, emit: EmitFn) -> Result<(), BusError> {
        let (tx, rx) = channel::<Result<NotifyEvent, notify::Error>>();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        *self.watcher.lock() = Some(watcher);

        let root = self.root.clone();
        let clock = self.clock.clone();
        std::thread::spawn(move || {
            for res in rx {
                match res {
                    Ok(event) => {
                        for path in &event.paths {
                            let Some(change_type) = classify(&event.kind, path) else { continue };
                            let relative_path = path.strip_prefix(&root).unwrap_or(path).to_string_lossy().to_string();
                            let parent_dir = path.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
                            let file_path = path.to_string_lossy().to_string();

                            let payload = json!({
                                "change_type": change_type.as_str(),
                                "file_path": file_path,
                                "relative_path": relative_path,
                                "parent_dir": parent_dir,
                            });
                            let halo_event = HaloEvent::new(
                                change_type.event_kind(),
                                "file_watcher",
                                payload,
                                clock.epoch_ms(),
                            )
                            .with_dedup_key(format!("fw:{}:{}", change_type.as_str(), file_path));
                            emit(halo_event);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "file watcher error"),
                }
            }
        });
        Ok(())
    }

    fn stop(&self) {
        self.watcher.lock().take();
    }
}
