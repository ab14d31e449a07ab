// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-watcher adapter contract (spec §6 "File-watcher adapter contract").
//!
//! `halo-bus::sources::FileWatcherSource` is the real implementation,
//! backed by the `notify` crate. This trait is the boundary other crates
//! test against without spinning up a real filesystem watcher.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FsChangeType {
    Add,
    AddDir,
    Change,
    Unlink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsEvent {
    pub change_type: FsChangeType,
    pub file_path: String,
    pub relative_path: String,
    pub parent_dir: String,
}

pub type Unsubscribe = Box<dyn FnOnce() + Send>;
pub type FsEventsCallback = Box<dyn Fn(String, Vec<FsEvent>) + Send + Sync>;

pub trait FileWatcherAdapter: Send + Sync {
    fn add_fs_events_handler(&self, cb: FsEventsCallback) -> Unsubscribe;
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct FakeFileWatcherAdapter {
        handlers: Arc<Mutex<Vec<FsEventsCallback>>>,
    }

    impl FakeFileWatcherAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Drives every registered handler as if `space_id` reported `events`.
        pub fn emit(&self, space_id: &str, events: Vec<FsEvent>) {
            for handler in self.handlers.lock().iter() {
                handler(space_id.to_string(), events.clone());
            }
        }
    }

    impl FileWatcherAdapter for FakeFileWatcherAdapter {
        fn add_fs_events_handler(&self, cb: FsEventsCallback) -> Unsubscribe {
            self.handlers.lock().push(cb);
            Box::new(|| {})
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFileWatcherAdapter;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn fake_watcher_drives_registered_handlers() {
        let adapter = FakeFileWatcherAdapter::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        adapter.add_fs_events_handler(Box::new(move |space_id, events| {
            received_clone.lock().push((space_id, events.len()));
        }));

        adapter.emit(
            "space-1",
            vec![FsEvent {
                change_type: FsChangeType::Change,
                file_path: "/tmp/a.txt".into(),
                relative_path: "a.txt".into(),
                parent_dir: "/tmp".into(),
            }],
        );

        assert_eq!(received.lock().as_slice(), &[("space-1".to_string(), 1)]);
    }
}
