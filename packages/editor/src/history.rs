//! # Undo/Redo Snapshot Manager
//!
//! Records point-in-time deep copies of the full component-data tree and
//! restores changed components on undo/redo.
//!
//! ## Design
//!
//! - Capture is driven by commit observations and debounced (500ms), so
//!   rapid keystrokes collapse into one history entry
//! - Replay commits (`snapshot == false`) are never captured
//! - History is a cursor-addressed sequence; the cursor always points at
//!   a valid index, and stepping past either end is a no-op
//! - Recording while the cursor sits mid-history truncates the forward
//!   branch
//! - Restoring replays full records through the save pipeline with
//!   `snapshot = false`; a type without a client template cannot be
//!   re-rendered client-side, so that component is skipped with a warning
//!   and the rest of the restore proceeds

use crate::collaborators::Store;
use crate::debounce::{DebouncedAction, Debouncer};
use crate::orchestrator::{CommitObserver, SaveOrchestrator, SaveRequest};
use amphora_common::{component_type, FieldMap};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

pub const SNAPSHOT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A deep copy of the component-data tree at a point in time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub tree: BTreeMap<String, FieldMap>,
}

#[derive(Default)]
struct History {
    snapshots: Vec<Snapshot>,
    cursor: usize,
}

pub struct SnapshotManager {
    store: Arc<dyn Store>,
    orchestrator: Arc<SaveOrchestrator>,
    inner: Mutex<History>,
    debouncer: Debouncer,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn Store>, orchestrator: Arc<SaveOrchestrator>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<SnapshotManager>| {
            let weak = weak.clone();
            let action: DebouncedAction = Arc::new(move || {
                let weak = weak.clone();
                async move {
                    if let Some(manager) = weak.upgrade() {
                        manager.record_snapshot();
                    }
                }
                .boxed()
            });
            Self {
                store,
                orchestrator,
                inner: Mutex::new(History::default()),
                debouncer: Debouncer::new(SNAPSHOT_DEBOUNCE, action),
            }
        })
    }

    /// Capture the current tree as a new history entry. Truncates any
    /// forward (redo) branch; an entry identical to the current one is
    /// not duplicated.
    pub fn record_snapshot(&self) {
        let tree = self.store.component_tree();
        let mut history = self.inner.lock().unwrap();

        if !history.snapshots.is_empty() {
            let keep = history.cursor + 1;
            history.snapshots.truncate(keep);
        }
        if history.snapshots.last().map(|s| &s.tree) == Some(&tree) {
            history.cursor = history.snapshots.len() - 1;
            return;
        }

        history.snapshots.push(Snapshot {
            taken_at: Utc::now(),
            tree,
        });
        history.cursor = history.snapshots.len() - 1;
        tracing::debug!(entries = history.snapshots.len(), "recorded history snapshot");
    }

    pub fn can_undo(&self) -> bool {
        self.inner.lock().unwrap().cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        let history = self.inner.lock().unwrap();
        !history.snapshots.is_empty() && history.cursor < history.snapshots.len() - 1
    }

    /// Number of history entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all history.
    pub fn clear(&self) {
        self.debouncer.cancel();
        let mut history = self.inner.lock().unwrap();
        history.snapshots.clear();
        history.cursor = 0;
    }

    /// Step the cursor back one snapshot and restore the difference.
    /// No-op at the oldest entry.
    pub async fn undo(&self) {
        self.step(Direction::Back).await;
    }

    /// Step the cursor forward one snapshot and restore the difference.
    /// No-op at the newest entry.
    pub async fn redo(&self) {
        self.step(Direction::Forward).await;
    }

    async fn step(&self, direction: Direction) {
        // A pending capture holds the latest edits; land it first so the
        // step moves from the true current state.
        self.debouncer.flush().await;

        let step = {
            let history = self.inner.lock().unwrap();
            let target = match direction {
                Direction::Back if history.cursor > 0 => history.cursor - 1,
                Direction::Forward
                    if !history.snapshots.is_empty()
                        && history.cursor < history.snapshots.len() - 1 =>
                {
                    history.cursor + 1
                }
                _ => return,
            };
            (
                history.snapshots[history.cursor].tree.clone(),
                history.snapshots[target].tree.clone(),
                target,
            )
        };
        let (current, target_tree, target) = step;

        self.restore(&current, &target_tree).await;
        self.inner.lock().unwrap().cursor = target;
    }

    /// Re-save every component whose data differs between the two trees.
    async fn restore(
        &self,
        current: &BTreeMap<String, FieldMap>,
        target: &BTreeMap<String, FieldMap>,
    ) {
        let uris: BTreeSet<&String> = current.keys().chain(target.keys()).collect();

        let mut replays = Vec::new();
        for uri in uris {
            let before = current.get(uri);
            let after = target.get(uri);
            if before == after {
                continue;
            }

            let type_name = match component_type(uri) {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(uri = %uri, error = %err, "skipping non-component entry in snapshot");
                    continue;
                }
            };
            if !self.store.has_client_template(type_name) {
                // Cannot safely replay server-only rendering client-side.
                tracing::warn!(uri = %uri, type_name, "no client template; skipping during undo/redo");
                continue;
            }

            // A URI absent from a tree is a destroyed component: restore
            // to the empty record.
            replays.push(SaveRequest::replay(
                uri.clone(),
                after.cloned().unwrap_or_default(),
                before.cloned().unwrap_or_default(),
            ));
        }

        let results = join_all(replays.into_iter().map(|req| async move {
            let uri = req.uri.clone();
            (uri, self.orchestrator.save_component(req).await)
        }))
        .await;

        for (uri, result) in results {
            if let Err(err) = result {
                tracing::warn!(uri = %uri, error = %err, "failed to restore component during undo/redo");
            }
        }
    }
}

enum Direction {
    Back,
    Forward,
}

impl CommitObserver for SnapshotManager {
    fn save_starting(&self) {
        // Fixed point: the pre-mutation state must exist in history
        // before the first real edit lands.
        if self.is_empty() {
            self.record_snapshot();
        }
    }

    fn committed(&self, snapshot: bool) {
        if snapshot {
            self.debouncer.trigger();
        }
    }
}
