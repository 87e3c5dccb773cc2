//! # Persistence Queue
//!
//! All outgoing persistence calls funnel through one queue:
//!
//! - **Serialized**: exactly one call executes at a time, the rest wait in
//!   FIFO order. Downstream storage expects serialized writes per page
//!   session; overlapping cascading writes lose updates.
//! - **Deduplicated**: a call whose operation and arguments match an
//!   in-flight entry shares that entry's pending result instead of issuing
//!   a duplicate call. The dedup key is removed synchronously inside the
//!   completion continuation, so a finished call is never mistaken for
//!   still-pending.
//! - **Quiescence**: when the queue drains completely (no pending or
//!   in-flight entries) it signals `UiEffects::persistence_drained`, which
//!   hosts use to finalize a progress indicator.
//!
//! Entries are driven by a spawned task so they run to completion even if
//! the original caller drops its future.

use crate::collaborators::UiEffects;
use crate::errors::EngineError;
use amphora_common::FieldMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type SaveResult = Result<FieldMap, EngineError>;

/// A pending (possibly shared) persistence result.
pub type PendingSave = Shared<BoxFuture<'static, SaveResult>>;

pub struct PersistenceQueue {
    /// Fair mutex: waiters acquire in FIFO order.
    gate: Arc<tokio::sync::Mutex<()>>,
    pending: Arc<Mutex<HashMap<String, PendingSave>>>,
    entries: Arc<AtomicUsize>,
    effects: Arc<dyn UiEffects>,
}

impl PersistenceQueue {
    pub fn new(effects: Arc<dyn UiEffects>) -> Self {
        Self {
            gate: Arc::new(tokio::sync::Mutex::new(())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            entries: Arc::new(AtomicUsize::new(0)),
            effects,
        }
    }

    /// Enqueue a persistence call. Identical in-flight calls share one
    /// pending result.
    pub fn enqueue(
        &self,
        operation: &str,
        args: &Value,
        work: BoxFuture<'static, SaveResult>,
    ) -> PendingSave {
        let key = cache_key(operation, args);

        let mut pending = self.pending.lock().unwrap();
        if let Some(entry) = pending.get(&key) {
            tracing::debug!(%key, "sharing in-flight persistence call");
            return entry.clone();
        }

        self.entries.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.clone();
        let map = self.pending.clone();
        let entries = self.entries.clone();
        let effects = self.effects.clone();
        let completion_key = key.clone();

        let entry: PendingSave = async move {
            let _slot = gate.lock().await;
            let result = work.await;

            // Completion continuation: drop the dedup key before the
            // result is observable, then report quiescence if this was
            // the last entry.
            map.lock().unwrap().remove(&completion_key);
            if entries.fetch_sub(1, Ordering::SeqCst) == 1 {
                effects.persistence_drained();
            }

            result
        }
        .boxed()
        .shared();

        pending.insert(key, entry.clone());
        tokio::spawn(entry.clone());
        entry
    }

    /// Number of entries currently pending or in flight.
    pub fn len(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(operation: &str, args: &Value) -> String {
    format!("{operation}:{args}")
}
