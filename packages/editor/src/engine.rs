//! # Engine Facade
//!
//! Wires the pieces together — propagation graph, persistence queue, hook
//! runner, save orchestrator, snapshot manager — and exposes the small
//! surface UI event handlers call.

use crate::collaborators::{Persistence, RenderDispatch, SchemaSource, Store, UiEffects};
use crate::errors::EngineError;
use crate::history::SnapshotManager;
use crate::hooks::{HookRunner, ModelSource};
use crate::orchestrator::{SaveOrchestrator, SaveRequest};
use crate::pubsub::PropagationGraph;
use crate::queue::PersistenceQueue;
use amphora_common::{FieldMap, Schema};
use std::sync::{Arc, Weak};

/// Collaborators the engine is built on (see the crate docs).
pub struct EngineConfig {
    pub store: Arc<dyn Store>,
    pub persistence: Arc<dyn Persistence>,
    pub renderer: Arc<dyn RenderDispatch>,
    pub effects: Arc<dyn UiEffects>,
    pub schemas: Arc<dyn SchemaSource>,
    pub models: Arc<dyn ModelSource>,
    /// Edit-session locals passed to every hook invocation.
    pub locals: FieldMap,
}

pub struct ComponentEngine {
    orchestrator: Arc<SaveOrchestrator>,
    history: Arc<SnapshotManager>,
}

impl ComponentEngine {
    pub fn new(config: EngineConfig) -> Self {
        let graph = Arc::new(PropagationGraph::new());
        let queue = PersistenceQueue::new(config.effects.clone());
        let hooks = HookRunner::new(config.models, Arc::new(config.locals));

        let orchestrator = Arc::new(SaveOrchestrator::new(
            config.store.clone(),
            config.persistence,
            config.renderer,
            config.effects,
            hooks,
            queue,
            graph,
            config.schemas,
        ));

        let history = SnapshotManager::new(config.store, orchestrator.clone());
        let observer: Weak<SnapshotManager> = Arc::downgrade(&history);
        orchestrator.set_commit_observer(observer);

        Self {
            orchestrator,
            history,
        }
    }

    /// Save a user edit: partial field data merged onto the component's
    /// stored record, then persisted, propagated, and committed.
    pub async fn save(&self, uri: &str, data: FieldMap) -> Result<(), EngineError> {
        self.orchestrator
            .save_component(SaveRequest::new(uri, data))
            .await
    }

    /// Save with full control over the request (event, snapshot flag,
    /// baseline, replace/force semantics).
    pub async fn save_with(&self, request: SaveRequest) -> Result<(), EngineError> {
        self.orchestrator.save_component(request).await
    }

    pub async fn undo(&self) {
        self.history.undo().await;
    }

    pub async fn redo(&self) {
        self.history.redo().await;
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Register a component type's schema (publish/subscribe declarations
    /// are scanned into the propagation graph).
    pub fn register_schema(&self, type_name: &str, schema: Schema) {
        self.orchestrator.register_schema(type_name, schema);
    }

    /// Clear the propagation graph, schema cache, and history (test
    /// isolation and full page reload).
    pub fn reset(&self) {
        self.orchestrator.reset();
        self.history.clear();
    }

    /// True while any save is outstanding. Hosts block focus changes
    /// while this holds.
    pub fn is_saving(&self) -> bool {
        self.orchestrator.is_saving()
    }
}
