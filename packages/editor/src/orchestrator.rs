//! # Save Orchestrator
//!
//! The per-component save pipeline:
//!
//! ```text
//! diff → save hook → persist (queued) → propagate → render hook
//!      → commit changed fields → render dispatch
//! ```
//!
//! State machine per save *request*, not per component — a component may
//! be saved concurrently for different events. Failure in the hook,
//! persistence, or propagation stages reverts the component to its
//! pre-save data and re-renders it; there is no partial commit. A render
//! hook failure cannot revert (the data is already persisted) and falls
//! back to rendering the persisted form.
//!
//! Propagation recursively re-enters `save_component` for subscribing
//! components, threading the same [`PropagationEvent`] so a type is
//! updated at most once per originating save.

use crate::collaborators::{
    Persistence, RenderDispatch, RenderRequest, SchemaSource, Store, UiEffects,
};
use crate::debounce::Debouncer;
use crate::errors::EngineError;
use crate::hooks::HookRunner;
use crate::pubsub::{scope_allows, PropagationEvent, PropagationGraph, SubscriberUpdate};
use crate::queue::PersistenceQueue;
use amphora_common::{changed_fields, component_type, diff_fields, merge, FieldMap, Schema};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

/// Page/layout secondary metadata refreshes at most this often.
pub const METADATA_REFRESH_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Observes committed saves so the snapshot manager can record history.
pub trait CommitObserver: Send + Sync {
    /// A user-intended save is about to mutate the tree; a baseline
    /// snapshot must exist before the mutation lands.
    fn save_starting(&self);

    /// A commit landed. `snapshot == false` marks replay-only re-renders
    /// (undo/redo) that must not be captured as new history.
    fn committed(&self, snapshot: bool);
}

/// One save request flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub uri: String,
    /// Incoming (possibly partial) field data.
    pub data: FieldMap,
    /// Causal event; absent for a fresh user edit.
    pub event: Option<Arc<PropagationEvent>>,
    /// False when replaying history; such commits are not re-captured.
    pub snapshot: bool,
    /// Baseline to diff against instead of the stored data (undo/redo).
    pub prev_data: Option<FieldMap>,
    /// `data` is a full record replacing the old one (fields absent from
    /// it are removed) rather than a partial update merged onto it.
    pub replace: bool,
    /// Save even when no fields changed.
    pub force: bool,
}

impl SaveRequest {
    /// A fresh user edit.
    pub fn new(uri: impl Into<String>, data: FieldMap) -> Self {
        Self {
            uri: uri.into(),
            data,
            event: None,
            snapshot: true,
            prev_data: None,
            replace: false,
            force: false,
        }
    }

    /// A history replay: diff against the supplied baseline and do not
    /// record new snapshots.
    pub fn replay(uri: impl Into<String>, data: FieldMap, prev_data: FieldMap) -> Self {
        Self {
            uri: uri.into(),
            data,
            event: None,
            snapshot: false,
            prev_data: Some(prev_data),
            replace: true,
            force: false,
        }
    }
}

pub struct SaveOrchestrator {
    store: Arc<dyn Store>,
    persistence: Arc<dyn Persistence>,
    renderer: Arc<dyn RenderDispatch>,
    effects: Arc<dyn UiEffects>,
    hooks: HookRunner,
    queue: PersistenceQueue,
    graph: Arc<PropagationGraph>,
    schema_source: Arc<dyn SchemaSource>,
    /// Lazy schema cache by type name; `None` memoizes a missing schema.
    schemas: RwLock<HashMap<String, Option<Arc<Schema>>>>,
    observer: RwLock<Option<Weak<dyn CommitObserver>>>,
    /// Outstanding saves; nonzero blocks focus-stealing in the host UI.
    saving: AtomicUsize,
    page_metadata: Debouncer,
    layout_metadata: Debouncer,
}

impl SaveOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        persistence: Arc<dyn Persistence>,
        renderer: Arc<dyn RenderDispatch>,
        effects: Arc<dyn UiEffects>,
        hooks: HookRunner,
        queue: PersistenceQueue,
        graph: Arc<PropagationGraph>,
        schema_source: Arc<dyn SchemaSource>,
    ) -> Self {
        let page_effects = effects.clone();
        let layout_effects = effects.clone();
        Self {
            store,
            persistence,
            renderer,
            effects,
            hooks,
            queue,
            graph,
            schema_source,
            schemas: RwLock::new(HashMap::new()),
            observer: RwLock::new(None),
            saving: AtomicUsize::new(0),
            page_metadata: Debouncer::new(
                METADATA_REFRESH_DEBOUNCE,
                Arc::new(move || {
                    let effects = page_effects.clone();
                    async move { effects.refresh_page_metadata().await }.boxed()
                }),
            ),
            layout_metadata: Debouncer::new(
                METADATA_REFRESH_DEBOUNCE,
                Arc::new(move || {
                    let effects = layout_effects.clone();
                    async move { effects.refresh_layout_metadata().await }.boxed()
                }),
            ),
        }
    }

    /// True while any save is outstanding.
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst) > 0
    }

    pub fn set_commit_observer(&self, observer: Weak<dyn CommitObserver>) {
        *self.observer.write().unwrap() = Some(observer);
    }

    /// Register a schema directly (skips the lazy load).
    pub fn register_schema(&self, type_name: &str, schema: Schema) {
        self.graph.register(type_name, &schema);
        self.schemas
            .write()
            .unwrap()
            .insert(type_name.to_string(), Some(Arc::new(schema)));
    }

    /// Clear the propagation graph and schema cache (full reload).
    pub fn reset(&self) {
        self.graph.reset();
        self.schemas.write().unwrap().clear();
    }

    /// Save a component through the full pipeline. Side effect: store
    /// commit and render dispatch; resolves once propagation settles.
    pub fn save_component(&self, req: SaveRequest) -> BoxFuture<'_, Result<(), EngineError>> {
        async move {
            let type_name = component_type(&req.uri)?.to_string();
            self.ensure_schema(&type_name);

            let old_data = match req.prev_data.clone() {
                Some(prev) => prev,
                None => self.store.component_data(&req.uri).unwrap_or_default(),
            };

            // Idempotence: re-saving unchanged data is a no-op.
            let changed = if req.replace {
                diff_fields(&old_data, &req.data)
            } else {
                changed_fields(&old_data, &req.data)
            };
            if changed.is_empty() && !req.force {
                tracing::debug!(uri = %req.uri, "no fields changed; skipping save");
                return Ok(());
            }

            self.saving.fetch_add(1, Ordering::SeqCst);
            self.effects.progress_started();
            if req.snapshot {
                self.notify_save_starting();
            }

            let result = self.run_pipeline(&req, &type_name, &old_data).await;

            // Always runs, including on the error path.
            self.saving.fetch_sub(1, Ordering::SeqCst);
            if self.store.in_layout(&req.uri) {
                self.layout_metadata.trigger();
            } else {
                self.page_metadata.trigger();
            }
            result
        }
        .boxed()
    }

    async fn run_pipeline(
        &self,
        req: &SaveRequest,
        type_name: &str,
        old_data: &FieldMap,
    ) -> Result<(), EngineError> {
        let candidate = if req.replace {
            req.data.clone()
        } else {
            merge(old_data, &req.data)
        };

        let hooked = match self.hooks.run_save_hook(&req.uri, &candidate).await {
            Ok(hooked) => hooked,
            Err(err) => return self.revert(req, old_data, err).await,
        };

        let args = json!({ "uri": req.uri, "data": hooked });
        let persistence = self.persistence.clone();
        let uri = req.uri.clone();
        let outgoing = hooked.clone();
        let work = async move {
            persistence
                .save(&uri, &outgoing, false)
                .await
                .map_err(|source| EngineError::Persistence {
                    uri: uri.clone(),
                    source,
                })
        }
        .boxed();
        let persisted = match self.queue.enqueue("save", &args, work).await {
            Ok(saved) => saved,
            Err(err) => return self.revert(req, old_data, err).await,
        };

        // Strictly after persistence, before the render hook: subscribers
        // never see pre-persistence data.
        self.propagate(type_name, &persisted, req.event.clone(), req.snapshot)
            .await;

        let renderable = match self.hooks.run_render_hook(&req.uri, &persisted).await {
            Ok(renderable) => renderable,
            Err(err) => {
                // Already persisted; no revert arc from the render stage.
                tracing::error!(uri = %req.uri, error = %err, "render hook failed; rendering persisted data");
                persisted.clone()
            }
        };

        let committed_fields = if req.replace {
            diff_fields(old_data, &renderable)
        } else {
            changed_fields(old_data, &renderable)
        };
        if !committed_fields.is_empty() || req.force {
            self.store
                .commit_component(&req.uri, renderable.clone(), committed_fields.clone());
            tracing::info!(uri = %req.uri, fields = ?committed_fields, "committed component data");
        }

        self.renderer
            .render(RenderRequest {
                uri: req.uri.clone(),
                data: renderable,
                snapshot: req.snapshot,
                fields: committed_fields,
            })
            .await;

        self.notify_committed(req.snapshot);
        Ok(())
    }

    /// Restore pre-save data, re-render it, surface a retry notification,
    /// and re-raise so a propagation fan-out sees the branch failure.
    async fn revert(
        &self,
        req: &SaveRequest,
        old_data: &FieldMap,
        err: EngineError,
    ) -> Result<(), EngineError> {
        tracing::error!(uri = %req.uri, error = %err, "save failed; reverting to previous data");
        let attempted: Vec<String> = req.data.keys().cloned().collect();
        self.store
            .commit_component(&req.uri, old_data.clone(), attempted.clone());
        self.renderer
            .render(RenderRequest {
                uri: req.uri.clone(),
                data: old_data.clone(),
                snapshot: req.snapshot,
                fields: attempted,
            })
            .await;
        self.effects.save_failed(&req.uri, &err.to_string());
        Err(err)
    }

    /// Fan saved field values out to subscribing component types.
    ///
    /// Resolves when every branch settles; branch failures are logged and
    /// never affect the publisher's own result.
    fn propagate<'a>(
        &'a self,
        type_name: &str,
        data: &FieldMap,
        event: Option<Arc<PropagationEvent>>,
        snapshot: bool,
    ) -> BoxFuture<'a, ()> {
        // Fast path: most components publish nothing.
        if !self.graph.publishes(type_name) {
            return futures::future::ready(()).boxed();
        }

        let event = event.unwrap_or_else(PropagationEvent::new);
        event.mark_published(type_name);
        let plan = self.graph.plan(type_name, data);
        tracing::debug!(
            event = %event.id,
            publisher = type_name,
            targets = plan.targets.len(),
            "propagating published fields"
        );

        async move {
            for (field, value) in plan.page_updates {
                self.effects.update_page_field(&field, value).await;
            }

            // Claim pass: synchronous, before any subscriber work is
            // scheduled. A type already updated in this event only gets
            // its payload merged, never a second dispatch.
            let mut publishers = Vec::new();
            let mut sinks = Vec::new();
            for target in plan.targets {
                if !event.claim(&target.type_name, &target.payload) {
                    tracing::debug!(
                        event = %event.id,
                        target = %target.type_name,
                        "already updated in this event; skipping"
                    );
                    continue;
                }
                if self.graph.publishes(&target.type_name) {
                    publishers.push(target);
                } else {
                    sinks.push(target);
                }
            }

            // Transitive publishers run first so their own publishes can
            // top up the accumulated payloads the sinks read below.
            self.fan_out(publishers, &event, snapshot).await;
            self.fan_out(sinks, &event, snapshot).await;
        }
        .boxed()
    }

    async fn fan_out(
        &self,
        targets: Vec<SubscriberUpdate>,
        event: &Arc<PropagationEvent>,
        snapshot: bool,
    ) {
        let mut branches = Vec::new();
        for target in targets {
            let payload = event.take_payload(&target.type_name);
            if payload.is_empty() {
                continue;
            }
            for uri in self.store.components_of_type(&target.type_name) {
                if !scope_allows(
                    target.scope.as_deref(),
                    &target.type_name,
                    self.store.in_layout(&uri),
                ) {
                    continue;
                }
                branches.push((uri, payload.clone()));
            }
        }

        // Sibling branches run concurrently; one failing branch must not
        // block the others.
        let results = join_all(branches.into_iter().map(|(uri, payload)| {
            let event = event.clone();
            async move {
                let result = self
                    .save_component(SaveRequest {
                        uri: uri.clone(),
                        data: payload,
                        event: Some(event),
                        snapshot,
                        prev_data: None,
                        replace: false,
                        force: false,
                    })
                    .await;
                (uri, result)
            }
        }))
        .await;

        for (uri, result) in results {
            if let Err(err) = result {
                tracing::warn!(uri = %uri, event = %event.id, error = %err, "propagation branch failed");
            }
        }
    }

    fn ensure_schema(&self, type_name: &str) {
        if self.schemas.read().unwrap().contains_key(type_name) {
            return;
        }
        let loaded = self.schema_source.load_schema(type_name).map(Arc::new);
        if let Some(schema) = &loaded {
            self.graph.register(type_name, schema);
        }
        self.schemas
            .write()
            .unwrap()
            .insert(type_name.to_string(), loaded);
    }

    fn notify_save_starting(&self) {
        if let Some(observer) = self.observer.read().unwrap().as_ref().and_then(Weak::upgrade) {
            observer.save_starting();
        }
    }

    fn notify_committed(&self, snapshot: bool) {
        if let Some(observer) = self.observer.read().unwrap().as_ref().and_then(Weak::upgrade) {
            observer.committed(snapshot);
        }
    }
}
