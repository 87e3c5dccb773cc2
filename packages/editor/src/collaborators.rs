//! # Collaborator Interfaces
//!
//! The engine does not implement DOM plumbing, form widgets, routing, or
//! the HTTP transport. It consumes them through the narrow traits here.
//!
//! `MemoryStore` is the in-process `Store` implementation, used by tests
//! and by embedded hosts that keep the component tree in memory.

use crate::errors::PersistenceError;
use amphora_common::{component_type, FieldMap, Schema};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

/// Lazy schema lookup by component type name.
///
/// Returning `None` means the type has no schema; the engine treats it as
/// publishing and subscribing to nothing.
pub trait SchemaSource: Send + Sync {
    fn load_schema(&self, type_name: &str) -> Option<Schema>;
}

/// Central component-data store.
///
/// Commits are synchronous state mutations; the engine never mutates
/// component data through any other path.
pub trait Store: Send + Sync {
    /// Current data for a component, if it exists in the store.
    fn component_data(&self, uri: &str) -> Option<FieldMap>;

    /// Commit a component's full data; `fields` names what changed.
    fn commit_component(&self, uri: &str, data: FieldMap, fields: Vec<String>);

    /// URIs of all live instances of a type currently present on the page.
    fn components_of_type(&self, type_name: &str) -> Vec<String>;

    /// Deep copy of the full component-data tree (for snapshots).
    fn component_tree(&self) -> BTreeMap<String, FieldMap>;

    /// True if the component lives in the shared layout rather than the
    /// page-specific area.
    fn in_layout(&self, uri: &str) -> bool;

    /// True if the type has a client-renderable template. Types without
    /// one cannot be re-rendered during undo/redo and are skipped.
    fn has_client_template(&self, type_name: &str) -> bool;
}

/// Remote persistence transport.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Persist a component's data. The engine always passes
    /// `run_hooks = false` because hooks already ran client-side.
    async fn save(
        &self,
        uri: &str,
        data: &FieldMap,
        run_hooks: bool,
    ) -> Result<FieldMap, PersistenceError>;
}

/// A committed component ready to be re-rendered in place.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub uri: String,
    pub data: FieldMap,
    /// False when this render replays history (undo/redo) and must not be
    /// captured as a new snapshot.
    pub snapshot: bool,
    /// Field names whose values changed in this commit.
    pub fields: Vec<String>,
}

/// DOM render dispatch; side-effect only.
#[async_trait]
pub trait RenderDispatch: Send + Sync {
    async fn render(&self, request: RenderRequest);
}

/// Cross-cutting UI side effects: progress indicator, failure
/// notifications, page-level aggregate fields, metadata refresh.
///
/// Default bodies are no-ops so hosts implement only what they surface.
#[async_trait]
pub trait UiEffects: Send + Sync {
    /// A save entered the pipeline; a progress indicator may start.
    fn progress_started(&self) {}

    /// The persistence queue drained completely (no pending or in-flight
    /// entries); the progress indicator can finalize.
    fn persistence_drained(&self) {}

    /// A save failed and was reverted; surface a retry affordance.
    fn save_failed(&self, _uri: &str, _message: &str) {}

    /// A reserved page topic published a value for a page-level aggregate
    /// field (title, authors, ...).
    async fn update_page_field(&self, _field: &str, _value: Value) {}

    async fn refresh_page_metadata(&self) {}

    async fn refresh_layout_metadata(&self) {}
}

/// No-op effects for hosts (and tests) that surface nothing.
#[derive(Debug, Default)]
pub struct NoopEffects;

#[async_trait]
impl UiEffects for NoopEffects {}

/// In-memory component store.
///
/// Removed components are destroyed by committing an empty record, never
/// deleted, so snapshots and undo can address them by URI.
#[derive(Default)]
pub struct MemoryStore {
    components: RwLock<HashMap<String, FieldMap>>,
    layout_uris: RwLock<HashSet<String>>,
    server_only_types: RwLock<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a component without going through the save pipeline.
    pub fn insert(&self, uri: impl Into<String>, data: FieldMap) {
        self.components.write().unwrap().insert(uri.into(), data);
    }

    /// Mark a component as living in the shared layout.
    pub fn place_in_layout(&self, uri: impl Into<String>) {
        self.layout_uris.write().unwrap().insert(uri.into());
    }

    /// Mark a type as server-rendered only (no client template).
    pub fn mark_server_only(&self, type_name: impl Into<String>) {
        self.server_only_types
            .write()
            .unwrap()
            .insert(type_name.into());
    }
}

impl Store for MemoryStore {
    fn component_data(&self, uri: &str) -> Option<FieldMap> {
        self.components.read().unwrap().get(uri).cloned()
    }

    fn commit_component(&self, uri: &str, data: FieldMap, _fields: Vec<String>) {
        self.components
            .write()
            .unwrap()
            .insert(uri.to_string(), data);
    }

    fn components_of_type(&self, type_name: &str) -> Vec<String> {
        let mut uris: Vec<String> = self
            .components
            .read()
            .unwrap()
            .keys()
            .filter(|uri| component_type(uri).map(|t| t == type_name).unwrap_or(false))
            .cloned()
            .collect();
        uris.sort();
        uris
    }

    fn component_tree(&self) -> BTreeMap<String, FieldMap> {
        self.components
            .read()
            .unwrap()
            .iter()
            .map(|(uri, data)| (uri.clone(), data.clone()))
            .collect()
    }

    fn in_layout(&self, uri: &str) -> bool {
        self.layout_uris.read().unwrap().contains(uri)
    }

    fn has_client_template(&self, type_name: &str) -> bool {
        !self.server_only_types.read().unwrap().contains(type_name)
    }
}
