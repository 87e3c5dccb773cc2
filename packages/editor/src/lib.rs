//! # Amphora Editor
//!
//! Component data synchronization engine for Amphora.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ edit event: {uri, changed field data}       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ orchestrator: per-save pipeline             │
//! │  diff → save hook → persist → propagate     │
//! │       → render hook → commit → render       │
//! │  (revert + re-render on failure)            │
//! └─────────────────────────────────────────────┘
//!          ↓               ↓              ↓
//! ┌──────────────┐ ┌──────────────┐ ┌───────────┐
//! │ queue:       │ │ pubsub:      │ │ history:  │
//! │ serialized + │ │ fan-out to   │ │ debounced │
//! │ deduplicated │ │ subscribers, │ │ snapshots,│
//! │ persistence  │ │ cycle-safe   │ │ undo/redo │
//! └──────────────┘ └──────────────┘ └───────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Store is source of truth**: the engine mutates component data only
//!    through committed updates; renders are derived views
//! 2. **Serialized persistence**: one outgoing save at a time, identical
//!    in-flight saves are shared, not repeated
//! 3. **Cycle-safe propagation**: a component type is updated at most once
//!    per originating save event
//! 4. **Revert on failure**: a failed hook or persistence call restores and
//!    re-renders the pre-save data; nothing is half-committed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use amphora_editor::{ComponentEngine, EngineConfig, MemoryStore};
//!
//! let engine = ComponentEngine::new(EngineConfig {
//!     store,        // component data
//!     persistence,  // remote save transport
//!     renderer,     // DOM render dispatch
//!     effects,      // progress / notifications / page metadata
//!     schemas,      // lazy schema lookup
//!     models,       // optional per-type save/render hooks
//!     locals,       // edit-session locals passed to hooks
//! });
//!
//! engine.save("site.com/_components/article/instances/a", data).await?;
//! engine.undo().await;
//! engine.redo().await;
//! ```

mod collaborators;
mod debounce;
mod engine;
mod errors;
mod history;
mod hooks;
mod orchestrator;
mod pubsub;
mod queue;

pub use collaborators::{
    MemoryStore, NoopEffects, Persistence, RenderDispatch, RenderRequest, SchemaSource, Store,
    UiEffects,
};
pub use debounce::{DebouncedAction, Debouncer};
pub use engine::{ComponentEngine, EngineConfig};
pub use errors::{EngineError, HookKind, PersistenceError};
pub use history::{Snapshot, SnapshotManager, SNAPSHOT_DEBOUNCE};
pub use hooks::{
    ComponentModel, HookArgs, HookFn, HookRunner, ModelSource, NoModels, RENDER_HOOK_TIMEOUT,
    SAVE_HOOK_TIMEOUT,
};
pub use orchestrator::{
    CommitObserver, SaveOrchestrator, SaveRequest, METADATA_REFRESH_DEBOUNCE,
};
pub use pubsub::{
    PropagationEvent, PropagationGraph, PublishPlan, SubscriberUpdate, PAGE_TOPIC_PREFIX,
};
pub use queue::{PendingSave, PersistenceQueue, SaveResult};

// Re-export common types for convenience
pub use amphora_common::{FieldMap, Schema};
