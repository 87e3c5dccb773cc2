//! # Publish/Subscribe Graph
//!
//! Schemas declare which fields broadcast to which topics and which
//! fields listen. The graph is built by scanning schemas as they are
//! registered and answers two questions during a save:
//!
//! - does this type publish anything at all (fast path: most don't)
//! - given the saved data, which types should receive which merged
//!   payload, and which reserved page-level fields should update
//!
//! The graph is an explicit object handed to the orchestrator, not
//! ambient module state. `register` and `reset` are its only mutators.
//!
//! ## Events
//!
//! Every causal chain of saves carries one [`PropagationEvent`]. The
//! event records which types have already published or been updated; a
//! type already on the stack is never dispatched again. That membership
//! check is synchronous and happens before any asynchronous subscriber
//! work is scheduled, which makes cycle prevention a structural property
//! of the call graph.
//!
//! Events are owned by the recursive call chain and dropped when
//! propagation settles, so `reset` only has registries to clear.

use amphora_common::{FieldMap, Schema, TopicDecl};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Topics in this family feed page-level aggregate fields (title,
/// authors, ...) instead of component instances.
pub const PAGE_TOPIC_PREFIX: &str = "page:";

const SUPPORTED_SCOPES: &[&str] = &["page", "layout"];

#[derive(Debug, Default, Clone)]
struct SubscriberEntry {
    fields: BTreeSet<String>,
    scope: Option<String>,
}

/// Schema-derived publish/subscribe registries.
#[derive(Default)]
pub struct PropagationGraph {
    /// type name → field name → topics it publishes
    publishers: RwLock<HashMap<String, HashMap<String, Vec<TopicDecl>>>>,
    /// topic → subscribing type name → fields (+ optional scope)
    subscribers: RwLock<HashMap<String, HashMap<String, SubscriberEntry>>>,
}

/// One subscribing type's share of a publish step.
#[derive(Debug, Clone)]
pub struct SubscriberUpdate {
    pub type_name: String,
    pub payload: FieldMap,
    pub scope: Option<String>,
}

/// Everything a single publish step needs to dispatch.
#[derive(Debug, Default)]
pub struct PublishPlan {
    /// Reserved page-topic values: (page field name, value).
    pub page_updates: Vec<(String, Value)>,
    pub targets: Vec<SubscriberUpdate>,
}

impl PropagationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a schema's publish/subscribe declarations into the
    /// registries. Re-registering a type merges.
    pub fn register(&self, type_name: &str, schema: &Schema) {
        let mut publishers = self.publishers.write().unwrap();
        let mut subscribers = self.subscribers.write().unwrap();

        for (field, topics) in schema.publishing_fields() {
            publishers
                .entry(type_name.to_string())
                .or_default()
                .entry(field.clone())
                .or_default()
                .extend(topics.iter().cloned());
        }

        for (field, topics) in schema.subscribing_fields() {
            for decl in topics.iter() {
                let entry = subscribers
                    .entry(decl.name().to_string())
                    .or_default()
                    .entry(type_name.to_string())
                    .or_default();
                entry.fields.insert(field.clone());
                if let Some(scope) = decl.scope() {
                    entry.scope = Some(scope.to_string());
                }
            }
        }

        tracing::debug!(type_name, "registered schema pubsub declarations");
    }

    /// Clear both registries (test isolation and full reload).
    pub fn reset(&self) {
        self.publishers.write().unwrap().clear();
        self.subscribers.write().unwrap().clear();
    }

    /// Fast-path probe: does the type publish anything?
    pub fn publishes(&self, type_name: &str) -> bool {
        self.publishers.read().unwrap().contains_key(type_name)
    }

    /// Build the dispatch plan for one publish step.
    ///
    /// Panics on an unsupported scope keyword: that is a schema authoring
    /// bug and must fail loudly rather than be swallowed by the
    /// branch-failure logging downstream.
    pub fn plan(&self, type_name: &str, data: &FieldMap) -> PublishPlan {
        let publishers = self.publishers.read().unwrap();
        let subscribers = self.subscribers.read().unwrap();

        let mut plan = PublishPlan::default();
        let Some(fields) = publishers.get(type_name) else {
            return plan;
        };

        // topic → published value; BTreeMap iteration keeps this
        // deterministic when several fields publish the same topic.
        let mut published: BTreeMap<&str, &Value> = BTreeMap::new();
        for (field, topics) in fields.iter().collect::<BTreeMap<_, _>>() {
            let Some(value) = data.get(field) else {
                continue;
            };
            for decl in topics {
                validate_scope(type_name, decl);
                if let Some(page_field) = decl.name().strip_prefix(PAGE_TOPIC_PREFIX) {
                    plan.page_updates
                        .push((page_field.to_string(), value.clone()));
                } else {
                    published.insert(decl.name(), value);
                }
            }
        }

        // Merge per subscribing type: each subscribed field receives the
        // topic's published value under its own field name.
        let mut targets: BTreeMap<String, SubscriberUpdate> = BTreeMap::new();
        for (topic, value) in published {
            let Some(subs) = subscribers.get(topic) else {
                continue;
            };
            for (sub_type, entry) in subs {
                let target = targets
                    .entry(sub_type.clone())
                    .or_insert_with(|| SubscriberUpdate {
                        type_name: sub_type.clone(),
                        payload: FieldMap::new(),
                        scope: None,
                    });
                for field in &entry.fields {
                    target.payload.insert(field.clone(), value.clone());
                }
                if entry.scope.is_some() {
                    target.scope = entry.scope.clone();
                }
            }
        }
        plan.targets = targets.into_values().collect();
        plan
    }
}

fn validate_scope(type_name: &str, decl: &TopicDecl) {
    if let Some(scope) = decl.scope() {
        if !SUPPORTED_SCOPES.contains(&scope) {
            panic!(
                "unsupported pubsub scope `{scope}` on topic `{}` of `{type_name}`",
                decl.name()
            );
        }
    }
}

/// Filter live instances by a subscribe declaration's scope keyword.
///
/// Panics on an unsupported keyword (UnknownScope is fatal).
pub(crate) fn scope_allows(scope: Option<&str>, type_name: &str, in_layout: bool) -> bool {
    match scope {
        None => true,
        Some("page") => !in_layout,
        Some("layout") => in_layout,
        Some(other) => {
            panic!("unsupported pubsub scope `{other}` while fanning out to `{type_name}`")
        }
    }
}

/// The causal identifier threading a save and every save it transitively
/// triggers. Carries the visited-type stack (cycle prevention) and the
/// per-type payload accumulator.
pub struct PropagationEvent {
    pub id: Uuid,
    state: Mutex<EventState>,
}

impl std::fmt::Debug for PropagationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationEvent")
            .field("id", &self.id)
            .finish()
    }
}

#[derive(Default)]
struct EventState {
    visited: Vec<String>,
    payloads: HashMap<String, FieldMap>,
}

impl PropagationEvent {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            id: Uuid::new_v4(),
            state: Mutex::new(EventState::default()),
        })
    }

    /// Record that a type has published under this event.
    pub fn mark_published(&self, type_name: &str) {
        let mut state = self.state.lock().unwrap();
        if !state.visited.iter().any(|t| t == type_name) {
            state.visited.push(type_name.to_string());
        }
    }

    pub fn has_visited(&self, type_name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .visited
            .iter()
            .any(|t| t == type_name)
    }

    /// Merge a payload for a target type and claim it for dispatch.
    ///
    /// Returns true only the first time the type is seen in this event;
    /// later publishers still merge their fields but must not dispatch.
    pub fn claim(&self, type_name: &str, payload: &FieldMap) -> bool {
        let mut state = self.state.lock().unwrap();
        let accumulated = state.payloads.entry(type_name.to_string()).or_default();
        for (field, value) in payload {
            accumulated.insert(field.clone(), value.clone());
        }
        if state.visited.iter().any(|t| t == type_name) {
            false
        } else {
            state.visited.push(type_name.to_string());
            true
        }
    }

    /// The accumulated payload for a claimed type, read at dispatch time.
    pub fn take_payload(&self, type_name: &str) -> FieldMap {
        self.state
            .lock()
            .unwrap()
            .payloads
            .remove(type_name)
            .unwrap_or_default()
    }

    /// Ordered list of types that have published or been updated.
    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }
}
