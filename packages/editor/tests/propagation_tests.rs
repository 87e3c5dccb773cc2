//! End-to-end propagation scenarios: schema-declared publish/subscribe
//! fan-out driven through the full engine, with cycle prevention, scope
//! filtering, and page-topic routing.

use amphora_editor::{
    ComponentEngine, EngineConfig, FieldMap, MemoryStore, NoModels, PersistenceError, Persistence,
    PropagationEvent, RenderDispatch, RenderRequest, SaveRequest, Schema, SchemaSource, Store,
    UiEffects,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn map(value: Value) -> FieldMap {
    value.as_object().unwrap().clone()
}

fn schema(value: Value) -> Schema {
    serde_json::from_value(value).unwrap()
}

/// Echoes data back and records every save call in order.
#[derive(Default)]
struct RecordingPersistence {
    calls: Mutex<Vec<String>>,
}

impl RecordingPersistence {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|uri| uri.contains(needle))
            .count()
    }
}

#[async_trait]
impl Persistence for RecordingPersistence {
    async fn save(
        &self,
        uri: &str,
        data: &FieldMap,
        _run_hooks: bool,
    ) -> Result<FieldMap, PersistenceError> {
        self.calls.lock().unwrap().push(uri.to_string());
        Ok(data.clone())
    }
}

struct NullRenderer;

#[async_trait]
impl RenderDispatch for NullRenderer {
    async fn render(&self, _request: RenderRequest) {}
}

#[derive(Default)]
struct RecordingEffects {
    page_fields: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl UiEffects for RecordingEffects {
    async fn update_page_field(&self, field: &str, value: Value) {
        self.page_fields
            .lock()
            .unwrap()
            .push((field.to_string(), value));
    }
}

struct NoSchemas;
impl SchemaSource for NoSchemas {
    fn load_schema(&self, _type_name: &str) -> Option<Schema> {
        None
    }
}

struct Fixture {
    engine: ComponentEngine,
    store: Arc<MemoryStore>,
    persistence: Arc<RecordingPersistence>,
    effects: Arc<RecordingEffects>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let persistence = Arc::new(RecordingPersistence::default());
    let effects = Arc::new(RecordingEffects::default());
    let engine = ComponentEngine::new(EngineConfig {
        store: store.clone(),
        persistence: persistence.clone(),
        renderer: Arc::new(NullRenderer),
        effects: effects.clone(),
        schemas: Arc::new(NoSchemas),
        models: Arc::new(NoModels),
        locals: FieldMap::new(),
    });
    Fixture {
        engine,
        store,
        persistence,
        effects,
    }
}

#[tokio::test]
async fn test_publish_updates_every_subscriber_instance() {
    let fx = fixture();
    fx.engine
        .register_schema("article", schema(json!({ "headline": { "publish": "story" } })));
    fx.engine
        .register_schema("teaser", schema(json!({ "headline": { "subscribe": "story" } })));

    fx.store
        .insert("s/_components/article/instances/1", map(json!({ "headline": "old" })));
    fx.store
        .insert("s/_components/teaser/instances/1", map(json!({ "headline": "old" })));
    fx.store
        .insert("s/_components/teaser/instances/2", map(json!({ "headline": "old" })));

    fx.engine
        .save(
            "s/_components/article/instances/1",
            map(json!({ "headline": "Breaking" })),
        )
        .await
        .unwrap();

    assert_eq!(fx.persistence.calls_for("/teaser/"), 2);
    assert_eq!(
        fx.store.component_data("s/_components/teaser/instances/1"),
        Some(map(json!({ "headline": "Breaking" })))
    );
    assert_eq!(
        fx.store.component_data("s/_components/teaser/instances/2"),
        Some(map(json!({ "headline": "Breaking" })))
    );
}

#[tokio::test]
async fn test_publisher_never_receives_its_own_topic() {
    let fx = fixture();
    // One type both publishes and subscribes to the same topic.
    fx.engine.register_schema(
        "article",
        schema(json!({ "headline": { "publish": "story", "subscribe": "story" } })),
    );

    fx.store
        .insert("s/_components/article/instances/1", map(json!({ "headline": "old" })));
    fx.store
        .insert("s/_components/article/instances/2", map(json!({ "headline": "old" })));

    fx.engine
        .save(
            "s/_components/article/instances/1",
            map(json!({ "headline": "new" })),
        )
        .await
        .unwrap();

    // Only the edited instance was saved; the sibling was not updated
    // through the type's own publish.
    assert_eq!(
        fx.persistence.calls(),
        vec!["s/_components/article/instances/1".to_string()]
    );
    assert_eq!(
        fx.store.component_data("s/_components/article/instances/2"),
        Some(map(json!({ "headline": "old" })))
    );
}

#[tokio::test]
async fn test_chain_delivers_one_cumulative_update_per_type() {
    let fx = fixture();
    // article → (t1) → byline → (t2) → footer, and footer also
    // subscribes to t1 directly.
    fx.engine
        .register_schema("article", schema(json!({ "headline": { "publish": "t1" } })));
    fx.engine.register_schema(
        "byline",
        schema(json!({
            "headline": { "subscribe": "t1" },
            "author": { "publish": "t2" }
        })),
    );
    fx.engine.register_schema(
        "footer",
        schema(json!({
            "title": { "subscribe": "t1" },
            "credit": { "subscribe": "t2" }
        })),
    );

    fx.store
        .insert("s/_components/article/instances/1", FieldMap::new());
    fx.store.insert(
        "s/_components/byline/instances/1",
        map(json!({ "author": "jo" })),
    );
    fx.store
        .insert("s/_components/footer/instances/1", FieldMap::new());

    fx.engine
        .save(
            "s/_components/article/instances/1",
            map(json!({ "headline": "x" })),
        )
        .await
        .unwrap();

    // The footer subscribed to both legs of the chain but was saved
    // exactly once, with the payloads of both merged.
    assert_eq!(fx.persistence.calls_for("/footer/"), 1);
    assert_eq!(
        fx.store.component_data("s/_components/footer/instances/1"),
        Some(map(json!({ "title": "x", "credit": "jo" })))
    );
}

#[tokio::test]
async fn test_mutual_subscription_terminates() {
    let fx = fixture();
    fx.engine.register_schema(
        "ping",
        schema(json!({
            "out": { "publish": "a" },
            "in": { "subscribe": "b" }
        })),
    );
    fx.engine.register_schema(
        "pong",
        schema(json!({
            "out": { "publish": "b" },
            "in": { "subscribe": "a" }
        })),
    );

    fx.store.insert(
        "s/_components/ping/instances/1",
        map(json!({ "out": "old" })),
    );
    fx.store.insert(
        "s/_components/pong/instances/1",
        map(json!({ "out": "reply" })),
    );

    fx.engine
        .save(
            "s/_components/ping/instances/1",
            map(json!({ "out": "new" })),
        )
        .await
        .unwrap();

    // ping published to pong; pong's publish back to ping was suppressed
    // because ping already participated in this event.
    assert_eq!(fx.persistence.calls_for("/ping/"), 1);
    assert_eq!(fx.persistence.calls_for("/pong/"), 1);
    assert_eq!(
        fx.store.component_data("s/_components/pong/instances/1"),
        Some(map(json!({ "out": "reply", "in": "new" })))
    );
    // ping's subscribed field was never written.
    assert_eq!(
        fx.store.component_data("s/_components/ping/instances/1"),
        Some(map(json!({ "out": "new" })))
    );
}

#[tokio::test]
async fn test_scoped_subscription_filters_instances() {
    let fx = fixture();
    fx.engine
        .register_schema("article", schema(json!({ "headline": { "publish": "story" } })));
    fx.engine.register_schema(
        "banner",
        schema(json!({
            "headline": { "subscribe": { "name": "story", "scope": "layout" } }
        })),
    );

    fx.store
        .insert("s/_components/article/instances/1", FieldMap::new());
    fx.store
        .insert("s/_components/banner/instances/page", FieldMap::new());
    fx.store
        .insert("s/_components/banner/instances/layout", FieldMap::new());
    fx.store
        .place_in_layout("s/_components/banner/instances/layout");

    fx.engine
        .save(
            "s/_components/article/instances/1",
            map(json!({ "headline": "x" })),
        )
        .await
        .unwrap();

    assert_eq!(
        fx.store
            .component_data("s/_components/banner/instances/layout"),
        Some(map(json!({ "headline": "x" })))
    );
    assert_eq!(
        fx.store.component_data("s/_components/banner/instances/page"),
        Some(FieldMap::new())
    );
}

#[tokio::test]
#[should_panic(expected = "unsupported pubsub scope")]
async fn test_unknown_subscribe_scope_fails_loudly() {
    let fx = fixture();
    fx.engine
        .register_schema("article", schema(json!({ "headline": { "publish": "story" } })));
    fx.engine.register_schema(
        "banner",
        schema(json!({
            "headline": { "subscribe": { "name": "story", "scope": "galaxy" } }
        })),
    );
    fx.store
        .insert("s/_components/article/instances/1", FieldMap::new());
    fx.store
        .insert("s/_components/banner/instances/1", FieldMap::new());

    let _ = fx
        .engine
        .save(
            "s/_components/article/instances/1",
            map(json!({ "headline": "x" })),
        )
        .await;
}

#[tokio::test]
async fn test_page_topic_updates_page_field_not_components() {
    let fx = fixture();
    fx.engine.register_schema(
        "article",
        schema(json!({ "headline": { "publish": "page:title" } })),
    );
    fx.store
        .insert("s/_components/article/instances/1", FieldMap::new());

    fx.engine
        .save(
            "s/_components/article/instances/1",
            map(json!({ "headline": "Breaking" })),
        )
        .await
        .unwrap();

    assert_eq!(
        fx.effects.page_fields.lock().unwrap().clone(),
        vec![("title".to_string(), json!("Breaking"))]
    );
    assert_eq!(fx.persistence.calls().len(), 1);
}

#[tokio::test]
async fn test_event_threads_through_the_whole_chain() {
    let fx = fixture();
    fx.engine
        .register_schema("article", schema(json!({ "headline": { "publish": "story" } })));
    fx.engine
        .register_schema("teaser", schema(json!({ "headline": { "subscribe": "story" } })));
    fx.store
        .insert("s/_components/article/instances/1", FieldMap::new());
    fx.store
        .insert("s/_components/teaser/instances/1", FieldMap::new());

    let event = PropagationEvent::new();
    let mut request = SaveRequest::new(
        "s/_components/article/instances/1",
        map(json!({ "headline": "x" })),
    );
    request.event = Some(event.clone());
    fx.engine.save_with(request).await.unwrap();

    // Publisher and subscriber were both recorded on the one event.
    assert_eq!(
        event.visited(),
        vec!["article".to_string(), "teaser".to_string()]
    );
    assert!(event.has_visited("article"));
    assert!(event.has_visited("teaser"));
    assert!(!event.has_visited("banner"));
}
