//! Component schemas
//!
//! A schema describes a component type's fields. The engine only
//! interprets the `publish` and `subscribe` declarations; everything else
//! (form widgets, labels, validation config) is retained verbatim so the
//! rest of the platform can read it, but never touched here.
//!
//! Schemas are read-only at runtime. They are loaded lazily and cached by
//! type name (the cache lives in the editor crate).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-type schema: field name → descriptor.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Schema {
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldSchema>,
}

/// A single field descriptor.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct FieldSchema {
    /// Topic(s) this field broadcasts to when the component saves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<TopicList>,

    /// Topic(s) this field receives values from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<TopicList>,

    /// Widget config and other keys the engine does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One topic declaration or a list of them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TopicList {
    One(TopicDecl),
    Many(Vec<TopicDecl>),
}

impl TopicList {
    pub fn iter(&self) -> impl Iterator<Item = &TopicDecl> {
        match self {
            TopicList::One(decl) => std::slice::from_ref(decl).iter(),
            TopicList::Many(decls) => decls.iter(),
        }
    }
}

/// A topic name, optionally qualified with a scope keyword.
///
/// The scope keyword is kept raw here; it is resolved (and validated)
/// during propagation, where an unsupported keyword is a fatal schema
/// authoring error.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TopicDecl {
    Name(String),
    Scoped { name: String, scope: String },
}

impl TopicDecl {
    pub fn name(&self) -> &str {
        match self {
            TopicDecl::Name(name) => name,
            TopicDecl::Scoped { name, .. } => name,
        }
    }

    pub fn scope(&self) -> Option<&str> {
        match self {
            TopicDecl::Name(_) => None,
            TopicDecl::Scoped { scope, .. } => Some(scope),
        }
    }
}

impl Schema {
    /// Fields that declare a publish topic.
    pub fn publishing_fields(&self) -> impl Iterator<Item = (&String, &TopicList)> {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.publish.as_ref().map(|topics| (name, topics)))
    }

    /// Fields that declare a subscribe topic.
    pub fn subscribing_fields(&self) -> impl Iterator<Item = (&String, &TopicList)> {
        self.fields
            .iter()
            .filter_map(|(name, field)| field.subscribe.as_ref().map(|topics| (name, topics)))
    }
}
