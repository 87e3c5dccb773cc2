//! # Amphora Common
//!
//! Shared types for the Amphora editing engine:
//!
//! - Component URIs and type derivation
//! - Schemas with publish/subscribe declarations
//! - Field-map helpers (shallow diff, merge, projection)
//!
//! Component field data is plain JSON (`serde_json::Map`), matching the
//! wire format the platform persists and renders from.

mod schema;
mod uri;
mod value;

pub use schema::{FieldSchema, Schema, TopicDecl, TopicList};
pub use uri::{component_type, instance_id, is_component, UriError};
pub use value::{changed_fields, diff_fields, merge, pick, FieldMap};
