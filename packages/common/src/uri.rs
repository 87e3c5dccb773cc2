//! Component URIs
//!
//! Components are addressed by stable string URIs of the form:
//!
//! ```text
//! <site>/_components/<type>[/instances/<id>]
//! ```
//!
//! The URI without an `/instances/` suffix addresses the type's default
//! (bootstrap) data. Everything in the engine that needs a component's
//! type name derives it from the URI rather than carrying it separately.

use thiserror::Error;

const COMPONENT_MARKER: &str = "/_components/";
const INSTANCE_MARKER: &str = "/instances/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("not a component uri: {0}")]
    NotComponent(String),
}

/// True if the URI addresses a component (default or instance).
pub fn is_component(uri: &str) -> bool {
    uri.contains(COMPONENT_MARKER)
}

/// Derive the component type name from a URI.
pub fn component_type(uri: &str) -> Result<&str, UriError> {
    let start = uri
        .find(COMPONENT_MARKER)
        .ok_or_else(|| UriError::NotComponent(uri.to_string()))?
        + COMPONENT_MARKER.len();
    let rest = &uri[start..];
    let end = rest.find('/').unwrap_or(rest.len());
    if end == 0 {
        return Err(UriError::NotComponent(uri.to_string()));
    }
    Ok(&rest[..end])
}

/// Instance id, if the URI addresses a specific instance.
pub fn instance_id(uri: &str) -> Option<&str> {
    let start = uri.find(INSTANCE_MARKER)? + INSTANCE_MARKER.len();
    let rest = &uri[start..];
    if rest.is_empty() {
        return None;
    }
    let end = rest.find('/').unwrap_or(rest.len());
    Some(&rest[..end])
}
