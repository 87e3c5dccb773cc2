//! Error types for the engine
//!
//! Errors are `Clone` because a deduplicated persistence call hands the
//! same failure to every caller sharing the in-flight entry.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{kind} hook failed for {uri}: {message}")]
    HookFailed {
        kind: HookKind,
        uri: String,
        message: String,
    },

    #[error("{kind} hook for {uri} timed out after {}ms", .timeout.as_millis())]
    HookTimedOut {
        kind: HookKind,
        uri: String,
        timeout: Duration,
    },

    #[error("failed to persist {uri}: {source}")]
    Persistence {
        uri: String,
        #[source]
        source: PersistenceError,
    },

    #[error("malformed component uri: {0}")]
    MalformedUri(#[from] amphora_common::UriError),
}

/// Failure reported by the remote persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PersistenceError {
    pub message: String,
}

impl PersistenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Save,
    Render,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::Save => write!(f, "save"),
            HookKind::Render => write!(f, "render"),
        }
    }
}
