//! # Model Hook Runner
//!
//! Component types may ship a model: an optional `save` transform run
//! before persistence and an optional `render` transform run before
//! re-rendering. Both are normalized here to one uniform async contract:
//!
//! - absent hook → resolve with a copy of the input, unchanged
//! - hook panic → rejection
//! - hook overrunning its budget → rejection (save 500ms, render 300ms;
//!   render is tighter because it runs downstream of save in the same
//!   pipeline)
//!
//! A timeout only stops waiting for the hook's result; it does not abort
//! the hook's side effects. The caller's input is never mutated — hooks
//! receive their own copy.

use crate::errors::{EngineError, HookKind};
use amphora_common::{component_type, FieldMap};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const SAVE_HOOK_TIMEOUT: Duration = Duration::from_millis(500);
pub const RENDER_HOOK_TIMEOUT: Duration = Duration::from_millis(300);

/// Arguments handed to a hook invocation.
#[derive(Debug, Clone)]
pub struct HookArgs {
    pub uri: String,
    pub data: FieldMap,
    /// Edit-session locals (current user, page url, ...).
    pub locals: Arc<FieldMap>,
}

pub type HookFn =
    Arc<dyn Fn(HookArgs) -> BoxFuture<'static, Result<FieldMap, String>> + Send + Sync>;

/// Optional capability interface: a type's model may carry either hook,
/// both, or neither.
#[derive(Clone, Default)]
pub struct ComponentModel {
    pub save: Option<HookFn>,
    pub render: Option<HookFn>,
}

/// Model lookup by component type name.
pub trait ModelSource: Send + Sync {
    fn model_for(&self, type_name: &str) -> Option<ComponentModel>;
}

/// Empty model source for hosts with no hooks at all.
#[derive(Debug, Default)]
pub struct NoModels;

impl ModelSource for NoModels {
    fn model_for(&self, _type_name: &str) -> Option<ComponentModel> {
        None
    }
}

pub struct HookRunner {
    models: Arc<dyn ModelSource>,
    locals: Arc<FieldMap>,
}

impl HookRunner {
    pub fn new(models: Arc<dyn ModelSource>, locals: Arc<FieldMap>) -> Self {
        Self { models, locals }
    }

    /// Run the type's save hook, or pass the data through unchanged.
    pub async fn run_save_hook(&self, uri: &str, data: &FieldMap) -> Result<FieldMap, EngineError> {
        self.run(HookKind::Save, SAVE_HOOK_TIMEOUT, uri, data).await
    }

    /// Run the type's render hook, or pass the data through unchanged.
    pub async fn run_render_hook(
        &self,
        uri: &str,
        data: &FieldMap,
    ) -> Result<FieldMap, EngineError> {
        self.run(HookKind::Render, RENDER_HOOK_TIMEOUT, uri, data)
            .await
    }

    async fn run(
        &self,
        kind: HookKind,
        budget: Duration,
        uri: &str,
        data: &FieldMap,
    ) -> Result<FieldMap, EngineError> {
        let type_name = component_type(uri)?;
        let model = self.models.model_for(type_name);
        let hook = match model.and_then(|m| match kind {
            HookKind::Save => m.save,
            HookKind::Render => m.render,
        }) {
            Some(hook) => hook,
            None => return Ok(data.clone()),
        };

        let args = HookArgs {
            uri: uri.to_string(),
            data: data.clone(),
            locals: self.locals.clone(),
        };

        // The hook runs as its own task: a timeout abandons the wait but
        // the hook's side effects still run to completion. Panics inside
        // the task surface as a JoinError and are normalized to
        // rejections.
        let invocation = tokio::spawn(hook(args));

        match timeout(budget, invocation).await {
            Err(_) => Err(EngineError::HookTimedOut {
                kind,
                uri: uri.to_string(),
                timeout: budget,
            }),
            Ok(Err(join_err)) => Err(EngineError::HookFailed {
                kind,
                uri: uri.to_string(),
                message: if join_err.is_panic() {
                    "hook panicked".to_string()
                } else {
                    join_err.to_string()
                },
            }),
            Ok(Ok(Err(message))) => Err(EngineError::HookFailed {
                kind,
                uri: uri.to_string(),
                message,
            }),
            Ok(Ok(Ok(transformed))) => Ok(transformed),
        }
    }
}
