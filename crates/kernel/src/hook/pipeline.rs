//! Hook invocation order.
//!
//! ```text
//! create: BeforeApiCreate -> BeforeSave   -> persist -> AfterSave   -> AfterApiCreate
//! update: BeforeApiUpdate -> BeforeSave   -> persist -> AfterSave   -> AfterApiUpdate
//! delete: BeforeApiDelete -> BeforeDelete -> persist -> AfterDelete -> AfterApiDelete
//! read:   BeforeApiResponse -> send -> AfterApiResponse
//! ```
//!
//! A failing hook aborts the rest of its chain. Nothing that already ran
//! is rolled back, including the store write.

use std::fmt;
use std::future::Future;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use vivaio_sdk::content::Content;
use vivaio_sdk::hooks::{HookContext, HookError, Hookable};
use vivaio_sdk::types::{ContentTarget, Operation};

use crate::store::StoreError;

/// One point in a hook chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    BeforeApiCreate,
    AfterApiCreate,
    BeforeApiUpdate,
    AfterApiUpdate,
    BeforeApiDelete,
    AfterApiDelete,
    BeforeSave,
    AfterSave,
    BeforeDelete,
    AfterDelete,
    BeforeApiResponse,
    AfterApiResponse,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::BeforeApiCreate => "before_api_create",
            HookStage::AfterApiCreate => "after_api_create",
            HookStage::BeforeApiUpdate => "before_api_update",
            HookStage::AfterApiUpdate => "after_api_update",
            HookStage::BeforeApiDelete => "before_api_delete",
            HookStage::AfterApiDelete => "after_api_delete",
            HookStage::BeforeSave => "before_save",
            HookStage::AfterSave => "after_save",
            HookStage::BeforeDelete => "before_delete",
            HookStage::AfterDelete => "after_delete",
            HookStage::BeforeApiResponse => "before_api_response",
            HookStage::AfterApiResponse => "after_api_response",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write operation wrapped by hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl WriteOp {
    pub fn operation(&self) -> Operation {
        match self {
            WriteOp::Create => Operation::Create,
            WriteOp::Update => Operation::Update,
            WriteOp::Delete => Operation::Delete,
        }
    }

    /// Stages before persistence, then after, in call order.
    fn chain(&self) -> ([HookStage; 2], [HookStage; 2]) {
        match self {
            WriteOp::Create => (
                [HookStage::BeforeApiCreate, HookStage::BeforeSave],
                [HookStage::AfterSave, HookStage::AfterApiCreate],
            ),
            WriteOp::Update => (
                [HookStage::BeforeApiUpdate, HookStage::BeforeSave],
                [HookStage::AfterSave, HookStage::AfterApiUpdate],
            ),
            WriteOp::Delete => (
                [HookStage::BeforeApiDelete, HookStage::BeforeDelete],
                [HookStage::AfterDelete, HookStage::AfterApiDelete],
            ),
        }
    }
}

/// Errors from a hook chain.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The type does not implement the hook capability; nothing ran.
    #[error("content type '{0}' does not implement lifecycle hooks")]
    Capability(String),

    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: HookError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode content: {0}")]
    Encode(#[from] serde_json::Error),
}

fn hooks<'a>(
    content: &'a mut dyn Content,
    ctx: &HookContext,
) -> Result<&'a mut dyn Hookable, PipelineError> {
    content
        .hooks()
        .ok_or_else(|| PipelineError::Capability(ctx.type_name.clone()))
}

async fn invoke(
    content: &mut dyn Content,
    stage: HookStage,
    ctx: &HookContext,
) -> Result<(), PipelineError> {
    debug!(type_name = %ctx.type_name, stage = %stage, "running hook");
    let h = hooks(content, ctx)?;
    let result = match stage {
        HookStage::BeforeApiCreate => h.before_api_create(ctx).await,
        HookStage::AfterApiCreate => h.after_api_create(ctx).await,
        HookStage::BeforeApiUpdate => h.before_api_update(ctx).await,
        HookStage::AfterApiUpdate => h.after_api_update(ctx).await,
        HookStage::BeforeApiDelete => h.before_api_delete(ctx).await,
        HookStage::AfterApiDelete => h.after_api_delete(ctx).await,
        HookStage::BeforeSave => h.before_save(ctx).await,
        HookStage::AfterSave => h.after_save(ctx).await,
        HookStage::BeforeDelete => h.before_delete(ctx).await,
        HookStage::AfterDelete => h.after_delete(ctx).await,
        HookStage::BeforeApiResponse | HookStage::AfterApiResponse => Ok(()),
    };
    result.map_err(|source| PipelineError::Hook { stage, source })
}

/// Run the hook chain of `op` around `persist`.
///
/// `persist` receives the instance as serialized after the before-hooks
/// and returns the id of the record it wrote (or removed). That id is set
/// on the instance and as `ctx.target` before the after-hooks run.
pub async fn run_write<F, Fut>(
    op: WriteOp,
    content: &mut dyn Content,
    ctx: &mut HookContext,
    persist: F,
) -> Result<i64, PipelineError>
where
    F: FnOnce(Value) -> Fut,
    Fut: Future<Output = Result<i64, StoreError>>,
{
    ctx.operation = op.operation();
    if content.hooks().is_none() {
        return Err(PipelineError::Capability(ctx.type_name.clone()));
    }

    let (before, after) = op.chain();
    for stage in before {
        invoke(content, stage, ctx).await?;
    }

    let value = content.to_value()?;
    let id = persist(value).await?;
    content.item_mut().id = id;
    ctx.target = Some(ContentTarget {
        type_name: ctx.type_name.clone(),
        id,
    });

    for stage in after {
        invoke(content, stage, ctx).await?;
    }

    Ok(id)
}

/// Run `before_api_response` over an already filtered, serialized payload.
///
/// Returns the payload to send.
pub async fn run_response(
    content: &mut dyn Content,
    ctx: &HookContext,
    payload: Vec<u8>,
) -> Result<Vec<u8>, PipelineError> {
    hooks(content, ctx)?
        .before_api_response(ctx, payload)
        .await
        .map_err(|source| PipelineError::Hook {
            stage: HookStage::BeforeApiResponse,
            source,
        })
}

/// Run `after_api_response` once `payload` has been sent.
///
/// The response is already gone, so a failure is logged and nothing else.
pub async fn run_after_response(content: &mut dyn Content, ctx: &HookContext, payload: &[u8]) {
    let Some(h) = content.hooks() else {
        return;
    };
    debug!(type_name = %ctx.type_name, stage = %HookStage::AfterApiResponse, "running hook");
    if let Err(e) = h.after_api_response(ctx, payload).await {
        warn!(
            type_name = %ctx.type_name,
            stage = %HookStage::AfterApiResponse,
            error = %e,
            "hook failed after response was sent"
        );
    }
}
