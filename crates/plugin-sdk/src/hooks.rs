//! Lifecycle hooks.
//!
//! The kernel runs hooks in a fixed order around each write:
//!
//! ```text
//! create: before_api_create -> before_save   -> persist -> after_save   -> after_api_create
//! update: before_api_update -> before_save   -> persist -> after_save   -> after_api_update
//! delete: before_api_delete -> before_delete -> remove  -> after_delete -> after_api_delete
//! read:   fetch -> before_api_response -> send -> after_api_response
//! ```
//!
//! The first hook to return an error stops the chain. Hooks that already ran
//! are not undone.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Caller, ContentTarget, FormFields, Operation};

/// Error returned by a hook.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Rejected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HookError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// Request data visible to hooks.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub operation: Operation,
    pub type_name: String,
    pub caller: Caller,

    /// Query string parameters.
    pub query: BTreeMap<String, String>,

    /// Reconstructed form submission (empty on reads).
    pub form: FormFields,

    /// The record written by this request. Set before the after-save
    /// and after-delete hooks run; `None` before persistence.
    pub target: Option<ContentTarget>,
}

impl HookContext {
    pub fn new(operation: Operation, type_name: impl Into<String>, caller: Caller) -> Self {
        Self {
            operation,
            type_name: type_name.into(),
            caller,
            query: BTreeMap::new(),
            form: FormFields::new(),
            target: None,
        }
    }

    pub fn with_query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_form(mut self, form: FormFields) -> Self {
        self.form = form;
        self
    }
}

/// Lifecycle hook capability.
///
/// Every method defaults to a no-op, so implementing the trait with an
/// empty body is enough to make a type writable through the API.
#[async_trait]
pub trait Hookable: Send + Sync {
    async fn before_api_create(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_api_create(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_api_update(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_api_update(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_api_delete(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_api_delete(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_save(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_save(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_delete(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_delete(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs on the filtered, serialized payload; the returned bytes are sent.
    async fn before_api_response(
        &mut self,
        _ctx: &HookContext,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, HookError> {
        Ok(payload)
    }

    /// Runs once the payload has been sent to the caller, off the request
    /// path. Not called when the caller goes away first. Errors are logged
    /// only.
    async fn after_api_response(
        &mut self,
        _ctx: &HookContext,
        _payload: &[u8],
    ) -> Result<(), HookError> {
        Ok(())
    }
}
