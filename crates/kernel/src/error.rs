//! API error types.
//!
//! Every per-request failure ends up here and is sent as
//! `{"success": false, "error": "<message>"}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use vivaio_sdk::hooks::HookError;

use crate::content::{DecodeError, FormError};
use crate::hook::{HookStage, PipelineError};
use crate::store::StoreError;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad or missing parameters, unknown type on a write, undecodable body.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown id or slug, or a type that is not registered for a read.
    #[error("{0}")]
    NotFound(String),

    /// The resolved type lacks lifecycle hooks.
    #[error("content type '{0}' cannot be used through the API")]
    Capability(String),

    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: HookError,
    },

    #[error("storage error")]
    Store(#[from] StoreError),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Capability(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Hook { .. } | ApiError::Store(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show the client.
    fn client_message(&self) -> String {
        match self {
            ApiError::Hook {
                stage,
                source: HookError::Rejected(reason),
            } => format!("{stage} hook rejected the request: {reason}"),
            ApiError::Hook { stage, .. } => format!("{stage} hook failed"),
            _ => self.to_string(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Capability(type_name) => ApiError::Capability(type_name),
            PipelineError::Hook { stage, source } => ApiError::Hook { stage, source },
            PipelineError::Store(e) => ApiError::Store(e),
            PipelineError::Encode(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::NotAnObject | DecodeError::Encode(_) => ApiError::Internal(e.into()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<FormError> for ApiError {
    fn from(e: FormError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Capability(type_name) => {
                tracing::warn!(
                    type_name = %type_name,
                    "misconfigured extension: content type does not implement lifecycle hooks"
                );
            }
            ApiError::Hook { stage, source } => {
                tracing::error!(stage = %stage, error = %source, "hook failed");
            }
            ApiError::Store(e) => {
                tracing::error!(error = %e, "storage error");
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
            }
            ApiError::BadRequest(_) | ApiError::NotFound(_) => {}
        }

        let body = json!({ "success": false, "error": self.client_message() });
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Capability("Plain".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Store(StoreError::Backend("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_detail_is_hidden() {
        let err = ApiError::Store(StoreError::Backend("password=hunter2".into()));
        assert_eq!(err.client_message(), "storage error");
    }

    #[test]
    fn pipeline_errors_convert() {
        let err: ApiError = PipelineError::Capability("Plain".into()).into();
        assert!(matches!(err, ApiError::Capability(_)));

        let err: ApiError = PipelineError::Hook {
            stage: HookStage::BeforeSave,
            source: HookError::rejected("title required"),
        }
        .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.client_message().contains("title required"));
    }

    #[test]
    fn form_errors_are_client_errors() {
        let err: ApiError = FormError::Ambiguous("tags".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
