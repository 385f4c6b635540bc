//! Shared helpers for route handlers.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_core::Stream;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use vivaio_sdk::content::Content;
use vivaio_sdk::hooks::HookContext;
use vivaio_sdk::types::Caller;

use crate::content::form::parse_urlencoded;
use crate::error::{ApiError, ApiResult};
use crate::hook::{run_after_response, run_response};
use crate::state::AppState;

/// A file part of a multipart submission.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Form key the file was sent under, possibly indexed (`photos.1`).
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Body of a write request: plain form pairs plus any uploaded files.
///
/// Accepts `multipart/form-data` and `application/x-www-form-urlencoded`;
/// an empty body yields no pairs.
#[derive(Debug, Default)]
pub struct WriteBody {
    pub pairs: Vec<(String, String)>,
    pub uploads: Vec<Upload>,
}

impl WriteBody {
    /// Replace every pair named `key` with a single `key=value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.retain(|(k, _)| k != key);
        self.pairs.push((key.to_string(), value.into()));
    }
}

impl<S> FromRequest<S> for WriteBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            return read_multipart(multipart).await;
        }

        let text = String::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok(Self {
            pairs: parse_urlencoded(&text)?,
            uploads: Vec::new(),
        })
    }
}

async fn read_multipart(mut multipart: Multipart) -> ApiResult<WriteBody> {
    let mut body = WriteBody::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(filename) if !filename.is_empty() => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read file '{name}': {e}"))
                })?;
                debug!(field = %name, filename = %filename, size = data.len(), "upload received");
                body.uploads.push(Upload {
                    field: name,
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            _ => {
                let value = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read field '{name}': {e}"))
                })?;
                body.pairs.push((name, value));
            }
        }
    }
    Ok(body)
}

/// Non-empty query parameter.
pub fn param<'a>(query: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    query.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

/// Non-empty query parameter, or 400.
pub fn require_param<'a>(query: &'a BTreeMap<String, String>, name: &str) -> ApiResult<&'a str> {
    param(query, name).ok_or_else(|| ApiError::bad_request(format!("missing '{name}' parameter")))
}

/// Integer query parameter: `default` when absent, 400 when unparsable.
pub fn int_param(query: &BTreeMap<String, String>, name: &str, default: i64) -> ApiResult<i64> {
    match param(query, name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request(format!("'{name}' must be an integer, got '{raw}'"))),
    }
}

/// Fresh instance of a type the caller asked to write. Unknown types are 400.
pub fn instance_for_write(state: &AppState, type_name: &str) -> ApiResult<Box<dyn Content>> {
    state
        .registry()
        .instantiate(type_name)
        .ok_or_else(|| ApiError::bad_request(format!("unknown content type '{type_name}'")))
}

/// Fresh instance of a type the caller asked to read. Unknown types are 404.
pub fn instance_for_read(state: &AppState, type_name: &str) -> ApiResult<Box<dyn Content>> {
    state
        .registry()
        .instantiate(type_name)
        .ok_or_else(|| ApiError::not_found(format!("unknown content type '{type_name}'")))
}

/// Load a stored record into `instance`.
pub fn load_record(instance: &mut dyn Content, record: Value) -> ApiResult<()> {
    instance
        .load_value(record)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored record does not decode: {e}")))
}

/// Decode stored records and run them through the response filters.
///
/// Records that no longer decode are skipped with a warning.
pub fn visible_records(
    state: &AppState,
    type_name: &str,
    caller: &Caller,
    records: Vec<Value>,
) -> Vec<Value> {
    let mut data = Vec::with_capacity(records.len());
    for record in records {
        let Some(mut instance) = state.registry().instantiate(type_name) else {
            break;
        };
        if let Err(e) = instance.load_value(record.clone()) {
            warn!(type_name = %type_name, error = %e, "skipping stored record that does not decode");
            continue;
        }
        if let Some(visible) = state.filters().apply(instance.as_ref(), caller, record) {
            data.push(visible);
        }
    }
    data
}

/// `{"data": [ ... ]}`
pub fn envelope(data: Vec<Value>) -> Value {
    json!({ "data": data })
}

/// Send a serialized JSON payload through the type's response hooks.
///
/// `before_api_response` may rewrite the payload. `after_api_response`
/// runs in the background once the body has been read to the end.
pub async fn respond(
    mut instance: Box<dyn Content>,
    ctx: HookContext,
    payload: Vec<u8>,
) -> ApiResult<Response> {
    let payload = Bytes::from(run_response(instance.as_mut(), &ctx, payload).await?);
    let (body, sent) = SentBody::new(payload.clone());

    tokio::spawn(async move {
        if sent.await.is_err() {
            debug!(type_name = %ctx.type_name, "response dropped before it was sent");
            return;
        }
        run_after_response(instance.as_mut(), &ctx, &payload).await;
    });

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(body),
    )
        .into_response())
}

/// Single-chunk body that signals once it has been read to the end.
struct SentBody {
    payload: Option<Bytes>,
    sent: Option<oneshot::Sender<()>>,
}

impl SentBody {
    fn new(payload: Bytes) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let body = Self {
            payload: Some(payload),
            sent: Some(tx),
        };
        (body, rx)
    }
}

impl Stream for SentBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(chunk) = self.payload.take() {
            return Poll::Ready(Some(Ok(chunk)));
        }
        if let Some(sent) = self.sent.take() {
            let _ = sent.send(());
        }
        Poll::Ready(None)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
