//! Content API handlers.
//!
//! - `GET /api/contents`: paginated list of one type
//! - `GET /api/content`: one record by `type` + `id`, or by `slug`
//! - `POST /api/content/create|update|delete`: writes through the hook chain
//! - `GET /api/contents/meta`: field schema of every registered type

use std::collections::BTreeMap;

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    response::Response,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{info, warn};
use vivaio_sdk::content::Content;
use vivaio_sdk::hooks::HookContext;
use vivaio_sdk::types::{Caller, FormFields, Operation};

use crate::content::{decode_into, reconstruct};
use crate::error::{ApiError, ApiResult};
use crate::file::UploadRecord;
use crate::hook::{WriteOp, run_write};
use crate::state::AppState;
use crate::store::{QueryOptions, SortOrder};

use super::helpers::{
    WriteBody, envelope, instance_for_read, instance_for_write, int_param, load_record,
    now_millis, param, require_param, respond, visible_records,
};

/// Create the content API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/contents", get(list_contents))
        .route("/api/contents/meta", get(contents_meta))
        .route("/api/content", get(get_content))
        .route("/api/content/create", post(create_content))
        .route("/api/content/update", post(update_content))
        .route("/api/content/delete", post(delete_content))
}

// =============================================================================
// Reads
// =============================================================================

/// List a type's records.
///
/// GET /api/contents?type=Post&count=10&offset=0&order=desc
async fn list_contents(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<BTreeMap<String, String>>,
) -> ApiResult<Response> {
    let type_name = require_param(&query, "type")?.to_string();
    let blank = instance_for_read(&state, &type_name)?;

    let order = param(&query, "order")
        .map(|o| o.parse().unwrap_or_default())
        .unwrap_or(SortOrder::Desc);
    let opts = QueryOptions::new(
        int_param(&query, "count", 10)?,
        int_param(&query, "offset", 0)?,
        order,
    )
    .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let records = state.store().query(&type_name, &opts).await?;
    let data = visible_records(&state, &type_name, &caller, records);

    let ctx = HookContext::new(Operation::Respond, &type_name, caller).with_query(query);
    let payload = serde_json::to_vec(&envelope(data)).map_err(anyhow::Error::from)?;
    respond(blank, ctx, payload).await
}

/// Fetch one record.
///
/// GET /api/content?type=Post&id=1
/// GET /api/content?slug=hello-world
async fn get_content(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<BTreeMap<String, String>>,
) -> ApiResult<Response> {
    let (type_name, record) = match param(&query, "slug") {
        Some(slug) => state
            .store()
            .content_by_slug(slug)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("no content with slug '{slug}'")))?,
        None => {
            let type_name = require_param(&query, "type")?.to_string();
            let id = parse_id(require_param(&query, "id")?)?;
            if state.registry().lookup(&type_name).is_none() {
                return Err(ApiError::not_found(format!("unknown content type '{type_name}'")));
            }
            let record = state
                .store()
                .get(&type_name, id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("{type_name}:{id} not found")))?;
            (type_name, record)
        }
    };

    let mut instance = instance_for_read(&state, &type_name)?;
    load_record(instance.as_mut(), record.clone())?;
    let visible = state
        .filters()
        .apply(instance.as_ref(), &caller, record)
        .ok_or_else(|| ApiError::not_found("content not found"))?;

    let ctx = HookContext::new(Operation::Respond, &type_name, caller).with_query(query);
    let payload = serde_json::to_vec(&envelope(vec![visible])).map_err(anyhow::Error::from)?;
    respond(instance, ctx, payload).await
}

/// Describe every registered type's fields.
///
/// GET /api/contents/meta
async fn contents_meta(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.registry().describe()))
}

// =============================================================================
// Writes
// =============================================================================

/// Create a record.
///
/// POST /api/content/create?type=Post
async fn create_content(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<BTreeMap<String, String>>,
    body: WriteBody,
) -> ApiResult<Json<Value>> {
    let type_name = require_param(&query, "type")?.to_string();
    let mut instance = writable(&state, &type_name)?;

    let now = now_millis().to_string();
    let form = prepare_form(
        &state,
        body,
        &[
            ("id", None),
            ("uuid", None),
            ("timestamp", Some(now.as_str())),
            ("updated", Some(now.as_str())),
        ],
    )
    .await?;

    decode_into(instance.as_mut(), &form)?;
    let item = instance.item_mut();
    item.id = 0;
    item.uuid = uuid::Uuid::now_v7();

    let mut ctx = HookContext::new(Operation::Create, &type_name, caller)
        .with_query(query)
        .with_form(form);
    let store = state.store();
    let id = run_write(WriteOp::Create, instance.as_mut(), &mut ctx, |record| {
        store.put(&type_name, None, record)
    })
    .await?;

    info!(type_name = %type_name, id, "content created");
    Ok(Json(write_response(
        id,
        instance.item().status.as_str(),
        &type_name,
    )))
}

/// Update a record. Fields absent from the form keep their stored values.
///
/// POST /api/content/update?type=Post&id=1
async fn update_content(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<BTreeMap<String, String>>,
    body: WriteBody,
) -> ApiResult<Json<Value>> {
    let type_name = require_param(&query, "type")?.to_string();
    let id = parse_id(require_param(&query, "id")?)?;
    let mut instance = writable(&state, &type_name)?;
    let stored = fetch_existing(&state, &type_name, id).await?;
    load_record(instance.as_mut(), stored)?;

    let now = now_millis().to_string();
    let form = prepare_form(
        &state,
        body,
        &[
            ("id", None),
            ("uuid", None),
            ("timestamp", None),
            ("updated", Some(now.as_str())),
        ],
    )
    .await?;
    decode_into(instance.as_mut(), &form)?;

    let mut ctx = HookContext::new(Operation::Update, &type_name, caller)
        .with_query(query)
        .with_form(form);
    let store = state.store();
    run_write(WriteOp::Update, instance.as_mut(), &mut ctx, |record| {
        store.put(&type_name, Some(id), record)
    })
    .await?;

    info!(type_name = %type_name, id, "content updated");
    Ok(Json(write_response(id, "updated", &type_name)))
}

/// Delete a record.
///
/// POST /api/content/delete?type=Post&id=1
async fn delete_content(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<BTreeMap<String, String>>,
    body: WriteBody,
) -> ApiResult<Json<Value>> {
    let type_name = require_param(&query, "type")?.to_string();
    let id = parse_id(require_param(&query, "id")?)?;
    let mut instance = writable(&state, &type_name)?;
    let stored = fetch_existing(&state, &type_name, id).await?;
    load_record(instance.as_mut(), stored)?;

    let form = reconstruct(body.pairs, state.collision_policy())?;
    let mut ctx = HookContext::new(Operation::Delete, &type_name, caller)
        .with_query(query)
        .with_form(form);
    let store = state.store();
    let type_key = type_name.clone();
    run_write(WriteOp::Delete, instance.as_mut(), &mut ctx, |_| async move {
        store.delete(&type_key, id).await.map(|existed| {
            if !existed {
                warn!(type_name = %type_key, id, "record vanished before delete");
            }
            id
        })
    })
    .await?;

    info!(type_name = %type_name, id, "content deleted");
    Ok(Json(write_response(id, "deleted", &type_name)))
}

/// Instantiate a type for writing; it must carry lifecycle hooks.
fn writable(state: &AppState, type_name: &str) -> ApiResult<Box<dyn Content>> {
    let mut instance = instance_for_write(state, type_name)?;
    if instance.hooks().is_none() {
        return Err(ApiError::Capability(type_name.to_string()));
    }
    Ok(instance)
}

async fn fetch_existing(state: &AppState, type_name: &str, id: i64) -> ApiResult<Value> {
    state
        .store()
        .get(type_name, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{type_name}:{id} not found")))
}

/// Store uploads, point their fields at the stored files, and rebuild
/// multi-value fields.
///
/// `owned` fields are applied after rebuilding, so no spelling of them in
/// the submission (`timestamp`, `timestamp.0`, ...) survives: `Some` pins a
/// value, `None` drops the field and the existing value is kept.
async fn prepare_form(
    state: &AppState,
    mut body: WriteBody,
    owned: &[(&str, Option<&str>)],
) -> ApiResult<FormFields> {
    for upload in std::mem::take(&mut body.uploads) {
        let stored = state
            .files()
            .store(&upload.filename, &upload.data)
            .await
            .map_err(ApiError::Internal)?;
        let record = UploadRecord::new(
            &upload.filename,
            upload.content_type.as_deref(),
            &stored,
            now_millis(),
        )
        .save(state.store())
        .await?;
        info!(
            field = %upload.field,
            uri = %stored.uri,
            slug = %record.item.slug,
            size = stored.size,
            "upload stored"
        );
        body.set(&upload.field, stored.url);
    }

    let mut form = reconstruct(body.pairs, state.collision_policy())?;
    for (key, value) in owned {
        match value {
            Some(value) => form.set(*key, vec![value.to_string()]),
            None => {
                form.remove(key);
            }
        }
    }
    Ok(form)
}

fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request(format!("'id' must be a positive integer, got '{raw}'")))
}

fn write_response(id: i64, status: &str, type_name: &str) -> Value {
    json!({ "data": [{ "id": id, "status": status, "type": type_name }] })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("7").unwrap(), 7);
        assert_eq!(parse_id(" 12 ").unwrap(), 12);
        assert!(parse_id("0").is_err());
        assert!(parse_id("-3").is_err());
        assert!(parse_id("abc").is_err());
    }

    #[test]
    fn write_response_envelope() {
        let body = write_response(3, "updated", "Post");
        assert_eq!(body["data"][0]["id"], 3);
        assert_eq!(body["data"][0]["status"], "updated");
        assert_eq!(body["data"][0]["type"], "Post");
    }
}
