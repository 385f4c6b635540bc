//! Upload metadata lookup.
//!
//! - `GET /api/uploads?slug=cover-png`: the metadata record of one upload
//!
//! The files themselves are served from `FILES_URL`. When that is the
//! default `/api/uploads`, both share one mount: the bare path answers slug
//! lookups and everything below it is a file.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::file::UPLOADS_TYPE;
use crate::state::AppState;

use super::helpers::{envelope, require_param};

/// Mount point of the lookup route.
pub const UPLOADS_PATH: &str = "/api/uploads";

/// Router to nest at [`UPLOADS_PATH`].
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(upload_by_slug))
}

async fn upload_by_slug(
    State(state): State<AppState>,
    Query(query): Query<BTreeMap<String, String>>,
) -> ApiResult<Json<Value>> {
    let slug = require_param(&query, "slug")?;
    match state.store().content_by_slug(slug).await? {
        Some((type_name, record)) if type_name == UPLOADS_TYPE => Ok(Json(envelope(vec![record]))),
        _ => Err(ApiError::not_found(format!("no upload with slug '{slug}'"))),
    }
}
