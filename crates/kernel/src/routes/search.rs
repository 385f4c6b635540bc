//! Type-scoped search.
//!
//! - `GET /api/search?type=Post&q=rust async&count=10&offset=0`
//!
//! Only types declaring searchable fields can be searched. Matches go
//! through the same filters and response hooks as a listing, newest first,
//! and the `count`/`offset` window applies to the visible matches.

use std::collections::BTreeMap;

use axum::{
    Extension, Router,
    extract::{Query, State},
    response::Response,
    routing::get,
};
use tracing::debug;
use vivaio_sdk::hooks::HookContext;
use vivaio_sdk::types::{Caller, Operation};

use crate::content::SearchQuery;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::{QueryOptions, SortOrder};

use super::helpers::{
    envelope, instance_for_read, int_param, require_param, respond, visible_records,
};

/// Create the search router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/search", get(search_contents))
}

async fn search_contents(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<BTreeMap<String, String>>,
) -> ApiResult<Response> {
    let type_name = require_param(&query, "type")?.to_string();
    let blank = instance_for_read(&state, &type_name)?;
    let fields = blank.search_fields();
    if fields.is_empty() {
        return Err(ApiError::bad_request(format!(
            "content type '{type_name}' is not searchable"
        )));
    }

    let search = SearchQuery::parse(require_param(&query, "q")?)
        .ok_or_else(|| ApiError::bad_request("'q' holds no search terms"))?;
    let window = QueryOptions::new(
        int_param(&query, "count", 10)?,
        int_param(&query, "offset", 0)?,
        SortOrder::Desc,
    )
    .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let all = QueryOptions::new(-1, 0, SortOrder::Desc)?;
    let matches: Vec<_> = state
        .store()
        .query(&type_name, &all)
        .await?
        .into_iter()
        .filter(|record| search.matches(record, &fields))
        .collect();
    debug!(type_name = %type_name, terms = ?search.terms(), matches = matches.len(), "search");

    let data = window.window(visible_records(&state, &type_name, &caller, matches).into_iter());

    let ctx = HookContext::new(Operation::Respond, &type_name, caller).with_query(query);
    let payload = serde_json::to_vec(&envelope(data)).map_err(anyhow::Error::from)?;
    respond(blank, ctx, payload).await
}
