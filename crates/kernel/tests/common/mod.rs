#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Every [`TestApp`] runs the real router and state over its own
//! in-memory store and upload directory, so tests never share data.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vivaio_kernel::config::Config;
use vivaio_kernel::content::TypeRegistry;
use vivaio_kernel::plugin::{BuiltinCatalog, PluginLoader};
use vivaio_kernel::routes;
use vivaio_kernel::state::AppState;
use vivaio_kernel::store::{MemoryStore, QueryOptions, SortOrder, Store};
use vivaio_sdk::prelude::*;
use vivaio_test_utils::{FormBody, MultipartBody};

/// Bearer token accepted by every test app.
pub const TOKEN: &str = "test-token";

/// `mark` query values seen by `Fragile::after_api_response`, across tests.
static SENT_MARKS: parking_lot::Mutex<Vec<String>> = parking_lot::Mutex::new(Vec::new());

/// Whether `Fragile::after_api_response` has seen `mark`.
pub fn response_sent(mark: &str) -> bool {
    SENT_MARKS.lock().iter().any(|m| m == mark)
}

/// A type without lifecycle hooks: readable, never writable.
#[derive(Debug, Default, Serialize, Deserialize, Content)]
#[serde(default)]
pub struct Note {
    #[serde(flatten)]
    pub item: Item,
    pub text: String,
}

/// A type whose hooks fail on demand.
///
/// `before_save` rejects a title of `boom`; `after_save` fails on `late`,
/// after the record is already stored. Responses are wrapped on `wrap=1`,
/// and a `mark` parameter is recorded once the response has been sent.
#[derive(Debug, Default, Serialize, Deserialize, Content)]
#[content(hooks)]
#[serde(default)]
pub struct Fragile {
    #[serde(flatten)]
    pub item: Item,
    pub title: String,
}

#[async_trait]
impl Hookable for Fragile {
    async fn before_save(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        if self.title == "boom" {
            return Err(HookError::rejected("boom"));
        }
        Ok(())
    }

    async fn after_save(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        if self.title == "late" {
            return Err(HookError::rejected("late"));
        }
        Ok(())
    }

    async fn before_api_response(
        &mut self,
        ctx: &HookContext,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, HookError> {
        if ctx.query.get("wrap").is_some_and(|v| v == "1") {
            let data: Value = serde_json::from_slice(&payload)?;
            return Ok(serde_json::to_vec(&serde_json::json!({ "wrapped": data }))?);
        }
        Ok(payload)
    }

    async fn after_api_response(
        &mut self,
        ctx: &HookContext,
        _payload: &[u8],
    ) -> Result<(), HookError> {
        if let Some(mark) = ctx.query.get("mark") {
            SENT_MARKS.lock().push(mark.clone());
        }
        Ok(())
    }
}

fn attach_test_types(registrar: &mut dyn Registrar) {
    registrar.register_default::<Note>("Note");
    registrar.register_default::<Fragile>("Fragile");
}

/// Test application wrapper using the real kernel routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub uploads: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Build an app after adjusting the default test config.
    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let uploads = tempfile::tempdir().expect("uploads dir");
        let mut config = Config {
            uploads_dir: uploads.path().to_path_buf(),
            api_token: Some(TOKEN.to_string()),
            ..Config::default()
        };
        adjust(&mut config);

        let registry = TypeRegistry::new();
        let plugins = PluginLoader::new()
            .with_source(
                BuiltinCatalog::new()
                    .with("vivaio-blog", vivaio_blog::attach)
                    .with("vivaio-events", vivaio_events::attach)
                    .with("test-types", attach_test_types),
            )
            .load(&registry)
            .expect("builtin extensions attach");

        let store = MemoryStore::new();
        let state = AppState::builder(config, registry)
            .store(Arc::new(store.clone()))
            .plugins(plugins)
            .build();
        let router = routes::app(state.clone());

        Self {
            router,
            state,
            store,
            uploads,
        }
    }

    /// Send a request through the router.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        json_response(self.request(request).await).await
    }

    /// GET with the test bearer token.
    pub async fn get_authorized(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .unwrap();
        json_response(self.request(request).await).await
    }

    pub async fn post_form(&self, uri: &str, form: &FormBody) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, form.content_type())
            .body(Body::from(form.encode()))
            .unwrap();
        json_response(self.request(request).await).await
    }

    pub async fn post_multipart(&self, uri: &str, form: &MultipartBody) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, form.content_type())
            .body(Body::from(form.encode()))
            .unwrap();
        json_response(self.request(request).await).await
    }

    /// Create a record through the API and return its id.
    pub async fn create(&self, type_name: &str, form: &FormBody) -> i64 {
        let (status, body) = self
            .post_form(&format!("/api/content/create?type={type_name}"), form)
            .await;
        assert_eq!(status, StatusCode::OK, "create failed: {body}");
        body["data"][0]["id"].as_i64().expect("created id")
    }

    /// Records stored for `type_name`, oldest first, bypassing the API.
    pub async fn stored(&self, type_name: &str) -> Vec<Value> {
        let all = QueryOptions::new(-1, 0, SortOrder::Asc).unwrap();
        self.store.query(type_name, &all).await.unwrap()
    }
}

/// Status and JSON body of a response. Non-JSON bodies become `Null`.
pub async fn json_response(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// A titled post form.
pub fn post_form(title: &str) -> FormBody {
    FormBody::new().field("title", title).field("body", "Lorem ipsum")
}
