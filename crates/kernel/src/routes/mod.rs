//! HTTP route handlers.

pub mod content;
pub mod health;
pub mod helpers;
pub mod search;
pub mod uploads;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::state::AppState;

/// Build the full application router with its middleware stack.
pub fn app(state: AppState) -> Router {
    let config = state.config().clone();

    let mut router = Router::new()
        .merge(health::router())
        .merge(content::router())
        .merge(search::router());

    let lookups = uploads::router();
    match uploads_mount(&config.files_url) {
        Some(mount) if mount == uploads::UPLOADS_PATH => {
            router = router.nest(
                uploads::UPLOADS_PATH,
                lookups.fallback_service(ServeDir::new(&config.uploads_dir)),
            );
        }
        Some(mount) => {
            router = router
                .nest(uploads::UPLOADS_PATH, lookups)
                .nest_service(mount, ServeDir::new(&config.uploads_dir));
        }
        None => router = router.nest(uploads::UPLOADS_PATH, lookups),
    }

    // Middleware layers (last added = first executed in request flow):
    // TraceLayer → CORS → compression → body limit → identify_caller → routes
    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::identify_caller,
        ))
        .layer(DefaultBodyLimit::max(config.max_form_bytes))
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Path uploads are served under, when `files_url` is a local path.
fn uploads_mount(files_url: &str) -> Option<&str> {
    let mount = files_url.trim_end_matches('/');
    (mount.starts_with('/') && mount.len() > 1).then_some(mount)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_mount_only_for_local_paths() {
        assert_eq!(uploads_mount("/api/uploads"), Some("/api/uploads"));
        assert_eq!(uploads_mount("/files/"), Some("/files"));
        assert_eq!(uploads_mount("/"), None);
        assert_eq!(uploads_mount("https://cdn.example.com/up"), None);
    }
}
