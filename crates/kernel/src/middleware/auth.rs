//! Caller identification.
//!
//! Decides whether a request is authorized and stores the resulting
//! [`Caller`] in request extensions, where handlers and hooks read it.
//! An unauthorized caller is not rejected; it only sees public content.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::debug;
use vivaio_sdk::types::Caller;

use crate::state::AppState;

/// Decides whether a request's caller is authorized.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, headers: &HeaderMap) -> bool;
}

/// Authorizes `Authorization: Bearer <token>` against a configured token.
///
/// Without a token, nobody is authorized.
#[derive(Clone)]
pub struct TokenAuthorizer {
    token: Option<String>,
}

impl TokenAuthorizer {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

impl std::fmt::Debug for TokenAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthorizer")
            .field("configured", &self.token.is_some())
            .finish()
    }
}

impl Authorizer for TokenAuthorizer {
    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.token else {
            return false;
        };
        let Some(presented) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
        else {
            return false;
        };
        presented.trim().as_bytes().ct_eq(expected.as_bytes()).into()
    }
}

/// Middleware that attaches a [`Caller`] to every request.
pub async fn identify_caller(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = state.authorizer().is_authorized(request.headers());
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    debug!(authorized, remote_addr = ?remote_addr, "caller identified");
    request.extensions_mut().insert(Caller {
        authorized,
        remote_addr,
    });
    next.run(request).await
}
