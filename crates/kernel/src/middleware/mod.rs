//! HTTP middleware components.

pub mod auth;

pub use auth::{Authorizer, TokenAuthorizer, identify_caller};
