//! Vivaio Extension SDK
//!
//! Types and traits shared by the kernel and every extension crate.
//! Extensions define content types by deriving [`Content`](content::Content),
//! opt into lifecycle hooks by implementing [`Hookable`](hooks::Hookable),
//! and register their types from a function marked `#[attach]`.

pub mod content;
pub mod hooks;
pub mod registrar;
pub mod slug;
pub mod types;

// Re-export proc macros
pub use vivaio_sdk_macros::{Content, attach};

// Re-exports used by macro-generated code and by hook implementations
pub use async_trait::async_trait;
#[doc(hidden)]
pub use serde_json;

pub mod prelude {
    pub use crate::content::{Constructor, Content, constructor, default_visibility};
    pub use crate::hooks::{HookContext, HookError, Hookable};
    pub use crate::registrar::{AttachFn, Registrar, SDK_VERSION};
    pub use crate::slug::slugify;
    pub use crate::types::*;
    pub use crate::{Content, async_trait, attach};
}
