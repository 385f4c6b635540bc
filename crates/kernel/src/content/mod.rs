//! Content management module.
//!
//! This module provides:
//! - TypeRegistry: content type constructors registered by extensions
//! - form: multi-value form field reconstruction
//! - decode: schema-guided decoding of form fields into instances
//! - FilterPipeline: visibility and field-omission filtering of responses
//! - search: term matching for type-scoped search

pub mod decode;
mod filter;
pub mod form;
pub mod search;
mod type_registry;

pub use decode::{DecodeError, decode_into};
pub use filter::{FilterPipeline, OmitFilter, RecordFilter, VisibilityFilter};
pub use form::{CollisionPolicy, FormError, flatten, reconstruct};
pub use search::SearchQuery;
pub use type_registry::{RecordingRegistrar, TypeRegistry};
