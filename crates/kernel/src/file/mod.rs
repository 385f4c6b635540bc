//! Uploaded file storage.
//!
//! Files attached to a create or update request are written here before the
//! form is decoded; the form field then carries the file's public URL, and
//! a metadata record is kept for lookup by slug.

pub mod record;
pub mod storage;

pub use record::{UPLOADS_TYPE, UploadRecord};
pub use storage::{FileStorage, LocalFileStorage, StoredFile};
