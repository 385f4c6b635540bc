//! Registration contract between extensions and the kernel.
//!
//! An extension exposes one function marked `#[attach]`:
//!
//! ```ignore
//! use vivaio_sdk::prelude::*;
//!
//! #[attach]
//! pub fn attach(registrar: &mut dyn Registrar) {
//!     registrar.register_default::<Post>("Post");
//! }
//! ```
//!
//! The macro keeps the function callable from Rust (for static linking)
//! and also exports it, together with the SDK version, under
//! crate-qualified symbol names so that a dynamically loaded build can be
//! found by the kernel.

use crate::content::{Constructor, Content, constructor};

/// Version the kernel and extensions must agree on before attaching.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Symbol prefix of the exported attach entrypoint.
pub const ATTACH_SYMBOL_PREFIX: &str = "vivaio_attach_";

/// Symbol prefix of the exported SDK version function.
pub const VERSION_SYMBOL_PREFIX: &str = "vivaio_sdk_version_";

/// Signature of an attach entrypoint.
pub type AttachFn = fn(&mut dyn Registrar);

/// Signature of the exported version function.
pub type SdkVersionFn = extern "C" fn() -> *const std::ffi::c_char;

/// Receives the content types an extension defines.
pub trait Registrar {
    /// Register (or replace) the constructor for `name`.
    fn register(&mut self, name: &str, constructor: Constructor);
}

impl dyn Registrar + '_ {
    /// Register a type whose blank instance is its `Default`.
    pub fn register_default<T: Content + Default>(&mut self, name: &str) {
        self.register(name, constructor::<T>());
    }
}

/// Name of the attach symbol exported by crate `lib_name`.
pub fn attach_symbol(lib_name: &str) -> String {
    format!("{ATTACH_SYMBOL_PREFIX}{lib_name}")
}

/// Name of the version symbol exported by crate `lib_name`.
pub fn version_symbol(lib_name: &str) -> String {
    format!("{VERSION_SYMBOL_PREFIX}{lib_name}")
}

/// NUL-terminated [`SDK_VERSION`], returned by exported version functions.
#[doc(hidden)]
pub const SDK_VERSION_CSTR: &std::ffi::CStr = match std::ffi::CStr::from_bytes_with_nul(
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes(),
) {
    Ok(s) => s,
    Err(_) => panic!("SDK version contains a NUL byte"),
};
