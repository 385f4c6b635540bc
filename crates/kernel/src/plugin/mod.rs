//! Extension loading for Vivaio.
//!
//! This module handles:
//! - Discovering extension crates and parsing their manifests
//! - Compiling them into dynamically loadable units
//! - Loading units and calling their attach entrypoints
//! - Statically linked extensions listed in a compile-time catalog

mod build;
mod builtin;
mod error;
mod loader;
mod manifest;
mod native;

pub use build::Toolchain;
pub use builtin::BuiltinCatalog;
pub use error::PluginError;
pub use loader::{
    ExtensionModule, LoadFailure, LoadReport, LoadState, LoadedPlugins, PluginLoader, PluginSource,
};
pub use manifest::ExtensionManifest;
pub use native::NativePluginSource;
