//! Extension loading error types with clear, actionable messages.
//!
//! All errors include the extension name and relevant context to help
//! operators quickly identify and fix issues.

use thiserror::Error;

/// Errors that can occur while loading extensions at startup.
///
/// Every variant is fatal: the kernel does not start serving when one is
/// returned from the load pass.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Extension directory has no Cargo.toml.
    #[error("extension '{plugin}': no Cargo.toml found in {path}")]
    MissingManifest { plugin: String, path: String },

    /// The Cargo.toml could not be read or parsed.
    #[error("extension '{plugin}': failed to parse manifest: {details}")]
    InvalidManifest { plugin: String, details: String },

    /// The crate does not build a dynamic library.
    #[error(
        "extension '{plugin}': crate-type must include \"cdylib\" (add `[lib] crate-type = [\"cdylib\"]` to its Cargo.toml)"
    )]
    NotDynamic { plugin: String },

    /// The build toolchain could not be run or exited nonzero.
    #[error("extension '{plugin}': compilation failed: {details}")]
    CompilationFailed { plugin: String, details: String },

    /// The build reported success but produced no loadable unit.
    #[error("extension '{plugin}': compiled unit not found at {expected_path}")]
    MissingUnit {
        plugin: String,
        expected_path: String,
    },

    /// The dynamic loader rejected the unit.
    #[error("extension '{plugin}': failed to load {path}: {details}")]
    LoadFailed {
        plugin: String,
        path: String,
        details: String,
    },

    /// The unit does not export a required symbol.
    #[error("extension '{plugin}': does not export '{symbol}' (is `attach` marked #[attach]?)")]
    MissingEntrypoint { plugin: String, symbol: String },

    /// The unit was built against a different SDK.
    #[error(
        "extension '{plugin}': built against SDK {found}, kernel requires {expected}; rebuild with --force-rebuild"
    )]
    IncompatibleSdk {
        plugin: String,
        expected: String,
        found: String,
    },

    /// The attach entrypoint panicked.
    #[error("extension '{plugin}': attach panicked: {message}")]
    AttachPanicked { plugin: String, message: String },
}

impl PluginError {
    /// Create a missing manifest error.
    pub fn missing_manifest(path: impl Into<String>) -> Self {
        let path = path.into();
        let plugin = std::path::Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self::MissingManifest { plugin, path }
    }

    /// Create an invalid manifest error.
    pub fn invalid_manifest(plugin: impl Into<String>, details: impl ToString) -> Self {
        Self::InvalidManifest {
            plugin: plugin.into(),
            details: details.to_string(),
        }
    }

    /// Create a compilation failure error.
    pub fn compilation_failed(plugin: impl Into<String>, details: impl Into<String>) -> Self {
        Self::CompilationFailed {
            plugin: plugin.into(),
            details: details.into(),
        }
    }

    /// Name of the extension the error concerns.
    pub fn plugin(&self) -> &str {
        match self {
            Self::MissingManifest { plugin, .. }
            | Self::InvalidManifest { plugin, .. }
            | Self::NotDynamic { plugin }
            | Self::CompilationFailed { plugin, .. }
            | Self::MissingUnit { plugin, .. }
            | Self::LoadFailed { plugin, .. }
            | Self::MissingEntrypoint { plugin, .. }
            | Self::IncompatibleSdk { plugin, .. }
            | Self::AttachPanicked { plugin, .. } => plugin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_derives_name_from_path() {
        let err = PluginError::missing_manifest("/srv/plugins/blog");
        assert_eq!(err.plugin(), "blog");
        assert!(err.to_string().contains("/srv/plugins/blog"));
    }

    #[test]
    fn not_dynamic_explains_fix() {
        let err = PluginError::NotDynamic {
            plugin: "blog".into(),
        };
        assert!(err.to_string().contains("cdylib"));
    }

    #[test]
    fn incompatible_sdk_suggests_rebuild() {
        let err = PluginError::IncompatibleSdk {
            plugin: "blog".into(),
            expected: "0.2.0".into(),
            found: "0.1.0".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.1.0"));
        assert!(msg.contains("--force-rebuild"));
    }
}
