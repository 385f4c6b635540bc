//! Parser for extension `Cargo.toml` manifests.
//!
//! Only the parts the loader needs are read: the package name, the
//! optional `[lib] name`, and the crate types.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::PluginError;

/// The subset of an extension's Cargo.toml the loader cares about.
#[derive(Debug, Clone)]
pub struct ExtensionManifest {
    /// Package name as declared.
    pub package: String,

    /// Library target name (hyphens replaced by underscores).
    pub lib_name: String,

    /// Declared crate types.
    pub crate_types: Vec<String>,

    /// Path of the manifest file.
    pub path: PathBuf,
}

#[derive(Deserialize)]
struct RawManifest {
    package: Option<RawPackage>,
    #[serde(default)]
    lib: RawLib,
}

#[derive(Deserialize)]
struct RawPackage {
    name: String,
}

#[derive(Default, Deserialize)]
struct RawLib {
    name: Option<String>,
    #[serde(default, rename = "crate-type")]
    crate_type: Vec<String>,
}

impl ExtensionManifest {
    /// Read and parse the manifest at `path`.
    pub fn parse(path: &Path) -> Result<Self, PluginError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PluginError::invalid_manifest(dir_name(path), e))?;
        Self::parse_str(&content, path)
    }

    /// Parse manifest content read from `path`.
    pub fn parse_str(content: &str, path: &Path) -> Result<Self, PluginError> {
        let raw: RawManifest =
            toml::from_str(content).map_err(|e| PluginError::invalid_manifest(dir_name(path), e))?;

        let Some(package) = raw.package else {
            return Err(PluginError::invalid_manifest(
                dir_name(path),
                "missing [package] table",
            ));
        };
        if package.name.trim().is_empty() {
            return Err(PluginError::invalid_manifest(
                dir_name(path),
                "package name is empty",
            ));
        }

        let lib_name = raw
            .lib
            .name
            .unwrap_or_else(|| package.name.clone())
            .replace('-', "_");

        Ok(Self {
            package: package.name,
            lib_name,
            crate_types: raw.lib.crate_type,
            path: path.to_path_buf(),
        })
    }

    /// Require the crate to build a dynamic library.
    pub fn ensure_dynamic(&self) -> Result<(), PluginError> {
        if self.crate_types.iter().any(|t| t == "cdylib") {
            Ok(())
        } else {
            Err(PluginError::NotDynamic {
                plugin: self.package.clone(),
            })
        }
    }

    /// File name of the compiled unit on this platform.
    pub fn unit_file_name(&self) -> String {
        format!(
            "{}{}{}",
            std::env::consts::DLL_PREFIX,
            self.lib_name,
            std::env::consts::DLL_SUFFIX
        )
    }
}

fn dir_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}
