//! Dynamic extension source.
//!
//! Each subdirectory of the extensions directory holding a `Cargo.toml` is
//! an extension crate. It is compiled to a cdylib with the build toolchain,
//! mapped into the process with `libloading`, checked against the SDK
//! version, and its exported attach function resolved.
//!
//! Loaded units are never unmapped. Registered constructors and hook
//! vtables point into them, and those outlive every owner the loader
//! could hand the library to.

use std::collections::HashMap;
use std::ffi::CStr;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::{debug, info};
use vivaio_sdk::registrar::{AttachFn, SDK_VERSION, SdkVersionFn, attach_symbol, version_symbol};

use super::build::Toolchain;
use super::error::PluginError;
use super::loader::{ExtensionModule, PluginSource};
use super::manifest::ExtensionManifest;

/// Extension crates under a directory, built and loaded at startup.
pub struct NativePluginSource {
    plugins_dir: PathBuf,
    toolchain: Toolchain,
    manifests: HashMap<String, ExtensionManifest>,
}

impl NativePluginSource {
    pub fn new(plugins_dir: impl Into<PathBuf>, toolchain: Toolchain) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            toolchain,
            manifests: HashMap::new(),
        }
    }

    fn manifest(&self, module: &ExtensionModule) -> Result<&ExtensionManifest, PluginError> {
        self.manifests
            .get(&module.name)
            .ok_or_else(|| PluginError::missing_manifest(module.source_path.display().to_string()))
    }
}

impl PluginSource for NativePluginSource {
    fn label(&self) -> &'static str {
        "native"
    }

    fn discover(&mut self) -> Result<Vec<ExtensionModule>, PluginError> {
        if !self.plugins_dir.is_dir() {
            info!(dir = %self.plugins_dir.display(), "extensions directory not found, skipping");
            return Ok(Vec::new());
        }

        let mut modules = Vec::new();
        for dir in candidate_dirs(&self.plugins_dir)? {
            let manifest_path = dir.join("Cargo.toml");
            if !manifest_path.is_file() {
                if dir.join("src").is_dir() {
                    return Err(PluginError::missing_manifest(dir.display().to_string()));
                }
                debug!(dir = %dir.display(), "skipping non-extension directory");
                continue;
            }

            let manifest = ExtensionManifest::parse(&manifest_path)?;
            manifest.ensure_dynamic()?;

            modules.push(ExtensionModule::discovered(&manifest.package, &dir));
            self.manifests.insert(manifest.package.clone(), manifest);
        }

        Ok(modules)
    }

    fn compile(&mut self, module: &mut ExtensionModule) -> Result<(), PluginError> {
        let manifest = self.manifest(module)?;
        let unit = self.toolchain.ensure_built(manifest)?;
        module.unit_path = Some(unit);
        Ok(())
    }

    fn load(&mut self, module: &ExtensionModule) -> Result<AttachFn, PluginError> {
        let manifest = self.manifest(module)?;
        let lib_name = manifest.lib_name.clone();
        let unit = module
            .unit_path
            .clone()
            .unwrap_or_else(|| self.toolchain.unit_path(manifest));

        // SAFETY: loading runs the unit's initializers. Extension crates are
        // operator-supplied code built from the configured directory.
        let library = unsafe { Library::new(&unit) }.map_err(|e| PluginError::LoadFailed {
            plugin: module.name.clone(),
            path: unit.display().to_string(),
            details: e.to_string(),
        })?;
        let library: &'static Library = Box::leak(Box::new(library));

        check_sdk_version(library, &module.name, &lib_name)?;

        let attach = {
            let symbol = attach_symbol(&lib_name);
            // SAFETY: the symbol is generated by #[attach] with the AttachFn
            // signature, and the SDK version check above guarantees both
            // sides agree on the Registrar layout.
            let entry: Symbol<'static, AttachFn> = unsafe { library.get(symbol.as_bytes()) }
                .map_err(|_| PluginError::MissingEntrypoint {
                    plugin: module.name.clone(),
                    symbol,
                })?;
            *entry
        };

        debug!(plugin = %module.name, unit = %unit.display(), "unit loaded");
        Ok(attach)
    }
}

fn check_sdk_version(library: &Library, plugin: &str, lib_name: &str) -> Result<(), PluginError> {
    let symbol = version_symbol(lib_name);
    // SAFETY: generated by #[attach] as `extern "C" fn() -> *const c_char`.
    let version_fn: Symbol<'_, SdkVersionFn> = unsafe { library.get(symbol.as_bytes()) }
        .map_err(|_| PluginError::MissingEntrypoint {
            plugin: plugin.to_string(),
            symbol,
        })?;

    let ptr = version_fn();
    let found = if ptr.is_null() {
        String::new()
    } else {
        // SAFETY: points at a 'static NUL-terminated string in the unit.
        unsafe { CStr::from_ptr(ptr) }
            .to_string_lossy()
            .into_owned()
    };

    if found != SDK_VERSION {
        return Err(PluginError::IncompatibleSdk {
            plugin: plugin.to_string(),
            expected: SDK_VERSION.to_string(),
            found,
        });
    }
    Ok(())
}

/// Visible subdirectories of `dir`, sorted by name.
fn candidate_dirs(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        PluginError::invalid_manifest(dir.display().to_string(), format!("cannot read directory: {e}"))
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.starts_with('.'))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}
