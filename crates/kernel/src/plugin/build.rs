//! Invokes the external build toolchain for extension crates.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::error::PluginError;
use super::manifest::ExtensionManifest;

/// Number of trailing stderr lines kept in a compilation error.
const STDERR_TAIL_LINES: usize = 20;

/// Builds extension crates into dynamically loadable units.
#[derive(Debug, Clone)]
pub struct Toolchain {
    program: String,
    build_dir: PathBuf,
    force_rebuild: bool,
}

impl Toolchain {
    /// `program` is invoked as `<program> build --release --lib ...`.
    pub fn new(program: impl Into<String>, build_dir: impl Into<PathBuf>, force_rebuild: bool) -> Self {
        Self {
            program: program.into(),
            build_dir: build_dir.into(),
            force_rebuild,
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Where the compiled unit for `manifest` is (or will be) placed.
    pub fn unit_path(&self, manifest: &ExtensionManifest) -> PathBuf {
        self.build_dir
            .join("release")
            .join(manifest.unit_file_name())
    }

    /// Whether `manifest` has to be compiled before it can be loaded.
    pub fn needs_build(&self, manifest: &ExtensionManifest) -> bool {
        self.force_rebuild || !self.unit_path(manifest).is_file()
    }

    /// Compile `manifest` unless an up-to-date unit already exists.
    ///
    /// Returns the path of the loadable unit.
    pub fn ensure_built(&self, manifest: &ExtensionManifest) -> Result<PathBuf, PluginError> {
        let unit = self.unit_path(manifest);
        if !self.needs_build(manifest) {
            debug!(plugin = %manifest.package, unit = %unit.display(), "using existing build");
            return Ok(unit);
        }

        info!(plugin = %manifest.package, program = %self.program, "compiling extension");

        let output = Command::new(&self.program)
            .arg("build")
            .arg("--release")
            .arg("--lib")
            .arg("--manifest-path")
            .arg(&manifest.path)
            .arg("--target-dir")
            .arg(&self.build_dir)
            .output()
            .map_err(|e| {
                PluginError::compilation_failed(
                    &manifest.package,
                    format!("failed to run '{}': {e}", self.program),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            let details = if tail.is_empty() {
                format!("'{}' exited with {}", self.program, output.status)
            } else {
                format!("'{}' exited with {}:\n{tail}", self.program, output.status)
            };
            return Err(PluginError::compilation_failed(&manifest.package, details));
        }

        if !unit.is_file() {
            return Err(PluginError::MissingUnit {
                plugin: manifest.package.clone(),
                expected_path: unit.display().to_string(),
            });
        }

        Ok(unit)
    }
}
