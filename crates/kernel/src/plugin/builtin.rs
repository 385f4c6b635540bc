//! Compile-time extension catalog.
//!
//! Extensions linked into the binary as ordinary crates are listed here
//! with their attach functions. No toolchain or dynamic loader is involved.

use vivaio_sdk::registrar::AttachFn;

use super::error::PluginError;
use super::loader::{ExtensionModule, PluginSource};

/// Statically linked extensions, attached in the order listed.
#[derive(Debug, Clone, Default)]
pub struct BuiltinCatalog {
    entries: Vec<(String, AttachFn)>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extension by name and attach function.
    pub fn with(mut self, name: impl Into<String>, attach: AttachFn) -> Self {
        self.entries.push((name.into(), attach));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PluginSource for BuiltinCatalog {
    fn label(&self) -> &'static str {
        "builtin"
    }

    fn discover(&mut self) -> Result<Vec<ExtensionModule>, PluginError> {
        Ok(self
            .entries
            .iter()
            .map(|(name, _)| ExtensionModule::discovered(name, "builtin"))
            .collect())
    }

    fn compile(&mut self, _module: &mut ExtensionModule) -> Result<(), PluginError> {
        Ok(())
    }

    fn load(&mut self, module: &ExtensionModule) -> Result<AttachFn, PluginError> {
        self.entries
            .iter()
            .find(|(name, _)| *name == module.name)
            .map(|(_, attach)| *attach)
            .ok_or_else(|| PluginError::MissingEntrypoint {
                plugin: module.name.clone(),
                symbol: "attach".to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use vivaio_sdk::registrar::Registrar;

    fn attach(_registrar: &mut dyn Registrar) {}

    #[test]
    fn discovers_entries_in_order() {
        let mut catalog = BuiltinCatalog::new().with("a", attach).with("b", attach);
        let names: Vec<String> = catalog
            .discover()
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn unknown_module_has_no_entrypoint() {
        let mut catalog = BuiltinCatalog::new();
        let module = ExtensionModule::discovered("ghost", "builtin");
        assert!(matches!(
            catalog.load(&module),
            Err(PluginError::MissingEntrypoint { .. })
        ));
    }
}
