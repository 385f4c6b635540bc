//! Startup load pass.
//!
//! Every source is asked for its extension modules, and each module is
//! driven through `Discovered -> Compiled -> Loaded -> Attached`. The first
//! failure stops the pass: no partially loaded set of types is ever served.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;

use tracing::{error, info};
use vivaio_sdk::registrar::AttachFn;

use super::error::PluginError;
use crate::content::TypeRegistry;

/// Progress of one extension module through the load pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Discovered,
    Compiled,
    Loaded,
    Attached,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadState::Discovered => "discovered",
            LoadState::Compiled => "compiled",
            LoadState::Loaded => "loaded",
            LoadState::Attached => "attached",
            LoadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One extension module known to a source.
#[derive(Debug, Clone)]
pub struct ExtensionModule {
    pub name: String,

    /// Where the module comes from (crate directory, or `builtin`).
    pub source_path: PathBuf,

    /// Compiled unit, once known.
    pub unit_path: Option<PathBuf>,

    pub state: LoadState,

    /// Types the module registered.
    pub types: Vec<String>,
}

impl ExtensionModule {
    pub fn discovered(name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            unit_path: None,
            state: LoadState::Discovered,
            types: Vec::new(),
        }
    }
}

/// A way of obtaining attach entrypoints.
///
/// Sources are kept alive for the life of the process once the pass
/// succeeds, since constructors registered by an extension may point into
/// memory the source owns.
pub trait PluginSource: Send + Sync {
    /// Short label for logs.
    fn label(&self) -> &'static str;

    /// List the modules this source provides, in load order.
    fn discover(&mut self) -> Result<Vec<ExtensionModule>, PluginError>;

    /// Produce a loadable unit for `module`.
    fn compile(&mut self, module: &mut ExtensionModule) -> Result<(), PluginError>;

    /// Load `module` and resolve its attach entrypoint.
    fn load(&mut self, module: &ExtensionModule) -> Result<AttachFn, PluginError>;
}

/// Outcome of a load pass, module by module.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub modules: Vec<ExtensionModule>,
}

impl LoadReport {
    /// Whether every module reached `Attached`.
    pub fn all_attached(&self) -> bool {
        self.modules.iter().all(|m| m.state == LoadState::Attached)
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modules.is_empty() {
            return writeln!(f, "no extensions found");
        }
        for module in &self.modules {
            write!(f, "{:<24} {:<10}", module.name, module.state)?;
            if !module.types.is_empty() {
                write!(f, " {}", module.types.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A load pass that failed, with the state every module reached.
#[derive(Debug)]
pub struct LoadFailure {
    pub error: PluginError,
    pub report: LoadReport,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for LoadFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Extensions that were attached.
#[derive(Debug)]
pub struct LoadedPlugins {
    report: LoadReport,
}

impl LoadedPlugins {
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    pub fn len(&self) -> usize {
        self.report.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.report.modules.is_empty()
    }
}

/// Runs the startup load pass over a list of sources.
#[derive(Default)]
pub struct PluginLoader {
    sources: Vec<Box<dyn PluginSource>>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source. Sources load in the order they were added.
    pub fn with_source(mut self, source: impl PluginSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Load every module, attach it to `registry`, then freeze the registry.
    ///
    /// Blocking: may run the build toolchain. Call it from a blocking
    /// context before the listener is bound.
    pub fn load(mut self, registry: &TypeRegistry) -> Result<LoadedPlugins, LoadFailure> {
        let mut report = LoadReport::default();

        for source in &mut self.sources {
            let label = source.label();
            let modules = match source.discover() {
                Ok(modules) => modules,
                Err(error) => return Err(fail(error, report)),
            };
            info!(source = label, count = modules.len(), "extensions discovered");

            for mut module in modules {
                let result = drive(source.as_mut(), &mut module, registry);
                report.modules.push(module);
                if let Err(error) = result {
                    return Err(fail(error, report));
                }
            }
        }

        registry.freeze();
        info!(
            extensions = report.modules.len(),
            types = registry.len(),
            "extension load pass complete"
        );

        Ok(LoadedPlugins { report })
    }
}

fn drive(
    source: &mut dyn PluginSource,
    module: &mut ExtensionModule,
    registry: &TypeRegistry,
) -> Result<(), PluginError> {
    let result = step(source, module, registry);
    if result.is_err() {
        module.state = LoadState::Failed;
    }
    result
}

fn step(
    source: &mut dyn PluginSource,
    module: &mut ExtensionModule,
    registry: &TypeRegistry,
) -> Result<(), PluginError> {
    source.compile(module)?;
    module.state = LoadState::Compiled;

    let attach = source.load(module)?;
    module.state = LoadState::Loaded;

    let mut registrar = registry.recording();
    catch_unwind(AssertUnwindSafe(|| attach(&mut registrar))).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        PluginError::AttachPanicked {
            plugin: module.name.clone(),
            message,
        }
    })?;
    module.types = registrar.into_registered();
    module.state = LoadState::Attached;

    info!(
        plugin = %module.name,
        source = source.label(),
        types = ?module.types,
        "extension attached"
    );
    Ok(())
}

fn fail(error: PluginError, report: LoadReport) -> LoadFailure {
    error!(plugin = %error.plugin(), error = %error, "extension load pass failed");
    LoadFailure { error, report }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::plugin::BuiltinCatalog;
    use vivaio_sdk::prelude::*;

    #[derive(Default, serde::Serialize, serde::Deserialize, Content)]
    struct Foo {
        #[serde(flatten)]
        item: Item,
    }

    #[derive(Default, serde::Serialize, serde::Deserialize, Content)]
    struct Bar {
        #[serde(flatten)]
        item: Item,
    }

    fn attach_foo(registrar: &mut dyn Registrar) {
        registrar.register_default::<Foo>("Foo");
    }

    fn attach_bar(registrar: &mut dyn Registrar) {
        registrar.register_default::<Bar>("Bar");
    }

    fn attach_noop(_registrar: &mut dyn Registrar) {}

    fn attach_panics(_registrar: &mut dyn Registrar) {
        panic!("boom");
    }

    /// Source whose compile step always fails.
    struct Broken;

    impl PluginSource for Broken {
        fn label(&self) -> &'static str {
            "broken"
        }

        fn discover(&mut self) -> Result<Vec<ExtensionModule>, PluginError> {
            Ok(vec![ExtensionModule::discovered("broken", "/plugins/broken")])
        }

        fn compile(&mut self, module: &mut ExtensionModule) -> Result<(), PluginError> {
            Err(PluginError::compilation_failed(&module.name, "syntax error"))
        }

        fn load(&mut self, _module: &ExtensionModule) -> Result<AttachFn, PluginError> {
            unreachable!("load after failed compile")
        }
    }

    #[test]
    fn attaches_modules_from_two_sources() {
        let registry = TypeRegistry::new();
        let loaded = PluginLoader::new()
            .with_source(BuiltinCatalog::new().with("foo", attach_foo))
            .with_source(BuiltinCatalog::new().with("bar", attach_bar))
            .load(&registry)
            .unwrap();

        assert!(registry.lookup("Foo").is_some());
        assert!(registry.lookup("Bar").is_some());
        assert!(registry.lookup("Baz").is_none());
        assert!(registry.is_frozen());
        assert!(loaded.report().all_attached());
        assert_eq!(loaded.report().modules[0].types, vec!["Foo".to_string()]);
    }

    #[test]
    fn noop_attach_is_legal() {
        let registry = TypeRegistry::new();
        let loaded = PluginLoader::new()
            .with_source(BuiltinCatalog::new().with("noop", attach_noop))
            .load(&registry)
            .unwrap();
        assert!(registry.is_empty());
        assert_eq!(loaded.report().modules[0].state, LoadState::Attached);
    }

    #[test]
    fn compile_failure_aborts_pass() {
        let registry = TypeRegistry::new();
        let failure = PluginLoader::new()
            .with_source(Broken)
            .with_source(BuiltinCatalog::new().with("foo", attach_foo))
            .load(&registry)
            .unwrap_err();

        assert!(matches!(failure.error, PluginError::CompilationFailed { .. }));
        assert_eq!(failure.report.modules.len(), 1);
        assert_eq!(failure.report.modules[0].state, LoadState::Failed);
        // Later sources never run and the registry stays open.
        assert!(registry.lookup("Foo").is_none());
        assert!(!registry.is_frozen());
    }

    #[test]
    fn attach_panic_is_a_load_failure() {
        let registry = TypeRegistry::new();
        let failure = PluginLoader::new()
            .with_source(BuiltinCatalog::new().with("bad", attach_panics))
            .load(&registry)
            .unwrap_err();
        assert!(
            matches!(failure.error, PluginError::AttachPanicked { ref message, .. } if message == "boom")
        );
    }

    #[test]
    fn report_lists_module_states() {
        let report = LoadReport {
            modules: vec![ExtensionModule {
                types: vec!["Post".into()],
                state: LoadState::Attached,
                ..ExtensionModule::discovered("blog", "/plugins/blog")
            }],
        };
        let text = report.to_string();
        assert!(text.contains("blog"));
        assert!(text.contains("attached"));
        assert!(text.contains("Post"));
    }
}
