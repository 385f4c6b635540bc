//! Content type registry.
//!
//! Maps type names to constructors. Populated by extensions during the
//! startup load pass, then frozen and shared read-only with every handler.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::{debug, warn};
use vivaio_sdk::content::{Constructor, Content};
use vivaio_sdk::registrar::Registrar;

/// Registry of content types.
///
/// Cheap to clone; all clones share the same map.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    inner: Arc<TypeRegistryInner>,
}

#[derive(Default)]
struct TypeRegistryInner {
    types: DashMap<String, Constructor>,
    frozen: AtomicBool,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the constructor for `name`.
    ///
    /// Registering after [`freeze`](Self::freeze) still succeeds, but
    /// handlers already serving requests may not observe it consistently.
    pub fn register(&self, name: &str, constructor: Constructor) {
        if self.is_frozen() {
            warn!(type_name = %name, "content type registered after load phase");
        }
        if self
            .inner
            .types
            .insert(name.to_string(), constructor)
            .is_some()
        {
            warn!(type_name = %name, "content type replaced");
        } else {
            debug!(type_name = %name, "content type registered");
        }
    }

    /// Constructor for `name`, if registered.
    pub fn lookup(&self, name: &str) -> Option<Constructor> {
        self.inner.types.get(name).map(|r| Arc::clone(r.value()))
    }

    /// A fresh blank instance of `name`.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Content>> {
        self.lookup(name).map(|constructor| constructor())
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> BTreeSet<String> {
        self.inner.types.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.types.is_empty()
    }

    /// Mark the end of the load phase.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Field schema of every type: type name -> field name -> type.
    pub fn describe(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.inner
            .types
            .iter()
            .map(|entry| {
                let instance = (entry.value())();
                let fields = instance
                    .field_schema()
                    .into_iter()
                    .map(|f| (f.name, f.type_name))
                    .collect();
                (entry.key().clone(), fields)
            })
            .collect()
    }

    /// A registrar that writes through to this registry and remembers
    /// which names it registered.
    pub fn recording(&self) -> RecordingRegistrar {
        RecordingRegistrar {
            registry: self.clone(),
            registered: Vec::new(),
        }
    }
}

impl Registrar for TypeRegistry {
    fn register(&mut self, name: &str, constructor: Constructor) {
        TypeRegistry::register(self, name, constructor);
    }
}

/// Registrar handed to one extension's attach call.
pub struct RecordingRegistrar {
    registry: TypeRegistry,
    registered: Vec<String>,
}

impl RecordingRegistrar {
    /// Names registered through this registrar, in call order.
    pub fn into_registered(self) -> Vec<String> {
        self.registered
    }
}

impl Registrar for RecordingRegistrar {
    fn register(&mut self, name: &str, constructor: Constructor) {
        self.registry.register(name, constructor);
        if !self.registered.iter().any(|n| n == name) {
            self.registered.push(name.to_string());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use vivaio_sdk::prelude::*;

    #[derive(Default, serde::Serialize, serde::Deserialize, Content)]
    struct Note {
        #[serde(flatten)]
        item: Item,
        body: String,
        #[serde(rename = "tag_list")]
        tags: Vec<String>,
    }

    #[test]
    fn unknown_type_is_none() {
        let registry = TypeRegistry::new();
        assert!(registry.lookup("Missing").is_none());
        assert!(registry.instantiate("Missing").is_none());
    }

    #[test]
    fn register_then_instantiate() {
        let registry = TypeRegistry::new();
        registry.register("Note", constructor::<Note>());

        let instance = registry.instantiate("Note").unwrap();
        assert_eq!(instance.item().id, 0);
        assert_eq!(
            registry.names().into_iter().collect::<Vec<_>>(),
            vec!["Note"]
        );
    }

    #[test]
    fn register_overwrites() {
        let registry = TypeRegistry::new();
        registry.register("Note", constructor::<Note>());
        registry.register("Note", constructor::<Note>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let registry = TypeRegistry::new();
        let clone = registry.clone();
        clone.register("Note", constructor::<Note>());
        clone.freeze();
        assert!(registry.lookup("Note").is_some());
        assert!(registry.is_frozen());
    }

    #[test]
    fn registration_after_freeze_is_best_effort() {
        let registry = TypeRegistry::new();
        registry.freeze();
        registry.register("Note", constructor::<Note>());
        assert!(registry.lookup("Note").is_some());
    }

    #[test]
    fn describe_lists_identity_and_type_fields() {
        let registry = TypeRegistry::new();
        registry.register("Note", constructor::<Note>());

        let schema = registry.describe();
        let note = &schema["Note"];
        assert_eq!(note["id"], "i64");
        assert_eq!(note["slug"], "String");
        assert_eq!(note["body"], "String");
        assert_eq!(note["tag_list"], "Vec<String>");
    }

    #[test]
    fn recording_registrar_tracks_names() {
        let registry = TypeRegistry::new();
        let mut recorder = registry.recording();
        {
            let registrar: &mut dyn Registrar = &mut recorder;
            registrar.register_default::<Note>("Note");
            registrar.register_default::<Note>("Memo");
            registrar.register_default::<Note>("Note");
        }
        assert_eq!(recorder.into_registered(), vec!["Note", "Memo"]);
        assert_eq!(registry.len(), 2);
    }
}
