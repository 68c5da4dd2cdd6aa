//! Loader abstraction: modules, their exported attributes, and the in-process catalog.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::registry::ServiceHandle;

use super::{ImportErrorKind, ImportFailure};

/// Keyword arguments handed to an exported constructor.
pub type FactoryArgs = serde_json::Map<String, serde_json::Value>;

/// Constructor closure exported by a module.
pub type Constructor = Arc<dyn Fn(&FactoryArgs) -> Result<ServiceHandle> + Send + Sync>;

// ============================================================================
// Exports
// ============================================================================

/// A constructor exported by a module, with the arguments it accepts.
#[derive(Clone)]
pub struct ExportedConstructor {
    construct: Constructor,
    dependencies: Vec<String>,
    accepted_args: Option<Vec<String>>,
}

impl ExportedConstructor {
    pub fn new<F>(construct: F) -> Self
    where
        F: Fn(&FactoryArgs) -> Result<ServiceHandle> + Send + Sync + 'static,
    {
        Self {
            construct: Arc::new(construct),
            dependencies: Vec::new(),
            accepted_args: None,
        }
    }

    /// Services the constructed instance depends on once registered.
    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Restrict accepted argument names. Without this, any arguments pass.
    pub fn accepting(mut self, args: &[&str]) -> Self {
        self.accepted_args = Some(args.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Reject argument names the constructor does not declare.
    pub fn validate_args(&self, args: &FactoryArgs) -> std::result::Result<(), String> {
        let Some(accepted) = &self.accepted_args else {
            return Ok(());
        };
        let unknown: Vec<&str> = args
            .keys()
            .filter(|k| !accepted.iter().any(|a| a == *k))
            .map(|k| k.as_str())
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "unexpected argument(s) {}; accepted: [{}]",
                unknown.join(", "),
                accepted.join(", ")
            ))
        }
    }

    pub fn construct(&self, args: &FactoryArgs) -> Result<ServiceHandle> {
        (self.construct)(args)
    }
}

/// Something a module makes available under an attribute name.
#[derive(Clone)]
pub enum Export {
    /// A ready-made instance.
    Instance(ServiceHandle),
    /// A constructor that needs arguments to produce an instance.
    Constructor(ExportedConstructor),
}

impl Export {
    pub fn is_constructible(&self) -> bool {
        matches!(self, Export::Constructor(_))
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Instance(_) => f.write_str("Export::Instance"),
            Export::Constructor(c) => f
                .debug_struct("Export::Constructor")
                .field("dependencies", &c.dependencies)
                .field("accepted_args", &c.accepted_args)
                .finish(),
        }
    }
}

// ============================================================================
// Module
// ============================================================================

/// A loaded optional component.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// Version string, if the module exposes one.
    fn version(&self) -> Option<String> {
        None
    }

    /// Look up an exported attribute.
    fn attribute(&self, name: &str) -> Option<Export>;

    /// Names of all exported attributes.
    fn attributes(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A module assembled in code, for statically linked optional components.
///
/// ```
/// use std::sync::Arc;
/// use corewire::imports::StaticModule;
/// use corewire::Service;
///
/// struct Cache;
/// impl Service for Cache {}
///
/// let module = StaticModule::new("cache")
///     .with_version("1.4.0")
///     .export_instance("default", Arc::new(Cache));
/// ```
pub struct StaticModule {
    name: String,
    version: Option<String>,
    exports: BTreeMap<String, Export>,
}

impl StaticModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            exports: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn export(mut self, attribute: impl Into<String>, export: Export) -> Self {
        self.exports.insert(attribute.into(), export);
        self
    }

    pub fn export_instance(self, attribute: impl Into<String>, instance: ServiceHandle) -> Self {
        self.export(attribute, Export::Instance(instance))
    }

    pub fn export_constructor(
        self,
        attribute: impl Into<String>,
        constructor: ExportedConstructor,
    ) -> Self {
        self.export(attribute, Export::Constructor(constructor))
    }
}

impl Module for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn attribute(&self, name: &str) -> Option<Export> {
        self.exports.get(name).cloned()
    }

    fn attributes(&self) -> Vec<String> {
        self.exports.keys().cloned().collect()
    }
}

// ============================================================================
// Loaders
// ============================================================================

/// Resolves a module identifier to a loaded module.
///
/// Loaders return [`ImportErrorKind::ModuleNotFound`] for identifiers they do
/// not handle so the import manager can try the next loader.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleLoader: Send + Sync {
    fn load(&self, module: &str) -> std::result::Result<Arc<dyn Module>, ImportFailure>;
}

/// In-process table of optional modules linked into the binary.
#[derive(Default)]
pub struct ModuleCatalog {
    modules: RwLock<HashMap<String, Arc<dyn Module>>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a module under its own name.
    pub fn register(&self, module: impl Module + 'static) {
        let module: Arc<dyn Module> = Arc::new(module);
        self.modules
            .write()
            .insert(module.name().to_string(), module);
    }

    pub fn remove(&self, name: &str) -> bool {
        self.modules.write().remove(name).is_some()
    }

    /// Registered module names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ModuleLoader for ModuleCatalog {
    fn load(&self, module: &str) -> std::result::Result<Arc<dyn Module>, ImportFailure> {
        self.modules.read().get(module).cloned().ok_or_else(|| {
            ImportFailure::new(
                ImportErrorKind::ModuleNotFound,
                module,
                None,
                "module is not in the catalog",
            )
        })
    }
}
