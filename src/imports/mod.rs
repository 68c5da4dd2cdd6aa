//! Safe dynamic loading of optional components.
//!
//! The [`ImportManager`] resolves `(module, attribute)` pairs through a chain of
//! [`ModuleLoader`]s and caches every outcome, success or failure, so a key is
//! attempted at most once until the cache is cleared. Loader panics are caught
//! and cached as failures.
//!
//! Two loaders ship with the crate:
//! - [`ModuleCatalog`] for optional modules linked into the binary
//! - [`ExecutableLoader`] for system tools, addressed as `bin:<name>`

mod executable;
mod loader;

pub use executable::{parse_version, ExecutableLoader, ExecutableModule, EXECUTABLE_PREFIX};
pub use loader::{
    Constructor, Export, ExportedConstructor, FactoryArgs, Module, ModuleCatalog, ModuleLoader,
    StaticModule,
};

#[cfg(test)]
pub use loader::MockModuleLoader;

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::registry::ServiceRegistry;

// ============================================================================
// Failures
// ============================================================================

/// Why an import failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportErrorKind {
    ModuleNotFound,
    AttributeNotFound,
    NotConstructible,
    InvalidArguments,
    LoadFailed,
}

impl ImportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportErrorKind::ModuleNotFound => "module_not_found",
            ImportErrorKind::AttributeNotFound => "attribute_not_found",
            ImportErrorKind::NotConstructible => "not_constructible",
            ImportErrorKind::InvalidArguments => "invalid_arguments",
            ImportErrorKind::LoadFailed => "load_failed",
        }
    }
}

/// A captured import failure. Cheap to clone, so cached failures can be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub kind: ImportErrorKind,
    pub module: String,
    pub attribute: Option<String>,
    pub message: String,
}

impl ImportFailure {
    pub fn new(
        kind: ImportErrorKind,
        module: &str,
        attribute: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            module: module.to_string(),
            attribute: attribute.map(|a| a.to_string()),
            message: message.into(),
        }
    }

    /// Identifier as written by callers: `module` or `module:attribute`.
    pub fn target(&self) -> String {
        match &self.attribute {
            Some(attr) => format!("{}:{}", self.module, attr),
            None => self.module.clone(),
        }
    }
}

impl fmt::Display for ImportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.target(), self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ImportFailure {}

// ============================================================================
// Import results
// ============================================================================

/// A successful import: the module and, when requested, one of its exports.
#[derive(Clone)]
pub struct Imported {
    pub module: Arc<dyn Module>,
    pub export: Option<Export>,
}

impl fmt::Debug for Imported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Imported")
            .field("module", &self.module.name())
            .field("export", &self.export)
            .finish()
    }
}

type ImportKey = (String, Option<String>);

/// Cached outcome of one import key.
#[derive(Clone)]
enum ImportAttempt {
    Loaded(Imported),
    Failed(ImportFailure),
}

impl ImportAttempt {
    fn into_result(self) -> Result<Imported, ImportFailure> {
        match self {
            ImportAttempt::Loaded(imported) => Ok(imported),
            ImportAttempt::Failed(failure) => Err(failure),
        }
    }
}

// ============================================================================
// ImportManager
// ============================================================================

/// Loads optional modules through a chain of loaders, caching every outcome.
pub struct ImportManager {
    loaders: Vec<Arc<dyn ModuleLoader>>,
    cache: Mutex<HashMap<ImportKey, ImportAttempt>>,
}

impl ImportManager {
    /// A manager with no loaders; every import fails with `ModuleNotFound`.
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Catalog first, then system executables.
    pub fn standard(catalog: Arc<ModuleCatalog>) -> Self {
        Self::new()
            .with_loader(catalog)
            .with_loader(Arc::new(ExecutableLoader::new()))
    }

    /// Append a loader. Loaders are consulted in insertion order.
    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Import `module`, and `attribute` from it when given.
    ///
    /// Outcomes are cached per `(module, attribute)`; a cached failure is
    /// returned without calling any loader again. The cache lock is held while
    /// loading, so concurrent callers never load the same key twice.
    pub fn safe_import(
        &self,
        module: &str,
        attribute: Option<&str>,
    ) -> Result<Imported, ImportFailure> {
        let mut cache = self.cache.lock();
        let key = (module.to_string(), attribute.map(|a| a.to_string()));
        if let Some(cached) = cache.get(&key) {
            debug!(module, attribute, "Import served from cache");
            return cached.clone().into_result();
        }

        let module_key = (module.to_string(), None);
        let loaded = match cache.get(&module_key) {
            Some(cached) => cached.clone(),
            None => {
                let attempt = match self.load(module) {
                    Ok(m) => ImportAttempt::Loaded(Imported {
                        module: m,
                        export: None,
                    }),
                    Err(failure) => ImportAttempt::Failed(failure),
                };
                cache.insert(module_key, attempt.clone());
                attempt
            }
        };

        let attempt = match (loaded, attribute) {
            (attempt, None) => attempt,
            (ImportAttempt::Failed(failure), Some(attr)) => ImportAttempt::Failed(ImportFailure {
                attribute: Some(attr.to_string()),
                ..failure
            }),
            (ImportAttempt::Loaded(imported), Some(attr)) => {
                match imported.module.attribute(attr) {
                    Some(export) => ImportAttempt::Loaded(Imported {
                        module: imported.module,
                        export: Some(export),
                    }),
                    None => ImportAttempt::Failed(ImportFailure::new(
                        ImportErrorKind::AttributeNotFound,
                        module,
                        Some(attr),
                        format!("module '{}' has no attribute '{}'", module, attr),
                    )),
                }
            }
        };

        match &attempt {
            ImportAttempt::Loaded(_) => debug!(module, attribute, "Import succeeded"),
            ImportAttempt::Failed(failure) => match failure.kind {
                ImportErrorKind::ModuleNotFound | ImportErrorKind::AttributeNotFound => {
                    info!(error = %failure, "Optional import unavailable")
                }
                _ => warn!(error = %failure, "Import failed"),
            },
        }
        cache.insert(key, attempt.clone());
        attempt.into_result()
    }

    /// Ask each loader in turn. `ModuleNotFound` falls through to the next loader.
    fn load(&self, module: &str) -> Result<Arc<dyn Module>, ImportFailure> {
        let mut last_miss = None;
        for loader in &self.loaders {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| loader.load(module)));
            match outcome {
                Ok(Ok(loaded)) => return Ok(loaded),
                Ok(Err(failure)) if failure.kind == ImportErrorKind::ModuleNotFound => {
                    last_miss = Some(failure);
                }
                Ok(Err(failure)) => return Err(failure),
                Err(_) => {
                    return Err(ImportFailure::new(
                        ImportErrorKind::LoadFailed,
                        module,
                        None,
                        "loader panicked",
                    ))
                }
            }
        }
        Err(last_miss.unwrap_or_else(|| {
            ImportFailure::new(
                ImportErrorKind::ModuleNotFound,
                module,
                None,
                "no loader handles this module",
            )
        }))
    }

    pub fn import_module(&self, module: &str) -> Result<Arc<dyn Module>, ImportFailure> {
        self.safe_import(module, None).map(|imported| imported.module)
    }

    pub fn import_attribute(&self, module: &str, attribute: &str) -> Result<Export, ImportFailure> {
        let imported = self.safe_import(module, Some(attribute))?;
        imported.export.ok_or_else(|| {
            ImportFailure::new(
                ImportErrorKind::AttributeNotFound,
                module,
                Some(attribute),
                "attribute missing",
            )
        })
    }

    pub fn is_available(&self, module: &str) -> bool {
        self.safe_import(module, None).is_ok()
    }

    /// Import `module:attribute` and register it in `registry` as `register_name`.
    ///
    /// Instance exports are registered as singletons. Constructor exports are
    /// called with `factory_args` after argument validation, and the result is
    /// registered as a singleton with the constructor's declared dependencies.
    /// Returns `false` on any failure; nothing is raised.
    pub fn try_import_service(
        &self,
        registry: &ServiceRegistry,
        module: &str,
        register_name: &str,
        attribute: &str,
        factory_args: Option<FactoryArgs>,
    ) -> bool {
        let export = match self.import_attribute(module, attribute) {
            Ok(export) => export,
            Err(failure) => {
                debug!(service = register_name, error = %failure, "Service import skipped");
                return false;
            }
        };

        let (instance, dependencies) = match export {
            Export::Instance(instance) => {
                if factory_args.as_ref().is_some_and(|args| !args.is_empty()) {
                    let failure = ImportFailure::new(
                        ImportErrorKind::NotConstructible,
                        module,
                        Some(attribute),
                        "arguments supplied for an attribute that is not constructible",
                    );
                    warn!(service = register_name, error = %failure, "Service import rejected");
                    return false;
                }
                (instance, Vec::new())
            }
            Export::Constructor(constructor) => {
                let args = factory_args.unwrap_or_default();
                if let Err(message) = constructor.validate_args(&args) {
                    let failure = ImportFailure::new(
                        ImportErrorKind::InvalidArguments,
                        module,
                        Some(attribute),
                        message,
                    );
                    warn!(service = register_name, error = %failure, "Service import rejected");
                    return false;
                }
                match std::panic::catch_unwind(AssertUnwindSafe(|| constructor.construct(&args))) {
                    Ok(Ok(instance)) => (instance, constructor.dependencies().to_vec()),
                    Ok(Err(e)) => {
                        warn!(service = register_name, module, attribute, error = %e, "Imported constructor failed");
                        return false;
                    }
                    Err(_) => {
                        warn!(service = register_name, module, attribute, "Imported constructor panicked");
                        return false;
                    }
                }
            }
        };

        let deps: Vec<&str> = dependencies.iter().map(|d| d.as_str()).collect();
        match registry.register_singleton(register_name, instance, &deps) {
            Ok(()) => {
                info!(service = register_name, module, attribute, "Registered imported service");
                true
            }
            Err(e) => {
                warn!(service = register_name, error = %e, "Imported service could not be registered");
                false
            }
        }
    }

    /// Forget every cached outcome. Returns the number of entries removed.
    pub fn clear_cache(&self) -> usize {
        let mut cache = self.cache.lock();
        let count = cache.len();
        cache.clear();
        debug!(removed = count, "Import cache cleared");
        count
    }

    /// Forget cached failures only, so they are retried on the next import.
    pub fn clear_failed_imports(&self) -> usize {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, attempt| matches!(attempt, ImportAttempt::Loaded(_)));
        let removed = before - cache.len();
        debug!(removed, "Failed imports cleared");
        removed
    }

    /// Every cached failure, sorted by target.
    pub fn cached_failures(&self) -> Vec<ImportFailure> {
        let mut failures: Vec<ImportFailure> = self
            .cache
            .lock()
            .values()
            .filter_map(|attempt| match attempt {
                ImportAttempt::Failed(failure) => Some(failure.clone()),
                ImportAttempt::Loaded(_) => None,
            })
            .collect();
        failures.sort_by_key(|f| f.target());
        failures
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}
