//! Service registry for Corewire
//!
//! The registry is the central store of service records. Services are
//! registered as pre-built singletons, per-call factories, or lazily
//! constructed classes, each with an ordered list of declared dependencies.
//!
//! Resolution (`get`, `require_service`, `optional_service`) lives here.
//! Ordering, lifecycle, and health are implemented in the `resolver`,
//! `lifecycle`, and `health` modules as further `impl ServiceRegistry` blocks.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use corewire::{Service, ServiceRegistry};
//!
//! struct Settings;
//! impl Service for Settings {}
//!
//! let registry = ServiceRegistry::new();
//! registry.register_singleton("settings", Arc::new(Settings), &[]).unwrap();
//! assert!(registry.has("settings"));
//! assert!(registry.get_as::<Settings>("settings").is_ok());
//! ```

mod record;
mod service;
mod types;

pub use service::{Service, ServiceClass, ServiceFactory, ServiceHandle};
pub use types::{LifecycleState, ServiceInfo, ServiceKind};

pub(crate) use record::ServiceRecord;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::{Config, HealthConfig};
use crate::error::{CorewireError, Result};

use record::Provider;

/// Process-wide registry, replaced wholesale by [`ServiceRegistry::reset_global`].
static GLOBAL: Lazy<RwLock<Arc<ServiceRegistry>>> =
    Lazy::new(|| RwLock::new(Arc::new(ServiceRegistry::new())));

/// A registry of named services and their dependency declarations.
pub struct ServiceRegistry {
    records: RwLock<HashMap<String, Arc<ServiceRecord>>>,
    next_sequence: AtomicU64,
    next_init_sequence: AtomicU64,
    health: HealthConfig,
}

impl ServiceRegistry {
    /// Create an empty registry with default health settings.
    pub fn new() -> Self {
        Self::with_health_config(HealthConfig::default())
    }

    /// Create an empty registry with explicit health check settings.
    pub fn with_health_config(health: HealthConfig) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            next_init_sequence: AtomicU64::new(0),
            health,
        }
    }

    /// Create an empty registry configured from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::with_health_config(config.health.clone())
    }

    /// The process-wide registry.
    ///
    /// Prefer passing an explicit `Arc<ServiceRegistry>` through constructors;
    /// this accessor exists for the composition root and for code that cannot
    /// be threaded a handle.
    pub fn global() -> Arc<ServiceRegistry> {
        GLOBAL.read().clone()
    }

    /// Replace the process-wide registry with an empty one.
    ///
    /// Handles obtained from earlier `global()` calls keep pointing at the old registry.
    pub fn reset_global() {
        *GLOBAL.write() = Arc::new(ServiceRegistry::new());
        debug!("Global service registry reset");
    }

    pub fn health_config(&self) -> &HealthConfig {
        &self.health
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register a pre-built instance.
    pub fn register_singleton(
        &self,
        name: impl Into<String>,
        instance: ServiceHandle,
        dependencies: &[&str],
    ) -> Result<()> {
        self.insert(
            name.into(),
            ServiceKind::Singleton,
            Provider::Instance(instance),
            to_owned(dependencies),
        )
    }

    /// Register a constructor invoked on every resolution.
    pub fn register_factory<F>(
        &self,
        name: impl Into<String>,
        factory: F,
        dependencies: &[&str],
    ) -> Result<()>
    where
        F: Fn(&ServiceRegistry) -> Result<ServiceHandle> + Send + Sync + 'static,
    {
        self.insert(
            name.into(),
            ServiceKind::Factory,
            Provider::Factory {
                factory: Arc::new(factory),
                cache: false,
            },
            to_owned(dependencies),
        )
    }

    /// Register a constructor whose first instance is cached and reused.
    pub fn register_cached_factory<F>(
        &self,
        name: impl Into<String>,
        factory: F,
        dependencies: &[&str],
    ) -> Result<()>
    where
        F: Fn(&ServiceRegistry) -> Result<ServiceHandle> + Send + Sync + 'static,
    {
        self.insert(
            name.into(),
            ServiceKind::Factory,
            Provider::Factory {
                factory: Arc::new(factory),
                cache: true,
            },
            to_owned(dependencies),
        )
    }

    /// Register a [`ServiceClass`] type, constructed once on first resolution.
    ///
    /// When `dependencies` is `None`, `T::DEPENDENCIES` is used.
    pub fn register_class<T: ServiceClass>(
        &self,
        name: impl Into<String>,
        dependencies: Option<&[&str]>,
    ) -> Result<()> {
        let dependencies = to_owned(dependencies.unwrap_or(T::DEPENDENCIES));
        let factory: ServiceFactory =
            Arc::new(|registry: &ServiceRegistry| Ok(Arc::new(T::construct(registry)?) as ServiceHandle));
        self.insert(
            name.into(),
            ServiceKind::Class,
            Provider::Class(factory),
            dependencies,
        )
    }

    fn insert(
        &self,
        name: String,
        kind: ServiceKind,
        provider: Provider,
        dependencies: Vec<String>,
    ) -> Result<()> {
        let mut records = self.records.write();
        if let Some(existing) = records.get(&name) {
            let state = existing.state();
            if !state.is_terminal() {
                warn!(service = %name, state = %state, "Duplicate service registration rejected");
                return Err(CorewireError::DuplicateService(name));
            }
            info!(service = %name, previous_state = %state, "Re-registering service");
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        info!(
            service = %name,
            kind = %kind,
            dependencies = ?dependencies,
            "Registered service"
        );
        let record = ServiceRecord::new(name.clone(), kind, provider, dependencies, sequence);
        records.insert(name, Arc::new(record));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------

    pub(crate) fn record(&self, name: &str) -> Option<Arc<ServiceRecord>> {
        self.records.read().get(name).cloned()
    }

    /// All records in registration order.
    pub(crate) fn records_in_order(&self) -> Vec<Arc<ServiceRecord>> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by_key(|r| r.sequence());
        records
    }

    pub(crate) fn next_init_sequence(&self) -> u64 {
        self.next_init_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Resolve a service instance, constructing it for factory and class kinds.
    pub fn get(&self, name: &str) -> Result<ServiceHandle> {
        let record = self.record(name).ok_or_else(|| {
            warn!(service = name, "Service lookup failed: not registered");
            CorewireError::ServiceNotFound(name.to_string())
        })?;
        record.resolve(self).inspect_err(|e| {
            warn!(service = name, error = %e, "Service resolution failed");
        })
    }

    /// Resolve and downcast to a concrete service type.
    pub fn get_as<T: Service>(&self, name: &str) -> Result<Arc<T>> {
        downcast(name, self.get(name)?)
    }

    /// Check whether `name` is registered.
    pub fn has(&self, name: &str) -> bool {
        self.records.read().contains_key(name)
    }

    /// Registered service names, in registration order.
    pub fn list_services(&self) -> Vec<String> {
        self.records_in_order()
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Snapshot of a single record.
    pub fn get_service_info(&self, name: &str) -> Result<ServiceInfo> {
        self.record(name)
            .map(|r| r.info())
            .ok_or_else(|| CorewireError::ServiceNotFound(name.to_string()))
    }

    /// Resolve a service the caller cannot work without.
    ///
    /// `context` names the calling component and is carried in the error.
    pub fn require_service(&self, name: &str, context: &str) -> Result<ServiceHandle> {
        let required = |reason: String| CorewireError::ServiceRequired {
            service: name.to_string(),
            context: context.to_string(),
            reason,
        };

        let record = self.record(name).ok_or_else(|| {
            warn!(service = name, context, "Required service is not registered");
            required("not registered".to_string())
        })?;

        let status = record.status();
        if status.state == LifecycleState::Failed {
            warn!(service = name, context, "Required service is in FAILED state");
            let cause = status
                .error_message
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(required(format!("service failed: {}", cause)));
        }

        record.resolve(self).map_err(|e| {
            warn!(service = name, context, error = %e, "Required service could not be resolved");
            required(e.to_string())
        })
    }

    /// Typed variant of [`require_service`](Self::require_service).
    pub fn require_as<T: Service>(&self, name: &str, context: &str) -> Result<Arc<T>> {
        downcast(name, self.require_service(name, context)?)
    }

    /// Resolve a service the caller can degrade without.
    ///
    /// Any failure is logged at debug level and mapped to `None`.
    pub fn optional_service(&self, name: &str, context: &str) -> Option<ServiceHandle> {
        match self.require_service(name, context) {
            Ok(handle) => Some(handle),
            Err(e) => {
                debug!(service = name, context, error = %e, "Optional service unavailable");
                None
            }
        }
    }

    /// Like [`optional_service`](Self::optional_service), falling back to `default`.
    pub fn optional_service_or(
        &self,
        name: &str,
        context: &str,
        default: ServiceHandle,
    ) -> ServiceHandle {
        self.optional_service(name, context).unwrap_or(default)
    }

    /// Typed variant of [`optional_service`](Self::optional_service).
    pub fn optional_as<T: Service>(&self, name: &str, context: &str) -> Option<Arc<T>> {
        self.optional_service(name, context)
            .and_then(|handle| handle.downcast_arc::<T>().ok())
    }

    /// Drop every record. Intended for test isolation.
    pub fn reset(&self) {
        let mut records = self.records.write();
        let count = records.len();
        records.clear();
        self.next_sequence.store(0, Ordering::Relaxed);
        self.next_init_sequence.store(0, Ordering::Relaxed);
        info!(removed = count, "Service registry reset");
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn to_owned(dependencies: &[&str]) -> Vec<String> {
    dependencies.iter().map(|d| d.to_string()).collect()
}

fn downcast<T: Service>(name: &str, handle: ServiceHandle) -> Result<Arc<T>> {
    handle
        .downcast_arc::<T>()
        .map_err(|_| CorewireError::TypeMismatch {
            service: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
}
