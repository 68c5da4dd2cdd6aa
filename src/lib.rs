//! Corewire - runtime service registry and dependency resolution
//!
//! Register services, resolve their dependency graph, start and stop them in
//! order, poll their health, load optional components safely, and check
//! external dependencies against a manifest at startup.
//!
//! ```
//! use std::sync::Arc;
//! use corewire::{Service, ServiceRegistry};
//!
//! struct Config;
//! impl Service for Config {}
//! struct Database;
//! impl Service for Database {}
//!
//! # tokio_test::block_on(async {
//! let registry = ServiceRegistry::new();
//! registry.register_singleton("config", Arc::new(Config), &[]).unwrap();
//! registry.register_singleton("database", Arc::new(Database), &["config"]).unwrap();
//!
//! let started = registry.initialize_all().await.unwrap();
//! assert_eq!(started, vec!["config", "database"]);
//! assert!(registry.health_check_all().await.values().all(|ok| *ok));
//! registry.shutdown_all().await;
//! # });
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod imports;
pub mod lifecycle;
pub mod registry;
pub mod resolver;
pub mod utils;
pub mod validator;

pub use config::Config;
pub use error::{CorewireError, Result};
pub use health::HealthSummary;
pub use imports::{ImportFailure, ImportManager};
pub use lifecycle::ShutdownReport;
pub use registry::{
    LifecycleState, Service, ServiceClass, ServiceHandle, ServiceInfo, ServiceKind,
    ServiceRegistry,
};
pub use validator::{DependencyManifest, DependencyValidator, ValidationResult};
