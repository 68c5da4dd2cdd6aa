//! The capability interface every registered service implements.

use std::sync::Arc;

use async_trait::async_trait;
use downcast_rs::{impl_downcast, DowncastSync};

use crate::error::Result;

use super::ServiceRegistry;

/// A named, lifecycle-managed component.
///
/// All hooks have defaults, so plain data services only need an empty impl:
///
/// ```
/// use corewire::Service;
///
/// struct Settings { debug: bool }
/// impl Service for Settings {}
/// ```
#[async_trait]
pub trait Service: DowncastSync {
    /// Called once by `initialize_all`, after every declared dependency is initialized.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Called once by `shutdown_all` or during rollback.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// Health predicate polled by the health aggregator.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

impl_downcast!(sync Service);

/// Shared handle to a live service instance.
pub type ServiceHandle = Arc<dyn Service>;

/// Constructor stored by factory and class registrations.
///
/// Receives the registry so it can resolve its own dependencies.
pub type ServiceFactory = Arc<dyn Fn(&ServiceRegistry) -> Result<ServiceHandle> + Send + Sync>;

/// A service type the registry can instantiate itself.
///
/// `DEPENDENCIES` is used when `register_class` is called without an explicit list.
pub trait ServiceClass: Service + Sized {
    const DEPENDENCIES: &'static [&'static str] = &[];

    fn construct(registry: &ServiceRegistry) -> Result<Self>;
}
