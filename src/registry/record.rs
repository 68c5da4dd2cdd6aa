//! Service records: one per registered name.

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::{CorewireError, Result};

use super::service::{ServiceFactory, ServiceHandle};
use super::types::{LifecycleState, ServiceInfo, ServiceKind};
use super::ServiceRegistry;

thread_local! {
    /// Records under construction on this thread, outermost first, keyed by
    /// owning registry so separate registries never see each other's names.
    static RESOLVING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a record as under construction for the current thread.
///
/// Entering a record that is already on the stack is a cycle between
/// constructors; it is reported before the once-cell is touched, since
/// re-entering a cell mid-initialization never returns.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(registry: &ServiceRegistry, name: &str) -> Result<Self> {
        let owner = registry as *const ServiceRegistry as usize;
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|(r, n)| *r == owner && n == name) {
                let mut path: Vec<String> = stack[start..]
                    .iter()
                    .filter(|(r, _)| *r == owner)
                    .map(|(_, n)| n.clone())
                    .collect();
                path.push(name.to_string());
                return Err(CorewireError::CircularDependency { path });
            }
            stack.push((owner, name.to_string()));
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Where a record's instances come from.
pub(crate) enum Provider {
    Instance(ServiceHandle),
    Factory { factory: ServiceFactory, cache: bool },
    Class(ServiceFactory),
}

/// Mutable part of a record, owned by the lifecycle manager and health aggregator.
#[derive(Debug, Clone)]
pub(crate) struct RecordStatus {
    pub state: LifecycleState,
    pub error_message: Option<String>,
    pub health_status: Option<bool>,
    pub initialized_at: Option<DateTime<Utc>>,
    /// Position in the most recent initialization run; drives shutdown order.
    pub init_sequence: Option<u64>,
}

pub(crate) struct ServiceRecord {
    name: String,
    kind: ServiceKind,
    provider: Provider,
    dependencies: Vec<String>,
    sequence: u64,
    registered_at: DateTime<Utc>,
    /// Instance shared across resolutions (class and cached factory kinds).
    shared: OnceCell<ServiceHandle>,
    /// Instance that received `initialize()`; shutdown and health go through it.
    managed: OnceCell<ServiceHandle>,
    status: Mutex<RecordStatus>,
}

impl ServiceRecord {
    pub fn new(
        name: String,
        kind: ServiceKind,
        provider: Provider,
        dependencies: Vec<String>,
        sequence: u64,
    ) -> Self {
        Self {
            name,
            kind,
            provider,
            dependencies,
            sequence,
            registered_at: Utc::now(),
            shared: OnceCell::new(),
            managed: OnceCell::new(),
            status: Mutex::new(RecordStatus {
                state: LifecycleState::Registered,
                error_message: None,
                health_status: None,
                initialized_at: None,
                init_sequence: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> LifecycleState {
        self.status.lock().state
    }

    pub fn status(&self) -> RecordStatus {
        self.status.lock().clone()
    }

    /// Produce an instance according to the record's kind.
    ///
    /// Shared kinds construct at most once, even under concurrent first access.
    pub fn resolve(&self, registry: &ServiceRegistry) -> Result<ServiceHandle> {
        if let Provider::Instance(instance) = &self.provider {
            return Ok(instance.clone());
        }
        if let Some(shared) = self.shared.get() {
            return Ok(shared.clone());
        }

        let _guard = ResolutionGuard::enter(registry, &self.name)?;
        match &self.provider {
            Provider::Instance(instance) => Ok(instance.clone()),
            Provider::Factory {
                factory,
                cache: false,
            } => self.construct(factory, registry),
            Provider::Factory {
                factory,
                cache: true,
            }
            | Provider::Class(factory) => self
                .shared
                .get_or_try_init(|| self.construct(factory, registry))
                .cloned(),
        }
    }

    fn construct(&self, factory: &ServiceFactory, registry: &ServiceRegistry) -> Result<ServiceHandle> {
        factory(registry).map_err(|e| match e {
            // Nested failures already name the innermost service.
            CorewireError::Construction { .. } | CorewireError::CircularDependency { .. } => e,
            other => CorewireError::Construction {
                service: self.name.clone(),
                message: other.to_string(),
            },
        })
    }

    /// Instance used for lifecycle hooks, created on first use.
    pub fn lifecycle_instance(&self, registry: &ServiceRegistry) -> Result<ServiceHandle> {
        self.managed
            .get_or_try_init(|| self.resolve(registry))
            .cloned()
    }

    /// Instance that was initialized, if any.
    pub fn managed(&self) -> Option<ServiceHandle> {
        self.managed.get().cloned()
    }

    pub fn is_instantiated(&self) -> bool {
        matches!(self.provider, Provider::Instance(_))
            || self.shared.get().is_some()
            || self.managed.get().is_some()
    }

    /// Move to `next`, rejecting edges the state machine does not allow.
    pub fn transition(&self, next: LifecycleState) -> Result<()> {
        let mut status = self.status.lock();
        if !status.state.can_transition_to(next) {
            return Err(CorewireError::InvalidTransition {
                service: self.name.clone(),
                from: status.state,
                to: next,
            });
        }
        status.state = next;
        Ok(())
    }

    /// Record a successful initialization.
    pub fn mark_initialized(&self, init_sequence: u64) -> Result<()> {
        self.transition(LifecycleState::Initialized)?;
        let mut status = self.status.lock();
        status.initialized_at = Some(Utc::now());
        status.init_sequence = Some(init_sequence);
        status.error_message = None;
        Ok(())
    }

    /// Move to `FAILED` and keep the cause. A no-op on terminal records.
    pub fn mark_failed(&self, error: &CorewireError) {
        let mut status = self.status.lock();
        if status.state.can_transition_to(LifecycleState::Failed) {
            status.state = LifecycleState::Failed;
        }
        status.error_message = Some(error.to_string());
    }

    pub fn set_health(&self, healthy: bool, error_message: Option<String>) {
        let mut status = self.status.lock();
        status.health_status = Some(healthy);
        if error_message.is_some() {
            status.error_message = error_message;
        } else if healthy && status.state == LifecycleState::Initialized {
            // A passing check supersedes an earlier timeout or check error.
            status.error_message = None;
        }
    }

    pub fn info(&self) -> ServiceInfo {
        let status = self.status();
        ServiceInfo {
            name: self.name.clone(),
            kind: self.kind,
            dependencies: self.dependencies.clone(),
            state: status.state,
            error_message: status.error_message,
            health_status: status.health_status,
            instantiated: self.is_instantiated(),
            registered_at: self.registered_at,
            initialized_at: status.initialized_at,
        }
    }
}
