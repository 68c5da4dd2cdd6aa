//! Service lifecycle: ordered initialization with rollback, reverse-order shutdown.
//!
//! Both directions run sequentially; correctness depends on strict ordering.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{CorewireError, Result};
use crate::registry::{LifecycleState, ServiceRecord, ServiceRegistry};

/// Outcome of [`ServiceRegistry::shutdown_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownReport {
    /// Services shut down cleanly, in shutdown order.
    pub stopped: Vec<String>,
    /// Services whose shutdown hook failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl ServiceRegistry {
    /// Initialize every registered service in dependency order.
    ///
    /// The graph is validated before any service is touched. On the first
    /// failure, services initialized during this call are shut down in
    /// reverse order and the failure is returned as
    /// [`CorewireError::ServiceInitialization`].
    ///
    /// Services already `INITIALIZED` by an earlier call are skipped. Returns
    /// the names initialized by this call, in order.
    pub async fn initialize_all(&self) -> Result<Vec<String>> {
        let order = self.initialization_order()?;
        let records: Vec<Arc<ServiceRecord>> =
            order.iter().filter_map(|name| self.record(name)).collect();

        if let Some(blocked) = records.iter().find(|r| r.state().is_terminal()) {
            let err = CorewireError::InvalidState {
                service: blocked.name().to_string(),
                state: blocked.state(),
            };
            error!(error = %err, "Refusing to initialize services");
            return Err(err);
        }

        info!(count = records.len(), "Initializing services");
        let mut started: Vec<Arc<ServiceRecord>> = Vec::new();

        for record in records {
            if record.state() == LifecycleState::Initialized {
                continue;
            }

            if let Err(cause) = self.initialize_record(&record).await {
                error!(
                    service = record.name(),
                    error = %cause,
                    rollback = started.len(),
                    "Service initialization failed, rolling back"
                );
                rollback(&started).await;
                return Err(CorewireError::ServiceInitialization {
                    service: record.name().to_string(),
                    source: Box::new(cause),
                });
            }
            started.push(record);
        }

        info!(count = started.len(), "All services initialized");
        Ok(started.iter().map(|r| r.name().to_string()).collect())
    }

    async fn initialize_record(&self, record: &ServiceRecord) -> Result<()> {
        record.transition(LifecycleState::Initializing)?;
        let start = Instant::now();

        let outcome = match record.lifecycle_instance(self) {
            Ok(instance) => AssertUnwindSafe(instance.initialize())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panicked("initialize", panic))),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                record.mark_initialized(self.next_init_sequence())?;
                info!(
                    service = record.name(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Service initialized"
                );
                Ok(())
            }
            Err(e) => {
                record.mark_failed(&e);
                Err(e)
            }
        }
    }

    /// Shut down every `INITIALIZED` service in reverse initialization order.
    ///
    /// A failing shutdown hook is logged and reported but does not stop the
    /// remaining services from shutting down.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let mut running: Vec<(u64, Arc<ServiceRecord>)> = self
            .records_in_order()
            .into_iter()
            .filter_map(|r| {
                let status = r.status();
                match (status.state, status.init_sequence) {
                    (LifecycleState::Initialized, Some(seq)) => Some((seq, r)),
                    _ => None,
                }
            })
            .collect();
        running.sort_by(|a, b| b.0.cmp(&a.0));

        info!(count = running.len(), "Shutting down services");
        let mut report = ShutdownReport::default();
        for (_, record) in running {
            match shutdown_record(&record).await {
                Ok(()) => report.stopped.push(record.name().to_string()),
                Err(e) => report
                    .failed
                    .push((record.name().to_string(), e.to_string())),
            }
        }

        if report.is_clean() {
            info!(stopped = report.stopped.len(), "Shutdown complete");
        } else {
            warn!(
                stopped = report.stopped.len(),
                failed = report.failed.len(),
                "Shutdown completed with errors"
            );
        }
        report
    }
}

/// Undo a partial initialization run, newest first.
async fn rollback(started: &[Arc<ServiceRecord>]) {
    for record in started.iter().rev() {
        if let Err(e) = shutdown_record(record).await {
            warn!(service = record.name(), error = %e, "Rollback shutdown failed");
        }
    }
}

async fn shutdown_record(record: &ServiceRecord) -> Result<()> {
    let outcome = match record.managed() {
        Some(instance) => AssertUnwindSafe(instance.shutdown())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panicked("shutdown", panic))),
        None => Ok(()),
    };

    match outcome {
        Ok(()) => {
            record.transition(LifecycleState::Shutdown)?;
            info!(service = record.name(), "Service shut down");
            Ok(())
        }
        Err(e) => {
            error!(service = record.name(), error = %e, "Service shutdown failed");
            record.mark_failed(&e);
            Err(e)
        }
    }
}

fn panicked(hook: &str, payload: Box<dyn Any + Send>) -> CorewireError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    CorewireError::Service(format!("{} panicked: {}", hook, detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Service, ServiceHandle};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Tracked {
        name: &'static str,
        journal: Journal,
        fail_init: bool,
        fail_shutdown: bool,
    }

    impl Tracked {
        fn handle(name: &'static str, journal: &Journal) -> ServiceHandle {
            Arc::new(Self {
                name,
                journal: journal.clone(),
                fail_init: false,
                fail_shutdown: false,
            })
        }

        fn failing_init(name: &'static str, journal: &Journal) -> ServiceHandle {
            Arc::new(Self {
                name,
                journal: journal.clone(),
                fail_init: true,
                fail_shutdown: false,
            })
        }

        fn failing_shutdown(name: &'static str, journal: &Journal) -> ServiceHandle {
            Arc::new(Self {
                name,
                journal: journal.clone(),
                fail_init: false,
                fail_shutdown: true,
            })
        }
    }

    #[async_trait]
    impl Service for Tracked {
        async fn initialize(&self) -> Result<()> {
            self.journal.lock().push(format!("init:{}", self.name));
            if self.fail_init {
                return Err(CorewireError::Service(format!("{} refused to start", self.name)));
            }
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            self.journal.lock().push(format!("shutdown:{}", self.name));
            if self.fail_shutdown {
                return Err(CorewireError::Service("stuck".into()));
            }
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl Service for Panics {
        async fn initialize(&self) -> Result<()> {
            panic!("bad wiring");
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().clone()
    }

    #[tokio::test]
    async fn test_initialize_in_dependency_order() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("database", Tracked::handle("database", &log), &["config", "logger"])
            .unwrap();
        registry
            .register_singleton("logger", Tracked::handle("logger", &log), &["config"])
            .unwrap();
        registry
            .register_singleton("config", Tracked::handle("config", &log), &[])
            .unwrap();

        let initialized = registry.initialize_all().await.unwrap();
        assert_eq!(initialized, vec!["config", "logger", "database"]);
        assert_eq!(
            entries(&log),
            vec!["init:config", "init:logger", "init:database"]
        );
        for name in ["config", "logger", "database"] {
            let info = registry.get_service_info(name).unwrap();
            assert_eq!(info.state, LifecycleState::Initialized);
            assert!(info.initialized_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_initialize_twice_skips_initialized() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("a", Tracked::handle("a", &log), &[])
            .unwrap();
        registry.initialize_all().await.unwrap();
        registry
            .register_singleton("b", Tracked::handle("b", &log), &["a"])
            .unwrap();

        let second = registry.initialize_all().await.unwrap();
        assert_eq!(second, vec!["b"]);
        assert_eq!(entries(&log), vec!["init:a", "init:b"]);
    }

    #[tokio::test]
    async fn test_rollback_reverses_initialized_services() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("a", Tracked::handle("a", &log), &[])
            .unwrap();
        registry
            .register_singleton("b", Tracked::handle("b", &log), &[])
            .unwrap();
        registry
            .register_singleton("c", Tracked::failing_init("c", &log), &["a", "b"])
            .unwrap();

        let err = registry.initialize_all().await.unwrap_err();
        match &err {
            CorewireError::ServiceInitialization { service, source } => {
                assert_eq!(service, "c");
                assert!(source.to_string().contains("refused to start"));
            }
            other => panic!("expected ServiceInitialization, got {other:?}"),
        }

        assert_eq!(
            entries(&log),
            vec!["init:a", "init:b", "init:c", "shutdown:b", "shutdown:a"]
        );
        assert_eq!(registry.get_service_info("a").unwrap().state, LifecycleState::Shutdown);
        assert_eq!(registry.get_service_info("b").unwrap().state, LifecycleState::Shutdown);
        let c = registry.get_service_info("c").unwrap();
        assert_eq!(c.state, LifecycleState::Failed);
        assert!(c.error_message.unwrap().contains("refused to start"));
    }

    #[tokio::test]
    async fn test_failure_leaves_later_services_registered() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("first", Tracked::failing_init("first", &log), &[])
            .unwrap();
        registry
            .register_singleton("second", Tracked::handle("second", &log), &["first"])
            .unwrap();

        assert!(registry.initialize_all().await.is_err());
        assert_eq!(entries(&log), vec!["init:first"]);
        assert_eq!(
            registry.get_service_info("second").unwrap().state,
            LifecycleState::Registered
        );
    }

    #[tokio::test]
    async fn test_cycle_blocks_any_initialization() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("standalone", Tracked::handle("standalone", &log), &[])
            .unwrap();
        registry
            .register_singleton("a", Tracked::handle("a", &log), &["b"])
            .unwrap();
        registry
            .register_singleton("b", Tracked::handle("b", &log), &["a"])
            .unwrap();

        let err = registry.initialize_all().await.unwrap_err();
        assert!(matches!(err, CorewireError::CircularDependency { .. }));
        assert!(entries(&log).is_empty());
        assert_eq!(
            registry.get_service_info("standalone").unwrap().state,
            LifecycleState::Registered
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_blocks_initialization() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("api", Tracked::handle("api", &log), &["auth"])
            .unwrap();
        let err = registry.initialize_all().await.unwrap_err();
        assert!(matches!(err, CorewireError::MissingDependency { .. }));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_terminal_record_blocks_initialization() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("a", Tracked::failing_init("a", &log), &[])
            .unwrap();
        assert!(registry.initialize_all().await.is_err());

        let err = registry.initialize_all().await.unwrap_err();
        assert!(matches!(
            err,
            CorewireError::InvalidState { ref service, state: LifecycleState::Failed } if service == "a"
        ));
    }

    #[tokio::test]
    async fn test_panicking_initializer_is_captured() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("ok", Tracked::handle("ok", &log), &[])
            .unwrap();
        registry
            .register_singleton("boom", Arc::new(Panics), &["ok"])
            .unwrap();

        let err = registry.initialize_all().await.unwrap_err();
        assert!(err.to_string().contains("bad wiring"));
        assert_eq!(entries(&log), vec!["init:ok", "shutdown:ok"]);
    }

    #[tokio::test]
    async fn test_factory_construction_failure_triggers_rollback() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("config", Tracked::handle("config", &log), &[])
            .unwrap();
        registry
            .register_factory(
                "client",
                |_| Err(CorewireError::Service("no credentials".into())),
                &["config"],
            )
            .unwrap();

        let err = registry.initialize_all().await.unwrap_err();
        assert!(err.to_string().contains("no credentials"));
        assert_eq!(entries(&log), vec!["init:config", "shutdown:config"]);
    }

    #[tokio::test]
    async fn test_shutdown_all_reverse_order() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("config", Tracked::handle("config", &log), &[])
            .unwrap();
        registry
            .register_singleton("logger", Tracked::handle("logger", &log), &["config"])
            .unwrap();
        registry
            .register_singleton("database", Tracked::handle("database", &log), &["logger"])
            .unwrap();
        registry.initialize_all().await.unwrap();
        log.lock().clear();

        let report = registry.shutdown_all().await;
        assert!(report.is_clean());
        assert_eq!(report.stopped, vec!["database", "logger", "config"]);
        assert_eq!(
            entries(&log),
            vec!["shutdown:database", "shutdown:logger", "shutdown:config"]
        );
        assert_eq!(
            registry.get_service_info("config").unwrap().state,
            LifecycleState::Shutdown
        );
    }

    #[tokio::test]
    async fn test_shutdown_tolerates_failures() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("a", Tracked::handle("a", &log), &[])
            .unwrap();
        registry
            .register_singleton("b", Tracked::failing_shutdown("b", &log), &[])
            .unwrap();
        registry
            .register_singleton("c", Tracked::handle("c", &log), &[])
            .unwrap();
        registry.initialize_all().await.unwrap();

        let report = registry.shutdown_all().await;
        assert_eq!(report.stopped, vec!["c", "a"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        let b = registry.get_service_info("b").unwrap();
        assert_eq!(b.state, LifecycleState::Failed);
        assert!(b.error_message.unwrap().contains("stuck"));
    }

    #[tokio::test]
    async fn test_shutdown_ignores_uninitialized() {
        let log = journal();
        let registry = ServiceRegistry::new();
        registry
            .register_singleton("idle", Tracked::handle("idle", &log), &[])
            .unwrap();
        let report = registry.shutdown_all().await;
        assert!(report.stopped.is_empty());
        assert!(entries(&log).is_empty());
    }
}
