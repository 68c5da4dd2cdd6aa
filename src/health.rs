//! Health aggregation for Corewire.
//!
//! Polls the `health_check` hook of every initialized service. Each probe runs
//! on its own task under a per-check timeout, so a hanging or panicking check
//! is reported unhealthy without affecting the others. Probes fan out
//! concurrently, bounded by [`HealthConfig::max_concurrent`](crate::config::HealthConfig).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::registry::{LifecycleState, ServiceRecord, ServiceRegistry};

// ============================================================================
// HealthSummary
// ============================================================================

/// Aggregated result of [`ServiceRegistry::health_summary`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSummary {
    /// Service name to health, for every initialized service.
    pub checks: BTreeMap<String, bool>,
}

impl HealthSummary {
    /// `true` when every checked service is healthy. An empty summary is healthy.
    pub fn is_healthy(&self) -> bool {
        self.checks.values().all(|healthy| *healthy)
    }

    /// Names of unhealthy services, sorted.
    pub fn unhealthy(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, healthy)| !**healthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

// ============================================================================
// Registry health API
// ============================================================================

impl ServiceRegistry {
    /// Health of a single service.
    ///
    /// Unknown and not-yet-initialized services report `false`.
    pub async fn health_check(&self, name: &str) -> bool {
        let Some(record) = self.record(name) else {
            debug!(service = name, "Health check for unregistered service");
            return false;
        };
        if record.state() != LifecycleState::Initialized {
            debug!(service = name, state = %record.state(), "Health check skipped: not initialized");
            return false;
        }
        probe(record, self.health_config().timeout()).await
    }

    /// Health of every initialized service, checked concurrently.
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let records: Vec<Arc<ServiceRecord>> = self
            .records_in_order()
            .into_iter()
            .filter(|r| r.state() == LifecycleState::Initialized)
            .collect();

        let timeout = self.health_config().timeout();
        // Zero permits would block every probe forever.
        let permits = self.health_config().max_concurrent.max(1);
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut set = JoinSet::new();
        for record in records {
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let healthy = probe(record.clone(), timeout).await;
                (record.name().to_string(), healthy)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, healthy)) => {
                    results.insert(name, healthy);
                }
                Err(e) => warn!(error = %e, "Health probe task failed"),
            }
        }
        results
    }

    /// [`health_check_all`](Self::health_check_all) wrapped in a [`HealthSummary`].
    pub async fn health_summary(&self) -> HealthSummary {
        HealthSummary {
            checks: self.health_check_all().await,
        }
    }
}

/// Run one service's health hook with a deadline and record the outcome.
async fn probe(record: Arc<ServiceRecord>, timeout: Duration) -> bool {
    let Some(instance) = record.managed() else {
        record.set_health(false, None);
        return false;
    };

    let mut handle = tokio::spawn(async move { instance.health_check().await });
    let (healthy, problem) = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(healthy))) => (healthy, None),
        Ok(Ok(Err(e))) => (false, Some(format!("health check failed: {}", e))),
        Ok(Err(join)) => (false, Some(format!("health check panicked: {}", join))),
        Err(_) => {
            handle.abort();
            (
                false,
                Some(format!("health check timed out after {}ms", timeout.as_millis())),
            )
        }
    };

    match &problem {
        Some(message) => warn!(service = record.name(), error = %message, "Service unhealthy"),
        None if !healthy => warn!(service = record.name(), "Service reported unhealthy"),
        None => debug!(service = record.name(), "Service healthy"),
    }
    record.set_health(healthy, problem);
    healthy
}
