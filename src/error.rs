//! Error types for Corewire
//!
//! This module defines all error types used throughout the registry, resolver,
//! lifecycle manager, import manager, and dependency validator.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

use crate::imports::ImportFailure;
use crate::registry::LifecycleState;
use crate::validator::VersionConflict;

/// The primary error type for Corewire operations.
#[derive(Error, Debug)]
pub enum CorewireError {
    /// Lookup of a name that was never registered.
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// A registration collided with a live record of the same name.
    #[error("Service already registered: {0}")]
    DuplicateService(String),

    /// The dependency graph contains a cycle. `path` starts and ends on the same service.
    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    /// A declared dependency is not registered.
    #[error("Missing dependency: service '{service}' depends on '{dependency}', which is not registered")]
    MissingDependency { service: String, dependency: String },

    /// A service failed to initialize. Raised after rollback has completed.
    #[error("Failed to initialize service '{service}': {source}")]
    ServiceInitialization {
        service: String,
        #[source]
        source: Box<CorewireError>,
    },

    /// A consumer required a service that is missing or unusable.
    #[error("Service '{service}' is required by {context}: {reason}")]
    ServiceRequired {
        service: String,
        context: String,
        reason: String,
    },

    /// A service resolved, but not to the requested concrete type.
    #[error("Service '{service}' is not of type {expected}")]
    TypeMismatch {
        service: String,
        expected: &'static str,
    },

    /// A factory or class constructor failed.
    #[error("Failed to construct service '{service}': {message}")]
    Construction { service: String, message: String },

    /// Illegal lifecycle state transition.
    #[error("Invalid lifecycle transition for '{service}': {from} -> {to}")]
    InvalidTransition {
        service: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    /// A service is in a state that forbids the requested operation.
    #[error("Service '{service}' is {state} and must be re-registered first")]
    InvalidState {
        service: String,
        state: LifecycleState,
    },

    /// Error raised by a service's own lifecycle or health hook.
    #[error("Service error: {0}")]
    Service(String),

    /// Dynamic import failure.
    #[error("Import failed: {0}")]
    Import(#[from] ImportFailure),

    /// An installed dependency does not satisfy its manifest constraint.
    #[error("Version conflict: {0}")]
    VersionConflict(#[from] VersionConflict),

    /// Required manifest dependencies are not installed.
    #[error("Missing required dependencies: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    /// Dependency manifest could not be read or parsed.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CorewireError {
    /// Returns `true` for errors produced by dependency graph analysis.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            CorewireError::CircularDependency { .. } | CorewireError::MissingDependency { .. }
        )
    }
}

/// A specialized `Result` type for Corewire operations.
pub type Result<T> = std::result::Result<T, CorewireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CorewireError::ServiceNotFound("database".to_string());
        assert_eq!(err.to_string(), "Service not found: database");
    }

    #[test]
    fn test_circular_dependency_display_joins_path() {
        let err = CorewireError::CircularDependency {
            path: vec!["a".into(), "b".into(), "c".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> c -> a");
    }

    #[test]
    fn test_service_required_includes_context() {
        let err = CorewireError::ServiceRequired {
            service: "llm".into(),
            context: "report exporter".into(),
            reason: "not registered".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("llm"));
        assert!(msg.contains("report exporter"));
    }

    #[test]
    fn test_initialization_error_keeps_source() {
        let err = CorewireError::ServiceInitialization {
            service: "db".into(),
            source: Box::new(CorewireError::Service("connection refused".into())),
        };
        assert!(err.to_string().contains("connection refused"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Service error: connection refused");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CorewireError = io_err.into();
        assert!(matches!(err, CorewireError::Io(_)));
    }

    #[test]
    fn test_is_graph_error() {
        assert!(CorewireError::MissingDependency {
            service: "a".into(),
            dependency: "b".into()
        }
        .is_graph_error());
        assert!(!CorewireError::ServiceNotFound("a".into()).is_graph_error());
    }

    #[test]
    fn test_missing_required_display() {
        let err = CorewireError::MissingRequired(vec!["git".into(), "curl".into()]);
        assert_eq!(err.to_string(), "Missing required dependencies: git, curl");
    }
}
