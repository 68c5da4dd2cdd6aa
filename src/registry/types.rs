//! Registry core types: service kinds, lifecycle states, and info snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a service record produces its instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// A pre-built instance supplied at registration.
    Singleton,
    /// A constructor invoked on every resolution (unless registered as cached).
    Factory,
    /// A `ServiceClass` type constructed once, on first resolution.
    Class,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Singleton => "singleton",
            ServiceKind::Factory => "factory",
            ServiceKind::Class => "class",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record lifecycle state machine.
///
/// ```text
/// REGISTERED -> INITIALIZING -> INITIALIZED -> SHUTDOWN
///      \              \              \
///       +--------------+--------------+--> FAILED
/// ```
///
/// `FAILED` and `SHUTDOWN` are terminal until the name is registered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Registered,
    Initializing,
    Initialized,
    Failed,
    Shutdown,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Registered => "REGISTERED",
            LifecycleState::Initializing => "INITIALIZING",
            LifecycleState::Initialized => "INITIALIZED",
            LifecycleState::Failed => "FAILED",
            LifecycleState::Shutdown => "SHUTDOWN",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Failed | LifecycleState::Shutdown)
    }

    /// Whether `self -> next` is a legal edge of the state machine.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Registered, Initializing)
                | (Initializing, Initialized)
                | (Initialized, Shutdown)
                | (Registered, Failed)
                | (Initializing, Failed)
                | (Initialized, Failed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable snapshot of a service record, returned by `get_service_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub kind: ServiceKind,
    pub dependencies: Vec<String>,
    pub state: LifecycleState,
    pub error_message: Option<String>,
    pub health_status: Option<bool>,
    /// Whether a shared instance exists (always true for singletons).
    pub instantiated: bool,
    pub registered_at: DateTime<Utc>,
    pub initialized_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Registered.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Initialized));
        assert!(Initialized.can_transition_to(Shutdown));
    }

    #[test]
    fn test_failure_transitions() {
        assert!(Registered.can_transition_to(Failed));
        assert!(Initializing.can_transition_to(Failed));
        assert!(Initialized.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in [Registered, Initializing, Initialized, Failed, Shutdown] {
            assert!(!Failed.can_transition_to(next));
            assert!(!Shutdown.can_transition_to(next));
        }
        assert!(Failed.is_terminal());
        assert!(Shutdown.is_terminal());
        assert!(!Initialized.is_terminal());
    }

    #[test]
    fn test_no_skipping_initializing() {
        assert!(!Registered.can_transition_to(Initialized));
        assert!(!Registered.can_transition_to(Shutdown));
        assert!(!Initializing.can_transition_to(Shutdown));
    }

    #[test]
    fn test_state_serializes_screaming_case() {
        let json = serde_json::to_string(&Initialized).unwrap();
        assert_eq!(json, "\"INITIALIZED\"");
        assert_eq!(Initialized.to_string(), "INITIALIZED");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ServiceKind::Singleton.to_string(), "singleton");
        assert_eq!(ServiceKind::Factory.to_string(), "factory");
        assert_eq!(ServiceKind::Class.to_string(), "class");
    }
}
