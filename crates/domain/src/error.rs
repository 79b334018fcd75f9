//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`RoomHubError`] via `#[from]`. No variant carries a free-form
//! `String` as its only payload.

/// Top-level error crossing layer boundaries.
#[derive(Debug, thiserror::Error)]
pub enum RoomHubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("invalid workflow graph")]
    Graph(#[from] GraphError),

    #[error("device adapter error")]
    Adapter(#[from] AdapterError),

    #[error("configuration error")]
    Configuration(#[from] ConfigurationError),

    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("duplicate node id {0}")]
    DuplicateNodeId(String),

    #[error("intensity {0} is outside 0..=100")]
    IntensityOutOfRange(u8),

    #[error("level {0} is outside 0..=100")]
    LevelOutOfRange(u8),

    #[error("window duration of {0} minutes must be shorter than a day")]
    WindowTooLong(u32),

    #[error("sunrise and sunset windows overlap")]
    OverlappingWindows,

    #[error("timer interval must be positive")]
    ZeroInterval,

    #[error("{0}s exceeds the longest supported interval")]
    IntervalTooLong(u64),

    #[error("invalid cron expression `{expression}`: {reason}")]
    InvalidCron {
        expression: String,
        reason: &'static str,
    },

    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),
}

/// A lookup that found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Structural problems in a workflow graph.
///
/// These are fatal for the execution that discovers them and never for
/// the dispatcher or other workflows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("cycle detected at node {node_id}")]
    CycleDetected { node_id: String },

    #[error("edge {edge_id} references missing node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("edge {edge_id} carries a branch tag but does not leave a condition node")]
    UnreachableBranch { edge_id: String },

    #[error("node {node_id} is not a trigger of this workflow")]
    UnknownTrigger { node_id: String },
}

impl GraphError {
    /// Stable snake-case reason code, used in outcome reports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CycleDetected { .. } => "cycle_detected",
            Self::DanglingEdge { .. } => "dangling_edge",
            Self::UnreachableBranch { .. } => "unreachable_branch",
            Self::UnknownTrigger { .. } => "unknown_trigger",
        }
    }
}

/// Failures reported by a brand-specific device adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("controller unreachable: {0}")]
    Unreachable(String),

    #[error("adapter call timed out")]
    Timeout,

    #[error("capability not supported: {0}")]
    UnsupportedCapability(String),

    #[error("invalid port {0}")]
    InvalidPort(u8),
}

impl AdapterError {
    /// Whether the failure is transient and the call may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout)
    }

    /// Stable snake-case kind, used in outcome reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthFailed(_) => "auth_failed",
            Self::Unreachable(_) => "unreachable",
            Self::Timeout => "timeout",
            Self::UnsupportedCapability(_) => "unsupported_capability",
            Self::InvalidPort(_) => "invalid_port",
        }
    }
}

/// Wiring mistakes that are not runtime faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no adapter registered for brand `{0}`")]
    UnknownBrand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_treat_unreachable_and_timeout_as_retryable() {
        assert!(AdapterError::Unreachable("down".to_string()).is_retryable());
        assert!(AdapterError::Timeout.is_retryable());
    }

    #[test]
    fn should_treat_auth_capability_and_port_errors_as_terminal() {
        assert!(!AdapterError::AuthFailed("bad token".to_string()).is_retryable());
        assert!(!AdapterError::UnsupportedCapability("dimming".to_string()).is_retryable());
        assert!(!AdapterError::InvalidPort(9).is_retryable());
    }

    #[test]
    fn should_expose_snake_case_codes() {
        assert_eq!(AdapterError::Timeout.kind(), "timeout");
        let err = GraphError::CycleDetected {
            node_id: "n1".to_string(),
        };
        assert_eq!(err.code(), "cycle_detected");
    }

    #[test]
    fn should_convert_graph_error_into_top_level_error() {
        let err: RoomHubError = GraphError::UnknownTrigger {
            node_id: "t9".to_string(),
        }
        .into();
        assert!(matches!(err, RoomHubError::Graph(_)));
    }

    #[test]
    fn should_display_not_found_error() {
        let err = NotFoundError {
            entity: "Workflow",
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Workflow abc not found");
    }
}
