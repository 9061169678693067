//! Error types for topology composition and deployment transitions.

use thiserror::Error;

use reviewstack_core::layers::UnitRole;
use reviewstack_core::{DeclareError, ResourceId, ResourceKind};

use crate::action::Action;

/// Result type alias for composition operations.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// Errors that abort a synthesis pass or a deployment transition.
///
/// None of these are retried: a structurally invalid graph cannot succeed
/// on a second attempt.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// A resource was instantiated before one of its inputs, or the final
    /// graph contains a cycle. Indicates a bug in the composition order.
    #[error("dependency cycle: {}", render_path(.path))]
    DependencyCycle { path: Vec<ResourceId> },

    #[error("{unit}: config key {key} already set to {existing:?}, refusing {attempted:?}")]
    DuplicateConfigKey {
        unit: UnitRole,
        key: String,
        existing: String,
        attempted: String,
    },

    #[error("{unit}: config key {key} is not part of the unit's contract")]
    UnknownConfigKey { unit: UnitRole, key: String },

    #[error("{unit}: config key {key} was never injected")]
    MissingConfigKey { unit: UnitRole, key: String },

    #[error("{unit}: config key {key} references {source_id} without a grant")]
    UngrantedConfigReference {
        unit: UnitRole,
        key: String,
        source_id: ResourceId,
    },

    #[error("{producer} is already bound to {consumer}")]
    DuplicateBinding {
        producer: ResourceId,
        consumer: ResourceId,
    },

    #[error("{producer} ({kind:?}) cannot trigger a compute unit")]
    InvalidEventSource {
        producer: ResourceId,
        kind: ResourceKind,
    },

    #[error(
        "queue {queue} hides messages for {visibility_secs}s but {consumer} may run for {timeout_secs}s"
    )]
    VisibilityWindowTooShort {
        queue: ResourceId,
        consumer: ResourceId,
        visibility_secs: u64,
        timeout_secs: u64,
    },

    #[error("action {action:?} does not apply to {resource} ({kind:?})")]
    IncompatibleAction {
        action: Action,
        resource: ResourceId,
        kind: ResourceKind,
    },

    #[error("initializer invocation {physical_id} failed: {reason}")]
    InitializerInvocation { physical_id: String, reason: String },

    #[error("initializer run already left Idle (phase {phase})")]
    InitializerNotIdle { phase: String },

    #[error("invalid gateway configuration: {0}")]
    Gateway(String),

    #[error("topology JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Declare(DeclareError),
}

impl From<DeclareError> for ComposeError {
    fn from(err: DeclareError) -> Self {
        match err {
            DeclareError::UnsatisfiedDependency { resource, missing } => {
                ComposeError::DependencyCycle {
                    path: vec![resource, missing],
                }
            }
            DeclareError::InvalidSetting { resource, reason } => {
                ComposeError::Gateway(format!("{resource}: {reason}"))
            }
            other => ComposeError::Declare(other),
        }
    }
}

fn render_path(path: &[ResourceId]) -> String {
    path.iter()
        .map(ResourceId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
