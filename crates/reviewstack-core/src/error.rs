//! Error types for configuration and resource declaration.

use thiserror::Error;

use crate::types::ResourceId;

/// Errors raised while loading or validating deployment parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "invalid project name {0:?}: use only English letters, numbers, hyphens and underscores"
    )]
    InvalidProjectName(String),

    #[error("invalid name pattern: {0}")]
    Pattern(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Result type alias for catalog operations.
pub type DeclareResult<T> = Result<T, DeclareError>;

/// Errors raised while declaring resources into a catalog.
#[derive(Debug, Error)]
pub enum DeclareError {
    #[error("resource {0} declared twice")]
    DuplicateResource(ResourceId),

    #[error("resource {resource} depends on {missing}, which is not declared yet")]
    UnsatisfiedDependency {
        resource: ResourceId,
        missing: ResourceId,
    },

    #[error("resource {0} is not declared")]
    UnknownResource(ResourceId),

    #[error("invalid setting on {resource}: {reason}")]
    InvalidSetting { resource: ResourceId, reason: String },
}
