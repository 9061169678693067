//! reviewstack-core: resource descriptors, deployment parameters and the
//! self-contained component declarations of the review pipeline.
//!
//! # Components
//!
//! - **`config`**: `reviewstack.toml` deployment parameters
//! - **`types`**: identifiers, naming prefix, placement, resource handles
//! - **`catalog`**: ordered resource catalog for one synthesis pass
//! - **`layers`**: storage, queue, notification, object store, compute, gateway

pub mod catalog;
pub mod config;
pub mod error;
pub mod layers;
pub mod types;

pub use catalog::{ResourceCatalog, ResourceDescriptor};
pub use config::DeploymentParameters;
pub use error::{ConfigError, DeclareError, DeclareResult};
pub use types::*;
