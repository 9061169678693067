//! Self-contained component declarations.
//!
//! Each layer declares its own resources into a `ResourceCatalog` and hands
//! back immutable handles. No layer knows about any other, except for
//! handles passed in explicitly (the gateway receives the intake handler).

pub mod compute;
pub mod custom;
pub mod gateway;
pub mod notification;
pub mod object_store;
pub mod queue;
pub mod storage;

use serde::{Deserialize, Serialize};

pub use compute::{ComputeGraph, FunctionSpec, LayerBundleSpec, UnitRole};
pub use custom::CustomResourceSpec;
pub use gateway::{ApiKeySpec, GatewayLayer, GatewaySettings, RestApiSpec, RouteSpec, Throttle, UsagePlanSpec};
pub use notification::{NotificationLayer, TopicSpec};
pub use object_store::{BucketSpec, ObjectStore};
pub use queue::{QueueLayer, QueueSpec};
pub use storage::{Dataset, StorageLayer, TableSpec};

/// Typed properties of a declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    Table(TableSpec),
    Queue(QueueSpec),
    Topic(TopicSpec),
    Bucket(BucketSpec),
    LayerBundle(LayerBundleSpec),
    Function(FunctionSpec),
    RestApi(RestApiSpec),
    ApiKey(ApiKeySpec),
    UsagePlan(UsagePlanSpec),
    CustomResource(CustomResourceSpec),
}
