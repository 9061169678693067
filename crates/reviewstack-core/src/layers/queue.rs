//! QueueLayer: the review work queue.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{ResourceCatalog, ResourceDescriptor};
use crate::error::DeclareResult;
use crate::layers::ResourceSpec;
use crate::types::{Placement, Prefix, ResourceHandle, ResourceId, ResourceKind};

/// How long a received message stays hidden from other consumers.
/// Also the implicit ceiling for one task execution attempt.
pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueEncryption {
    KmsManaged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSpec {
    pub queue_name: String,
    pub visibility_timeout_secs: u64,
    pub encryption: QueueEncryption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLayer {
    pub task_queue: ResourceHandle,
    pub url: String,
    pub visibility_timeout: Duration,
}

impl QueueLayer {
    pub fn declare(
        prefix: &Prefix,
        placement: &Placement,
        catalog: &mut ResourceCatalog,
    ) -> DeclareResult<Self> {
        let queue_name = prefix.name("queue");
        let handle = ResourceHandle {
            id: ResourceId::new("TaskQueue"),
            kind: ResourceKind::Queue,
            arn: placement.arn("sqs", &queue_name),
            name: queue_name.clone(),
        };
        let url = format!(
            "https://sqs.{}.amazonaws.com/{}/{}",
            placement.region, placement.account, queue_name
        );
        let spec = QueueSpec {
            queue_name,
            visibility_timeout_secs: VISIBILITY_TIMEOUT.as_secs(),
            encryption: QueueEncryption::KmsManaged,
        };
        let task_queue = catalog.declare(ResourceDescriptor::new(handle, ResourceSpec::Queue(spec)))?;
        Ok(Self {
            task_queue,
            url,
            visibility_timeout: VISIBILITY_TIMEOUT,
        })
    }
}
