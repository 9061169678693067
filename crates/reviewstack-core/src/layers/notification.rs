//! NotificationLayer: fan-out topic for completed reports.

use serde::{Deserialize, Serialize};

use crate::catalog::{ResourceCatalog, ResourceDescriptor};
use crate::error::DeclareResult;
use crate::layers::ResourceSpec;
use crate::types::{Placement, Prefix, ResourceHandle, ResourceId, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub topic_name: String,
    pub fifo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationLayer {
    pub report_topic: ResourceHandle,
}

impl NotificationLayer {
    pub fn declare(
        prefix: &Prefix,
        placement: &Placement,
        catalog: &mut ResourceCatalog,
    ) -> DeclareResult<Self> {
        let topic_name = prefix.name("topic");
        let handle = ResourceHandle {
            id: ResourceId::new("ReportTopic"),
            kind: ResourceKind::Topic,
            arn: placement.arn("sns", &topic_name),
            name: topic_name.clone(),
        };
        let spec = TopicSpec {
            topic_name,
            fifo: false,
        };
        let report_topic = catalog.declare(ResourceDescriptor::new(handle, ResourceSpec::Topic(spec)))?;
        Ok(Self { report_topic })
    }
}
