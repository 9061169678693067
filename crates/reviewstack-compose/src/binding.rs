//! Event source bindings: which queue or topic triggers which unit.

use serde::{Deserialize, Serialize};

use reviewstack_core::{ResourceHandle, ResourceId, ResourceKind};

use crate::error::{ComposeError, ComposeResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSourceBinding {
    pub producer: ResourceId,
    pub producer_kind: ResourceKind,
    pub producer_arn: String,
    pub consumer: ResourceId,
}

impl EventSourceBinding {
    /// Logical id of the mapping/subscription resource this binding creates.
    pub fn node_id(&self) -> ResourceId {
        ResourceId::new(format!("{}{}EventSource", self.consumer, self.producer))
    }
}

/// At most one binding per (producer, consumer) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingSet {
    bindings: Vec<EventSourceBinding>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &mut self,
        producer: &ResourceHandle,
        consumer: &ResourceId,
    ) -> ComposeResult<&EventSourceBinding> {
        if !producer.kind.is_event_source() {
            return Err(ComposeError::InvalidEventSource {
                producer: producer.id.clone(),
                kind: producer.kind,
            });
        }
        if self.is_bound(&producer.id, consumer) {
            return Err(ComposeError::DuplicateBinding {
                producer: producer.id.clone(),
                consumer: consumer.clone(),
            });
        }
        self.bindings.push(EventSourceBinding {
            producer: producer.id.clone(),
            producer_kind: producer.kind,
            producer_arn: producer.arn.clone(),
            consumer: consumer.clone(),
        });
        let index = self.bindings.len() - 1;
        Ok(&self.bindings[index])
    }

    pub fn is_bound(&self, producer: &ResourceId, consumer: &ResourceId) -> bool {
        self.bindings
            .iter()
            .any(|b| &b.producer == producer && &b.consumer == consumer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventSourceBinding> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
