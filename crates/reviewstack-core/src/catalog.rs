//! ResourceCatalog: the set of resources declared during one synthesis pass.
//!
//! Declaration order is checked: a resource may only depend on resources
//! that were declared before it. Components are therefore instantiated
//! leaf-first and a violation surfaces as `UnsatisfiedDependency`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DeclareError, DeclareResult};
use crate::layers::ResourceSpec;
use crate::types::{ResourceHandle, ResourceId, ResourceKind};

/// A declared resource: its handle, typed properties and direct dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub handle: ResourceHandle,
    pub spec: ResourceSpec,
    pub depends_on: BTreeSet<ResourceId>,
}

impl ResourceDescriptor {
    pub fn new(handle: ResourceHandle, spec: ResourceSpec) -> Self {
        Self {
            handle,
            spec,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn depends_on(mut self, id: &ResourceId) -> Self {
        self.depends_on.insert(id.clone());
        self
    }

    pub fn id(&self) -> &ResourceId {
        &self.handle.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.handle.kind
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceCatalog {
    resources: BTreeMap<ResourceId, ResourceDescriptor>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource. Every dependency must already be present.
    pub fn declare(&mut self, descriptor: ResourceDescriptor) -> DeclareResult<ResourceHandle> {
        let id = descriptor.id().clone();
        if self.resources.contains_key(&id) {
            return Err(DeclareError::DuplicateResource(id));
        }
        if let Some(missing) = descriptor
            .depends_on
            .iter()
            .find(|dep| !self.resources.contains_key(*dep))
        {
            return Err(DeclareError::UnsatisfiedDependency {
                resource: id,
                missing: missing.clone(),
            });
        }
        debug!(
            resource = %id,
            kind = ?descriptor.kind(),
            name = %descriptor.handle.name,
            "resource declared"
        );
        let handle = descriptor.handle.clone();
        self.resources.insert(id, descriptor);
        Ok(handle)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceDescriptor> {
        self.resources.get(id)
    }

    pub fn handle(&self, id: &ResourceId) -> DeclareResult<&ResourceHandle> {
        self.resources
            .get(id)
            .map(|d| &d.handle)
            .ok_or_else(|| DeclareError::UnknownResource(id.clone()))
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
