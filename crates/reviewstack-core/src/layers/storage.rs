//! StorageLayer: the four keyed, versioned datasets.

use serde::{Deserialize, Serialize};

use crate::catalog::{ResourceCatalog, ResourceDescriptor};
use crate::error::DeclareResult;
use crate::layers::ResourceSpec;
use crate::types::{Placement, Prefix, ResourceHandle, ResourceId, ResourceKind};

/// The datasets owned by the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Registered repositories and the branch patterns to review.
    Repository,
    /// Incoming review requests.
    Request,
    /// Per-task state of a request.
    Task,
    /// Review rule definitions.
    Rule,
}

impl Dataset {
    pub fn logical_id(&self) -> ResourceId {
        ResourceId::new(match self {
            Dataset::Repository => "RepositoryTable",
            Dataset::Request => "RequestTable",
            Dataset::Task => "TaskTable",
            Dataset::Rule => "RuleTable",
        })
    }

    /// Table name suffix appended to the deployment prefix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Dataset::Repository => "repository",
            Dataset::Request => "request",
            Dataset::Task => "task",
            Dataset::Rule => "rule",
        }
    }

    pub fn partition_key(&self) -> KeyAttribute {
        match self {
            Dataset::Repository => KeyAttribute::string("repository_url"),
            Dataset::Request => KeyAttribute::string("commit_id"),
            Dataset::Task => KeyAttribute::string("request_id"),
            Dataset::Rule => KeyAttribute::string("mode"),
        }
    }

    pub fn sort_key(&self) -> KeyAttribute {
        match self {
            Dataset::Repository => KeyAttribute::string("branch_regexp"),
            Dataset::Request => KeyAttribute::string("request_id"),
            Dataset::Task | Dataset::Rule => KeyAttribute::number("number"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    #[serde(rename = "S")]
    String,
    #[serde(rename = "N")]
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl KeyAttribute {
    fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attribute_type: AttributeType::String,
        }
    }

    fn number(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attribute_type: AttributeType::Number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    PayPerRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableEncryption {
    AwsManaged,
}

/// What a change-stream record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamViewType {
    NewImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub table_name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: KeyAttribute,
    pub billing_mode: BillingMode,
    pub encryption: TableEncryption,
    pub stream: StreamViewType,
    pub point_in_time_recovery: bool,
}

/// Handles for the four datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayer {
    pub repository: ResourceHandle,
    pub request: ResourceHandle,
    pub task: ResourceHandle,
    pub rule: ResourceHandle,
}

impl StorageLayer {
    pub fn declare(
        prefix: &Prefix,
        placement: &Placement,
        catalog: &mut ResourceCatalog,
    ) -> DeclareResult<Self> {
        let mut declare = |dataset: Dataset| {
            let table_name = prefix.name(dataset.suffix());
            let handle = ResourceHandle {
                id: dataset.logical_id(),
                kind: ResourceKind::Table,
                arn: placement.arn("dynamodb", &format!("table/{table_name}")),
                name: table_name.clone(),
            };
            let spec = TableSpec {
                table_name,
                partition_key: dataset.partition_key(),
                sort_key: dataset.sort_key(),
                billing_mode: BillingMode::PayPerRequest,
                encryption: TableEncryption::AwsManaged,
                stream: StreamViewType::NewImage,
                point_in_time_recovery: true,
            };
            catalog.declare(ResourceDescriptor::new(handle, ResourceSpec::Table(spec)))
        };

        Ok(Self {
            repository: declare(Dataset::Repository)?,
            request: declare(Dataset::Request)?,
            task: declare(Dataset::Task)?,
            rule: declare(Dataset::Rule)?,
        })
    }

    pub fn table(&self, dataset: Dataset) -> &ResourceHandle {
        match dataset {
            Dataset::Repository => &self.repository,
            Dataset::Request => &self.request,
            Dataset::Task => &self.task,
            Dataset::Rule => &self.rule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> (StorageLayer, ResourceCatalog) {
        let mut catalog = ResourceCatalog::new();
        let prefix = Prefix::parse("acme").unwrap();
        let storage = StorageLayer::declare(&prefix, &Placement::default(), &mut catalog).unwrap();
        (storage, catalog)
    }

    #[test]
    fn table_names_are_prefixed() {
        let (storage, _) = declared();
        assert_eq!(storage.repository.name, "acme-repository");
        assert_eq!(storage.request.name, "acme-request");
        assert_eq!(storage.task.name, "acme-task");
        assert_eq!(storage.rule.name, "acme-rule");
    }

    #[test]
    fn tables_are_versioned_and_streamed() {
        let (_, catalog) = declared();
        assert_eq!(catalog.len(), 4);
        for descriptor in catalog.iter() {
            match &descriptor.spec {
                ResourceSpec::Table(spec) => {
                    assert!(spec.point_in_time_recovery);
                    assert_eq!(spec.stream, StreamViewType::NewImage);
                }
                other => panic!("unexpected spec {other:?}"),
            }
        }
    }

    #[test]
    fn key_schemas_match_records() {
        assert_eq!(Dataset::Request.partition_key().name, "commit_id");
        assert_eq!(Dataset::Request.sort_key().name, "request_id");
        assert_eq!(Dataset::Task.sort_key().attribute_type, AttributeType::Number);
        assert_eq!(Dataset::Rule.partition_key().name, "mode");
    }

    #[test]
    fn table_arn_includes_name() {
        let (storage, _) = declared();
        assert!(storage.table(Dataset::Rule).arn.ends_with(":table/acme-rule"));
    }
}
