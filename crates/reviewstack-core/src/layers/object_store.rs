//! ObjectStore: report bucket plus its access-log bucket.

use serde::{Deserialize, Serialize};

use crate::catalog::{ResourceCatalog, ResourceDescriptor};
use crate::error::DeclareResult;
use crate::layers::ResourceSpec;
use crate::types::{Placement, Prefix, ResourceHandle, ResourceId, ResourceKind};

pub const ACCESS_LOG_PREFIX: &str = "logs/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketEncryption {
    S3Managed,
}

/// Where a bucket ships its server access logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogTarget {
    pub bucket: ResourceId,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub bucket_name: String,
    pub encryption: BucketEncryption,
    pub block_public_access: bool,
    pub enforce_ssl: bool,
    pub versioned: bool,
    pub access_logs: Option<AccessLogTarget>,
}

impl BucketSpec {
    fn private(bucket_name: String) -> Self {
        Self {
            bucket_name,
            encryption: BucketEncryption::S3Managed,
            block_public_access: true,
            enforce_ssl: true,
            versioned: true,
            access_logs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStore {
    pub report_bucket: ResourceHandle,
    pub access_log_bucket: ResourceHandle,
}

impl ObjectStore {
    /// Bucket names embed account and region, so they are globally unique
    /// per deployment target.
    pub fn declare(
        prefix: &Prefix,
        placement: &Placement,
        catalog: &mut ResourceCatalog,
    ) -> DeclareResult<Self> {
        let log_name = prefix.name(&format!("logs-{}-{}", placement.account, placement.region));
        let log_handle = ResourceHandle {
            id: ResourceId::new("AccessLogsBucket"),
            kind: ResourceKind::Bucket,
            arn: placement.global_arn("s3", &log_name),
            name: log_name.clone(),
        };
        let access_log_bucket = catalog.declare(ResourceDescriptor::new(
            log_handle,
            ResourceSpec::Bucket(BucketSpec::private(log_name)),
        ))?;

        let report_name = prefix.name(&format!("report-{}-{}", placement.account, placement.region));
        let report_handle = ResourceHandle {
            id: ResourceId::new("ReportBucket"),
            kind: ResourceKind::Bucket,
            arn: placement.global_arn("s3", &report_name),
            name: report_name.clone(),
        };
        let report_spec = BucketSpec {
            access_logs: Some(AccessLogTarget {
                bucket: access_log_bucket.id.clone(),
                prefix: ACCESS_LOG_PREFIX.to_string(),
            }),
            ..BucketSpec::private(report_name)
        };
        let report_bucket = catalog.declare(
            ResourceDescriptor::new(report_handle, ResourceSpec::Bucket(report_spec))
                .depends_on(&access_log_bucket.id),
        )?;

        Ok(Self {
            report_bucket,
            access_log_bucket,
        })
    }
}
