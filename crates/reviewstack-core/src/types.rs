//! Shared types used across reviewstack crates.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Logical identifier of a declared resource, unique within one topology.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Kind of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    Queue,
    Topic,
    Bucket,
    Function,
    LayerBundle,
    RestApi,
    ApiKey,
    UsagePlan,
    CustomResource,
    /// A managed service reached by name only (e.g. the model endpoint).
    External,
}

impl ResourceKind {
    /// Service namespace used in ARNs and IAM actions.
    pub fn service(&self) -> &'static str {
        match self {
            ResourceKind::Table => "dynamodb",
            ResourceKind::Queue => "sqs",
            ResourceKind::Topic => "sns",
            ResourceKind::Bucket => "s3",
            ResourceKind::Function | ResourceKind::LayerBundle => "lambda",
            ResourceKind::RestApi | ResourceKind::ApiKey | ResourceKind::UsagePlan => "apigateway",
            ResourceKind::CustomResource => "cloudformation",
            ResourceKind::External => "external",
        }
    }

    /// Whether resources of this kind can trigger a compute unit.
    pub fn is_event_source(&self) -> bool {
        matches!(self, ResourceKind::Queue | ResourceKind::Topic)
    }
}

static PREFIX_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$"));

/// Naming prefix applied to every physical resource name.
///
/// Only ASCII letters, digits, `-` and `_` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Prefix(String);

impl Prefix {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let pattern = PREFIX_PATTERN
            .as_ref()
            .map_err(|e| ConfigError::Pattern(e.to_string()))?;
        if pattern.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ConfigError::InvalidProjectName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Physical name for a resource: `{prefix}-{suffix}`.
    pub fn name(&self, suffix: &str) -> String {
        format!("{}-{}", self.0, suffix)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Prefix {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Prefix::parse(&value)
    }
}

impl From<Prefix> for String {
    fn from(value: Prefix) -> Self {
        value.0
    }
}

/// Account and region a topology is synthesized into.
///
/// When either is unknown at synthesis time a deploy-time placeholder is
/// used, so names and ARNs stay stable across synth runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub account: String,
    pub region: String,
}

pub const ACCOUNT_PLACEHOLDER: &str = "${AWS::AccountId}";
pub const REGION_PLACEHOLDER: &str = "${AWS::Region}";

impl Placement {
    pub fn new(account: Option<&str>, region: Option<&str>) -> Self {
        Self {
            account: account.unwrap_or(ACCOUNT_PLACEHOLDER).to_string(),
            region: region.unwrap_or(REGION_PLACEHOLDER).to_string(),
        }
    }

    /// Regional ARN: `arn:aws:{service}:{region}:{account}:{resource}`.
    pub fn arn(&self, service: &str, resource: &str) -> String {
        format!(
            "arn:aws:{}:{}:{}:{}",
            service, self.region, self.account, resource
        )
    }

    /// Global ARN without region/account (object storage).
    pub fn global_arn(&self, service: &str, resource: &str) -> String {
        format!("arn:aws:{}:::{}", service, resource)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Immutable handle a component exposes for one of its resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub id: ResourceId,
    pub kind: ResourceKind,
    /// Physical name (table name, queue name, function name, ...).
    pub name: String,
    pub arn: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_accepts_project_names() {
        let prefix = Prefix::parse("aws-code_reviewer2").unwrap();
        assert_eq!(prefix.name("request"), "aws-code_reviewer2-request");
    }

    #[test]
    fn prefix_rejects_spaces_and_dots() {
        assert!(Prefix::parse("my project").is_err());
        assert!(Prefix::parse("a.b").is_err());
        assert!(Prefix::parse("").is_err());
    }

    #[test]
    fn prefix_deserializes_with_validation() {
        let ok: Prefix = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(ok.as_str(), "acme");
        assert!(serde_json::from_str::<Prefix>("\"a b\"").is_err());
    }

    #[test]
    fn prefix_pattern_is_shared_across_parses() {
        assert!(PREFIX_PATTERN.as_ref().is_ok());
        let first = PREFIX_PATTERN.as_ref().map(|p| p as *const Regex).unwrap();
        for name in ["acme", "beta", "gamma-1"] {
            assert!(Prefix::parse(name).is_ok());
        }
        let second = PREFIX_PATTERN.as_ref().map(|p| p as *const Regex).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn placement_uses_placeholders() {
        let placement = Placement::default();
        assert_eq!(
            placement.arn("sqs", "acme-queue"),
            "arn:aws:sqs:${AWS::Region}:${AWS::AccountId}:acme-queue"
        );
    }

    #[test]
    fn global_arn_omits_region() {
        let placement = Placement::new(Some("123456789012"), Some("eu-west-1"));
        assert_eq!(placement.global_arn("s3", "bucket"), "arn:aws:s3:::bucket");
    }

    #[test]
    fn only_queues_and_topics_are_event_sources() {
        assert!(ResourceKind::Queue.is_event_source());
        assert!(ResourceKind::Topic.is_event_source());
        assert!(!ResourceKind::Table.is_event_source());
    }
}
