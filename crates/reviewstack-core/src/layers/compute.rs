//! ComputeGraph: the five compute units and their shared layer bundle.
//!
//! Units are opaque: this module only fixes their names, entry points,
//! timeouts and the configuration keys each one expects at runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{ResourceCatalog, ResourceDescriptor};
use crate::error::DeclareResult;
use crate::layers::ResourceSpec;
use crate::types::{Placement, Prefix, ResourceHandle, ResourceId, ResourceKind};

pub const RUNTIME: &str = "python3.11";
pub const CODE_ASSET: &str = "lambda";
pub const LAYER_ASSET: &str = "layer/layer.zip";

/// Runtime configuration key names, shared with the unit processes.
pub mod env_keys {
    pub const REQUEST_TABLE: &str = "REQUEST_TABLE";
    pub const REPOSITORY_TABLE: &str = "REPOSITORY_TABLE";
    pub const RULE_TABLE: &str = "RULE_TABLE";
    pub const TASK_TABLE: &str = "TASK_TABLE";
    pub const TASK_DISPATCHER_FUN_NAME: &str = "TASK_DISPATCHER_FUN_NAME";
    pub const TASK_SQS_URL: &str = "TASK_SQS_URL";
    pub const BUCKET_NAME: &str = "BUCKET_NAME";
    pub const SNS_TOPIC_ARN: &str = "SNS_TOPIC_ARN";
    pub const SQS_MAX_RETRIES: &str = "SQS_MAX_RETRIES";
    pub const SQS_BASE_DELAY: &str = "SQS_BASE_DELAY";
    pub const SQS_MAX_DELAY: &str = "SQS_MAX_DELAY";
    pub const TEMPERATURE: &str = "TEMPERATURE";
    pub const TOP_P: &str = "TOP_P";
    pub const MAX_TOKEN_TO_SAMPLE: &str = "MAX_TOKEN_TO_SAMPLE";
    pub const MAX_FAILED_TIMES: &str = "MAX_FAILED_TIMES";
    pub const REPORT_TIMEOUT_SECONDS: &str = "REPORT_TIMEOUT_SECONDS";
    pub const SMTP_SERVER: &str = "SMTP_SERVER";
    pub const SMTP_PORT: &str = "SMTP_PORT";
    pub const SMTP_USERNAME: &str = "SMTP_USERNAME";
    pub const SMTP_PASSWORD: &str = "SMTP_PASSWORD";
    pub const REPORT_SENDER: &str = "REPORT_SENDER";
    pub const REPORT_RECEIVER: &str = "REPORT_RECEIVER";
}

use env_keys::*;

/// Role of a compute unit in the review pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitRole {
    /// Receives review requests from the gateway.
    IntakeHandler,
    /// Splits a request into tasks and enqueues them.
    TaskDispatcher,
    /// Runs review tasks off the queue; requeues tasks that are not ready.
    TaskExecutor,
    /// Mails finished reports on topic notifications.
    ReportDeliverer,
    /// Seeds reference data on deployment transitions.
    DataInitializer,
}

impl UnitRole {
    pub const ALL: [UnitRole; 5] = [
        UnitRole::IntakeHandler,
        UnitRole::TaskDispatcher,
        UnitRole::TaskExecutor,
        UnitRole::ReportDeliverer,
        UnitRole::DataInitializer,
    ];

    pub fn logical_id(&self) -> ResourceId {
        ResourceId::new(match self {
            UnitRole::IntakeHandler => "RequestHandler",
            UnitRole::TaskDispatcher => "TaskDispatcher",
            UnitRole::TaskExecutor => "TaskExecutor",
            UnitRole::ReportDeliverer => "ReportReceiver",
            UnitRole::DataInitializer => "DataInitializer",
        })
    }

    pub fn function_suffix(&self) -> &'static str {
        match self {
            UnitRole::IntakeHandler => "request-handler",
            UnitRole::TaskDispatcher => "task-dispatcher",
            UnitRole::TaskExecutor => "task-executor",
            UnitRole::ReportDeliverer => "report-receiver",
            UnitRole::DataInitializer => "data-initializer",
        }
    }

    /// Entry point inside the shared code asset.
    pub fn handler(&self) -> String {
        format!("{}.lambda_handler", self.function_suffix().replace('-', "_"))
    }

    pub fn timeout(&self) -> Duration {
        match self {
            UnitRole::IntakeHandler | UnitRole::ReportDeliverer => Duration::from_secs(30),
            UnitRole::TaskDispatcher | UnitRole::TaskExecutor => Duration::from_secs(15 * 60),
            UnitRole::DataInitializer => Duration::from_secs(3),
        }
    }

    /// The fixed configuration keys this unit reads at runtime.
    pub fn config_keys(&self) -> &'static [&'static str] {
        match self {
            UnitRole::IntakeHandler => &[REQUEST_TABLE, REPOSITORY_TABLE, TASK_DISPATCHER_FUN_NAME],
            UnitRole::TaskDispatcher => &[REQUEST_TABLE, RULE_TABLE, TASK_SQS_URL],
            UnitRole::TaskExecutor => &[
                BUCKET_NAME,
                REQUEST_TABLE,
                RULE_TABLE,
                TASK_TABLE,
                TASK_SQS_URL,
                SNS_TOPIC_ARN,
                SQS_MAX_RETRIES,
                SQS_BASE_DELAY,
                SQS_MAX_DELAY,
                TEMPERATURE,
                TOP_P,
                MAX_TOKEN_TO_SAMPLE,
                MAX_FAILED_TIMES,
                REPORT_TIMEOUT_SECONDS,
            ],
            UnitRole::ReportDeliverer => &[
                SMTP_SERVER,
                SMTP_PORT,
                SMTP_USERNAME,
                SMTP_PASSWORD,
                REPORT_SENDER,
                REPORT_RECEIVER,
            ],
            UnitRole::DataInitializer => &[RULE_TABLE, REPOSITORY_TABLE],
        }
    }

    pub fn accepts_key(&self, key: &str) -> bool {
        self.config_keys().contains(&key)
    }
}

impl std::fmt::Display for UnitRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.function_suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerBundleSpec {
    pub layer_name: String,
    pub code_asset: String,
    pub compatible_runtimes: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub function_name: String,
    pub role: UnitRole,
    pub runtime: String,
    pub handler: String,
    pub code_asset: String,
    pub timeout_secs: u64,
    pub layers: Vec<ResourceId>,
}

/// Handles for the layer bundle and each compute unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeGraph {
    pub layer: ResourceHandle,
    pub intake_handler: ResourceHandle,
    pub task_dispatcher: ResourceHandle,
    pub task_executor: ResourceHandle,
    pub report_deliverer: ResourceHandle,
    pub data_initializer: ResourceHandle,
}

impl ComputeGraph {
    pub fn declare(
        prefix: &Prefix,
        placement: &Placement,
        catalog: &mut ResourceCatalog,
    ) -> DeclareResult<Self> {
        let layer_name = prefix.name("layer");
        let layer_handle = ResourceHandle {
            id: ResourceId::new("RuntimeLayer"),
            kind: ResourceKind::LayerBundle,
            arn: placement.arn("lambda", &format!("layer:{layer_name}")),
            name: layer_name.clone(),
        };
        let layer = catalog.declare(ResourceDescriptor::new(
            layer_handle,
            ResourceSpec::LayerBundle(LayerBundleSpec {
                layer_name,
                code_asset: LAYER_ASSET.to_string(),
                compatible_runtimes: vec![RUNTIME.to_string()],
                description: "Shared third-party modules (pyyaml, python-gitlab).".to_string(),
            }),
        ))?;

        let mut declare_unit = |role: UnitRole| {
            let function_name = prefix.name(role.function_suffix());
            let handle = ResourceHandle {
                id: role.logical_id(),
                kind: ResourceKind::Function,
                arn: placement.arn("lambda", &format!("function:{function_name}")),
                name: function_name.clone(),
            };
            let spec = FunctionSpec {
                function_name,
                role,
                runtime: RUNTIME.to_string(),
                handler: role.handler(),
                code_asset: CODE_ASSET.to_string(),
                timeout_secs: role.timeout().as_secs(),
                layers: vec![layer.id.clone()],
            };
            catalog.declare(
                ResourceDescriptor::new(handle, ResourceSpec::Function(spec)).depends_on(&layer.id),
            )
        };

        let intake_handler = declare_unit(UnitRole::IntakeHandler)?;
        let task_dispatcher = declare_unit(UnitRole::TaskDispatcher)?;
        let task_executor = declare_unit(UnitRole::TaskExecutor)?;
        let report_deliverer = declare_unit(UnitRole::ReportDeliverer)?;
        let data_initializer = declare_unit(UnitRole::DataInitializer)?;

        Ok(Self {
            layer,
            intake_handler,
            task_dispatcher,
            task_executor,
            report_deliverer,
            data_initializer,
        })
    }

    pub fn unit(&self, role: UnitRole) -> &ResourceHandle {
        match role {
            UnitRole::IntakeHandler => &self.intake_handler,
            UnitRole::TaskDispatcher => &self.task_dispatcher,
            UnitRole::TaskExecutor => &self.task_executor,
            UnitRole::ReportDeliverer => &self.report_deliverer,
            UnitRole::DataInitializer => &self.data_initializer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> (ComputeGraph, ResourceCatalog) {
        let mut catalog = ResourceCatalog::new();
        let prefix = Prefix::parse("acme").unwrap();
        let graph = ComputeGraph::declare(&prefix, &Placement::default(), &mut catalog).unwrap();
        (graph, catalog)
    }

    #[test]
    fn every_unit_depends_on_layer() {
        let (graph, catalog) = declared();
        for role in UnitRole::ALL {
            let descriptor = catalog.get(&graph.unit(role).id).unwrap();
            assert!(descriptor.depends_on.contains(&graph.layer.id), "{role}");
        }
    }

    #[test]
    fn function_names_and_handlers() {
        let (graph, catalog) = declared();
        assert_eq!(graph.intake_handler.name, "acme-request-handler");
        assert_eq!(graph.report_deliverer.name, "acme-report-receiver");
        match &catalog.get(&graph.task_executor.id).unwrap().spec {
            ResourceSpec::Function(spec) => {
                assert_eq!(spec.handler, "task_executor.lambda_handler");
                assert_eq!(spec.timeout_secs, 900);
                assert_eq!(spec.runtime, "python3.11");
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn config_keys_are_fixed_per_role() {
        assert!(UnitRole::IntakeHandler.accepts_key(env_keys::REQUEST_TABLE));
        assert!(!UnitRole::IntakeHandler.accepts_key(env_keys::TASK_SQS_URL));
        assert_eq!(UnitRole::TaskExecutor.config_keys().len(), 14);
        assert_eq!(UnitRole::ReportDeliverer.config_keys().len(), 6);
    }

    #[test]
    fn executor_fits_inside_visibility_window() {
        let window = crate::layers::queue::VISIBILITY_TIMEOUT;
        assert!(UnitRole::TaskExecutor.timeout() <= window);
    }
}
