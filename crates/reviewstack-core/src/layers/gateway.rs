//! GatewayLayer: the single key-gated, throttled HTTP entry point.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::{ResourceCatalog, ResourceDescriptor};
use crate::error::{DeclareError, DeclareResult};
use crate::layers::ResourceSpec;
use crate::types::{Placement, Prefix, ResourceHandle, ResourceId, ResourceKind};

/// Hard limit the platform puts on a synchronous integration call.
pub const PLATFORM_TIMEOUT_CEILING: Duration = Duration::from_secs(30);
pub const STAGE_NAME: &str = "prod";
pub const ROUTE_PATH: &str = "/codereview";
pub const ROUTE_METHOD: &str = "POST";

/// Steady-state requests per second and bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throttle {
    pub rate_limit: u32,
    pub burst_limit: u32,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            rate_limit: 100,
            burst_limit: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub integration_timeout: Duration,
    pub throttle: Throttle,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            integration_timeout: Duration::from_secs(29),
            throttle: Throttle::default(),
        }
    }
}

impl GatewaySettings {
    pub fn validate(&self) -> DeclareResult<()> {
        let invalid = |reason: String| DeclareError::InvalidSetting {
            resource: ResourceId::new("API"),
            reason,
        };
        if self.integration_timeout.is_zero()
            || self.integration_timeout >= PLATFORM_TIMEOUT_CEILING
        {
            return Err(invalid(format!(
                "integration timeout {:?} must be positive and below the {:?} platform ceiling",
                self.integration_timeout, PLATFORM_TIMEOUT_CEILING
            )));
        }
        if self.throttle.rate_limit == 0 || self.throttle.burst_limit == 0 {
            return Err(invalid("throttle rate and burst must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub path: String,
    pub method: String,
    /// Compute unit the request body is forwarded to, unmodified.
    pub integration: ResourceId,
    pub integration_timeout_ms: u64,
    pub api_key_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestApiSpec {
    pub api_name: String,
    pub description: String,
    pub stage_name: String,
    pub logging_level: String,
    pub data_trace: bool,
    pub routes: Vec<RouteSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeySpec {
    pub key_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePlanSpec {
    pub plan_name: String,
    pub throttle: Throttle,
    pub api: ResourceId,
    pub stage_name: String,
    pub api_keys: Vec<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayLayer {
    pub api: ResourceHandle,
    pub api_key: ResourceHandle,
    pub usage_plan: ResourceHandle,
    pub route: RouteSpec,
    pub throttle: Throttle,
    /// Synthesized identifier of the REST API (stable digest of its ARN).
    pub rest_api_id: String,
    /// Synthesized identifier of the API key.
    pub api_key_id: String,
    region: String,
}

impl GatewayLayer {
    pub fn declare(
        prefix: &Prefix,
        placement: &Placement,
        catalog: &mut ResourceCatalog,
        intake: &ResourceHandle,
        settings: &GatewaySettings,
    ) -> DeclareResult<Self> {
        settings.validate()?;

        let api_name = prefix.name("api");
        let api_arn = placement.arn("apigateway", &format!("/restapis/{api_name}"));
        let rest_api_id = short_id(&api_arn);
        let route = RouteSpec {
            path: ROUTE_PATH.to_string(),
            method: ROUTE_METHOD.to_string(),
            integration: intake.id.clone(),
            integration_timeout_ms: settings.integration_timeout.as_millis() as u64,
            api_key_required: true,
        };
        let api = catalog.declare(
            ResourceDescriptor::new(
                ResourceHandle {
                    id: ResourceId::new("API"),
                    kind: ResourceKind::RestApi,
                    name: api_name.clone(),
                    arn: api_arn,
                },
                ResourceSpec::RestApi(RestApiSpec {
                    api_name,
                    description: "API Gateway for code review".to_string(),
                    stage_name: STAGE_NAME.to_string(),
                    logging_level: "INFO".to_string(),
                    data_trace: true,
                    routes: vec![route.clone()],
                }),
            )
            .depends_on(&intake.id),
        )?;

        let key_name = prefix.name("api-key");
        let key_arn = placement.arn("apigateway", &format!("/apikeys/{key_name}"));
        let api_key_id = short_id(&key_arn);
        let api_key = catalog.declare(ResourceDescriptor::new(
            ResourceHandle {
                id: ResourceId::new("CodeReviewApiKey"),
                kind: ResourceKind::ApiKey,
                name: key_name.clone(),
                arn: key_arn,
            },
            ResourceSpec::ApiKey(ApiKeySpec {
                key_name,
                description: "API Key for Code Review API".to_string(),
            }),
        ))?;

        let plan_name = prefix.name("usage-plan");
        let usage_plan = catalog.declare(
            ResourceDescriptor::new(
                ResourceHandle {
                    id: ResourceId::new("CodeReviewerUsagePlan"),
                    kind: ResourceKind::UsagePlan,
                    arn: placement.arn("apigateway", &format!("/usageplans/{plan_name}")),
                    name: plan_name.clone(),
                },
                ResourceSpec::UsagePlan(UsagePlanSpec {
                    plan_name,
                    throttle: settings.throttle,
                    api: api.id.clone(),
                    stage_name: STAGE_NAME.to_string(),
                    api_keys: vec![api_key.id.clone()],
                }),
            )
            .depends_on(&api.id)
            .depends_on(&api_key.id),
        )?;

        Ok(Self {
            api,
            api_key,
            usage_plan,
            route,
            throttle: settings.throttle,
            rest_api_id,
            api_key_id,
            region: placement.region.clone(),
        })
    }

    pub fn endpoint_url(&self) -> String {
        format!(
            "https://{}.execute-api.{}.amazonaws.com/{}{}",
            self.rest_api_id, self.region, STAGE_NAME, self.route.path
        )
    }
}

fn short_id(seed: &str) -> String {
    let digest = hex::encode(Sha256::digest(seed.as_bytes()));
    digest.chars().take(10).collect()
}
