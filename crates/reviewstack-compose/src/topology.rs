//! Topology: the immutable result of one synthesis pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use reviewstack_core::layers::gateway::STAGE_NAME;
use reviewstack_core::layers::{GatewayLayer, RouteSpec, Throttle, UnitRole};
use reviewstack_core::{Placement, Prefix, ResourceCatalog, ResourceId};

use crate::binding::BindingSet;
use crate::error::ComposeResult;
use crate::initializer::InitializerDeclaration;
use crate::ledger::PermissionLedger;
use crate::unit::ComputeUnit;

/// Gateway facts needed for outputs and for the request model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySummary {
    pub rest_api_id: String,
    pub api_key: ResourceId,
    pub api_key_id: String,
    pub stage_name: String,
    pub endpoint: String,
    pub route: RouteSpec,
    pub throttle: Throttle,
}

impl From<&GatewayLayer> for GatewaySummary {
    fn from(layer: &GatewayLayer) -> Self {
        Self {
            rest_api_id: layer.rest_api_id.clone(),
            api_key: layer.api_key.id.clone(),
            api_key_id: layer.api_key_id.clone(),
            stage_name: STAGE_NAME.to_string(),
            endpoint: layer.endpoint_url(),
            route: layer.route.clone(),
            throttle: layer.throttle,
        }
    }
}

/// Values published once the deployment settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutputs {
    pub endpoint: String,
    pub api_key_id: String,
    /// The key value is never an output; this fetches it out of band.
    pub get_api_key_command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub prefix: Prefix,
    pub placement: Placement,
    pub resources: ResourceCatalog,
    pub units: BTreeMap<UnitRole, ComputeUnit>,
    pub grants: PermissionLedger,
    pub bindings: BindingSet,
    pub initializer: InitializerDeclaration,
    pub gateway: GatewaySummary,
    pub creation_order: Vec<ResourceId>,
}

impl Topology {
    pub fn unit(&self, role: UnitRole) -> Option<&ComputeUnit> {
        self.units.get(&role)
    }

    /// Environment value of `key` on the unit playing `role`.
    pub fn env(&self, role: UnitRole, key: &str) -> Option<&str> {
        self.unit(role).and_then(|u| u.env(key))
    }

    pub fn deletion_order(&self) -> Vec<ResourceId> {
        self.creation_order.iter().rev().cloned().collect()
    }

    /// SHA-256 over the canonical JSON rendering. All collections are
    /// ordered, so equal topologies always hash equal. Secrets are redacted
    /// in that rendering and do not affect the result.
    pub fn fingerprint(&self) -> ComposeResult<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    pub fn outputs(&self) -> StackOutputs {
        StackOutputs {
            endpoint: self.gateway.endpoint.clone(),
            api_key_id: self.gateway.api_key_id.clone(),
            get_api_key_command: format!(
                "aws apigateway get-api-key --include-value --output text --query 'value' --api-key {}",
                self.gateway.api_key_id
            ),
        }
    }

    pub fn to_json(&self) -> ComposeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> ComposeResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}
