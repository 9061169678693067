//! Declaration of the lifecycle-gated initializer invocation.

use serde::{Deserialize, Serialize};

use crate::types::ResourceId;

/// A managed side effect that invokes a compute unit when the deployment is
/// created or updated. The physical id never changes, so repeated updates
/// are treated as the same managed side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomResourceSpec {
    /// Compute unit invoked on create/update.
    pub target: ResourceId,
    pub target_function_name: String,
    pub physical_id: String,
    pub on_create_payload: serde_json::Value,
    pub on_update_payload: serde_json::Value,
    /// Actions the invoking principal is allowed, scoped to `policy_resources`.
    pub policy_actions: Vec<String>,
    pub policy_resources: Vec<String>,
}
