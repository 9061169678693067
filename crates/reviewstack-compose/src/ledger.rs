//! PermissionLedger: idempotent, append-only record of access grants.
//!
//! Grants are keyed by `(grantee, resource)`. The stored action set is the
//! union of every grant made for that key and renders as exactly one policy
//! statement, so granting the same triple twice never duplicates policy.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use reviewstack_core::{ResourceHandle, ResourceId, ResourceKind};

use crate::action::{Action, statement_resources};
use crate::error::{ComposeError, ComposeResult};

/// Access held by one grantee on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub grantee: ResourceId,
    pub resource: ResourceId,
    pub resource_kind: ResourceKind,
    pub resource_arn: String,
    pub actions: BTreeSet<Action>,
}

impl PermissionGrant {
    pub fn statement(&self) -> PolicyStatement {
        let actions: BTreeSet<&str> = self
            .actions
            .iter()
            .flat_map(|a| a.iam_actions().iter().copied())
            .collect();
        PolicyStatement {
            effect: "Allow".to_string(),
            actions: actions.into_iter().map(str::to_string).collect(),
            resources: statement_resources(self.resource_kind, &self.resource_arn),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: String,
    #[serde(rename = "Action")]
    pub actions: Vec<String>,
    #[serde(rename = "Resource")]
    pub resources: Vec<String>,
}

/// What a call to `grant` did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Created,
    Widened { added: BTreeSet<Action> },
    Unchanged,
    /// The request asked for less than is already held. The wider set is
    /// kept; grants are never narrowed during a composition.
    Narrowing { retained: BTreeSet<Action> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionLedger {
    /// grantee → resource → grant
    grants: BTreeMap<ResourceId, BTreeMap<ResourceId, PermissionGrant>>,
}

impl PermissionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `grantee` may perform `actions` on `resource`.
    pub fn grant(
        &mut self,
        resource: &ResourceHandle,
        grantee: &ResourceId,
        actions: &[Action],
    ) -> ComposeResult<GrantOutcome> {
        if let Some(action) = actions.iter().find(|a| !a.applies_to(resource.kind)) {
            return Err(ComposeError::IncompatibleAction {
                action: *action,
                resource: resource.id.clone(),
                kind: resource.kind,
            });
        }
        let requested: BTreeSet<Action> = actions.iter().copied().collect();
        if requested.is_empty() {
            return Ok(GrantOutcome::Unchanged);
        }

        let per_grantee = self.grants.entry(grantee.clone()).or_default();
        let outcome = match per_grantee.get_mut(&resource.id) {
            None => {
                per_grantee.insert(
                    resource.id.clone(),
                    PermissionGrant {
                        grantee: grantee.clone(),
                        resource: resource.id.clone(),
                        resource_kind: resource.kind,
                        resource_arn: resource.arn.clone(),
                        actions: requested,
                    },
                );
                GrantOutcome::Created
            }
            Some(existing) => {
                let added: BTreeSet<Action> =
                    requested.difference(&existing.actions).copied().collect();
                if !added.is_empty() {
                    existing.actions.extend(added.iter().copied());
                    GrantOutcome::Widened { added }
                } else if requested == existing.actions {
                    GrantOutcome::Unchanged
                } else {
                    warn!(
                        %grantee,
                        resource = %resource.id,
                        requested = ?requested,
                        retained = ?existing.actions,
                        "narrower grant ignored, keeping wider action set"
                    );
                    GrantOutcome::Narrowing {
                        retained: existing.actions.clone(),
                    }
                }
            }
        };
        debug!(%grantee, resource = %resource.id, ?actions, ?outcome, "grant recorded");
        Ok(outcome)
    }

    pub fn get(&self, grantee: &ResourceId, resource: &ResourceId) -> Option<&PermissionGrant> {
        self.grants.get(grantee).and_then(|m| m.get(resource))
    }

    pub fn has_grant(&self, grantee: &ResourceId, resource: &ResourceId) -> bool {
        self.get(grantee, resource).is_some()
    }

    /// Actions `grantee` holds on `resource` (empty when none).
    pub fn actions(&self, grantee: &ResourceId, resource: &ResourceId) -> BTreeSet<Action> {
        self.get(grantee, resource)
            .map(|g| g.actions.clone())
            .unwrap_or_default()
    }

    pub fn grants_of<'a>(
        &'a self,
        grantee: &ResourceId,
    ) -> impl Iterator<Item = &'a PermissionGrant> + use<'a> {
        self.grants
            .get(grantee)
            .into_iter()
            .flat_map(|m| m.values())
    }

    pub fn grantees(&self) -> impl Iterator<Item = &ResourceId> {
        self.grants.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionGrant> {
        self.grants.values().flat_map(|m| m.values())
    }

    /// The rendered policy document statements of one grantee.
    pub fn policy(&self, grantee: &ResourceId) -> Vec<PolicyStatement> {
        self.grants_of(grantee).map(PermissionGrant::statement).collect()
    }

    /// Number of underlying policy statements.
    pub fn len(&self) -> usize {
        self.grants.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ResourceHandle {
        ResourceHandle {
            id: ResourceId::new("RequestTable"),
            kind: ResourceKind::Table,
            name: "acme-request".to_string(),
            arn: "arn:aws:dynamodb:r:a:table/acme-request".to_string(),
        }
    }

    fn grantee() -> ResourceId {
        ResourceId::new("RequestHandler")
    }

    #[test]
    fn granting_twice_yields_one_statement() {
        let mut ledger = PermissionLedger::new();
        let first = ledger.grant(&table(), &grantee(), &[Action::TableRead]).unwrap();
        let second = ledger.grant(&table(), &grantee(), &[Action::TableRead]).unwrap();

        assert_eq!(first, GrantOutcome::Created);
        assert_eq!(second, GrantOutcome::Unchanged);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.policy(&grantee()).len(), 1);
    }

    #[test]
    fn wider_grant_extends_existing_entry() {
        let mut ledger = PermissionLedger::new();
        ledger.grant(&table(), &grantee(), &[Action::TableRead]).unwrap();
        let outcome = ledger
            .grant(&table(), &grantee(), &[Action::TableRead, Action::TableWrite])
            .unwrap();

        assert_eq!(
            outcome,
            GrantOutcome::Widened {
                added: BTreeSet::from([Action::TableWrite])
            }
        );
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.actions(&grantee(), &table().id).len(), 2);
    }

    #[test]
    fn narrower_grant_keeps_wider_set() {
        let mut ledger = PermissionLedger::new();
        ledger
            .grant(&table(), &grantee(), &[Action::TableRead, Action::TableWrite])
            .unwrap();
        let outcome = ledger.grant(&table(), &grantee(), &[Action::TableRead]).unwrap();

        assert!(matches!(outcome, GrantOutcome::Narrowing { .. }));
        assert!(ledger.actions(&grantee(), &table().id).contains(&Action::TableWrite));
    }

    #[test]
    fn incompatible_action_rejected() {
        let mut ledger = PermissionLedger::new();
        let err = ledger.grant(&table(), &grantee(), &[Action::QueueSend]).unwrap_err();
        assert!(matches!(err, ComposeError::IncompatibleAction { .. }));
        assert!(ledger.is_empty());
    }

    #[test]
    fn statement_merges_iam_actions() {
        let mut ledger = PermissionLedger::new();
        ledger
            .grant(&table(), &grantee(), &[Action::TableRead, Action::TableWrite])
            .unwrap();
        let statement = &ledger.policy(&grantee())[0];
        let describe = statement
            .actions
            .iter()
            .filter(|a| *a == "dynamodb:DescribeTable")
            .count();
        assert_eq!(describe, 1);
        assert_eq!(statement.resources.len(), 2);
        assert_eq!(statement.effect, "Allow");
    }
}
