//! Deployment transitions between two synthesized topologies.
//!
//! `plan` classifies the transition and diffs resources, grants and unit
//! environments; `execute` drives the initializer for that transition.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use reviewstack_core::ResourceId;
use reviewstack_core::layers::UnitRole;

use crate::action::Action;
use crate::error::ComposeResult;
use crate::initializer::{
    InitializerDeclaration, InitializerInvoker, InitializerPhase, InitializerRun, Invocation,
};
use crate::topology::Topology;
use crate::unit::redact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentTransition {
    Create,
    Update,
    Delete,
    NoChange,
}

impl DeploymentTransition {
    /// Classify by topology fingerprint. Both sides absent counts as NoChange.
    pub fn classify(
        previous: Option<&Topology>,
        next: Option<&Topology>,
    ) -> ComposeResult<Self> {
        Ok(match (previous, next) {
            (None, Some(_)) => DeploymentTransition::Create,
            (Some(_), None) => DeploymentTransition::Delete,
            (None, None) => DeploymentTransition::NoChange,
            (Some(prev), Some(next)) => {
                if prev.fingerprint()? == next.fingerprint()? {
                    DeploymentTransition::NoChange
                } else {
                    DeploymentTransition::Update
                }
            }
        })
    }

    pub fn triggers_initializer(&self) -> bool {
        matches!(self, DeploymentTransition::Create | DeploymentTransition::Update)
    }
}

impl fmt::Display for DeploymentTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentTransition::Create => "create",
            DeploymentTransition::Update => "update",
            DeploymentTransition::Delete => "delete",
            DeploymentTransition::NoChange => "no-change",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantChange {
    pub grantee: ResourceId,
    pub resource: ResourceId,
    pub before: BTreeSet<Action>,
    pub after: BTreeSet<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvironmentChange {
    pub unit: UnitRole,
    pub key: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Differences between two topologies. Empty when they are equal.
/// Secret environment values are compared and reported redacted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDiff {
    pub resources_added: Vec<ResourceId>,
    pub resources_removed: Vec<ResourceId>,
    pub resources_changed: Vec<ResourceId>,
    pub grants: Vec<GrantChange>,
    pub environment: Vec<EnvironmentChange>,
}

impl TopologyDiff {
    pub fn between(previous: Option<&Topology>, next: Option<&Topology>) -> Self {
        let mut diff = Self::default();

        let before: BTreeMap<&ResourceId, _> = previous
            .map(|t| t.resources.iter().map(|d| (d.id(), d)).collect())
            .unwrap_or_default();
        let after: BTreeMap<&ResourceId, _> = next
            .map(|t| t.resources.iter().map(|d| (d.id(), d)).collect())
            .unwrap_or_default();
        for (id, descriptor) in &after {
            match before.get(id) {
                None => diff.resources_added.push((*id).clone()),
                Some(old) if old != descriptor => diff.resources_changed.push((*id).clone()),
                Some(_) => {}
            }
        }
        diff.resources_removed = before
            .keys()
            .filter(|id| !after.contains_key(*id))
            .map(|id| (*id).clone())
            .collect();

        let grants_of = |t: Option<&Topology>| -> BTreeMap<(ResourceId, ResourceId), BTreeSet<Action>> {
            t.map(|t| {
                t.grants
                    .iter()
                    .map(|g| ((g.grantee.clone(), g.resource.clone()), g.actions.clone()))
                    .collect()
            })
            .unwrap_or_default()
        };
        let (grants_before, grants_after) = (grants_of(previous), grants_of(next));
        let grant_keys: BTreeSet<_> = grants_before.keys().chain(grants_after.keys()).collect();
        for key in grant_keys {
            let old = grants_before.get(key).cloned().unwrap_or_default();
            let new = grants_after.get(key).cloned().unwrap_or_default();
            if old != new {
                diff.grants.push(GrantChange {
                    grantee: key.0.clone(),
                    resource: key.1.clone(),
                    before: old,
                    after: new,
                });
            }
        }

        let env_of = |t: Option<&Topology>| -> BTreeMap<(UnitRole, String), String> {
            t.map(|t| {
                t.units
                    .iter()
                    .flat_map(|(role, unit)| {
                        unit.environment.iter().map(move |(k, v)| {
                            ((*role, k.clone()), redact(k, v.value()).to_string())
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
        };
        let (env_before, env_after) = (env_of(previous), env_of(next));
        let env_keys: BTreeSet<_> = env_before.keys().chain(env_after.keys()).collect();
        for key in env_keys {
            let old = env_before.get(key);
            let new = env_after.get(key);
            if old != new {
                diff.environment.push(EnvironmentChange {
                    unit: key.0,
                    key: key.1.clone(),
                    before: old.cloned(),
                    after: new.cloned(),
                });
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.resources_added.is_empty()
            && self.resources_removed.is_empty()
            && self.resources_changed.is_empty()
            && self.grants.is_empty()
            && self.environment.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub transition: DeploymentTransition,
    pub diff: TopologyDiff,
    /// Initializer of the target topology, or of the previous one on delete.
    pub initializer: Option<InitializerDeclaration>,
}

impl DeploymentPlan {
    /// The invocation this plan will make, if any.
    pub fn invocation(&self) -> Option<Invocation> {
        self.initializer
            .as_ref()
            .and_then(|d| d.invocation(self.transition))
    }
}

pub fn plan(previous: Option<&Topology>, next: Option<&Topology>) -> ComposeResult<DeploymentPlan> {
    let transition = DeploymentTransition::classify(previous, next)?;
    let diff = TopologyDiff::between(previous, next);
    info!(
        %transition,
        added = diff.resources_added.len(),
        removed = diff.resources_removed.len(),
        changed = diff.resources_changed.len(),
        grants = diff.grants.len(),
        "deployment planned"
    );
    Ok(DeploymentPlan {
        transition,
        diff,
        initializer: next.or(previous).map(|t| t.initializer.clone()),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub transition: DeploymentTransition,
    pub initializer_phase: InitializerPhase,
    pub response: Option<serde_json::Value>,
}

/// Carry out a planned transition. Fails as a whole when the initializer fails.
pub fn execute(
    plan: &DeploymentPlan,
    invoker: &mut dyn InitializerInvoker,
) -> ComposeResult<DeploymentReport> {
    let Some(declaration) = plan.initializer.clone() else {
        return Ok(DeploymentReport {
            transition: plan.transition,
            initializer_phase: InitializerPhase::Idle,
            response: None,
        });
    };
    let mut run = InitializerRun::new(declaration);
    let response = run.drive(plan.transition, invoker)?;
    info!(transition = %plan.transition, phase = %run.phase(), "deployment transition complete");
    Ok(DeploymentReport {
        transition: plan.transition,
        initializer_phase: run.phase(),
        response,
    })
}
