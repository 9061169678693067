//! One-shot data initializer gated on deployment transitions.
//!
//! The initializer function is invoked through a managed custom resource
//! with a fixed physical id. Create and Update invoke it exactly once with a
//! payload naming the transition; Delete and NoChange never invoke it.
//!
//! ```text
//! Idle ──Create/Update──▶ Invoking ──ok──▶ Settled
//!   │                        └─────err────▶ Failed
//!   └──Delete/NoChange──▶ Idle
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use reviewstack_core::layers::{CustomResourceSpec, ResourceSpec};
use reviewstack_core::{
    DeclareResult, Placement, Prefix, ResourceCatalog, ResourceDescriptor, ResourceHandle,
    ResourceId, ResourceKind,
};

use crate::action::Action;
use crate::deploy::DeploymentTransition;
use crate::error::{ComposeError, ComposeResult};

/// Physical id shared by every create/update of the invocation resource.
pub const PHYSICAL_ID: &str = "DataInitializerInvocation";

/// What the orchestration engine sends to the initializer function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub function_name: String,
    pub physical_id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum InvokeError {
    /// The function ran and reported an error.
    #[error("function error: {0}")]
    Function(String),

    /// The function could not be reached at all.
    #[error("invocation not delivered: {0}")]
    Unreachable(String),
}

/// The orchestration engine's synchronous invoke call.
pub trait InitializerInvoker {
    fn invoke(&mut self, invocation: &Invocation) -> Result<serde_json::Value, InvokeError>;
}

/// Declared shape of the invocation resource, carried in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializerDeclaration {
    pub resource: ResourceId,
    pub target: ResourceId,
    pub function_name: String,
    pub physical_id: String,
    pub on_create: serde_json::Value,
    pub on_update: serde_json::Value,
}

impl InitializerDeclaration {
    /// Declare the custom resource that invokes `initializer`. Its own
    /// policy allows invoking that one function and nothing else.
    pub fn declare(
        prefix: &Prefix,
        placement: &Placement,
        catalog: &mut ResourceCatalog,
        initializer: &ResourceHandle,
    ) -> DeclareResult<(Self, ResourceHandle)> {
        let declaration = Self {
            resource: ResourceId::new(PHYSICAL_ID),
            target: initializer.id.clone(),
            function_name: initializer.name.clone(),
            physical_id: PHYSICAL_ID.to_string(),
            on_create: json!({ "reason": "created" }),
            on_update: json!({ "reason": "updated" }),
        };
        let handle = ResourceHandle {
            id: declaration.resource.clone(),
            kind: ResourceKind::CustomResource,
            name: prefix.name("data-initializer-invocation"),
            arn: placement.arn("cloudformation", &format!("custom/{PHYSICAL_ID}")),
        };
        let spec = CustomResourceSpec {
            target: initializer.id.clone(),
            target_function_name: initializer.name.clone(),
            physical_id: declaration.physical_id.clone(),
            on_create_payload: declaration.on_create.clone(),
            on_update_payload: declaration.on_update.clone(),
            policy_actions: Action::FunctionInvoke
                .iam_actions()
                .iter()
                .map(|a| a.to_string())
                .collect(),
            policy_resources: vec![initializer.arn.clone()],
        };
        let handle = catalog.declare(
            ResourceDescriptor::new(handle, ResourceSpec::CustomResource(spec))
                .depends_on(&initializer.id),
        )?;
        Ok((declaration, handle))
    }

    /// The invocation a transition calls for, if any.
    pub fn invocation(&self, transition: DeploymentTransition) -> Option<Invocation> {
        if !transition.triggers_initializer() {
            return None;
        }
        let payload = match transition {
            DeploymentTransition::Create => self.on_create.clone(),
            _ => self.on_update.clone(),
        };
        Some(Invocation {
            function_name: self.function_name.clone(),
            physical_id: self.physical_id.clone(),
            payload,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializerPhase {
    Idle,
    Invoking,
    Settled,
    Failed,
}

impl fmt::Display for InitializerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitializerPhase::Idle => "idle",
            InitializerPhase::Invoking => "invoking",
            InitializerPhase::Settled => "settled",
            InitializerPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Initializer state for a single deployment transition.
#[derive(Debug, Clone)]
pub struct InitializerRun {
    declaration: InitializerDeclaration,
    phase: InitializerPhase,
}

impl InitializerRun {
    pub fn new(declaration: InitializerDeclaration) -> Self {
        Self {
            declaration,
            phase: InitializerPhase::Idle,
        }
    }

    pub fn phase(&self) -> InitializerPhase {
        self.phase
    }

    pub fn declaration(&self) -> &InitializerDeclaration {
        &self.declaration
    }

    /// Drive the run for `transition`. Returns the function's response when
    /// it was invoked. A run is driven at most once.
    pub fn drive(
        &mut self,
        transition: DeploymentTransition,
        invoker: &mut dyn InitializerInvoker,
    ) -> ComposeResult<Option<serde_json::Value>> {
        if self.phase != InitializerPhase::Idle {
            return Err(ComposeError::InitializerNotIdle {
                phase: self.phase.to_string(),
            });
        }

        let Some(invocation) = self.declaration.invocation(transition) else {
            info!(?transition, "initializer skipped");
            return Ok(None);
        };

        self.phase = InitializerPhase::Invoking;
        info!(
            ?transition,
            function = %invocation.function_name,
            physical_id = %invocation.physical_id,
            "invoking initializer"
        );

        match invoker.invoke(&invocation) {
            Ok(response) => {
                self.phase = InitializerPhase::Settled;
                info!(physical_id = %invocation.physical_id, "initializer settled");
                Ok(Some(response))
            }
            Err(err) => {
                self.phase = InitializerPhase::Failed;
                warn!(physical_id = %invocation.physical_id, error = %err, "initializer failed");
                Err(ComposeError::InitializerInvocation {
                    physical_id: invocation.physical_id,
                    reason: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewstack_core::layers::ComputeGraph;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Invocation>,
        fail: bool,
    }

    impl InitializerInvoker for Recorder {
        fn invoke(&mut self, invocation: &Invocation) -> Result<serde_json::Value, InvokeError> {
            self.calls.push(invocation.clone());
            if self.fail {
                Err(InvokeError::Function("seed rules failed".to_string()))
            } else {
                Ok(json!({ "status": "ok" }))
            }
        }
    }

    fn declaration() -> InitializerDeclaration {
        let mut catalog = ResourceCatalog::new();
        let prefix = Prefix::parse("acme").unwrap();
        let placement = Placement::default();
        let compute = ComputeGraph::declare(&prefix, &placement, &mut catalog).unwrap();
        let (declaration, handle) = InitializerDeclaration::declare(
            &prefix,
            &placement,
            &mut catalog,
            &compute.data_initializer,
        )
        .unwrap();
        assert!(catalog.get(&handle.id).unwrap().depends_on.contains(&compute.data_initializer.id));
        declaration
    }

    #[test]
    fn create_invokes_once_with_created_reason() {
        let mut run = InitializerRun::new(declaration());
        let mut recorder = Recorder::default();
        let response = run.drive(DeploymentTransition::Create, &mut recorder).unwrap();

        assert_eq!(response, Some(json!({ "status": "ok" })));
        assert_eq!(run.phase(), InitializerPhase::Settled);
        assert_eq!(recorder.calls.len(), 1);
        assert_eq!(recorder.calls[0].payload, json!({ "reason": "created" }));
        assert_eq!(recorder.calls[0].function_name, "acme-data-initializer");
    }

    #[test]
    fn delete_and_no_change_stay_idle() {
        for transition in [DeploymentTransition::Delete, DeploymentTransition::NoChange] {
            let mut run = InitializerRun::new(declaration());
            let mut recorder = Recorder::default();
            assert_eq!(run.drive(transition, &mut recorder).unwrap(), None);
            assert_eq!(run.phase(), InitializerPhase::Idle);
            assert!(recorder.calls.is_empty());
        }
    }

    #[test]
    fn failure_fails_the_transition() {
        let mut run = InitializerRun::new(declaration());
        let mut recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let err = run.drive(DeploymentTransition::Update, &mut recorder).unwrap_err();
        assert!(matches!(err, ComposeError::InitializerInvocation { .. }));
        assert_eq!(run.phase(), InitializerPhase::Failed);
    }

    #[test]
    fn run_cannot_be_driven_twice() {
        let mut run = InitializerRun::new(declaration());
        let mut recorder = Recorder::default();
        run.drive(DeploymentTransition::Create, &mut recorder).unwrap();
        let err = run.drive(DeploymentTransition::Update, &mut recorder).unwrap_err();
        assert!(matches!(err, ComposeError::InitializerNotIdle { .. }));
        assert_eq!(recorder.calls.len(), 1);
    }

    #[test]
    fn physical_id_is_stable_across_transitions() {
        let declaration = declaration();
        let create = declaration.invocation(DeploymentTransition::Create).unwrap();
        let update = declaration.invocation(DeploymentTransition::Update).unwrap();
        assert_eq!(create.physical_id, update.physical_id);
        assert_ne!(create.payload, update.payload);
    }
}
