//! reviewstack-compose: topology composition for the review pipeline.
//!
//! Turns the self-contained component declarations of `reviewstack-core`
//! into one ordered, validated [`Topology`]: access grants, runtime
//! configuration and event source bindings between components, the
//! creation order derived from them, and the deployment-transition-gated
//! data initializer.
//!
//! # Flow
//!
//! ```text
//! compose(prefix, params) ──▶ Topology ──plan(prev, next)──▶ DeploymentPlan
//!                                                  │
//!                                  execute(plan, invoker) ──▶ DeploymentReport
//! ```
//!
//! A pass either wires everything or fails with a [`ComposeError`]; nothing
//! is retried.

pub mod action;
pub mod binding;
pub mod composer;
pub mod deploy;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod initializer;
pub mod ledger;
pub mod topology;
pub mod unit;

pub use action::Action;
pub use binding::{BindingSet, EventSourceBinding};
pub use composer::{Composer, compose, compose_with};
pub use deploy::{DeploymentPlan, DeploymentReport, DeploymentTransition, TopologyDiff, execute, plan};
pub use error::{ComposeError, ComposeResult};
pub use gateway::{BackendResponse, GatewayModel, GatewayRequest, GatewayResponse, IntakeBackend};
pub use graph::ResourceGraph;
pub use initializer::{
    InitializerDeclaration, InitializerInvoker, InitializerPhase, InitializerRun, Invocation,
    InvokeError,
};
pub use ledger::{GrantOutcome, PermissionGrant, PermissionLedger, PolicyStatement};
pub use topology::{GatewaySummary, StackOutputs, Topology};
pub use unit::{ComputeUnit, ConfigValue, InvokePermission, REDACTED, redact};
