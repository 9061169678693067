//! Composer: instantiates every component leaf-first and wires them.
//!
//! Components only ever see the handles passed to them. The composer is the
//! one place that knows how they relate: it records grants, injects runtime
//! configuration and binds event sources, then checks the result before
//! handing back an immutable [`Topology`].

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use reviewstack_core::layers::compute::env_keys::*;
use reviewstack_core::layers::{
    ComputeGraph, Dataset, GatewayLayer, GatewaySettings, NotificationLayer, ObjectStore,
    QueueLayer, ResourceSpec, StorageLayer, UnitRole,
};
use reviewstack_core::{
    DeclareError, DeclareResult, DeploymentParameters, Placement, Prefix, ResourceCatalog,
    ResourceHandle, ResourceId, ResourceKind,
};

use crate::action::{Action, OBJECT_READ_WRITE, TABLE_READ_WRITE};
use crate::binding::BindingSet;
use crate::error::{ComposeError, ComposeResult};
use crate::graph::ResourceGraph;
use crate::initializer::InitializerDeclaration;
use crate::ledger::{GrantOutcome, PermissionLedger};
use crate::topology::{GatewaySummary, Topology};
use crate::unit::{ComputeUnit, ConfigValue, InvokePermission};

/// Principal a topic delivers through when it invokes a subscriber.
pub const TOPIC_PRINCIPAL: &str = "sns.amazonaws.com";

/// Name of the managed model endpoint the executor calls.
pub const MODEL_SERVICE: &str = "FoundationModels";

/// Mutable state of one synthesis pass.
#[derive(Debug)]
pub struct Composer {
    prefix: Prefix,
    placement: Placement,
    catalog: ResourceCatalog,
    units: BTreeMap<UnitRole, ComputeUnit>,
    ledger: PermissionLedger,
    bindings: BindingSet,
}

impl Composer {
    pub fn new(prefix: Prefix, placement: Placement) -> Self {
        Self {
            prefix,
            placement,
            catalog: ResourceCatalog::new(),
            units: BTreeMap::new(),
            ledger: PermissionLedger::new(),
            bindings: BindingSet::new(),
        }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &PermissionLedger {
        &self.ledger
    }

    pub fn bindings(&self) -> &BindingSet {
        &self.bindings
    }

    pub fn unit(&self, role: UnitRole) -> Option<&ComputeUnit> {
        self.units.get(&role)
    }

    /// Run one component's declaration against this pass's catalog.
    pub fn instantiate<T>(
        &mut self,
        component: &'static str,
        declare: impl FnOnce(&Prefix, &Placement, &mut ResourceCatalog) -> DeclareResult<T>,
    ) -> ComposeResult<T> {
        let before = self.catalog.len();
        let handles = declare(&self.prefix, &self.placement, &mut self.catalog)?;
        info!(
            component,
            resources = self.catalog.len() - before,
            "component instantiated"
        );
        Ok(handles)
    }

    /// Make a declared function addressable as a compute unit.
    pub fn register_unit(&mut self, role: UnitRole, handle: &ResourceHandle) -> ComposeResult<()> {
        if !self.catalog.contains(&handle.id) {
            return Err(DeclareError::UnknownResource(handle.id.clone()).into());
        }
        self.units
            .entry(role)
            .or_insert_with(|| ComputeUnit::new(role, handle.clone()));
        Ok(())
    }

    fn unit_mut(&mut self, role: UnitRole) -> ComposeResult<&mut ComputeUnit> {
        self.units
            .get_mut(&role)
            .ok_or_else(|| DeclareError::UnknownResource(role.logical_id()).into())
    }

    fn unit_id(&self, role: UnitRole) -> ComposeResult<ResourceId> {
        self.units
            .get(&role)
            .map(|u| u.handle.id.clone())
            .ok_or_else(|| DeclareError::UnknownResource(role.logical_id()).into())
    }

    /// Let `grantee` perform `actions` on `resource`. Idempotent.
    pub fn grant(
        &mut self,
        resource: &ResourceHandle,
        grantee: &ResourceId,
        actions: &[Action],
    ) -> ComposeResult<GrantOutcome> {
        if resource.kind != ResourceKind::External && !self.catalog.contains(&resource.id) {
            return Err(DeclareError::UnknownResource(resource.id.clone()).into());
        }
        self.ledger.grant(resource, grantee, actions)
    }

    /// Grant to the unit playing `role`.
    pub fn grant_unit(
        &mut self,
        resource: &ResourceHandle,
        role: UnitRole,
        actions: &[Action],
    ) -> ComposeResult<GrantOutcome> {
        let grantee = self.unit_id(role)?;
        self.grant(resource, &grantee, actions)
    }

    /// Set one environment entry on the unit playing `role`.
    pub fn inject(&mut self, role: UnitRole, key: &str, value: ConfigValue) -> ComposeResult<()> {
        self.unit_mut(role)?.inject(key, value)
    }

    /// Inject a value resolved from `source`'s handle.
    pub fn inject_ref(
        &mut self,
        role: UnitRole,
        key: &str,
        source: &ResourceHandle,
        value: impl Into<String>,
    ) -> ComposeResult<()> {
        self.inject(role, key, ConfigValue::reference(&source.id, value))
    }

    /// Declare that `producer` triggers the unit playing `consumer`.
    ///
    /// Queue bindings add a consume grant and require the visibility window
    /// to cover the consumer's timeout. Topic bindings add an invoke
    /// permission for the topic principal.
    pub fn bind_event_source(
        &mut self,
        producer: &ResourceHandle,
        consumer: UnitRole,
    ) -> ComposeResult<()> {
        let consumer_id = self.unit_id(consumer)?;

        if producer.kind == ResourceKind::Queue {
            let visibility_secs = self.queue_visibility_secs(&producer.id)?;
            let timeout_secs = consumer.timeout().as_secs();
            if visibility_secs < timeout_secs {
                return Err(ComposeError::VisibilityWindowTooShort {
                    queue: producer.id.clone(),
                    consumer: consumer_id,
                    visibility_secs,
                    timeout_secs,
                });
            }
        }

        self.bindings.bind(producer, &consumer_id)?;
        match producer.kind {
            ResourceKind::Queue => {
                self.grant(producer, &consumer_id, &[Action::QueueConsume])?;
            }
            ResourceKind::Topic => {
                self.unit_mut(consumer)?
                    .add_invoke_permission(InvokePermission {
                        principal: TOPIC_PRINCIPAL.to_string(),
                        source_arn: producer.arn.clone(),
                    });
            }
            _ => {}
        }
        debug!(producer = %producer.id, consumer = %consumer_id, "event source bound");
        Ok(())
    }

    fn queue_visibility_secs(&self, queue: &ResourceId) -> ComposeResult<u64> {
        match self.catalog.get(queue).map(|d| &d.spec) {
            Some(ResourceSpec::Queue(spec)) => Ok(spec.visibility_timeout_secs),
            _ => Err(DeclareError::UnknownResource(queue.clone()).into()),
        }
    }

    /// Every declared key is set and every referenced resource is granted.
    pub fn validate(&self) -> ComposeResult<()> {
        for unit in self.units.values() {
            if let Some(key) = unit.missing_keys().first() {
                return Err(ComposeError::MissingConfigKey {
                    unit: unit.role,
                    key: key.to_string(),
                });
            }
            for (key, value) in &unit.environment {
                let Some(source) = value.source() else {
                    continue;
                };
                if !self.ledger.has_grant(&unit.handle.id, source) {
                    return Err(ComposeError::UngrantedConfigReference {
                        unit: unit.role,
                        key: key.clone(),
                        source_id: source.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check the pass and order it. Consumes the composer.
    pub fn finish(
        self,
        initializer: InitializerDeclaration,
        gateway: GatewaySummary,
    ) -> ComposeResult<Topology> {
        self.validate()?;
        let graph = ResourceGraph::build(
            &self.catalog,
            &self.ledger,
            &self.bindings,
            self.units.values(),
        );
        let creation_order = graph.creation_order()?;
        info!(
            prefix = %self.prefix,
            resources = self.catalog.len(),
            grants = self.ledger.len(),
            bindings = self.bindings.len(),
            nodes = creation_order.len(),
            "topology composed"
        );
        Ok(Topology {
            prefix: self.prefix,
            placement: self.placement,
            resources: self.catalog,
            units: self.units,
            grants: self.ledger,
            bindings: self.bindings,
            initializer,
            gateway,
            creation_order,
        })
    }
}

/// Compose the review pipeline for `prefix`.
pub fn compose(prefix: &Prefix, params: &DeploymentParameters) -> ComposeResult<Topology> {
    compose_with(prefix, params, &GatewaySettings::default())
}

pub fn compose_with(
    prefix: &Prefix,
    params: &DeploymentParameters,
    gateway_settings: &GatewaySettings,
) -> ComposeResult<Topology> {
    let mut composer = Composer::new(prefix.clone(), params.placement());

    let storage = composer.instantiate("storage", StorageLayer::declare)?;
    let queue = composer.instantiate("queue", QueueLayer::declare)?;
    let notification = composer.instantiate("notification", NotificationLayer::declare)?;
    let store = composer.instantiate("object_store", ObjectStore::declare)?;
    let compute = composer.instantiate("compute", ComputeGraph::declare)?;
    let gateway = composer.instantiate("gateway", |prefix, placement, catalog| {
        GatewayLayer::declare(
            prefix,
            placement,
            catalog,
            &compute.intake_handler,
            gateway_settings,
        )
    })?;
    let (initializer, invocation) =
        composer.instantiate("initializer", |prefix, placement, catalog| {
            InitializerDeclaration::declare(prefix, placement, catalog, &compute.data_initializer)
        })?;

    for role in UnitRole::ALL {
        composer.register_unit(role, compute.unit(role))?;
    }

    wire_intake(&mut composer, &storage, &compute)?;
    wire_dispatcher(&mut composer, &storage, &queue)?;
    wire_executor(&mut composer, &storage, &queue, &notification, &store, params)?;
    wire_deliverer(&mut composer, &notification, params)?;
    wire_initializer(&mut composer, &storage)?;

    composer.grant(&compute.data_initializer, &invocation.id, &[Action::FunctionInvoke])?;

    composer.finish(initializer, GatewaySummary::from(&gateway))
}

fn wire_intake(
    composer: &mut Composer,
    storage: &StorageLayer,
    compute: &ComputeGraph,
) -> ComposeResult<()> {
    let role = UnitRole::IntakeHandler;
    let repository = storage.table(Dataset::Repository);
    let request = storage.table(Dataset::Request);

    composer.grant_unit(repository, role, &[Action::TableRead])?;
    composer.grant_unit(request, role, TABLE_READ_WRITE)?;
    composer.grant_unit(&compute.task_dispatcher, role, &[Action::FunctionInvoke])?;

    composer.inject_ref(role, REQUEST_TABLE, request, &request.name)?;
    composer.inject_ref(role, REPOSITORY_TABLE, repository, &repository.name)?;
    composer.inject_ref(
        role,
        TASK_DISPATCHER_FUN_NAME,
        &compute.task_dispatcher,
        &compute.task_dispatcher.name,
    )
}

/// The dispatcher only enqueues; it never consumes.
fn wire_dispatcher(
    composer: &mut Composer,
    storage: &StorageLayer,
    queue: &QueueLayer,
) -> ComposeResult<()> {
    let role = UnitRole::TaskDispatcher;
    let rule = storage.table(Dataset::Rule);
    let request = storage.table(Dataset::Request);

    composer.grant_unit(rule, role, &[Action::TableRead])?;
    composer.grant_unit(request, role, TABLE_READ_WRITE)?;
    composer.grant_unit(&queue.task_queue, role, &[Action::QueueSend])?;

    composer.inject_ref(role, REQUEST_TABLE, request, &request.name)?;
    composer.inject_ref(role, RULE_TABLE, rule, &rule.name)?;
    composer.inject_ref(role, TASK_SQS_URL, &queue.task_queue, &queue.url)
}

/// The executor re-enqueues tasks that are not ready yet, so it holds send
/// as well as the consume grant that comes with its queue binding.
fn wire_executor(
    composer: &mut Composer,
    storage: &StorageLayer,
    queue: &QueueLayer,
    notification: &NotificationLayer,
    store: &ObjectStore,
    params: &DeploymentParameters,
) -> ComposeResult<()> {
    let role = UnitRole::TaskExecutor;
    let rule = storage.table(Dataset::Rule);
    let request = storage.table(Dataset::Request);
    let task = storage.table(Dataset::Task);
    let model = ResourceHandle {
        id: ResourceId::new(MODEL_SERVICE),
        kind: ResourceKind::External,
        name: MODEL_SERVICE.to_string(),
        arn: "*".to_string(),
    };

    composer.grant_unit(rule, role, &[Action::TableRead])?;
    composer.grant_unit(request, role, TABLE_READ_WRITE)?;
    composer.grant_unit(task, role, TABLE_READ_WRITE)?;
    composer.grant_unit(&store.report_bucket, role, OBJECT_READ_WRITE)?;
    composer.grant_unit(&queue.task_queue, role, &[Action::QueueSend])?;
    composer.grant_unit(&notification.report_topic, role, &[Action::TopicPublish])?;
    composer.grant_unit(&model, role, &[Action::ModelInvoke])?;
    composer.bind_event_source(&queue.task_queue, role)?;

    composer.inject_ref(role, BUCKET_NAME, &store.report_bucket, &store.report_bucket.name)?;
    composer.inject_ref(role, REQUEST_TABLE, request, &request.name)?;
    composer.inject_ref(role, RULE_TABLE, rule, &rule.name)?;
    composer.inject_ref(role, TASK_TABLE, task, &task.name)?;
    composer.inject_ref(role, TASK_SQS_URL, &queue.task_queue, &queue.url)?;
    composer.inject_ref(
        role,
        SNS_TOPIC_ARN,
        &notification.report_topic,
        &notification.report_topic.arn,
    )?;

    let tuning = &params.executor;
    let literals = [
        (SQS_MAX_RETRIES, tuning.max_retries.to_string()),
        (SQS_BASE_DELAY, tuning.base_delay_secs.to_string()),
        (SQS_MAX_DELAY, tuning.max_delay_secs.to_string()),
        (TEMPERATURE, tuning.temperature.to_string()),
        (TOP_P, tuning.top_p.to_string()),
        (MAX_TOKEN_TO_SAMPLE, tuning.max_tokens.to_string()),
        (MAX_FAILED_TIMES, tuning.max_failed_times.to_string()),
        (REPORT_TIMEOUT_SECONDS, tuning.report_timeout_secs.to_string()),
    ];
    for (key, value) in literals {
        composer.inject(role, key, ConfigValue::literal(value))?;
    }
    Ok(())
}

/// Mail settings are plain literals; the deliverer reads no datasets.
fn wire_deliverer(
    composer: &mut Composer,
    notification: &NotificationLayer,
    params: &DeploymentParameters,
) -> ComposeResult<()> {
    let role = UnitRole::ReportDeliverer;
    composer.bind_event_source(&notification.report_topic, role)?;

    let mail = &params.mail;
    if !mail.is_configured() {
        warn!(
            unit = %role,
            "mail server or receiver not set, reports will not be delivered"
        );
    }
    let literals = [
        (SMTP_SERVER, &mail.smtp_server),
        (SMTP_PORT, &mail.smtp_port),
        (SMTP_USERNAME, &mail.smtp_username),
        (SMTP_PASSWORD, &mail.smtp_password),
        (REPORT_SENDER, &mail.report_sender),
        (REPORT_RECEIVER, &mail.report_receiver),
    ];
    for (key, value) in literals {
        composer.inject(role, key, ConfigValue::literal(value.as_str()))?;
    }
    Ok(())
}

fn wire_initializer(composer: &mut Composer, storage: &StorageLayer) -> ComposeResult<()> {
    let role = UnitRole::DataInitializer;
    let rule = storage.table(Dataset::Rule);
    let repository = storage.table(Dataset::Repository);

    composer.grant_unit(rule, role, &[Action::TableWrite])?;
    composer.grant_unit(repository, role, &[Action::TableWrite])?;

    composer.inject_ref(role, RULE_TABLE, rule, &rule.name)?;
    composer.inject_ref(role, REPOSITORY_TABLE, repository, &repository.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer_with_units() -> (Composer, StorageLayer, QueueLayer, NotificationLayer) {
        let prefix = Prefix::parse("acme").unwrap();
        let mut composer = Composer::new(prefix, Placement::default());
        let storage = composer.instantiate("storage", StorageLayer::declare).unwrap();
        let queue = composer.instantiate("queue", QueueLayer::declare).unwrap();
        let notification = composer
            .instantiate("notification", NotificationLayer::declare)
            .unwrap();
        let compute = composer.instantiate("compute", ComputeGraph::declare).unwrap();
        for role in UnitRole::ALL {
            composer.register_unit(role, compute.unit(role)).unwrap();
        }
        (composer, storage, queue, notification)
    }

    #[test]
    fn queue_binding_grants_consume() {
        let (mut composer, _, queue, _) = composer_with_units();
        composer
            .bind_event_source(&queue.task_queue, UnitRole::TaskExecutor)
            .unwrap();
        let actions = composer
            .ledger()
            .actions(&UnitRole::TaskExecutor.logical_id(), &queue.task_queue.id);
        assert!(actions.contains(&Action::QueueConsume));
    }

    #[test]
    fn short_visibility_window_rejects_binding() {
        use reviewstack_core::ResourceDescriptor;
        use reviewstack_core::layers::queue::{QueueEncryption, QueueSpec};

        let (mut composer, _, _, _) = composer_with_units();
        let short = composer
            .instantiate("short-queue", |prefix, placement, catalog| {
                let queue_name = prefix.name("short-queue");
                let handle = ResourceHandle {
                    id: ResourceId::new("ShortQueue"),
                    kind: ResourceKind::Queue,
                    arn: placement.arn("sqs", &queue_name),
                    name: queue_name.clone(),
                };
                let spec = QueueSpec {
                    queue_name,
                    visibility_timeout_secs: 60,
                    encryption: QueueEncryption::KmsManaged,
                };
                catalog.declare(ResourceDescriptor::new(handle, ResourceSpec::Queue(spec)))
            })
            .unwrap();

        let err = composer
            .bind_event_source(&short, UnitRole::TaskExecutor)
            .unwrap_err();
        match err {
            ComposeError::VisibilityWindowTooShort {
                queue,
                visibility_secs,
                timeout_secs,
                ..
            } => {
                assert_eq!(queue, short.id);
                assert_eq!(visibility_secs, 60);
                assert_eq!(timeout_secs, 900);
            }
            other => panic!("unexpected error {other:?}"),
        }

        let executor = UnitRole::TaskExecutor.logical_id();
        assert!(!composer.bindings().is_bound(&short.id, &executor));
        assert!(composer.bindings().is_empty());
        assert!(!composer.ledger().has_grant(&executor, &short.id));
    }

    #[test]
    fn binding_twice_fails() {
        let (mut composer, _, queue, _) = composer_with_units();
        composer
            .bind_event_source(&queue.task_queue, UnitRole::TaskExecutor)
            .unwrap();
        let err = composer
            .bind_event_source(&queue.task_queue, UnitRole::TaskExecutor)
            .unwrap_err();
        assert!(matches!(err, ComposeError::DuplicateBinding { .. }));
    }

    #[test]
    fn topic_binding_adds_invoke_permission() {
        let (mut composer, _, _, notification) = composer_with_units();
        composer
            .bind_event_source(&notification.report_topic, UnitRole::ReportDeliverer)
            .unwrap();
        let unit = composer.unit(UnitRole::ReportDeliverer).unwrap();
        assert_eq!(unit.invoke_permissions.len(), 1);
        assert_eq!(unit.invoke_permissions[0].principal, TOPIC_PRINCIPAL);
        assert_eq!(unit.invoke_permissions[0].source_arn, notification.report_topic.arn);
    }

    #[test]
    fn table_is_not_an_event_source() {
        let (mut composer, storage, _, _) = composer_with_units();
        let err = composer
            .bind_event_source(storage.table(Dataset::Task), UnitRole::TaskExecutor)
            .unwrap_err();
        assert!(matches!(err, ComposeError::InvalidEventSource { .. }));
    }

    #[test]
    fn reference_without_grant_fails_validation() {
        let (mut composer, storage, _, _) = composer_with_units();
        let request = storage.table(Dataset::Request).clone();
        composer
            .inject_ref(UnitRole::IntakeHandler, REQUEST_TABLE, &request, &request.name)
            .unwrap();
        let err = composer.validate().unwrap_err();
        // Missing keys are reported first; fill them with literals.
        assert!(matches!(err, ComposeError::MissingConfigKey { .. }));

        for role in UnitRole::ALL {
            let keys: Vec<&'static str> = composer.unit(role).unwrap().missing_keys();
            for key in keys {
                composer.inject(role, key, ConfigValue::literal("x")).unwrap();
            }
        }
        let err = composer.validate().unwrap_err();
        match err {
            ComposeError::UngrantedConfigReference { unit, source_id, .. } => {
                assert_eq!(unit, UnitRole::IntakeHandler);
                assert_eq!(source_id, request.id);
            }
            other => panic!("unexpected error {other:?}"),
        }

        composer
            .grant_unit(&request, UnitRole::IntakeHandler, &[Action::TableRead])
            .unwrap();
        composer.validate().unwrap();
    }

    #[test]
    fn granting_undeclared_resource_fails() {
        let (mut composer, _, _, _) = composer_with_units();
        let ghost = ResourceHandle {
            id: ResourceId::new("Ghost"),
            kind: ResourceKind::Table,
            name: "ghost".to_string(),
            arn: "arn:ghost".to_string(),
        };
        let err = composer
            .grant_unit(&ghost, UnitRole::IntakeHandler, &[Action::TableRead])
            .unwrap_err();
        assert!(matches!(err, ComposeError::Declare(DeclareError::UnknownResource(_))));
    }
}
