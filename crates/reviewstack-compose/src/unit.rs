//! ComputeUnit: a declared unit plus the environment the composer wires in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use reviewstack_core::layers::UnitRole;
use reviewstack_core::layers::compute::env_keys::SMTP_PASSWORD;
use reviewstack_core::{ResourceHandle, ResourceId};

use crate::error::{ComposeError, ComposeResult};

/// Environment keys whose values are never printed or persisted.
pub const SECRET_KEYS: &[&str] = &[SMTP_PASSWORD];

/// Stand-in for a secret value outside the running composer.
pub const REDACTED: &str = "<redacted>";

/// `value` as it may appear in logs, renderings and serialized topologies.
pub fn redact<'a>(key: &str, value: &'a str) -> &'a str {
    if SECRET_KEYS.contains(&key) && !value.is_empty() {
        REDACTED
    } else {
        value
    }
}

/// A runtime configuration value handed to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigValue {
    Literal { value: String },
    /// Resolved from another resource's handle (table name, queue URL, ...).
    Reference { source: ResourceId, value: String },
}

impl ConfigValue {
    pub fn literal(value: impl Into<String>) -> Self {
        ConfigValue::Literal {
            value: value.into(),
        }
    }

    pub fn reference(source: &ResourceId, value: impl Into<String>) -> Self {
        ConfigValue::Reference {
            source: source.clone(),
            value: value.into(),
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ConfigValue::Literal { value } | ConfigValue::Reference { value, .. } => value,
        }
    }

    pub fn source(&self) -> Option<&ResourceId> {
        match self {
            ConfigValue::Literal { .. } => None,
            ConfigValue::Reference { source, .. } => Some(source),
        }
    }

    /// Same value with secrets replaced, for anything leaving the process.
    pub fn redacted(&self, key: &str) -> ConfigValue {
        match self {
            ConfigValue::Literal { value } => ConfigValue::literal(redact(key, value)),
            ConfigValue::Reference { source, value } => {
                ConfigValue::reference(source, redact(key, value))
            }
        }
    }
}

fn serialize_environment<S: Serializer>(
    environment: &BTreeMap<String, ConfigValue>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(environment.iter().map(|(k, v)| (k, v.redacted(k))))
}

/// Lets a producer principal invoke the unit (topic subscriptions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokePermission {
    pub principal: String,
    pub source_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUnit {
    pub role: UnitRole,
    pub handle: ResourceHandle,
    /// Serialized with secret values redacted.
    #[serde(serialize_with = "serialize_environment")]
    pub environment: BTreeMap<String, ConfigValue>,
    pub invoke_permissions: Vec<InvokePermission>,
}

impl ComputeUnit {
    pub fn new(role: UnitRole, handle: ResourceHandle) -> Self {
        Self {
            role,
            handle,
            environment: BTreeMap::new(),
            invoke_permissions: Vec::new(),
        }
    }

    /// Set one environment entry. Re-setting an identical value is a no-op.
    pub fn inject(&mut self, key: &str, value: ConfigValue) -> ComposeResult<()> {
        if !self.role.accepts_key(key) {
            return Err(ComposeError::UnknownConfigKey {
                unit: self.role,
                key: key.to_string(),
            });
        }
        match self.environment.get(key) {
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(ComposeError::DuplicateConfigKey {
                unit: self.role,
                key: key.to_string(),
                existing: redact(key, existing.value()).to_string(),
                attempted: redact(key, value.value()).to_string(),
            }),
            None => {
                debug!(
                    unit = %self.role,
                    key,
                    value = redact(key, value.value()),
                    "config injected"
                );
                self.environment.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(ConfigValue::value)
    }

    /// Declared keys that have not been injected yet.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        self.role
            .config_keys()
            .iter()
            .copied()
            .filter(|k| !self.environment.contains_key(*k))
            .collect()
    }

    pub fn add_invoke_permission(&mut self, permission: InvokePermission) {
        if !self.invoke_permissions.contains(&permission) {
            self.invoke_permissions.push(permission);
        }
    }
}
