//! Deployment parameter parsing (`reviewstack.toml`).

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Placement, Prefix};

pub const DEFAULT_PROJECT_NAME: &str = "aws-code-reviewer";

/// Parameters supplied for one deployment of the review pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentParameters {
    /// Project name, used as the prefix of every resource name.
    #[serde(default = "default_project_name")]
    pub project_name: String,
    pub account: Option<String>,
    pub region: Option<String>,
    /// Optional mail relay settings, consumed only by the report deliverer.
    #[serde(default)]
    pub mail: MailConfig,
    /// Tuning knobs handed to the task executor.
    #[serde(default)]
    pub executor: ExecutorTuning,
}

fn default_project_name() -> String {
    DEFAULT_PROJECT_NAME.to_string()
}

impl Default for DeploymentParameters {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            account: None,
            region: None,
            mail: MailConfig::default(),
            executor: ExecutorTuning::default(),
        }
    }
}

/// SMTP relay used to mail finished reports. Empty strings mean "unset".
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub smtp_server: String,
    pub smtp_port: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub report_sender: String,
    pub report_receiver: String,
}

impl MailConfig {
    /// Whether enough is set for the deliverer to attempt delivery.
    pub fn is_configured(&self) -> bool {
        !self.smtp_server.is_empty() && !self.report_receiver.is_empty()
    }
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"<redacted>")
            .field("report_sender", &self.report_sender)
            .field("report_receiver", &self.report_receiver)
            .finish()
    }
}

/// Retry, sampling and timeout settings for the task executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorTuning {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base requeue delay in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u32,
    /// Requeue delay ceiling in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u32,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Failed attempts tolerated before a task is abandoned.
    #[serde(default = "default_max_failed_times")]
    pub max_failed_times: u32,
    #[serde(default = "default_report_timeout")]
    pub report_timeout_secs: u32,
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_base_delay() -> u32 {
    2
}

const fn default_max_delay() -> u32 {
    60
}

const fn default_top_p() -> f64 {
    0.5
}

const fn default_max_tokens() -> u32 {
    10_000
}

const fn default_max_failed_times() -> u32 {
    6
}

const fn default_report_timeout() -> u32 {
    900
}

impl Default for ExecutorTuning {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            temperature: 0.0,
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            max_failed_times: default_max_failed_times(),
            report_timeout_secs: default_report_timeout(),
        }
    }
}

impl ExecutorTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay_secs > self.max_delay_secs {
            return Err(ConfigError::InvalidValue {
                key: "executor.base_delay_secs".to_string(),
                reason: format!(
                    "base delay {}s exceeds max delay {}s",
                    self.base_delay_secs, self.max_delay_secs
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidValue {
                key: "executor.temperature".to_string(),
                reason: format!("{} is outside 0..=1", self.temperature),
            });
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::InvalidValue {
                key: "executor.top_p".to_string(),
                reason: format!("{} is outside 0..=1", self.top_p),
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "executor.max_tokens".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl DeploymentParameters {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let params = Self::from_toml_str(&content)?;
        Ok(params)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let params: DeploymentParameters = toml::from_str(content)?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parameters for a named project with every optional field unset.
    pub fn for_project(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prefix()?;
        self.executor.validate()
    }

    pub fn prefix(&self) -> Result<Prefix, ConfigError> {
        Prefix::parse(&self.project_name)
    }

    pub fn placement(&self) -> Placement {
        Placement::new(self.account.as_deref(), self.region.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_uses_defaults() {
        let params = DeploymentParameters::from_toml_str("").unwrap();
        assert_eq!(params.project_name, DEFAULT_PROJECT_NAME);
        assert_eq!(params.executor, ExecutorTuning::default());
        assert!(!params.mail.is_configured());
    }

    #[test]
    fn parse_full() {
        let toml_str = r#"
project_name = "acme"
account = "123456789012"
region = "eu-west-1"

[mail]
smtp_server = "smtp.example.com"
smtp_port = "465"
report_receiver = "team@example.com"

[executor]
max_retries = 3
top_p = 0.9
"#;
        let params = DeploymentParameters::from_toml_str(toml_str).unwrap();
        assert_eq!(params.prefix().unwrap().as_str(), "acme");
        assert_eq!(params.placement().region, "eu-west-1");
        assert!(params.mail.is_configured());
        assert_eq!(params.mail.smtp_username, "");
        assert_eq!(params.executor.max_retries, 3);
        assert_eq!(params.executor.top_p, 0.9);
        assert_eq!(params.executor.max_delay_secs, 60);
    }

    #[test]
    fn rejects_invalid_project_name() {
        let err = DeploymentParameters::from_toml_str(r#"project_name = "a b""#).unwrap_err();
        assert!(err.to_string().contains("invalid project name"));
    }

    #[test]
    fn rejects_inverted_delays() {
        let toml_str = r#"
[executor]
base_delay_secs = 90
max_delay_secs = 60
"#;
        assert!(DeploymentParameters::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let mail = MailConfig {
            smtp_password: "hunter2".to_string(),
            ..MailConfig::default()
        };
        let rendered = format!("{mail:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn toml_roundtrip_keeps_project() {
        let params = DeploymentParameters::for_project("acme");
        let rendered = params.to_toml_string().unwrap();
        assert!(rendered.contains("acme"));
        let back = DeploymentParameters::from_toml_str(&rendered).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn from_file_reads_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewstack.toml");
        std::fs::write(&path, "project_name = \"from-file\"\n").unwrap();
        let params = DeploymentParameters::from_file(&path).unwrap();
        assert_eq!(params.project_name, "from-file");
    }
}
