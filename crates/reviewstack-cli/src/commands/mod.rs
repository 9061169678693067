pub mod outputs;
pub mod plan;
pub mod synth;

use std::path::Path;

use reviewstack_compose::Topology;
use reviewstack_core::DeploymentParameters;

/// Load parameters and compose. A missing parameters file means defaults.
pub fn load_topology(config: &str) -> anyhow::Result<Topology> {
    let path = Path::new(config);
    let params = if path.exists() {
        DeploymentParameters::from_file(path)?
    } else {
        tracing::warn!(config, "parameters file not found, using defaults");
        DeploymentParameters::default()
    };
    let prefix = params.prefix()?;
    Ok(reviewstack_compose::compose(&prefix, &params)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewstack_core::layers::UnitRole;
    use reviewstack_core::layers::compute::env_keys::REQUEST_TABLE;

    #[test]
    fn loads_parameters_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewstack.toml");
        std::fs::write(&path, "project_name = \"acme\"\nregion = \"eu-west-1\"\n").unwrap();

        let topology = load_topology(path.to_str().unwrap()).unwrap();
        assert_eq!(topology.env(UnitRole::IntakeHandler, REQUEST_TABLE), Some("acme-request"));
        assert!(topology.outputs().endpoint.contains(".execute-api.eu-west-1."));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let topology = load_topology(path.to_str().unwrap()).unwrap();
        assert_eq!(topology.prefix.as_str(), "aws-code-reviewer");
    }

    #[test]
    fn text_rendering_redacts_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewstack.toml");
        std::fs::write(&path, "[mail]\nsmtp_password = \"hunter2\"\n").unwrap();

        let topology = load_topology(path.to_str().unwrap()).unwrap();
        let text = synth::format_topology(&topology).unwrap();
        assert!(text.contains("SMTP_PASSWORD=<redacted>"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn plan_and_json_renderings_redact_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewstack.toml");
        std::fs::write(&path, "[mail]\nsmtp_password = \"hunter2\"\n").unwrap();

        let topology = load_topology(path.to_str().unwrap()).unwrap();
        let json = topology.to_json().unwrap();
        assert!(!json.contains("hunter2"));

        let plan = reviewstack_compose::plan(None, Some(&topology)).unwrap();
        let text = plan::format_plan(&plan);
        assert!(text.contains("SMTP_PASSWORD: - => <redacted>"));
        assert!(!text.contains("hunter2"));
        assert!(!serde_json::to_string(&plan).unwrap().contains("hunter2"));
    }

    #[test]
    fn persisted_topology_plans_as_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviewstack.toml");
        std::fs::write(&path, "[mail]\nsmtp_password = \"hunter2\"\n").unwrap();

        let topology = load_topology(path.to_str().unwrap()).unwrap();
        let previous = Topology::from_json(&topology.to_json().unwrap()).unwrap();
        let plan = reviewstack_compose::plan(Some(&previous), Some(&topology)).unwrap();
        assert_eq!(plan.transition.to_string(), "no-change");
        assert!(plan.diff.is_empty());
    }
}
