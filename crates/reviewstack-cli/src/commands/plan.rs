use std::path::Path;

use reviewstack_compose::{DeploymentPlan, Topology};

pub fn plan(config: &str, previous: Option<&str>, destroy: bool, format: &str) -> anyhow::Result<()> {
    let previous = match previous {
        Some(path) => Some(Topology::from_json(&std::fs::read_to_string(Path::new(path))?)?),
        None => None,
    };
    if destroy && previous.is_none() {
        anyhow::bail!("--destroy needs --previous");
    }
    let next = if destroy {
        None
    } else {
        Some(super::load_topology(config)?)
    };

    let plan = reviewstack_compose::plan(previous.as_ref(), next.as_ref())?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&plan)?),
        _ => println!("{}", format_plan(&plan)),
    }
    Ok(())
}

pub fn format_plan(plan: &DeploymentPlan) -> String {
    let diff = &plan.diff;
    let mut lines = vec![format!("Transition: {}", plan.transition)];

    for id in &diff.resources_added {
        lines.push(format!("  + {id}"));
    }
    for id in &diff.resources_changed {
        lines.push(format!("  ~ {id}"));
    }
    for id in &diff.resources_removed {
        lines.push(format!("  - {id}"));
    }
    for change in &diff.grants {
        lines.push(format!(
            "  grant {} -> {}: {:?} => {:?}",
            change.grantee, change.resource, change.before, change.after
        ));
    }
    for change in &diff.environment {
        lines.push(format!(
            "  env {} {}: {} => {}",
            change.unit,
            change.key,
            change.before.as_deref().unwrap_or("-"),
            change.after.as_deref().unwrap_or("-"),
        ));
    }
    if diff.is_empty() {
        lines.push("  (no changes)".to_string());
    }

    match plan.invocation() {
        Some(invocation) => lines.push(format!(
            "Initializer: invoke {} ({}) with {}",
            invocation.function_name, invocation.physical_id, invocation.payload
        )),
        None => lines.push("Initializer: skipped".to_string()),
    }
    lines.join("\n")
}
