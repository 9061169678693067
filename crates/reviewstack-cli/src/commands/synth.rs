use reviewstack_compose::{ConfigValue, Topology};

pub fn synth(config: &str, format: &str, out: Option<&str>) -> anyhow::Result<()> {
    let topology = super::load_topology(config)?;

    if let Some(out) = out {
        std::fs::write(out, topology.to_json()?)?;
        eprintln!("✓ Wrote {out}");
    }

    match format {
        "json" => println!("{}", topology.to_json()?),
        _ => println!("{}", format_topology(&topology)?),
    }
    Ok(())
}

pub fn format_topology(topology: &Topology) -> anyhow::Result<String> {
    let mut lines = vec![
        format!("Topology {}", topology.prefix),
        format!("  Fingerprint: {}", topology.fingerprint()?),
        format!("  Resources:   {}", topology.resources.len()),
        String::new(),
        "Creation order:".to_string(),
    ];
    for (index, id) in topology.creation_order.iter().enumerate() {
        lines.push(format!("  {:>3}. {id}", index + 1));
    }

    lines.push(String::new());
    lines.push("Units:".to_string());
    for unit in topology.units.values() {
        lines.push(format!("  {} ({})", unit.handle.name, unit.handle.id));
        for (key, value) in &unit.environment {
            let shown = match value.redacted(key) {
                ConfigValue::Literal { value } => value,
                ConfigValue::Reference { source, value } => format!("{value}  <- {source}"),
            };
            lines.push(format!("    {key}={shown}"));
        }
    }

    lines.push(String::new());
    lines.push("Grants:".to_string());
    for grant in topology.grants.iter() {
        let actions: Vec<String> = grant.actions.iter().map(|a| format!("{a:?}")).collect();
        lines.push(format!(
            "  {} -> {} [{}]",
            grant.grantee,
            grant.resource,
            actions.join(", ")
        ));
    }

    lines.push(String::new());
    lines.push("Event sources:".to_string());
    for binding in topology.bindings.iter() {
        lines.push(format!("  {} -> {}", binding.producer, binding.consumer));
    }

    Ok(lines.join("\n"))
}
