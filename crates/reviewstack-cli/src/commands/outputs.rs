pub fn outputs(config: &str) -> anyhow::Result<()> {
    let topology = super::load_topology(config)?;
    let outputs = topology.outputs();

    println!("Endpoint:       {}", outputs.endpoint);
    println!("API key id:     {}", outputs.api_key_id);
    println!("Get key value:  {}", outputs.get_api_key_command);
    Ok(())
}
