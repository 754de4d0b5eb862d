use anyhow::Result;
use serde::Serialize;

use netsurface_core::services::hosts::default_host_registry;

#[derive(Debug, Serialize)]
pub struct HostInfo {
    pub name: String,
    pub description: String,
}

/// List the host adapters compiled into this binary.
pub fn list_hosts_command(json: bool) -> Result<()> {
    let registry = default_host_registry();
    let entries: Vec<HostInfo> = registry
        .names()
        .into_iter()
        .filter_map(|name| {
            registry.get(&name).map(|loader| HostInfo {
                description: loader.description().to_string(),
                name,
            })
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Hosts: (none)");
        return Ok(());
    }

    println!("Hosts:");
    for entry in entries {
        println!("- {}: {}", entry.name, entry.description);
    }

    Ok(())
}
