use anyhow::Result;

use crate::config::Config;
use crate::connectors::ConnectorRegistry;

/// Print the connectors in dispatch order and the knowledge-base status.
pub fn list_sources(config: &Config) -> Result<()> {
    let registry = ConnectorRegistry::from_config(config);

    println!("{:<16} {}", "CONNECTOR", "DESCRIPTION");
    for connector in registry.connectors() {
        println!("{:<16} {}", connector.name(), connector.description());
    }

    let kb_status = match &config.knowledge_base {
        Some(kb) if kb.root.exists() => format!("OK ({})", kb.root.display()),
        Some(kb) => format!("MISSING ROOT ({})", kb.root.display()),
        None => "NOT CONFIGURED".to_string(),
    };
    println!();
    println!("{:<16} {}", "knowledge_base", kb_status);

    Ok(())
}
