//! Get command implementation.

use apollo_sync::{ApolloClient, ClientConfig};
use serde::Serialize;
use std::collections::BTreeMap;

/// One loaded namespace.
#[derive(Debug, Serialize)]
pub struct NamespaceDump {
    /// Namespace name.
    pub namespace: String,
    /// Release key held by the client.
    pub release_key: String,
    /// Key/value pairs.
    pub configurations: BTreeMap<String, String>,
}

/// Runs the get command.
pub fn run(
    config: ClientConfig,
    key: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Vec<String> = config.notification_map.keys().cloned().collect();
    let client = ApolloClient::connect(config)?;

    if let Some(key) = key {
        let value = namespaces
            .iter()
            .find_map(|ns| client.get_config(ns).and_then(|c| c.get(key).cloned()))
            .ok_or_else(|| format!("key {:?} not found", key))?;

        match format {
            "json" => println!("{}", serde_json::to_string(&value)?),
            _ => println!("{}", value),
        }
        return Ok(());
    }

    let dumps: Vec<NamespaceDump> = namespaces
        .iter()
        .filter_map(|ns| {
            Some(NamespaceDump {
                namespace: ns.clone(),
                release_key: client.release_key(ns)?,
                configurations: client.get_config(ns)?,
            })
        })
        .collect();

    if dumps.is_empty() {
        return Err("no configuration available from server or cache".into());
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&dumps)?),
        _ => print_text(&dumps),
    }

    Ok(())
}

pub(crate) fn print_text(dumps: &[NamespaceDump]) {
    for dump in dumps {
        println!("[{}] release {}", dump.namespace, dump.release_key);
        for (key, value) in &dump.configurations {
            println!("  {} = {}", key, value);
        }
    }
}
