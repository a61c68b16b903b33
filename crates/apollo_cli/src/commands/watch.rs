//! Watch command implementation.

use apollo_sync::{ApolloClient, ChangeEvent, ClientConfig};
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::info;

/// A change event as printed in JSON mode.
#[derive(Debug, Serialize)]
struct EventLine<'a> {
    action: &'a str,
    namespace: &'a str,
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_value: Option<&'a str>,
}

fn render(event: &ChangeEvent, json: bool) -> String {
    if json {
        let line = EventLine {
            action: event.action.as_str(),
            namespace: &event.namespace,
            key: &event.key,
            value: event.value.as_deref(),
            old_value: event.old_value.as_deref(),
        };
        return serde_json::to_string(&line).unwrap_or_default();
    }

    let old = event.old_value.as_deref().unwrap_or("-");
    let new = event.value.as_deref().unwrap_or("-");
    format!(
        "{:<6} {}:{} {} -> {}",
        event.action, event.namespace, event.key, old, new
    )
}

/// Runs the watch command.
pub fn run(
    config: ClientConfig,
    duration: Option<Duration>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = format == "json";
    let config =
        config.with_listener(move |event: &ChangeEvent| println!("{}", render(event, json)));

    let client = ApolloClient::connect(config)?;
    client.start()?;
    info!(namespaces = ?client.namespaces(), "watching for changes");

    match duration {
        Some(duration) => {
            thread::sleep(duration);
            client.stop();
        }
        None => loop {
            thread::park();
        },
    }

    Ok(())
}
