//! Cache command implementation.

use super::get::{print_text, NamespaceDump};
use apollo_sync::DiskCache;
use std::path::Path;

/// Runs the cache command. Works without network access.
pub fn run(
    dir: &Path,
    app_id: &str,
    namespaces: &[String],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let cache = DiskCache::new(dir, app_id);

    let mut dumps = Vec::new();
    for namespace in namespaces {
        match cache.read(namespace) {
            Some(snapshot) => dumps.push(NamespaceDump {
                namespace: namespace.clone(),
                release_key: snapshot.release_key,
                configurations: snapshot.configurations,
            }),
            None => eprintln!(
                "no cache entry for {} at {}",
                namespace,
                cache.path_for(namespace).display()
            ),
        }
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&dumps)?),
        _ => print_text(&dumps),
    }

    Ok(())
}
