//! Namespace configuration snapshots.

use crate::error::ProtocolResult;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Release key meaning "no release seen yet".
pub const BOOTSTRAP_RELEASE_KEY: &str = "-1";

/// The configuration of one namespace at one release.
///
/// This is both the body of a `/configs/{app}/{cluster}/{namespace}`
/// response and the line persisted in the local cache file.
///
/// Two snapshots are the same version iff their `release_key`s are equal.
/// Content is never compared: the server's release key is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApolloConfig {
    /// Application the snapshot belongs to, as echoed by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Cluster the snapshot was served from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    /// Namespace name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_name: Option<String>,
    /// Opaque server-issued version token.
    pub release_key: String,
    /// Key/value pairs of the namespace.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub configurations: BTreeMap<String, String>,
}

impl ApolloConfig {
    /// Creates a snapshot with the given release key and content.
    pub fn new(release_key: impl Into<String>, configurations: BTreeMap<String, String>) -> Self {
        Self {
            app_id: None,
            cluster: None,
            namespace_name: None,
            release_key: release_key.into(),
            configurations,
        }
    }

    /// The empty snapshot that stands in for "nothing loaded yet".
    pub fn bootstrap() -> Self {
        Self::new(BOOTSTRAP_RELEASE_KEY, BTreeMap::new())
    }

    /// Returns true if this is the bootstrap sentinel.
    pub fn is_bootstrap(&self) -> bool {
        self.release_key == BOOTSTRAP_RELEASE_KEY
    }

    /// Returns true if both snapshots carry the same release key.
    pub fn same_release(&self, other: &ApolloConfig) -> bool {
        self.release_key == other.release_key
    }

    /// Looks up a single key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.configurations.get(key).map(String::as_str)
    }

    /// Parses a snapshot from a JSON body.
    pub fn from_json(body: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Serializes to a single line of JSON.
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}
