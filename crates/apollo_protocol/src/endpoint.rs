//! URL construction for the config service.

use crate::error::ProtocolResult;
use crate::notification::{encode_notifications, Notification};
use url::{form_urlencoded, Url};

/// Coordinates of one application on a config service.
///
/// Namespace names are placed in the path as-is; Apollo restricts them to
/// `[0-9a-zA-Z_.-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    base: String,
    app_id: String,
    cluster: String,
}

impl Endpoint {
    /// Creates an endpoint. A trailing `/` on `base` is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidUrl` if `base` is not an absolute URL.
    pub fn new(
        base: impl Into<String>,
        app_id: impl Into<String>,
        cluster: impl Into<String>,
    ) -> ProtocolResult<Self> {
        let base = base.into().trim_end_matches('/').to_string();
        Url::parse(&base)?;
        Ok(Self {
            base,
            app_id: app_id.into(),
            cluster: cluster.into(),
        })
    }

    /// Returns the base URL without trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the application id.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Returns the cluster name.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// URL that fetches the full snapshot of `namespace`.
    ///
    /// `{base}/configs/{app_id}/{cluster}/{namespace}?releaseKey=&ip={ip}`
    pub fn config_url(&self, namespace: &str, ip: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("releaseKey", "")
            .append_pair("ip", ip)
            .finish();
        format!(
            "{}/configs/{}/{}/{}?{}",
            self.base, self.app_id, self.cluster, namespace, query
        )
    }

    /// URL of the long-poll request carrying the last-seen ids.
    ///
    /// `{base}/notifications/v2?appId=..&cluster=..&notifications=[..]`
    pub fn notifications_url(&self, notifications: &[Notification]) -> ProtocolResult<String> {
        let encoded = encode_notifications(notifications)?;
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("appId", &self.app_id)
            .append_pair("cluster", &self.cluster)
            .append_pair("notifications", &encoded)
            .finish();
        Ok(format!("{}/notifications/v2?{}", self.base, query))
    }

    /// The part of `url` after the base, as covered by the request signature.
    pub fn path_with_query<'a>(&self, url: &'a str) -> &'a str {
        url.strip_prefix(self.base.as_str()).unwrap_or(url)
    }
}
