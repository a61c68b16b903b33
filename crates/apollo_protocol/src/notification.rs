//! Long-poll notification messages.

use crate::error::ProtocolResult;
use serde::{Deserialize, Serialize};

/// Notification id a client reports for a namespace it has never seen change.
pub const INITIAL_NOTIFICATION_ID: i64 = -1;

/// One `{namespaceName, notificationId}` entry of the `/notifications/v2`
/// protocol.
///
/// The client sends its last-seen id per namespace; the server answers with
/// the entries whose id has moved on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Namespace the id applies to.
    pub namespace_name: String,
    /// Last-seen (request) or new (response) notification id.
    pub notification_id: i64,
}

impl Notification {
    /// Creates a notification entry.
    pub fn new(namespace_name: impl Into<String>, notification_id: i64) -> Self {
        Self {
            namespace_name: namespace_name.into(),
            notification_id,
        }
    }
}

/// Encodes the request list as the compact JSON array used in the query string.
pub fn encode_notifications(notifications: &[Notification]) -> ProtocolResult<String> {
    Ok(serde_json::to_string(notifications)?)
}

/// Decodes the JSON array carried by a 200 long-poll response.
///
/// Fields other than `namespaceName` and `notificationId` (such as the
/// server's `messages` detail) are ignored.
pub fn decode_notifications(body: &str) -> ProtocolResult<Vec<Notification>> {
    Ok(serde_json::from_str(body)?)
}
