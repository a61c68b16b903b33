//! Request signing with a shared secret.
//!
//! When an application has an access key configured on the server, every
//! request must carry:
//!
//! - `Authorization: Apollo {app_id}:{signature}`
//! - `Timestamp: {unix_millis}`
//!
//! where `signature = base64(HMAC-SHA1(secret, "{timestamp}\n{path_with_query}"))`.

use crate::error::{ProtocolError, ProtocolResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Name of the authorization header.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Name of the timestamp header.
pub const TIMESTAMP_HEADER: &str = "Timestamp";

/// Computes the base64 HMAC-SHA1 signature of `"{timestamp}\n{uri}"`.
pub fn signature(timestamp: &str, uri: &str, secret: &str) -> ProtocolResult<String> {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).map_err(|_| ProtocolError::InvalidSecret)?;
    mac.update(timestamp.as_bytes());
    mac.update(b"\n");
    mac.update(uri.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Builds the signed headers for one request.
///
/// Returns no headers when `secret` is empty (unsigned requests).
pub fn sign_headers(
    app_id: &str,
    secret: &str,
    path_with_query: &str,
    timestamp_millis: u64,
) -> ProtocolResult<Vec<(String, String)>> {
    if secret.is_empty() {
        return Ok(Vec::new());
    }

    let timestamp = timestamp_millis.to_string();
    let signature = signature(&timestamp, path_with_query, secret)?;

    Ok(vec![
        (
            AUTHORIZATION_HEADER.to_string(),
            format!("Apollo {}:{}", app_id, signature),
        ),
        (TIMESTAMP_HEADER.to_string(), timestamp),
    ])
}
