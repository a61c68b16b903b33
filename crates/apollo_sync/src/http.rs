//! HTTP transport implementation.
//!
//! Blocking `reqwest` client used by the background workers. Each request
//! carries its own timeout, so the same client serves both short snapshot
//! fetches and minute-long notification polls.

use crate::error::{SyncError, SyncResult};
use crate::transport::{ConfigTransport, HttpResponse};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::trace;

/// `reqwest`-backed [`ConfigTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport with the default user agent.
    pub fn new() -> SyncResult<Self> {
        let client = Client::builder()
            .user_agent(format!("apollo-sync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl ConfigTransport for HttpTransport {
    fn get(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> SyncResult<HttpResponse> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().map_err(map_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(map_error)?;

        trace!(url, status, bytes = body.len(), "http response");
        Ok(HttpResponse { status, body })
    }
}

fn map_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_builder() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}
