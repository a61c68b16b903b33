//! Transport layer abstraction for config requests.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::time::Duration;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A `200 OK` response.
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    /// A `304 Not Modified` response.
    pub fn not_modified() -> Self {
        Self::new(304, "")
    }
}

/// Performs the HTTP GETs issued by the sync engine.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (reqwest, an in-process fake server, a mock for testing).
/// Non-2xx statuses are returned as responses, not errors.
pub trait ConfigTransport: Send + Sync {
    /// Sends a GET request with the given timeout and extra headers.
    fn get(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> SyncResult<HttpResponse>;
}

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Requested URL.
    pub url: String,
    /// Timeout passed by the caller.
    pub timeout: Duration,
    /// Headers passed by the caller.
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum MockReply {
    Respond(HttpResponse),
    Fail(String),
}

/// A mock transport for testing.
///
/// Replies are looked up by URL fragment: the first registered fragment
/// contained in the requested URL wins. Unmatched requests fail.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<(String, MockReply)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers requests whose URL contains `fragment` with `response`.
    pub fn set_response(&self, fragment: &str, response: HttpResponse) {
        self.set_reply(fragment, MockReply::Respond(response));
    }

    /// Fails requests whose URL contains `fragment` with a transport error.
    pub fn set_failure(&self, fragment: &str, message: &str) {
        self.set_reply(fragment, MockReply::Fail(message.to_string()));
    }

    /// Removes every route.
    pub fn clear(&self) {
        self.routes.lock().clear();
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests contained `fragment`.
    pub fn request_count(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }

    fn set_reply(&self, fragment: &str, reply: MockReply) {
        let mut routes = self.routes.lock();
        match routes.iter_mut().find(|(f, _)| f == fragment) {
            Some(route) => route.1 = reply,
            None => routes.push((fragment.to_string(), reply)),
        }
    }
}

impl ConfigTransport for MockTransport {
    fn get(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> SyncResult<HttpResponse> {
        self.requests.lock().push(RecordedRequest {
            url: url.to_string(),
            timeout,
            headers: headers.to_vec(),
        });

        let reply = self
            .routes
            .lock()
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(message)) => Err(SyncError::transport_retryable(message)),
            None => Err(SyncError::transport_retryable(format!(
                "no mock route for {}",
                url
            ))),
        }
    }
}
