//! HTTP collaborator abstraction.
//!
//! The controller never speaks HTTP itself. It hands a [`SyncRequest`] to an
//! [`HttpClient`] and gets back a status code and a text body. Encoding the
//! request (query string, form body, ...) is the client's business.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tablesync_codec::WireRecord;
use thiserror::Error;

/// An opaque bearer token.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Addressing shared by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableTarget {
    /// Table schema version.
    pub table_version: u32,
    /// Table name.
    pub table_name: String,
    /// Server view.
    pub view_name: String,
}

/// A pull request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadRequest {
    /// Table addressing.
    pub target: TableTarget,
    /// Access token, if any.
    pub access_token: Option<AccessToken>,
    /// Watermark in wire format; empty for a full resync.
    pub since: String,
    /// Transport timeout.
    pub timeout: Duration,
}

/// A push of records (write or delete).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushRequest {
    /// Table addressing.
    pub target: TableTarget,
    /// Access token.
    pub access_token: AccessToken,
    /// Exported records.
    pub records: Vec<WireRecord>,
    /// Transport timeout.
    pub timeout: Duration,
}

/// Request types for sync operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SyncRequest {
    /// Pull changes since a watermark.
    Read(ReadRequest),
    /// Push created/updated records.
    Write(PushRequest),
    /// Push deletions.
    Delete(PushRequest),
}

impl SyncRequest {
    /// Returns the table addressing.
    pub fn target(&self) -> &TableTarget {
        match self {
            SyncRequest::Read(r) => &r.target,
            SyncRequest::Write(p) | SyncRequest::Delete(p) => &p.target,
        }
    }

    /// Returns the request kind as a short name.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncRequest::Read(_) => "read",
            SyncRequest::Write(_) => "write",
            SyncRequest::Delete(_) => "delete",
        }
    }
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// A 200 response with a body.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// An empty response with the given status.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    /// Returns true for status 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Returns true for status 403.
    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }
}

/// A request that never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection could not be made or was lost.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The request timed out.
    #[error("request timed out")]
    Timeout,
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the server's response.
    async fn request(&self, request: SyncRequest) -> Result<HttpResponse, TransportError>;
}

/// A scripted client for testing.
///
/// Responses are queued per request kind and served in order. When a queue
/// is empty the request fails with a connection error. Every request is
/// recorded.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    reads: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    writes: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    deletes: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<SyncRequest>>,
    latency: Option<Duration>,
}

impl MockHttpClient {
    /// Creates a client with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every response, to keep requests in flight.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a read response.
    pub fn push_read(&self, response: Result<HttpResponse, TransportError>) {
        self.reads.lock().push_back(response);
    }

    /// Queues a write response.
    pub fn push_write(&self, response: Result<HttpResponse, TransportError>) {
        self.writes.lock().push_back(response);
    }

    /// Queues a delete response.
    pub fn push_delete(&self, response: Result<HttpResponse, TransportError>) {
        self.deletes.lock().push_back(response);
    }

    /// Returns all requests received so far.
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests of a kind (`"read"`, `"write"`, `"delete"`).
    pub fn request_count(&self, kind: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.kind() == kind)
            .count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(&self, request: SyncRequest) -> Result<HttpResponse, TransportError> {
        let queue = match request {
            SyncRequest::Read(_) => &self.reads,
            SyncRequest::Write(_) => &self.writes,
            SyncRequest::Delete(_) => &self.deletes,
        };
        let kind = request.kind();
        self.requests.lock().push(request);
        let response = queue.lock().pop_front();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        response.unwrap_or_else(|| {
            Err(TransportError::Connection(format!(
                "no scripted {kind} response"
            )))
        })
    }
}
