use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::{BlobResult, ByteStream};

mod client;
mod memory;

pub use client::ReqwestTransport;
pub use memory::{MemoryTransport, RecordedRequest};

/// The HTTP exchange primitive everything else is built on.
///
/// Implementations must stream both directions without buffering whole bodies
/// and must be safe to share between handles issuing independent requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request and return as soon as status and headers are known.
    ///
    /// Only failures to complete the exchange are errors here; HTTP error
    /// statuses come back as ordinary responses.
    async fn issue(&self, request: BlobRequest) -> BlobResult<BlobResponse>;
}

/// A request built by a provider adapter
pub struct BlobRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<ByteStream>,
}

impl BlobRequest {
    pub fn new<S: Into<String>>(method: Method, url: S) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Add a header. Values that are not valid header text are skipped.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: ByteStream) -> Self {
        self.body = Some(body);
        self
    }

    /// Header value as text, if present and printable
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl std::fmt::Debug for BlobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Status, headers and a lazily-read body.
///
/// Dropping the response (or its body stream) releases the connection.
pub struct BlobResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl BlobResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ByteStream) -> Self {
        Self { status, headers, body }
    }

    /// Header value as text, if present and printable
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl std::fmt::Debug for BlobResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
