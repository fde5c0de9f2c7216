use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

use super::{BlobRequest, BlobResponse, Transport};
use crate::classify::detect;
use crate::{BlobResult, ByteRange, ByteStream, Provider};

/// In-process object store that answers presigned-URL requests.
///
/// Objects are keyed by URL without its query string, so a PUT and a GET signed
/// separately for the same object path see the same content. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<State>,
    chunk_size: Option<usize>,
    ignore_ranges: bool,
}

#[derive(Default)]
struct State {
    objects: Mutex<HashMap<String, StoredObject>>,
    canned: Mutex<HashMap<String, CannedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    open_bodies: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

#[derive(Clone)]
struct CannedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

/// A request as the transport saw it, uploaded body included
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

struct BodyGuard(Arc<AtomicUsize>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver response bodies in chunks of at most `size` bytes
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Answer ranged GETs with the full object and a 200, like some servers do
    pub fn ignoring_ranges(mut self) -> Self {
        self.ignore_ranges = true;
        self
    }

    /// Seed an object
    pub fn insert<B: Into<Bytes>>(&self, url: &str, data: B, content_type: Option<&str>) {
        self.state.objects.lock().insert(
            object_key(url),
            StoredObject {
                data: data.into(),
                content_type: content_type.map(str::to_string),
                last_modified: now_seconds(),
            },
        );
    }

    /// Stored content for `url`, if any
    pub fn object(&self, url: &str) -> Option<Bytes> {
        self.state
            .objects
            .lock()
            .get(&object_key(url))
            .map(|object| object.data.clone())
    }

    /// Answer every request for `url` with a fixed response instead of the store
    pub fn respond_with(&self, url: &str, status: u16, headers: &[(&'static str, &str)], body: &str) {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if let Ok(value) = HeaderValue::from_str(value) {
                map.insert(*name, value);
            }
        }
        self.state.canned.lock().insert(
            object_key(url),
            CannedResponse {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                headers: map,
                body: Bytes::copy_from_slice(body.as_bytes()),
            },
        );
    }

    /// Every request issued so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.lock().last().cloned()
    }

    /// Response bodies handed out and not yet dropped
    pub fn open_bodies(&self) -> usize {
        self.state.open_bodies.load(Ordering::SeqCst)
    }

    fn respond(&self, status: StatusCode, headers: HeaderMap, body: Bytes) -> BlobResponse {
        let chunks: Vec<Bytes> = match self.chunk_size {
            Some(size) => body.chunks(size).map(Bytes::copy_from_slice).collect(),
            None if body.is_empty() => Vec::new(),
            None => vec![body],
        };

        self.state.open_bodies.fetch_add(1, Ordering::SeqCst);
        let guard = BodyGuard(self.state.open_bodies.clone());
        let stream: ByteStream = Box::pin(async_stream::stream! {
            let _guard = guard;
            for chunk in chunks {
                yield Ok::<Bytes, std::io::Error>(chunk);
            }
        });

        BlobResponse::new(status, headers, stream)
    }

    fn error_response(&self, status: StatusCode, code: &str, message: &str) -> BlobResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/xml"));
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code><Message>{}</Message></Error>",
            code, message
        );
        self.respond(status, headers, Bytes::from(body))
    }

    fn handle_put(&self, request: &BlobRequest, key: String, body: Bytes) -> BlobResponse {
        let provider = detect(&request.url);
        if provider == Provider::Azure && request.header("x-ms-blob-type").is_none() {
            return self.error_response(
                StatusCode::BAD_REQUEST,
                "MissingRequiredHeader",
                "An HTTP header that's mandatory for this request is not specified.",
            );
        }

        self.state.objects.lock().insert(
            key,
            StoredObject {
                data: body,
                content_type: request.header("content-type").map(str::to_string),
                last_modified: now_seconds(),
            },
        );

        let status = if provider == Provider::Azure {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        self.respond(status, HeaderMap::new(), Bytes::new())
    }

    fn handle_read(&self, request: &BlobRequest, key: &str) -> BlobResponse {
        let stored = self.state.objects.lock().get(key).cloned();
        let object = match stored {
            Some(object) => object,
            None => {
                return self.error_response(
                    StatusCode::NOT_FOUND,
                    "NoSuchKey",
                    "The specified key does not exist.",
                )
            }
        };

        let total = object.data.len() as u64;
        let mut headers = HeaderMap::new();
        headers.insert("accept-ranges", HeaderValue::from_static("bytes"));
        if let Some(content_type) = object.content_type.as_deref() {
            if let Ok(value) = HeaderValue::from_str(content_type) {
                headers.insert("content-type", value);
            }
        }
        let last_modified = object
            .last_modified
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        if let Ok(value) = HeaderValue::from_str(&last_modified) {
            headers.insert("last-modified", value);
        }

        let requested = request
            .header("x-ms-range")
            .or_else(|| request.header("range"))
            .filter(|_| !self.ignore_ranges)
            .and_then(|value| value.trim().strip_prefix("bytes="))
            .and_then(|value| value.parse::<ByteRange>().ok());

        let (status, body) = match requested {
            None => (StatusCode::OK, object.data.clone()),
            Some(range) => match range.resolve(total) {
                None => {
                    headers.insert("content-range", header_text(&format!("bytes */{}", total)));
                    return self.respond(StatusCode::RANGE_NOT_SATISFIABLE, headers, Bytes::new());
                }
                Some((first, last)) => {
                    headers.insert(
                        "content-range",
                        header_text(&format!("bytes {}-{}/{}", first, last, total)),
                    );
                    (
                        StatusCode::PARTIAL_CONTENT,
                        object.data.slice(first as usize..=last as usize),
                    )
                }
            },
        };

        headers.insert("content-length", header_text(&body.len().to_string()));
        let body = if request.method == Method::HEAD {
            Bytes::new()
        } else {
            body
        };
        self.respond(status, headers, body)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn issue(&self, mut request: BlobRequest) -> BlobResult<BlobResponse> {
        let body = match request.body.take() {
            Some(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Some(buf.freeze())
            }
            None => None,
        };

        self.state.requests.lock().push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: body.clone(),
        });

        let key = object_key(&request.url);
        let canned = self.state.canned.lock().get(&key).cloned();
        if let Some(canned) = canned {
            return Ok(self.respond(canned.status, canned.headers, canned.body));
        }

        let response = match request.method {
            Method::PUT => self.handle_put(&request, key, body.unwrap_or_default()),
            Method::GET | Method::HEAD => self.handle_read(&request, &key),
            _ => self.respond(StatusCode::METHOD_NOT_ALLOWED, HeaderMap::new(), Bytes::new()),
        };
        Ok(response)
    }
}

fn object_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

fn header_text(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn now_seconds() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}
