use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::StatusCode;
use tracing::{debug, instrument, warn};

use crate::adapter::{adapter_for, check_response, ProviderAdapter};
use crate::lines::{encode_line_stream, encode_lines, lines, split_lines};
use crate::manager::TransportSlot;
use crate::metadata::parse_content_range_total;
use crate::transport::{BlobRequest, BlobResponse};
use crate::{
    BlobContent, BlobMetadata, BlobResult, ByteRange, ByteStream, LineStream, Provider,
};

/// A UTF-8 sequence is at most 4 bytes, so a cut one needs at most 3 more
const MAX_UTF8_GROWTH: u64 = 3;

/// A presigned URL bound to its provider adapter.
///
/// Handles are cheap to clone and hold no per-call state; every operation
/// issues its own request. Streams returned by [`UrlBlob::stream`] and
/// [`UrlBlob::stream_lines`] are not restartable: calling again re-issues the
/// request. Dropping a stream before the end releases its connection.
#[derive(Clone)]
pub struct UrlBlob {
    url: String,
    provider: Provider,
    adapter: &'static dyn ProviderAdapter,
    transport: Arc<TransportSlot>,
}

impl UrlBlob {
    pub(crate) fn new(url: &str, provider: Provider, transport: Arc<TransportSlot>) -> Self {
        Self {
            url: url.to_string(),
            provider,
            adapter: adapter_for(provider),
            transport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    async fn issue(&self, request: BlobRequest) -> BlobResult<BlobResponse> {
        let transport = self.transport.acquire()?;
        debug!(
            "{} {} request (range: {})",
            request.method,
            self.provider,
            request.header(self.adapter.range_header()).unwrap_or("none")
        );
        transport.issue(request).await
    }

    async fn send(&self, request: BlobRequest) -> BlobResult<BlobResponse> {
        let response = self.issue(request).await?;
        check_response(
            self.adapter,
            response,
            self.transport.config().max_error_body_bytes,
        )
        .await
    }

    /// Size, content type and modification time of the object.
    ///
    /// Issued as a one-byte ranged GET. An empty object cannot satisfy that
    /// range; its 416 answer still reports the size and is not an error.
    #[instrument(skip(self), fields(provider = %self.provider))]
    pub async fn stat(&self) -> BlobResult<BlobMetadata> {
        let request = self.adapter.build_stat_request(&self.url);
        let response = self.issue(request).await?;

        if response.status == StatusCode::RANGE_NOT_SATISFIABLE {
            if let Some(total) = response
                .header("content-range")
                .and_then(parse_content_range_total)
            {
                debug!("Stat probe unsatisfiable; object holds {} bytes", total);
                let probed = self.adapter.parse_stat_response(&response);
                return Ok(BlobMetadata::new(Some(total), None, probed.last_modified()));
            }
        }

        let response = check_response(
            self.adapter,
            response,
            self.transport.config().max_error_body_bytes,
        )
        .await?;
        let metadata = self.adapter.parse_stat_response(&response);
        debug!("Stat complete: size {:?}", metadata.size());
        Ok(metadata)
    }

    /// Issue a GET and hand back metadata with the unread body
    #[instrument(skip(self), fields(provider = %self.provider))]
    pub async fn open(&self, range: Option<ByteRange>) -> BlobResult<(BlobMetadata, ByteStream)> {
        let request = self.adapter.build_get_request(&self.url, range.as_ref());
        let response = self.send(request).await?;

        if range.is_some() && response.status == StatusCode::OK {
            warn!(
                "{} answered a ranged request with full content (HTTP 200)",
                self.provider
            );
        }
        Ok(self.adapter.parse_get_response(response))
    }

    /// Download the object, or the inclusive `range` of it, into memory
    pub async fn get(&self, range: Option<ByteRange>) -> BlobResult<Bytes> {
        let (_, mut body) = self.open(range).await?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        debug!("Downloaded {} bytes", buf.len());
        Ok(buf.freeze())
    }

    /// Download and split into lines
    pub async fn get_lines(&self, range: Option<ByteRange>) -> BlobResult<Vec<String>> {
        let content = self.get(range).await?;
        Ok(split_lines(&content))
    }

    /// Body chunks as the transport delivers them
    pub async fn stream(&self, range: Option<ByteRange>) -> BlobResult<ByteStream> {
        let (_, body) = self.open(range).await?;
        Ok(body)
    }

    /// Body as complete text lines, whatever the chunk boundaries
    pub async fn stream_lines(&self, range: Option<ByteRange>) -> BlobResult<LineStream> {
        Ok(lines(self.stream(range).await?))
    }

    /// Upload `content` with an HTTP PUT.
    ///
    /// Buffered content is sent with its `Content-Length`; streamed content is
    /// sent as it is produced.
    #[instrument(skip(self, content), fields(provider = %self.provider))]
    pub async fn put<C>(&self, content: C, content_type: Option<&str>) -> BlobResult<()>
    where
        C: Into<BlobContent>,
    {
        let content = content.into();
        let length = content.len_hint();

        let mut request =
            self.adapter
                .build_put_request(&self.url, content_type, content.into_stream());
        if let Some(length) = length {
            request = request.with_header("content-length", &length.to_string());
        }

        let response = self.send(request).await?;
        debug!("Upload accepted with HTTP {}", response.status.as_u16());
        Ok(())
    }

    /// Upload lines, each followed by `\n`
    pub async fn put_lines<I, S>(&self, lines: I, content_type: Option<&str>) -> BlobResult<()>
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: Send + 'static,
        S: Into<String>,
    {
        self.put(BlobContent::Stream(encode_lines(lines)), content_type)
            .await
    }

    /// Upload lines produced by an asynchronous source
    pub async fn put_line_stream<S>(&self, lines: S, content_type: Option<&str>) -> BlobResult<()>
    where
        S: futures_core::Stream<Item = String> + Send + 'static,
    {
        self.put(BlobContent::Stream(encode_line_stream(lines)), content_type)
            .await
    }

    /// Fetch `range` as text, widening it when it cuts a multi-byte character.
    ///
    /// The range is extended one byte at a time to the left (broken leading
    /// sequence) or right (truncated trailing sequence), at most three bytes
    /// each way and never past either end of the object. If that does not
    /// produce valid UTF-8 the original bytes are decoded lossily.
    pub async fn grow_to_valid_string(&self, range: Option<ByteRange>) -> BlobResult<String> {
        let range = match range {
            Some(range) => range,
            None => return Ok(lossy(&self.get(None).await?)),
        };

        let original = self.get(Some(range)).await?;
        let mut fragment = original.to_vec();
        let mut first = range.start();
        let mut total: Option<Option<u64>> = None;
        let (mut grown_left, mut grown_right) = (0u64, 0u64);

        loop {
            let error = match std::str::from_utf8(&fragment) {
                Ok(text) => return Ok(text.to_string()),
                Err(error) => error,
            };

            if error.error_len().is_none() {
                // Truncated at the end; only a closed range can take more bytes
                let last = match (range.start(), range.end()) {
                    (Some(_), Some(end)) => end,
                    _ => break,
                };
                if grown_right >= MAX_UTF8_GROWTH {
                    break;
                }
                let size = match total {
                    Some(size) => size,
                    None => *total.insert(self.stat().await?.size()),
                };
                // an end past the object is clamped by the provider
                let last = size.map_or(last, |size| last.min(size.saturating_sub(1)));
                let next = match last.checked_add(grown_right + 1) {
                    Some(next) if size.map_or(false, |size| next < size) => next,
                    _ => break,
                };
                let byte = self.get(Some(ByteRange::new(next, next)?)).await?;
                if byte.is_empty() {
                    break;
                }
                fragment.extend_from_slice(&byte);
                grown_right += 1;
            } else if error.valid_up_to() == 0 {
                // Starts inside a sequence; reach back for its lead byte
                if first.is_none() {
                    let size = match total {
                        Some(size) => size,
                        None => *total.insert(self.stat().await?.size()),
                    };
                    first = size.and_then(|size| range.resolve(size)).map(|(first, _)| first);
                }
                let start = match first {
                    Some(start) => start,
                    None => break,
                };
                if grown_left >= MAX_UTF8_GROWTH || grown_left >= start {
                    break;
                }
                let previous = start - grown_left - 1;
                let byte = self.get(Some(ByteRange::new(previous, previous)?)).await?;
                if byte.is_empty() {
                    break;
                }
                fragment.splice(0..0, byte.iter().copied());
                grown_left += 1;
            } else {
                // Broken sequence in the middle; widening cannot help
                break;
            }
        }

        Ok(lossy(&original))
    }

    /// Fetch `range` as text, dropping partial characters at either edge.
    ///
    /// An invalid sequence in the middle is not dropped; the whole fragment is
    /// then decoded lossily.
    pub async fn shrink_to_valid_string(&self, range: Option<ByteRange>) -> BlobResult<String> {
        let content = self.get(range).await?;
        if range.is_none() {
            return Ok(lossy(&content));
        }

        let mut fragment: &[u8] = &content;
        loop {
            let error = match std::str::from_utf8(fragment) {
                Ok(text) => return Ok(text.to_string()),
                Err(error) => error,
            };

            let valid = error.valid_up_to();
            match error.error_len() {
                Some(len) if valid == 0 => fragment = &fragment[len..],
                Some(len) if valid + len == fragment.len() => fragment = &fragment[..valid],
                None => fragment = &fragment[..valid],
                Some(_) => return Ok(lossy(fragment)),
            }
        }
    }
}

impl std::fmt::Debug for UrlBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The query string is a credential
        let url = self.url.split('?').next().unwrap_or_default();
        f.debug_struct("UrlBlob")
            .field("url", &url)
            .field("provider", &self.provider)
            .finish()
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use crate::{BlobError, UrlBlobManager};
    use futures::TryStreamExt;

    const S3_URL: &str = "https://bucket.s3.us-east-1.amazonaws.com/data.txt?X-Amz-Signature=abc";
    const AZURE_URL: &str = "https://acct.blob.core.windows.net/c/data.txt?sv=2022-11-02&sig=abc";

    fn setup(url: &str, content: &'static str) -> (MemoryTransport, UrlBlob) {
        let memory = MemoryTransport::new();
        memory.insert(url, content, Some("text/plain"));
        let manager = UrlBlobManager::with_transport(Arc::new(memory.clone()));
        let blob = manager.from_url(url, None).unwrap();
        (memory, blob)
    }

    #[tokio::test]
    async fn test_stat_reports_full_size() {
        let (memory, blob) = setup(S3_URL, "0123456789");

        let meta = blob.stat().await.unwrap();
        assert_eq!(meta.size(), Some(10));
        assert_eq!(meta.content_type(), Some("text/plain"));
        assert!(meta.last_modified().is_some());

        let request = memory.last_request().unwrap();
        assert_eq!(request.method, http::Method::GET);
        assert_eq!(request.header("range"), Some("bytes=0-0"));
    }

    #[tokio::test]
    async fn test_stat_empty_object() {
        let (_, blob) = setup(S3_URL, "");
        let meta = blob.stat().await.unwrap();
        assert_eq!(meta.size(), Some(0));
    }

    #[tokio::test]
    async fn test_ranged_get_inclusive_bounds() {
        let (memory, blob) = setup(AZURE_URL, "0123456789");

        let bytes = blob.get(Some(ByteRange::new(2, 4).unwrap())).await.unwrap();
        assert_eq!(&bytes[..], b"234");
        assert_eq!(memory.last_request().unwrap().header("x-ms-range"), Some("bytes=2-4"));

        let bytes = blob
            .get(Some(ByteRange::from_exclusive(0..3).unwrap()))
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"012");

        let tail = blob.get(Some(ByteRange::suffix(2).unwrap())).await.unwrap();
        assert_eq!(&tail[..], b"89");
    }

    #[tokio::test]
    async fn test_ranged_request_answered_in_full_is_surfaced() {
        let memory = MemoryTransport::new().ignoring_ranges();
        memory.insert(S3_URL, "0123456789", None);
        let manager = UrlBlobManager::with_transport(Arc::new(memory));
        let blob = manager.from_url(S3_URL, None).unwrap();

        let bytes = blob.get(Some(ByteRange::new(0, 1).unwrap())).await.unwrap();
        assert_eq!(&bytes[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_missing_object() {
        let memory = MemoryTransport::new();
        let manager = UrlBlobManager::with_transport(Arc::new(memory));
        let blob = manager.from_url(S3_URL, None).unwrap();

        let err = blob.stat().await.unwrap_err();
        assert!(matches!(err, BlobError::NotFound { provider: Provider::S3, status: 404, .. }));
        assert_eq!(err.code(), Some("NoSuchKey"));
    }

    #[tokio::test]
    async fn test_put_sends_length_and_type() {
        let memory = MemoryTransport::new();
        let manager = UrlBlobManager::with_transport(Arc::new(memory.clone()));
        let blob = manager.from_url(AZURE_URL, None).unwrap();

        blob.put("Hello, world!", Some("text/plain")).await.unwrap();

        let request = memory.last_request().unwrap();
        assert_eq!(request.method, http::Method::PUT);
        assert_eq!(request.header("content-length"), Some("13"));
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.header("x-ms-blob-type"), Some("BlockBlob"));
        assert_eq!(memory.object(AZURE_URL).unwrap(), Bytes::from_static(b"Hello, world!"));
    }

    #[tokio::test]
    async fn test_put_lines_terminates_every_line() {
        let memory = MemoryTransport::new();
        let manager = UrlBlobManager::with_transport(Arc::new(memory.clone()));
        let blob = manager.from_url(S3_URL, None).unwrap();

        blob.put_lines(vec!["alpha", "beta"], None).await.unwrap();
        assert_eq!(memory.object(S3_URL).unwrap(), Bytes::from_static(b"alpha\nbeta\n"));
        assert_eq!(blob.get_lines(None).await.unwrap(), vec!["alpha", "beta"]);

        let source = futures::stream::iter(vec!["gamma".to_string()]);
        blob.put_line_stream(source, None).await.unwrap();
        assert_eq!(memory.object(S3_URL).unwrap(), Bytes::from_static(b"gamma\n"));
    }

    #[tokio::test]
    async fn test_stream_lines_across_small_chunks() {
        let memory = MemoryTransport::new().with_chunk_size(3);
        memory.insert(S3_URL, "first line\nsecond\r\nlast", None);
        let manager = UrlBlobManager::with_transport(Arc::new(memory));
        let blob = manager.from_url(S3_URL, None).unwrap();

        let lines: Vec<String> = blob.stream_lines(None).await.unwrap().try_collect().await.unwrap();
        assert_eq!(lines, vec!["first line", "second", "last"]);
    }

    #[tokio::test]
    async fn test_grow_to_valid_string() {
        // 'é' occupies bytes 1..=2, 'ö' bytes 8..=9
        let (_, blob) = setup(S3_URL, "héllo wörld");

        let grown = blob
            .grow_to_valid_string(Some(ByteRange::new(2, 8).unwrap()))
            .await
            .unwrap();
        assert_eq!(grown, "éllo wö");

        let whole = blob.grow_to_valid_string(None).await.unwrap();
        assert_eq!(whole, "héllo wörld");
    }

    #[tokio::test]
    async fn test_grow_with_open_ended_closed_range() {
        let memory = MemoryTransport::new();
        memory.insert(S3_URL, &b"ab\xE2\x82"[..], None);
        let manager = UrlBlobManager::with_transport(Arc::new(memory));
        let blob = manager.from_url(S3_URL, None).unwrap();

        // truncated at the end of the object; nothing further to fetch
        let grown = blob
            .grow_to_valid_string(Some(ByteRange::new(1, u64::MAX).unwrap()))
            .await
            .unwrap();
        assert_eq!(grown, "b\u{fffd}");
    }

    #[tokio::test]
    async fn test_shrink_to_valid_string() {
        let (_, blob) = setup(S3_URL, "héllo wörld");

        let shrunk = blob
            .shrink_to_valid_string(Some(ByteRange::new(2, 8).unwrap()))
            .await
            .unwrap();
        assert_eq!(shrunk, "llo w");
    }

    #[test]
    fn test_debug_hides_query_string() {
        let manager = UrlBlobManager::with_transport(Arc::new(MemoryTransport::new()));
        let blob = manager.from_url(S3_URL, None).unwrap();
        let printed = format!("{:?}", blob);
        assert!(!printed.contains("Signature"));
        assert!(printed.contains("data.txt"));
    }
}
