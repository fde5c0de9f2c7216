//! Per-provider wire knowledge.
//!
//! Each provider family gets one [`ProviderAdapter`] implementation that knows
//! how to phrase stat/get/put requests for that provider and how to read its
//! responses back. Everything above this layer is written against the trait
//! and never branches on the provider.

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, Method};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::metadata::{parse_content_range_total, parse_http_date};
use crate::transport::{BlobRequest, BlobResponse};
use crate::{BlobError, BlobMetadata, BlobResult, ByteRange, ByteStream, Provider};

mod azure;
mod gcs;
mod generic;
mod s3;

pub use azure::AzureAdapter;
pub use gcs::GcsAdapter;
pub use generic::GenericAdapter;
pub use s3::S3Adapter;

/// First byte only: a GET that works on GET-signed URLs where HEAD would not
const STAT_PROBE: ByteRange = ByteRange::FIRST_BYTE;

/// Request building and response parsing for one provider family
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Header that carries a byte range on GET requests
    fn range_header(&self) -> &'static str {
        "range"
    }

    /// Headers consulted, in order, for the body length when no `Content-Range` total is sent
    fn size_headers(&self) -> &'static [&'static str] {
        &["content-length"]
    }

    /// Extra headers a PUT needs on this provider
    fn put_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Metadata-only request.
    ///
    /// Presigned URLs are signed for one method, so this is a one-byte ranged
    /// GET rather than a HEAD.
    fn build_stat_request(&self, url: &str) -> BlobRequest {
        BlobRequest::new(Method::GET, url)
            .with_header(self.range_header(), &STAT_PROBE.header_value())
    }

    fn build_get_request(&self, url: &str, range: Option<&ByteRange>) -> BlobRequest {
        let request = BlobRequest::new(Method::GET, url);
        match range {
            Some(range) => request.with_header(self.range_header(), &range.header_value()),
            None => request,
        }
    }

    fn build_put_request(&self, url: &str, content_type: Option<&str>, body: ByteStream) -> BlobRequest {
        let mut request = BlobRequest::new(Method::PUT, url).with_body(body);
        if let Some(content_type) = content_type {
            request = request.with_header("content-type", content_type);
        }
        for &(name, value) in self.put_headers() {
            request = request.with_header(name, value);
        }
        request
    }

    fn parse_stat_response(&self, response: &BlobResponse) -> BlobMetadata {
        metadata_from_headers(&response.headers, self.size_headers())
    }

    fn parse_get_response(&self, response: BlobResponse) -> (BlobMetadata, ByteStream) {
        let metadata = self.parse_stat_response(&response);
        (metadata, response.body)
    }

    /// Turn an error status and its (possibly truncated) body into an error
    fn parse_error(&self, status: u16, body: &[u8]) -> BlobError {
        let text = String::from_utf8_lossy(body).into_owned();
        let code = xml_element(&text, "Code");
        let message = xml_element(&text, "Message");
        classify_status(self.provider(), status, code, message, text)
    }
}

static S3: S3Adapter = S3Adapter;
static GCS: GcsAdapter = GcsAdapter;
static AZURE: AzureAdapter = AzureAdapter;
static GENERIC: GenericAdapter = GenericAdapter;

/// The adapter for a provider variant
pub fn adapter_for(provider: Provider) -> &'static dyn ProviderAdapter {
    match provider {
        Provider::S3 => &S3,
        Provider::Gcs => &GCS,
        Provider::Azure => &AZURE,
        Provider::Generic => &GENERIC,
    }
}

/// Pass 2xx responses through; read the body of anything else and classify it.
pub async fn check_response(
    adapter: &dyn ProviderAdapter,
    response: BlobResponse,
    max_body_bytes: usize,
) -> BlobResult<BlobResponse> {
    if response.status.is_success() {
        return Ok(response);
    }

    let status = response.status.as_u16();
    let body = read_limited(response.body, max_body_bytes).await;
    tracing::warn!("{} responded with HTTP {}", adapter.provider(), status);
    Err(adapter.parse_error(status, &body))
}

pub(crate) fn classify_status(
    provider: Provider,
    status: u16,
    code: Option<String>,
    message: Option<String>,
    body: String,
) -> BlobError {
    BlobError::from_status(provider, status, code, message, body).unwrap_or_else(|| {
        // 1xx/3xx that the transport did not resolve; not a success either
        BlobError::RequestRejected {
            provider,
            status,
            code: None,
            message: Some("unexpected status".to_string()),
            body: String::new(),
        }
    })
}

pub(crate) fn metadata_from_headers(headers: &HeaderMap, size_headers: &[&str]) -> BlobMetadata {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let size = header("content-range")
        .and_then(parse_content_range_total)
        .or_else(|| {
            size_headers
                .iter()
                .find_map(|name| header(*name).and_then(|v| v.trim().parse::<u64>().ok()))
        });
    let content_type = header("content-type").map(|v| v.trim().to_string());
    let last_modified = header("last-modified").and_then(parse_http_date);

    BlobMetadata::new(size, content_type, last_modified)
}

static XML_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Code>(.*?)</Code>").expect("valid XML element pattern"));
static XML_MESSAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Message>(.*?)</Message>").expect("valid XML element pattern"));
static XML_AUTH_DETAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<AuthenticationErrorDetail>(.*?)</AuthenticationErrorDetail>")
        .expect("valid XML element pattern")
});

/// Text of the first `<name>` element in an XML error document.
///
/// Only the elements providers use for error details are recognised.
pub(crate) fn xml_element(xml: &str, name: &str) -> Option<String> {
    let element: &Regex = match name {
        "Code" => &XML_CODE,
        "Message" => &XML_MESSAGE,
        "AuthenticationErrorDetail" => &XML_AUTH_DETAIL,
        _ => return None,
    };
    element
        .captures(xml)
        .map(|cap| cap[1].trim().to_string())
        .filter(|text| !text.is_empty())
}

async fn read_limited(mut body: ByteStream, limit: usize) -> Bytes {
    let mut buf = Vec::new();
    while buf.len() < limit {
        match body.next().await {
            Some(Ok(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            // Diagnostics only; keep what arrived
            Some(Err(_)) | None => break,
        }
    }
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};

    const URL: &str = "https://example.com/object?sig=abc";

    fn response(status: u16, headers: &[(&'static str, &str)], body: &'static str) -> BlobResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        let body: ByteStream = Box::pin(futures::stream::once(async move {
            Ok::<_, std::io::Error>(Bytes::from_static(body.as_bytes()))
        }));
        BlobResponse::new(StatusCode::from_u16(status).unwrap(), map, body)
    }

    #[test]
    fn test_range_translation_per_provider() {
        let range = ByteRange::new(0, 1023).unwrap();

        let azure = adapter_for(Provider::Azure).build_get_request(URL, Some(&range));
        assert_eq!(azure.header("x-ms-range"), Some("bytes=0-1023"));
        assert_eq!(azure.header("range"), None);

        for provider in [Provider::S3, Provider::Gcs, Provider::Generic] {
            let request = adapter_for(provider).build_get_request(URL, Some(&range));
            assert_eq!(request.header("range"), Some("bytes=0-1023"), "{}", provider);
            assert_eq!(request.header("x-ms-range"), None);
            assert_eq!(request.method, Method::GET);
        }
    }

    #[test]
    fn test_open_ended_and_suffix_ranges() {
        let open = ByteRange::from_start(512);
        let suffix = ByteRange::suffix(100).unwrap();

        let s3 = adapter_for(Provider::S3);
        assert_eq!(s3.build_get_request(URL, Some(&open)).header("range"), Some("bytes=512-"));
        assert_eq!(s3.build_get_request(URL, Some(&suffix)).header("range"), Some("bytes=-100"));

        let azure = adapter_for(Provider::Azure);
        assert_eq!(azure.build_get_request(URL, Some(&suffix)).header("x-ms-range"), Some("bytes=-100"));
    }

    #[test]
    fn test_unranged_get_has_no_range_header() {
        for provider in Provider::ALL {
            let request = adapter_for(provider).build_get_request(URL, None);
            assert!(request.headers.is_empty(), "{}", provider);
        }
    }

    #[test]
    fn test_stat_request_is_single_byte_probe() {
        let s3 = adapter_for(Provider::S3).build_stat_request(URL);
        assert_eq!(s3.method, Method::GET);
        assert_eq!(s3.header("range"), Some("bytes=0-0"));

        let azure = adapter_for(Provider::Azure).build_stat_request(URL);
        assert_eq!(azure.header("x-ms-range"), Some("bytes=0-0"));
    }

    #[test]
    fn test_put_headers() {
        let body = || -> ByteStream { Box::pin(futures::stream::empty()) };

        let azure = adapter_for(Provider::Azure).build_put_request(URL, Some("text/plain"), body());
        assert_eq!(azure.method, Method::PUT);
        assert_eq!(azure.header("content-type"), Some("text/plain"));
        assert_eq!(azure.header("x-ms-blob-type"), Some("BlockBlob"));

        for provider in [Provider::S3, Provider::Gcs, Provider::Generic] {
            let request = adapter_for(provider).build_put_request(URL, Some("text/plain"), body());
            assert_eq!(request.header("content-type"), Some("text/plain"));
            assert_eq!(request.header("x-ms-blob-type"), None);
        }

        let untyped = adapter_for(Provider::S3).build_put_request(URL, None, body());
        assert_eq!(untyped.header("content-type"), None);
    }

    #[test]
    fn test_stat_metadata_uses_content_range_total() {
        let response = response(
            206,
            &[
                ("content-range", "bytes 0-0/4096"),
                ("content-length", "1"),
                ("content-type", "application/json"),
                ("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
            ],
            "{",
        );
        let meta = adapter_for(Provider::S3).parse_stat_response(&response);
        assert_eq!(meta.size(), Some(4096));
        assert_eq!(meta.content_type(), Some("application/json"));
        assert!(meta.last_modified().is_some());
    }

    #[test]
    fn test_missing_last_modified_degrades_to_absent() {
        let response = response(200, &[("content-length", "12"), ("content-type", "text/plain")], "");
        let meta = adapter_for(Provider::Generic).parse_stat_response(&response);
        assert_eq!(meta.size(), Some(12));
        assert_eq!(meta.content_type(), Some("text/plain"));
        assert_eq!(meta.last_modified(), None);
    }

    #[test]
    fn test_malformed_headers_degrade_to_absent() {
        let response = response(
            200,
            &[("content-length", "lots"), ("last-modified", "last tuesday")],
            "",
        );
        let meta = adapter_for(Provider::S3).parse_stat_response(&response);
        assert_eq!(meta.size(), None);
        assert_eq!(meta.last_modified(), None);
        assert_eq!(meta.content_type(), None);
    }

    #[test]
    fn test_gcs_falls_back_to_stored_content_length() {
        let response = response(200, &[("x-goog-stored-content-length", "2048")], "");
        assert_eq!(adapter_for(Provider::Gcs).parse_stat_response(&response).size(), Some(2048));
        assert_eq!(adapter_for(Provider::S3).parse_stat_response(&response).size(), None);
    }

    #[test]
    fn test_s3_error_codes_are_extracted() {
        let body = "<?xml version=\"1.0\"?><Error><Code>AccessDenied</Code><Message>Request has expired</Message></Error>";
        let err = adapter_for(Provider::S3).parse_error(403, body.as_bytes());
        match err {
            BlobError::RequestRejected { status, code, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(code.as_deref(), Some("AccessDenied"));
                assert_eq!(message.as_deref(), Some("Request has expired"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_generic_errors_keep_raw_body() {
        let err = adapter_for(Provider::Generic).parse_error(404, b"<Code>Nope</Code>");
        match err {
            BlobError::NotFound { code, body, .. } => {
                assert_eq!(code, None);
                assert_eq!(body, "<Code>Nope</Code>");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_response_classifies_statuses() {
        let adapter = adapter_for(Provider::S3);

        let ok = check_response(adapter, response(206, &[], "x"), 1024).await;
        assert!(ok.is_ok());

        let missing = check_response(adapter, response(404, &[], "<Error><Code>NoSuchKey</Code></Error>"), 1024)
            .await
            .unwrap_err();
        assert!(matches!(missing, BlobError::NotFound { .. }));
        assert_eq!(missing.code(), Some("NoSuchKey"));

        let unavailable = check_response(adapter, response(503, &[], "slow down"), 1024)
            .await
            .unwrap_err();
        assert!(unavailable.is_retryable());
    }

    #[tokio::test]
    async fn test_error_body_is_capped() {
        let adapter = adapter_for(Provider::Generic);
        let err = check_response(adapter, response(500, &[], "0123456789"), 4)
            .await
            .unwrap_err();
        match err {
            BlobError::ProviderError { body, .. } => assert_eq!(body, "0123"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_xml_element() {
        let xml = "<Error><Code>ContainerNotFound</Code><Message>\n  gone\n</Message></Error>";
        assert_eq!(xml_element(xml, "Code").as_deref(), Some("ContainerNotFound"));
        assert_eq!(xml_element(xml, "Message").as_deref(), Some("gone"));
        assert_eq!(xml_element(xml, "AuthenticationErrorDetail"), None);
        assert_eq!(xml_element("plain text", "Code"), None);
        assert_eq!(xml_element("<RequestId>r1</RequestId>", "RequestId"), None);

        let azure = "<Error><Code>AuthenticationFailed</Code><AuthenticationErrorDetail>Signature expired</AuthenticationErrorDetail></Error>";
        assert_eq!(
            xml_element(azure, "AuthenticationErrorDetail").as_deref(),
            Some("Signature expired")
        );
    }
}
